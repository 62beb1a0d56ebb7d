//! Phase 1: production methods and their decision points.

use super::{Cond, Fragment, ParseEngine};
use crate::emit::{add_unicode_escapes, CodeSink};
use crate::grammar::{ExpId, Expansion, NormalProduction};
use crate::semantic::empty_expansion_exists;
use crate::session::Phase3Data;

/// What the checker has left open so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenStatement {
    Nothing,
    If,
    Switch,
}

impl<'a> ParseEngine<'a> {
    pub(super) fn build_phase1_routine(
        &mut self,
        prod: &NormalProduction,
        body: ExpId,
        declarations: &str,
        out: &mut dyn CodeSink,
    ) {
        let cpp = self.opts.is_cpp();
        let void_return = prod.is_void();
        let name = add_unicode_escapes(&prod.name);

        let mut error_ret = None;
        if cpp {
            error_ret = Some(self.cpp_method_header(prod, out));
        } else {
            let access = prod.access.as_deref().unwrap_or("public");
            out.gen_code(&format!(
                "  {}final {} {} {}({}) throws ParseException",
                self.static_opt(),
                access,
                prod.return_type.trim(),
                prod.name,
                prod.params
            ));
            for throws in &prod.throws {
                out.gen_code(&format!(", {}", throws));
            }
        }
        out.gen_code(" {");

        let error_ret = error_ret.filter(|_| self.opts.stop_on_first_error || (self.opts.depth_limit > 0 && !void_return));
        if let Some(preamble) = &error_ret {
            out.gen_code(preamble);
        }
        self.gen_stack_check(void_return, out);

        let mut indent = 4;
        if self.opts.debug_parser {
            out.gen_code_line("");
            if cpp {
                out.gen_code_line(&format!(
                    "    JJEnter<std::function<void()>> jjenter([this]() {{trace_call  (\"{}\"); }});",
                    name
                ));
                out.gen_code_line(&format!(
                    "    JJExit <std::function<void()>> jjexit ([this]() {{trace_return(\"{}\"); }});",
                    name
                ));
            } else {
                out.gen_code_line(&format!("    trace_call(\"{}\");", name));
            }
            out.gen_code_line("    try {");
            indent = 6;
        }

        if !declarations.trim().is_empty() {
            out.gen_code_line("");
            out.gen_code(declarations);
        }

        let code = self.phase1_expansion_gen(body);
        code.dump(&mut indent, out);
        out.gen_code_line("");

        if prod.jump_patched && !void_return {
            if cpp {
                out.gen_code_line("    throw \"Missing return statement in function\";");
            } else {
                let exception = if self.opts.legacy_exception_handling { "Error" } else { "RuntimeException" };
                out.gen_code_line(&format!(
                    "    throw new {}(\"Missing return statement in function\");",
                    exception
                ));
            }
        }
        if self.opts.debug_parser {
            if cpp {
                out.gen_code_line("    } catch(...) { }");
            } else {
                out.gen_code_line("    } finally {");
                out.gen_code_line(&format!("      trace_return(\"{}\");", name));
                out.gen_code_line("    }");
            }
        }
        if cpp && !void_return {
            out.gen_code_line("assert(false);");
        }
        if error_ret.is_some() {
            out.gen_code_line("\n#undef __ERROR_RET__\n");
        }
        self.gen_stack_check_end(out);
        out.gen_code_line("}");
        out.gen_code_line("");
    }

    fn stop_on_error_check(&self) -> &'static str {
        if self.opts.is_cpp() && self.opts.stop_on_first_error {
            "\n    { if (hasError) { return __ERROR_RET__; } }\n"
        } else {
            ""
        }
    }

    pub(super) fn phase1_expansion_gen(&mut self, exp: ExpId) -> Fragment {
        let grammar = self.grammar;
        let cpp = self.opts.is_cpp();
        let mut code = Fragment::new();
        match grammar.kind(exp) {
            Expansion::Terminal { rexp, lhs, rhs } => {
                code.push("\n");
                if let Some(lhs) = lhs {
                    code.push(&format!("{} = ", lhs));
                }
                let tail = match rhs {
                    None => ");".to_string(),
                    Some(rhs) => format!("){}{};", if cpp { "->" } else { "." }, rhs),
                };
                code.push(&format!("jj_consume_token({}{}", self.token_label(*rexp), tail));
                code.push(self.stop_on_error_check());
            }
            Expansion::NonTerminal { name, lhs, args } => {
                code.push("\n");
                if let Some(lhs) = lhs {
                    code.push(&format!("{} = ", lhs));
                }
                code.push(&format!("{}({});", name, args));
                code.push(self.stop_on_error_check());
            }
            Expansion::Action(action) => {
                code.raw(action);
            }
            Expansion::Choice(alts) => {
                let mut conds = Vec::with_capacity(alts.len());
                let mut actions = Vec::with_capacity(alts.len() + 1);
                for &alt in alts {
                    actions.push(self.phase1_expansion_gen(alt));
                    conds.push(self.cond_of_sequence(alt));
                }
                let mut default = Fragment::new();
                default.push("\njj_consume_token(-1);\n");
                if cpp {
                    default.push("errorHandler->handleParseError(token, getToken(1), __FUNCTION__, this), hasError = true;");
                    if self.opts.stop_on_first_error {
                        default.push("return __ERROR_RET__;\n");
                    }
                } else {
                    default.push("throw new ParseException();");
                }
                actions.push(default);
                code = self.build_lookahead_checker(&conds, actions);
            }
            Expansion::Sequence(units) => {
                let last = units.len().saturating_sub(1);
                for (i, &unit) in units.iter().enumerate().skip(1) {
                    // Without exceptions, every step is guarded by the error
                    // flag, except a production's closing action.
                    let wrap = cpp
                        && (!matches!(grammar.kind(unit), Expansion::Action(_))
                            || !self.parent_is_production(exp)
                            || i != last);
                    if wrap {
                        code.push("\nif (!hasError) {");
                    }
                    code.append(self.phase1_expansion_gen(unit));
                    if wrap {
                        code.push("\n}");
                    }
                }
            }
            Expansion::OneOrMore(nested) | Expansion::ZeroOrMore(nested) => {
                let nested = *nested;
                let body_first = matches!(grammar.kind(exp), Expansion::OneOrMore(_));
                self.session.phases.gensym_index += 1;
                let label = self.session.phases.gensym_index;

                code.push("\n");
                if !cpp {
                    code.push(&format!("label_{}:\n", label));
                }
                code.push(if cpp { "while (!hasError) {" } else { "while (true) {" }).indent();
                if body_first {
                    code.append(self.phase1_expansion_gen(nested));
                }
                let cond = self.cond_of_nested(nested);
                let mut stay = Fragment::new();
                stay.push("\n;");
                let mut leave = Fragment::new();
                if cpp {
                    leave.push(&format!("\ngoto end_label_{};", label));
                } else {
                    leave.push(&format!("\nbreak label_{};", label));
                }
                code.append(self.build_lookahead_checker(&[cond], vec![stay, leave]));
                if !body_first {
                    code.append(self.phase1_expansion_gen(nested));
                }
                code.dedent().push("\n}");
                if cpp {
                    code.push(&format!("\nend_label_{}: ;", label));
                }
            }
            Expansion::ZeroOrOne(nested) => {
                let cond = self.cond_of_nested(*nested);
                let body = self.phase1_expansion_gen(*nested);
                let mut skip = Fragment::new();
                skip.push("\n;");
                code = self.build_lookahead_checker(&[cond], vec![body, skip]);
            }
            Expansion::TryBlock { body, catches, finally } => {
                code.push("\ntry {").indent();
                code.append(self.phase1_expansion_gen(*body));
                code.dedent().push("\n}");
                for catch in catches {
                    code.push(&format!(" catch ({} {}) {{", catch.exception_type, catch.name));
                    code.raw(&catch.code);
                    code.push("\n}");
                }
                if let Some(finally) = finally {
                    code.push(" finally {");
                    code.raw(finally);
                    code.push("\n}");
                }
            }
            Expansion::Lookahead(_) => {}
        }
        code
    }

    /// Decision code choosing among `actions`: `actions[i]` runs when
    /// `conds[i]` holds, the extra last action when none does.
    pub(super) fn build_lookahead_checker(&mut self, conds: &[Cond], mut actions: Vec<Fragment>) -> Fragment {
        let grammar = self.grammar;
        let token_count = self.token_count();
        let mask_words = token_count.saturating_sub(1) / 32 + 1;

        let mut code = Fragment::new();
        let mut state = OpenStatement::Nothing;
        let mut indent_amt = 0;
        let mut cased = vec![false; token_count];
        let mut token_mask = vec![0u32; mask_words];
        let mut index = 0;

        while index < conds.len() {
            let cond = &conds[index];
            let mut use_jj2 = false;

            if cond.amount == 0
                || empty_expansion_exists(grammar, self.session, cond.expansion)
                || self.java_code_check(cond.expansion)
            {
                // The syntactic part cannot fail; without a guard this
                // alternative is taken unconditionally.
                let Some(semantic) = &cond.semantic else { break };
                match state {
                    OpenStatement::Nothing => {
                        code.push("\nif (");
                        indent_amt += 1;
                    }
                    OpenStatement::If => {
                        code.dedent().push("\n} else if (");
                    }
                    OpenStatement::Switch => {
                        self.close_switch(&mut code, &token_mask);
                        code.push("\nif (");
                        indent_amt += 1;
                    }
                }
                code.push(&format!("{}) {{", semantic))
                    .indent()
                    .append(std::mem::take(&mut actions[index]));
                state = OpenStatement::If;
            } else if cond.amount == 1 && cond.semantic.is_none() {
                self.reset_first_set();
                self.gen_first_set(cond.expansion);
                if self.jj2_la {
                    use_jj2 = true;
                } else {
                    if state != OpenStatement::Switch {
                        if state == OpenStatement::If {
                            code.dedent().push("\n} else {").indent();
                        }
                        code.push("\nswitch (");
                        code.push(match (self.opts.cache_tokens, self.opts.is_cpp()) {
                            (true, true) => "jj_nt->kind",
                            (true, false) => "jj_nt.kind",
                            (false, _) => "(jj_ntk==-1)?jj_ntk_f():jj_ntk",
                        });
                        code.push(") {").indent();
                        cased.iter_mut().for_each(|c| *c = false);
                        indent_amt += 1;
                        token_mask = vec![0u32; mask_words];
                    }
                    let mut labelled = false;
                    for kind in 0..token_count {
                        if !self.first_set[kind] {
                            continue;
                        }
                        if cased[kind] {
                            log::debug!("token kind {} already handled by an earlier case; skipped", kind);
                            continue;
                        }
                        cased[kind] = true;
                        labelled = true;
                        token_mask[kind / 32] |= 1 << (kind % 32);
                        let label = match self.session.names_of_tokens.get(&(kind as u32)) {
                            Some(name) => name.clone(),
                            None => kind.to_string(),
                        };
                        code.dedent().push(&format!("\ncase {}:", label)).indent();
                    }
                    if labelled {
                        code.push("{")
                            .append(std::mem::take(&mut actions[index]))
                            .push("\nbreak;\n}");
                    } else {
                        // No case of its own: the block would follow the
                        // previous arm's `break;` and never run.
                        log::debug!("alternative {} is shadowed by earlier cases; no arm emitted", index);
                    }
                    state = OpenStatement::Switch;
                    index += 1;
                    continue;
                }
            } else {
                use_jj2 = true;
            }

            if use_jj2 {
                match state {
                    OpenStatement::Nothing => {
                        code.push("\nif (");
                        indent_amt += 1;
                    }
                    OpenStatement::If => {
                        code.dedent().push("\n} else if (");
                    }
                    OpenStatement::Switch => {
                        self.close_switch(&mut code, &token_mask);
                        code.push("\nif (");
                        indent_amt += 1;
                    }
                }
                let phases = &mut self.session.phases;
                phases.jj2_index += 1;
                let jj2 = phases.jj2_index;
                phases.internal_names.insert(cond.expansion, format!("_{}", jj2));
                phases.internal_index.insert(cond.expansion, jj2);
                phases.phase2_list.push(Phase3Data { exp: cond.expansion, count: cond.amount });
                code.push(&format!("jj_2_{}({})", jj2, Self::amount_text(cond.amount)));
                if let Some(semantic) = &cond.semantic {
                    code.push(&format!(" && ({})", semantic));
                }
                code.push(") {").indent().append(std::mem::take(&mut actions[index]));
                state = OpenStatement::If;
            }
            index += 1;
        }

        let default = std::mem::take(&mut actions[index]);
        match state {
            OpenStatement::Nothing => {
                code.append(default);
            }
            OpenStatement::If => {
                code.dedent().push("\n} else {").indent().append(default);
            }
            OpenStatement::Switch => {
                code.dedent().push("\ndefault:").indent();
                if self.opts.error_reporting {
                    let phases = &mut self.session.phases;
                    code.push(&format!("\njj_la1[{}] = jj_gen;", phases.mask_index));
                    phases.mask_vals.push(token_mask);
                    phases.mask_index += 1;
                }
                code.append(default);
            }
        }
        for _ in 0..indent_amt {
            code.dedent().push("\n}");
        }
        code
    }

    /// Turn an open switch into its `default:` arm, recording the mask of
    /// the cases it handled.
    fn close_switch(&mut self, code: &mut Fragment, token_mask: &[u32]) {
        code.dedent().push("\ndefault:").indent();
        let phases = &mut self.session.phases;
        if self.opts.error_reporting {
            code.push(&format!("\njj_la1[{}] = jj_gen;", phases.mask_index));
            phases.mask_index += 1;
        }
        phases.mask_vals.push(token_mask.to_vec());
    }
}
