//! Phases 2 and 3: speculative scanning routines.
//!
//! `jj_2_N` is the entry point a phase 1 decision calls; it arms the scan
//! budget and runs `jj_3_N`. Phase 3 routines return `true` on *failure*
//! and stop as soon as the budget is spent.

use super::ParseEngine;
use crate::emit::{add_unicode_escapes, CodeSink};
use crate::grammar::{ExpId, Expansion, ProductionKind};
use crate::session::Phase3Data;

impl<'a> ParseEngine<'a> {
    pub(super) fn build_phase2_routine(&mut self, entry: Phase3Data, out: &mut dyn CodeSink) {
        let exp = entry.exp;
        let name = self.internal_name(exp);
        if self.opts.is_cpp() {
            out.gen_code_line(&format!(" inline bool jj_2{}(int xla)", name));
        } else {
            out.gen_code_line(&format!(
                "  {}private {} jj_2{}(int xla)",
                self.static_opt(),
                self.opts.boolean_type(),
                name
            ));
        }
        out.gen_code_line(" {");
        out.gen_code_line("    jj_la = xla; jj_lastpos = jj_scanpos = token;");

        let suffix = if self.opts.depth_limit > 0 { " && !jj_depth_error" } else { "" };
        if self.opts.is_cpp() {
            out.gen_code_line("    jj_done = false;");
            out.gen_code_line(&format!("    return (!jj_3{}() || jj_done){};", name, suffix));
        } else {
            out.gen_code_line(&format!("    try {{ return (!jj_3{}(){}); }}", name, suffix));
            out.gen_code_line("    catch(LookaheadSuccess ls) { return true; }");
        }
        if self.opts.error_reporting {
            let slot = self.session.phases.internal_index.get(&exp).copied().unwrap_or(1).saturating_sub(1);
            let prefix = if self.opts.is_cpp() { " " } else { "    finally " };
            out.gen_code_line(&format!("{}{{ jj_save({}, xla); }}", prefix, slot));
        }
        out.gen_code_line("  }");
        out.gen_code_line("");

        let phases = &mut self.session.phases;
        phases.phase3_list.push(entry);
        phases.phase3_table.insert(exp, entry);
    }

    fn internal_name(&self, exp: ExpId) -> String {
        self.session.phases.internal_names.get(&exp).cloned().unwrap_or_default()
    }

    /// Call testing whether `exp` fails to match.
    fn jj3_call(&self, exp: ExpId) -> String {
        let name = self.internal_name(exp);
        if name.starts_with("jj_scan_token") {
            name
        } else {
            format!("jj_3{}()", name)
        }
    }

    fn gen_return(&self, value: bool) -> String {
        let text = if value { "true" } else { "false" };
        let Some(traced) = self.jj3_expansion.filter(|_| self.opts.debug_lookahead) else {
            return format!("return {};", text);
        };
        let mut trace = format!(
            "trace_return(\"{}(LOOKAHEAD {})\");",
            add_unicode_escapes(&self.production_name(traced)),
            if value { "FAILED" } else { "SUCCEEDED" }
        );
        if self.opts.error_reporting {
            trace = format!("if (!jj_rescan) {}", trace);
        }
        format!("{{ {} return {}; }}", trace, text)
    }

    /// Name the phase 3 routine for `exp` and request it with `inf`'s
    /// budget. Expansions that boil down to one token are scanned inline.
    fn generate_3r(&mut self, exp: ExpId, inf: Phase3Data) {
        let grammar = self.grammar;
        if !self.session.phases.internal_names.contains_key(&exp) {
            let mut seq = exp;
            loop {
                match grammar.kind(seq) {
                    Expansion::Sequence(units) if units.len() == 2 => seq = units[1],
                    Expansion::NonTerminal { name, .. } => match self.production(name).map(|p| &p.kind) {
                        Some(ProductionKind::Bnf { expansion, .. }) => seq = *expansion,
                        _ => break,
                    },
                    _ => break,
                }
            }

            if let Expansion::Terminal { rexp, .. } = grammar.kind(seq) {
                let name = format!("jj_scan_token({})", grammar.rexp(*rexp).ordinal);
                self.session.phases.internal_names.insert(exp, name);
                return;
            }

            let loc = grammar.exp(exp).loc;
            let production = self.production_name(exp);
            let phases = &mut self.session.phases;
            phases.gensym_index += 1;
            let name = format!("R_{}_{}_{}_{}", production, loc.line, loc.column, phases.gensym_index);
            phases.internal_names.insert(exp, name);
            phases.internal_index.insert(exp, phases.gensym_index);
        }

        let phases = &mut self.session.phases;
        let wanted = Phase3Data { exp, count: inf.count };
        match phases.phase3_table.get(&exp) {
            Some(known) if known.count >= inf.count => {}
            _ => {
                phases.phase3_list.push(wanted);
                phases.phase3_table.insert(exp, wanted);
            }
        }
    }

    /// Request routines for everything `inf.exp` scans within its budget.
    pub(super) fn setup_phase3_builds(&mut self, inf: Phase3Data) {
        let grammar = self.grammar;
        match grammar.kind(inf.exp) {
            Expansion::NonTerminal { name, .. } => {
                if let Some(ProductionKind::Bnf { expansion, .. }) = self.production(name).map(|p| &p.kind) {
                    self.generate_3r(*expansion, inf);
                }
            }
            Expansion::Choice(alts) => {
                for &alt in alts {
                    self.generate_3r(alt, inf);
                }
            }
            Expansion::Sequence(units) => {
                let mut count = inf.count;
                for &unit in units.iter().skip(1) {
                    self.setup_phase3_builds(Phase3Data { exp: unit, count });
                    count = count.saturating_sub(self.minimum_size(unit));
                    if count == 0 {
                        break;
                    }
                }
            }
            Expansion::TryBlock { body, .. } => {
                self.setup_phase3_builds(Phase3Data { exp: *body, count: inf.count });
            }
            Expansion::OneOrMore(nested) | Expansion::ZeroOrMore(nested) | Expansion::ZeroOrOne(nested) => {
                self.generate_3r(*nested, inf);
            }
            Expansion::Terminal { .. } | Expansion::Action(_) | Expansion::Lookahead(_) => {}
        }
    }

    fn declare_xsp(&mut self, out: &mut dyn CodeSink) {
        if !self.xsp_declared {
            self.xsp_declared = true;
            let token_type = if self.opts.is_cpp() { "Token *" } else { "Token" };
            out.gen_code_line(&format!("    {} xsp;", token_type));
        }
    }

    pub(super) fn build_phase3_routine(&mut self, inf: Phase3Data, recursive: bool, out: &mut dyn CodeSink) {
        let grammar = self.grammar;
        let exp = inf.exp;
        if self.internal_name(exp).starts_with("jj_scan_token") {
            return;
        }
        let cpp = self.opts.is_cpp();

        if !recursive {
            let name = self.internal_name(exp);
            if cpp {
                out.gen_code_line(&format!(" inline bool jj_3{}()", name));
            } else {
                out.gen_code_line(&format!(
                    "  {}private {} jj_3{}()",
                    self.static_opt(),
                    self.opts.boolean_type(),
                    name
                ));
            }
            out.gen_code_line(" {");
            if cpp {
                out.gen_code_line("    if (jj_done) return true;");
                if self.opts.depth_limit > 0 {
                    out.gen_code_line("#define __ERROR_RET__ true");
                }
            }
            self.gen_stack_check(false, out);
            self.xsp_declared = false;
            if self.opts.debug_lookahead && self.parent_is_production(exp) {
                out.gen_code("    ");
                if self.opts.error_reporting {
                    out.gen_code("if (!jj_rescan) ");
                }
                out.gen_code_line(&format!(
                    "trace_call(\"{}(LOOKING AHEAD...)\");",
                    add_unicode_escapes(&self.production_name(exp))
                ));
                self.jj3_expansion = Some(exp);
            } else {
                self.jj3_expansion = None;
            }
        }

        match grammar.kind(exp) {
            Expansion::Terminal { rexp, .. } => {
                out.gen_code_line(&format!(
                    "    if (jj_scan_token({})) {}",
                    self.token_label(*rexp),
                    self.gen_return(true)
                ));
            }
            Expansion::NonTerminal { name, .. } => match self.production(name).map(|p| &p.kind) {
                Some(ProductionKind::Bnf { expansion, .. }) => {
                    out.gen_code_line(&format!("    if ({}) {}", self.jj3_call(*expansion), self.gen_return(true)));
                }
                _ => {
                    out.gen_code_line(&format!(
                        "    if (true) {{ jj_la = 0; jj_scanpos = jj_lastpos; {}}}",
                        self.gen_return(false)
                    ));
                }
            },
            Expansion::Choice(alts) => {
                if alts.len() != 1 {
                    self.declare_xsp(out);
                    out.gen_code_line("    xsp = jj_scanpos;");
                }
                let last = alts.len().saturating_sub(1);
                for (i, &alt) in alts.iter().enumerate() {
                    let semantic = grammar.sequence_lookahead(alt).and_then(|la| la.semantic.as_deref());
                    if let Some(semantic) = semantic {
                        self.session.phases.lookahead_needed = true;
                        out.gen_code_line("    jj_lookingAhead = true;");
                        out.gen_code_line(&format!("    jj_semLA = {};", semantic));
                        out.gen_code_line("    jj_lookingAhead = false;");
                    }
                    out.gen_code("    if (");
                    if semantic.is_some() {
                        out.gen_code("!jj_semLA || ");
                    }
                    if i != last {
                        out.gen_code_line(&format!("{}) {{", self.jj3_call(alt)));
                        out.gen_code_line("    jj_scanpos = xsp;");
                    } else {
                        out.gen_code_line(&format!("{}) {}", self.jj3_call(alt), self.gen_return(true)));
                    }
                }
                for _ in 1..alts.len() {
                    out.gen_code_line("    }");
                }
            }
            Expansion::Sequence(units) => {
                let mut count = inf.count;
                for &unit in units.iter().skip(1) {
                    self.build_phase3_routine(Phase3Data { exp: unit, count }, true, out);
                    count = count.saturating_sub(self.minimum_size(unit));
                    if count == 0 {
                        break;
                    }
                }
            }
            Expansion::TryBlock { body, .. } => {
                self.build_phase3_routine(Phase3Data { exp: *body, count: inf.count }, true, out);
            }
            Expansion::OneOrMore(nested) => {
                self.declare_xsp(out);
                let call = self.jj3_call(*nested);
                out.gen_code_line(&format!("    if ({}) {}", call, self.gen_return(true)));
                out.gen_code_line("    while (true) {");
                out.gen_code_line("      xsp = jj_scanpos;");
                out.gen_code_line(&format!("      if ({}) {{ jj_scanpos = xsp; break; }}", call));
                out.gen_code_line("    }");
            }
            Expansion::ZeroOrMore(nested) => {
                self.declare_xsp(out);
                out.gen_code_line("    while (true) {");
                out.gen_code_line("      xsp = jj_scanpos;");
                out.gen_code_line(&format!("      if ({}) {{ jj_scanpos = xsp; break; }}", self.jj3_call(*nested)));
                out.gen_code_line("    }");
            }
            Expansion::ZeroOrOne(nested) => {
                self.declare_xsp(out);
                out.gen_code_line("    xsp = jj_scanpos;");
                out.gen_code_line(&format!("    if ({}) jj_scanpos = xsp;", self.jj3_call(*nested)));
            }
            Expansion::Action(_) | Expansion::Lookahead(_) => {}
        }

        if !recursive {
            out.gen_code_line(&format!("    {}", self.gen_return(false)));
            self.gen_stack_check_end(out);
            if cpp && self.opts.depth_limit > 0 {
                out.gen_code_line("#undef __ERROR_RET__");
            }
            out.gen_code_line("  }");
            out.gen_code_line("");
        }
    }
}
