//! Code emission sink.
//!
//! Generated text goes to one of two channels: the main file and the
//! include (statics / header) file. What the channels become on disk is the
//! host's business.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channel {
    #[default]
    Main,
    Include,
}

pub trait CodeSink {
    fn gen_code(&mut self, text: &str);

    fn gen_code_line(&mut self, text: &str) {
        self.gen_code(text);
        self.gen_code("\n");
    }

    fn switch_to_main(&mut self);

    fn switch_to_include(&mut self);

    /// C++ out-of-line method: the prototype goes to the include channel,
    /// the qualified definition header to the main channel.
    fn method_def_header(&mut self, return_type: &str, class_name: &str, name_and_params: &str) {
        self.switch_to_include();
        self.gen_code_line(&format!("  {} {};", return_type.trim(), name_and_params));
        self.switch_to_main();
        self.gen_code(&format!(
            "\n{} {}::{}",
            return_type.trim(),
            class_name,
            name_and_params
        ));
    }
}

/// In-memory sink.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    pub main: String,
    pub include: String,
    current: Channel,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self) -> Channel {
        self.current
    }
}

impl CodeSink for BufferSink {
    fn gen_code(&mut self, text: &str) {
        match self.current {
            Channel::Main => self.main.push_str(text),
            Channel::Include => self.include.push_str(text),
        }
    }

    fn switch_to_main(&mut self) {
        self.current = Channel::Main;
    }

    fn switch_to_include(&mut self) {
        self.current = Channel::Include;
    }
}

/// Escape a string for inclusion in a Java or C++ string literal.
/// Non-ASCII characters become `\uXXXX`.
pub fn add_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\u{8}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\u{c}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 || (c as u32) > 0x7e => {
                let code = c as u32;
                if code > 0xffff {
                    // Surrogate pair, as Java strings hold UTF-16.
                    let v = code - 0x10000;
                    let hi = 0xd800 + (v >> 10);
                    let lo = 0xdc00 + (v & 0x3ff);
                    out.push_str(&format!("\\u{:04x}\\u{:04x}", hi, lo));
                } else {
                    out.push_str(&format!("\\u{:04x}", code));
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// Escape only non-ASCII characters (for trace strings).
pub fn add_unicode_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if (ch as u32) < 0x20 || (ch as u32) > 0x7e {
            out.push_str(&format!("\\u{:04x}", ch as u32));
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_are_separate() {
        let mut sink = BufferSink::new();
        sink.gen_code_line("main one");
        sink.switch_to_include();
        sink.gen_code_line("include one");
        sink.switch_to_main();
        sink.gen_code("main two");
        assert_eq!(sink.main, "main one\nmain two");
        assert_eq!(sink.include, "include one\n");
    }

    #[test]
    fn test_method_def_header_splits_channels() {
        let mut sink = BufferSink::new();
        sink.method_def_header("void", "Parser", "Start()");
        assert_eq!(sink.include, "  void Start();\n");
        assert_eq!(sink.main, "\nvoid Parser::Start()");
        assert_eq!(sink.channel(), Channel::Main);
    }

    #[test]
    fn test_add_escapes() {
        assert_eq!(add_escapes("a\"b\n"), "a\\\"b\\n");
        assert_eq!(add_escapes("\u{e9}"), "\\u00e9");
        assert_eq!(add_escapes("\\"), "\\\\");
    }
}
