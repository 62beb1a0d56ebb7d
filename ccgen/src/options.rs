//! Generator options.
//!
//! The option surface is owned by the host (command line, grammar `options`
//! block); the core only reads it. Options deserialize from JSON with every
//! field defaulted, so a host can pass just the flags it cares about.

use serde::Deserialize;

use crate::error::GenerateError;

/// Target language of the emitted routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputLanguage {
    #[default]
    Java,
    Cpp,
}

/// Flags affecting lexer and parser generation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Default lookahead amount for implicit lookaheads.
    pub lookahead: u32,
    /// Check lookahead adequacy even when `lookahead > 1` or explicit
    /// lookaheads are present.
    pub force_la_check: bool,
    /// Enables left-recursion, empty-loop and ambiguity diagnostics.
    pub sanity_check: bool,
    /// Largest lookahead tried when checking choice points.
    pub choice_ambiguity_check: u32,
    /// Largest lookahead tried when checking `(...)*`, `(...)+`, `(...)?`.
    pub other_ambiguity_check: u32,
    /// Case-insensitive matching for every token.
    pub ignore_case: bool,
    pub debug_parser: bool,
    pub debug_lookahead: bool,
    pub debug_token_manager: bool,
    /// Emit `jj_save` bookkeeping for better parse error messages.
    pub error_reporting: bool,
    pub cache_tokens: bool,
    /// Maximum recursion depth of the generated parser (0 disables the guard).
    pub depth_limit: u32,
    #[serde(rename = "static")]
    pub is_static: bool,
    pub output_language: OutputLanguage,
    pub java_unicode_escape: bool,
    pub user_char_stream: bool,
    pub user_token_manager: bool,
    /// C++ only: return from every routine after the first parse error.
    pub stop_on_first_error: bool,
    pub legacy_exception_handling: bool,
    pub parser_name: String,
    /// Column width of a tab character for position tracking.
    pub tab_size: u32,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            lookahead: 1,
            force_la_check: false,
            sanity_check: true,
            choice_ambiguity_check: 2,
            other_ambiguity_check: 1,
            ignore_case: false,
            debug_parser: false,
            debug_lookahead: false,
            debug_token_manager: false,
            error_reporting: true,
            cache_tokens: false,
            depth_limit: 0,
            is_static: false,
            output_language: OutputLanguage::Java,
            java_unicode_escape: false,
            user_char_stream: false,
            user_token_manager: false,
            stop_on_first_error: false,
            legacy_exception_handling: false,
            parser_name: "Parser".to_string(),
            tab_size: 1,
        }
    }
}

impl Options {
    /// Parse options from a JSON object. Missing keys keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, GenerateError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn is_cpp(&self) -> bool {
        self.output_language == OutputLanguage::Cpp
    }

    /// Type spelled for boolean values in generated code.
    pub fn boolean_type(&self) -> &'static str {
        if self.is_cpp() {
            "bool"
        } else {
            "boolean"
        }
    }

    /// Type spelled for 64-bit active-kind words in generated code.
    pub fn long_type(&self) -> &'static str {
        if self.is_cpp() {
            "unsigned long long"
        } else {
            "long"
        }
    }

    /// Suffix of 64-bit literals in generated code.
    pub fn long_suffix(&self) -> &'static str {
        if self.is_cpp() {
            "ULL"
        } else {
            "L"
        }
    }

    pub fn token_manager_name(&self) -> String {
        format!("{}TokenManager", self.parser_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let opts = Options::from_json("{}").expect("empty object");
        assert_eq!(opts, Options::default());
        assert_eq!(opts.lookahead, 1);
        assert!(opts.sanity_check);
    }

    #[test]
    fn test_partial_json_overrides() {
        let opts = Options::from_json(
            r#"{"lookahead": 3, "static": true, "output_language": "cpp", "depth_limit": 40}"#,
        )
        .expect("valid options");
        assert_eq!(opts.lookahead, 3);
        assert!(opts.is_static);
        assert!(opts.is_cpp());
        assert_eq!(opts.depth_limit, 40);
        assert_eq!(opts.choice_ambiguity_check, 2);
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = Options::from_json(r#"{"lookahead": "two"}"#).unwrap_err();
        assert!(matches!(err, GenerateError::Config(_)));
    }
}
