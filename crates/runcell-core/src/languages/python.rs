//! Python adapter
//!
//! Targets an interactive interpreter (`python -i`), so submissions feed the
//! REPL line by line and interpreter state persists across them. The REPL
//! echoes `>>> ` / `... ` prompt lines into the output; those lines are pure
//! echo noise and the post-processor discards them.

use regex::Regex;

use super::{
    parse_active_line, LanguageAdapter, ACTIVE_LINE_PREFIX, ACTIVE_LINE_SUFFIX,
    END_OF_EXECUTION_MARKER,
};

pub struct Python {
    prompt_echo: Regex,
}

impl Python {
    pub fn new() -> Self {
        Self {
            prompt_echo: Regex::new(r"^\s*(>>>\s?|\.\.\.\s?)+").expect("prompt pattern compiles"),
        }
    }
}

impl Default for Python {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAdapter for Python {
    fn start_command(&self) -> &str {
        "python -i -q -u"
    }

    /// Active-line prints are only injected for flat blocks; inserting a
    /// top-level statement inside an indented suite would end it early in
    /// the REPL. The end marker print always goes last, after a blank line
    /// that closes any pending suite.
    fn preprocess(&self, code: &str) -> String {
        let flat = code
            .lines()
            .all(|line| !line.starts_with(' ') && !line.starts_with('\t'));
        let mut out = String::new();
        for (idx, line) in code.lines().enumerate() {
            if flat && !line.trim().is_empty() {
                out.push_str(&format!(
                    "print(\"{}{}{}\")\n",
                    ACTIVE_LINE_PREFIX,
                    idx + 1,
                    ACTIVE_LINE_SUFFIX
                ));
            }
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&format!("\nprint(\"{}\")", END_OF_EXECUTION_MARKER));
        out
    }

    fn detect_active_line(&self, line: &str) -> Option<usize> {
        parse_active_line(line)
    }

    fn detect_end_of_execution(&self, line: &str) -> bool {
        line.contains(END_OF_EXECUTION_MARKER)
    }

    fn postprocess_line(&self, line: &str) -> Option<String> {
        if self.prompt_echo.is_match(line) {
            return None;
        }
        Some(line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_code_gets_active_line_prints() {
        let python = Python::new();
        let code = python.preprocess("x = 1\ny = 2");
        assert!(code.contains("print(\"##active_line:1##\")\nx = 1"));
        assert!(code.contains("print(\"##active_line:2##\")\ny = 2"));
        assert!(code.ends_with("print(\"##end_of_execution##\")"));
    }

    #[test]
    fn indented_code_skips_active_line_prints() {
        let python = Python::new();
        let code = python.preprocess("for i in range(3):\n    print(i)");
        assert!(!code.contains(ACTIVE_LINE_PREFIX));
        assert!(code.contains("for i in range(3):\n    print(i)\n"));
        assert!(code.ends_with("print(\"##end_of_execution##\")"));
    }

    #[test]
    fn prompt_echo_lines_are_discarded() {
        let python = Python::new();
        assert_eq!(python.postprocess_line(">>> print(1)"), None);
        assert_eq!(python.postprocess_line("... body"), None);
        assert_eq!(python.postprocess_line(">>> "), None);
        assert_eq!(
            python.postprocess_line("plain"),
            Some("plain".to_string())
        );
    }

    #[test]
    fn empty_line_is_kept_as_empty() {
        let python = Python::new();
        assert_eq!(python.postprocess_line(""), Some(String::new()));
    }
}
