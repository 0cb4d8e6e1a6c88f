//! Shell adapter

use super::{
    parse_active_line, LanguageAdapter, ACTIVE_LINE_PREFIX, ACTIVE_LINE_SUFFIX,
    END_OF_EXECUTION_MARKER,
};

pub struct Shell;

impl LanguageAdapter for Shell {
    fn start_command(&self) -> &str {
        "bash"
    }

    /// Echo an active-line marker before each line and the end marker after
    /// the block. Marker echoes inside multi-line constructs (heredocs,
    /// quoted blocks) will corrupt them; callers submitting those should
    /// keep them to a single line.
    fn preprocess(&self, code: &str) -> String {
        let mut out = String::new();
        for (idx, line) in code.lines().enumerate() {
            out.push_str(&format!(
                "echo \"{}{}{}\"\n",
                ACTIVE_LINE_PREFIX,
                idx + 1,
                ACTIVE_LINE_SUFFIX
            ));
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&format!("echo \"{}\"", END_OF_EXECUTION_MARKER));
        out
    }

    fn detect_active_line(&self, line: &str) -> Option<usize> {
        parse_active_line(line)
    }

    fn detect_end_of_execution(&self, line: &str) -> bool {
        line.contains(END_OF_EXECUTION_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprocess_interleaves_markers_and_appends_end() {
        let shell = Shell;
        let code = shell.preprocess("echo one\necho two");
        let lines: Vec<&str> = code.lines().collect();
        assert_eq!(
            lines,
            vec![
                "echo \"##active_line:1##\"",
                "echo one",
                "echo \"##active_line:2##\"",
                "echo two",
                "echo \"##end_of_execution##\"",
            ]
        );
    }

    #[test]
    fn detects_its_own_markers() {
        let shell = Shell;
        assert_eq!(shell.detect_active_line("##active_line:2##"), Some(2));
        assert!(shell.detect_end_of_execution("##end_of_execution##"));
        assert!(!shell.detect_end_of_execution("echo done"));
    }
}
