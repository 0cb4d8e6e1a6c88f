//! Language adapters
//!
//! Per-language hooks the driver runs around a submission: rewrite the code
//! before it is written to the interpreter (marker injection happens here),
//! then recognize those markers and clean up echo noise in the raw output.
//! All hooks are pure functions over single lines or whole blocks.

use std::sync::Arc;

use crate::errors::RuncellError;

mod python;
mod shell;

pub use python::Python;
pub use shell::Shell;

/// Marker wrapped around the 1-based number of the line about to execute.
pub(crate) const ACTIVE_LINE_PREFIX: &str = "##active_line:";
pub(crate) const ACTIVE_LINE_SUFFIX: &str = "##";
/// Token whose appearance in output means the submitted block finished.
pub(crate) const END_OF_EXECUTION_MARKER: &str = "##end_of_execution##";

pub trait LanguageAdapter: Send + Sync {
    /// Command line that starts the local interpreter process.
    fn start_command(&self) -> &str;

    /// Rewrite a code block before submission.
    fn preprocess(&self, code: &str) -> String;

    /// Source line currently executing, when `line` is an active-line marker.
    fn detect_active_line(&self, _line: &str) -> Option<usize> {
        None
    }

    /// Whether `line` is the end-of-execution marker.
    fn detect_end_of_execution(&self, _line: &str) -> bool {
        false
    }

    /// Clean up a raw output line; `None` discards the line entirely.
    fn postprocess_line(&self, line: &str) -> Option<String> {
        Some(line.to_string())
    }
}

impl std::fmt::Debug for dyn LanguageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageAdapter").finish()
    }
}

/// Look up the adapter for a language name, case-insensitively.
pub fn adapter_for(language: &str) -> Result<Arc<dyn LanguageAdapter>, RuncellError> {
    match language.to_lowercase().as_str() {
        "shell" | "bash" | "sh" => Ok(Arc::new(Shell)),
        "python" | "python3" => Ok(Arc::new(Python::new())),
        other => Err(RuncellError::UnsupportedLanguage(other.to_string())),
    }
}

/// Parse the line number out of an active-line marker, if `line` is one.
pub(crate) fn parse_active_line(line: &str) -> Option<usize> {
    let start = line.find(ACTIVE_LINE_PREFIX)? + ACTIVE_LINE_PREFIX.len();
    let rest = &line[start..];
    let end = rest.find(ACTIVE_LINE_SUFFIX)?;
    rest[..end].parse().ok()
}
