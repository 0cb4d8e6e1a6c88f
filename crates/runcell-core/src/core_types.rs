//! Core data types shared across the engine

use serde::{Deserialize, Serialize};

/// One unit of interpreter output delivered to the caller.
///
/// Events arrive in the order the driver observed them. Within one source
/// stream (stdout or stderr) line order is preserved; across the two streams
/// no ordering is guaranteed. `ActiveLine { active_line: None }` signals that
/// the submitted code block finished executing; the event stream ends shortly
/// after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputEvent {
    /// A line of textual output, with the trailing newline stripped.
    Output { output: String },
    /// The source line currently executing, or `None` once execution ended.
    ActiveLine { active_line: Option<usize> },
}

impl OutputEvent {
    pub fn output(text: impl Into<String>) -> Self {
        OutputEvent::Output {
            output: text.into(),
        }
    }

    pub fn active_line(line: Option<usize>) -> Self {
        OutputEvent::ActiveLine { active_line: line }
    }

    /// Whether this is the completion marker (`ActiveLine(None)`).
    pub fn is_completion_marker(&self) -> bool {
        matches!(self, OutputEvent::ActiveLine { active_line: None })
    }
}
