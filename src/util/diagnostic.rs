//! User-friendly diagnostic messages.
//!
//! Every error reported at the command boundary carries its root cause,
//! the facts that led to it, and what the user can do next.

use std::fmt;
use std::path::PathBuf;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when a name is not registered.
    pub const LIST_ENTRIES: &str = "Run `mpienv list` to see registered MPI installations";

    /// Suggestion when an entry's target has been deleted.
    pub const REMOVE_BROKEN: &str = "Remove the stale entry with `mpienv rm <name>`";

    /// Suggestion when no entry is active.
    pub const ACTIVATE: &str = "Run `mpienv use <name>` and make sure the shim `bin` directory is first on PATH";

    /// Suggestion when mutating the active entry.
    pub const SWITCH_FIRST: &str = "Switch to another installation with `mpienv use <name>` first";

    /// Suggestion when a name is already taken.
    pub const PICK_NAME: &str = "Choose another name with `--name <name>`";
}

const RED: &str = "\x1b[1;31m";
const GREEN: &str = "\x1b[1;32m";
const RESET: &str = "\x1b[0m";

/// An error report with the facts behind it and hints for the user.
#[derive(Debug, Clone, Default)]
pub struct Diagnostic {
    pub message: String,
    /// Registry entry or prefix involved, if any.
    pub location: Option<PathBuf>,
    pub context: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Render for a terminal, one line per fact.
    pub fn format(&self, color: bool) -> String {
        let paint = |code: &str, text: &str| {
            if color {
                format!("{}{}{}", code, text, RESET)
            } else {
                text.to_string()
            }
        };

        let mut output = format!("{}: {}\n", paint(RED, "error"), self.message);
        if let Some(path) = &self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }
        for line in &self.context {
            output.push_str(&format!("  | {}\n", line));
        }
        for suggestion in &self.suggestions {
            output.push_str(&format!("{}: {}\n", paint(GREEN, "help"), suggestion));
        }
        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}
