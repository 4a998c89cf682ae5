//! The `file|line` prefix attached to user-visible diagnostics (`spec.md` §7).

use std::fmt;
use std::path::{Path, PathBuf};

/// Where in a Bubfile or options file a declaration came from.
///
/// `Origin` is attached to `ConfigError`, `RuleViolation`, and
/// `UnknownEntity` so that every fatal planning error can be printed as
/// `<path>|<line>| ERROR: <message>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub file: PathBuf,
    pub line: u32,
}

impl Origin {
    pub fn new(file: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    pub fn unknown() -> Self {
        Self {
            file: Path::new("<unknown>").to_path_buf(),
            line: 0,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|", self.file.display(), self.line)
    }
}

/// Render a diagnostic with the `<path>|<line>| ERROR: ` prefix required by
/// `spec.md` §7.
pub fn render_error(origin: &Origin, message: impl fmt::Display) -> String {
    format!("{origin} ERROR: {message}")
}
