//! Unit loading errors.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// One problem reported by the script compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: Option<usize>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Renders a diagnostic list one per line.
pub struct Diagnostics<'a>(pub &'a [Diagnostic]);

impl fmt::Display for Diagnostics<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum UnitError {
    #[error("cannot stat unit {location:?}: {source}")]
    Stat {
        location: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read unit {location:?}: {source}")]
    Read {
        location: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to compile {location:?}:\n{}", Diagnostics(.diagnostics))]
    Compile {
        location: PathBuf,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("cannot write artifacts for {location:?}: {message}")]
    Artifact { location: PathBuf, message: String },
}

impl UnitError {
    pub fn location(&self) -> &std::path::Path {
        match self {
            UnitError::Stat { location, .. }
            | UnitError::Read { location, .. }
            | UnitError::Compile { location, .. }
            | UnitError::Artifact { location, .. } => location,
        }
    }

    /// True when the source file no longer exists.
    pub fn is_not_found(&self) -> bool {
        match self {
            UnitError::Stat { source, .. } | UnitError::Read { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}
