//! Error taxonomy shared by every stage of paradigm loading and compilation.
//!
//! Structural problems (an unknown block, an unmapped pin, a repeat count below one, a missing
//! column) are [`ParadigmError::Configuration`]; a cell that cannot be read as a number, ratio or
//! count is [`ParadigmError::Format`]. File system and CSV framing failures carry the offending
//! path or table name. Errors are never recovered from inside the crate: a malformed schedule must
//! not turn into a partially wrong hardware program.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParadigmError {
    /// Structurally invalid paradigm
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Cell value that could not be parsed
    #[error("format error: {0}")]
    Format(String),

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed table {source_name}: {source}")]
    Csv {
        source_name: String,
        #[source]
        source: csv::Error,
    },
}

impl ParadigmError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        ParadigmError::Configuration(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        ParadigmError::Format(msg.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, ParadigmError::Configuration(_))
    }

    pub fn is_format(&self) -> bool {
        matches!(self, ParadigmError::Format(_))
    }
}

pub type Result<T> = std::result::Result<T, ParadigmError>;
