use std::path::PathBuf;

use glob::Pattern;
use serde::Deserialize;

use crate::error::{ParadigmError, Result};

fn default_blocks_pattern() -> String {
    ".csv".to_string()
}

/// Where a paradigm's blocks live. Handed to [`BlockLibrary::discover`] and
/// [`Paradigm::load`] explicitly; callers embedding it in their own configuration files can
/// deserialize it with serde.
///
/// `blocks_pattern` is either a glob over file names (`*.csv`, `block_*.csv`, `train?.csv`) or,
/// when it has no glob metacharacters, a plain file name suffix (`.csv`).
///
/// [`BlockLibrary::discover`]: crate::library::BlockLibrary::discover
/// [`Paradigm::load`]: crate::paradigm::Paradigm::load
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ParadigmConfig {
    pub blocks_folder: PathBuf,
    #[serde(default = "default_blocks_pattern")]
    pub blocks_pattern: String,
}

impl ParadigmConfig {
    pub fn new(blocks_folder: impl Into<PathBuf>) -> Self {
        Self {
            blocks_folder: blocks_folder.into(),
            blocks_pattern: default_blocks_pattern(),
        }
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.blocks_pattern = pattern.to_string();
        self
    }

    /// File name pattern a block file must match. A plain suffix `s` becomes the glob `*s`.
    pub fn blocks_glob(&self) -> Result<Pattern> {
        let pattern = &self.blocks_pattern;
        let glob = if pattern.contains(&['*', '?', '['][..]) {
            pattern.clone()
        } else {
            format!("*{}", Pattern::escape(pattern))
        };
        Pattern::new(&glob).map_err(|err| {
            ParadigmError::configuration(format!(
                "Invalid blocks pattern {:?}: {}",
                pattern, err
            ))
        })
    }
}
