//! Block lookup for the compiler.
//!
//! The compiler only needs to ask whether a block exists and to load it by name, so that seam is the
//! [`BlockSource`] trait. [`BlockLibrary`] implements it on top of a directory of block files; an
//! in-memory `IndexMap<String, Block>` implements it for paradigms assembled in code.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::debug;

use crate::block::Block;
use crate::config::ParadigmConfig;
use crate::error::{ParadigmError, Result};

pub trait BlockSource {
    fn has_block(&self, name: &str) -> bool;

    /// Loads the named block. Unknown names are a configuration error.
    fn load_block(&self, name: &str) -> Result<Block>;

    fn block_names(&self) -> Vec<&str>;

    fn assert_has_block(&self, name: &str) -> Result<()> {
        if self.has_block(name) {
            Ok(())
        } else {
            Err(ParadigmError::configuration(format!(
                "Block {} not found. Available blocks are {:?}",
                name,
                self.block_names()
            )))
        }
    }
}

impl BlockSource for IndexMap<String, Block> {
    fn has_block(&self, name: &str) -> bool {
        self.contains_key(name)
    }

    fn load_block(&self, name: &str) -> Result<Block> {
        self.assert_has_block(name)?;
        Ok(self[name].clone())
    }

    fn block_names(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect()
    }
}

/// Blocks discovered in a folder: block name to file path
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockLibrary {
    files: IndexMap<String, PathBuf>,
}

impl BlockLibrary {
    /// Lists `config.blocks_folder` and registers every file matching `config.blocks_pattern`.
    /// A block's name is its file name up to the first `.`, so `train.block.csv` is `train`.
    pub fn discover(config: &ParadigmConfig) -> Result<Self> {
        let folder = &config.blocks_folder;
        let io_err = |source| ParadigmError::Io {
            path: folder.clone(),
            source,
        };
        let pattern = config.blocks_glob()?;

        let mut found: Vec<(String, PathBuf)> = Vec::new();
        for entry in fs::read_dir(folder).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            if !pattern.matches(&file_name) || !entry.path().is_file() {
                continue;
            }
            let name = file_name.split('.').next().unwrap_or_default().to_string();
            if name.is_empty() {
                continue;
            }
            found.push((name, entry.path()));
        }
        // read_dir order is platform dependent
        found.sort();

        let mut files: IndexMap<String, PathBuf> = IndexMap::new();
        for (name, path) in found {
            if let Some(previous) = files.get(&name) {
                return Err(ParadigmError::configuration(format!(
                    "Block name {} is ambiguous: both {} and {} match",
                    name,
                    previous.display(),
                    path.display()
                )));
            }
            files.insert(name, path);
        }
        debug!(
            "Discovered {} blocks in {} matching {}",
            files.len(),
            folder.display(),
            config.blocks_pattern
        );
        Ok(Self { files })
    }

    pub fn from_files(files: IndexMap<String, PathBuf>) -> Self {
        Self { files }
    }

    pub fn path(&self, name: &str) -> Option<&Path> {
        self.files.get(name).map(|p| p.as_path())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl BlockSource for BlockLibrary {
    fn has_block(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    fn load_block(&self, name: &str) -> Result<Block> {
        self.assert_has_block(name)?;
        Block::load(name, &self.files[name])
    }

    fn block_names(&self) -> Vec<&str> {
        self.files.keys().map(|k| k.as_str()).collect()
    }
}
