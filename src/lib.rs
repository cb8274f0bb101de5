//! # Paradigm compiler backend
//!
//! Compiles an insect-behaviour experiment paradigm into a flat table of absolute-time pin events.
//! A paradigm consists of
//! 1. a [pin mapping](mapping) naming the hardware pins,
//! 2. a library of reusable [blocks](block), each a table of pin events relative to its own start,
//! 3. a [program](program) sequencing blocks with repeat counts and optional start offsets.
//!
//! [`compiler::compile`] expands the program into an [`EventTable`]. From there a [`Board`]
//! samples the events on a tick grid or turns them into a chronological feed of pin writes.
//!
//! Times are minutes (decimal or `numerator/denominator`) in the input files and seconds
//! everywhere else.

pub mod block;
pub mod board;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod error;
pub mod event;
pub mod library;
pub mod mapping;
pub mod paradigm;
pub mod program;
#[cfg(feature = "python")]
pub mod python;
pub mod table;
pub mod timeline;
pub mod utils;

pub use block::{Block, BlockRow};
pub use board::{Board, PinSink, PinWrite, RecordingSink};
pub use cache::RowCache;
pub use compiler::compile;
pub use config::ParadigmConfig;
pub use error::{ParadigmError, Result};
pub use event::{CompiledEvent, EventTable};
pub use library::{BlockLibrary, BlockSource};
pub use mapping::{PinId, PinMapping, PinRecord};
pub use paradigm::Paradigm;
pub use program::{Program, ProgramRow, ResolvedRow};

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn pdcompiler_backend(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<python::PyParadigm>()?;
    Ok(())
}
