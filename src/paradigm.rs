//! Ties the inputs of one experiment together: pin mapping, block library and program.
//!
//! [`Paradigm`] owns its inputs and the result of the last [`Paradigm::compile`]. Compiling again
//! replaces that result; the inputs are never modified.

use std::path::Path;

use tracing::info;

use crate::board::Board;
use crate::compiler;
use crate::config::ParadigmConfig;
use crate::error::{ParadigmError, Result};
use crate::event::EventTable;
use crate::library::{BlockLibrary, BlockSource};
use crate::mapping::PinMapping;
use crate::program::{Program, ResolvedRow};

#[derive(Debug)]
pub struct Paradigm<S = BlockLibrary> {
    mapping: PinMapping,
    library: S,
    program: Program,
    compiled: Option<EventTable>,
}

impl Paradigm<BlockLibrary> {
    /// Reads the mapping and program files and discovers the blocks described by `config`
    pub fn load(config: &ParadigmConfig, mapping_path: &Path, program_path: &Path) -> Result<Self> {
        let mapping = PinMapping::load(mapping_path)?;
        let library = BlockLibrary::discover(config)?;
        let program = Program::load(program_path)?;
        info!(
            "Loaded paradigm {} with {} pins, {} blocks and {} program rows",
            program_path.display(),
            mapping.len(),
            library.len(),
            program.len()
        );
        Ok(Self::new(mapping, library, program))
    }
}

impl<S: BlockSource> Paradigm<S> {
    pub fn new(mapping: PinMapping, library: S, program: Program) -> Self {
        Self {
            mapping,
            library,
            program,
            compiled: None,
        }
    }

    pub fn mapping(&self) -> &PinMapping {
        &self.mapping
    }

    pub fn library(&self) -> &S {
        &self.library
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The program with every start resolved and every row end computed
    pub fn overview(&self) -> Result<Vec<ResolvedRow>> {
        self.program.resolve()
    }

    /// End of the last program row, i.e. the nominal length of the paradigm
    pub fn duration(&self) -> Result<f64> {
        Ok(self
            .overview()?
            .iter()
            .map(|row| row.end)
            .fold(0., f64::max))
    }

    pub fn compile(&mut self) -> Result<&EventTable> {
        let table = compiler::compile(&self.mapping, &self.library, &self.program)?;
        Ok(&*self.compiled.insert(table))
    }

    /// Result of the last successful [`Paradigm::compile`]
    pub fn compiled(&self) -> Option<&EventTable> {
        self.compiled.as_ref()
    }

    /// Books the compiled events on a new board and compiles it up to `stop_time`
    /// (the paradigm duration when `None`).
    pub fn board(&self, name: &str, samp_rate: f64, stop_time: Option<f64>) -> Result<Board> {
        let table = self.compiled.as_ref().ok_or_else(|| {
            ParadigmError::configuration(format!(
                "Board {} requested before the paradigm was compiled",
                name
            ))
        })?;
        let mut board = Board::from_mapping(name, &self.mapping, samp_rate)?;
        board.load_events(table)?;
        let stop_time = match stop_time {
            Some(t) => t,
            None => self.duration()?.max(board.last_instr_end_time()),
        };
        board.compile(Some(stop_time))?;
        Ok(board)
    }
}
