//! Python exposure of [`Paradigm`], built with the `python` feature.
//!
//! ```python
//! from pdcompiler_backend import Paradigm
//!
//! paradigm = Paradigm("mapping.csv", "program.csv", "blocks/")
//! n_events = paradigm.compile()
//! starts, ends = paradigm.starts(), paradigm.ends()
//! paradigm.write_csv("results/paradigm.csv")
//! ```

use std::path::PathBuf;

use numpy::{IntoPyArray, PyArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::ParadigmConfig;
use crate::error::ParadigmError;
use crate::event::EventTable;
use crate::paradigm::Paradigm;

impl From<ParadigmError> for PyErr {
    fn from(err: ParadigmError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

#[pyclass(name = "Paradigm")]
pub struct PyParadigm {
    paradigm: Paradigm,
}

impl PyParadigm {
    fn table(&self) -> PyResult<&EventTable> {
        self.paradigm
            .compiled()
            .ok_or_else(|| PyValueError::new_err("Paradigm has not been compiled yet"))
    }
}

#[pymethods]
impl PyParadigm {
    #[new]
    #[pyo3(signature = (mapping_path, program_path, blocks_folder, blocks_pattern = None))]
    pub fn new(
        mapping_path: PathBuf,
        program_path: PathBuf,
        blocks_folder: PathBuf,
        blocks_pattern: Option<&str>,
    ) -> PyResult<Self> {
        let mut config = ParadigmConfig::new(blocks_folder);
        if let Some(pattern) = blocks_pattern {
            config = config.with_pattern(pattern);
        }
        let paradigm = Paradigm::load(&config, &mapping_path, &program_path)?;
        Ok(Self { paradigm })
    }

    /// Compiles the paradigm and returns the number of events
    pub fn compile(&mut self) -> PyResult<usize> {
        Ok(self.paradigm.compile()?.len())
    }

    pub fn is_compiled(&self) -> bool {
        self.paradigm.compiled().is_some()
    }

    pub fn duration(&self) -> PyResult<f64> {
        Ok(self.paradigm.duration()?)
    }

    pub fn stop_time(&self) -> PyResult<f64> {
        Ok(self.table()?.stop_time())
    }

    pub fn starts<'py>(&self, py: Python<'py>) -> PyResult<&'py PyArray1<f64>> {
        Ok(self.table()?.start_column().into_pyarray(py))
    }

    pub fn ends<'py>(&self, py: Python<'py>) -> PyResult<&'py PyArray1<f64>> {
        Ok(self.table()?.end_column().into_pyarray(py))
    }

    pub fn pin_ids(&self) -> PyResult<Vec<String>> {
        Ok(self
            .table()?
            .iter()
            .map(|ev| ev.pin_id.to_string())
            .collect())
    }

    pub fn blocks(&self) -> PyResult<Vec<String>> {
        Ok(self.table()?.iter().map(|ev| ev.block.clone()).collect())
    }

    pub fn iterations(&self) -> PyResult<Vec<usize>> {
        Ok(self.table()?.iter().map(|ev| ev.iteration).collect())
    }

    /// Saves a copy of the compiled paradigm as CSV
    pub fn write_csv(&self, path: PathBuf) -> PyResult<()> {
        Ok(self.table()?.write_csv(&path)?)
    }
}
