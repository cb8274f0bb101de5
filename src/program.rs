//! The top-level program: an ordered sequence of block invocations.
//!
//! Each row names a block, how long one repetition lasts and how many times it repeats. The start
//! may be left blank (or `NaN`), meaning "right after the previous row". [`Program::resolve`]
//! turns the rows into [`ResolvedRow`]s with every start filled in and the row's overall end
//! computed; this resolved form is what the compiler expands.

use std::path::Path;

use tracing::debug;

use crate::error::{ParadigmError, Result};
use crate::table::Table;
use crate::utils::{parse_count_cell, parse_time_cell};

/// One line of the program file, times in seconds
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramRow {
    pub block: String,
    pub start: Option<f64>,
    pub duration: f64,
    pub times: i64,
}

impl ProgramRow {
    pub fn new(block: &str, start: Option<f64>, duration: f64, times: i64) -> Self {
        Self {
            block: block.to_string(),
            start,
            duration,
            times,
        }
    }
}

/// A program row with its start resolved and its end derived
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedRow {
    pub block: String,
    pub start: f64,
    pub duration: f64,
    pub times: usize,
    /// `start + duration * times`
    pub end: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    rows: Vec<ProgramRow>,
}

impl Program {
    pub fn new(rows: Vec<ProgramRow>) -> Self {
        Self { rows }
    }

    pub fn from_table(table: &Table) -> Result<Self> {
        let block_col = table.require_column("block")?;
        let duration_col = table.require_column("duration")?;
        let times_col = table.require_column("times")?;
        let start_col = table.column_index("start");

        let missing = |row: usize, field: &str| {
            ParadigmError::configuration(format!(
                "Program {} row {} has no {}",
                table.source_name(),
                row + 1,
                field
            ))
        };

        let mut rows = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let block = table
                .cell(row, Some(block_col))
                .ok_or_else(|| missing(row, "block"))?;
            let duration = parse_time_cell(table.cell(row, Some(duration_col)))?
                .ok_or_else(|| missing(row, "duration"))?;
            let times = parse_count_cell(
                table
                    .cell(row, Some(times_col))
                    .ok_or_else(|| missing(row, "times"))?,
            )?;
            rows.push(ProgramRow {
                block: block.to_string(),
                start: parse_time_cell(table.cell(row, start_col))?,
                duration,
                times,
            });
        }
        debug!(
            "Read program {} with {} rows",
            table.source_name(),
            rows.len()
        );
        Ok(Self { rows })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_table(&Table::read_path(path)?)
    }

    pub fn rows(&self) -> &[ProgramRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct block names in order of first use
    pub fn block_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for row in &self.rows {
            if !names.contains(&row.block.as_str()) {
                names.push(&row.block);
            }
        }
        names
    }

    /// Validates repeat counts and durations, then fills in missing starts left to right.
    ///
    /// A row without a start (or with a `NaN` start) begins where the previous row ends
    /// (`previous.start + previous.duration * previous.times`); the first row defaults to 0.
    ///
    /// ```
    /// use pdcompiler_backend::program::*;
    ///
    /// let program = Program::new(vec![
    ///     ProgramRow::new("test", Some(0.), 10., 2),
    ///     ProgramRow::new("train", None, 5., 3),
    /// ]);
    /// let resolved = program.resolve().unwrap();
    /// assert_eq!(resolved[1].start, 20.);
    /// assert_eq!(resolved[1].end, 35.);
    /// ```
    pub fn resolve(&self) -> Result<Vec<ResolvedRow>> {
        let mut resolved: Vec<ResolvedRow> = Vec::with_capacity(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            if row.times < 1 {
                return Err(ParadigmError::configuration(format!(
                    "Program row {} (block {}) repeats {} times, expected at least once",
                    i + 1,
                    row.block,
                    row.times
                )));
            }
            if row.duration.is_nan() || row.duration <= 0. {
                return Err(ParadigmError::configuration(format!(
                    "Program row {} (block {}) has duration {} [s], expected a positive duration",
                    i + 1,
                    row.block,
                    row.duration
                )));
            }
            let start = match row.start {
                Some(start) if !start.is_nan() => start,
                _ => resolved.last().map_or(0., |prev| prev.end),
            };
            if !start.is_finite() || !row.duration.is_finite() {
                return Err(ParadigmError::configuration(format!(
                    "Program row {} (block {}) starts at {} [s] for {} [s], expected finite times",
                    i + 1,
                    row.block,
                    start,
                    row.duration
                )));
            }
            let times = row.times as usize;
            resolved.push(ResolvedRow {
                block: row.block.clone(),
                start,
                duration: row.duration,
                times,
                end: start + row.duration * times as f64,
            });
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(text: &str) -> Result<Program> {
        Program::from_table(&Table::parse_str("program", text).unwrap())
    }

    #[test]
    fn sequential_start_resolution() {
        let program = Program::new(vec![
            ProgramRow::new("a", Some(0.), 10., 2),
            ProgramRow::new("b", None, 5., 3),
            ProgramRow::new("c", None, 1., 1),
        ]);
        let resolved = program.resolve().unwrap();
        assert_eq!(resolved[0].end, 20.);
        assert_eq!(resolved[1].start, 20.);
        assert_eq!(resolved[1].end, 35.);
        assert_eq!(resolved[2].start, 35.);
        assert_eq!(resolved[2].end, 36.);
    }

    #[test]
    fn nan_start_is_unset() {
        let resolved = Program::new(vec![
            ProgramRow::new("a", Some(0.), 10., 2),
            ProgramRow::new("b", Some(f64::NAN), 5., 3),
        ])
        .resolve()
        .unwrap();
        assert_eq!(resolved[1].start, 20.);
        assert_eq!(resolved[1].end, 35.);
    }

    #[test]
    fn infinite_times_are_rejected() {
        for row in [
            ProgramRow::new("a", Some(f64::INFINITY), 1., 1),
            ProgramRow::new("a", None, f64::INFINITY, 1),
        ] {
            let err = Program::new(vec![row]).resolve().unwrap_err();
            assert!(err.is_configuration());
        }
    }

    #[test]
    fn first_row_defaults_to_zero() {
        let resolved = Program::new(vec![ProgramRow::new("a", None, 2., 2)])
            .resolve()
            .unwrap();
        assert_eq!(resolved[0].start, 0.);
        assert_eq!(resolved[0].end, 4.);
    }

    #[test]
    fn explicit_start_breaks_the_chain() {
        let resolved = Program::new(vec![
            ProgramRow::new("a", None, 1., 1),
            ProgramRow::new("b", Some(100.), 1., 1),
            ProgramRow::new("c", None, 1., 1),
        ])
        .resolve()
        .unwrap();
        assert_eq!(resolved[2].start, 101.);
    }

    #[test]
    fn reads_minutes_and_blank_starts() {
        let p = program("block,start,duration,times\nclean,0,1/2,1\ntrain,,1,3\ntest,NaN,2,1\n")
            .unwrap();
        assert_eq!(p.rows()[0].duration, 30.);
        assert_eq!(p.rows()[1].start, None);
        assert_eq!(p.rows()[2].start, None);
        let resolved = p.resolve().unwrap();
        assert_eq!(resolved[1].start, 30.);
        assert_eq!(resolved[2].start, 30. + 60. * 3.);
        assert_eq!(p.block_names(), vec!["clean", "train", "test"]);
    }

    #[test]
    fn start_column_is_optional() {
        let p = program("block,duration,times\nclean,1,2\nclean,1,1\n").unwrap();
        let resolved = p.resolve().unwrap();
        assert_eq!(resolved[1].start, 120.);
        assert_eq!(p.block_names(), vec!["clean"]);
    }

    #[test]
    fn invalid_times_and_duration() {
        for text in [
            "block,duration,times\na,1,0\n",
            "block,duration,times\na,1,-2\n",
            "block,duration,times\na,0,1\n",
            "block,duration,times\na,-1,1\n",
        ] {
            let err = program(text).unwrap().resolve().unwrap_err();
            assert!(err.is_configuration(), "{}: {}", text, err);
        }
    }

    #[test]
    fn missing_required_fields() {
        assert!(program("block,times\na,1\n").unwrap_err().is_configuration());
        assert!(program("block,duration,times\na,,1\n").unwrap_err().is_configuration());
        assert!(program("block,duration,times\na,1,\n").unwrap_err().is_configuration());
        assert!(program("block,duration,times\na,1,x\n").unwrap_err().is_format());
    }
}
