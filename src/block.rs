//! Blocks: named, reusable tables of pin events in block-relative time.
//!
//! A block describes one repetition of an experimental phase (a training cycle, a test, a clean-air
//! interval). Its rows are relative to the start of repetition 0; placing them on the absolute
//! timeline is the job of the [compiler](crate::compiler).
//!
//! Time columns (`start`, `end`, `on`, `off`, `duration`) are minutes in the file, written as plain
//! decimals or `numerator/denominator` ratios, and seconds once loaded. `value` is the output level
//! (1.0 when absent). Any further column is carried through to the compiled events untouched.

use std::path::Path;

use indexmap::IndexMap;
use maplit::hashset;

use crate::error::{ParadigmError, Result};
use crate::mapping::{PinId, PinMapping};
use crate::table::Table;
use crate::utils::{parse_time_cell, parse_value_cell};

/// One pin event of a block. All times in seconds relative to the block's own zero.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockRow {
    pub pin_id: PinId,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub on: Option<f64>,
    pub off: Option<f64>,
    pub duration: Option<f64>,
    pub value: Option<f64>,
    pub attrs: IndexMap<String, String>,
}

impl BlockRow {
    /// A constant event on `pin_id` between `start` and `end` (seconds)
    pub fn new(pin_id: impl Into<PinId>, start: f64, end: f64) -> Self {
        Self {
            pin_id: pin_id.into(),
            start: Some(start),
            end: Some(end),
            on: None,
            off: None,
            duration: None,
            value: None,
            attrs: IndexMap::new(),
        }
    }

    /// Adds a duty cycle: high for `on` seconds, low for `off` seconds
    pub fn with_duty_cycle(mut self, on: f64, off: f64) -> Self {
        self.on = Some(on);
        self.off = Some(off);
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// `Some((on, off))` for blinking/PWM rows, `None` for constant ones
    pub fn duty_cycle(&self) -> Option<(f64, f64)> {
        match (self.on, self.off) {
            (Some(on), Some(off)) => Some((on, off)),
            _ => None,
        }
    }

    fn validate(&self, block: &str, row: usize) -> Result<()> {
        let times = [
            ("start", self.start),
            ("end", self.end),
            ("on", self.on),
            ("off", self.off),
            ("duration", self.duration),
        ];
        for (field, value) in times {
            if let Some(value) = value.filter(|v| !v.is_finite()) {
                return Err(ParadigmError::configuration(format!(
                    "Block {} row {}: {} is {} [s], expected a finite time",
                    block, row, field, value
                )));
            }
        }
        if let Some(value) = self.value.filter(|v| !v.is_finite()) {
            return Err(ParadigmError::configuration(format!(
                "Block {} row {}: value {} is not finite",
                block, row, value
            )));
        }
        match (self.on, self.off) {
            (None, None) => {}
            (Some(on), Some(off)) => {
                if on < 0. || off < 0. || on + off <= 0. {
                    return Err(ParadigmError::configuration(format!(
                        "Block {} row {}: duty cycle on={} off={} [s] must be non-negative with a positive period",
                        block, row, on, off
                    )));
                }
            }
            _ => {
                return Err(ParadigmError::configuration(format!(
                    "Block {} row {}: one of on or off is defined, but not both",
                    block, row
                )))
            }
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if end < start {
                return Err(ParadigmError::configuration(format!(
                    "Block {} row {}: end {} [s] precedes start {} [s]",
                    block, row, end, start
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    name: String,
    rows: Vec<BlockRow>,
}

impl Block {
    pub fn new(name: &str, rows: Vec<BlockRow>) -> Result<Self> {
        for (i, row) in rows.iter().enumerate() {
            row.validate(name, i + 1)?;
        }
        Ok(Self {
            name: name.to_string(),
            rows,
        })
    }

    pub fn from_table(name: &str, table: &Table) -> Result<Self> {
        let reserved = hashset! {"pin_id", "start", "end", "on", "off", "duration", "value"};
        let pin_col = table.require_column("pin_id")?;
        let time_col = |field| table.column_index(field);
        let (start_col, end_col, on_col, off_col, duration_col, value_col) = (
            time_col("start"),
            time_col("end"),
            time_col("on"),
            time_col("off"),
            time_col("duration"),
            time_col("value"),
        );
        let extra_columns: Vec<&str> = table
            .headers()
            .iter()
            .map(|h| h.as_str())
            .filter(|h| !reserved.contains(h))
            .collect();

        let mut rows = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let pin_id = table.cell(row, Some(pin_col)).ok_or_else(|| {
                ParadigmError::configuration(format!(
                    "Block {} row {} has no pin_id",
                    name,
                    row + 1
                ))
            })?;
            let attrs = extra_columns
                .iter()
                .filter_map(|&h| {
                    table
                        .cell(row, table.column_index(h))
                        .map(|cell| (h.to_string(), cell.to_string()))
                })
                .collect();
            rows.push(BlockRow {
                pin_id: PinId::from(pin_id),
                start: parse_time_cell(table.cell(row, start_col))?,
                end: parse_time_cell(table.cell(row, end_col))?,
                on: parse_time_cell(table.cell(row, on_col))?,
                off: parse_time_cell(table.cell(row, off_col))?,
                duration: parse_time_cell(table.cell(row, duration_col))?,
                value: parse_value_cell(table.cell(row, value_col))?,
                attrs,
            });
        }
        Self::new(name, rows)
    }

    pub fn load(name: &str, path: &Path) -> Result<Self> {
        Self::from_table(name, &Table::read_path(path)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> &[BlockRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The block's own idea of one repetition's length: the largest `duration` cell
    pub fn nominal_duration(&self) -> Option<f64> {
        self.rows
            .iter()
            .filter_map(|row| row.duration)
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))))
    }

    /// Every pin used by the block must exist in `mapping`
    pub fn check_pins(&self, mapping: &PinMapping) -> Result<()> {
        match self.rows.iter().find(|row| !mapping.contains(&row.pin_id)) {
            Some(row) => Err(ParadigmError::configuration(format!(
                "Block {} uses pin {} which is not in the pin mapping. Mapped pins are {:?}",
                self.name,
                row.pin_id,
                mapping.pin_ids().map(|p| p.as_str()).collect::<Vec<_>>()
            ))),
            None => Ok(()),
        }
    }
}
