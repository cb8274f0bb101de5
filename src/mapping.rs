//! Pin mapping: the table binding physical controller pins to logical names.
//!
//! Every row is keyed by a unique `pin_id`. The optional `name` column gives the logical name
//! (e.g. `ODOUR_A_LEFT`); any other column (`pin_number`, `pin_group`, `x`, `y`, ...) is kept as
//! ordered descriptive metadata. Blocks refer to pins by `pin_id` only; whether every referenced pin
//! exists is checked when a paradigm is compiled, not here.

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{ParadigmError, Result};
use crate::table::Table;

/// Identifier of a physical pin. Numeric ids keep their textual form (`"13"`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinId(String);

impl PinId {
    pub fn new(id: impl Into<String>) -> Self {
        PinId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PinId {
    fn from(id: &str) -> Self {
        PinId(id.to_string())
    }
}

impl From<u32> for PinId {
    fn from(id: u32) -> Self {
        PinId(id.to_string())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PinRecord {
    pub pin_id: PinId,
    pub name: Option<String>,
    pub metadata: IndexMap<String, String>,
}

impl PinRecord {
    pub fn new(pin_id: impl Into<PinId>, name: Option<&str>) -> Self {
        Self {
            pin_id: pin_id.into(),
            name: name.map(|n| n.to_string()),
            metadata: IndexMap::new(),
        }
    }

    /// Board pin number from the `pin_number` metadata column, if present and numeric
    pub fn pin_number(&self) -> Option<u32> {
        self.metadata
            .get("pin_number")
            .and_then(|n| n.parse::<u32>().ok())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PinMapping {
    pins: IndexMap<PinId, PinRecord>,
}

const RESERVED_COLUMNS: [&str; 2] = ["pin_id", "name"];

impl PinMapping {
    /// Builds a mapping from records, rejecting duplicated pin ids.
    ///
    /// ```
    /// use pdcompiler_backend::mapping::*;
    ///
    /// let mapping = PinMapping::from_records(vec![
    ///     PinRecord::new(1u32, Some("led_a")),
    ///     PinRecord::new(2u32, Some("led_b")),
    /// ]).unwrap();
    /// assert!(mapping.contains(&PinId::from(2u32)));
    ///
    /// // Pin 1 twice
    /// assert!(PinMapping::from_records(vec![
    ///     PinRecord::new(1u32, None),
    ///     PinRecord::new(1u32, None),
    /// ]).is_err());
    /// ```
    pub fn from_records(records: impl IntoIterator<Item = PinRecord>) -> Result<Self> {
        let mut pins = IndexMap::new();
        for record in records {
            if pins.contains_key(&record.pin_id) {
                return Err(ParadigmError::configuration(format!(
                    "Pin {} is declared more than once in the pin mapping",
                    record.pin_id
                )));
            }
            pins.insert(record.pin_id.clone(), record);
        }
        Ok(Self { pins })
    }

    pub fn from_table(table: &Table) -> Result<Self> {
        let pin_col = table.require_column("pin_id")?;
        let name_col = table.column_index("name");

        let mut records = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let pin_id = table.cell(row, Some(pin_col)).ok_or_else(|| {
                ParadigmError::configuration(format!(
                    "Row {} of pin mapping {} has no pin_id",
                    row + 1,
                    table.source_name()
                ))
            })?;
            let metadata = table
                .extra_cells(row, &RESERVED_COLUMNS)
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            records.push(PinRecord {
                pin_id: PinId::from(pin_id),
                name: table.cell(row, name_col).map(|n| n.to_string()),
                metadata,
            });
        }
        let mapping = Self::from_records(records)?;
        debug!(
            "Read pin mapping {} with {} pins",
            table.source_name(),
            mapping.len()
        );
        Ok(mapping)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_table(&Table::read_path(path)?)
    }

    pub fn contains(&self, pin_id: &PinId) -> bool {
        self.pins.contains_key(pin_id)
    }

    pub fn get(&self, pin_id: &PinId) -> Option<&PinRecord> {
        self.pins.get(pin_id)
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PinRecord> {
        self.pins.values()
    }

    pub fn pin_ids(&self) -> impl Iterator<Item = &PinId> {
        self.pins.keys()
    }
}
