//! The compiled artefact: a flat table of absolute-time pin events.
//!
//! [`EventTable`] keeps events in compile order (program row, then iteration, then block row).
//! It is not sorted chronologically; callers that need a strictly time-ordered feed
//! use [`EventTable::sorted_by_start`].

use std::fs::File;
use std::io::Write;
use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use ndarray::Array1;

use crate::error::{ParadigmError, Result};
use crate::mapping::PinId;

/// One concrete, single-repetition pin event. Times in seconds from the paradigm start.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledEvent {
    pub pin_id: PinId,
    /// Name of the block this event was expanded from
    pub block: String,
    /// 0-based repetition of the block within its program row
    pub iteration: usize,
    pub start: f64,
    /// Never later than the end of the owning program row
    pub end: f64,
    pub on: Option<f64>,
    pub off: Option<f64>,
    pub duration: Option<f64>,
    pub value: Option<f64>,
    pub attrs: IndexMap<String, String>,
}

impl CompiledEvent {
    /// Output level while the event is active, high (1.0) unless the block says otherwise
    pub fn level(&self) -> f64 {
        self.value.unwrap_or(1.)
    }

    pub fn duty_cycle(&self) -> Option<(f64, f64)> {
        match (self.on, self.off) {
            (Some(on), Some(off)) => Some((on, off)),
            _ => None,
        }
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventTable {
    events: Vec<CompiledEvent>,
}

const FIXED_COLUMNS: [&str; 9] = [
    "pin_id", "block", "iteration", "start", "end", "on", "off", "duration", "value",
];

fn opt_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl EventTable {
    pub fn new(events: Vec<CompiledEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[CompiledEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<CompiledEvent> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CompiledEvent> {
        self.events.iter()
    }

    /// Copy of the table ordered by start time. The sort is stable, so simultaneous events keep
    /// their compile order.
    pub fn sorted_by_start(&self) -> EventTable {
        let mut events = self.events.clone();
        events.sort_by(|a, b| a.start.total_cmp(&b.start));
        EventTable { events }
    }

    /// Latest event end, 0 for an empty table
    pub fn stop_time(&self) -> f64 {
        self.events.iter().map(|ev| ev.end).fold(0., f64::max)
    }

    pub fn events_for_pin<'a>(&'a self, pin_id: &'a PinId) -> impl Iterator<Item = &'a CompiledEvent> {
        self.events.iter().filter(move |ev| &ev.pin_id == pin_id)
    }

    /// Distinct block names in compile order
    pub fn block_names(&self) -> Vec<&str> {
        self.events
            .iter()
            .map(|ev| ev.block.as_str())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn start_column(&self) -> Array1<f64> {
        self.events.iter().map(|ev| ev.start).collect()
    }

    pub fn end_column(&self) -> Array1<f64> {
        self.events.iter().map(|ev| ev.end).collect()
    }

    /// Writes the table as CSV: the fixed event columns followed by the union of all pass-through
    /// attribute columns in order of first appearance.
    pub fn to_writer<W: Write>(&self, writer: W, source_name: &str) -> Result<()> {
        let csv_err = |source| ParadigmError::Csv {
            source_name: source_name.to_string(),
            source,
        };
        let attr_columns: IndexSet<&str> = self
            .events
            .iter()
            .flat_map(|ev| ev.attrs.keys().map(|k| k.as_str()))
            .collect();

        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(FIXED_COLUMNS.iter().copied().chain(attr_columns.iter().copied()))
            .map_err(csv_err)?;
        for ev in &self.events {
            let mut record = vec![
                ev.pin_id.to_string(),
                ev.block.clone(),
                ev.iteration.to_string(),
                ev.start.to_string(),
                ev.end.to_string(),
                opt_cell(ev.on),
                opt_cell(ev.off),
                opt_cell(ev.duration),
                opt_cell(ev.value),
            ];
            record.extend(
                attr_columns
                    .iter()
                    .map(|k| ev.attrs.get(*k).cloned().unwrap_or_default()),
            );
            wtr.write_record(&record).map_err(csv_err)?;
        }
        wtr.flush().map_err(|source| ParadigmError::Io {
            path: source_name.into(),
            source,
        })?;
        Ok(())
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|source| ParadigmError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.to_writer(file, &path.display().to_string())
    }
}

impl<'a> IntoIterator for &'a EventTable {
    type Item = &'a CompiledEvent;
    type IntoIter = std::slice::Iter<'a, CompiledEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(pin: &str, block: &str, start: f64, end: f64) -> CompiledEvent {
        CompiledEvent {
            pin_id: PinId::from(pin),
            block: block.to_string(),
            iteration: 0,
            start,
            end,
            on: None,
            off: None,
            duration: None,
            value: None,
            attrs: IndexMap::new(),
        }
    }

    #[test]
    fn sorting_is_explicit_and_stable() {
        let table = EventTable::new(vec![
            event("2", "b", 60., 90.),
            event("1", "a", 0., 30.),
            event("3", "b", 60., 70.),
        ]);
        // Compile order is kept as is
        assert_eq!(table.events()[0].pin_id.as_str(), "2");
        let sorted = table.sorted_by_start();
        let pins: Vec<&str> = sorted.iter().map(|ev| ev.pin_id.as_str()).collect();
        assert_eq!(pins, vec!["1", "2", "3"]);
        assert_eq!(table.stop_time(), 90.);
        assert_eq!(table.block_names(), vec!["b", "a"]);
    }

    #[test]
    fn columns() {
        let table = EventTable::new(vec![event("1", "a", 0., 30.), event("1", "a", 60., 90.)]);
        assert_eq!(table.start_column(), ndarray::array![0., 60.]);
        assert_eq!(table.end_column(), ndarray::array![30., 90.]);
        assert_eq!(table.events_for_pin(&PinId::from("1")).count(), 2);
        assert_eq!(EventTable::default().stop_time(), 0.);
    }

    #[test]
    fn csv_output_has_attribute_union() {
        let mut a = event("1", "a", 0., 30.);
        a.attrs.insert("mode".to_string(), "pwm".to_string());
        let mut b = event("2", "a", 0., 30.);
        b.on = Some(1.);
        b.off = Some(2.);
        b.attrs.insert("group".to_string(), "left".to_string());
        let table = EventTable::new(vec![a, b]);

        let mut buf = Vec::new();
        table.to_writer(&mut buf, "memory").unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "pin_id,block,iteration,start,end,on,off,duration,value,mode,group"
        );
        assert_eq!(lines[1], "1,a,0,0,30,,,,,pwm,");
        assert_eq!(lines[2], "2,a,0,0,30,1,2,,,,left");
    }
}
