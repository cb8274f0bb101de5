//! A board: one [`PinTimeline`] per mapped pin, fed from a compiled [`EventTable`].
//!
//! The board is the hand-over point to hardware. It can either be sampled on its tick grid with
//! [`Board::calc_signal_nsamps`] (one row per compiled pin), or flattened into a chronological list
//! of level changes with [`Board::edges`] and pushed to anything implementing [`PinSink`].
//!
//! Pins start at the idle level 0. Duty-cycled events become [`PinInstr::Square`] instructions
//! anchored at the event start, so every cycle of a blinking event begins with its high phase.

use indexmap::IndexMap;
use ndarray::Array2;
use tracing::{debug, warn};

use crate::error::{ParadigmError, Result};
use crate::event::{CompiledEvent, EventTable};
use crate::mapping::{PinId, PinMapping};
use crate::timeline::{PinInstr, PinTimeline};

/// A level change on one pin
#[derive(Clone, Debug, PartialEq)]
pub struct PinWrite {
    /// Seconds from the paradigm start
    pub time: f64,
    pub pin_id: PinId,
    pub value: f64,
}

/// Receiver of pin writes, e.g. a microcontroller link. Writes arrive in chronological order.
pub trait PinSink {
    fn write(&mut self, write: &PinWrite) -> Result<()>;
}

/// Sink that keeps every write in memory
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    writes: Vec<PinWrite>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> &[PinWrite] {
        &self.writes
    }

    pub fn writes_for_pin<'a>(&'a self, pin_id: &'a PinId) -> impl Iterator<Item = &'a PinWrite> {
        self.writes.iter().filter(move |w| &w.pin_id == pin_id)
    }
}

impl PinSink for RecordingSink {
    fn write(&mut self, write: &PinWrite) -> Result<()> {
        self.writes.push(write.clone());
        Ok(())
    }
}

#[derive(Debug)]
pub struct Board {
    name: String,
    samp_rate: f64,
    timelines: IndexMap<PinId, PinTimeline>,
}

impl Board {
    /// One empty timeline per pin of `mapping`, in mapping order
    pub fn from_mapping(name: &str, mapping: &PinMapping, samp_rate: f64) -> Result<Self> {
        if !(samp_rate.is_finite() && samp_rate > 0.) {
            return Err(ParadigmError::configuration(format!(
                "Board {} needs a positive sampling rate, got {}",
                name, samp_rate
            )));
        }
        let timelines = mapping
            .pin_ids()
            .map(|pin_id| (pin_id.clone(), PinTimeline::new(pin_id.clone(), samp_rate)))
            .collect();
        Ok(Self {
            name: name.to_string(),
            samp_rate,
            timelines,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samp_rate(&self) -> f64 {
        self.samp_rate
    }

    pub fn clock_period(&self) -> f64 {
        1.0 / self.samp_rate
    }

    pub fn timelines(&self) -> &IndexMap<PinId, PinTimeline> {
        &self.timelines
    }

    pub fn timeline(&self, pin_id: &PinId) -> Option<&PinTimeline> {
        self.timelines.get(pin_id)
    }

    fn timeline_(&mut self, pin_id: &PinId) -> Result<&mut PinTimeline> {
        let board = &self.name;
        self.timelines.get_mut(pin_id).ok_or_else(|| {
            ParadigmError::configuration(format!(
                "Board {} does not have pin {}",
                board, pin_id
            ))
        })
    }

    /// Books one event on its pin. Returns `false` if the event was skipped because it is empty on
    /// the tick grid.
    pub fn add_event(&mut self, event: &CompiledEvent) -> Result<bool> {
        let times = [Some(event.start), Some(event.end), event.on, event.off];
        if times.iter().flatten().any(|t| !t.is_finite()) || !event.level().is_finite() {
            return Err(ParadigmError::configuration(format!(
                "Event on pin {} from block {} (iteration {}) has non-finite times or level",
                event.pin_id, event.block, event.iteration
            )));
        }
        let timeline = self.timeline_(&event.pin_id)?;
        if event.end <= event.start
            || timeline.time_to_pos(event.end) <= timeline.time_to_pos(event.start)
        {
            warn!(
                "Skipping event on pin {} from block {} (iteration {}): {} [s] to {} [s] is empty",
                event.pin_id, event.block, event.iteration, event.start, event.end
            );
            return Ok(false);
        }
        let instr = match event.duty_cycle() {
            Some((on, off)) => PinInstr::Square {
                value: event.level(),
                on,
                off,
                origin: event.start,
            },
            None => PinInstr::Const(event.level()),
        };
        timeline.add_instr(instr, event.start, event.end - event.start)?;
        Ok(true)
    }

    /// Books every event of `table`, returns how many were booked
    pub fn load_events(&mut self, table: &EventTable) -> Result<usize> {
        let mut booked = 0;
        for event in table {
            if self.add_event(event)? {
                booked += 1;
            }
        }
        debug!(
            "Board {} booked {} of {} events",
            self.name,
            booked,
            table.len()
        );
        Ok(booked)
    }

    pub fn is_edited(&self) -> bool {
        self.timelines.values().any(|tl| tl.is_edited())
    }

    pub fn is_compiled(&self) -> bool {
        self.timelines.values().any(|tl| tl.is_compiled())
    }

    pub fn clear_edit_cache(&mut self) {
        self.timelines.values_mut().for_each(|tl| tl.clear_edit_cache());
    }

    pub fn clear_compile_cache(&mut self) {
        self.timelines
            .values_mut()
            .for_each(|tl| tl.clear_compile_cache());
    }

    pub fn last_instr_end_pos(&self) -> usize {
        self.timelines
            .values()
            .map(|tl| tl.last_instr_end_pos())
            .fold(0, usize::max)
    }

    pub fn last_instr_end_time(&self) -> f64 {
        self.last_instr_end_pos() as f64 / self.samp_rate
    }

    /// Compiles every edited pin up to `stop_time` (seconds), or up to the last instruction end when
    /// `None`. Returns the total run time.
    pub fn compile(&mut self, stop_time: Option<f64>) -> Result<f64> {
        let last_pos = self.last_instr_end_pos();
        let stop_pos = match stop_time {
            Some(t) => (t * self.samp_rate).round() as usize,
            None => last_pos,
        };
        if stop_pos < last_pos {
            return Err(ParadigmError::configuration(format!(
                "Board {}: stop time {:?} was rounded to {} ticks which is below the last instruction end {}",
                self.name, stop_time, stop_pos, last_pos
            )));
        }
        for timeline in self.timelines.values_mut() {
            timeline.compile(stop_pos)?;
        }
        Ok(self.total_run_time())
    }

    pub fn compiled_timelines(&self) -> Vec<&PinTimeline> {
        self.timelines
            .values()
            .filter(|tl| tl.is_compiled())
            .collect()
    }

    /// Number of ticks every compiled pin spans, 0 when nothing is compiled
    pub fn total_samps(&self) -> usize {
        self.compiled_timelines()
            .iter()
            .map(|tl| tl.compiled_stop_pos())
            .fold(0, usize::max)
    }

    pub fn total_run_time(&self) -> f64 {
        self.total_samps() as f64 / self.samp_rate
    }

    /// Samples every compiled pin over ticks `start_pos..end_pos` into `nsamps` columns.
    /// Rows follow the mapping order of the compiled pins.
    pub fn calc_signal_nsamps(
        &self,
        start_pos: usize,
        end_pos: usize,
        nsamps: usize,
    ) -> Result<Array2<f64>> {
        let compiled = self.compiled_timelines();
        if compiled.is_empty() {
            return Err(ParadigmError::configuration(format!(
                "Board {} has no compiled pins",
                self.name
            )));
        }
        let step = (end_pos as f64 - start_pos as f64) / nsamps as f64;
        let samp_rate = self.samp_rate;
        let mut buffer = Array2::from_shape_fn((compiled.len(), nsamps), |(_, k)| {
            (start_pos as f64 + k as f64 * step) / samp_rate
        });
        for (timeline, mut row) in compiled.iter().zip(buffer.outer_iter_mut()) {
            timeline.fill_signal_nsamps(start_pos, end_pos, nsamps, &mut row)?;
        }
        Ok(buffer)
    }

    /// Level changes of every compiled pin, ordered by time. Simultaneous writes keep mapping order.
    pub fn edges(&self) -> Vec<PinWrite> {
        let mut writes = Vec::new();
        for timeline in self.compiled_timelines() {
            pin_edges(timeline, &mut writes);
        }
        writes.sort_by(|a, b| a.time.total_cmp(&b.time));
        writes
    }

    /// Sends [`Board::edges`] to `sink`, returns the number of writes
    pub fn dispatch<S: PinSink + ?Sized>(&self, sink: &mut S) -> Result<usize> {
        let writes = self.edges();
        for write in &writes {
            sink.write(write)?;
        }
        debug!("Board {} dispatched {} pin writes", self.name, writes.len());
        Ok(writes.len())
    }
}

fn pin_edges(timeline: &PinTimeline, writes: &mut Vec<PinWrite>) {
    let samp_rate = timeline.samp_rate();
    let mut level = 0.;
    let mut set = |time: f64, value: f64| {
        if value != level {
            level = value;
            writes.push(PinWrite {
                time,
                pin_id: timeline.pin_id().clone(),
                value,
            });
        }
    };

    let mut seg_start = 0;
    for (&seg_end, instr) in timeline.instr_end().iter().zip(timeline.instr_val()) {
        let (t0, t_end) = (seg_start as f64 / samp_rate, seg_end as f64 / samp_rate);
        match *instr {
            PinInstr::Const(value) => set(t0, value),
            PinInstr::Square { on, .. } if on <= 0. => set(t0, 0.),
            PinInstr::Square { value, off, .. } if off <= 0. => set(t0, value),
            PinInstr::Square {
                value,
                on,
                off,
                origin,
            } => {
                let period = on + off;
                let mut cycle = ((t0 - origin) / period).floor();
                loop {
                    let cycle_start = origin + cycle * period;
                    if cycle_start >= t_end {
                        break;
                    }
                    let high_at = cycle_start.max(t0);
                    let low_at = (cycle_start + on).max(t0);
                    if high_at < low_at && high_at < t_end {
                        set(high_at, value);
                    }
                    if low_at < t_end {
                        set(low_at, 0.);
                    }
                    cycle += 1.;
                }
            }
        }
        seg_start = seg_end;
    }
}
