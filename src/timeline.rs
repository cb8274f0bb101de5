//! Per-pin instruction timelines on a tick grid.
//!
//! A [`PinTimeline`] collects [`PinBook`]s (an instruction plus the tick interval it covers) while
//! events are loaded, then [`PinTimeline::compile`] turns them into a gapless, piecewise list of
//! instructions: gaps are padded with the idle level 0 and neighbouring identical instructions are
//! merged. Compiled timelines can be sampled into `ndarray` buffers.
//!
//! ## Instruction intervals
//! Positions are ticks of the board's sample clock. For every [`PinBook`], `start_pos` is inclusive
//! and `end_pos` is exclusive. After compilation, `instr_end[i]` is the exclusive end of
//! `instr_val[i]`, and instruction `i` starts where instruction `i - 1` ends (or at 0).

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use ndarray::{s, ArrayViewMut1};

use crate::error::{ParadigmError, Result};
use crate::mapping::PinId;

/// What a pin outputs over an interval
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PinInstr {
    /// Constant level
    Const(f64),
    /// Duty cycle: `value` for `on` seconds then 0 for `off` seconds, with cycles counted from
    /// `origin` (absolute seconds)
    Square {
        value: f64,
        on: f64,
        off: f64,
        origin: f64,
    },
}

impl PinInstr {
    pub fn period(&self) -> Option<f64> {
        match *self {
            PinInstr::Const(_) => None,
            PinInstr::Square { on, off, .. } => Some(on + off),
        }
    }

    /// Output level at absolute time `t` (seconds)
    ///
    /// ```
    /// use pdcompiler_backend::timeline::PinInstr;
    ///
    /// let blink = PinInstr::Square { value: 1., on: 1., off: 3., origin: 10. };
    /// assert_eq!(blink.eval_point(10.5), 1.);
    /// assert_eq!(blink.eval_point(12.), 0.);
    /// assert_eq!(blink.eval_point(14.), 1.);
    /// ```
    pub fn eval_point(&self, t: f64) -> f64 {
        match *self {
            PinInstr::Const(value) => value,
            PinInstr::Square {
                value,
                on,
                off,
                origin,
            } => {
                if (t - origin).rem_euclid(on + off) < on {
                    value
                } else {
                    0.
                }
            }
        }
    }

    /// Replaces the time values in `t_arr` by the instruction's output at those times
    pub fn eval_inplace(&self, t_arr: &mut ArrayViewMut1<f64>) {
        match *self {
            PinInstr::Const(value) => t_arr.fill(value),
            PinInstr::Square { .. } => t_arr.map_inplace(|t| *t = self.eval_point(*t)),
        }
    }
}

impl fmt::Display for PinInstr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PinInstr::Const(value) => write!(f, "Const({})", value),
            PinInstr::Square {
                value,
                on,
                off,
                origin,
            } => write!(f, "Square({}, on={}, off={}, origin={})", value, on, off, origin),
        }
    }
}

/// An instruction together with the tick interval it was booked for.
///
/// Books are ordered by `start_pos` only, which is what keeps a timeline's edit list sorted.
#[derive(Clone, Debug)]
pub struct PinBook {
    pub start_pos: usize,
    pub end_pos: usize,
    pub instr: PinInstr,
}

impl PinBook {
    /// `end_pos` must be strictly greater than `start_pos`
    pub fn new(start_pos: usize, end_pos: usize, instr: PinInstr) -> Result<Self> {
        if end_pos <= start_pos {
            return Err(ParadigmError::configuration(format!(
                "Instruction {} end_pos {} should be strictly greater than start_pos {}",
                instr, end_pos, start_pos
            )));
        }
        Ok(PinBook {
            start_pos,
            end_pos,
            instr,
        })
    }
}

impl Ord for PinBook {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start_pos.cmp(&other.start_pos)
    }
}
impl PartialOrd for PinBook {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for PinBook {
    fn eq(&self, other: &Self) -> bool {
        self.start_pos == other.start_pos
    }
}
impl Eq for PinBook {}

impl fmt::Display for PinBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PinBook({}, {}-{})", self.instr, self.start_pos, self.end_pos)
    }
}

#[derive(Debug)]
pub struct PinTimeline {
    pin_id: PinId,
    samp_rate: f64,
    fresh_compiled: bool,
    // instr_list tracks edits, (instr_end, instr_val) track compilation results
    instr_list: BTreeSet<PinBook>,
    instr_end: Vec<usize>,
    instr_val: Vec<PinInstr>,
}

impl PinTimeline {
    pub fn new(pin_id: PinId, samp_rate: f64) -> Self {
        Self {
            pin_id,
            samp_rate,
            fresh_compiled: true,
            instr_list: BTreeSet::new(),
            instr_end: Vec::new(),
            instr_val: Vec::new(),
        }
    }

    pub fn pin_id(&self) -> &PinId {
        &self.pin_id
    }

    pub fn samp_rate(&self) -> f64 {
        self.samp_rate
    }

    pub fn instr_list(&self) -> &BTreeSet<PinBook> {
        &self.instr_list
    }

    pub fn instr_end(&self) -> &[usize] {
        &self.instr_end
    }

    pub fn instr_val(&self) -> &[PinInstr] {
        &self.instr_val
    }

    pub fn is_compiled(&self) -> bool {
        !self.instr_end.is_empty()
    }

    pub fn is_edited(&self) -> bool {
        !self.instr_list.is_empty()
    }

    pub fn is_fresh_compiled(&self) -> bool {
        self.fresh_compiled
    }

    /// Converts seconds to the nearest tick
    pub fn time_to_pos(&self, t: f64) -> usize {
        (t * self.samp_rate).round().max(0.) as usize
    }

    /// Books `instr` from `t` for `duration` seconds. Fails if the interval rounds to zero ticks or
    /// overlaps an instruction already on this pin.
    pub fn add_instr(&mut self, instr: PinInstr, t: f64, duration: f64) -> Result<()> {
        let new_book = PinBook::new(self.time_to_pos(t), self.time_to_pos(t + duration), instr)?;
        self.fresh_compiled = false;

        if let Some(next) = self.instr_list.range(&new_book..).next() {
            if next.start_pos < new_book.end_pos {
                return Err(ParadigmError::configuration(format!(
                    "Pin {}: instruction {} overlaps with the next instruction {}",
                    self.pin_id, new_book, next
                )));
            }
        }
        if let Some(prev) = self.instr_list.range(..&new_book).next_back() {
            if prev.end_pos > new_book.start_pos {
                return Err(ParadigmError::configuration(format!(
                    "Pin {}: instruction {} overlaps with the previous instruction {}",
                    self.pin_id, new_book, prev
                )));
            }
        }
        self.instr_list.insert(new_book);
        Ok(())
    }

    pub fn last_instr_end_pos(&self) -> usize {
        self.instr_list.last().map_or(0, |book| book.end_pos)
    }

    /// Exclusive end of the compiled instructions, 0 if not compiled
    pub fn compiled_stop_pos(&self) -> usize {
        self.instr_end.last().copied().unwrap_or(0)
    }

    pub fn compiled_stop_time(&self) -> f64 {
        self.compiled_stop_pos() as f64 / self.samp_rate
    }

    /// Pads and merges the contents of `instr_list` and stores them in `(instr_end, instr_val)`
    pub fn compile(&mut self, stop_pos: usize) -> Result<()> {
        if self.instr_list.is_empty() {
            return Ok(());
        }
        // Ignore double compiles
        if self.fresh_compiled && self.compiled_stop_pos() == stop_pos {
            return Ok(());
        }
        if self.last_instr_end_pos() > stop_pos {
            return Err(ParadigmError::configuration(format!(
                "Attempting to compile pin {} with stop_pos {} while instructions end at {}",
                self.pin_id,
                stop_pos,
                self.last_instr_end_pos()
            )));
        }
        self.clear_compile_cache();
        self.fresh_compiled = true;

        let idle = PinInstr::Const(0.);
        let mut padded: Vec<(usize, PinInstr)> = Vec::with_capacity(2 * self.instr_list.len() + 1);
        let mut last_end = 0;
        for book in &self.instr_list {
            if last_end != book.start_pos {
                padded.push((book.start_pos, idle));
            }
            padded.push((book.end_pos, book.instr));
            last_end = book.end_pos;
        }
        if last_end != stop_pos {
            padded.push((stop_pos, idle));
        }

        for (end, instr) in padded {
            match self.instr_val.last() {
                Some(last) if *last == instr => {
                    if let Some(last_end) = self.instr_end.last_mut() {
                        *last_end = end;
                    }
                }
                _ => {
                    self.instr_val.push(instr);
                    self.instr_end.push(end);
                }
            }
        }
        Ok(())
    }

    /// Least index whose compiled instruction ends after `pos`, i.e. the first instruction
    /// intersecting a signal starting at `pos`
    pub fn binfind_first_intersect_instr(&self, pos: usize) -> usize {
        self.instr_end.partition_point(|&end| end <= pos)
    }

    pub fn clear_edit_cache(&mut self) {
        self.fresh_compiled = self.instr_end.is_empty();
        self.instr_list.clear();
    }

    pub fn clear_compile_cache(&mut self) {
        self.fresh_compiled = self.instr_list.is_empty();
        self.instr_end.clear();
        self.instr_val.clear();
    }

    /// Samples ticks `start_pos..end_pos` into `buffer` (`num_samps` long). The buffer must already
    /// hold the sample times in seconds; they are replaced by the pin's output.
    pub fn fill_signal_nsamps(
        &self,
        start_pos: usize,
        end_pos: usize,
        num_samps: usize,
        buffer: &mut ArrayViewMut1<f64>,
    ) -> Result<()> {
        if !self.is_compiled() {
            return Err(ParadigmError::configuration(format!(
                "Attempting to calculate signal on not-compiled pin {}",
                self.pin_id
            )));
        }
        if end_pos <= start_pos || end_pos > self.compiled_stop_pos() {
            return Err(ParadigmError::configuration(format!(
                "Pin {} cannot calculate signal for interval {}-{}, compiled until {}",
                self.pin_id,
                start_pos,
                end_pos,
                self.compiled_stop_pos()
            )));
        }
        if buffer.len() != num_samps {
            return Err(ParadigmError::configuration(format!(
                "Pin {} expected a buffer of {} samples, got {}",
                self.pin_id,
                num_samps,
                buffer.len()
            )));
        }

        // Linear map from tick position to buffer offset: start_pos -> 0, end_pos -> num_samps
        let cvt_idx = |pos: usize| (pos - start_pos) * num_samps / (end_pos - start_pos);
        let mut cur_pos = start_pos;
        let mut i = self.binfind_first_intersect_instr(start_pos);
        while cur_pos < end_pos {
            let seg_end = end_pos.min(self.instr_end[i]);
            let mut slice = buffer.slice_mut(s![cvt_idx(cur_pos)..cvt_idx(seg_end)]);
            self.instr_val[i].eval_inplace(&mut slice);
            cur_pos = seg_end;
            i += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array1;

    use super::*;

    fn timeline() -> PinTimeline {
        PinTimeline::new(PinId::from("1"), 10.)
    }

    #[test]
    fn square_wave_points() {
        let instr = PinInstr::Square {
            value: 2.,
            on: 1.,
            off: 1.,
            origin: 0.,
        };
        let mut t = ndarray::array![0., 0.5, 1., 1.5, 2., 2.5];
        instr.eval_inplace(&mut t.view_mut());
        assert_eq!(t, ndarray::array![2., 2., 0., 0., 2., 2.]);
        assert_eq!(instr.period(), Some(2.));
        // Times before the origin continue the pattern backwards
        assert_eq!(instr.eval_point(-1.5), 2.);
    }

    #[test]
    fn overlap_is_rejected() {
        let mut tl = timeline();
        tl.add_instr(PinInstr::Const(1.), 1., 1.).unwrap();
        let err = tl.add_instr(PinInstr::Const(1.), 1.5, 1.).unwrap_err();
        assert!(err.is_configuration());
        let err = tl.add_instr(PinInstr::Const(1.), 0.5, 1.).unwrap_err();
        assert!(err.is_configuration());
        let err = tl.add_instr(PinInstr::Const(1.), 1., 0.5).unwrap_err();
        assert!(err.is_configuration());
        // Touching intervals are fine
        tl.add_instr(PinInstr::Const(1.), 2., 1.).unwrap();
        tl.add_instr(PinInstr::Const(1.), 0., 1.).unwrap();
        assert_eq!(tl.instr_list().len(), 3);
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let mut tl = timeline();
        assert!(tl.add_instr(PinInstr::Const(1.), 1., 0.01).is_err());
        assert!(!tl.is_edited());
    }

    #[test]
    fn compile_pads_and_merges() {
        let mut tl = timeline();
        tl.add_instr(PinInstr::Const(1.), 1., 1.).unwrap();
        tl.add_instr(PinInstr::Const(1.), 2., 1.).unwrap();
        tl.add_instr(PinInstr::Const(0.5), 4., 1.).unwrap();
        tl.compile(60).unwrap();

        assert!(tl.is_compiled());
        assert_eq!(tl.instr_end(), &[10, 30, 40, 50, 60]);
        assert_eq!(
            tl.instr_val(),
            &[
                PinInstr::Const(0.),
                PinInstr::Const(1.),
                PinInstr::Const(0.),
                PinInstr::Const(0.5),
                PinInstr::Const(0.),
            ]
        );
        assert_eq!(tl.compiled_stop_time(), 6.);
    }

    #[test]
    fn compile_before_last_instruction_fails() {
        let mut tl = timeline();
        tl.add_instr(PinInstr::Const(1.), 1., 1.).unwrap();
        assert!(tl.compile(15).unwrap_err().is_configuration());
        tl.compile(20).unwrap();
        assert_eq!(tl.instr_end(), &[10, 20]);
    }

    #[test]
    fn recompile_and_caches() {
        let mut tl = timeline();
        tl.add_instr(PinInstr::Const(1.), 0., 1.).unwrap();
        tl.compile(10).unwrap();
        assert_eq!(tl.instr_end(), &[10]);
        tl.compile(30).unwrap();
        assert_eq!(tl.instr_end(), &[10, 30]);

        tl.clear_compile_cache();
        assert!(!tl.is_compiled());
        assert!(tl.is_edited());
        tl.clear_edit_cache();
        assert!(!tl.is_edited());
        assert_eq!(tl.last_instr_end_pos(), 0);
    }

    #[test]
    fn binfind() {
        let mut tl = timeline();
        tl.add_instr(PinInstr::Const(1.), 1., 1.).unwrap();
        tl.compile(30).unwrap();
        // instr_end = [10, 20, 30]
        assert_eq!(tl.binfind_first_intersect_instr(0), 0);
        assert_eq!(tl.binfind_first_intersect_instr(9), 0);
        assert_eq!(tl.binfind_first_intersect_instr(10), 1);
        assert_eq!(tl.binfind_first_intersect_instr(25), 2);
    }

    #[test]
    fn fill_signal() {
        let mut tl = timeline();
        tl.add_instr(PinInstr::Const(1.), 1., 1.).unwrap();
        tl.add_instr(
            PinInstr::Square {
                value: 3.,
                on: 0.2,
                off: 0.2,
                origin: 2.,
            },
            2.,
            1.,
        )
        .unwrap();
        tl.compile(40).unwrap();

        let mut buffer = Array1::from_shape_fn(40, |k| k as f64 / 10.);
        tl.fill_signal_nsamps(0, 40, 40, &mut buffer.view_mut()).unwrap();
        assert_eq!(buffer[0], 0.);
        assert_eq!(buffer[10], 1.);
        assert_eq!(buffer[19], 1.);
        assert_eq!(buffer[20], 3.);
        assert_eq!(buffer[21], 3.);
        assert_eq!(buffer[35], 0.);

        // Sub-interval at half resolution
        let mut buffer = Array1::from_shape_fn(5, |k| 1. + k as f64 * 0.2);
        tl.fill_signal_nsamps(10, 20, 5, &mut buffer.view_mut()).unwrap();
        assert_eq!(buffer, ndarray::array![1., 1., 1., 1., 1.]);

        assert!(tl
            .fill_signal_nsamps(0, 50, 50, &mut Array1::zeros(50).view_mut())
            .is_err());
    }

    #[test]
    fn uncompiled_timeline_cannot_be_sampled() {
        let tl = timeline();
        let mut buffer = Array1::zeros(10);
        assert!(tl.fill_signal_nsamps(0, 10, 10, &mut buffer.view_mut()).is_err());
    }
}
