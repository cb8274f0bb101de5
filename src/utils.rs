// The "utils" module holds cell parsers shared by the table loaders and a small timer
use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;
use tracing::debug;

use crate::error::{ParadigmError, Result};

/// Paradigm files express time in minutes, everything in memory is in seconds
pub const SECONDS_PER_MINUTE: f64 = 60.;

pub fn minutes_to_seconds(minutes: f64) -> f64 {
    minutes * SECONDS_PER_MINUTE
}

fn ratio_regex() -> Option<&'static Regex> {
    static RATIO: OnceLock<Option<Regex>> = OnceLock::new();
    RATIO
        .get_or_init(|| {
            Regex::new(r"^([+-]?(?:\d+\.?\d*|\.\d+))\s*/\s*([+-]?(?:\d+\.?\d*|\.\d+))$").ok()
        })
        .as_ref()
}

/// Parses a number of minutes written either as a plain decimal (`"3"`, `"0.25"`) or as a
/// ratio (`"1/2"`). `NaN` is returned unchanged so callers can treat it as "absent".
///
/// ```
/// use pdcompiler_backend::utils::parse_minutes;
///
/// assert_eq!(parse_minutes("1/2").unwrap(), 0.5);
/// assert_eq!(parse_minutes("3").unwrap(), 3.);
/// assert!(parse_minutes("1/2/3").is_err());
/// ```
pub fn parse_minutes(cell: &str) -> Result<f64> {
    let cell = cell.trim();
    if let Ok(value) = cell.parse::<f64>() {
        if value.is_infinite() {
            return Err(ParadigmError::format(format!(
                "time value {:?} is not finite",
                cell
            )));
        }
        return Ok(value);
    }
    let caps = ratio_regex().and_then(|re| re.captures(cell)).ok_or_else(|| {
        ParadigmError::format(format!(
            "time value {:?} is neither a number nor a ratio of the form numerator/denominator",
            cell
        ))
    })?;
    // Both groups matched a decimal literal, so these parses cannot fail
    let numerator: f64 = caps[1].parse().unwrap_or(f64::NAN);
    let denominator: f64 = caps[2].parse().unwrap_or(f64::NAN);
    if denominator == 0. {
        return Err(ParadigmError::format(format!(
            "time value {:?} has a zero denominator",
            cell
        )));
    }
    Ok(numerator / denominator)
}

/// Reads an optional time cell (minutes in the file) and returns seconds.
/// Blank cells and `NaN` are absent.
pub fn parse_time_cell(cell: Option<&str>) -> Result<Option<f64>> {
    match cell {
        None => Ok(None),
        Some(cell) => {
            let minutes = parse_minutes(cell)?;
            if minutes.is_nan() {
                Ok(None)
            } else {
                Ok(Some(minutes_to_seconds(minutes)))
            }
        }
    }
}

/// Reads an optional plain numeric cell (no unit conversion).
pub fn parse_value_cell(cell: Option<&str>) -> Result<Option<f64>> {
    match cell {
        None => Ok(None),
        Some(cell) => {
            let value = cell.trim().parse::<f64>().map_err(|_| {
                ParadigmError::format(format!("value {:?} is not a number", cell))
            })?;
            Ok(if value.is_nan() { None } else { Some(value) })
        }
    }
}

/// Reads an integer count. Floats with a zero fractional part (`"3.0"`) are accepted since
/// spreadsheet exports tend to write them.
pub fn parse_count_cell(cell: &str) -> Result<i64> {
    let cell = cell.trim();
    if let Ok(count) = cell.parse::<i64>() {
        return Ok(count);
    }
    match cell.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0. => Ok(value as i64),
        _ => Err(ParadigmError::format(format!(
            "count {:?} is not an integer",
            cell
        ))),
    }
}

/// Utility for measuring stages of a compile, reports through `tracing`
pub struct TickTimer {
    last: Instant,
}

impl TickTimer {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Milliseconds since the previous tick (or construction)
    pub fn tick(&mut self) -> f64 {
        let now = Instant::now();
        let diff = now.duration_since(self.last).as_secs_f64() * 1e3;
        self.last = now;
        diff
    }

    pub fn tick_log(&mut self, msg: &str) -> f64 {
        let diff = self.tick();
        debug!("{}: {:.3} ms", msg, diff);
        diff
    }
}

impl Default for TickTimer {
    fn default() -> Self {
        Self::new()
    }
}
