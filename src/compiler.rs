//! Expands a program into the flat, absolute-time [`EventTable`].
//!
//! For every resolved program row the named block is repeated `times` times. Repetition `k` is
//! shifted by `row.start + k * row.duration`, and every event's end is clipped to the row's overall
//! end so that a block which nominally runs longer than its slot cannot spill into the next row.
//!
//! The output is concatenated in program order, then repetition order, then block row order.
//! Nothing is sorted globally.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::block::Block;
use crate::error::Result;
use crate::event::{CompiledEvent, EventTable};
use crate::library::BlockSource;
use crate::mapping::PinMapping;
use crate::program::{Program, ResolvedRow};
use crate::utils::TickTimer;

/// Compiles `program` against `blocks` and `mapping`.
///
/// Either the whole paradigm compiles or an error is returned: unknown block names are checked
/// before any expansion happens, and every block's pins are checked against the mapping the first
/// time the block is used. Each distinct block is loaded once per call.
///
/// ```
/// use indexmap::IndexMap;
/// use pdcompiler_backend::block::{Block, BlockRow};
/// use pdcompiler_backend::compiler::compile;
/// use pdcompiler_backend::mapping::{PinMapping, PinRecord};
/// use pdcompiler_backend::program::{Program, ProgramRow};
///
/// let mapping = PinMapping::from_records(vec![PinRecord::new(1u32, Some("led"))]).unwrap();
/// let mut blocks = IndexMap::new();
/// blocks.insert(
///     "blink".to_string(),
///     Block::new("blink", vec![BlockRow::new(1u32, 0., 30.)]).unwrap(),
/// );
/// let program = Program::new(vec![ProgramRow::new("blink", Some(0.), 60., 3)]);
///
/// let table = compile(&mapping, &blocks, &program).unwrap();
/// assert_eq!(table.start_column().to_vec(), vec![0., 60., 120.]);
/// assert_eq!(table.end_column().to_vec(), vec![30., 90., 150.]);
/// ```
pub fn compile<S: BlockSource + ?Sized>(
    mapping: &PinMapping,
    blocks: &S,
    program: &Program,
) -> Result<EventTable> {
    let mut timer = TickTimer::new();
    let resolved = program.resolve()?;
    for row in &resolved {
        blocks.assert_has_block(&row.block)?;
    }
    timer.tick_log("Resolved program");

    let mut loaded: HashMap<&str, Block> = HashMap::new();
    let mut events = Vec::new();
    for (i, row) in resolved.iter().enumerate() {
        if !loaded.contains_key(row.block.as_str()) {
            let block = blocks.load_block(&row.block)?;
            block.check_pins(mapping)?;
            debug!("Loaded block {} with {} rows", block.name(), block.len());
            loaded.insert(&row.block, block);
        }
        let block = &loaded[row.block.as_str()];
        if let Some(nominal) = block.nominal_duration() {
            if nominal != row.duration {
                warn!(
                    "Program row {} runs block {} for {} [s] per repetition, block states {} [s]. Using the program duration",
                    i + 1,
                    row.block,
                    row.duration,
                    nominal
                );
            }
        }
        let before = events.len();
        expand_row(row, block, &mut events);
        debug!(
            "Program row {}: block {} x{} from {} [s] to {} [s], {} events",
            i + 1,
            row.block,
            row.times,
            row.start,
            row.end,
            events.len() - before
        );
    }
    timer.tick_log("Expanded program");

    let table = EventTable::new(events);
    info!(
        "Compiled {} program rows into {} events, stop time {} [s]",
        resolved.len(),
        table.len(),
        table.stop_time()
    );
    Ok(table)
}

/// Appends the repetitions of `block` described by `row` to `events`.
///
/// A block row without a start begins with the repetition; one without an end lasts the whole
/// repetition.
pub fn expand_row(row: &ResolvedRow, block: &Block, events: &mut Vec<CompiledEvent>) {
    for iteration in 0..row.times {
        let offset = row.start + iteration as f64 * row.duration;
        for block_row in block.rows() {
            let start = block_row.start.unwrap_or(0.) + offset;
            let end = block_row
                .end
                .map_or(offset + row.duration, |end| end + offset)
                .min(row.end);
            events.push(CompiledEvent {
                pin_id: block_row.pin_id.clone(),
                block: row.block.clone(),
                iteration,
                start,
                end,
                on: block_row.on,
                off: block_row.off,
                duration: block_row.duration,
                value: block_row.value,
                attrs: block_row.attrs.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use indexmap::IndexMap;

    use super::*;
    use crate::block::BlockRow;
    use crate::mapping::PinRecord;
    use crate::program::ProgramRow;
    use crate::table::Table;

    fn mapping() -> PinMapping {
        PinMapping::from_records(vec![
            PinRecord::new(1u32, Some("led_a")),
            PinRecord::new(2u32, Some("led_b")),
        ])
        .unwrap()
    }

    fn blocks(entries: &[(&str, &str)]) -> IndexMap<String, Block> {
        entries
            .iter()
            .map(|(name, text)| {
                let table = Table::parse_str(name, text).unwrap();
                (name.to_string(), Block::from_table(name, &table).unwrap())
            })
            .collect()
    }

    /// Counts how often each block is actually loaded
    struct CountingSource {
        blocks: IndexMap<String, Block>,
        loads: Cell<usize>,
    }

    impl BlockSource for CountingSource {
        fn has_block(&self, name: &str) -> bool {
            self.blocks.has_block(name)
        }

        fn load_block(&self, name: &str) -> Result<Block> {
            self.loads.set(self.loads.get() + 1);
            self.blocks.load_block(name)
        }

        fn block_names(&self) -> Vec<&str> {
            self.blocks.block_names()
        }
    }

    #[test]
    fn blink_scenario() {
        let blocks = blocks(&[("blink", "pin_id,start,end,duration\n1,0,1/2,1\n")]);
        let program = program_of(&[("blink", Some(0.), 60., 3)]);
        let table = compile(&mapping(), &blocks, &program).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.start_column().to_vec(), vec![0., 60., 120.]);
        assert_eq!(table.end_column().to_vec(), vec![30., 90., 150.]);
        let iterations: Vec<usize> = table.iter().map(|ev| ev.iteration).collect();
        assert_eq!(iterations, vec![0, 1, 2]);
        assert!(table.iter().all(|ev| ev.block == "blink"));
        assert_eq!(program.resolve().unwrap()[0].end, 180.);
    }

    #[test]
    fn row_count_law_and_order() {
        let blocks = blocks(&[
            ("a", "pin_id,start,end\n1,0,1/6\n2,1/6,1/3\n"),
            ("b", "pin_id,start,end\n2,0,1/2\n"),
        ]);
        let program = program_of(&[("a", None, 30., 4), ("b", None, 60., 2), ("a", None, 30., 1)]);
        let table = compile(&mapping(), &blocks, &program).unwrap();
        assert_eq!(table.len(), 4 * 2 + 2 + 2);

        // Program order, then iteration, then block row; no chronological reshuffling
        let keys: Vec<(&str, usize, &str)> = table
            .iter()
            .map(|ev| (ev.block.as_str(), ev.iteration, ev.pin_id.as_str()))
            .collect();
        assert_eq!(&keys[..4], &[("a", 0, "1"), ("a", 0, "2"), ("a", 1, "1"), ("a", 1, "2")]);
        assert_eq!(keys[8], ("b", 0, "2"));
        assert_eq!(keys[10], ("a", 0, "1"));
        assert_eq!(table.events()[8].start, 120.);
        assert_eq!(table.events()[10].start, 240.);
    }

    #[test]
    fn ends_are_clipped_to_row_end() {
        // The block's event outlasts its one minute slot
        let blocks = blocks(&[("long", "pin_id,start,end\n1,0,5/2\n")]);
        let program = program_of(&[("long", Some(10.), 60., 2)]);
        let table = compile(&mapping(), &blocks, &program).unwrap();
        let row_end = program.resolve().unwrap()[0].end;
        assert_eq!(row_end, 130.);
        assert!(table.iter().all(|ev| ev.end <= row_end));
        assert_eq!(table.end_column().to_vec(), vec![130., 130.]);
        assert_eq!(table.start_column().to_vec(), vec![10., 70.]);
    }

    #[test]
    fn missing_block_times_span_the_repetition() {
        let blocks = blocks(&[("fill", "pin_id,start,end\n1,,\n2,1/4,\n")]);
        let program = program_of(&[("fill", Some(0.), 60., 2)]);
        let table = compile(&mapping(), &blocks, &program).unwrap();
        let spans: Vec<(f64, f64)> = table.iter().map(|ev| (ev.start, ev.end)).collect();
        assert_eq!(spans, vec![(0., 60.), (15., 60.), (60., 120.), (75., 120.)]);
    }

    #[test]
    fn pass_through_columns() {
        let blocks = blocks(&[(
            "pwm",
            "pin_id,start,end,on,off,value,mode\n1,0,1,1/60,1/60,0.5,slow\n",
        )]);
        let program = program_of(&[("pwm", None, 60., 1)]);
        let table = compile(&mapping(), &blocks, &program).unwrap();
        let ev = &table.events()[0];
        assert_eq!(ev.duty_cycle(), Some((1., 1.)));
        assert_eq!(ev.level(), 0.5);
        assert_eq!(ev.attrs.get("mode").map(String::as_str), Some("slow"));
    }

    #[test]
    fn deterministic() {
        let blocks = blocks(&[
            ("a", "pin_id,start,end\n1,0,1/6\n2,1/6,1/3\n"),
            ("b", "pin_id,start,end\n2,0,1/2\n"),
        ]);
        let program = program_of(&[("b", None, 60., 3), ("a", Some(500.), 30., 2)]);
        let first = compile(&mapping(), &blocks, &program).unwrap();
        let second = compile(&mapping(), &blocks, &program).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_block_aborts_before_expansion() {
        let source = CountingSource {
            blocks: blocks(&[("blink", "pin_id,start,end\n1,0,1/2\n")]),
            loads: Cell::new(0),
        };
        let program = program_of(&[("blink", None, 60., 1), ("unknown", None, 60., 1)]);
        let err = compile(&mapping(), &source, &program).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("unknown"));
        assert_eq!(source.loads.get(), 0);
    }

    #[test]
    fn unmapped_pin_is_rejected() {
        let blocks = blocks(&[("blink", "pin_id,start,end\n9,0,1/2\n")]);
        let program = program_of(&[("blink", None, 60., 1)]);
        let err = compile(&mapping(), &blocks, &program).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn invalid_program_rows_are_rejected() {
        let blocks = blocks(&[("blink", "pin_id,start,end\n1,0,1/2\n")]);
        for program in [
            program_of(&[("blink", None, 60., 0)]),
            program_of(&[("blink", None, 0., 1)]),
        ] {
            assert!(compile(&mapping(), &blocks, &program)
                .unwrap_err()
                .is_configuration());
        }
    }

    #[test]
    fn blocks_are_loaded_once_per_compile() {
        let source = CountingSource {
            blocks: blocks(&[
                ("a", "pin_id,start,end\n1,0,1/2\n"),
                ("b", "pin_id,start,end\n2,0,1/2\n"),
            ]),
            loads: Cell::new(0),
        };
        let program = program_of(&[
            ("a", None, 60., 1),
            ("b", None, 60., 1),
            ("a", None, 60., 1),
            ("a", None, 60., 1),
        ]);
        compile(&mapping(), &source, &program).unwrap();
        assert_eq!(source.loads.get(), 2);
    }

    #[test]
    fn nan_start_follows_previous_row() {
        let blocks = blocks(&[("blink", "pin_id,start,end\n1,0,1/6\n")]);
        let program = program_of(&[("blink", Some(0.), 10., 2), ("blink", Some(f64::NAN), 5., 3)]);
        let table = compile(&mapping(), &blocks, &program).unwrap();
        assert_eq!(table.len(), 5);
        assert!(table.iter().all(|ev| ev.start.is_finite() && ev.end.is_finite()));
        let spans: Vec<(f64, f64)> = table.iter().skip(2).map(|ev| (ev.start, ev.end)).collect();
        assert_eq!(spans, vec![(20., 30.), (25., 35.), (30., 35.)]);
    }

    #[test]
    fn non_finite_duty_cycle_never_reaches_expansion() {
        let table = Table::parse_str("blink", "pin_id,start,end,on,off\n1,0,1,inf,1/60\n").unwrap();
        assert!(Block::from_table("blink", &table).unwrap_err().is_format());
        let row = BlockRow::new(1u32, 0., 10.).with_duty_cycle(f64::NAN, 1.);
        assert!(Block::new("blink", vec![row]).unwrap_err().is_configuration());
    }

    fn program_of(rows: &[(&str, Option<f64>, f64, i64)]) -> Program {
        Program::new(
            rows.iter()
                .map(|&(block, start, duration, times)| ProgramRow::new(block, start, duration, times))
                .collect(),
        )
    }

    #[test]
    fn empty_program_compiles_to_empty_table() {
        let table = compile(&mapping(), &IndexMap::<String, Block>::new(), &Program::default()).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn block_row_helper() {
        let block = Block::new("b", vec![BlockRow::new(1u32, 0., 10.)]).unwrap();
        let row = ResolvedRow {
            block: "b".to_string(),
            start: 5.,
            duration: 20.,
            times: 2,
            end: 45.,
        };
        let mut events = Vec::new();
        expand_row(&row, &block, &mut events);
        let spans: Vec<(f64, f64)> = events.iter().map(|ev| (ev.start, ev.end)).collect();
        assert_eq!(spans, vec![(5., 15.), (25., 35.)]);
    }
}
