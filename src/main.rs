use indexmap::IndexMap;
use tracing_subscriber::EnvFilter;

use pdcompiler_backend::*;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mapping = PinMapping::from_records(vec![
        PinRecord::new(1u32, Some("led_a")),
        PinRecord::new(2u32, Some("led_b")),
    ])?;
    let mut blocks = IndexMap::new();
    blocks.insert(
        "blink".to_string(),
        Block::new(
            "blink",
            vec![
                BlockRow::new(1u32, 0., 30.),
                BlockRow::new(2u32, 30., 60.).with_duty_cycle(5., 5.),
            ],
        )?,
    );
    let program = Program::new(vec![
        ProgramRow::new("blink", Some(0.), 60., 3),
        ProgramRow::new("blink", None, 60., 1),
    ]);

    let mut paradigm = Paradigm::new(mapping, blocks, program);
    for event in paradigm.compile()?.sorted_by_start().iter() {
        println!(
            "pin {}: {:>6.1} -> {:>6.1}  {}#{}",
            event.pin_id, event.start, event.end, event.block, event.iteration
        );
    }

    let board = paradigm.board("arena", 10., None)?;
    let mut sink = RecordingSink::new();
    board.dispatch(&mut sink)?;
    println!("{} pin writes over {} s", sink.writes().len(), board.total_run_time());
    println!("{:?}", board.calc_signal_nsamps(0, 600, 12)?);
    Ok(())
}
