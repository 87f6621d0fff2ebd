//! Runs a simulation described by an input directory (spec.md §6) and
//! writes the resulting observability record as JSON.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use blocksim_config::{load_input_dir, ConfigError};
use blocksim_types::VirtualTime;
use blocksim_world::World;
use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Discrete-event P2P block/tx propagation simulator")]
struct Args {
    /// Directory containing config.json, latency.json, throughput-{received,sent}.json,
    /// delays.json, and factory.json.
    #[arg(long, default_value = "input-parameters")]
    input_dir: PathBuf,

    /// Overrides config.json's `duration` and the simulator's one-day default.
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Where to write the observability record.
    #[arg(long, default_value = "report.json")]
    report: PathBuf,

    /// RNG seed; fixing it makes a run reproducible.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn wall_clock_now() -> VirtualTime {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64();
    VirtualTime::new(secs)
}

fn exit_code_for(err: &eyre::Report) -> ExitCode {
    if err.downcast_ref::<ConfigError>().is_some() {
        ExitCode::from(1)
    } else {
        ExitCode::from(2)
    }
}

fn run(args: Args) -> eyre::Result<()> {
    let input = load_input_dir(&args.input_dir)
        .wrap_err_with(|| format!("loading input directory {}", args.input_dir.display()))?;

    let duration_secs = args
        .duration_secs
        .or_else(|| input.config.duration.map(|d| d.as_secs()))
        .unwrap_or(blocksim_world::DEFAULT_DURATION_SECS);

    let initial_time = wall_clock_now();
    let mut world = World::build(&input, initial_time, args.seed)
        .wrap_err("building the node population")?;

    tracing::info!(duration_secs, seed = args.seed, "starting simulation");
    world.run_until(initial_time + duration_secs as f64);
    tracing::info!(now = %world.now(), "simulation finished");

    let report = world.report();
    let file = std::fs::File::create(&args.report)
        .wrap_err_with(|| format!("creating report file {}", args.report.display()))?;
    serde_json::to_writer_pretty(file, &report).wrap_err("writing observability report")?;

    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:?}");
            exit_code_for(&err)
        }
    }
}
