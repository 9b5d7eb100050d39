mod cli;
mod progress;

use std::io::IsTerminal;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;

use swfsim_core::{SimConfig, Trace, TraceError, swf};
use swfsim_engine::{AnyScheduler, RunStats, Simulator};

use crate::cli::Cli;
use crate::progress::ProgressReporter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    match cli.verbose {
        0 => {}
        1 => {
            logger.filter_level(log::LevelFilter::Info);
        }
        _ => {
            logger.filter_level(log::LevelFilter::Debug);
        }
    }
    logger.init();

    let started_at = chrono::Local::now();

    let mut config = SimConfig::load(&cli.config)?;
    config.input_file = Some(cli.input_swf.clone());
    config.output_swf = Some(cli.output_swf.clone());

    let trace = Trace::parse_file(&cli.input_swf)
        .with_context(|| format!("reading {}", cli.input_swf.display()))?;
    let num_processors = config
        .num_processors
        .or(trace.max_procs)
        .ok_or(TraceError::MissingMaxProcs)?;

    let scheduler = AnyScheduler::from_config(&config, num_processors, Some(&cli.output_swf))?;
    let mut sim = Simulator::new(num_processors, scheduler);
    for job in trace.jobs {
        sim.submit(job);
    }
    let total = sim.total_jobs();

    let show_bar = !cli.no_progress_bar && std::io::stdout().is_terminal();
    let mut reporter = ProgressReporter::new(
        total as u64,
        show_bar,
        cli.progress.map(Duration::from_secs),
    );
    sim.run(|notice| reporter.observe(&notice))?;
    reporter.finish();

    let results = sim.results();
    swf::write_output(&cli.output_swf, num_processors, &results)
        .with_context(|| format!("writing {}", cli.output_swf.display()))?;

    if config.stats {
        println!("{}", RunStats::compute(results.into_iter(), num_processors));
    }

    let elapsed = chrono::Local::now().signed_duration_since(started_at);
    println!(
        "swfsim {}: {} jobs on {} processors, {}.{:03}s elapsed",
        env!("CARGO_PKG_VERSION"),
        total,
        num_processors,
        elapsed.num_seconds(),
        (elapsed.num_milliseconds() % 1000).abs(),
    );
    Ok(())
}
