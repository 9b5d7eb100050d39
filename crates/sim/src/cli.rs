use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "swfsim", version, about = "Discrete-event simulator for batch HPC workloads")]
pub struct Cli {
    /// Input workload trace (SWF).
    pub input_swf: PathBuf,

    /// Simulation configuration descriptor (JSON).
    pub config: PathBuf,

    /// Output trace path; the simulated execution is written here as SWF.
    pub output_swf: PathBuf,

    /// Force a progress report every N wall-clock seconds, even without a
    /// terminal.
    #[arg(long, env = "SWFSIM_PROGRESS", value_name = "SECONDS")]
    pub progress: Option<u64>,

    /// Disable the progress bar even on a terminal.
    #[arg(long, default_value_t = false)]
    pub no_progress_bar: bool,

    /// Log engine activity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
