//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "wattscope",
    about = "Profile runtime and per-rail energy with the USB measurement probe",
    after_help = "\
EXAMPLES:
    wattscope sample                      Acquire a sampling session from the probe
    wattscope analyze                     Resolve PCs and build the profile
    wattscope import trace.prof           Merge an instrumented call-graph trace
    wattscope export-csv samples.csv      Dump the measurement series"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Profile database
    #[arg(long, value_name = "FILE", default_value = "profile.db3")]
    pub db: PathBuf,

    /// Project configuration file
    #[arg(long, value_name = "FILE", default_value = "wattscope.toml")]
    pub config: PathBuf,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Acquire one sampling session from the probe into the database
    Sample,
    /// Resolve stored PCs and rebuild location/arc/summary data
    Analyze,
    /// Merge an offline call-graph trace into the profile
    Import {
        /// Call-graph trace file produced by an instrumented run
        trace: PathBuf,
    },
    /// Export the measurement series as semicolon-separated values
    ExportCsv {
        /// Output file
        output: PathBuf,
    },
    /// Drop all profile data
    Clean,
}
