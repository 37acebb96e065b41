//! # wattscope - Main Entry Point
//!
//! Subcommand flow:
//! - `sample`: open the probe, arm start/stop breakpoints at the configured
//!   functions, stream calibrated samples into the database.
//! - `analyze`: resolve every stored PC and rebuild locations, arcs and the
//!   run summary.
//! - `import`: merge an instrumented call-graph trace.
//! - `export-csv` / `clean`: data export and reset.
//!
//! Exit codes distinguish a clean completion, a completion with recorded
//! warnings, and an aborted run; warnings are never silently folded into
//! success.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufReader, BufWriter};

use wattscope::cfg::{Cfg, EXTERNAL_MODULE};
use wattscope::cli::{Args, Command};
use wattscope::config::ProjectConfig;
use wattscope::probe::Probe;
use wattscope::profile::{self, callgraph, Summary};
use wattscope::progress::Reporter;
use wattscope::store::Store;
use wattscope::symbols::SymbolResolver;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_WARNINGS: i32 = 3;

fn main() {
    env_logger::init();
    let args = Args::parse();
    std::process::exit(match run(&args) {
        Ok(Outcome { warnings: 0 }) => EXIT_SUCCESS,
        Ok(Outcome { warnings }) => {
            eprintln!("completed with {warnings} warnings");
            EXIT_WARNINGS
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            EXIT_ERROR
        }
    });
}

struct Outcome {
    warnings: u64,
}

impl Outcome {
    fn clean() -> Self {
        Self { warnings: 0 }
    }
}

fn run(args: &Args) -> Result<Outcome> {
    let config = ProjectConfig::load(&args.config)
        .with_context(|| format!("loading project file {}", args.config.display()))?;

    match &args.command {
        Command::Sample => sample(args, &config),
        Command::Analyze => analyze(args, &config),
        Command::Import { trace } => import(args, &config, trace),
        Command::ExportCsv { output } => export_csv(args, output),
        Command::Clean => {
            Store::open(&args.db)?.clean()?;
            Ok(Outcome::clean())
        }
    }
}

fn build_resolver(config: &ProjectConfig) -> Result<SymbolResolver> {
    let mut resolver = SymbolResolver::new();
    for elf in &config.elfs {
        resolver.add_image(elf);
    }
    if let Some(kallsyms) = &config.kallsyms {
        resolver.set_kallsyms(kallsyms);
    }
    if let Some(offsets) = &config.offsets {
        resolver
            .load_offsets_file(offsets)
            .with_context(|| format!("loading offset table {}", offsets.display()))?;
    }
    Ok(resolver)
}

fn build_cfg(config: &ProjectConfig, store: &Store) -> Result<Cfg> {
    let mut cfg = match &config.cfg {
        Some(path) => Cfg::from_json_file(path)
            .with_context(|| format!("loading CFG {}", path.display()))?,
        None => Cfg::new(),
    };
    // Foreign code seen by earlier passes keeps its identities.
    cfg.seed_external_functions(store.external_locations(EXTERNAL_MODULE)?);
    Ok(cfg)
}

fn sample(args: &Args, config: &ProjectConfig) -> Result<Outcome> {
    let store = Store::open(&args.db)?;
    let mut resolver = build_resolver(config)?;

    let start_addr = resolver
        .lookup_symbol(&config.start_function)
        .with_context(|| format!("resolving start function {:?}", config.start_function))?;
    let stop_addr = resolver
        .lookup_symbol(&config.stop_function)
        .with_context(|| format!("resolving stop function {:?}", config.stop_function))?;

    let probe = Probe::open(config).context("connecting to the probe")?;

    let progress = Reporter::new();
    progress.advance(0, "Collecting samples");
    let stats = probe.collect_samples(
        &store,
        (config.start_core, start_addr),
        (config.stop_core, stop_addr),
        &progress,
    )?;
    store.create_time_index()?;

    // Run-level stats are available now; the aggregates are filled in by
    // `analyze`, which rewrites this row.
    let summary = Summary {
        samples: stats.samples,
        min_time: stats.min_time,
        max_time: stats.max_time,
        min_power: stats.min_power,
        max_power: stats.max_power,
        ..Summary::default()
    };
    store.write_meta(&summary)?;

    if !args.quiet {
        println!("collected {} samples", stats.samples);
    }
    Ok(Outcome::clean())
}

fn analyze(args: &Args, config: &ProjectConfig) -> Result<Outcome> {
    let mut store = Store::open(&args.db)?;
    let mut resolver = build_resolver(config)?;
    let mut cfg = build_cfg(config, &store)?;
    let multi_image = config.elfs.len() > 1;

    let outcome =
        profile::aggregate(&mut store, &mut resolver, &mut cfg, multi_image, &Reporter::new())?;

    if !args.quiet {
        println!(
            "aggregated {} samples into {} locations ({} frames closed)",
            outcome.summary.samples, outcome.locations, outcome.frames_closed
        );
    }
    Ok(Outcome::clean())
}

fn import(args: &Args, config: &ProjectConfig, trace: &std::path::Path) -> Result<Outcome> {
    let mut store = Store::open(&args.db)?;
    let mut resolver = build_resolver(config)?;
    let mut cfg = build_cfg(config, &store)?;
    let multi_image = config.elfs.len() > 1;

    let file = File::open(trace)
        .with_context(|| format!("opening call-graph trace {}", trace.display()))?;
    let mut reader = BufReader::new(file);

    let outcome =
        callgraph::import_trace(&mut reader, &mut store, &mut resolver, &mut cfg, multi_image)?;

    if !args.quiet {
        println!(
            "imported {} arcs and {} loop counts ({} warnings)",
            outcome.arcs, outcome.loop_counts, outcome.warnings
        );
    }
    Ok(Outcome { warnings: outcome.warnings })
}

fn export_csv(args: &Args, output: &std::path::Path) -> Result<Outcome> {
    let store = Store::open(&args.db)?;
    let file =
        File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    store.export_csv(&mut writer)?;
    if !args.quiet {
        println!("exported {} samples to {}", store.measurement_count()?, output.display());
    }
    Ok(Outcome::clean())
}
