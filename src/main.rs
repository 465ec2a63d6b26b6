use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracemark::{
    EngineConfig, IcedEngine, IndicatifProgressBar, LocatorOptions, ProgressReporter, TraceLocator,
    logging,
};
use tracing::info;

/// Mark candidate trace addresses in a process memory dump
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Memory directory inside the workspace, e.g. `./ws/dump/memory/`
    memory_directory: Option<PathBuf>,

    /// Give up on a mapping whose analysis runs longer than this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Show a progress bar over the executable mappings
    #[arg(long)]
    progress: bool,

    /// Don't turn direct call targets into new functions
    #[arg(long)]
    no_follow_calls: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let Some(memory_directory) = cli.memory_directory else {
        eprintln!("please specify the location of the memory directory in the workspace");
        eprintln!("{}", Cli::command().render_usage());
        return Ok(ExitCode::from(1));
    };

    logging::init_tracing(cli.verbose);

    let engine = IcedEngine::new(EngineConfig {
        follow_calls: !cli.no_follow_calls,
        ..Default::default()
    });
    let timeout = cli.timeout.map(Duration::from_secs);

    let summary = if cli.progress {
        let options = LocatorOptions::default()
            .with_analysis_timeout(timeout)
            .with_progress_reporter(IndicatifProgressBar::new("Locating traces"));
        run(&engine, options, &memory_directory)?
    } else {
        let options = LocatorOptions::default().with_analysis_timeout(timeout);
        run(&engine, options, &memory_directory)?
    };

    info!(
        mappings = summary.mappings,
        analyzed = summary.analyzed,
        skipped = summary.skipped,
        trace_points = summary.trace_points,
        output = %summary.output.display(),
        "Done"
    );
    Ok(ExitCode::SUCCESS)
}

fn run<P: ProgressReporter>(
    engine: &IcedEngine,
    options: LocatorOptions<P>,
    memory_directory: &std::path::Path,
) -> Result<tracemark::RunSummary> {
    TraceLocator::new(engine, options).run(memory_directory)
}
