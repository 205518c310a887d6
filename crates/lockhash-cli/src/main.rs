//! lockhash CLI - resolve registry checksums for an npm lock file

use anyhow::Result;
use clap::Parser;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod npm;
mod resolve;
mod signal;

/// Environment variable holding the log filter directive.
const LOG_ENV: &str = "LOCKHASH_LOG";

#[derive(Parser, Debug)]
#[command(name = "lockhash")]
#[command(version)]
#[command(
    about = "Resolve the registry checksum of every package in a package-lock.json",
    long_about = None
)]
struct Cli {
    /// The path to the package-lock.json file (generated with npm when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// The path where to write the payload
    #[arg(short, long, default_value = "payload.json")]
    output: PathBuf,

    /// Print the payload instead of writing it
    #[arg(long)]
    dry: bool,

    /// Number of concurrent registry lookups (defaults to the number of CPUs)
    #[arg(short, long)]
    jobs: Option<NonZeroUsize>,

    /// Keep resolving after a failed lookup instead of aborting the run
    #[arg(long)]
    keep_going: bool,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let input = match cli.input {
        Some(path) => path,
        None => npm::generate_lockfile(Path::new("."))?,
    };

    let options = resolve::ResolveOptions {
        input,
        output: cli.output,
        dry_run: cli.dry,
        jobs: cli.jobs,
        keep_going: cli.keep_going,
        timeout: Duration::from_secs(cli.timeout),
    };

    let summary = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(resolve::resolve_lockfile(options))?;
    summary.print_summary();

    Ok(())
}

/// Install the stderr log subscriber, keeping stdout free for `--dry` output.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
