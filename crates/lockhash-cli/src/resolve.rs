//! Implementation of the resolve run: manifest in, payload out.

use anyhow::{Context, Result};
use lockhash_pkg::{
    ErrorPolicy, Pipeline, PipelineConfig, PipelineOutcome, RegistryClient, RegistryConfig,
};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::signal;

/// Options for a resolve run.
#[derive(Debug)]
pub struct ResolveOptions {
    /// Lock file to read.
    pub input: PathBuf,
    /// Where to write the payload.
    pub output: PathBuf,
    /// Print the payload instead of writing it.
    pub dry_run: bool,
    /// Worker count override.
    pub jobs: Option<NonZeroUsize>,
    /// Record failed lookups instead of aborting.
    pub keep_going: bool,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Summary of a resolve run.
#[derive(Debug, Default)]
pub struct ResolveSummary {
    /// Number of packages with a checksum in the payload.
    pub resolved: usize,
    /// Lookups that failed under `--keep-going`, as `(package, error)`.
    pub failed: Vec<(String, String)>,
    /// Whether the run was cut short by a signal.
    pub interrupted: bool,
    /// Where the payload was written, unless it was printed.
    pub written: Option<PathBuf>,
}

impl ResolveSummary {
    fn from_outcome(outcome: &PipelineOutcome, written: Option<PathBuf>) -> Self {
        Self {
            resolved: outcome.payload.len(),
            failed: outcome
                .failures
                .iter()
                .map(|f| (f.name.clone(), f.source.to_string()))
                .collect(),
            interrupted: outcome.interrupted,
            written,
        }
    }

    /// Print a summary of the run to stderr.
    pub fn print_summary(&self) {
        if self.interrupted {
            eprintln!("Interrupted: the payload is partial.");
        }

        eprintln!("Resolved {} package(s).", self.resolved);

        if !self.failed.is_empty() {
            eprintln!("Failed:");
            for (name, error) in &self.failed {
                eprintln!("  - {name}: {error}");
            }
        }

        if let Some(ref path) = self.written {
            eprintln!("Wrote {}", path.display());
        }
    }
}

/// Resolve every checksum of `options.input` and emit the payload.
///
/// SIGINT/SIGTERM cancel the run; the partial payload is still emitted. On
/// any other error nothing is emitted.
pub async fn resolve_lockfile(options: ResolveOptions) -> Result<ResolveSummary> {
    let registry = RegistryClient::with_config(RegistryConfig {
        timeout: options.timeout,
        ..RegistryConfig::default()
    })
    .context("Failed to create registry client")?;

    let pipeline = Pipeline::new(registry, pipeline_config(&options));

    let cancel = CancellationToken::new();
    let listener = signal::cancel_on_shutdown(cancel.clone());
    let outcome = pipeline.run(&options.input, &cancel).await;
    listener.abort();

    let outcome = outcome
        .with_context(|| format!("Failed to resolve {}", options.input.display()))?;

    let json = outcome
        .payload
        .to_json()
        .context("Failed to serialize payload")?;

    let written = if options.dry_run {
        println!("{json}");
        None
    } else {
        std::fs::write(&options.output, json)
            .with_context(|| format!("Failed to write {}", options.output.display()))?;
        Some(options.output.clone())
    };

    Ok(ResolveSummary::from_outcome(&outcome, written))
}

fn pipeline_config(options: &ResolveOptions) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    if let Some(jobs) = options.jobs {
        config.concurrency = jobs.get();
    }
    if options.keep_going {
        config.error_policy = ErrorPolicy::Continue;
    }
    config
}
