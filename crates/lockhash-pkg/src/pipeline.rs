//! Orchestration of the resolution pipeline.
//!
//! A run wires the stages together as
//! generator -> worker pool -> collector -> payload,
//! while a separate blocking task encodes the raw manifest. Both halves are
//! awaited together, in whichever order they finish.

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    generate, merge, spawn_workers, DependencyStream, ErrorKind, ManifestError, MergedStream,
    PackageLock, Payload, RegistryClient, ResolveFailure,
};

/// Errors that abort a run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The manifest could not be loaded; no stage was started.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// A lookup failed while running fail-fast.
    #[error(transparent)]
    Resolve(#[from] ResolveFailure),

    /// The manifest encoding task died.
    #[error("manifest encoding task failed: {0}")]
    Encode(String),
}

impl PipelineError {
    /// Returns the taxonomy bucket for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Manifest(e) => e.kind(),
            Self::Resolve(e) => e.kind(),
            Self::Encode(_) => ErrorKind::Io,
        }
    }
}

/// What to do when a single lookup fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Abort the whole run on the first failure.
    #[default]
    FailFast,
    /// Record the failure and keep resolving the rest.
    Continue,
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of concurrent registry workers.
    pub concurrency: usize,
    /// Failure handling.
    pub error_policy: ErrorPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            error_policy: ErrorPolicy::default(),
        }
    }
}

/// Result of a run that was not aborted.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    /// Manifest encoding and every checksum resolved before the run ended.
    pub payload: Payload,
    /// True if the run was cancelled; `payload` is then partial.
    pub interrupted: bool,
    /// Failed lookups, collected under [`ErrorPolicy::Continue`].
    pub failures: Vec<ResolveFailure>,
}

impl PipelineOutcome {
    /// Returns true if every dependency was resolved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.interrupted && self.failures.is_empty()
    }
}

/// Resolves the checksums of a lock manifest.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: RegistryClient,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline over a registry client.
    #[must_use]
    pub fn new(registry: RegistryClient, config: PipelineConfig) -> Self {
        Self { registry, config }
    }

    /// The configuration this pipeline runs with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the manifest at `path` and resolve every dependency in it.
    ///
    /// Cancelling `cancel` stops every stage and yields the partial payload
    /// with [`PipelineOutcome::interrupted`] set.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be loaded, or, under
    /// [`ErrorPolicy::FailFast`], on the first failed lookup.
    pub async fn run(
        &self,
        path: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let path = path.as_ref();
        let (lock, raw) = PackageLock::load(path)?;
        tracing::info!(
            path = %path.display(),
            dependencies = lock.dependency_count(),
            "loaded manifest"
        );
        self.run_lock(lock, raw, cancel).await
    }

    /// Resolve an already loaded manifest.
    ///
    /// `raw` must be the bytes `lock` was decoded from; they are embedded in
    /// the payload as is.
    ///
    /// # Errors
    ///
    /// Under [`ErrorPolicy::FailFast`], returns the first failed lookup.
    pub async fn run_lock(
        &self,
        lock: PackageLock,
        raw: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        // Aborting on a failure cancels this run only, never the caller's token.
        let run = cancel.child_token();

        let encoding = tokio::task::spawn_blocking(move || Payload::encode_manifest(&raw));
        let (resolution, encoded) = tokio::join!(self.resolve_all(Arc::new(lock), &run), async {
            let encoded = encoding.await;
            tracing::debug!("manifest has been encoded");
            encoded
        });

        let mut outcome = resolution?;
        outcome.payload.package_lock = encoded.map_err(|e| PipelineError::Encode(e.to_string()))?;
        Ok(outcome)
    }

    async fn resolve_all(
        &self,
        lock: Arc<PackageLock>,
        run: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let expected = lock.dependency_count();

        let DependencyStream {
            receiver: source,
            task: generator,
        } = generate(lock, run.clone());
        let workers = spawn_workers(self.config.concurrency, &self.registry, &source, run);
        drop(source);
        let MergedStream {
            receiver: mut merged,
            task: collector,
        } = merge(workers, run);

        let mut outcome = PipelineOutcome::default();
        let mut fatal = None;

        loop {
            let result = tokio::select! {
                biased;
                () = run.cancelled() => break,
                next = merged.recv() => match next {
                    Some(result) => result,
                    None => break,
                },
            };

            match result {
                Ok(dep) => {
                    tracing::debug!(package = %dep.name, shasum = %dep.shasum, "resolved");
                    outcome.payload.insert(dep);
                }
                Err(failure) => match self.config.error_policy {
                    ErrorPolicy::FailFast => {
                        run.cancel();
                        fatal = Some(failure);
                        break;
                    }
                    ErrorPolicy::Continue => {
                        tracing::warn!(error = %failure, "skipping dependency");
                        outcome.failures.push(failure);
                    }
                },
            }
        }
        drop(merged);

        // Every stage has either finished or seen the cancellation by now.
        if let Err(e) = generator.await {
            tracing::error!(error = %e, "dependency generator failed");
        }
        if let Err(e) = collector.await {
            tracing::error!(error = %e, "result collector failed");
        }

        if let Some(failure) = fatal {
            return Err(failure.into());
        }

        outcome.interrupted = run.is_cancelled();
        if outcome.interrupted {
            tracing::warn!(
                resolved = outcome.payload.len(),
                expected,
                "resolution interrupted"
            );
        } else {
            tracing::info!(
                resolved = outcome.payload.len(),
                failed = outcome.failures.len(),
                "all dependencies have been resolved"
            );
        }

        Ok(outcome)
    }
}
