//! Checksum resolution for npm lock manifests.
//!
//! This crate provides:
//! - Loading of `package-lock.json` manifests
//! - A lazy generator of unresolved dependency records
//! - A bounded pool of registry workers fetching `dist.shasum`
//! - Fan-in of the worker streams into a single payload
//! - Cancellation-aware orchestration of the whole pipeline

mod collector;
mod error;
mod generator;
mod manifest;
mod payload;
mod pipeline;
mod pool;
mod registry;

pub use collector::{merge, MergedStream};
pub use error::ErrorKind;
pub use generator::{generate, DependencyStream};
pub use manifest::{
    LockedDependency, ManifestError, PackageLock, UnresolvedDependency, LOCK_FILE,
};
pub use payload::{Payload, ResolvedDependency};
pub use pipeline::{ErrorPolicy, Pipeline, PipelineConfig, PipelineError, PipelineOutcome};
pub use pool::{spawn_workers, ResolveFailure, ResolveResult, WorkerStream};
pub use registry::{lookup_url, RegistryClient, RegistryConfig, RegistryError, ARCHIVE_MARKER};
