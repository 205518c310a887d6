//! The emitted artifact: raw manifest plus resolved checksums.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A dependency whose registry checksum has been fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDependency {
    /// Package name. Serialized as the key of [`Payload::packages`].
    #[serde(skip)]
    pub name: String,
    /// Locked version.
    pub version: String,
    /// SHA-1 checksum published under `dist.shasum`.
    pub shasum: String,
}

/// Combined output of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Base64 (standard alphabet, padded) of the manifest bytes as read.
    #[serde(rename = "package-lock.json")]
    pub package_lock: String,

    /// Resolved checksums keyed by package name.
    pub packages: BTreeMap<String, ResolvedDependency>,
}

impl Payload {
    /// Create an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Base64-encode raw manifest bytes the way the payload stores them.
    #[must_use]
    pub fn encode_manifest(raw: &[u8]) -> String {
        STANDARD.encode(raw)
    }

    /// Record a resolved dependency, replacing any earlier one of the same name.
    pub fn insert(&mut self, dep: ResolvedDependency) -> Option<ResolvedDependency> {
        self.packages.insert(dep.name.clone(), dep)
    }

    /// Number of resolved packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Returns true if nothing has been resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Serialize to compact JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
