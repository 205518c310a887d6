//! npm registry client used to look up published checksums.
//!
//! For a locked dependency the client:
//! - Derives the version metadata URL from the tarball URL
//! - Fetches the metadata document
//! - Extracts `dist.shasum`

use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::{ErrorKind, ResolvedDependency, UnresolvedDependency};

/// Path segment separating a package's registry base from its tarball name.
pub const ARCHIVE_MARKER: &str = "/-/";

/// Errors that can occur during registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The lock entry lacks a field the lookup needs.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// The derived lookup URL is not a usable request target.
    #[error("invalid lookup URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Network error during fetch.
    #[error("network error: {0}")]
    Network(String),

    /// The registry answered with something other than 200 OK.
    #[error("registry returned status {status} for {url}")]
    Status { url: String, status: StatusCode },

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Decode(String),
}

impl RegistryError {
    /// Returns the taxonomy bucket for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField(_) | Self::InvalidUrl { .. } => ErrorKind::InvalidInput,
            Self::Network(_) | Self::Status { .. } => ErrorKind::Network,
            Self::Decode(_) => ErrorKind::Decode,
        }
    }
}

/// Version metadata document, reduced to the one field we read.
#[derive(Debug, Deserialize)]
struct VersionMetadata {
    dist: Dist,
}

#[derive(Debug, Deserialize)]
struct Dist {
    shasum: String,
}

/// Configuration for the registry client.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// User agent for HTTP requests.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Marker at which tarball URLs are cut to obtain the lookup base.
    pub archive_marker: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("lockhash/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(60),
            archive_marker: ARCHIVE_MARKER.to_string(),
        }
    }
}

/// Derive the version metadata URL for a tarball URL.
///
/// The tarball URL is cut at the first [`ARCHIVE_MARKER`] and `/<version>` is
/// appended. A URL without the marker is used whole as the base.
#[must_use]
pub fn lookup_url(resolved: &str, version: &str) -> String {
    lookup_url_with(resolved, version, ARCHIVE_MARKER)
}

fn lookup_url_with(resolved: &str, version: &str, marker: &str) -> String {
    let base = resolved
        .split_once(marker)
        .map_or(resolved, |(base, _)| base);
    format!("{base}/{version}")
}

/// Client for the npm registry.
///
/// Cloning is cheap: clones share one connection pool, so every worker can
/// hold its own handle without a lock.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    config: RegistryConfig,
    http_client: reqwest::Client,
}

impl RegistryClient {
    /// Create a new registry client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, RegistryError> {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry client with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_config(config: RegistryConfig) -> Result<Self, RegistryError> {
        let http_client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| RegistryError::Network(e.to_string()))?;

        Ok(Self { config, http_client })
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Build the metadata request target for a dependency.
    fn request_url(&self, resolved: &str, version: &str) -> Result<Url, RegistryError> {
        let raw = lookup_url_with(resolved, version, &self.config.archive_marker);
        let url = Url::parse(&raw).map_err(|e| RegistryError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(RegistryError::InvalidUrl {
                url: raw,
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        Ok(url)
    }

    /// Fetch the published checksum of a locked dependency.
    ///
    /// The returned future holds the in-flight request; dropping it aborts
    /// the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is incomplete, the URL is unusable, the
    /// request fails, the registry does not answer 200, or the body lacks
    /// `dist.shasum`.
    pub async fn resolve(
        &self,
        dep: &UnresolvedDependency,
    ) -> Result<ResolvedDependency, RegistryError> {
        let version = dep
            .version
            .as_deref()
            .ok_or(RegistryError::MissingField("version"))?;
        let resolved = dep
            .resolved
            .as_deref()
            .ok_or(RegistryError::MissingField("resolved"))?;

        let url = self.request_url(resolved, version)?;
        tracing::debug!(package = %dep.name, %url, "looking up checksum");

        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(RegistryError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;
        let metadata: VersionMetadata =
            serde_json::from_slice(&body).map_err(|e| RegistryError::Decode(e.to_string()))?;

        Ok(ResolvedDependency {
            name: dep.name.clone(),
            version: version.to_string(),
            shasum: metadata.dist.shasum,
        })
    }
}
