//! npm lock manifest (`package-lock.json`) loading.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ErrorKind;

/// The lock file name npm writes next to `package.json`.
pub const LOCK_FILE: &str = "package-lock.json";

/// Errors that can occur when loading a manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("the file {} does not exist", .path.display())]
    NotFound { path: PathBuf },

    #[error("the file {} is a directory", .path.display())]
    IsDirectory { path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse manifest: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ManifestError {
    /// Returns the taxonomy bucket for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::IsDirectory { .. } => ErrorKind::InvalidInput,
            Self::Io { .. } => ErrorKind::Io,
            Self::Decode(_) => ErrorKind::Decode,
        }
    }
}

/// The subset of `package-lock.json` the resolver consumes.
///
/// Any other field (`lockfileVersion`, `requires`, `packages`, ...) is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageLock {
    /// Root package name.
    #[serde(default)]
    pub name: String,

    /// Root package version.
    #[serde(default)]
    pub version: String,

    /// Locked dependencies keyed by package name.
    #[serde(default)]
    pub dependencies: BTreeMap<String, LockedDependency>,
}

/// A single entry of the `dependencies` mapping.
///
/// Both fields are optional at decode time; a lookup fails only when it needs
/// one that is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedDependency {
    /// Exact version the lock file pins.
    #[serde(default)]
    pub version: Option<String>,

    /// Tarball URL the package was resolved from.
    #[serde(default)]
    pub resolved: Option<String>,
}

/// A dependency waiting for its registry checksum.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnresolvedDependency {
    /// Package name (the manifest key).
    pub name: String,
    /// Locked version, if the entry had one.
    pub version: Option<String>,
    /// Tarball URL, if the entry had one.
    pub resolved: Option<String>,
}

impl LockedDependency {
    /// Pair this entry with its manifest key.
    #[must_use]
    pub fn to_unresolved(&self, name: &str) -> UnresolvedDependency {
        UnresolvedDependency {
            name: name.to_string(),
            version: self.version.clone(),
            resolved: self.resolved.clone(),
        }
    }
}

impl PackageLock {
    /// Load a manifest from a file path.
    ///
    /// The file is read exactly once. The decoded manifest and the raw bytes
    /// returned alongside it come from the same buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is missing, is a directory, cannot be
    /// read, or does not hold a well-formed manifest.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, Vec<u8>), ManifestError> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|e| io_error(path, e))?;
        if metadata.is_dir() {
            return Err(ManifestError::IsDirectory {
                path: path.to_path_buf(),
            });
        }

        let raw = std::fs::read(path).map_err(|e| io_error(path, e))?;
        let lock = Self::parse(&raw)?;
        Ok((lock, raw))
    }

    /// Parse a manifest from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a well-formed manifest.
    pub fn parse(content: &[u8]) -> Result<Self, ManifestError> {
        Ok(serde_json::from_slice(content)?)
    }

    /// Number of locked dependencies.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    /// Returns true if the manifest locks no dependencies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Iterate over every entry as an unresolved record.
    pub fn unresolved(&self) -> impl Iterator<Item = UnresolvedDependency> + '_ {
        self.dependencies
            .iter()
            .map(|(name, dep)| dep.to_unresolved(name))
    }
}

fn io_error(path: &Path, source: io::Error) -> ManifestError {
    if source.kind() == io::ErrorKind::NotFound {
        ManifestError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        ManifestError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"{
  "name": "x",
  "version": "1.0.0",
  "dependencies": {
    "a": {
      "version": "1.0.0",
      "resolved": "https://registry.example/a/-/a-1.0.0.tgz"
    }
  }
}"#;

    #[test]
    fn parse_minimal_manifest() {
        let lock = PackageLock::parse(MINIMAL.as_bytes()).unwrap();
        assert_eq!(lock.name, "x");
        assert_eq!(lock.version, "1.0.0");
        assert_eq!(lock.dependency_count(), 1);
        let dep = &lock.dependencies["a"];
        assert_eq!(dep.version.as_deref(), Some("1.0.0"));
        assert_eq!(
            dep.resolved.as_deref(),
            Some("https://registry.example/a/-/a-1.0.0.tgz")
        );
    }

    #[test]
    fn parse_ignores_unknown_fields() {
        let json = r#"{
  "name": "app",
  "version": "2.0.0",
  "lockfileVersion": 1,
  "requires": true,
  "dependencies": {
    "left-pad": {
      "version": "1.3.0",
      "resolved": "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz",
      "integrity": "sha512-deadbeef",
      "dev": true
    }
  }
}"#;
        let lock = PackageLock::parse(json.as_bytes()).unwrap();
        assert_eq!(lock.dependency_count(), 1);
    }

    #[test]
    fn parse_tolerates_missing_entry_fields() {
        let json = r#"{"name": "app", "version": "1.0.0", "dependencies": {"bundled": {}}}"#;
        let lock = PackageLock::parse(json.as_bytes()).unwrap();
        let dep = &lock.dependencies["bundled"];
        assert!(dep.version.is_none());
        assert!(dep.resolved.is_none());
    }

    #[test]
    fn parse_without_dependencies() {
        let lock = PackageLock::parse(br#"{"name": "empty", "version": "0.0.1"}"#).unwrap();
        assert!(lock.is_empty());
        assert_eq!(lock.unresolved().count(), 0);
    }

    #[test]
    fn parse_malformed_json() {
        let err = PackageLock::parse(b"{\"name\": ").unwrap_err();
        assert!(matches!(err, ManifestError::Decode(_)));
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn unresolved_records_carry_manifest_key() {
        let lock = PackageLock::parse(MINIMAL.as_bytes()).unwrap();
        let records: Vec<_> = lock.unresolved().collect();
        assert_eq!(
            records,
            vec![UnresolvedDependency {
                name: "a".to_string(),
                version: Some("1.0.0".to_string()),
                resolved: Some("https://registry.example/a/-/a-1.0.0.tgz".to_string()),
            }]
        );
    }

    #[test]
    fn load_returns_raw_bytes_of_same_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(LOCK_FILE);
        std::fs::write(&path, MINIMAL).unwrap();

        let (lock, raw) = PackageLock::load(&path).unwrap();
        assert_eq!(raw, MINIMAL.as_bytes());
        assert_eq!(lock, PackageLock::parse(&raw).unwrap());
    }

    #[test]
    fn load_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = PackageLock::load(tmp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ManifestError::NotFound { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn load_directory() {
        let tmp = TempDir::new().unwrap();
        let err = PackageLock::load(tmp.path()).unwrap_err();
        assert!(matches!(err, ManifestError::IsDirectory { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn load_malformed_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(LOCK_FILE);
        std::fs::write(&path, "not json").unwrap();

        let err = PackageLock::load(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }
}
