//! Lock file generation through the `npm` executable.

use anyhow::{bail, Context, Result};
use lockhash_pkg::LOCK_FILE;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Package description npm generates the lock file from.
const PACKAGE_FILE: &str = "package.json";

/// Produce `package-lock.json` in `dir` with `npm install --package-lock-only`.
///
/// Requires `npm` on `PATH` and a regular `package.json` file in `dir`.
pub fn generate_lockfile(dir: &Path) -> Result<PathBuf> {
    let npm_check = Command::new("npm")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if !matches!(npm_check, Ok(status) if status.success()) {
        bail!("npm not found on PATH; pass the lock file with -i");
    }

    check_package_file(dir)?;

    tracing::info!("{LOCK_FILE} not found, producing it with npm");

    let status = Command::new("npm")
        .args(["install", "--package-lock-only", "--no-audit"])
        .current_dir(dir)
        .stderr(Stdio::inherit())
        .status()
        .context("Failed to run npm install")?;

    if !status.success() {
        bail!("npm install failed with {status}");
    }

    Ok(dir.join(LOCK_FILE))
}

/// Make sure `dir` holds a `package.json` file npm can read.
fn check_package_file(dir: &Path) -> Result<()> {
    let path = dir.join(PACKAGE_FILE);
    let metadata = std::fs::metadata(&path)
        .with_context(|| format!("{PACKAGE_FILE} missing in {}", dir.display()))?;
    if metadata.is_dir() {
        bail!("{} is not a file", path.display());
    }
    Ok(())
}
