//! Manifest version editing.
//!
//! The manifest is treated as opaque text: the version field is the first
//! quoted value following a `version =` key, matched by a fixed pattern and
//! rewritten in place. Development-source dependency pins (a quoted
//! requirement pointing at a VCS branch instead of a published release) are
//! reduced to the bare package name.

use log::*;
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use crate::{error::MainlineError, result::Result};

/// Manifest files probed at the repository root, in order.
pub const MANIFEST_CANDIDATES: &[&str] = &["pyproject.toml", "Cargo.toml"];

static VERSION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^(?<head>\s*version\s*=\s*)["'][^"']*["']"#).unwrap()
});

static DEV_PIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(["'])\s*([A-Za-z0-9][A-Za-z0-9._-]*)\s*@\s*(?:git|hg|svn|bzr)\+[^"']*(["'])"#,
    )
    .unwrap()
});

/// Locate the manifest at the repository root.
pub fn find_manifest(root: &Path) -> Result<PathBuf> {
    for candidate in MANIFEST_CANDIDATES {
        let path = root.join(candidate);
        if path.exists() {
            debug!("using manifest: {}", path.display());
            return Ok(path);
        }
    }
    Err(MainlineError::ManifestNotFound(MANIFEST_CANDIDATES.join(", ")).into())
}

/// Rewrite the first quoted value following a `version =` key.
///
/// Fails when the manifest carries no version field at all: releasing a
/// project whose manifest cannot express a version is never meaningful.
pub fn patch_version(content: &str, version: &str) -> Result<String> {
    if !VERSION_REGEX.is_match(content) {
        return Err(MainlineError::invalid_args(
            "manifest has no 'version =' field to rewrite",
        )
        .into());
    }
    let replacement = format!("${{head}}\"{}\"", version);
    Ok(VERSION_REGEX.replace(content, replacement.as_str()).to_string())
}

/// Replace development-source dependency pins with bare package names.
///
/// Idempotent: bare names contain no VCS reference and are left untouched.
pub fn strip_dev_pins(content: &str) -> String {
    DEV_PIN_REGEX.replace_all(content, "${1}${2}${3}").to_string()
}

/// Set the manifest's version field on disk. Returns whether the file changed.
pub fn edit_version(path: &Path, version: &str) -> Result<bool> {
    let content = fs::read_to_string(path)?;
    let updated = patch_version(&content, version)?;
    if updated == content {
        debug!("manifest already at version {}", version);
        return Ok(false);
    }
    info!("setting version to {} in {}", version, path.display());
    fs::write(path, updated)?;
    Ok(true)
}

/// Apply the release edits on disk: bare version field plus stripped
/// development-source pins. Returns whether the file changed.
pub fn edit_for_release(path: &Path, version: &str) -> Result<bool> {
    let content = fs::read_to_string(path)?;
    let updated = strip_dev_pins(&patch_version(&content, version)?);
    if updated == content {
        debug!("manifest already clean at version {}", version);
        return Ok(false);
    }
    info!(
        "setting release version {} and stripping dev pins in {}",
        version,
        path.display()
    );
    fs::write(path, updated)?;
    Ok(true)
}
