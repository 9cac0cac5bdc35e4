// src/util.rs

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Read a UTF-8 file into a String with a clear error message.
pub fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read file {:?}", path))
}

/// Ensure a directory exists (create it if missing).
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory {:?}", path))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Stable, filesystem-safe name for an artifact generated from `description`.
///
/// Example:
/// artifact_name("generated_site", "Portfolio", "html")
/// → generated_site_6d0ab1f3c1e2b4a5.html
pub fn artifact_name(prefix: &str, description: &str, ext: &str) -> String {
    let digest = sha256_hex(description.as_bytes());
    format!("{}_{}.{}", prefix, &digest[..16], ext)
}

/// Write `content` to `dir/name` through a temp file in the same directory,
/// so readers never observe a half-written file.
pub fn write_atomically(dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    ensure_dir(dir)?;

    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {:?}", dir))?;
    temp.write_all(content.as_bytes())
        .context("Failed to write temp file")?;
    temp.flush().context("Failed to flush temp file")?;

    let target = dir.join(name);
    temp.persist(&target)
        .with_context(|| format!("Failed to move file into place at {:?}", target))?;

    Ok(target)
}
