//! Source packaging: deterministic archives with content-addressed names.
//!
//! Identical directory contents must always produce the same digest and a
//! byte-identical archive, no matter what order the filesystem yields
//! entries in or what the file mtimes are. The archive therefore:
//!
//! - sorts entries by their forward-slash relative path,
//! - stores entries uncompressed with a fixed timestamp and fixed
//!   permissions,
//! - contains file entries only (directories are implied by entry paths).
//!
//! The digest is SHA-256 over the finished archive bytes; the published
//! object name is a pure function of that digest, which is what makes the
//! publisher's existence check sufficient for idempotence.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{DeployError, Result};

/// Prefix of every published source object.
pub const OBJECT_PREFIX: &str = "function-source";

/// A packaged source directory, ready to publish.
#[derive(Debug, Clone)]
pub struct SourceBundle {
    /// SHA-256 hex digest of the archive bytes.
    pub digest: String,
    /// Archive size in bytes.
    pub size_bytes: u64,
    /// Where the archive was written locally.
    pub archive_path: PathBuf,
}

impl SourceBundle {
    /// The object name this bundle publishes under:
    /// `function-source.<digest>.zip`.
    #[must_use]
    pub fn object_name(&self) -> String {
        format!("{OBJECT_PREFIX}.{}.zip", self.digest)
    }
}

/// Archives `source_dir` into `output_dir` and returns the bundle.
///
/// # Errors
///
/// Returns `DeployError::Packaging` if the source directory is missing,
/// unreadable, or contains no files, or if the archive cannot be written.
pub fn package_source(source_dir: &Path, output_dir: &Path) -> Result<SourceBundle> {
    if !source_dir.is_dir() {
        return Err(DeployError::packaging(format!(
            "source directory {} does not exist or is not a directory",
            source_dir.display()
        )));
    }

    let entries = collect_entries(source_dir)?;
    if entries.is_empty() {
        return Err(DeployError::packaging(format!(
            "source directory {} contains no files",
            source_dir.display()
        )));
    }

    let archive = write_archive(source_dir, &entries)?;
    let digest = hex::encode(Sha256::digest(&archive));

    let archive_path = output_dir.join(format!("{OBJECT_PREFIX}.{digest}.zip"));
    std::fs::write(&archive_path, &archive).map_err(|e| {
        DeployError::packaging_with_source(
            format!("failed to write archive {}", archive_path.display()),
            e,
        )
    })?;

    tracing::debug!(
        source = %source_dir.display(),
        digest = %digest,
        files = entries.len(),
        size_bytes = archive.len(),
        "packaged source directory"
    );

    Ok(SourceBundle {
        digest,
        size_bytes: archive.len() as u64,
        archive_path,
    })
}

/// Collects the relative file paths under `source_dir`, sorted canonically.
fn collect_entries(source_dir: &Path) -> Result<Vec<String>> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(source_dir).follow_links(false) {
        let entry = entry.map_err(|e| {
            DeployError::packaging_with_source(
                format!("failed to read source directory {}", source_dir.display()),
                e,
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|e| DeployError::packaging_with_source("entry outside source root", e))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        entries.push(name);
    }

    entries.sort_unstable();
    Ok(entries)
}

/// Writes the archive for the given sorted entry list.
fn write_archive(source_dir: &Path, entries: &[String]) -> Result<Vec<u8>> {
    // Fixed timestamp and permissions: mutable filesystem metadata must not
    // leak into the digest.
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for name in entries {
        let path = source_dir.join(name.replace('/', std::path::MAIN_SEPARATOR_STR));
        let contents = std::fs::read(&path).map_err(|e| {
            DeployError::packaging_with_source(format!("failed to read {}", path.display()), e)
        })?;

        writer
            .start_file(name.clone(), options)
            .map_err(|e| DeployError::packaging_with_source(format!("failed to add {name}"), e))?;
        writer
            .write_all(&contents)
            .map_err(|e| DeployError::packaging_with_source(format!("failed to write {name}"), e))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| DeployError::packaging_with_source("failed to finish archive", e))?;
    Ok(cursor.into_inner())
}
