//! Zip extraction, one entry at a time in archive order.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::core::request::ArchiveExtractionRequest;
use crate::error::ExtractError;
use crate::utils::fs as fs_utils;

/// Buffer size for copying entry contents (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// What an extraction run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub root: PathBuf,
    pub directories: usize,
    pub files: usize,
    pub bytes: u64,
    /// Entries skipped because their names would land outside `root`.
    pub skipped: usize,
}

#[derive(Debug, Default)]
pub struct Extractor;

impl Extractor {
    pub fn new() -> Self {
        Self
    }

    /// Unpack `request.archive_path()` beneath `request.destination_directory()`.
    ///
    /// Existing files are overwritten. A failure part way through leaves the
    /// entries written so far in place.
    pub fn run(&self, request: &ArchiveExtractionRequest) -> Result<ExtractSummary, ExtractError> {
        let archive_path = request.archive_path();
        let root = request.destination_directory();
        info!(
            archive = %archive_path.display(),
            destination = %root.display(),
            "starting extraction"
        );

        let result = self.extract(archive_path, root);
        match &result {
            Ok(summary) => info!(
                archive = %archive_path.display(),
                files = summary.files,
                directories = summary.directories,
                bytes = summary.bytes,
                "extraction finished"
            ),
            Err(err) => warn!(archive = %archive_path.display(), error = %err, "extraction failed"),
        }
        result
    }

    fn extract(&self, archive_path: &Path, root: &Path) -> Result<ExtractSummary, ExtractError> {
        fs_utils::ensure_dir_exists(root).map_err(|e| {
            ExtractError::corrupt(archive_path, format!("cannot create {}: {e}", root.display()))
        })?;

        let file = File::open(archive_path)
            .map_err(|e| ExtractError::open_failure(archive_path, e.to_string()))?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| ExtractError::open_failure(archive_path, e.to_string()))?;

        let mut summary = ExtractSummary {
            root: root.to_path_buf(),
            ..ExtractSummary::default()
        };
        // Directory modes wait until the end so a read-only directory
        // cannot block entries placed under it.
        let mut directory_modes = Vec::new();

        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| ExtractError::corrupt(archive_path, e.to_string()))?;

            let relative = match entry.enclosed_name() {
                Some(path) => path,
                None => {
                    warn!(entry = entry.name(), "skipping entry outside the extraction root");
                    summary.skipped += 1;
                    continue;
                }
            };
            let target = root.join(&relative);
            debug!(entry = entry.name(), "extracting");

            if entry.is_dir() {
                fs_utils::ensure_dir_exists(&target)
                    .and_then(|()| fs_utils::ensure_owner_writable(&target))
                    .map_err(|e| entry_error(archive_path, &target, e))?;
                if let Some(mode) = entry.unix_mode() {
                    directory_modes.push((target, mode));
                }
                summary.directories += 1;
            } else {
                // a read-only copy from an earlier run must not block the overwrite
                fs_utils::ensure_parent_exists(&target)
                    .and_then(|()| fs_utils::ensure_owner_writable(&target))
                    .map_err(|e| entry_error(archive_path, &target, e))?;
                let written = copy_entry(&mut entry, &target)
                    .map_err(|e| entry_error(archive_path, &target, e))?;
                if let Some(mode) = entry.unix_mode() {
                    fs_utils::apply_unix_mode(&target, mode)
                        .map_err(|e| entry_error(archive_path, &target, e))?;
                }
                summary.files += 1;
                summary.bytes += written;
            }
        }

        // deepest first, in case a parent is about to lose its search bit
        for (directory, mode) in directory_modes.iter().rev() {
            fs_utils::apply_unix_mode(directory, *mode)
                .map_err(|e| entry_error(archive_path, directory, e))?;
        }

        Ok(summary)
    }
}

fn copy_entry(entry: &mut impl Read, target: &Path) -> io::Result<u64> {
    let mut writer = BufWriter::new(File::create(target)?);
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut written = 0u64;

    loop {
        let read = match entry.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buffer[..read])?;
        written += read as u64;
    }

    writer.flush()?;
    Ok(written)
}

fn entry_error(archive_path: &Path, target: &Path, e: io::Error) -> ExtractError {
    ExtractError::corrupt(archive_path, format!("{}: {e}", target.display()))
}
