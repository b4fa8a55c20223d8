use std::path::{Path, PathBuf};

/// Suffix stripped from an archive's file name to name its extraction folder.
pub const ARCHIVE_SUFFIX: &str = ".zip";

/// Suffix appended to the folder name when the archive lacks [`ARCHIVE_SUFFIX`].
const FALLBACK_FOLDER_SUFFIX: &str = ".d";

/// What to download and where to put it. Built once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    source_address: String,
    destination_directory: PathBuf,
    destination_file_name: String,
}

impl TransferRequest {
    pub fn new(
        source_address: impl Into<String>,
        destination_directory: impl Into<PathBuf>,
        destination_file_name: impl Into<String>,
    ) -> Self {
        Self {
            source_address: source_address.into(),
            destination_directory: destination_directory.into(),
            destination_file_name: destination_file_name.into(),
        }
    }

    pub fn source_address(&self) -> &str {
        &self.source_address
    }

    pub fn destination_directory(&self) -> &Path {
        &self.destination_directory
    }

    pub fn destination_file_name(&self) -> &str {
        &self.destination_file_name
    }

    /// Full path of the file the download is written to.
    pub fn destination_path(&self) -> PathBuf {
        self.destination_directory.join(&self.destination_file_name)
    }
}

/// Which archive to unpack and the root folder to unpack it into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveExtractionRequest {
    archive_path: PathBuf,
    destination_directory: PathBuf,
}

impl ArchiveExtractionRequest {
    pub fn new(archive_path: impl Into<PathBuf>, destination_directory: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: archive_path.into(),
            destination_directory: destination_directory.into(),
        }
    }

    /// Unpack `archive` into a folder under `extract_into` named after the
    /// archive without its `.zip` suffix, e.g. `out/images.zip` into `out`
    /// gives `out/images`.
    pub fn from_archive(archive: impl Into<PathBuf>, extract_into: impl AsRef<Path>) -> Self {
        let archive_path = archive.into();
        let folder = folder_name_for(&archive_path);
        let destination_directory = extract_into.as_ref().join(folder);
        Self {
            archive_path,
            destination_directory,
        }
    }

    /// The extraction request that follows a completed download: the
    /// archive is unpacked next to where it was saved.
    pub fn following(request: &TransferRequest) -> Self {
        Self::from_archive(request.destination_path(), request.destination_directory())
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn destination_directory(&self) -> &Path {
        &self.destination_directory
    }
}

fn folder_name_for(archive: &Path) -> String {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let split = name.len().saturating_sub(ARCHIVE_SUFFIX.len());
    match name.get(split..) {
        Some(tail) if split > 0 && tail.eq_ignore_ascii_case(ARCHIVE_SUFFIX) => {
            name[..split].to_string()
        }
        _ => format!("{name}{FALLBACK_FOLDER_SUFFIX}"),
    }
}
