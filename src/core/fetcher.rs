//! Sequential download of one source into one destination file.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::core::progress::TransferProgress;
use crate::core::request::TransferRequest;
use crate::core::source::ByteSource;
use crate::error::FetchError;
use crate::utils::fs as fs_utils;

/// Smallest accepted read chunk.
pub const MIN_CHUNK_SIZE: usize = 1024;

/// Largest accepted read chunk.
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;

/// Default read chunk (64KB).
pub const DEFAULT_CHUNK_SIZE: usize = MAX_CHUNK_SIZE;

/// Cooperative cancellation flag, checked once per read.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    pub path: PathBuf,
    pub bytes: u64,
}

pub struct Fetcher {
    source: Arc<dyn ByteSource>,
    chunk_size: usize,
}

impl Fetcher {
    pub fn new(source: Arc<dyn ByteSource>) -> Self {
        Self {
            source,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Use a different read chunk. Values outside
    /// `MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE` are clamped.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Download `request` to its destination path.
    ///
    /// `on_progress` receives a snapshot once the connection is open, once
    /// per chunk, and once more at the end when the source never advertised
    /// a length. Snapshots never go backwards.
    ///
    /// On cancellation or failure the partially written file is removed.
    pub fn run(
        &self,
        request: &TransferRequest,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(&TransferProgress),
    ) -> Result<FetchSummary, FetchError> {
        let destination = request.destination_path();
        info!(
            source = request.source_address(),
            destination = %destination.display(),
            "starting download"
        );

        let stream = self.source.open(request.source_address())?;
        let total = stream.content_length.unwrap_or(0);

        fs_utils::ensure_dir_exists(request.destination_directory()).map_err(|e| {
            FetchError::io(format!(
                "cannot create {}: {e}",
                request.destination_directory().display()
            ))
        })?;

        let file = File::create(&destination)
            .map_err(|e| FetchError::io(format!("cannot create {}: {e}", destination.display())))?;

        // Both handles are moved in and dropped before any cleanup below.
        let copied = self.copy(stream.reader, file, &destination, total, cancel, on_progress);

        match copied {
            Ok(bytes) => {
                info!(destination = %destination.display(), bytes, "download finished");
                Ok(FetchSummary {
                    path: destination,
                    bytes,
                })
            }
            Err(err) => {
                discard_partial(&destination);
                if err.is_cancelled() {
                    info!(destination = %destination.display(), "download cancelled");
                } else {
                    warn!(source = request.source_address(), error = %err, "download failed");
                }
                Err(err)
            }
        }
    }

    fn copy(
        &self,
        mut reader: Box<dyn Read + Send>,
        file: File,
        destination: &Path,
        total: u64,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(&TransferProgress),
    ) -> Result<u64, FetchError> {
        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0u8; self.chunk_size];
        let mut progress = TransferProgress::new(total);
        on_progress(&progress);

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FetchError::io(format!("read error: {e}"))),
            };

            progress.advance(read as u64)?;
            on_progress(&progress);

            writer
                .write_all(&buffer[..read])
                .map_err(|e| write_error(destination, e))?;
        }

        writer.flush().map_err(|e| write_error(destination, e))?;

        if progress.is_determinate() && !progress.is_complete() {
            return Err(FetchError::io(format!(
                "connection closed after {} of {} bytes",
                progress.bytes_transferred, progress.total_bytes
            )));
        }

        if progress.settle_unknown_total() {
            on_progress(&progress);
        }

        Ok(progress.bytes_transferred)
    }
}

fn write_error(path: &Path, e: io::Error) -> FetchError {
    FetchError::io(format!("cannot write {}: {e}", path.display()))
}

fn discard_partial(path: &Path) {
    if let Err(e) = fs_utils::remove_file_if_exists(path) {
        warn!(path = %path.display(), error = %e, "could not remove partial download");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::progress::percent_of;
    use crate::core::source::SourceStream;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use tempfile::TempDir;

    /// In-memory source serving a fixed payload.
    pub(crate) struct MemorySource {
        pub payload: Vec<u8>,
        pub advertised: Option<u64>,
    }

    impl MemorySource {
        pub(crate) fn new(payload: Vec<u8>) -> Self {
            let advertised = Some(payload.len() as u64);
            Self {
                payload,
                advertised,
            }
        }
    }

    impl ByteSource for MemorySource {
        fn open(&self, _address: &str) -> Result<SourceStream, FetchError> {
            Ok(SourceStream {
                content_length: self.advertised,
                reader: Box::new(Cursor::new(self.payload.clone())),
            })
        }
    }

    struct FailingSource;

    impl ByteSource for FailingSource {
        fn open(&self, address: &str) -> Result<SourceStream, FetchError> {
            Err(FetchError::io(format!("connection refused: {address}")))
        }
    }

    /// Reader that fails after yielding some bytes.
    struct BrokenReader {
        remaining: usize,
    }

    impl Read for BrokenReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            let n = buf.len().min(self.remaining);
            buf[..n].fill(7);
            self.remaining -= n;
            Ok(n)
        }
    }

    struct BrokenSource;

    impl ByteSource for BrokenSource {
        fn open(&self, _address: &str) -> Result<SourceStream, FetchError> {
            Ok(SourceStream {
                content_length: Some(10_000),
                reader: Box::new(BrokenReader { remaining: 3_000 }),
            })
        }
    }

    pub(crate) fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn request(temp: &TempDir) -> TransferRequest {
        TransferRequest::new("http://x/sample.zip", temp.path().join("out"), "sample.zip")
    }

    #[test]
    fn test_chunk_size_is_clamped() {
        let source: Arc<dyn ByteSource> = Arc::new(MemorySource::new(Vec::new()));
        assert_eq!(Fetcher::new(source.clone()).chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(
            Fetcher::new(source.clone()).with_chunk_size(1).chunk_size(),
            MIN_CHUNK_SIZE
        );
        assert_eq!(
            Fetcher::new(source).with_chunk_size(1 << 20).chunk_size(),
            MAX_CHUNK_SIZE
        );
    }

    #[test]
    fn test_download_is_faithful_copy() {
        let data = payload(200_003);
        for chunk_size in [MIN_CHUNK_SIZE, 4096, 10_000, MAX_CHUNK_SIZE] {
            let temp = TempDir::new().unwrap();
            let fetcher = Fetcher::new(Arc::new(MemorySource::new(data.clone())))
                .with_chunk_size(chunk_size);
            let request = request(&temp);

            let summary = fetcher
                .run(&request, &CancelToken::new(), &mut |_| {})
                .unwrap();

            assert_eq!(summary.bytes, data.len() as u64);
            assert_eq!(summary.path, request.destination_path());
            assert_eq!(std::fs::read(&summary.path).unwrap(), data);
        }
    }

    #[test]
    fn test_progress_snapshots() {
        let temp = TempDir::new().unwrap();
        let fetcher =
            Fetcher::new(Arc::new(MemorySource::new(payload(532_000)))).with_chunk_size(1024);

        let mut snapshots = Vec::new();
        fetcher
            .run(&request(&temp), &CancelToken::new(), &mut |p| {
                snapshots.push(*p)
            })
            .unwrap();

        assert_eq!(snapshots.first().unwrap().bytes_transferred, 0);
        for pair in snapshots.windows(2) {
            assert!(pair[0].bytes_transferred <= pair[1].bytes_transferred);
        }
        for p in &snapshots {
            assert_eq!(p.total_bytes, 532_000);
            assert_eq!(p.percent_complete, percent_of(p.bytes_transferred, 532_000));
        }
        assert_eq!(
            *snapshots.last().unwrap(),
            TransferProgress {
                bytes_transferred: 532_000,
                total_bytes: 532_000,
                percent_complete: 100,
            }
        );
    }

    #[test]
    fn test_unknown_length_reports_zero_then_completes() {
        let temp = TempDir::new().unwrap();
        let mut source = MemorySource::new(payload(5_000));
        source.advertised = None;
        let fetcher = Fetcher::new(Arc::new(source)).with_chunk_size(1024);

        let mut snapshots = Vec::new();
        let summary = fetcher
            .run(&request(&temp), &CancelToken::new(), &mut |p| {
                snapshots.push(*p)
            })
            .unwrap();

        assert_eq!(summary.bytes, 5_000);
        let (last, rest) = snapshots.split_last().unwrap();
        assert!(rest
            .iter()
            .all(|p| p.percent_complete == 0 && p.total_bytes == 0));
        assert_eq!(last.total_bytes, 5_000);
        assert_eq!(last.percent_complete, 100);
    }

    #[test]
    fn test_cancel_removes_partial_file() {
        let temp = TempDir::new().unwrap();
        let fetcher =
            Fetcher::new(Arc::new(MemorySource::new(payload(100_000)))).with_chunk_size(1024);
        let request = request(&temp);
        let cancel = CancelToken::new();

        let result = fetcher.run(&request, &cancel, &mut |p| {
            if p.bytes_transferred >= 4096 {
                cancel.cancel();
            }
        });

        assert_eq!(result, Err(FetchError::Cancelled));
        assert!(!request.destination_path().exists());
        assert!(request.destination_directory().is_dir());
    }

    #[test]
    fn test_open_failure_is_io_failure() {
        let temp = TempDir::new().unwrap();
        let fetcher = Fetcher::new(Arc::new(FailingSource));
        let request = request(&temp);

        let result = fetcher.run(&request, &CancelToken::new(), &mut |_| {});

        assert!(matches!(result, Err(FetchError::IoFailure(_))));
        assert!(!request.destination_path().exists());
    }

    #[test]
    fn test_read_failure_removes_partial_file() {
        let temp = TempDir::new().unwrap();
        let fetcher = Fetcher::new(Arc::new(BrokenSource)).with_chunk_size(1024);
        let request = request(&temp);

        let result = fetcher.run(&request, &CancelToken::new(), &mut |_| {});

        assert!(matches!(result, Err(FetchError::IoFailure(msg)) if msg.contains("read error")));
        assert!(!request.destination_path().exists());
    }

    #[test]
    fn test_oversized_body_fails() {
        let temp = TempDir::new().unwrap();
        let mut source = MemorySource::new(payload(3_000));
        source.advertised = Some(2_000);
        let fetcher = Fetcher::new(Arc::new(source)).with_chunk_size(1024);

        let mut snapshots = Vec::new();
        let result = fetcher.run(&request(&temp), &CancelToken::new(), &mut |p| {
            snapshots.push(*p)
        });

        assert!(result.is_err());
        assert!(snapshots.iter().all(|p| p.bytes_transferred <= 2_000));
    }

    #[test]
    fn test_truncated_body_fails() {
        let temp = TempDir::new().unwrap();
        let mut source = MemorySource::new(payload(1_500));
        source.advertised = Some(2_000);
        let fetcher = Fetcher::new(Arc::new(source));

        let result = fetcher.run(&request(&temp), &CancelToken::new(), &mut |_| {});

        assert!(
            matches!(result, Err(FetchError::IoFailure(msg)) if msg.contains("1500 of 2000"))
        );
    }

    #[test]
    fn test_overwrites_existing_destination() {
        let temp = TempDir::new().unwrap();
        let request = request(&temp);
        std::fs::create_dir_all(request.destination_directory()).unwrap();
        std::fs::write(request.destination_path(), vec![9u8; 50_000]).unwrap();

        let data = payload(1_000);
        Fetcher::new(Arc::new(MemorySource::new(data.clone())))
            .run(&request, &CancelToken::new(), &mut |_| {})
            .unwrap();

        assert_eq!(std::fs::read(request.destination_path()).unwrap(), data);
    }
}
