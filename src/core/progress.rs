//! Progress accounting for a single download run.

use crate::error::FetchError;
use crate::utils::format::transfer_message;

/// Snapshot of a download in flight.
///
/// `total_bytes == 0` means the source did not advertise a length. In that
/// case the percentage is held at 0 until the run completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub percent_complete: u8,
}

impl TransferProgress {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            bytes_transferred: 0,
            total_bytes,
            percent_complete: 0,
        }
    }

    pub fn is_determinate(&self) -> bool {
        self.total_bytes > 0
    }

    /// Account for `count` more bytes.
    ///
    /// Fails when a known total would be exceeded; the snapshot is left
    /// unchanged in that case.
    pub fn advance(&mut self, count: u64) -> Result<(), FetchError> {
        let transferred = self.bytes_transferred.saturating_add(count);
        if self.is_determinate() && transferred > self.total_bytes {
            return Err(FetchError::io(format!(
                "source sent {transferred} bytes but advertised {}",
                self.total_bytes
            )));
        }
        self.bytes_transferred = transferred;
        self.percent_complete = percent_of(transferred, self.total_bytes);
        Ok(())
    }

    /// Close out an indeterminate transfer: the total becomes whatever was
    /// received and the percentage jumps to 100. Returns `false` when the
    /// total was already known, leaving the snapshot untouched.
    pub fn settle_unknown_total(&mut self) -> bool {
        if self.is_determinate() {
            return false;
        }
        self.total_bytes = self.bytes_transferred;
        self.percent_complete = 100;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.is_determinate() && self.bytes_transferred == self.total_bytes
    }

    /// Human readable `"downloaded / total"` message.
    pub fn message(&self) -> String {
        transfer_message(self.bytes_transferred, self.total_bytes)
    }
}

/// `floor(done * 100 / total)`, or 0 while the total is unknown.
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (u128::from(done) * 100) / u128::from(total);
    percent.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_percent_floor() {
        assert_eq!(percent_of(0, 532_000), 0);
        assert_eq!(percent_of(5_319, 532_000), 0);
        assert_eq!(percent_of(5_320, 532_000), 1);
        assert_eq!(percent_of(531_999, 532_000), 99);
        assert_eq!(percent_of(532_000, 532_000), 100);
        assert_eq!(percent_of(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn test_percent_unknown_total() {
        assert_eq!(percent_of(1_000, 0), 0);
    }

    #[test]
    fn test_advance_tracks_percentage() {
        let mut progress = TransferProgress::new(4_096);
        progress.advance(1_024).unwrap();
        assert_eq!(progress.percent_complete, 25);
        progress.advance(3_072).unwrap();
        assert_eq!(progress.percent_complete, 100);
        assert!(progress.is_complete());
        assert_eq!(progress.message(), "4.00 KB / 4.00 KB");
    }

    #[test]
    fn test_advance_past_total_fails() {
        let mut progress = TransferProgress::new(10);
        progress.advance(8).unwrap();
        assert!(progress.advance(3).is_err());
        assert_eq!(progress.bytes_transferred, 8);
    }

    #[test]
    fn test_settle_unknown_total() {
        let mut progress = TransferProgress::new(0);
        progress.advance(700).unwrap();
        assert_eq!(progress.percent_complete, 0);
        assert!(progress.settle_unknown_total());
        assert_eq!(
            progress,
            TransferProgress {
                bytes_transferred: 700,
                total_bytes: 700,
                percent_complete: 100,
            }
        );

        let mut known = TransferProgress::new(10);
        assert!(!known.settle_unknown_total());
    }
}
