//! Terminal rendering of run events.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::core::dispatcher::{RunId, RunObserver, RunOutcome};
use crate::core::progress::TransferProgress;

const BAR_TEMPLATE: &str = "  [{elapsed_precise}] [{bar:30.cyan/blue}] {percent:>3}% {msg}";
const SPINNER_TEMPLATE: &str = "  {spinner:.green} [{elapsed_precise}] {msg}";

/// Draws a byte bar while downloading and a spinner while extracting.
pub struct TerminalObserver {
    extract_follows: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalObserver {
    /// `extract_follows` starts the extraction spinner as soon as the
    /// download completes.
    pub fn new(extract_follows: bool) -> Self {
        Self {
            extract_follows,
            bar: Mutex::new(None),
        }
    }

    /// For a standalone extraction run: the spinner starts right away.
    pub fn extracting() -> Self {
        Self {
            extract_follows: false,
            bar: Mutex::new(Some(spinner("Extracting archive..."))),
        }
    }

    fn bar(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RunObserver for TerminalObserver {
    fn on_progress(&self, _run: RunId, progress: &TransferProgress) {
        let mut slot = self.bar();
        let bar = slot.get_or_insert_with(|| download_bar(progress));
        if progress.is_determinate() {
            bar.set_length(progress.total_bytes);
        }
        bar.set_position(progress.bytes_transferred);
        bar.set_message(progress.message());
    }

    fn on_finished(&self, _run: RunId, outcome: &RunOutcome) {
        let mut slot = self.bar();
        if let Some(bar) = slot.take() {
            match outcome {
                RunOutcome::Fetched(_) | RunOutcome::Extracted(_) => bar.finish_and_clear(),
                RunOutcome::FetchFailed(_) | RunOutcome::ExtractFailed(_) => bar.abandon(),
            }
        }

        if matches!(outcome, RunOutcome::Fetched(_)) && self.extract_follows {
            *slot = Some(spinner("Extracting archive..."));
        }
    }
}

fn download_bar(progress: &TransferProgress) -> ProgressBar {
    if !progress.is_determinate() {
        return spinner("Downloading...");
    }

    let bar = ProgressBar::new(progress.total_bytes);
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    bar.set_style(style);
    bar
}

/// Spinner for work without a known length.
pub fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::ExtractSummary;
    use crate::core::fetcher::FetchSummary;
    use crate::error::FetchError;
    use std::path::PathBuf;

    fn fetched() -> RunOutcome {
        RunOutcome::Fetched(FetchSummary {
            path: PathBuf::from("out/a.zip"),
            bytes: 10,
        })
    }

    #[test]
    fn test_bar_follows_progress() {
        let observer = TerminalObserver::new(false);
        let mut progress = TransferProgress::new(4_096);
        progress.advance(1_024).unwrap();

        observer.on_progress(RunId::default(), &progress);

        let slot = observer.bar();
        let bar = slot.as_ref().unwrap();
        assert_eq!(bar.length(), Some(4_096));
        assert_eq!(bar.position(), 1_024);
    }

    #[test]
    fn test_spinner_after_download_when_extracting() {
        let observer = TerminalObserver::new(true);
        observer.on_progress(RunId::default(), &TransferProgress::new(10));
        observer.on_finished(RunId::default(), &fetched());
        assert!(observer.bar().is_some());

        let quiet = TerminalObserver::new(true);
        quiet.on_finished(RunId::default(), &RunOutcome::FetchFailed(FetchError::Cancelled));
        assert!(quiet.bar().is_none());

        let fetch_only = TerminalObserver::new(false);
        fetch_only.on_finished(RunId::default(), &fetched());
        assert!(fetch_only.bar().is_none());
    }

    #[test]
    fn test_extracting_spinner_clears_when_done() {
        let observer = TerminalObserver::extracting();
        assert!(observer.bar().is_some());
        observer.on_finished(
            RunId::default(),
            &RunOutcome::Extracted(ExtractSummary::default()),
        );
        assert!(observer.bar().is_none());
    }
}
