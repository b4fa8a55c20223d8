pub mod config;
pub mod extract;
pub mod fetch;
pub mod progress;

use crate::core::dispatcher::{Dispatcher, RunId, RunOutcome};
use crate::error::{FetchzipError, Result};

/// Block until `run` finishes, turning a failed outcome into an error.
fn settle(dispatcher: &Dispatcher, run: RunId) -> Result<RunOutcome> {
    match dispatcher.wait(run) {
        Some(RunOutcome::FetchFailed(err)) => Err(err.into()),
        Some(RunOutcome::ExtractFailed(err)) => Err(err.into()),
        Some(outcome) => Ok(outcome),
        None => Err(FetchzipError::UnknownRun {
            run: run.to_string(),
        }),
    }
}
