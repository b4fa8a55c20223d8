use crate::commands::progress::TerminalObserver;
use crate::commands::settle;
use crate::core::config::Config;
use crate::core::dispatcher::{observe, Dispatcher, RunOutcome};
use crate::core::source::DefaultSource;
use crate::error::{FetchzipError, Result};
use crate::utils::format::human_size;
use std::sync::Arc;

pub fn fetch_archive(config: &Config) -> Result<()> {
    let request = config.transfer_request()?;
    let source = DefaultSource::new(&config.source_settings())?;
    let dispatcher = Dispatcher::new(Arc::new(source), config.dispatcher_settings());
    install_cancel_handler(&dispatcher)?;

    println!("Downloading {}", request.source_address());
    println!("  Destination: {}", request.destination_path().display());
    println!("Press Ctrl+C to cancel");

    let observer = Arc::new(TerminalObserver::new(
        dispatcher.settings().extract_after_fetch,
    ));
    let fetch = dispatcher.start_fetch(request, observe(&observer));

    if let RunOutcome::Fetched(summary) = settle(&dispatcher, fetch)? {
        println!(
            "✅ Downloaded {} to {}",
            human_size(summary.bytes),
            summary.path.display()
        );
    }

    let Some(extract) = dispatcher.follow_up(fetch) else {
        return Ok(());
    };

    if let RunOutcome::Extracted(summary) = settle(&dispatcher, extract)? {
        println!(
            "✅ Extracted {} files and {} directories into {}",
            summary.files,
            summary.directories,
            summary.root.display()
        );
        if summary.skipped > 0 {
            println!(
                "⚠️  Skipped {} entries with paths outside the destination",
                summary.skipped
            );
        }
    }

    Ok(())
}

fn install_cancel_handler(dispatcher: &Dispatcher) -> Result<()> {
    let dispatcher = dispatcher.clone();
    ctrlc::set_handler(move || {
        if dispatcher.cancel_fetch() {
            eprintln!();
            eprintln!("Cancelling download...");
        }
    })
    .map_err(|e| FetchzipError::SignalHandler {
        message: e.to_string(),
    })
}
