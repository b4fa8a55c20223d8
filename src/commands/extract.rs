use crate::commands::progress::TerminalObserver;
use crate::commands::settle;
use crate::core::config::Config;
use crate::core::dispatcher::{observe, Dispatcher, RunOutcome};
use crate::core::request::ArchiveExtractionRequest;
use crate::core::source::DefaultSource;
use crate::error::Result;
use crate::utils::format::human_size;
use std::path::Path;
use std::sync::Arc;

/// Build the request for `fetchzip extract`.
///
/// `dest` names the root folder exactly. Otherwise the root is named after
/// the archive and placed in `into`, or next to the archive.
pub fn extraction_request(
    archive: &Path,
    into: Option<&Path>,
    dest: Option<&Path>,
) -> ArchiveExtractionRequest {
    match (dest, into) {
        (Some(dest), _) => ArchiveExtractionRequest::new(archive, dest),
        (None, Some(into)) => ArchiveExtractionRequest::from_archive(archive, into),
        (None, None) => {
            let beside = archive
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            ArchiveExtractionRequest::from_archive(archive, beside)
        }
    }
}

pub fn extract_archive(
    config: &Config,
    archive: &Path,
    into: Option<&Path>,
    dest: Option<&Path>,
) -> Result<()> {
    let request = extraction_request(archive, into, dest);
    let source = DefaultSource::new(&config.source_settings())?;
    let dispatcher = Dispatcher::new(Arc::new(source), config.dispatcher_settings());
    println!(
        "Extracting {} into {}",
        request.archive_path().display(),
        request.destination_directory().display()
    );

    let observer = Arc::new(TerminalObserver::extracting());
    let run = dispatcher.start_extract(request, observe(&observer));
    let RunOutcome::Extracted(summary) = settle(&dispatcher, run)? else {
        return Ok(());
    };

    println!(
        "✅ Extracted {} files and {} directories ({})",
        summary.files,
        summary.directories,
        human_size(summary.bytes)
    );
    if summary.skipped > 0 {
        println!(
            "⚠️  Skipped {} entries with paths outside the destination",
            summary.skipped
        );
    }
    Ok(())
}
