//! Background execution of fetch and extract runs.
//!
//! Each run executes on its own worker thread and is tracked in a registry
//! keyed by [`RunId`]. A run never owns its observer: it holds a weak
//! reference that the front end can swap with [`Dispatcher::rebind_observer`]
//! after recreating itself, while progress and the terminal outcome stay
//! queryable by id.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::thread;

use tracing::{info, warn};

use crate::core::extractor::{ExtractSummary, Extractor};
use crate::core::fetcher::{CancelToken, FetchSummary, Fetcher, DEFAULT_CHUNK_SIZE};
use crate::core::progress::TransferProgress;
use crate::core::request::{ArchiveExtractionRequest, TransferRequest};
use crate::core::source::ByteSource;
use crate::error::{ExtractError, FetchError};

/// Identifies a run for its whole lifetime. Ids start at `run-1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Fetch,
    Extract,
}

/// Terminal outcome of a run. Exactly one is produced per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Fetched(FetchSummary),
    FetchFailed(FetchError),
    Extracted(ExtractSummary),
    ExtractFailed(ExtractError),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Fetched(_) | RunOutcome::Extracted(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::FetchFailed(FetchError::Cancelled))
    }
}

/// Receives run events on the worker thread. Implementations should return
/// quickly since the run waits for each callback.
pub trait RunObserver: Send + Sync {
    fn on_progress(&self, _run: RunId, _progress: &TransferProgress) {}

    fn on_finished(&self, _run: RunId, _outcome: &RunOutcome) {}
}

struct Unbound;

impl RunObserver for Unbound {}

/// Weak handle to `observer` suitable for starting or rebinding a run.
pub fn observe<O: RunObserver + 'static>(observer: &Arc<O>) -> Weak<dyn RunObserver> {
    let weak: Weak<O> = Arc::downgrade(observer);
    weak
}

/// A handle that never upgrades; events are dropped until a rebind.
pub fn unobserved() -> Weak<dyn RunObserver> {
    Weak::<Unbound>::new()
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub chunk_size: usize,
    /// Start an extraction of the downloaded file once a fetch succeeds.
    pub extract_after_fetch: bool,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            extract_after_fetch: true,
        }
    }
}

#[derive(Default)]
struct SlotState {
    progress: TransferProgress,
    outcome: Option<RunOutcome>,
    follow_up: Option<RunId>,
    /// Set once the outcome has been handed to the observer.
    delivered: bool,
}

struct RunSlot {
    kind: RunKind,
    cancel: CancelToken,
    state: Mutex<SlotState>,
    settled: Condvar,
    observer: RwLock<Weak<dyn RunObserver>>,
}

impl RunSlot {
    fn new(kind: RunKind, observer: Weak<dyn RunObserver>) -> Self {
        Self {
            kind,
            cancel: CancelToken::new(),
            state: Mutex::new(SlotState::default()),
            settled: Condvar::new(),
            observer: RwLock::new(observer),
        }
    }

    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observer_handle(&self) -> Weak<dyn RunObserver> {
        self.observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn observer(&self) -> Option<Arc<dyn RunObserver>> {
        self.observer_handle().upgrade()
    }

    /// Swap the observer unless the outcome is already stored. The state
    /// lock is held across the check so `finish` sees either the old
    /// observer with a `false` result here, or the new one.
    fn rebind_if_running(&self, observer: Weak<dyn RunObserver>) -> bool {
        let state = self.state();
        if state.outcome.is_some() {
            return false;
        }
        *self.observer.write().unwrap_or_else(PoisonError::into_inner) = observer;
        true
    }

    fn record_progress(&self, id: RunId, progress: &TransferProgress) {
        self.state().progress = *progress;
        if let Some(observer) = self.observer() {
            observer.on_progress(id, progress);
        }
    }

    fn finish(&self, id: RunId, outcome: RunOutcome) {
        let observer = {
            let mut state = self.state();
            if state.outcome.is_some() {
                warn!(run = %id, "ignoring second outcome");
                return;
            }
            state.outcome = Some(outcome.clone());
            self.observer_handle()
        };

        if let Some(observer) = observer.upgrade() {
            observer.on_finished(id, &outcome);
        }

        self.state().delivered = true;
        self.settled.notify_all();
    }

    fn wait(&self) -> Option<RunOutcome> {
        let mut state = self.state();
        while !state.delivered {
            state = self
                .settled
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.outcome.clone()
    }
}

struct Shared {
    source: Arc<dyn ByteSource>,
    settings: DispatcherSettings,
    runs: Mutex<HashMap<RunId, Arc<RunSlot>>>,
    active_fetch: Mutex<Option<RunId>>,
    next_id: AtomicU64,
}

impl Shared {
    fn runs(&self) -> MutexGuard<'_, HashMap<RunId, Arc<RunSlot>>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active_fetch(&self) -> MutexGuard<'_, Option<RunId>> {
        self.active_fetch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, id: RunId) -> Option<Arc<RunSlot>> {
        self.runs().get(&id).cloned()
    }

    fn register(&self, kind: RunKind, observer: Weak<dyn RunObserver>) -> (RunId, Arc<RunSlot>) {
        let id = RunId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let slot = Arc::new(RunSlot::new(kind, observer));
        self.runs().insert(id, Arc::clone(&slot));
        (id, slot)
    }

    fn spawn_fetch(self: &Arc<Self>, id: RunId, slot: Arc<RunSlot>, request: TransferRequest) {
        info!(run = %id, source = request.source_address(), "fetch queued");
        let shared = Arc::clone(self);
        let worker_slot = Arc::clone(&slot);
        let spawned = thread::Builder::new()
            .name(format!("fetchzip-fetch-{}", id.0))
            .spawn(move || shared.run_fetch(id, worker_slot, request));

        if let Err(e) = spawned {
            self.clear_active_fetch(id);
            slot.finish(
                id,
                RunOutcome::FetchFailed(FetchError::io(format!("cannot start worker: {e}"))),
            );
        }
    }

    fn spawn_extract(&self, id: RunId, slot: Arc<RunSlot>, request: ArchiveExtractionRequest) {
        info!(run = %id, archive = %request.archive_path().display(), "extraction queued");
        let archive = request.archive_path().to_path_buf();
        let worker_slot = Arc::clone(&slot);
        let spawned = thread::Builder::new()
            .name(format!("fetchzip-extract-{}", id.0))
            .spawn(move || {
                let outcome = match Extractor::new().run(&request) {
                    Ok(summary) => RunOutcome::Extracted(summary),
                    Err(err) => RunOutcome::ExtractFailed(err),
                };
                worker_slot.finish(id, outcome);
            });

        if let Err(e) = spawned {
            slot.finish(
                id,
                RunOutcome::ExtractFailed(ExtractError::corrupt(
                    &archive,
                    format!("cannot start worker: {e}"),
                )),
            );
        }
    }

    fn run_fetch(self: Arc<Self>, id: RunId, slot: Arc<RunSlot>, request: TransferRequest) {
        let fetcher =
            Fetcher::new(Arc::clone(&self.source)).with_chunk_size(self.settings.chunk_size);
        let result = fetcher.run(&request, &slot.cancel, &mut |progress| {
            slot.record_progress(id, progress)
        });
        self.clear_active_fetch(id);

        match result {
            Ok(summary) if self.settings.extract_after_fetch => {
                let extraction = ArchiveExtractionRequest::following(&request);
                let (extract_id, extract_slot) =
                    self.register(RunKind::Extract, slot.observer_handle());
                slot.state().follow_up = Some(extract_id);
                slot.finish(id, RunOutcome::Fetched(summary));
                self.spawn_extract(extract_id, extract_slot, extraction);
            }
            Ok(summary) => slot.finish(id, RunOutcome::Fetched(summary)),
            Err(err) => slot.finish(id, RunOutcome::FetchFailed(err)),
        }
    }

    fn clear_active_fetch(&self, id: RunId) {
        let mut active = self.active_fetch();
        if *active == Some(id) {
            *active = None;
        }
    }
}

/// Starts runs in the background and answers queries about them.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    pub fn new(source: Arc<dyn ByteSource>, settings: DispatcherSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                settings,
                runs: Mutex::new(HashMap::new()),
                active_fetch: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.shared.settings
    }

    /// Start downloading `request` in the background. When enabled, a
    /// successful download is followed by an extraction run reported through
    /// [`Dispatcher::follow_up`].
    pub fn start_fetch(&self, request: TransferRequest, observer: Weak<dyn RunObserver>) -> RunId {
        let (id, slot) = self.shared.register(RunKind::Fetch, observer);
        *self.shared.active_fetch() = Some(id);
        self.shared.spawn_fetch(id, slot, request);
        id
    }

    /// Extract an archive in the background, independent of any download.
    pub fn start_extract(
        &self,
        request: ArchiveExtractionRequest,
        observer: Weak<dyn RunObserver>,
    ) -> RunId {
        let (id, slot) = self.shared.register(RunKind::Extract, observer);
        self.shared.spawn_extract(id, slot, request);
        id
    }

    /// Request cancellation of the most recently started fetch that is still
    /// running. Returns `false` when there is none.
    pub fn cancel_fetch(&self) -> bool {
        let active = *self.shared.active_fetch();
        active.is_some_and(|id| self.cancel(id))
    }

    /// Request cancellation of a fetch run. Extraction runs cannot be
    /// cancelled.
    pub fn cancel(&self, id: RunId) -> bool {
        match self.shared.slot(id) {
            Some(slot) if slot.kind == RunKind::Fetch && slot.state().outcome.is_none() => {
                info!(run = %id, "cancellation requested");
                slot.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn kind(&self, id: RunId) -> Option<RunKind> {
        self.shared.slot(id).map(|slot| slot.kind)
    }

    /// Latest progress snapshot of a run.
    pub fn progress(&self, id: RunId) -> Option<TransferProgress> {
        self.shared.slot(id).map(|slot| slot.state().progress)
    }

    pub fn is_running(&self, id: RunId) -> bool {
        self.shared
            .slot(id)
            .is_some_and(|slot| slot.state().outcome.is_none())
    }

    pub fn outcome(&self, id: RunId) -> Option<RunOutcome> {
        self.shared
            .slot(id)
            .and_then(|slot| slot.state().outcome.clone())
    }

    /// The extraction run started after a successful fetch, if any.
    pub fn follow_up(&self, id: RunId) -> Option<RunId> {
        self.shared.slot(id).and_then(|slot| slot.state().follow_up)
    }

    /// Point a running run at a new observer. Returns `false` when the run
    /// is unknown or has already finished; query [`Dispatcher::outcome`]
    /// instead in that case.
    pub fn rebind_observer(&self, id: RunId, observer: Weak<dyn RunObserver>) -> bool {
        self.shared
            .slot(id)
            .is_some_and(|slot| slot.rebind_if_running(observer))
    }

    /// Block until the run's outcome has been delivered.
    pub fn wait(&self, id: RunId) -> Option<RunOutcome> {
        self.shared.slot(id).and_then(|slot| slot.wait())
    }

    /// Drop finished runs from the registry. Returns how many were removed.
    pub fn prune_finished(&self) -> usize {
        let mut runs = self.shared.runs();
        let before = runs.len();
        runs.retain(|_, slot| !slot.state().delivered);
        before - runs.len()
    }
}
