use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ::time::{format_description::well_known, OffsetDateTime};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::error::SearchError;
use crate::progress::SearchProgress;
use crate::tester::{CandidateTester, Radio, DEFAULT_ATTEMPT_TIMEOUT};
use crate::types::{SearchOutcome, SearchReport, TargetNetwork};
use crate::wordlist::WordlistReader;

pub const DEFAULT_WORKERS: usize = 4;
const MAX_WORKERS: usize = 64;

/// Where the candidates and checkpoint live, and how hard to push.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub wordlist: PathBuf,
    pub checkpoint: PathBuf,
    pub workers: usize,
    pub attempt_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            wordlist: PathBuf::from("rockyou.txt"),
            checkpoint: PathBuf::from("checkpoint.txt"),
            workers: DEFAULT_WORKERS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    Idle,
    Loading,
    Running,
    Found,
    Exhausted,
    Cancelled,
}

impl SearchState {
    pub fn is_active(self) -> bool {
        !matches!(self, SearchState::Idle)
    }
}

#[derive(Debug)]
struct RunSlot {
    state: SearchState,
    cancel: Option<CancellationToken>,
    progress: Option<Arc<SearchProgress>>,
}

/// Returns the slot to `Idle` however the run future ends.
struct RunGuard<'a>(&'a Mutex<RunSlot>);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.0.lock();
        slot.state = SearchState::Idle;
        slot.cancel = None;
        slot.progress = None;
    }
}

/// Runs passphrase searches against the selected target, one at a time.
///
/// Workers share a single wordlist cursor and a single radio. Reads are
/// serialized by the cursor lock, and radio attempts are issued in read
/// order, so the bytes completed so far always form a prefix of the file.
/// That prefix is what gets checkpointed.
#[derive(Debug)]
pub struct SearchCoordinator<R> {
    config: SearchConfig,
    tester: Arc<CandidateTester<R>>,
    checkpoint: CheckpointStore,
    target: RwLock<Option<TargetNetwork>>,
    slot: Mutex<RunSlot>,
}

impl<R: Radio> SearchCoordinator<R> {
    pub fn new(config: SearchConfig, radio: R) -> Self {
        let tester = CandidateTester::with_timeout(radio, config.attempt_timeout);
        Self {
            checkpoint: CheckpointStore::new(config.checkpoint.clone()),
            tester: Arc::new(tester),
            config,
            target: RwLock::new(None),
            slot: Mutex::new(RunSlot {
                state: SearchState::Idle,
                cancel: None,
                progress: None,
            }),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn select_target(&self, target: TargetNetwork) {
        *self.target.write() = Some(target);
    }

    pub fn clear_target(&self) {
        *self.target.write() = None;
    }

    pub fn target(&self) -> Option<TargetNetwork> {
        self.target.read().clone()
    }

    pub fn state(&self) -> SearchState {
        self.slot.lock().state
    }

    /// Progress of the run in flight, if any.
    pub fn progress(&self) -> Option<Arc<SearchProgress>> {
        self.slot.lock().progress.clone()
    }

    /// Percent complete of the run in flight; `0` when idle.
    pub fn percent(&self) -> u8 {
        self.progress().map(|p| p.percent()).unwrap_or(0)
    }

    /// Ask the current run to stop. Attempts already on the radio finish.
    pub fn cancel(&self) {
        if let Some(cancel) = self.slot.lock().cancel.as_ref() {
            info!("cancellation requested");
            cancel.cancel();
        }
    }

    pub async fn run(&self) -> Result<SearchReport, SearchError> {
        self.run_with_cancel(CancellationToken::new()).await
    }

    /// Run with an externally owned cancellation token.
    pub async fn run_with_cancel(
        &self,
        cancel: CancellationToken,
    ) -> Result<SearchReport, SearchError> {
        let target = self.claim(&cancel)?;
        let _guard = RunGuard(&self.slot);
        self.execute(target, cancel).await
    }

    /// Claim the run slot now and drive the search on a background task.
    ///
    /// Refusals are returned before anything is spawned, so a caller that
    /// gets a handle knows its search is the one running.
    pub fn start(
        self: &Arc<Self>,
    ) -> Result<JoinHandle<Result<SearchReport, SearchError>>, SearchError> {
        let cancel = CancellationToken::new();
        let target = self.claim(&cancel)?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let _guard = RunGuard(&this.slot);
            this.execute(target, cancel).await
        }))
    }

    fn claim(&self, cancel: &CancellationToken) -> Result<TargetNetwork, SearchError> {
        let target = self.target().ok_or(SearchError::NoTargetSelected)?;
        let mut slot = self.slot.lock();
        if slot.state.is_active() {
            return Err(SearchError::AlreadyRunning);
        }
        slot.state = SearchState::Loading;
        slot.cancel = Some(cancel.clone());
        slot.progress = None;
        Ok(target)
    }

    async fn execute(
        &self,
        target: TargetNetwork,
        cancel: CancellationToken,
    ) -> Result<SearchReport, SearchError> {
        let started = Instant::now();
        let started_at = now_rfc3339();
        let resume = self.checkpoint.load().await;

        let mut reader = match WordlistReader::open(&self.config.wordlist).await {
            Ok(reader) => reader,
            Err(e) => {
                self.save_checkpoint(resume).await;
                return Err(e);
            }
        };
        let start = match reader.seek(resume).await {
            Ok(start) => start,
            Err(e) => {
                self.save_checkpoint(resume).await;
                return Err(e);
            }
        };

        let progress = Arc::new(SearchProgress::resuming_at(reader.len(), start));
        {
            let mut slot = self.slot.lock();
            slot.progress = Some(Arc::clone(&progress));
            slot.state = SearchState::Running;
        }
        let workers = self.config.workers.clamp(1, MAX_WORKERS);
        info!(
            ssid = %target.ssid,
            bssid = %target.bssid,
            wordlist = %self.config.wordlist.display(),
            start,
            total = reader.len(),
            workers,
            "search started"
        );

        let pool = run_workers(
            reader,
            Arc::clone(&self.tester),
            target.clone(),
            Arc::clone(&progress),
            cancel,
            workers,
        )
        .await;

        let offset = progress.position();
        let outcome = match pool.failure {
            Some(e) => {
                error!(error = %e, offset, "search aborted");
                self.save_checkpoint(offset).await;
                return Err(e);
            }
            None => pool.outcome,
        };

        self.slot.lock().state = match &outcome {
            SearchOutcome::Found(_) => SearchState::Found,
            SearchOutcome::Exhausted => SearchState::Exhausted,
            SearchOutcome::Cancelled => SearchState::Cancelled,
        };
        self.save_checkpoint(offset).await;

        let elapsed = started.elapsed();
        info!(
            outcome = outcome_label(&outcome),
            tested = pool.tested,
            checkpoint = offset,
            elapsed_ms = elapsed.as_millis() as u64,
            "search finished"
        );

        Ok(SearchReport {
            target,
            outcome,
            tested: pool.tested,
            checkpoint: offset,
            started_at,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }

    async fn save_checkpoint(&self, offset: u64) {
        if let Err(e) = self.checkpoint.save(offset).await {
            error!(
                offset,
                path = %self.checkpoint.path().display(),
                error = %e,
                "failed to save checkpoint"
            );
        }
    }
}

fn outcome_label(outcome: &SearchOutcome) -> &'static str {
    match outcome {
        SearchOutcome::Found(_) => "found",
        SearchOutcome::Exhausted => "exhausted",
        SearchOutcome::Cancelled => "cancelled",
    }
}

/// Hands out radio turns in ticket order.
#[derive(Debug)]
struct Turnstile {
    serving: watch::Sender<u64>,
    halt: CancellationToken,
}

/// Holding one means it is this ticket's turn; dropping it passes the turn on.
struct Turn<'a>(&'a Turnstile);

impl Turnstile {
    /// `halt` is cancelled if a turn is dropped by a panicking holder.
    fn new(halt: CancellationToken) -> Self {
        Self {
            serving: watch::Sender::new(0),
            halt,
        }
    }

    async fn wait(&self, ticket: u64) -> Turn<'_> {
        let mut rx = self.serving.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|serving| *serving >= ticket).await;
        Turn(self)
    }
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        // The next ticket must not complete ahead of one that never finished.
        if std::thread::panicking() {
            self.0.halt.cancel();
        }
        self.0.serving.send_modify(|serving| *serving += 1);
    }
}

struct Shared<R> {
    cursor: AsyncMutex<WordlistReader>,
    turns: Turnstile,
    tester: Arc<CandidateTester<R>>,
    target: TargetNetwork,
    progress: Arc<SearchProgress>,
    stop: CancellationToken,
    winner: Mutex<Option<String>>,
    tested: AtomicU64,
    drained: AtomicBool,
}

impl<R> Shared<R> {
    fn should_stop(&self) -> bool {
        self.progress.is_found() || self.stop.is_cancelled()
    }
}

struct PoolSummary {
    outcome: SearchOutcome,
    tested: u64,
    failure: Option<SearchError>,
}

async fn run_workers<R: Radio>(
    reader: WordlistReader,
    tester: Arc<CandidateTester<R>>,
    target: TargetNetwork,
    progress: Arc<SearchProgress>,
    cancel: CancellationToken,
    workers: usize,
) -> PoolSummary {
    let stop = cancel.child_token();
    let shared = Arc::new(Shared {
        cursor: AsyncMutex::new(reader),
        turns: Turnstile::new(stop.clone()),
        tester,
        target,
        progress,
        stop,
        winner: Mutex::new(None),
        tested: AtomicU64::new(0),
        drained: AtomicBool::new(false),
    });

    let mut set = JoinSet::new();
    for id in 0..workers {
        set.spawn(worker(id, Arc::clone(&shared)));
    }

    let mut failure = None;
    while let Some(res) = set.join_next().await {
        let err = match res {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(join) => SearchError::Worker(join.to_string()),
        };
        shared.stop.cancel();
        failure.get_or_insert(err);
    }

    let read_to = shared.cursor.lock().await.offset();
    let winner = shared.winner.lock().take();
    let outcome = match winner {
        Some(passphrase) => SearchOutcome::Found(passphrase),
        None if shared.drained.load(Ordering::Acquire)
            && shared.progress.position() >= read_to =>
        {
            SearchOutcome::Exhausted
        }
        None => SearchOutcome::Cancelled,
    };

    PoolSummary {
        outcome,
        tested: shared.tested.load(Ordering::Acquire),
        failure,
    }
}

async fn worker<R: Radio>(id: usize, shared: Arc<Shared<R>>) -> Result<(), SearchError> {
    loop {
        if shared.should_stop() {
            return Ok(());
        }

        let candidate = {
            let mut cursor = shared.cursor.lock().await;
            match cursor.next_candidate().await? {
                Some(candidate) => candidate,
                None => {
                    shared.drained.store(true, Ordering::Release);
                    return Ok(());
                }
            }
        };

        let _turn = shared.turns.wait(candidate.ticket).await;
        if shared.should_stop() {
            debug!(worker = id, ticket = candidate.ticket, "stopping before test");
            return Ok(());
        }

        if candidate.is_testable() {
            let attempt = shared
                .tester
                .try_candidate(&shared.target, &candidate.text)
                .await;
            shared.tested.fetch_add(1, Ordering::AcqRel);
            if attempt.is_accepted() {
                if shared.progress.mark_found() {
                    *shared.winner.lock() = Some(candidate.text.clone());
                    info!(worker = id, ssid = %shared.target.ssid, "passphrase found");
                } else {
                    warn!(worker = id, "second accepted candidate ignored");
                }
            }
        }
        shared.progress.advance(candidate.bytes);
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn turnstile_serves_tickets_in_order() {
        let gate = Arc::new(Turnstile::new(CancellationToken::new()));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut set = JoinSet::new();
        for ticket in (0..6u64).rev() {
            let gate = Arc::clone(&gate);
            let order = Arc::clone(&order);
            set.spawn(async move {
                let _turn = gate.wait(ticket).await;
                order.lock().push(ticket);
            });
        }
        while set.join_next().await.is_some() {}
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn turn_dropped_by_panic_halts_later_tickets() {
        let halt = CancellationToken::new();
        let gate = Arc::new(Turnstile::new(halt.clone()));

        let g = Arc::clone(&gate);
        let res = tokio::spawn(async move {
            let _turn = g.wait(0).await;
            panic!("attempt blew up");
        })
        .await;
        assert!(res.unwrap_err().is_panic());
        assert!(halt.is_cancelled());

        // The turn still moves on so waiters can observe the halt.
        let _next = gate.wait(1).await;
    }

    #[test]
    fn only_idle_is_inactive() {
        assert!(!SearchState::Idle.is_active());
        assert!(SearchState::Loading.is_active());
        assert!(SearchState::Cancelled.is_active());
    }
}
