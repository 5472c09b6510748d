use crate::pipeline::SeriesMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Idle,
    Fetching,
    Succeeded,
    Failed,
}

/// What consumers see. Replaced whole at the end of every cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSnapshot {
    pub series: Arc<SeriesMap>,
    /// True until the first cycle has finished, successfully or not.
    pub loading: bool,
    /// Message of the last failed cycle; cleared by the next success.
    pub error: Option<String>,
    /// When the series was last replaced.
    pub updated_at: Option<OffsetDateTime>,
    /// Number of successful publications so far.
    pub cycle: u64,
}

impl SeriesSnapshot {
    pub fn initial() -> Self {
        Self {
            series: Arc::new(SeriesMap::new()),
            loading: true,
            error: None,
            updated_at: None,
            cycle: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.updated_at.is_some()
    }
}

#[derive(Debug)]
pub struct AppState {
    snapshot: Arc<SeriesSnapshot>,
    snapshot_tx: watch::Sender<Arc<SeriesSnapshot>>,
    phase: PollPhase,
    phase_tx: watch::Sender<PollPhase>,
}

impl AppState {
    pub fn new() -> Self {
        let snapshot = Arc::new(SeriesSnapshot::initial());
        let (snapshot_tx, _snapshot_rx) = watch::channel(Arc::clone(&snapshot));
        let (phase_tx, _phase_rx) = watch::channel(PollPhase::Idle);
        Self {
            snapshot,
            snapshot_tx,
            phase: PollPhase::Idle,
            phase_tx,
        }
    }

    pub fn snapshot(&self) -> Arc<SeriesSnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Arc<SeriesSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<PollPhase> {
        self.phase_tx.subscribe()
    }

    pub fn set_phase(&mut self, phase: PollPhase) {
        self.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    /// Replaces the series and clears any previous error.
    pub fn publish_success(&mut self, series: SeriesMap, at: OffsetDateTime) {
        let next = SeriesSnapshot {
            series: Arc::new(series),
            loading: false,
            error: None,
            updated_at: Some(at),
            cycle: self.snapshot.cycle + 1,
        };
        self.replace(next);
    }

    /// Keeps the series already on display and flags the failure next to it.
    pub fn publish_failure(&mut self, error: impl Into<String>) {
        let next = SeriesSnapshot {
            series: Arc::clone(&self.snapshot.series),
            loading: false,
            error: Some(error.into()),
            updated_at: self.snapshot.updated_at,
            cycle: self.snapshot.cycle,
        };
        self.replace(next);
    }

    fn replace(&mut self, next: SeriesSnapshot) {
        let next = Arc::new(next);
        self.snapshot = Arc::clone(&next);
        self.snapshot_tx.send_replace(next);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
