use crate::error::{AppError, FetchError};
use crate::estimation::WaitTimeEstimator;
use crate::pipeline::build_series;
use crate::state::{AppState, PollPhase};
use crate::store::{DocumentStore, RawDocument};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Published { locations: usize, points: usize },
    Failed,
}

pub struct Poller {
    store: Arc<dyn DocumentStore>,
    estimator: WaitTimeEstimator,
    state: Arc<RwLock<AppState>>,
    interval: Duration,
    window: Duration,
}

impl Poller {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        estimator: WaitTimeEstimator,
        state: Arc<RwLock<AppState>>,
        interval: Duration,
        window: Duration,
    ) -> Self {
        Self {
            store,
            estimator,
            state,
            interval,
            window,
        }
    }

    /// Starts polling on the current runtime. The first cycle runs immediately.
    pub fn spawn(self) -> PollerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        info!(
            interval_ms = self.interval.as_millis(),
            window_ms = self.window.as_millis(),
            "Starting poller"
        );
        let task = tokio::spawn(self.run(shutdown_rx));
        PollerHandle { shutdown_tx, task }
    }

    /// Runs a single fetch-and-publish cycle.
    pub async fn poll_once(&self) -> Result<CycleOutcome, AppError> {
        self.set_phase(PollPhase::Fetching)?;
        let fetched = self.store.fetch_all().await;
        self.complete_cycle(fetched, OffsetDateTime::now_utc())
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        // A slow cycle delays the next one instead of queueing a burst
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            if let Err(err) = self.set_phase(PollPhase::Fetching) {
                warn!(error = %err, "Failed to record fetch phase");
            }

            let fetched = tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!("Abandoning in-flight fetch on shutdown");
                    break;
                }
                fetched = self.store.fetch_all() => fetched,
            };

            if *shutdown.borrow() {
                break;
            }

            if let Err(err) = self.complete_cycle(fetched, OffsetDateTime::now_utc()) {
                warn!(error = %err, "Error publishing poll cycle");
            }
        }

        info!("Poller stopped");
    }

    fn complete_cycle(
        &self,
        fetched: Result<Vec<RawDocument>, FetchError>,
        now: OffsetDateTime,
    ) -> Result<CycleOutcome, AppError> {
        let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;

        let outcome = match fetched {
            Ok(rows) => {
                let series = build_series(&rows, now, self.window, &self.estimator);
                let locations = series.len();
                let points = series.values().map(|s| s.points.len()).sum();
                debug!(
                    documents = rows.len(),
                    locations, points, "Published wait-time series"
                );
                guard.publish_success(series, now);
                guard.set_phase(PollPhase::Succeeded);
                CycleOutcome::Published { locations, points }
            }
            Err(err) => {
                warn!(
                    error = %err,
                    status = ?err.status_code(),
                    "Failed to fetch documents, keeping previous series"
                );
                guard.publish_failure(err.to_string());
                guard.set_phase(PollPhase::Failed);
                CycleOutcome::Failed
            }
        };

        guard.set_phase(PollPhase::Idle);
        Ok(outcome)
    }

    fn set_phase(&self, phase: PollPhase) -> Result<(), AppError> {
        let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;
        guard.set_phase(phase);
        Ok(())
    }
}

pub struct PollerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stops polling. Once this returns nothing more is published, even if
    /// a fetch was in flight.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "Poller task ended abnormally");
        }
    }
}
