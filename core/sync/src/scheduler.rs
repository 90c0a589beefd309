//! Sync scheduling: manual, on-demand and periodic modes.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, error, info};

use offsync_common::{EntityType, Error, Result};

use crate::coordinator::DrainReport;
use crate::pull::PullReport;

/// When syncs happen besides explicit requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum SyncMode {
    /// Explicit requests only.
    Manual,
    /// Push whenever a change is reported.
    OnDemand,
    /// Full sync on a fixed interval.
    Periodic { interval: Duration },
    /// On-demand pushes plus periodic full syncs.
    Hybrid { interval: Duration },
}

impl SyncMode {
    fn periodic_interval(&self) -> Option<Duration> {
        match self {
            SyncMode::Periodic { interval } | SyncMode::Hybrid { interval } => {
                Some(*interval).filter(|d| !d.is_zero())
            }
            SyncMode::Manual | SyncMode::OnDemand => None,
        }
    }

    fn reacts_to_changes(&self) -> bool {
        matches!(self, SyncMode::OnDemand | SyncMode::Hybrid { .. })
    }
}

/// Work the scheduler can be asked to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    /// Drain the mutation queue.
    Push,
    /// Pull one entity type, or every registered type.
    Pull(Option<EntityType>),
    /// Drain, then pull every type.
    Full,
    /// Stop the scheduler.
    Shutdown,
}

/// What a sync request accomplished.
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub drain: Option<DrainReport>,
    pub pulls: Vec<PullReport>,
    /// Entity types whose pull failed, with the reason.
    pub failed_pulls: Vec<(EntityType, String)>,
    pub duration: Duration,
}

impl SyncSummary {
    pub fn pushed(&self) -> usize {
        self.drain.as_ref().map_or(0, |d| d.processed)
    }

    pub fn pulled(&self) -> usize {
        self.pulls.iter().map(PullReport::applied).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed_pulls.is_empty() && !self.drain.as_ref().is_some_and(DrainReport::halted)
    }
}

type Envelope = (SyncRequest, oneshot::Sender<Result<SyncSummary>>);

/// Client side of the scheduler.
pub struct SyncScheduler {
    mode: Arc<RwLock<SyncMode>>,
    request_tx: mpsc::Sender<Envelope>,
    shutdown: Arc<RwLock<bool>>,
}

impl SyncScheduler {
    pub fn new(mode: SyncMode) -> (Self, SyncSchedulerHandle) {
        let (request_tx, request_rx) = mpsc::channel(100);
        let mode = Arc::new(RwLock::new(mode));
        let shutdown = Arc::new(RwLock::new(false));

        let scheduler = Self {
            mode: mode.clone(),
            request_tx,
            shutdown: shutdown.clone(),
        };
        let handle = SyncSchedulerHandle {
            mode,
            request_rx,
            shutdown,
        };

        (scheduler, handle)
    }

    /// Request a drain followed by a pull of every type.
    pub async fn request_sync(&self) -> Result<SyncSummary> {
        self.request(SyncRequest::Full).await
    }

    pub async fn request_push(&self) -> Result<SyncSummary> {
        self.request(SyncRequest::Push).await
    }

    pub async fn request_pull(&self, entity_type: Option<EntityType>) -> Result<SyncSummary> {
        self.request(SyncRequest::Pull(entity_type)).await
    }

    async fn request(&self, request: SyncRequest) -> Result<SyncSummary> {
        let (response_tx, response_rx) = oneshot::channel();

        self.request_tx
            .send((request, response_tx))
            .await
            .map_err(|_| Error::Configuration("Scheduler not running".to_string()))?;

        response_rx
            .await
            .map_err(|_| Error::Configuration("Scheduler dropped the request".to_string()))?
    }

    /// Report a local change; triggers a push in on-demand modes.
    ///
    /// Returns without waiting for the push.
    pub async fn notify_change(&self) {
        let mode = self.mode.read().await.clone();
        if !mode.reacts_to_changes() {
            debug!("Change notification ignored (mode: {:?})", mode);
            return;
        }

        let (response_tx, _) = oneshot::channel();
        if self
            .request_tx
            .try_send((SyncRequest::Push, response_tx))
            .is_err()
        {
            debug!("Scheduler busy, change notification coalesced");
        }
    }

    pub async fn set_mode(&self, mode: SyncMode) {
        *self.mode.write().await = mode;
    }

    pub async fn get_mode(&self) -> SyncMode {
        self.mode.read().await.clone()
    }

    pub async fn shutdown(&self) {
        *self.shutdown.write().await = true;

        let (response_tx, _) = oneshot::channel();
        let _ = self
            .request_tx
            .send((SyncRequest::Shutdown, response_tx))
            .await;
    }
}

/// Background side of the scheduler.
pub struct SyncSchedulerHandle {
    mode: Arc<RwLock<SyncMode>>,
    request_rx: mpsc::Receiver<Envelope>,
    shutdown: Arc<RwLock<bool>>,
}

impl SyncSchedulerHandle {
    /// Run the scheduler loop until shutdown.
    ///
    /// Spawn this on a tokio task. `sync_fn` performs every request, one at
    /// a time.
    pub async fn run<F, Fut>(self, sync_fn: F)
    where
        F: Fn(SyncRequest) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<SyncSummary>> + Send,
    {
        let SyncSchedulerHandle {
            mode,
            mut request_rx,
            shutdown,
        } = self;

        let mut current_interval = mode.read().await.periodic_interval();
        let mut ticker = current_interval.map(periodic_ticker);

        info!("Sync scheduler started");

        loop {
            if *shutdown.read().await {
                info!("Sync scheduler shutting down");
                break;
            }

            tokio::select! {
                received = request_rx.recv() => {
                    let Some((request, response_tx)) = received else {
                        info!("All scheduler clients dropped");
                        break;
                    };
                    if request == SyncRequest::Shutdown {
                        info!("Received shutdown request");
                        break;
                    }
                    debug!("Processing sync request: {:?}", request);
                    let _ = response_tx.send(sync_fn(request).await);
                }

                _ = wait_for_tick(&mut ticker) => {
                    debug!("Triggering periodic sync");
                    match sync_fn(SyncRequest::Full).await {
                        Ok(summary) => info!(
                            "Periodic sync completed: {} pushed, {} pulled",
                            summary.pushed(),
                            summary.pulled()
                        ),
                        Err(e) => error!("Periodic sync failed: {}", e),
                    }
                }
            }

            let expected = mode.read().await.periodic_interval();
            if expected != current_interval {
                current_interval = expected;
                ticker = current_interval.map(periodic_ticker);
            }
        }
    }
}

/// First tick lands one full period from now, not immediately.
fn periodic_ticker(period: Duration) -> Interval {
    interval_at(Instant::now() + period, period)
}

async fn wait_for_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
