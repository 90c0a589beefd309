//! Push-side sync coordinator.
//!
//! Records every local mutation in the durable queue and drains the queue
//! through the registered handlers in strict FIFO order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use offsync_common::{EntityId, EntityType, Error, Result};

use crate::operation::{OperationId, OperationKind, SyncOperation, SyncOperationResult};
use crate::queue::MutationQueue;
use crate::registry::HandlerRegistry;
use crate::state::{StatusTracker, SyncState, SyncStatus};

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Operations the remote acknowledged.
    pub processed: usize,
    /// Operations dropped because their entity no longer exists locally.
    pub discarded: usize,
    /// Operation whose failure stopped the pass.
    pub halted_on: Option<OperationId>,
    /// Queue length when the pass ended.
    pub remaining: usize,
}

impl DrainReport {
    pub fn halted(&self) -> bool {
        self.halted_on.is_some()
    }
}

struct Inner {
    queue: Arc<dyn MutationQueue>,
    registry: Arc<HandlerRegistry>,
    drain_lock: Mutex<()>,
    status: StatusTracker,
    drain_on_enqueue: AtomicBool,
}

/// Coordinates the mutation queue and the handler registry.
///
/// Cheap to clone; clones share the queue, the drain lock and the status.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    pub fn new(queue: Arc<dyn MutationQueue>, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue,
                registry,
                drain_lock: Mutex::new(()),
                status: StatusTracker::new(),
                drain_on_enqueue: AtomicBool::new(true),
            }),
        }
    }

    /// Toggle the background drain scheduled after every enqueue.
    pub fn set_drain_on_enqueue(&self, enabled: bool) {
        self.inner.drain_on_enqueue.store(enabled, Ordering::SeqCst);
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    /// Record a local mutation.
    ///
    /// The caller must already have written the local store.
    ///
    /// # Postconditions
    /// - The operation is durable before this returns
    /// - A background drain is scheduled when drain-on-enqueue is enabled
    ///
    /// # Errors
    /// - Configuration error if no handler is registered for `entity_type`;
    ///   the queue is left unchanged
    /// - Queue persistence errors
    pub async fn enqueue(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        kind: OperationKind,
    ) -> Result<SyncOperation> {
        if !self.inner.registry.contains(&entity_type) {
            error!(
                "Refusing to enqueue {} of {}/{}: no handler registered",
                kind, entity_type, entity_id
            );
            return Err(Error::Configuration(format!(
                "No sync handler registered for entity type '{}'",
                entity_type
            )));
        }

        let operation = self
            .inner
            .queue
            .enqueue(entity_type, entity_id, kind)
            .await?;
        debug!("Enqueued {}", operation);

        if self.inner.drain_on_enqueue.load(Ordering::SeqCst) {
            self.schedule_drain();
        }

        Ok(operation)
    }

    /// Run a drain on a background task.
    pub fn schedule_drain(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            match coordinator.drain().await {
                Ok(report) if report.halted() => {
                    debug!("Background drain halted with {} remaining", report.remaining)
                }
                Ok(report) => debug!("Background drain processed {}", report.processed),
                Err(e) => error!("Background drain failed: {}", e),
            }
        })
    }

    /// Push pending operations to the remote in FIFO order.
    ///
    /// Only one drain runs at a time; a second caller waits and then drains
    /// whatever is still queued. The pass stops at the first failed
    /// operation, which stays at the head of the queue.
    ///
    /// # Errors
    /// - Configuration error if a queued operation has no handler; the
    ///   operation is left in the queue
    /// - Queue read or persistence errors
    pub async fn drain(&self) -> Result<DrainReport> {
        let _guard = self.inner.drain_lock.lock().await;
        self.inner.status.begin();

        match self.drain_locked().await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.inner.status.failed(&e.to_string());
                Err(e)
            }
        }
    }

    async fn drain_locked(&self) -> Result<DrainReport> {
        let pending = self.inner.queue.list_pending().await?;
        let mut report = DrainReport::default();
        let mut halt: Option<(String, bool)> = None;

        if !pending.is_empty() {
            info!("Draining {} pending operations", pending.len());
        }

        for operation in pending {
            let handler = match self.inner.registry.require(&operation.entity_type) {
                Ok(handler) => handler,
                Err(e) => {
                    error!("Cannot process {}: {}", operation, e);
                    return Err(e);
                }
            };

            match handler.execute(&operation).await {
                SyncOperationResult::Success => {
                    self.inner.queue.remove(&operation.id).await?;
                    report.processed += 1;
                }
                SyncOperationResult::EntityNotFound => {
                    self.inner.queue.remove(&operation.id).await?;
                    report.discarded += 1;
                }
                SyncOperationResult::Failure { reason, retryable } => {
                    warn!("Drain halted at {}: {}", operation, reason);
                    report.halted_on = Some(operation.id);
                    halt = Some((reason, retryable));
                    break;
                }
            }
        }

        report.remaining = self.inner.queue.len().await?;

        match halt {
            Some((reason, retryable)) => {
                self.inner.status.halted(&reason, retryable, report.remaining)
            }
            None => self.inner.status.finished(report.remaining),
        }

        Ok(report)
    }

    pub async fn pending_operations(&self) -> Result<Vec<SyncOperation>> {
        self.inner.queue.list_pending().await
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.status.current().status
    }

    pub fn state(&self) -> SyncState {
        self.inner.status.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncState> {
        self.inner.status.subscribe()
    }
}
