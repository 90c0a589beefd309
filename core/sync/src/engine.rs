//! Sync engine tying the push coordinator, the pullers and the scheduler together.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use offsync_common::{EntityType, Error, Result};

use crate::coordinator::{DrainReport, SyncCoordinator};
use crate::pull::{PullReport, PullSync};
use crate::scheduler::{SyncMode, SyncRequest, SyncScheduler, SyncSchedulerHandle, SyncSummary};

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Schedule a background drain after every enqueue.
    pub drain_on_enqueue: bool,
    /// Scheduling mode for the background loop.
    pub sync_mode: SyncMode,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drain_on_enqueue: true,
            sync_mode: SyncMode::Manual,
        }
    }
}

/// Entry point for push, pull and full syncs.
pub struct SyncEngine {
    coordinator: SyncCoordinator,
    pullers: Vec<Arc<dyn PullSync>>,
    scheduler: Option<SyncScheduler>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(coordinator: SyncCoordinator, config: SyncConfig) -> Self {
        coordinator.set_drain_on_enqueue(config.drain_on_enqueue);
        Self {
            coordinator,
            pullers: Vec::new(),
            scheduler: None,
            config,
        }
    }

    /// Register the pull coordinator of one entity type.
    ///
    /// # Errors
    /// - Configuration error if the type already has a puller
    pub fn add_puller(&mut self, puller: Arc<dyn PullSync>) -> Result<()> {
        if self.puller(puller.entity_type()).is_some() {
            return Err(Error::Configuration(format!(
                "Puller for '{}' is already registered",
                puller.entity_type()
            )));
        }
        self.pullers.push(puller);
        Ok(())
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Initialize the scheduler and return a handle for running it.
    pub fn init_scheduler(&mut self) -> SyncSchedulerHandle {
        let (scheduler, handle) = SyncScheduler::new(self.config.sync_mode.clone());
        self.scheduler = Some(scheduler);
        handle
    }

    pub fn scheduler(&self) -> Option<&SyncScheduler> {
        self.scheduler.as_ref()
    }

    /// Tell the scheduler a local change was queued.
    ///
    /// Requests a push in `OnDemand` and `Hybrid` modes; a no-op before
    /// `init_scheduler`.
    pub async fn notify_change(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.notify_change().await;
        }
    }

    fn puller(&self, entity_type: &EntityType) -> Option<&Arc<dyn PullSync>> {
        self.pullers
            .iter()
            .find(|p| p.entity_type() == entity_type)
    }

    /// Drain the mutation queue.
    pub async fn push(&self) -> Result<DrainReport> {
        self.coordinator.drain().await
    }

    /// Pull one entity type.
    ///
    /// # Errors
    /// - Configuration error if the type has no puller
    /// - Any error from the pull itself
    pub async fn pull(&self, entity_type: &EntityType) -> Result<PullReport> {
        let puller = self.puller(entity_type).ok_or_else(|| {
            Error::Configuration(format!("No puller registered for '{}'", entity_type))
        })?;
        puller.pull().await
    }

    /// Pull every registered type concurrently.
    ///
    /// Types are independent; one failing does not stop the others.
    pub async fn pull_all(&self) -> Vec<(EntityType, Result<PullReport>)> {
        let pulls = self.pullers.iter().map(|puller| async move {
            (puller.entity_type().clone(), puller.pull().await)
        });
        join_all(pulls).await
    }

    /// Drain the queue, then pull every type.
    ///
    /// A drain that halts on a failed operation does not prevent the pull.
    pub async fn sync_full(&self) -> Result<SyncSummary> {
        let start = Instant::now();
        info!("Starting full sync");

        let drain = self.push().await?;
        let mut summary = SyncSummary {
            drain: Some(drain),
            ..SyncSummary::default()
        };
        self.collect_pulls(self.pull_all().await, &mut summary);

        summary.duration = start.elapsed();
        info!(
            "Full sync completed in {:?}: {} pushed, {} pulled, {} pull failures",
            summary.duration,
            summary.pushed(),
            summary.pulled(),
            summary.failed_pulls.len()
        );
        Ok(summary)
    }

    fn collect_pulls(
        &self,
        results: Vec<(EntityType, Result<PullReport>)>,
        summary: &mut SyncSummary,
    ) {
        for (entity_type, result) in results {
            match result {
                Ok(report) => summary.pulls.push(report),
                Err(e) => {
                    warn!("Pull of {} failed: {}", entity_type, e);
                    summary.failed_pulls.push((entity_type, e.to_string()));
                }
            }
        }
    }

    /// Process a sync request (for the scheduler).
    pub async fn process_request(&self, request: SyncRequest) -> Result<SyncSummary> {
        let start = Instant::now();
        let mut summary = match request {
            SyncRequest::Full => return self.sync_full().await,
            SyncRequest::Push => SyncSummary {
                drain: Some(self.push().await?),
                ..SyncSummary::default()
            },
            SyncRequest::Pull(Some(entity_type)) => SyncSummary {
                pulls: vec![self.pull(&entity_type).await?],
                ..SyncSummary::default()
            },
            SyncRequest::Pull(None) => {
                let mut summary = SyncSummary::default();
                self.collect_pulls(self.pull_all().await, &mut summary);
                summary
            }
            SyncRequest::Shutdown => SyncSummary::default(),
        };
        summary.duration = start.elapsed();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationKind;
    use crate::pull::PullCoordinator;
    use crate::queue::MemoryMutationQueue;
    use crate::registry::HandlerRegistry;
    use crate::test_support::{note_handler, note_type, Note};
    use offsync_common::EntityId;
    use offsync_storage::{LocalStore, MemoryCursorStore, MemoryLocalStore, MemoryRemote};

    struct Fixture {
        engine: SyncEngine,
        local: Arc<MemoryLocalStore<Note>>,
        remote: Arc<MemoryRemote<Note>>,
    }

    fn fixture() -> Fixture {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemote::new());
        let registry = HandlerRegistry::new()
            .with_handler(Arc::new(note_handler(local.clone(), remote.clone())))
            .unwrap();
        let coordinator =
            SyncCoordinator::new(Arc::new(MemoryMutationQueue::new()), Arc::new(registry));
        let config = SyncConfig {
            drain_on_enqueue: false,
            ..SyncConfig::default()
        };

        let mut engine = SyncEngine::new(coordinator, config);
        engine
            .add_puller(Arc::new(PullCoordinator::new(
                note_type(),
                local.clone(),
                remote.clone(),
                Arc::new(MemoryCursorStore::new()),
            )))
            .unwrap();

        Fixture {
            engine,
            local,
            remote,
        }
    }

    #[tokio::test]
    async fn test_sync_full_pushes_then_pulls() {
        let f = fixture();
        f.local.write(Note::new("mine", "local", 1)).await.unwrap();
        f.engine
            .coordinator()
            .enqueue(note_type(), EntityId::new("mine"), OperationKind::Upsert)
            .await
            .unwrap();
        f.remote.seed(Note::new("theirs", "remote", 2)).await;

        let summary = f.engine.sync_full().await.unwrap();

        assert_eq!(summary.pushed(), 1);
        assert_eq!(summary.pulled(), 2);
        assert!(summary.is_clean());
        assert!(f.local.read(&EntityId::new("theirs")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_offline_sync_reports_failures() {
        let f = fixture();
        f.remote.set_reachable(false);

        let summary = f.engine.sync_full().await.unwrap();

        assert_eq!(summary.failed_pulls.len(), 1);
        assert!(!summary.is_clean());
    }

    #[tokio::test]
    async fn test_duplicate_puller_rejected() {
        let mut f = fixture();
        let result = f.engine.add_puller(Arc::new(PullCoordinator::new(
            note_type(),
            f.local.clone(),
            f.remote.clone(),
            Arc::new(MemoryCursorStore::new()),
        )));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_pull_unknown_type_is_configuration_error() {
        let f = fixture();
        let result = f.engine.pull(&EntityType::new("ghost").unwrap()).await;
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_notify_change_reaches_running_scheduler() {
        let mut f = fixture();
        f.engine.config.sync_mode = SyncMode::OnDemand;
        let handle = f.engine.init_scheduler();

        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(handle.run(move |request| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(request);
                Ok(SyncSummary::default())
            }
        }));

        f.engine.notify_change().await;
        let request = tokio::time::timeout(std::time::Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap();
        assert_eq!(request, Some(SyncRequest::Push));

        f.engine.scheduler().unwrap().shutdown().await;
    }

    #[tokio::test]
    async fn test_notify_change_without_scheduler_is_noop() {
        let f = fixture();
        f.engine.notify_change().await;
        assert!(f.engine.scheduler().is_none());
    }

    #[tokio::test]
    async fn test_process_push_request() {
        let f = fixture();
        let summary = f.engine.process_request(SyncRequest::Push).await.unwrap();
        assert_eq!(summary.drain, Some(DrainReport::default()));
        assert!(summary.pulls.is_empty());
    }
}
