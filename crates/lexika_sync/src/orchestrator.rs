//! Sync orchestration.
//!
//! The orchestrator drives the upload phase (drain the sync queue against
//! the remote), the download phase (pull remote state and merge it through
//! the conflict resolver), and bookkeeping. It owns the lifecycle event
//! bus, the status for a UI indicator, and a reentrancy guard that drops
//! sync requests while a run is already active.
//!
//! A run never lets an error escape: offline-first operation must not be
//! blocked by a failed sync. Failures surface through the status event and
//! the returned [`SyncOutcome`].

use crate::config::SyncConfig;
use crate::conflict::{self, Resolution};
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent, SyncStatus};
use crate::loader::{FirstPage, ProgressiveLoader};
use crate::remote::{NewCard, RemoteApi};
use chrono::Utc;
use lexika_store::{LocalStore, StoreError};
use lexika_types::{
    meta, CardRecord, EntityKind, LanguageRecord, MutationKind, PendingOperation, RecordId,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Counters from one sync run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Queued operations applied to the remote.
    pub uploaded: u64,
    /// Queued operations discarded at the retry ceiling.
    pub discarded: u64,
    /// Remote records accepted into the local store.
    pub downloaded: u64,
    /// Wall-clock duration of the run (for a progressive run, of the
    /// immediate phase only).
    pub duration: Duration,
}

/// How a sync request concluded.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// A full run completed.
    Completed(SyncReport),
    /// The store was empty; the first page is persisted and the remainder
    /// is streaming in the background.
    FirstBatchReady(SyncReport),
    /// Another run was active; the request was dropped.
    AlreadySyncing,
    /// The device is offline; nothing was attempted.
    Offline,
    /// The run failed. The store is untouched beyond completed steps.
    Failed(String),
}

/// Kind of run performed by a sync cycle.
enum RunKind {
    Full,
    Progressive,
}

/// Drives synchronization between the local store and the remote.
pub struct SyncOrchestrator<R: RemoteApi + 'static> {
    store: Arc<LocalStore>,
    remote: Arc<R>,
    config: SyncConfig,
    events: Arc<EventBus>,
    status: RwLock<SyncStatus>,
    online: AtomicBool,
    syncing: AtomicBool,
    background: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<R: RemoteApi + 'static> SyncOrchestrator<R> {
    /// Creates an orchestrator over the given collaborators.
    pub fn new(store: Arc<LocalStore>, remote: Arc<R>, config: SyncConfig) -> Self {
        Self {
            store,
            remote,
            config,
            events: Arc::new(EventBus::new()),
            status: RwLock::new(SyncStatus::Online),
            online: AtomicBool::new(true),
            syncing: AtomicBool::new(false),
            background: tokio::sync::Mutex::new(None),
        }
    }

    /// Returns the current status.
    pub fn status(&self) -> SyncStatus {
        *self.status.read()
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Returns the local store, for read access by the host.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    fn set_status(&self, status: SyncStatus) {
        *self.status.write() = status;
        self.events.emit(SyncEvent::Status(status));
    }

    // ---- local mutation API ----

    /// Creates a card locally under a placeholder id and queues its upload.
    ///
    /// The write succeeds regardless of sync health.
    pub async fn create_card(
        &self,
        language_id: RecordId,
        content: serde_json::Map<String, serde_json::Value>,
    ) -> SyncResult<CardRecord> {
        let card = CardRecord::new_local(language_id, content);
        self.store.put(card.clone()).await?;
        self.store
            .enqueue(
                MutationKind::Create,
                EntityKind::Card,
                card.id.clone(),
                Some(encode_payload(&card)?),
            )
            .await?;
        Ok(card)
    }

    /// Updates a card locally and queues its upload.
    pub async fn update_card(&self, card: CardRecord) -> SyncResult<()> {
        self.store.put(card.clone()).await?;
        self.store
            .enqueue(
                MutationKind::Update,
                EntityKind::Card,
                card.id.clone(),
                Some(encode_payload(&card)?),
            )
            .await?;
        Ok(())
    }

    /// Deletes a card locally and queues the deletion.
    pub async fn delete_card(&self, id: &RecordId) -> SyncResult<()> {
        self.store.delete(id).await?;
        self.store
            .enqueue(MutationKind::Delete, EntityKind::Card, id.clone(), None)
            .await?;
        Ok(())
    }

    // ---- triggers ----

    /// Records a connectivity change. A transition to online triggers a
    /// sync; going offline only flips the status.
    pub async fn set_online(self: &Arc<Self>, online: bool) -> Option<SyncOutcome> {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            self.set_status(SyncStatus::Online);
            Some(self.sync().await)
        } else if !online {
            self.set_status(SyncStatus::Offline);
            None
        } else {
            None
        }
    }

    /// Spawns the periodic sync timer at the configured interval.
    ///
    /// Returns `None` when [`SyncConfig::sync_interval`] is unset.
    pub fn spawn_periodic(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let interval = self.config.sync_interval?;
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                this.sync().await;
            }
        }))
    }

    // ---- sync run ----

    /// Performs a sync run: upload, then download, then bookkeeping.
    ///
    /// At most one run is active at a time; a request while one is active
    /// is dropped, not queued. Errors never propagate out of this method.
    ///
    /// When the store holds no cards the download phase is the progressive
    /// loader: this method returns as soon as the first page is persisted,
    /// and the remainder (plus bookkeeping) finishes in a background task
    /// that belongs to the same logical run.
    pub async fn sync(self: &Arc<Self>) -> SyncOutcome {
        if !self.online.load(Ordering::SeqCst) {
            return SyncOutcome::Offline;
        }
        if self.syncing.swap(true, Ordering::SeqCst) {
            debug!("sync already in progress, dropping trigger");
            return SyncOutcome::AlreadySyncing;
        }

        self.set_status(SyncStatus::Syncing);
        let started = Instant::now();
        let mut report = SyncReport::default();

        match self.run_cycle(&mut report).await {
            Ok(RunKind::Full) => {
                report.duration = started.elapsed();
                info!(
                    uploaded = report.uploaded,
                    downloaded = report.downloaded,
                    discarded = report.discarded,
                    "sync completed"
                );
                self.set_status(SyncStatus::Online);
                self.syncing.store(false, Ordering::SeqCst);
                SyncOutcome::Completed(report)
            }
            Ok(RunKind::Progressive) => {
                // The guard stays held; the background task releases it.
                report.duration = started.elapsed();
                SyncOutcome::FirstBatchReady(report)
            }
            Err(err) => {
                warn!(error = %err, "sync failed");
                report.duration = started.elapsed();
                self.set_status(SyncStatus::Error);
                self.syncing.store(false, Ordering::SeqCst);
                SyncOutcome::Failed(err.to_string())
            }
        }
    }

    /// Awaits a progressive run's background phase, if one is active.
    pub async fn wait_for_background(&self) {
        let handle = self.background.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn run_cycle(self: &Arc<Self>, report: &mut SyncReport) -> SyncResult<RunKind> {
        self.upload_phase(report).await?;

        // A device with no local data gets the progressive first load
        // instead of the ordinary download pass.
        if self.store.card_count().await? == 0 {
            let first = self.loader().load_first_page().await?;
            report.downloaded += first.loaded as u64;
            self.spawn_background(first).await;
            return Ok(RunKind::Progressive);
        }

        self.download_cards(report).await?;
        self.download_languages().await?;
        self.bookkeeping().await?;
        Ok(RunKind::Full)
    }

    fn loader(&self) -> ProgressiveLoader<R> {
        ProgressiveLoader::new(
            Arc::clone(&self.store),
            Arc::clone(&self.remote),
            self.config.clone(),
            Arc::clone(&self.events),
        )
    }

    async fn spawn_background(self: &Arc<Self>, first: FirstPage) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let result = async {
                this.loader().load_remainder(first).await?;
                this.download_languages().await?;
                this.bookkeeping().await
            }
            .await;

            match result {
                Ok(()) => this.set_status(SyncStatus::Online),
                Err(err) => {
                    warn!(error = %err, "progressive background phase failed");
                    this.set_status(SyncStatus::Error);
                }
            }
            this.syncing.store(false, Ordering::SeqCst);
        });
        *self.background.lock().await = Some(handle);
    }

    /// Drains the sync queue in FIFO order.
    ///
    /// When a creation confirms under a server-assigned id, later
    /// operations in the same drain that still reference the placeholder
    /// are rebound before they are applied.
    ///
    /// Remote failures are recovered per operation: the retry count is
    /// incremented and the run continues with the next operation. Once an
    /// operation reaches the retry ceiling it is discarded rather than
    /// retried forever. Store failures propagate and end the run.
    async fn upload_phase(&self, report: &mut SyncReport) -> SyncResult<()> {
        let pending = self.store.pending_operations().await?;
        let mut rebound: HashMap<RecordId, RecordId> = HashMap::new();
        for op in pending {
            let op = rebind_operation(op, &rebound);
            match self.apply_operation(&op).await {
                Ok(confirmed_id) => {
                    if let Some(confirmed_id) = confirmed_id {
                        rebound.insert(op.entity_id.clone(), confirmed_id);
                    }
                    self.store.remove_operation(op.op_id).await?;
                    report.uploaded += 1;
                }
                Err(SyncError::Store(err)) => return Err(err.into()),
                Err(err) => {
                    warn!(op_id = op.op_id, error = %err, "upload failed");
                    let retries = self
                        .store
                        .mark_operation_failed(op.op_id, &err.to_string())
                        .await?;
                    if retries >= self.config.retry_ceiling {
                        warn!(
                            op_id = op.op_id,
                            retries, "retry ceiling reached, discarding operation"
                        );
                        self.store.remove_operation(op.op_id).await?;
                        report.discarded += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Translates one queued operation into the corresponding remote call.
    ///
    /// Returns the server-assigned id when the operation was a creation
    /// that confirmed under a different id than the queued one.
    async fn apply_operation(&self, op: &PendingOperation) -> SyncResult<Option<RecordId>> {
        match (op.entity, op.kind) {
            (EntityKind::Card, MutationKind::Create) => {
                let snapshot: CardRecord = decode_payload(op)?;
                let confirmed = self.remote.create_card(&NewCard::from(&snapshot)).await?;
                let rebound = (confirmed.id != op.entity_id).then(|| confirmed.id.clone());
                // A create followed by a local delete leaves nothing to
                // confirm; inserting the server record here would resurrect
                // a card the queued delete is about to remove remotely.
                let exists = self.store.get(&op.entity_id).await?.is_some();
                if rebound.is_some() {
                    // Identifier rebinding: the placeholder gives way to
                    // the server-confirmed record.
                    debug!(placeholder = %op.entity_id, server = %confirmed.id, "rebinding id");
                    self.store.delete(&op.entity_id).await?;
                }
                if exists {
                    self.store.put(confirmed).await?;
                }
                Ok(rebound)
            }
            (EntityKind::Card, MutationKind::Update) => {
                let snapshot: CardRecord = decode_payload(op)?;
                let confirmed = self.remote.update_card(&snapshot).await?;
                self.store.put(confirmed).await?;
                Ok(None)
            }
            (EntityKind::Card, MutationKind::Delete) => {
                self.remote.delete_card(&op.entity_id).await?;
                Ok(None)
            }
            (EntityKind::Language, MutationKind::Create) => {
                let snapshot: LanguageRecord = decode_payload(op)?;
                let confirmed = self.remote.create_language(&snapshot).await?;
                let rebound = (confirmed.id != op.entity_id).then(|| confirmed.id.clone());
                if rebound.is_some() {
                    self.store.delete_language(&op.entity_id).await?;
                }
                self.store.put_language(confirmed).await?;
                Ok(rebound)
            }
            (EntityKind::Language, kind) => Err(SyncError::Protocol(format!(
                "the remote does not support {kind:?} for languages"
            ))),
        }
    }

    /// Fetches the full remote card set and merges it through the
    /// conflict resolver.
    async fn download_cards(&self, report: &mut SyncReport) -> SyncResult<()> {
        let remote_cards = self.remote.list_all_cards().await?;
        let mut accepted = Vec::new();
        for remote_card in remote_cards {
            let local = self.store.get(&remote_card.id).await?;
            if conflict::resolve(local.as_ref(), &remote_card) == Resolution::AcceptRemote {
                accepted.push(remote_card);
            }
        }
        report.downloaded += accepted.len() as u64;
        self.store.put_batch(accepted).await?;
        Ok(())
    }

    /// Upserts the full remote language set, skipping uniqueness
    /// violations on `code` rather than failing the whole pass.
    async fn download_languages(&self) -> SyncResult<()> {
        let languages = self.remote.list_languages().await?;
        for language in languages {
            match self.store.put_language(language).await {
                Ok(()) => {}
                Err(StoreError::UniqueViolation { index, value }) => {
                    warn!(index, %value, "skipping record with duplicate unique key");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Writes `lastSyncTime` (and the first-run marker) regardless of
    /// per-record outcomes.
    async fn bookkeeping(&self) -> SyncResult<()> {
        self.store
            .set_meta(meta::LAST_SYNC_TIME, &Utc::now().to_rfc3339())
            .await?;
        if self.store.get_meta(meta::ONBOARDED).await?.is_none() {
            self.store.set_meta(meta::ONBOARDED, "true").await?;
        }
        Ok(())
    }
}

/// Rewrites a queued operation whose target id was rebound earlier in the
/// same drain, both the target and the `id` field of its payload.
fn rebind_operation(
    mut op: PendingOperation,
    rebound: &HashMap<RecordId, RecordId>,
) -> PendingOperation {
    if let Some(server_id) = rebound.get(&op.entity_id) {
        if let Some(serde_json::Value::Object(payload)) = op.payload.as_mut() {
            payload.insert("id".into(), serde_json::Value::String(server_id.to_string()));
        }
        op.entity_id = server_id.clone();
    }
    op
}

fn encode_payload<T: serde::Serialize>(value: &T) -> SyncResult<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| SyncError::Protocol(format!("failed to encode payload: {e}")))
}

fn decode_payload<T: DeserializeOwned>(op: &PendingOperation) -> SyncResult<T> {
    let payload = op
        .payload
        .as_ref()
        .ok_or_else(|| SyncError::Protocol(format!("operation {} has no payload", op.op_id)))?;
    serde_json::from_value(payload.clone()).map_err(|e| {
        SyncError::Protocol(format!("invalid payload for operation {}: {e}", op.op_id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;
    use serde_json::json;

    fn orchestrator() -> Arc<SyncOrchestrator<MockRemote>> {
        Arc::new(SyncOrchestrator::new(
            Arc::new(LocalStore::in_memory()),
            Arc::new(MockRemote::new()),
            SyncConfig::new(),
        ))
    }

    fn content(word: &str) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("word".into(), json!(word));
        map
    }

    #[tokio::test]
    async fn starts_online_and_idle() {
        let orch = orchestrator();
        assert_eq!(orch.status(), SyncStatus::Online);
    }

    #[tokio::test]
    async fn local_mutations_queue_uploads() {
        let orch = orchestrator();
        let card = orch
            .create_card(RecordId::new("de"), content("Haus"))
            .await
            .unwrap();
        assert!(card.id.is_placeholder());

        orch.delete_card(&card.id).await.unwrap();

        let pending = orch.store().pending_operations().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].kind, MutationKind::Create);
        assert_eq!(pending[1].kind, MutationKind::Delete);
        // Same entity, enqueue order preserved
        assert_eq!(pending[0].entity_id, pending[1].entity_id);
    }

    #[tokio::test]
    async fn sync_while_offline_is_a_noop() {
        let orch = orchestrator();
        orch.set_online(false).await;
        assert_eq!(orch.status(), SyncStatus::Offline);
        assert_eq!(orch.sync().await, SyncOutcome::Offline);
    }

    #[tokio::test]
    async fn transition_to_online_triggers_sync() {
        let orch = orchestrator();
        orch.set_online(false).await;
        let outcome = orch.set_online(true).await;
        assert!(matches!(
            outcome,
            Some(SyncOutcome::FirstBatchReady(_)) | Some(SyncOutcome::Completed(_))
        ));
        orch.wait_for_background().await;

        // No transition, no sync
        assert!(orch.set_online(true).await.is_none());
    }

    #[tokio::test]
    async fn periodic_timer_syncs_at_the_configured_interval() {
        let store = Arc::new(LocalStore::in_memory());
        // A non-empty store takes the ordinary download path
        store
            .put(CardRecord::new_local(RecordId::new("de"), content("Haus")))
            .await
            .unwrap();
        let remote = Arc::new(MockRemote::new());
        let orch = Arc::new(SyncOrchestrator::new(
            store,
            Arc::clone(&remote),
            SyncConfig::new().with_sync_interval(Duration::from_millis(20)),
        ));

        let handle = orch.spawn_periodic().unwrap();
        tokio::time::sleep(Duration::from_millis(90)).await;
        handle.abort();

        assert!(remote.calls("list_all_cards") >= 2);
    }

    #[tokio::test]
    async fn no_configured_interval_means_no_timer() {
        let orch = orchestrator();
        assert!(orch.spawn_periodic().is_none());
    }

    #[tokio::test]
    async fn unreachable_remote_moves_status_to_error() {
        let store = Arc::new(LocalStore::in_memory());
        // A non-empty store takes the ordinary download path
        store
            .put(CardRecord::new_local(RecordId::new("de"), content("Haus")))
            .await
            .unwrap();
        let remote = Arc::new(MockRemote::new());
        remote.fail_next("list_all_cards", u32::MAX);

        let orch = Arc::new(SyncOrchestrator::new(store, remote, SyncConfig::new()));
        let outcome = orch.sync().await;

        assert!(matches!(outcome, SyncOutcome::Failed(_)));
        assert_eq!(orch.status(), SyncStatus::Error);

        // A later sync can start again (guard released)
        assert!(matches!(orch.sync().await, SyncOutcome::Failed(_)));
    }
}
