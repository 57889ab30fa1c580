//! Progressive first load.
//!
//! Used exactly once per device, the first time the local store holds no
//! cards. A small first page is fetched and persisted so the UI can render
//! within seconds; the remainder streams in the background in fixed-size
//! batches, yielding to the scheduler between batches so the event loop is
//! never blocked for more than one batch's processing time.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::events::{EventBus, SyncEvent};
use crate::remote::RemoteApi;
use chrono::Utc;
use lexika_store::LocalStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of the latency-critical immediate phase.
#[derive(Debug, Clone, Copy)]
pub struct FirstPage {
    /// Records persisted by the immediate phase.
    pub loaded: usize,
    /// Total records reported by the remote.
    pub total: u64,
}

/// Streams the remote card collection into an empty local store.
pub struct ProgressiveLoader<R: RemoteApi> {
    store: Arc<LocalStore>,
    remote: Arc<R>,
    config: SyncConfig,
    events: Arc<EventBus>,
}

impl<R: RemoteApi> ProgressiveLoader<R> {
    /// Creates a loader over the given collaborators.
    pub fn new(
        store: Arc<LocalStore>,
        remote: Arc<R>,
        config: SyncConfig,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            remote,
            config,
            events,
        }
    }

    /// Immediate phase: fetches and persists the first page, then emits
    /// `FirstBatchReady` synchronously with that persistence.
    ///
    /// This must complete before any larger fetch is attempted.
    pub async fn load_first_page(&self) -> SyncResult<FirstPage> {
        let page = self.remote.list_cards(self.config.first_page_size, 0).await?;
        let total = page.total;
        let loaded = self.store.put_batch(page.records).await?;

        info!(loaded, total, "first batch persisted");
        self.events.emit(SyncEvent::FirstBatchReady {
            count: loaded,
            at: Utc::now(),
        });

        Ok(FirstPage { loaded, total })
    }

    /// Background phase: fetches the remainder in fixed-size batches.
    ///
    /// Emits `Progress` after each persisted batch and
    /// `BackgroundSyncComplete` at the end. On a mid-stream failure the
    /// error propagates, but batches persisted so far remain valid.
    ///
    /// Returns the total number of records persisted across both phases.
    pub async fn load_remainder(&self, first: FirstPage) -> SyncResult<usize> {
        let mut loaded = first.loaded;

        while (loaded as u64) < first.total {
            let page = self
                .remote
                .list_cards(self.config.background_batch_size, loaded)
                .await?;
            if page.records.is_empty() {
                break;
            }

            loaded += self.store.put_batch(page.records).await?;
            debug!(loaded, total = first.total, "background batch persisted");
            self.events.emit(SyncEvent::Progress {
                loaded,
                total: first.total,
            });

            // Hand control back to the scheduler between batches.
            tokio::task::yield_now().await;
        }

        self.events.emit(SyncEvent::BackgroundSyncComplete { total: loaded });
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;
    use lexika_types::{CardRecord, RecordId};

    fn seeded_remote(count: usize) -> Arc<MockRemote> {
        let remote = MockRemote::new();
        let cards = (0..count)
            .map(|i| CardRecord {
                id: RecordId::new(format!("srv-{i}")),
                language_id: RecordId::new("de"),
                content: serde_json::Map::new(),
                updated_at: Some(Utc::now()),
                local_updated_at: Utc::now(),
            })
            .collect();
        remote.seed_cards(cards);
        Arc::new(remote)
    }

    fn loader(remote: Arc<MockRemote>, store: Arc<LocalStore>) -> ProgressiveLoader<MockRemote> {
        let config = SyncConfig::new().with_first_page_size(10).with_background_batch_size(5);
        ProgressiveLoader::new(store, remote, config, Arc::new(EventBus::new()))
    }

    #[tokio::test]
    async fn first_page_unblocks_quickly() {
        let store = Arc::new(LocalStore::in_memory());
        let remote = seeded_remote(23);
        let loader = loader(remote, Arc::clone(&store));

        let mut rx = loader.events.subscribe();
        let first = loader.load_first_page().await.unwrap();

        assert_eq!(first.loaded, 10);
        assert_eq!(first.total, 23);
        assert_eq!(store.card_count().await.unwrap(), 10);
        assert!(matches!(
            rx.try_recv().unwrap(),
            SyncEvent::FirstBatchReady { count: 10, .. }
        ));
    }

    #[tokio::test]
    async fn remainder_streams_in_batches() {
        let store = Arc::new(LocalStore::in_memory());
        let remote = seeded_remote(23);
        let loader = loader(Arc::clone(&remote), Arc::clone(&store));

        let first = loader.load_first_page().await.unwrap();
        let mut rx = loader.events.subscribe();
        let total = loader.load_remainder(first).await.unwrap();

        assert_eq!(total, 23);
        assert_eq!(store.card_count().await.unwrap(), 23);

        // 13 remaining records in batches of 5: 3 progress events, then done
        let mut progress = Vec::new();
        while let Ok(event) = rx.try_recv() {
            progress.push(event);
        }
        assert_eq!(
            progress,
            vec![
                SyncEvent::Progress { loaded: 15, total: 23 },
                SyncEvent::Progress { loaded: 20, total: 23 },
                SyncEvent::Progress { loaded: 23, total: 23 },
                SyncEvent::BackgroundSyncComplete { total: 23 },
            ]
        );
    }

    #[tokio::test]
    async fn smaller_dataset_than_first_page() {
        let store = Arc::new(LocalStore::in_memory());
        let remote = seeded_remote(4);
        let loader = loader(remote, Arc::clone(&store));

        let first = loader.load_first_page().await.unwrap();
        assert_eq!(first.loaded, 4);

        let total = loader.load_remainder(first).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(store.card_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_persisted_batches() {
        let store = Arc::new(LocalStore::in_memory());
        let remote = seeded_remote(23);
        let loader = loader(Arc::clone(&remote), Arc::clone(&store));

        let first = loader.load_first_page().await.unwrap();
        assert_eq!(store.card_count().await.unwrap(), 10);

        remote.fail_next("list_cards", u32::MAX);
        let result = loader.load_remainder(first).await;

        assert!(result.is_err());
        // The already-persisted page remains valid and usable
        assert_eq!(store.card_count().await.unwrap(), 10);
    }
}
