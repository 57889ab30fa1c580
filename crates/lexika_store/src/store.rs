//! The local store: indexed records, sync queue, and metadata.

use crate::backend::StorageBackend;
use crate::error::{StoreError, StoreResult};
use chrono::Utc;
use lexika_types::{
    CardRecord, EntityKind, LanguageRecord, MutationKind, PendingOperation, RecordId,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Persisted store state.
///
/// Secondary indexes are rebuilt on load and never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    cards: BTreeMap<RecordId, CardRecord>,
    languages: BTreeMap<RecordId, LanguageRecord>,
    queue: VecDeque<PendingOperation>,
    next_op_id: u64,
    meta: BTreeMap<String, String>,
    #[serde(default)]
    prefs: BTreeMap<String, serde_json::Value>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            cards: BTreeMap::new(),
            languages: BTreeMap::new(),
            queue: VecDeque::new(),
            next_op_id: 1,
            meta: BTreeMap::new(),
            prefs: BTreeMap::new(),
        }
    }
}

/// In-memory secondary indexes over the snapshot.
#[derive(Debug, Clone, Default)]
struct Indexes {
    /// Card ids grouped by language.
    by_language: HashMap<RecordId, BTreeSet<RecordId>>,
    /// Unique language code to language id.
    code_to_language: HashMap<String, RecordId>,
}

impl Indexes {
    fn build(snapshot: &Snapshot) -> Self {
        let mut indexes = Self::default();
        for card in snapshot.cards.values() {
            indexes.index_card(card);
        }
        for language in snapshot.languages.values() {
            indexes
                .code_to_language
                .insert(language.code.clone(), language.id.clone());
        }
        indexes
    }

    fn index_card(&mut self, card: &CardRecord) {
        self.by_language
            .entry(card.language_id.clone())
            .or_default()
            .insert(card.id.clone());
    }

    fn unindex_card(&mut self, card: &CardRecord) {
        if let Some(ids) = self.by_language.get_mut(&card.language_id) {
            ids.remove(&card.id);
            if ids.is_empty() {
                self.by_language.remove(&card.language_id);
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Inner {
    snapshot: Snapshot,
    indexes: Indexes,
}

/// The embedded local store.
///
/// Holds cards (domain records), languages (reference records), the sync
/// queue, free-form sync metadata, and host preferences. All
/// operations are async and lazily initialize the store on first use;
/// concurrent early callers share the same initialization outcome.
///
/// Every mutation is staged against a copy of the state and persisted
/// through the backend before becoming visible, so a failed call leaves
/// the store unchanged. Backend failures propagate to the caller and are
/// not retried here.
pub struct LocalStore {
    backend: Arc<dyn StorageBackend>,
    init: OnceCell<()>,
    inner: RwLock<Inner>,
}

impl LocalStore {
    /// Creates a store over the given backend.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            init: OnceCell::new(),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Creates an ephemeral in-memory store, mainly for tests.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(crate::backend::MemoryBackend::new()))
    }

    /// Creates a store persisting to the given file path.
    pub fn open(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(Arc::new(crate::backend::FileBackend::new(path)))
    }

    /// Loads the snapshot and builds indexes, exactly once.
    async fn ensure_init(&self) -> StoreResult<()> {
        self.init
            .get_or_try_init(|| async {
                let snapshot = match self.backend.load()? {
                    Some(bytes) => serde_json::from_slice::<Snapshot>(&bytes)?,
                    None => Snapshot::default(),
                };
                let indexes = Indexes::build(&snapshot);
                debug!(
                    cards = snapshot.cards.len(),
                    queued = snapshot.queue.len(),
                    "local store initialized"
                );
                *self.inner.write() = Inner { snapshot, indexes };
                Ok::<(), StoreError>(())
            })
            .await?;
        Ok(())
    }

    /// Applies a mutation to a staged copy, persists it, then swaps it in.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Snapshot, &mut Indexes) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut inner = self.inner.write();
        let mut staged = inner.clone();
        let value = {
            let Inner { snapshot, indexes } = &mut staged;
            f(snapshot, indexes)?
        };
        let bytes = serde_json::to_vec(&staged.snapshot)?;
        self.backend.save(&bytes)?;
        *inner = staged;
        Ok(value)
    }

    // ---- cards ----

    /// Stores or overwrites a card by primary key, stamping
    /// `local_updated_at`.
    pub async fn put(&self, card: CardRecord) -> StoreResult<()> {
        self.ensure_init().await?;
        self.mutate(|snapshot, indexes| {
            let mut card = card;
            card.local_updated_at = Utc::now();
            if let Some(prev) = snapshot.cards.get(&card.id) {
                indexes.unindex_card(prev);
            }
            indexes.index_card(&card);
            snapshot.cards.insert(card.id.clone(), card);
            Ok(())
        })
    }

    /// Applies a list of cards atomically per call.
    ///
    /// If the call fails the store is unchanged for this call; earlier
    /// successful calls in a larger sequence are not rolled back.
    pub async fn put_batch(&self, cards: Vec<CardRecord>) -> StoreResult<usize> {
        self.ensure_init().await?;
        if cards.is_empty() {
            return Ok(0);
        }
        let count = cards.len();
        let now = Utc::now();
        self.mutate(move |snapshot, indexes| {
            for mut card in cards {
                card.local_updated_at = now;
                if let Some(prev) = snapshot.cards.get(&card.id) {
                    indexes.unindex_card(prev);
                }
                indexes.index_card(&card);
                snapshot.cards.insert(card.id.clone(), card);
            }
            Ok(count)
        })
    }

    /// Returns a single card, or `None` if absent.
    pub async fn get(&self, id: &RecordId) -> StoreResult<Option<CardRecord>> {
        self.ensure_init().await?;
        Ok(self.inner.read().snapshot.cards.get(id).cloned())
    }

    /// Returns all cards, optionally filtered by language via the
    /// secondary index.
    pub async fn get_all(&self, language: Option<&RecordId>) -> StoreResult<Vec<CardRecord>> {
        self.ensure_init().await?;
        let inner = self.inner.read();
        let cards = match language {
            Some(language_id) => inner
                .indexes
                .by_language
                .get(language_id)
                .into_iter()
                .flatten()
                .filter_map(|id| inner.snapshot.cards.get(id).cloned())
                .collect(),
            None => inner.snapshot.cards.values().cloned().collect(),
        };
        Ok(cards)
    }

    /// Returns the number of stored cards.
    pub async fn card_count(&self) -> StoreResult<usize> {
        self.ensure_init().await?;
        Ok(self.inner.read().snapshot.cards.len())
    }

    /// Deletes a card by primary key. Deleting an absent card is a no-op.
    pub async fn delete(&self, id: &RecordId) -> StoreResult<()> {
        self.ensure_init().await?;
        self.mutate(|snapshot, indexes| {
            if let Some(card) = snapshot.cards.remove(id) {
                indexes.unindex_card(&card);
            }
            Ok(())
        })
    }

    /// Case-insensitive substring search over the fixed text fields,
    /// evaluated in memory over `get_all`.
    pub async fn search(
        &self,
        query: &str,
        language: Option<&RecordId>,
    ) -> StoreResult<Vec<CardRecord>> {
        let cards = self.get_all(language).await?;
        Ok(cards
            .into_iter()
            .filter(|card| card.matches(query))
            .collect())
    }

    // ---- languages ----

    /// Upserts a language by primary key.
    ///
    /// Returns [`StoreError::UniqueViolation`] if another language already
    /// holds the same `code`.
    pub async fn put_language(&self, language: LanguageRecord) -> StoreResult<()> {
        self.ensure_init().await?;
        self.mutate(|snapshot, indexes| {
            if let Some(owner) = indexes.code_to_language.get(&language.code) {
                if *owner != language.id {
                    return Err(StoreError::unique_violation(
                        "language.code",
                        language.code.clone(),
                    ));
                }
            }
            if let Some(prev) = snapshot.languages.get(&language.id) {
                if prev.code != language.code {
                    indexes.code_to_language.remove(&prev.code);
                }
            }
            indexes
                .code_to_language
                .insert(language.code.clone(), language.id.clone());
            snapshot.languages.insert(language.id.clone(), language);
            Ok(())
        })
    }

    /// Deletes a language by primary key. Deleting an absent language is a
    /// no-op.
    pub async fn delete_language(&self, id: &RecordId) -> StoreResult<()> {
        self.ensure_init().await?;
        self.mutate(|snapshot, indexes| {
            if let Some(language) = snapshot.languages.remove(id) {
                indexes.code_to_language.remove(&language.code);
            }
            Ok(())
        })
    }

    /// Returns all languages.
    pub async fn get_languages(&self) -> StoreResult<Vec<LanguageRecord>> {
        self.ensure_init().await?;
        Ok(self.inner.read().snapshot.languages.values().cloned().collect())
    }

    // ---- sync queue ----

    /// Appends a mutation to the sync queue and returns its assigned id.
    pub async fn enqueue(
        &self,
        kind: MutationKind,
        entity: EntityKind,
        entity_id: RecordId,
        payload: Option<serde_json::Value>,
    ) -> StoreResult<u64> {
        self.ensure_init().await?;
        self.mutate(|snapshot, _| {
            let op_id = snapshot.next_op_id;
            snapshot.next_op_id += 1;
            snapshot
                .queue
                .push_back(PendingOperation::new(op_id, kind, entity, entity_id, payload));
            Ok(op_id)
        })
    }

    /// Returns all queued operations in enqueue (FIFO) order.
    pub async fn pending_operations(&self) -> StoreResult<Vec<PendingOperation>> {
        self.ensure_init().await?;
        Ok(self.inner.read().snapshot.queue.iter().cloned().collect())
    }

    /// Removes a queued operation.
    pub async fn remove_operation(&self, op_id: u64) -> StoreResult<()> {
        self.ensure_init().await?;
        self.mutate(|snapshot, _| {
            let before = snapshot.queue.len();
            snapshot.queue.retain(|op| op.op_id != op_id);
            if snapshot.queue.len() == before {
                return Err(StoreError::OperationNotFound { op_id });
            }
            Ok(())
        })
    }

    /// Records a failed upload attempt and returns the new retry count.
    ///
    /// Enforcing the retry ceiling is the caller's responsibility.
    pub async fn mark_operation_failed(&self, op_id: u64, error: &str) -> StoreResult<u32> {
        self.ensure_init().await?;
        self.mutate(|snapshot, _| {
            let op = snapshot
                .queue
                .iter_mut()
                .find(|op| op.op_id == op_id)
                .ok_or(StoreError::OperationNotFound { op_id })?;
            op.retry_count += 1;
            op.last_error = Some(error.to_owned());
            Ok(op.retry_count)
        })
    }

    // ---- metadata ----

    /// Returns a metadata value.
    pub async fn get_meta(&self, key: &str) -> StoreResult<Option<String>> {
        self.ensure_init().await?;
        Ok(self.inner.read().snapshot.meta.get(key).cloned())
    }

    /// Sets a metadata value, overwriting any previous one.
    pub async fn set_meta(&self, key: &str, value: &str) -> StoreResult<()> {
        self.ensure_init().await?;
        self.mutate(|snapshot, _| {
            snapshot.meta.insert(key.to_owned(), value.to_owned());
            Ok(())
        })
    }

    // ---- preferences ----

    /// Returns a host preference value.
    ///
    /// Preferences are free-form JSON owned by the host application and
    /// never synced.
    pub async fn get_preference(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        self.ensure_init().await?;
        Ok(self.inner.read().snapshot.prefs.get(key).cloned())
    }

    /// Sets a host preference value, overwriting any previous one.
    pub async fn set_preference(&self, key: &str, value: serde_json::Value) -> StoreResult<()> {
        self.ensure_init().await?;
        self.mutate(|snapshot, _| {
            snapshot.prefs.insert(key.to_owned(), value);
            Ok(())
        })
    }

    /// Removes a host preference. Removing an absent key is a no-op.
    pub async fn delete_preference(&self, key: &str) -> StoreResult<()> {
        self.ensure_init().await?;
        self.mutate(|snapshot, _| {
            snapshot.prefs.remove(key);
            Ok(())
        })
    }
}
