//! Remote API abstraction.
//!
//! The orchestrator talks to the remote through [`RemoteApi`], which
//! abstracts the network layer and allows different implementations
//! (HTTP, mock for testing).

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use lexika_types::{CardRecord, LanguageRecord, RecordId};
use serde::{Deserialize, Serialize};

/// A card creation request: a new record sans server id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCard {
    /// The language the card belongs to.
    pub language_id: RecordId,
    /// Opaque content fields.
    pub content: serde_json::Map<String, serde_json::Value>,
}

impl From<&CardRecord> for NewCard {
    fn from(card: &CardRecord) -> Self {
        Self {
            language_id: card.language_id.clone(),
            content: card.content.clone(),
        }
    }
}

/// One page of the remote card collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardPage {
    /// The records in this page.
    pub records: Vec<CardRecord>,
    /// Total number of records on the remote.
    pub total: u64,
}

/// The remote record API consumed by the sync layer.
///
/// Session credentials are the transport's concern; an authorization
/// failure surfaces as [`SyncError::Unauthorized`] and fails only the
/// affected operation.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetches one page of cards.
    async fn list_cards(&self, limit: usize, skip: usize) -> SyncResult<CardPage>;

    /// Fetches the full card collection.
    async fn list_all_cards(&self) -> SyncResult<Vec<CardRecord>>;

    /// Creates a card; the response carries the server-assigned id and
    /// timestamp.
    async fn create_card(&self, card: &NewCard) -> SyncResult<CardRecord>;

    /// Updates a card; the response carries the new server timestamp.
    async fn update_card(&self, card: &CardRecord) -> SyncResult<CardRecord>;

    /// Deletes a card.
    async fn delete_card(&self, id: &RecordId) -> SyncResult<()>;

    /// Fetches the full language collection.
    async fn list_languages(&self) -> SyncResult<Vec<LanguageRecord>>;

    /// Creates a language.
    async fn create_language(&self, language: &LanguageRecord) -> SyncResult<LanguageRecord>;
}

/// An in-memory remote for testing.
///
/// Holds server-side card and language tables, assigns `srv-` ids on
/// create, and supports scripted per-method failures and call counting.
#[derive(Debug, Default)]
pub struct MockRemote {
    state: parking_lot::Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    cards: Vec<CardRecord>,
    languages: Vec<LanguageRecord>,
    next_id: u64,
    fail_next: std::collections::HashMap<&'static str, u32>,
    calls: std::collections::HashMap<&'static str, u32>,
}

impl MockState {
    fn record_call(&mut self, method: &'static str) -> SyncResult<()> {
        *self.calls.entry(method).or_insert(0) += 1;
        if let Some(remaining) = self.fail_next.get_mut(method) {
            if *remaining > 0 {
                *remaining = remaining.saturating_sub(1);
                return Err(SyncError::transport_retryable(format!(
                    "injected failure for {method}"
                )));
            }
        }
        Ok(())
    }
}

impl MockRemote {
    /// Creates an empty mock remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the server-side card table.
    pub fn seed_cards(&self, cards: Vec<CardRecord>) {
        self.state.lock().cards = cards;
    }

    /// Seeds the server-side language table.
    pub fn seed_languages(&self, languages: Vec<LanguageRecord>) {
        self.state.lock().languages = languages;
    }

    /// Makes the next `count` calls to `method` fail with a retryable
    /// transport error. Use `u32::MAX` to fail indefinitely.
    pub fn fail_next(&self, method: &'static str, count: u32) {
        self.state.lock().fail_next.insert(method, count);
    }

    /// Returns how many times `method` has been called.
    pub fn calls(&self, method: &str) -> u32 {
        self.state.lock().calls.get(method).copied().unwrap_or(0)
    }

    /// Returns the server-side card table.
    pub fn cards(&self) -> Vec<CardRecord> {
        self.state.lock().cards.clone()
    }

    /// Returns the server-side language table.
    pub fn languages(&self) -> Vec<LanguageRecord> {
        self.state.lock().languages.clone()
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn list_cards(&self, limit: usize, skip: usize) -> SyncResult<CardPage> {
        let mut state = self.state.lock();
        state.record_call("list_cards")?;
        let total = state.cards.len() as u64;
        let records = state.cards.iter().skip(skip).take(limit).cloned().collect();
        Ok(CardPage { records, total })
    }

    async fn list_all_cards(&self) -> SyncResult<Vec<CardRecord>> {
        let mut state = self.state.lock();
        state.record_call("list_all_cards")?;
        Ok(state.cards.clone())
    }

    async fn create_card(&self, card: &NewCard) -> SyncResult<CardRecord> {
        let mut state = self.state.lock();
        state.record_call("create_card")?;
        state.next_id += 1;
        let created = CardRecord {
            id: RecordId::new(format!("srv-{}", state.next_id)),
            language_id: card.language_id.clone(),
            content: card.content.clone(),
            updated_at: Some(chrono::Utc::now()),
            local_updated_at: chrono::Utc::now(),
        };
        state.cards.push(created.clone());
        Ok(created)
    }

    async fn update_card(&self, card: &CardRecord) -> SyncResult<CardRecord> {
        let mut state = self.state.lock();
        state.record_call("update_card")?;
        let updated = CardRecord {
            updated_at: Some(chrono::Utc::now()),
            ..card.clone()
        };
        match state.cards.iter_mut().find(|c| c.id == card.id) {
            Some(existing) => *existing = updated.clone(),
            None => {
                return Err(SyncError::RemoteRejected {
                    status: 404,
                    body: format!("no card {}", card.id),
                })
            }
        }
        Ok(updated)
    }

    async fn delete_card(&self, id: &RecordId) -> SyncResult<()> {
        let mut state = self.state.lock();
        state.record_call("delete_card")?;
        state.cards.retain(|c| c.id != *id);
        Ok(())
    }

    async fn list_languages(&self) -> SyncResult<Vec<LanguageRecord>> {
        let mut state = self.state.lock();
        state.record_call("list_languages")?;
        Ok(state.languages.clone())
    }

    async fn create_language(&self, language: &LanguageRecord) -> SyncResult<LanguageRecord> {
        let mut state = self.state.lock();
        state.record_call("create_language")?;
        state.next_id += 1;
        let created = LanguageRecord {
            id: RecordId::new(format!("srv-{}", state.next_id)),
            ..language.clone()
        };
        state.languages.push(created.clone());
        Ok(created)
    }
}
