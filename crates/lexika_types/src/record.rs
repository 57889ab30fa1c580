//! Card and language records.

use crate::id::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Content fields considered by free-text search.
pub const SEARCH_FIELDS: &[&str] = &["word", "translation", "example", "notes"];

/// A vocabulary card.
///
/// The card's display content is an opaque JSON map so that clients can
/// extend it without schema changes. Only `id`, `language_id` and the two
/// timestamps have fixed meaning:
///
/// - `updated_at` is server-authoritative and drives conflict resolution.
///   It is `None` until the server has acknowledged the record.
/// - `local_updated_at` is stamped by the local store on every write and is
///   never compared across replicas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    /// Primary key.
    pub id: RecordId,
    /// The language this card belongs to.
    pub language_id: RecordId,
    /// Opaque display/content fields.
    #[serde(default)]
    pub content: Map<String, Value>,
    /// Server-authoritative modification timestamp.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Local bookkeeping timestamp, stamped on every local write.
    pub local_updated_at: DateTime<Utc>,
}

impl CardRecord {
    /// Creates a card with a fresh placeholder id, for offline creation.
    pub fn new_local(language_id: RecordId, content: Map<String, Value>) -> Self {
        Self {
            id: RecordId::placeholder(),
            language_id,
            content,
            updated_at: None,
            local_updated_at: Utc::now(),
        }
    }

    /// Returns the searchable text fields present on this card.
    pub fn text_fields(&self) -> impl Iterator<Item = &str> {
        SEARCH_FIELDS
            .iter()
            .filter_map(|field| self.content.get(*field).and_then(Value::as_str))
    }

    /// Returns true if any searchable field contains `query`,
    /// case-insensitively.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.text_fields()
            .any(|text| text.to_lowercase().contains(&needle))
    }
}

/// A reference language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageRecord {
    /// Primary key.
    pub id: RecordId,
    /// Language code, unique within the store (e.g. "de", "pt-BR").
    pub code: String,
    /// Human-readable name.
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn card_with(fields: &[(&str, &str)]) -> CardRecord {
        let mut content = Map::new();
        for (k, v) in fields {
            content.insert((*k).to_owned(), json!(v));
        }
        CardRecord::new_local(RecordId::new("lang-1"), content)
    }

    #[test]
    fn new_local_has_placeholder_id() {
        let card = card_with(&[("word", "Haus")]);
        assert!(card.id.is_placeholder());
        assert!(card.updated_at.is_none());
    }

    #[test]
    fn matches_is_case_insensitive() {
        let card = card_with(&[("word", "Haus"), ("translation", "house")]);
        assert!(card.matches("haus"));
        assert!(card.matches("HOUSE"));
        assert!(!card.matches("tree"));
    }

    #[test]
    fn matches_ignores_non_search_fields() {
        let mut card = card_with(&[("word", "Haus")]);
        card.content
            .insert("audio_url".into(), json!("https://cdn/haus.mp3"));
        assert!(!card.matches("cdn"));
    }

    #[test]
    fn text_fields_skips_non_strings() {
        let mut card = card_with(&[("word", "Haus")]);
        card.content.insert("notes".into(), json!(42));
        assert_eq!(card.text_fields().count(), 1);
    }
}
