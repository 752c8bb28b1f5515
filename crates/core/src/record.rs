//! Synced record types: vocabulary entries, FSRS card state and review logs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::partition::{PartitionKey, day_key_for};

/// Tombstones keyed by record id, valued by the deletion instant (ms).
pub type Tombstones = BTreeMap<String, i64>;

/// Card states of one partition keyed by vocabulary id.
pub type CardStates = BTreeMap<String, CardState>;

/// A record with a stable identity inside its dataset.
pub trait Keyed {
    type Key: Ord + Clone;

    fn record_key(&self) -> Self::Key;
}

/// A vocabulary entry as stored on every device.
///
/// Fields this version does not know about are kept in `extra` and written
/// back unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabEntry {
    pub id: String,
    #[serde(default)]
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading: Option<String>,
    #[serde(default)]
    pub meaning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Creation day (`YYYY-MM-DD`), the partition key of the entry.
    #[serde(default)]
    pub date: String,
    /// Last-modified instant in milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl VocabEntry {
    /// Create an entry created and last modified at `timestamp`.
    pub fn new(
        id: impl Into<String>,
        word: impl Into<String>,
        meaning: impl Into<String>,
        timestamp: i64,
    ) -> crate::Result<Self> {
        let date = day_key_for(timestamp)?;
        Ok(Self {
            id: id.into(),
            word: word.into(),
            reading: None,
            meaning: meaning.into(),
            sentence: None,
            tags: BTreeSet::new(),
            date: date.into_string(),
            timestamp,
            extra: BTreeMap::new(),
        })
    }

    /// The day partition this entry belongs to.
    ///
    /// Entries written by older clients may lack a valid `date`; those fall
    /// back to the day of their last modification.
    pub fn partition_key(&self) -> crate::Result<PartitionKey> {
        PartitionKey::day(&self.date).or_else(|_| day_key_for(self.timestamp))
    }
}

impl Keyed for VocabEntry {
    type Key = String;

    fn record_key(&self) -> String {
        self.id.clone()
    }
}

/// FSRS learning phase of a card.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardPhase {
    #[default]
    New,
    Learning,
    Review,
    Relearning,
}

/// FSRS scheduling state of one vocabulary card.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CardState {
    /// Next due instant in milliseconds.
    #[serde(default)]
    pub due: i64,
    #[serde(default)]
    pub stability: f64,
    #[serde(default)]
    pub difficulty: f64,
    #[serde(default)]
    pub elapsed_days: u32,
    #[serde(default)]
    pub scheduled_days: u32,
    #[serde(default)]
    pub reps: u32,
    #[serde(default)]
    pub lapses: u32,
    #[serde(default)]
    pub state: CardPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_review: Option<i64>,
}

impl CardState {
    /// A fresh card due at `due`.
    pub fn new(due: i64) -> Self {
        Self {
            due,
            ..Self::default()
        }
    }

    /// Last-writer-wins ordering stamp.
    ///
    /// `last_review` moves forward on every review while `due` may move
    /// backwards after a lapse, so the review instant leads.
    pub fn stamp(&self) -> (i64, i64, u32) {
        (self.last_review.unwrap_or(0), self.due, self.reps)
    }

    /// Instant compared against a tombstone's deletion time.
    ///
    /// A card that was never reviewed is as new as its first due instant.
    pub fn modified_at(&self) -> i64 {
        self.last_review.unwrap_or(self.due)
    }
}

/// One answered review. Review logs are append-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewLogEntry {
    pub vocab_id: String,
    pub reviewed_at: i64,
    /// FSRS rating: 1 again, 2 hard, 3 good, 4 easy.
    #[serde(default)]
    pub rating: u8,
    #[serde(default)]
    pub state: CardPhase,
    #[serde(default)]
    pub elapsed_days: u32,
    #[serde(default)]
    pub scheduled_days: u32,
}

impl ReviewLogEntry {
    pub fn new(vocab_id: impl Into<String>, reviewed_at: i64, rating: u8) -> Self {
        Self {
            vocab_id: vocab_id.into(),
            reviewed_at,
            rating,
            state: CardPhase::Review,
            elapsed_days: 0,
            scheduled_days: 0,
        }
    }
}

impl Keyed for ReviewLogEntry {
    type Key = (i64, String);

    fn record_key(&self) -> (i64, String) {
        (self.reviewed_at, self.vocab_id.clone())
    }
}
