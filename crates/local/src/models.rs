//! Database rows of the local cache.
//!
//! Records are kept as JSON bodies next to the columns needed for
//! partition lookups, so fields added by newer clients survive.

use crate::error::LocalResult;
use sqlx::FromRow;
use vocasync_core::{CardState, ReviewLogEntry, VocabEntry};

/// Vocabulary entry row.
#[derive(Debug, Clone, FromRow)]
pub struct EntryRow {
    pub id: String,
    pub day: String,
    pub timestamp: i64,
    pub body: String,
}

impl EntryRow {
    pub fn into_record(self) -> LocalResult<VocabEntry> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Card state row.
#[derive(Debug, Clone, FromRow)]
pub struct CardStateRow {
    pub vocab_id: String,
    pub month: String,
    pub body: String,
}

impl CardStateRow {
    pub fn into_record(self) -> LocalResult<(String, CardState)> {
        Ok((self.vocab_id, serde_json::from_str(&self.body)?))
    }
}

/// Review log row.
#[derive(Debug, Clone, FromRow)]
pub struct ReviewLogRow {
    pub vocab_id: String,
    pub reviewed_at: i64,
    pub month: String,
    pub body: String,
}

impl ReviewLogRow {
    pub fn into_record(self) -> LocalResult<ReviewLogEntry> {
        Ok(serde_json::from_str(&self.body)?)
    }
}
