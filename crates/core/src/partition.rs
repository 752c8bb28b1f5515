//! Partition keys, remote blob naming and persisted partition shapes.
//!
//! Vocabulary entries partition by calendar day, card state and review logs
//! by calendar month. Every `(kind, key)` pair maps to exactly one remote
//! blob name and the mapping is reversible with [`parse_partition_name`].
//! Days and months are computed in UTC.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::{Date, Month, OffsetDateTime};

use crate::error::{Error, Result};
use crate::record::{CardStates, ReviewLogEntry, VocabEntry};

/// Name of the singleton remote metadata blob.
pub const SYNC_META_NAME: &str = "sync_meta.json";

/// Schema tag written into every partition and metadata blob.
pub const BLOB_SCHEMA_VERSION: u32 = 1;

/// The dataset a partition belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Entries,
    CardStates,
    ReviewLogs,
}

/// Temporal grain of a partition key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Granularity {
    Day,
    Month,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 3] = [
        DatasetKind::Entries,
        DatasetKind::CardStates,
        DatasetKind::ReviewLogs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entries => "entries",
            Self::CardStates => "card_states",
            Self::ReviewLogs => "review_logs",
        }
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            Self::Entries => Granularity::Day,
            Self::CardStates | Self::ReviewLogs => Granularity::Month,
        }
    }

    fn name_prefix(&self) -> &'static str {
        match self {
            Self::Entries => "entries_",
            Self::CardStates => "fsrs_",
            Self::ReviewLogs => "reviews_",
        }
    }

    /// Name of the pre-partition monolithic blob for this kind.
    pub fn legacy_blob_name(&self) -> &'static str {
        match self {
            Self::Entries => "vocabulary.json",
            Self::CardStates => "fsrs_cards.json",
            Self::ReviewLogs => "review_logs.json",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated partition key: `YYYY-MM-DD` or `YYYY-MM`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Parse a day key (`YYYY-MM-DD`).
    pub fn day(s: &str) -> Result<Self> {
        let b = s.as_bytes();
        if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
            return Err(Error::InvalidPartitionKey(s.to_string()));
        }
        let year = parse_digits(&s[0..4], s)?;
        let month = parse_digits(&s[5..7], s)?;
        let day = parse_digits(&s[8..10], s)?;
        let month = Month::try_from(month as u8)
            .map_err(|_| Error::InvalidPartitionKey(s.to_string()))?;
        Date::from_calendar_date(year as i32, month, day as u8)
            .map_err(|_| Error::InvalidPartitionKey(s.to_string()))?;
        Ok(Self(s.to_string()))
    }

    /// Parse a month key (`YYYY-MM`).
    pub fn month(s: &str) -> Result<Self> {
        let b = s.as_bytes();
        if b.len() != 7 || b[4] != b'-' {
            return Err(Error::InvalidPartitionKey(s.to_string()));
        }
        parse_digits(&s[0..4], s)?;
        let month = parse_digits(&s[5..7], s)?;
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidPartitionKey(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Parse a key with the grain `kind` partitions by.
    pub fn for_kind(kind: DatasetKind, s: &str) -> Result<Self> {
        match kind.granularity() {
            Granularity::Day => Self::day(s),
            Granularity::Month => Self::month(s),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn granularity(&self) -> Granularity {
        if self.0.len() == 10 {
            Granularity::Day
        } else {
            Granularity::Month
        }
    }

    /// The month containing this key.
    pub fn month_of(&self) -> PartitionKey {
        Self(self.0[..7].to_string())
    }
}

fn parse_digits(part: &str, whole: &str) -> Result<u32> {
    if !part.bytes().all(|c| c.is_ascii_digit()) {
        return Err(Error::InvalidPartitionKey(whole.to_string()));
    }
    part.parse()
        .map_err(|_| Error::InvalidPartitionKey(whole.to_string()))
}

impl TryFrom<String> for PartitionKey {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        if s.len() == 10 {
            Self::day(&s)
        } else {
            Self::month(&s)
        }
    }
}

impl From<PartitionKey> for String {
    fn from(key: PartitionKey) -> String {
        key.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn utc_date(ms: i64) -> Result<Date> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map(|dt| dt.date())
        .map_err(|_| Error::InvalidTimestamp(ms))
}

/// Day key of an instant given in milliseconds.
pub fn day_key_for(ms: i64) -> Result<PartitionKey> {
    let date = utc_date(ms)?;
    Ok(PartitionKey(format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )))
}

/// Month key of an instant given in milliseconds.
pub fn month_key_for(ms: i64) -> Result<PartitionKey> {
    let date = utc_date(ms)?;
    Ok(PartitionKey(format!(
        "{:04}-{:02}",
        date.year(),
        u8::from(date.month())
    )))
}

/// Remote blob name of a partition.
pub fn partition_name(kind: DatasetKind, key: &PartitionKey) -> String {
    format!("{}{}.json", kind.name_prefix(), key.as_str())
}

/// Inverse of [`partition_name`]. Returns `None` for any other blob name.
pub fn parse_partition_name(name: &str) -> Option<(DatasetKind, PartitionKey)> {
    let stem = name.strip_suffix(".json")?;
    DatasetKind::ALL.into_iter().find_map(|kind| {
        let key = stem.strip_prefix(kind.name_prefix())?;
        PartitionKey::for_kind(kind, key).ok().map(|key| (kind, key))
    })
}

fn default_schema() -> u32 {
    BLOB_SCHEMA_VERSION
}

/// Remote shape of one day of vocabulary entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntriesPartition {
    #[serde(default = "default_schema")]
    pub schema: u32,
    pub date: String,
    #[serde(default)]
    pub entries: Vec<VocabEntry>,
    #[serde(default)]
    pub version: i64,
}

/// Remote shape of one month of card state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardStatePartition {
    #[serde(default = "default_schema")]
    pub schema: u32,
    #[serde(default)]
    pub card_states: CardStates,
    #[serde(default)]
    pub version: i64,
}

/// Remote shape of one month of review logs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewLogPartition {
    #[serde(default = "default_schema")]
    pub schema: u32,
    #[serde(default)]
    pub logs: Vec<ReviewLogEntry>,
    #[serde(default)]
    pub version: i64,
}

/// Pre-partition monolithic entries blob.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LegacyEntries {
    #[serde(default)]
    pub entries: Vec<VocabEntry>,
}

/// Pre-partition monolithic card-state blob.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCardStates {
    #[serde(default)]
    pub card_states: CardStates,
}

/// Pre-partition monolithic review-log blob.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LegacyReviewLogs {
    #[serde(default)]
    pub logs: Vec<ReviewLogEntry>,
}
