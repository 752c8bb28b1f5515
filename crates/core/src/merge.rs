//! Pure merge functions used by every partition pull and push.
//!
//! All merges are deterministic, commutative and idempotent. Two variants
//! of the same record with equal ordering stamps are ordered by their
//! canonical JSON encoding, so `merge(a, b) == merge(b, a)` holds exactly.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::record::{CardState, CardStates, Keyed, ReviewLogEntry, Tombstones, VocabEntry};

fn canonical<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Whether `candidate` should replace `current` under last-writer-wins.
fn wins<T: Serialize, S: Ord>(candidate: &T, current: &T, stamp: impl Fn(&T) -> S) -> bool {
    match stamp(candidate).cmp(&stamp(current)) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => canonical(candidate) > canonical(current),
    }
}

/// A record is suppressed when a tombstone for its id is at or after its
/// last modification.
fn suppressed(tombstones: &Tombstones, id: &str, modified_at: i64) -> bool {
    tombstones
        .get(id)
        .is_some_and(|&deleted_at| modified_at <= deleted_at)
}

/// Latest-wins merge of two entry lists, honoring tombstones.
///
/// The result is sorted by id.
pub fn merge_entries(
    remote: &[VocabEntry],
    local: &[VocabEntry],
    tombstones: &Tombstones,
) -> Vec<VocabEntry> {
    let mut by_id: BTreeMap<&str, &VocabEntry> = BTreeMap::new();
    for entry in remote.iter().chain(local) {
        match by_id.entry(entry.id.as_str()) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
            Entry::Occupied(mut slot) => {
                if wins(entry, *slot.get(), |e| e.timestamp) {
                    slot.insert(entry);
                }
            }
        }
    }
    by_id
        .into_values()
        .filter(|e| !suppressed(tombstones, &e.id, e.timestamp))
        .cloned()
        .collect()
}

/// Latest-wins merge of two card-state maps, honoring tombstones.
pub fn merge_card_states(
    remote: &CardStates,
    local: &CardStates,
    tombstones: &Tombstones,
) -> CardStates {
    let mut merged: BTreeMap<&str, &CardState> = BTreeMap::new();
    for (id, state) in remote.iter().chain(local) {
        match merged.entry(id.as_str()) {
            Entry::Vacant(slot) => {
                slot.insert(state);
            }
            Entry::Occupied(mut slot) => {
                if wins(state, *slot.get(), CardState::stamp) {
                    slot.insert(state);
                }
            }
        }
    }
    merged
        .into_iter()
        .filter(|(id, state)| !suppressed(tombstones, id, state.modified_at()))
        .map(|(id, state)| (id.to_string(), state.clone()))
        .collect()
}

/// Set union of two review-log lists keyed by `(vocab_id, reviewed_at)`.
///
/// Logs of a deleted vocabulary id recorded at or before its deletion are
/// dropped. The result is sorted by `(reviewed_at, vocab_id)`.
pub fn merge_review_logs(
    remote: &[ReviewLogEntry],
    local: &[ReviewLogEntry],
    tombstones: &Tombstones,
) -> Vec<ReviewLogEntry> {
    let mut union: BTreeMap<(i64, String), &ReviewLogEntry> = BTreeMap::new();
    for log in remote.iter().chain(local) {
        match union.entry(log.record_key()) {
            Entry::Vacant(slot) => {
                slot.insert(log);
            }
            Entry::Occupied(mut slot) => {
                if canonical(log) > canonical(*slot.get()) {
                    slot.insert(log);
                }
            }
        }
    }
    union
        .into_values()
        .filter(|log| !suppressed(tombstones, &log.vocab_id, log.reviewed_at))
        .cloned()
        .collect()
}

fn diff_count<K: Ord, V: PartialEq>(before: BTreeMap<K, &V>, after: BTreeMap<K, &V>) -> usize {
    let mut changed = 0;
    for (key, value) in &after {
        if before.get(key) != Some(value) {
            changed += 1;
        }
    }
    for key in before.keys() {
        if !after.contains_key(key) {
            changed += 1;
        }
    }
    changed
}

/// Number of records added, removed or modified between two lists.
pub fn count_changed<R: Keyed + PartialEq>(before: &[R], after: &[R]) -> usize {
    diff_count(
        before.iter().map(|r| (r.record_key(), r)).collect(),
        after.iter().map(|r| (r.record_key(), r)).collect(),
    )
}

/// [`count_changed`] for card-state maps.
pub fn count_changed_states(before: &CardStates, after: &CardStates) -> usize {
    diff_count(before.iter().collect(), after.iter().collect())
}

/// Drop tombstones older than `max_age_ms` at `now_ms`.
pub fn clean_tombstones(tombstones: &Tombstones, max_age_ms: i64, now_ms: i64) -> Tombstones {
    tombstones
        .iter()
        .filter(|&(_, &deleted_at)| now_ms.saturating_sub(deleted_at) <= max_age_ms)
        .map(|(id, &deleted_at)| (id.clone(), deleted_at))
        .collect()
}

/// Union of two tombstone maps keeping the later deletion per id.
pub fn union_tombstones(a: &Tombstones, b: &Tombstones) -> Tombstones {
    let mut merged = a.clone();
    for (id, &deleted_at) in b {
        merged
            .entry(id.clone())
            .and_modify(|current| *current = (*current).max(deleted_at))
            .or_insert(deleted_at);
    }
    merged
}
