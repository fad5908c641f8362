//! Append-only history of marker operations for one document.
//!
//! This is not a replacement for the host's undo machinery; it is an
//! indexer the plugin uses to store marker changes keyed to the host's
//! action counter, so undo and redo notifications can be replayed against
//! the plugin's own marker state. The plugin is responsible for keeping
//! both this history and the host in step.
//!
//! Records are kept in one primary ordered container keyed by
//! `(action index, entry id)` with separate ordered maps serving the
//! handle, reference, and save-point lookups.

use std::collections::{BTreeMap, BTreeSet};

use crate::change_mark::MarkKind;
use crate::line_map::Handle;

/// What a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// A marker was placed on a line.
    MarkerAdd,
    /// A marker was removed from a line.
    MarkerDelete,
    /// A marker moved lines without being re-created.
    MarkerMove,
    /// The document gained or lost lines.
    LineCountChange,
}

/// Primary key of an entry within one document's history.
pub type EntryKey = (i64, u32);

/// One recorded marker operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub kind: ActionKind,
    /// Marker class the entry belongs to.
    pub mark: MarkKind,
    /// Handle the operation concerned. Updated in place as replays swap
    /// placeholders for live handles and back.
    pub handle: Handle,
    /// Line for add/delete entries, the old line for moves, the signed
    /// line delta for line-count changes, and the save-point index on the
    /// save-point anchor entry.
    pub reference: i64,
    /// First line of the affected span.
    pub start: i64,
    /// One past the last line of the affected span.
    pub end: i64,
    /// Set on exactly one entry per document: the save-point anchor.
    pub saved: bool,
}

impl HistoryEntry {
    pub fn new(kind: ActionKind, mark: MarkKind, handle: Handle, reference: i64) -> Self {
        Self {
            kind,
            mark,
            handle,
            reference,
            start: 0,
            end: 0,
            saved: false,
        }
    }

    pub fn with_span(mut self, start: i64, end: i64) -> Self {
        self.start = start;
        self.end = end;
        self
    }
}

/// Marker-operation history for one document.
#[derive(Debug, Default)]
pub struct ActionHistory {
    entries: BTreeMap<EntryKey, HistoryEntry>,
    by_handle: BTreeMap<Handle, BTreeSet<EntryKey>>,
    by_reference: BTreeMap<i64, BTreeSet<EntryKey>>,
    save_point: Option<EntryKey>,
    /// Action index of the most recent insertion; entry ids restart at 0
    /// whenever it changes.
    last_index: Option<i64>,
    entry_seq: u32,
}

impl ActionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry at the given action index. Returns the assigned
    /// key, or `None` if the key already existed, which signals a bug in
    /// the caller and leaves the history untouched.
    pub fn insert_at_index(&mut self, index: i64, entry: HistoryEntry) -> Option<EntryKey> {
        if self.last_index == Some(index) {
            self.entry_seq += 1;
        } else {
            self.last_index = Some(index);
            self.entry_seq = 0;
        }
        let key = (index, self.entry_seq);
        if self.entries.contains_key(&key) {
            return None;
        }
        self.by_handle.entry(entry.handle).or_default().insert(key);
        self.by_reference
            .entry(entry.reference)
            .or_default()
            .insert(key);
        self.entries.insert(key, entry);
        Some(key)
    }

    /// Record an entry at the current action index.
    pub fn insert_at_current_index(
        &mut self,
        current: i64,
        entry: HistoryEntry,
    ) -> Option<EntryKey> {
        self.insert_at_index(current, entry)
    }

    /// Record an entry at the index the next performed action will use.
    /// This is the slot "before delete" bookkeeping reserves: the real
    /// delete notification will land on it.
    pub fn insert_at_next_index(&mut self, current: i64, entry: HistoryEntry) -> Option<EntryKey> {
        self.insert_at_index(current + 1, entry)
    }

    /// Remove every entry at or above an action index. Idempotent.
    pub fn truncate_from(&mut self, index: i64) {
        let doomed: Vec<EntryKey> = self
            .entries
            .range((index, 0)..)
            .map(|(&key, _)| key)
            .collect();
        for key in doomed {
            self.remove_entry(key);
        }
        self.last_index = None;
        self.entry_seq = 0;
    }

    /// Remove every entry above an action index.
    pub fn truncate_from_next(&mut self, index: i64) {
        self.truncate_from(index + 1);
    }

    fn remove_entry(&mut self, key: EntryKey) {
        if let Some(entry) = self.entries.remove(&key) {
            self.unindex(key, entry.handle, entry.reference);
            if self.save_point == Some(key) {
                self.save_point = None;
            }
        }
    }

    fn unindex(&mut self, key: EntryKey, handle: Handle, reference: i64) {
        if let Some(keys) = self.by_handle.get_mut(&handle) {
            keys.remove(&key);
            if keys.is_empty() {
                self.by_handle.remove(&handle);
            }
        }
        if let Some(keys) = self.by_reference.get_mut(&reference) {
            keys.remove(&key);
            if keys.is_empty() {
                self.by_reference.remove(&reference);
            }
        }
    }

    /// Entries recorded at one action index, in entry-id order.
    pub fn entries_at(&self, index: i64) -> impl Iterator<Item = (EntryKey, &HistoryEntry)> {
        self.entries
            .range((index, 0)..=(index, u32::MAX))
            .map(|(&key, entry)| (key, entry))
    }

    /// Keys recorded at one action index, in reverse entry-id order:
    /// the order undo replays them in.
    pub fn keys_at_rev(&self, index: i64) -> Vec<EntryKey> {
        let mut keys: Vec<EntryKey> = self.entries_at(index).map(|(key, _)| key).collect();
        keys.reverse();
        keys
    }

    pub fn get(&self, key: EntryKey) -> Option<&HistoryEntry> {
        self.entries.get(&key)
    }

    /// Keys of every entry recorded against a handle.
    pub fn keys_with_handle(&self, handle: Handle) -> Vec<EntryKey> {
        self.by_handle
            .get(&handle)
            .map(|keys| keys.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Keys of every entry whose reference field holds `reference`.
    pub fn keys_with_reference(&self, reference: i64) -> Vec<EntryKey> {
        self.by_reference
            .get(&reference)
            .map(|keys| keys.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Handles known to the history in ascending order. Change-jump
    /// navigation walks this sequence.
    pub fn handles(&self) -> impl Iterator<Item = Handle> {
        self.by_handle.keys().copied()
    }

    /// Swap every occurrence of one handle for another. Used when the
    /// host re-issues a handle during undo/redo replay so older entries
    /// referring to the dead handle stay resolvable.
    pub fn replace_handle(&mut self, old: Handle, new: Handle) -> usize {
        let Some(keys) = self.by_handle.remove(&old) else {
            return 0;
        };
        let count = keys.len();
        for &key in &keys {
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.handle = new;
            }
        }
        self.by_handle.entry(new).or_default().extend(keys);
        count
    }

    /// Change the marker class recorded on every entry for a handle.
    pub fn set_mark_for_handle(&mut self, handle: Handle, mark: MarkKind) {
        for key in self.keys_with_handle(handle) {
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.mark = mark;
            }
        }
    }

    /// The save-point anchor entry, if one is flagged.
    pub fn save_point(&self) -> Option<EntryKey> {
        self.save_point
    }

    /// Flag one entry as the save-point anchor, recording the save-point
    /// action index in its reference field. Any previous anchor is
    /// cleared.
    pub fn set_save_point(&mut self, key: EntryKey, save_index: i64) {
        if let Some(prev) = self.save_point.take()
            && prev != key
            && let Some(entry) = self.entries.get_mut(&prev)
        {
            entry.saved = false;
        }
        if let Some(entry) = self.entries.get_mut(&key) {
            let old_reference = entry.reference;
            entry.saved = true;
            entry.reference = save_index;
            self.save_point = Some(key);
            if old_reference != save_index {
                self.reindex_reference(key, old_reference, save_index);
            }
        }
    }

    fn reindex_reference(&mut self, key: EntryKey, old: i64, new: i64) {
        if let Some(keys) = self.by_reference.get_mut(&old) {
            keys.remove(&key);
            if keys.is_empty() {
                self.by_reference.remove(&old);
            }
        }
        self.by_reference.entry(new).or_default().insert(key);
    }

    /// Key of the most recent marker entry at or before an action index.
    /// Line-shape entries never anchor a save point: anchoring overwrites
    /// the reference field, which a shape entry needs for replay.
    pub fn latest_marker_at_or_before(&self, index: i64) -> Option<EntryKey> {
        self.entries
            .range(..=(index, u32::MAX))
            .rev()
            .find(|(_, entry)| entry.kind != ActionKind::LineCountChange)
            .map(|(&key, _)| key)
    }

    /// Action index of the most recent insertion, reset by truncation.
    pub fn last_recorded_index(&self) -> Option<i64> {
        self.last_index
    }

    /// Largest action index present in the history.
    pub fn max_index(&self) -> Option<i64> {
        self.entries.keys().next_back().map(|&(index, _)| index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mutable access used by replay to update a single entry's handle
    /// while keeping the handle index coherent.
    pub fn set_handle(&mut self, key: EntryKey, new: Handle) -> bool {
        let Some(entry) = self.entries.get_mut(&key) else {
            return false;
        };
        let old = entry.handle;
        if old == new {
            return true;
        }
        entry.handle = new;
        if let Some(keys) = self.by_handle.get_mut(&old) {
            keys.remove(&key);
            if keys.is_empty() {
                self.by_handle.remove(&old);
            }
        }
        self.by_handle.entry(new).or_default().insert(key);
        true
    }

    /// All entries, for diagnostics and tests.
    pub fn iter(&self) -> impl Iterator<Item = (EntryKey, &HistoryEntry)> {
        self.entries.iter().map(|(&key, entry)| (key, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: MarkKind = MarkKind::NotSaved;

    fn add_entry(handle: i64, line: i64) -> HistoryEntry {
        HistoryEntry::new(ActionKind::MarkerAdd, NS, Handle::Assigned(handle), line)
    }

    #[test]
    fn test_entry_id_assignment() {
        let mut history = ActionHistory::new();
        assert_eq!(history.insert_at_current_index(1, add_entry(10, 5)), Some((1, 0)));
        assert_eq!(history.insert_at_current_index(1, add_entry(11, 6)), Some((1, 1)));
        assert_eq!(history.insert_at_current_index(2, add_entry(12, 7)), Some((2, 0)));
        assert_eq!(history.last_recorded_index(), Some(2));
        assert_eq!(history.max_index(), Some(2));
    }

    #[test]
    fn test_insert_at_next_index() {
        let mut history = ActionHistory::new();
        assert_eq!(history.insert_at_next_index(3, add_entry(10, 5)), Some((4, 0)));
        assert_eq!(history.insert_at_next_index(3, add_entry(11, 6)), Some((4, 1)));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut history = ActionHistory::new();
        history.insert_at_current_index(1, add_entry(10, 5));
        // Force the id sequence to collide.
        history.truncate_from(2); // resets sequence state, keeps (1,0)
        assert_eq!(history.insert_at_current_index(1, add_entry(11, 6)), None);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_truncate_from_is_idempotent() {
        let mut history = ActionHistory::new();
        for index in 1..=4 {
            history.insert_at_current_index(index, add_entry(index, index));
        }
        history.truncate_from(3);
        assert_eq!(history.len(), 2);
        history.truncate_from(3);
        assert_eq!(history.len(), 2);
        assert!(history.get((3, 0)).is_none());
        assert!(history.get((2, 0)).is_some());
    }

    #[test]
    fn test_truncate_clears_indexes() {
        let mut history = ActionHistory::new();
        history.insert_at_current_index(1, add_entry(10, 5));
        history.truncate_from(1);
        assert!(history.keys_with_handle(Handle::Assigned(10)).is_empty());
        assert!(history.keys_with_reference(5).is_empty());
    }

    #[test]
    fn test_replace_handle_bulk() {
        let mut history = ActionHistory::new();
        history.insert_at_current_index(1, add_entry(10, 5));
        history.insert_at_current_index(2, add_entry(10, 5));
        let moved = history.replace_handle(Handle::Assigned(10), Handle::Pending(-1));
        assert_eq!(moved, 2);
        assert!(history.keys_with_handle(Handle::Assigned(10)).is_empty());
        assert_eq!(history.keys_with_handle(Handle::Pending(-1)).len(), 2);
        assert_eq!(history.get((1, 0)).unwrap().handle, Handle::Pending(-1));
    }

    #[test]
    fn test_reverse_order_at_index() {
        let mut history = ActionHistory::new();
        history.insert_at_current_index(1, add_entry(10, 5));
        history.insert_at_current_index(1, add_entry(11, 6));
        history.insert_at_current_index(1, add_entry(12, 7));
        assert_eq!(history.keys_at_rev(1), vec![(1, 2), (1, 1), (1, 0)]);
    }

    #[test]
    fn test_save_point_moves() {
        let mut history = ActionHistory::new();
        history.insert_at_current_index(1, add_entry(10, 5));
        history.insert_at_current_index(2, add_entry(11, 9));
        history.set_save_point((1, 0), 1);
        assert_eq!(history.save_point(), Some((1, 0)));
        history.set_save_point((2, 0), 2);
        assert_eq!(history.save_point(), Some((2, 0)));
        assert!(!history.get((1, 0)).unwrap().saved);
        assert!(history.get((2, 0)).unwrap().saved);
        assert_eq!(history.get((2, 0)).unwrap().reference, 2);
    }

    #[test]
    fn test_latest_marker_at_or_before() {
        let mut history = ActionHistory::new();
        history.insert_at_current_index(1, add_entry(10, 5));
        history.insert_at_current_index(3, add_entry(11, 6));
        // A shape entry is skipped over as an anchor candidate.
        history.insert_at_current_index(
            3,
            HistoryEntry::new(
                ActionKind::LineCountChange,
                NS,
                Handle::Pending(-1),
                1,
            ),
        );
        assert_eq!(history.latest_marker_at_or_before(2), Some((1, 0)));
        assert_eq!(history.latest_marker_at_or_before(3), Some((3, 0)));
        assert_eq!(history.latest_marker_at_or_before(0), None);
    }
}
