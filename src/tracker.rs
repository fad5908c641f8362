//! The changed-document controller.
//!
//! One `ChangeTracker` is owned by the plugin's root context and receives
//! every modification notification the host forwards. Per document it
//! decides whether the notification is a brand-new edit, an undo, or a
//! redo, and keeps three things in step: the host's margin markers, the
//! per-document [`LineMap`], and the per-document [`ActionHistory`] the
//! undo/redo replay runs against.
//!
//! Replay contract: line-shape entries recorded for an action replay
//! before the marker entries of the same action, so marker line
//! references are always interpreted in the coordinate space the shape
//! change produces. Map removals go through handle lookup and are
//! insensitive to the ordering either way.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use tracing::debug;

use crate::action_history::{ActionHistory, ActionKind, HistoryEntry};
use crate::action_index::{ActionIndexTracker, IndexUpdate};
use crate::change_mark::{ChangeMark, MarginTarget, MarkKind, negotiate_markers};
use crate::config::PluginConfig;
use crate::error::ChangeMarkError;
use crate::host::{HostEditor, ViewSlot};
use crate::line_map::{Handle, LineMap};
use crate::notification::{DocId, ModFlags, Notification};

/// Pixels added to the plugin margin while markers display there.
const PLUGIN_MARGIN_WIDTH: i32 = 16;

/// User-facing commands exposed through the plugin menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Jump to the previous change, in the order changes were made.
    JumpChangePrev,
    /// Jump to the next change, in the order changes were made.
    JumpChangeNext,
    /// Jump to the nearest changed line above the caret.
    JumpLineUp,
    /// Jump to the nearest changed line below the caret.
    JumpLineDown,
    /// Display markers in the line-number margin.
    DisplayLineNumberMargin,
    /// Display markers in the bookmark margin.
    DisplayChangeMarkMargin,
    /// Display markers in the plugin margin.
    DisplayPluginMargin,
    /// Remove markers from every margin mask; the host falls back to
    /// rendering them as full-line highlights.
    DisplayAsHighlight,
    /// Stop tracking the active document and discard its history.
    DisableDocument,
    /// Suspend all change processing.
    DisablePlugin,
}

/// Counters for the defensive no-op paths. A correct host/plugin pair
/// never increments these; tests and diagnostics read them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InconsistencyCounters {
    /// A history insertion collided with an existing composite key.
    pub duplicate_history_insert: u64,
    /// A replay step could not resolve or re-create a marker handle.
    pub unresolved_handle: u64,
    /// A replay step found the document in a state it cannot apply to.
    pub unexpected_replay: u64,
}

/// The line-shape half of a pending multi-line delete, captured while the
/// document was still unchanged and applied when the performed
/// notification arrives.
#[derive(Debug, Clone)]
struct PendingDelete {
    /// First map line the deletion removes.
    start: i64,
    /// Number of lines the document loses.
    count: i64,
    /// Line the surviving tail merges onto.
    merge_line: i64,
    /// Markers that outlive the deletion on the merge line.
    survivors: Vec<(MarkKind, Handle)>,
}

/// Marker state for one tracked document.
#[derive(Debug)]
pub struct ChangedDocument {
    doc: DocId,
    line_map: LineMap,
    history: ActionHistory,
    /// The previous notification was a before-delete dry run; its history
    /// entries sit at the reserved next index.
    pending_delete: Option<PendingDelete>,
    /// Descending source of placeholder handle values.
    pending_seq: i64,
    /// Action index the document was last saved at.
    save_point_index: i64,
    /// Navigation cursor for the change-jump commands.
    last_visited: Option<Handle>,
}

impl ChangedDocument {
    fn new(doc: DocId) -> Self {
        Self {
            doc,
            line_map: LineMap::new(),
            history: ActionHistory::new(),
            pending_delete: None,
            pending_seq: 0,
            save_point_index: 0,
            last_visited: None,
        }
    }

    pub fn line_map(&self) -> &LineMap {
        &self.line_map
    }

    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    pub fn save_point_index(&self) -> i64 {
        self.save_point_index
    }

    fn next_pending(&mut self) -> Handle {
        self.pending_seq -= 1;
        Handle::Pending(self.pending_seq)
    }

    /// Delete a handle from the map wherever it currently sits.
    fn unmap_handle(&mut self, mark: MarkKind, handle: Handle) {
        if let Some(line) = self.line_map.line_of_handle(mark, handle) {
            self.line_map.delete_handle(line, mark, handle);
        }
    }

    // ----- new actions -------------------------------------------------

    /// Record a brand-new user action (neither undo nor redo).
    fn record_new_action(
        &mut self,
        host: &mut dyn HostEditor,
        marks: &[ChangeMark; MarkKind::COUNT],
        scn: &Notification,
        update: &IndexUpdate,
        counters: &mut InconsistencyCounters,
    ) {
        if scn.flags.contains(ModFlags::BEFORE_DELETE) {
            self.record_before_delete(host, scn, update, counters);
            return;
        }
        if scn.flags.contains(ModFlags::BEFORE_INSERT) {
            // Nothing to do until the text lands.
            return;
        }
        if scn.flags.contains(ModFlags::DELETE_TEXT) && self.pending_delete.is_some() {
            self.apply_pending_delete();
            return;
        }
        self.record_modification(host, marks, scn, update, counters);
    }

    /// A multi-line delete was announced: walk the doomed lines while
    /// they still exist, remove their markers from the host, and reserve
    /// history entries at the index the performed notification will use.
    fn record_before_delete(
        &mut self,
        host: &mut dyn HostEditor,
        scn: &Notification,
        update: &IndexUpdate,
        counters: &mut InconsistencyCounters,
    ) {
        let doc = self.doc;
        let start_line = host.line_from_position(doc, scn.position);
        let end_line = host.line_from_position(doc, scn.position + scn.length);
        if end_line <= start_line {
            // Single-line delete; the performed notification records it.
            return;
        }
        let current = update.prev_index;

        // Stale redo entries would collide with the reserved slot.
        if self.history.max_index().is_some_and(|max| max > current) {
            self.history.truncate_from_next(current);
        }

        let at_line_start = scn.position == host.position_of_line(doc, start_line);
        let first_removed = if at_line_start { start_line } else { start_line + 1 };
        let count = end_line - start_line;

        // Shape entry first: replay interprets marker lines in the space
        // this change produces.
        let shape_handle = self.next_pending();
        self.insert_history(
            current + 1,
            HistoryEntry::new(
                ActionKind::LineCountChange,
                MarkKind::NotSaved,
                shape_handle,
                -count,
            )
            .with_span(first_removed, first_removed + count),
            counters,
        );

        for line in first_removed..end_line {
            for mark in MarkKind::ALL {
                let Some(handle) = self.line_map.handle_on_line(line, mark) else {
                    continue;
                };
                if let Some(h) = handle.assigned() {
                    host.delete_marker(doc, h);
                }
                self.line_map.delete_handle(line, mark, handle);
                // Every entry referencing the dead handle follows the
                // marker onto the placeholder, so the next replay that
                // revives it renumbers them all at once.
                let placeholder = self.next_pending();
                self.history.replace_handle(handle, placeholder);
                self.insert_history(
                    current + 1,
                    HistoryEntry::new(ActionKind::MarkerDelete, mark, placeholder, line)
                        .with_span(line, line + 1),
                    counters,
                );
            }
        }

        // A marker just below the deleted span survives on the merge
        // line; record the move so undo can put it back.
        let mut survivors = Vec::new();
        for mark in MarkKind::ALL {
            if let Some(handle) = self.line_map.handle_on_line(end_line, mark) {
                survivors.push((mark, handle));
                self.insert_history(
                    current + 1,
                    HistoryEntry::new(ActionKind::MarkerMove, mark, handle, end_line)
                        .with_span(start_line, end_line),
                    counters,
                );
            }
        }

        self.pending_delete = Some(PendingDelete {
            start: first_removed,
            count,
            merge_line: start_line,
            survivors,
        });
    }

    /// The performed half of an announced multi-line delete: apply the
    /// line-shape change the before pass reserved.
    fn apply_pending_delete(&mut self) {
        let Some(pending) = self.pending_delete.take() else {
            return;
        };
        for &(mark, handle) in &pending.survivors {
            self.unmap_handle(mark, handle);
        }
        self.line_map.delete_lines(pending.start, pending.count);
        for &(mark, handle) in &pending.survivors {
            self.line_map.add_handle(pending.merge_line, mark, handle);
        }
    }

    /// A plain performed modification: mark the touched lines as changed.
    fn record_modification(
        &mut self,
        host: &mut dyn HostEditor,
        marks: &[ChangeMark; MarkKind::COUNT],
        scn: &Notification,
        update: &IndexUpdate,
        counters: &mut InconsistencyCounters,
    ) {
        let doc = self.doc;
        let current = update.curr_index;
        let Some(number) = marks[MarkKind::NotSaved as usize].number else {
            return;
        };

        // New edits after an undo invalidate the history above them.
        if self.history.max_index().is_some_and(|max| max >= current) {
            self.history.truncate_from(current);
        }

        let origin = host.line_from_position(doc, scn.position);
        let added = scn.lines_added.max(0);

        if added > 0 {
            let at_line_start = scn.position == host.position_of_line(doc, origin);
            let shift_start = if at_line_start { origin } else { origin + 1 };
            self.line_map.insert_lines(shift_start, added);
            let shape_handle = self.next_pending();
            self.insert_history(
                current,
                HistoryEntry::new(
                    ActionKind::LineCountChange,
                    MarkKind::NotSaved,
                    shape_handle,
                    added,
                )
                .with_span(shift_start, shift_start + added),
                counters,
            );
        } else if scn.lines_added < 0 {
            // A multi-line delete whose announcement never arrived; keep
            // the map shape sane regardless.
            counters.unexpected_replay += 1;
            self.line_map.delete_lines(origin + 1, -scn.lines_added);
        }

        for line in origin..origin + added.max(1) {
            if self.line_map.handle_on_line(line, MarkKind::NotSaved).is_some() {
                continue;
            }
            match host.add_marker(doc, line, number) {
                Some(h) => {
                    let handle = Handle::Assigned(h);
                    self.line_map.add_handle(line, MarkKind::NotSaved, handle);
                    self.insert_history(
                        current,
                        HistoryEntry::new(ActionKind::MarkerAdd, MarkKind::NotSaved, handle, line)
                            .with_span(line, line + 1),
                        counters,
                    );
                }
                None => counters.unresolved_handle += 1,
            }
        }
    }

    fn insert_history(&mut self, index: i64, entry: HistoryEntry, counters: &mut InconsistencyCounters) {
        if self.history.insert_at_index(index, entry).is_none() {
            debug!(doc = self.doc.0, index, "duplicate history key rejected");
            debug_assert!(false, "duplicate history key at index {index}");
            counters.duplicate_history_insert += 1;
        }
    }

    // ----- undo/redo replay --------------------------------------------

    /// Replay the entries recorded for `index` backwards.
    fn replay_undo(
        &mut self,
        host: &mut dyn HostEditor,
        marks: &[ChangeMark; MarkKind::COUNT],
        index: i64,
        counters: &mut InconsistencyCounters,
    ) {
        let keys = self.history.keys_at_rev(index);
        // Shape first; see the module contract.
        for &key in &keys {
            let Some(entry) = self.history.get(key).cloned() else { continue };
            if entry.kind == ActionKind::LineCountChange {
                if entry.reference > 0 {
                    self.line_map.delete_lines(entry.start, entry.reference);
                } else {
                    self.line_map.insert_lines(entry.start, -entry.reference);
                }
            }
        }
        let mut moves = Vec::new();
        for &key in &keys {
            let Some(entry) = self.history.get(key).cloned() else { continue };
            let number = marks[entry.mark as usize].number;
            match entry.kind {
                ActionKind::LineCountChange => {}
                ActionKind::MarkerMove => moves.push(entry),
                ActionKind::MarkerAdd => {
                    // Take the marker back out of the host and leave a
                    // placeholder every entry holding this handle can
                    // follow to the redo.
                    if let Some(h) = entry.handle.assigned() {
                        host.delete_marker(self.doc, h);
                    }
                    self.unmap_handle(entry.mark, entry.handle);
                    let placeholder = self.next_pending();
                    self.history.replace_handle(entry.handle, placeholder);
                }
                ActionKind::MarkerDelete => {
                    // Put the deleted marker back on its recorded line.
                    self.restore_marker(host, number, entry.mark, entry.handle, entry.start, counters);
                }
            }
        }
        for entry in moves {
            // Back from the merge line to the line it lived on.
            self.move_marker(host, marks, &entry, entry.end, counters);
        }
    }

    /// Replay the entries recorded for `index` forwards.
    fn replay_redo(
        &mut self,
        host: &mut dyn HostEditor,
        marks: &[ChangeMark; MarkKind::COUNT],
        index: i64,
        counters: &mut InconsistencyCounters,
    ) {
        let keys: Vec<_> = self.history.entries_at(index).map(|(key, _)| key).collect();
        for &key in &keys {
            let Some(entry) = self.history.get(key).cloned() else { continue };
            if entry.kind == ActionKind::LineCountChange {
                if entry.reference > 0 {
                    self.line_map.insert_lines(entry.start, entry.reference);
                } else {
                    self.line_map.delete_lines(entry.start, -entry.reference);
                }
            }
        }
        let mut moves = Vec::new();
        for &key in &keys {
            let Some(entry) = self.history.get(key).cloned() else { continue };
            let number = marks[entry.mark as usize].number;
            match entry.kind {
                ActionKind::LineCountChange => {}
                ActionKind::MarkerMove => moves.push(entry),
                ActionKind::MarkerAdd => {
                    // The marker returns on the line it was recorded on.
                    self.restore_marker(host, number, entry.mark, entry.handle, entry.start, counters);
                }
                ActionKind::MarkerDelete => {
                    if let Some(h) = entry.handle.assigned() {
                        host.delete_marker(self.doc, h);
                    }
                    self.unmap_handle(entry.mark, entry.handle);
                    let placeholder = self.next_pending();
                    self.history.replace_handle(entry.handle, placeholder);
                }
            }
        }
        for entry in moves {
            // Forward again: down onto the merge line.
            self.move_marker(host, marks, &entry, entry.start, counters);
        }
    }

    /// Re-create a marker on `line` and propagate the fresh handle to the
    /// history and the line map.
    fn restore_marker(
        &mut self,
        host: &mut dyn HostEditor,
        number: Option<u32>,
        mark: MarkKind,
        old: Handle,
        line: i64,
        counters: &mut InconsistencyCounters,
    ) {
        let Some(number) = number else {
            counters.unresolved_handle += 1;
            return;
        };
        match host.add_marker(self.doc, line, number) {
            Some(h) => {
                let new = Handle::Assigned(h);
                self.history.replace_handle(old, new);
                self.line_map.add_handle(line, mark, new);
            }
            None => counters.unresolved_handle += 1,
        }
    }

    /// Re-seat a moved marker on `target`: the host marker is re-created
    /// there and the stale one removed.
    fn move_marker(
        &mut self,
        host: &mut dyn HostEditor,
        marks: &[ChangeMark; MarkKind::COUNT],
        entry: &HistoryEntry,
        target: i64,
        counters: &mut InconsistencyCounters,
    ) {
        let handle = entry.handle;
        if self
            .line_map
            .handle_on_line(target, entry.mark)
            .is_some_and(|h| h != handle)
        {
            // The target line already carries a marker of this class; the
            // move replays as a recorded no-op.
            counters.unexpected_replay += 1;
            let placeholder = self.next_pending();
            self.history.replace_handle(handle, placeholder);
            self.unmap_handle(entry.mark, handle);
            return;
        }
        if let Some(h) = handle.assigned() {
            host.delete_marker(self.doc, h);
        }
        self.unmap_handle(entry.mark, handle);
        match marks[entry.mark as usize].number.and_then(|n| host.add_marker(self.doc, target, n)) {
            Some(h) => {
                let new = Handle::Assigned(h);
                self.history.replace_handle(handle, new);
                self.line_map.add_handle(target, entry.mark, new);
            }
            None => counters.unresolved_handle += 1,
        }
    }

    // ----- save-point processing ---------------------------------------

    /// Promote every live unsaved marker to the saved class and anchor
    /// the save point in history. Idempotent with no intervening edits.
    fn process_save(
        &mut self,
        host: &mut dyn HostEditor,
        marks: &[ChangeMark; MarkKind::COUNT],
        save_index: i64,
        counters: &mut InconsistencyCounters,
    ) {
        let doc = self.doc;
        let saved_number = marks[MarkKind::Saved as usize].number;
        let Some(saved_number) = saved_number else { return };

        // Saved-class entries whose marker is gone from the host are
        // stale; demote them so they read as ordinary unsaved history.
        let stale: Vec<Handle> = self
            .history
            .handles()
            .filter(|&handle| {
                let is_saved = self
                    .history
                    .keys_with_handle(handle)
                    .iter()
                    .filter_map(|&key| self.history.get(key))
                    .any(|entry| entry.mark == MarkKind::Saved);
                let visible = handle
                    .assigned()
                    .is_some_and(|h| host.marker_line(doc, h).is_some());
                is_saved && !visible
            })
            .collect_vec();
        for handle in stale {
            self.history.set_mark_for_handle(handle, MarkKind::NotSaved);
        }

        // Swap every live unsaved marker over to the saved class.
        let promote: Vec<(i64, Handle)> = self
            .line_map
            .iter()
            .filter_map(|(line, entry)| {
                entry
                    .present()
                    .find(|&(mark, _)| mark == MarkKind::NotSaved)
                    .map(|(_, handle)| (line, handle))
            })
            .collect();
        for (line, handle) in promote {
            // A saved marker already on the line is superseded.
            if let Some(old) = self.line_map.handle_on_line(line, MarkKind::Saved) {
                if let Some(h) = old.assigned() {
                    host.delete_marker(doc, h);
                }
                self.line_map.delete_handle(line, MarkKind::Saved, old);
            }
            if let Some(h) = handle.assigned() {
                host.delete_marker(doc, h);
            }
            match host.add_marker(doc, line, saved_number) {
                Some(h) => {
                    let new = Handle::Assigned(h);
                    self.line_map.delete_handle(line, MarkKind::NotSaved, handle);
                    self.line_map.add_handle(line, MarkKind::Saved, new);
                    self.history.replace_handle(handle, new);
                    self.history.set_mark_for_handle(new, MarkKind::Saved);
                }
                None => counters.unresolved_handle += 1,
            }
        }

        // Exactly one entry anchors the save point: the most recent
        // marker entry at or before the index the document was saved at.
        if let Some(key) = self.history.latest_marker_at_or_before(save_index) {
            self.history.set_save_point(key, save_index);
        }
        self.save_point_index = save_index;
    }

    // ----- navigation --------------------------------------------------

    /// Next change line in handle (creation) order from the last visited
    /// handle, skipping handles that no longer resolve to a line.
    fn next_change_line(&mut self, forward: bool) -> Option<i64> {
        let handles = self.history.handles().collect_vec();
        let iter: Box<dyn Iterator<Item = Handle>> = if forward {
            Box::new(handles.into_iter())
        } else {
            Box::new(handles.into_iter().rev())
        };
        // The largest handle the line map has seen bounds a backward
        // walk: anything newer cannot still be on screen.
        let newest = self.line_map.max_handle().map(Handle::Assigned);
        let mut past_cursor = self.last_visited.is_none();
        for handle in iter {
            if !past_cursor {
                if Some(handle) == self.last_visited {
                    past_cursor = true;
                }
                continue;
            }
            if !forward && newest.is_some_and(|n| handle > n) {
                continue;
            }
            if let Some(line) = self.line_map.line_of_handle(MarkKind::NotSaved, handle) {
                self.last_visited = Some(handle);
                return Some(line);
            }
        }
        // Boundary reached; the next jump starts over.
        self.last_visited = None;
        None
    }

    /// Nearest unsaved-change line above or below the caret.
    fn nearest_change_line(&self, caret: i64, down: bool) -> Option<i64> {
        let mut lines = self
            .line_map
            .iter()
            .filter(|(_, marks)| marks.present().any(|(m, _)| m == MarkKind::NotSaved))
            .map(|(line, _)| line);
        if down {
            lines.find(|&line| line > caret)
        } else {
            lines.filter(|&line| line < caret).last()
        }
    }
}

/// Root context of the plugin: the two change-mark definitions, the
/// action-index tracker, and the per-document controllers.
#[derive(Debug)]
pub struct ChangeTracker {
    marks: [ChangeMark; MarkKind::COUNT],
    index_tracker: ActionIndexTracker,
    documents: HashMap<DocId, ChangedDocument>,
    disabled_docs: HashSet<DocId>,
    /// Plugin-wide gate. Toggling it off suspends processing without
    /// discarding any per-document history.
    enabled: bool,
    /// Markers negotiated and registered with the host.
    tracking: bool,
    counters: InconsistencyCounters,
}

impl ChangeTracker {
    pub fn new(config: &PluginConfig) -> Self {
        Self {
            marks: [
                config.change_mark(MarkKind::Saved),
                config.change_mark(MarkKind::NotSaved),
            ],
            index_tracker: ActionIndexTracker::new(),
            documents: HashMap::new(),
            disabled_docs: HashSet::new(),
            enabled: config.active() && config.track_undo_redo(),
            tracking: false,
            counters: InconsistencyCounters::default(),
        }
    }

    /// Negotiate marker numbers with the host and register both marker
    /// classes. Failure leaves the plugin loaded but not tracking.
    pub fn init_markers(&mut self, host: &mut dyn HostEditor) -> Result<(), ChangeMarkError> {
        match negotiate_markers(host, MarkKind::COUNT) {
            Ok(numbers) => {
                for (mark, number) in self.marks.iter_mut().zip(numbers) {
                    mark.number = Some(number);
                    mark.define_in_host(host);
                }
                if self.marks[0].margin.target() == Some(MarginTarget::Plugin) {
                    for slot in ViewSlot::BOTH {
                        self.marks[0].margin.adjust_width(host, slot, PLUGIN_MARGIN_WIDTH);
                    }
                }
                self.tracking = true;
                Ok(())
            }
            Err(err) => {
                self.tracking = false;
                host.notify_user(
                    "Change Markers",
                    &format!("Change tracking has been disabled: {err}"),
                );
                Err(err)
            }
        }
    }

    pub fn mark(&self, kind: MarkKind) -> &ChangeMark {
        &self.marks[kind as usize]
    }

    pub fn counters(&self) -> InconsistencyCounters {
        self.counters
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Current action index for a document.
    pub fn action_index(&self, doc: DocId) -> i64 {
        self.index_tracker.current(doc)
    }

    /// Per-document state, if the document is tracked.
    pub fn document(&self, doc: DocId) -> Option<&ChangedDocument> {
        self.documents.get(&doc)
    }

    /// Entry point for every host modification notification.
    pub fn on_modification(&mut self, host: &mut dyn HostEditor, scn: &Notification) {
        let update = self.index_tracker.process(host, scn);
        if update.excluded || !self.enabled || !self.tracking {
            return;
        }
        // An announced undo/redo step carries nothing to record; wait for
        // the performed notification.
        if update.dry_run
            && scn
                .flags
                .intersects(ModFlags::PERFORMED_UNDO | ModFlags::PERFORMED_REDO)
        {
            return;
        }
        if self.disabled_docs.contains(&update.doc) {
            return;
        }

        let state = self
            .documents
            .entry(update.doc)
            .or_insert_with(|| ChangedDocument::new(update.doc));

        if scn.flags.contains(ModFlags::PERFORMED_UNDO) {
            // Undo targets history recorded under the earlier index.
            state.replay_undo(host, &self.marks, update.prev_index, &mut self.counters);
            state.pending_delete = None;
        } else if scn.flags.contains(ModFlags::PERFORMED_REDO) {
            state.replay_redo(host, &self.marks, update.curr_index, &mut self.counters);
            state.pending_delete = None;
        } else {
            state.record_new_action(host, &self.marks, scn, &update, &mut self.counters);
        }

        // Orphan sweep: at the baseline or back at the save point no
        // unsaved marker may remain, whatever path led here.
        if !update.dry_run {
            let index = self.index_tracker.current(update.doc);
            if (index == 0 || index == state.save_point_index)
                && let Some(number) = self.marks[MarkKind::NotSaved as usize].number
            {
                host.delete_all_markers(update.doc, number);
            }
        }
    }

    /// The host saved a document: promote its markers and anchor the
    /// save point.
    pub fn process_file_save(&mut self, host: &mut dyn HostEditor, doc: DocId) {
        if !self.enabled || !self.tracking {
            return;
        }
        let save_index = self.index_tracker.current(doc);
        if let Some(state) = self.documents.get_mut(&doc) {
            state.process_save(host, &self.marks, save_index, &mut self.counters);
        }
    }

    /// A document is becoming visible; re-assert the margin masks for
    /// the views showing it.
    pub fn on_buffer_activated(&mut self, host: &mut dyn HostEditor, doc: DocId) {
        if !self.tracking {
            return;
        }
        for slot in ViewSlot::BOTH {
            if host.visible_doc(slot) != Some(doc) {
                continue;
            }
            for mark in &mut self.marks {
                if mark.display
                    && let Some(number) = mark.number
                {
                    mark.margin.show_marker(host, slot, number);
                }
            }
        }
    }

    /// The host is about to close a document: every trace of it goes.
    pub fn on_file_before_close(&mut self, doc: DocId) {
        self.documents.remove(&doc);
        self.disabled_docs.remove(&doc);
        self.index_tracker.forget(doc);
    }

    /// Dispatch a menu command against the active document. Jump
    /// commands return the line jumped to.
    pub fn run_command(
        &mut self,
        host: &mut dyn HostEditor,
        doc: DocId,
        command: Command,
    ) -> Option<i64> {
        match command {
            Command::JumpChangePrev => self.jump_change(host, doc, false),
            Command::JumpChangeNext => self.jump_change(host, doc, true),
            Command::JumpLineUp => self.jump_line(host, doc, false),
            Command::JumpLineDown => self.jump_line(host, doc, true),
            Command::DisplayLineNumberMargin => {
                self.set_display_margin(host, MarginTarget::LineNumber);
                None
            }
            Command::DisplayChangeMarkMargin => {
                self.set_display_margin(host, MarginTarget::Bookmark);
                None
            }
            Command::DisplayPluginMargin => {
                self.set_display_margin(host, MarginTarget::Plugin);
                None
            }
            Command::DisplayAsHighlight => {
                self.set_display_margin(host, MarginTarget::None);
                None
            }
            Command::DisableDocument => {
                self.disable_document(host, doc);
                None
            }
            Command::DisablePlugin => {
                self.shutdown(host);
                None
            }
        }
    }

    fn jump_change(&mut self, host: &mut dyn HostEditor, doc: DocId, forward: bool) -> Option<i64> {
        let line = self.documents.get_mut(&doc)?.next_change_line(forward)?;
        host.goto_line(doc, line);
        Some(line)
    }

    fn jump_line(&mut self, host: &mut dyn HostEditor, doc: DocId, down: bool) -> Option<i64> {
        let caret = host.caret_line(doc);
        let line = self.documents.get(&doc)?.nearest_change_line(caret, down)?;
        host.goto_line(doc, line);
        Some(line)
    }

    /// Move marker display to another margin (or none, which renders the
    /// markers as line highlights).
    fn set_display_margin(&mut self, host: &mut dyn HostEditor, target: MarginTarget) {
        let leaving_plugin = self.marks[0].margin.target() == Some(MarginTarget::Plugin);
        // Width has to come back while the plugin margin is still the
        // target; restore_width reads the target it adjusted.
        if leaving_plugin && target != MarginTarget::Plugin {
            for slot in ViewSlot::BOTH {
                self.marks[0].margin.restore_width(host, slot);
            }
        }
        for mark in &mut self.marks {
            let Some(number) = mark.number else { continue };
            for slot in ViewSlot::BOTH {
                mark.margin.hide_marker(host, slot, number);
            }
            mark.margin.set_target(target);
            for slot in ViewSlot::BOTH {
                mark.margin.show_marker(host, slot, number);
            }
        }
        if !leaving_plugin && target == MarginTarget::Plugin {
            for slot in ViewSlot::BOTH {
                self.marks[0].margin.adjust_width(host, slot, PLUGIN_MARGIN_WIDTH);
            }
        }
    }

    /// Stop tracking one document: markers cleared, history discarded,
    /// host undo history untouched.
    pub fn disable_document(&mut self, host: &mut dyn HostEditor, doc: DocId) {
        self.documents.remove(&doc);
        self.disabled_docs.insert(doc);
        for mark in &self.marks {
            if let Some(number) = mark.number {
                host.delete_all_markers(doc, number);
            }
        }
        // The action index keeps mirroring the host counter; only the
        // marker state is discarded.
    }

    /// Suspend or resume all processing. History survives a suspension.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Full teardown: every tracked document loses its markers and
    /// state, and processing stops.
    pub fn shutdown(&mut self, host: &mut dyn HostEditor) {
        let docs: Vec<DocId> = self.documents.keys().copied().collect();
        for doc in docs {
            for mark in &self.marks {
                if let Some(number) = mark.number {
                    host.delete_all_markers(doc, number);
                }
            }
        }
        if self.marks[0].margin.target() == Some(MarginTarget::Plugin) {
            for slot in ViewSlot::BOTH {
                self.marks[0].margin.restore_width(host, slot);
            }
        }
        self.documents.clear();
        self.disabled_docs.clear();
        self.enabled = false;
    }
}
