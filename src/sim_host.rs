//! Simulated host editor.
//!
//! `SimHost` implements [`HostEditor`] over ropey text buffers and
//! reproduces the host's notification discipline: a "before" notification
//! while the document is still unchanged, then the applied edit, then the
//! performed notification, with a copy of each delivered to every view
//! bound to the document, exactly the duplication the action index
//! tracker has to filter out. It also keeps a real undo/redo stack so
//! replay scripts and tests can exercise the full undo/redo paths.

use std::collections::{BTreeMap, HashMap};

use ropey::Rope;

use crate::change_mark::{Color, MarginTarget};
use crate::host::{HostEditor, HostHandle, ViewSlot};
use crate::notification::{DocId, ModFlags, Notification, ViewId};

const MAIN_VIEW: ViewId = ViewId(0);
const SUB_VIEW: ViewId = ViewId(1);

/// One recorded edit, for undo/redo.
#[derive(Debug, Clone)]
struct EditRecord {
    position: usize,
    text: String,
    insert: bool,
}

impl EditRecord {
    fn lines_spanned(&self) -> i64 {
        self.text.matches('\n').count() as i64
    }
}

/// An edit accepted but not yet applied; the "before" notification has
/// gone out and the performed one is owed.
#[derive(Debug, Clone)]
enum Staged {
    Insert { position: usize, text: String, flags: ModFlags },
    Delete { position: usize, length: usize, flags: ModFlags },
}

#[derive(Debug, Default)]
struct SimDocument {
    text: Rope,
    /// handle → (line, marker number)
    markers: BTreeMap<HostHandle, (i64, u32)>,
    undo: Vec<EditRecord>,
    redo: Vec<EditRecord>,
    staged: Option<Staged>,
    caret_line: i64,
}

/// A marker definition recorded for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerDef {
    pub slot: ViewSlot,
    pub marker: u32,
    pub symbol: u32,
    pub fore: Color,
    pub back: Color,
    pub alpha: u8,
}

#[derive(Debug, Clone, Copy, Default)]
struct MarginState {
    width: i32,
    mask: u32,
}

/// Simulated host editor with two live views and any number of hidden
/// ones.
#[derive(Debug, Default)]
pub struct SimHost {
    docs: BTreeMap<DocId, SimDocument>,
    view_docs: [Option<DocId>; 2],
    hidden_views: HashMap<ViewId, DocId>,
    next_doc: u64,
    next_view: u64,
    next_handle: HostHandle,
    margins: [[MarginState; 6]; 2],
    free_markers: [bool; 16],
    negotiation_silent: bool,
    prompt_replies: Vec<bool>,
    /// Recorded interactions, for assertions.
    pub marker_defs: Vec<MarkerDef>,
    pub prompts: Vec<String>,
    pub notices: Vec<(String, String)>,
}

impl SimHost {
    pub fn new() -> Self {
        Self {
            next_view: 2, // 0 and 1 are the live views
            next_handle: 1,
            free_markers: [true; 16],
            ..Self::default()
        }
    }

    /// Create a document from initial text. The document starts hidden.
    pub fn open_document(&mut self, text: &str) -> DocId {
        let doc = DocId(self.next_doc);
        self.next_doc += 1;
        self.docs.insert(
            doc,
            SimDocument {
                text: Rope::from_str(text),
                ..SimDocument::default()
            },
        );
        doc
    }

    /// Bind a document to one of the live view slots.
    pub fn show_in_view(&mut self, slot: ViewSlot, doc: DocId) {
        self.view_docs[slot as usize] = Some(doc);
    }

    /// Create a hidden view bound to a document.
    pub fn hidden_view(&mut self, doc: DocId) -> ViewId {
        let view = ViewId(self.next_view);
        self.next_view += 1;
        self.hidden_views.insert(view, doc);
        view
    }

    /// Remove a document and every view binding to it.
    pub fn close_document(&mut self, doc: DocId) {
        self.docs.remove(&doc);
        for slot in &mut self.view_docs {
            if *slot == Some(doc) {
                *slot = None;
            }
        }
        self.hidden_views.retain(|_, &mut d| d != doc);
    }

    /// Mark some marker numbers as already taken by another plugin.
    pub fn reserve_markers(&mut self, markers: &[u32]) {
        for &marker in markers {
            self.free_markers[marker as usize] = false;
        }
    }

    /// Make every negotiation probe go unanswered.
    pub fn set_negotiation_silent(&mut self, silent: bool) {
        self.negotiation_silent = silent;
    }

    /// Queue replies for `prompt_retry`, consumed oldest first; an empty
    /// queue answers "no".
    pub fn queue_prompt_reply(&mut self, reply: bool) {
        self.prompt_replies.push(reply);
    }

    /// Full document text.
    pub fn text(&self, doc: DocId) -> String {
        self.docs[&doc].text.to_string()
    }

    /// Lines carrying a marker number, ascending.
    pub fn marker_lines(&self, doc: DocId, marker: u32) -> Vec<i64> {
        let mut lines: Vec<i64> = self.docs[&doc]
            .markers
            .values()
            .filter(|&&(_, m)| m == marker)
            .map(|&(line, _)| line)
            .collect();
        lines.sort_unstable();
        lines
    }

    /// Count of markers of one number in a document.
    pub fn marker_count(&self, doc: DocId, marker: u32) -> usize {
        self.docs[&doc]
            .markers
            .values()
            .filter(|&&(_, m)| m == marker)
            .count()
    }

    fn doc(&self, doc: DocId) -> &SimDocument {
        self.docs.get(&doc).expect("unknown document")
    }

    fn doc_mut(&mut self, doc: DocId) -> &mut SimDocument {
        self.docs.get_mut(&doc).expect("unknown document")
    }

    /// Every view bound to a document gets a copy of each notification.
    fn notifications(
        &self,
        doc: DocId,
        flags: ModFlags,
        position: usize,
        length: usize,
        lines_added: i64,
    ) -> Vec<Notification> {
        let mut out = Vec::new();
        let mut push = |view: ViewId| {
            out.push(Notification {
                view,
                doc,
                flags,
                position,
                length,
                lines_added,
            });
        };
        if self.view_docs[0] == Some(doc) {
            push(MAIN_VIEW);
        }
        if self.view_docs[1] == Some(doc) {
            push(SUB_VIEW);
        }
        for (&view, &d) in &self.hidden_views {
            if d == doc {
                push(view);
            }
        }
        out
    }

    /// Stage a user insertion: returns the "before" notifications, with
    /// the document still unchanged.
    pub fn stage_insert(&mut self, doc: DocId, position: usize, text: &str) -> Vec<Notification> {
        let flags = ModFlags::PERFORMED_USER;
        self.doc_mut(doc).staged = Some(Staged::Insert {
            position,
            text: text.to_string(),
            flags,
        });
        self.notifications(
            doc,
            ModFlags::BEFORE_INSERT | flags,
            position,
            text.len(),
            0,
        )
    }

    /// Stage a user deletion.
    pub fn stage_delete(&mut self, doc: DocId, position: usize, length: usize) -> Vec<Notification> {
        let flags = ModFlags::PERFORMED_USER;
        self.doc_mut(doc).staged = Some(Staged::Delete {
            position,
            length,
            flags,
        });
        self.notifications(doc, ModFlags::BEFORE_DELETE | flags, position, length, 0)
    }

    /// Stage the next undo step, or `None` with an exhausted undo stack.
    /// The record moves to the redo stack when the edit is committed.
    pub fn stage_undo(&mut self, doc: DocId) -> Option<Vec<Notification>> {
        let record = self.doc(doc).undo.last()?.clone();
        let mut flags = ModFlags::PERFORMED_UNDO;
        if record.lines_spanned() > 0 {
            flags |= ModFlags::MULTILINE_UNDO_REDO | ModFlags::LAST_STEP_IN_UNDO_REDO;
        }
        // Undo inverts the recorded edit.
        let (before, staged) = if record.insert {
            (
                ModFlags::BEFORE_DELETE,
                Staged::Delete {
                    position: record.position,
                    length: record.text.len(),
                    flags,
                },
            )
        } else {
            (
                ModFlags::BEFORE_INSERT,
                Staged::Insert {
                    position: record.position,
                    text: record.text.clone(),
                    flags,
                },
            )
        };
        let length = record.text.len();
        self.doc_mut(doc).staged = Some(staged);
        Some(self.notifications(doc, before | ModFlags::PERFORMED_UNDO, record.position, length, 0))
    }

    /// Stage the next redo step, or `None` with an exhausted redo stack.
    pub fn stage_redo(&mut self, doc: DocId) -> Option<Vec<Notification>> {
        let record = self.doc(doc).redo.last()?.clone();
        let mut flags = ModFlags::PERFORMED_REDO;
        if record.lines_spanned() > 0 {
            flags |= ModFlags::MULTILINE_UNDO_REDO | ModFlags::LAST_STEP_IN_UNDO_REDO;
        }
        let (before, staged) = if record.insert {
            (
                ModFlags::BEFORE_INSERT,
                Staged::Insert {
                    position: record.position,
                    text: record.text.clone(),
                    flags,
                },
            )
        } else {
            (
                ModFlags::BEFORE_DELETE,
                Staged::Delete {
                    position: record.position,
                    length: record.text.len(),
                    flags,
                },
            )
        };
        let length = record.text.len();
        self.doc_mut(doc).staged = Some(staged);
        Some(self.notifications(doc, before | ModFlags::PERFORMED_REDO, record.position, length, 0))
    }

    /// Apply the staged edit and return the performed notifications.
    pub fn commit(&mut self, doc: DocId) -> Vec<Notification> {
        let staged = self
            .doc_mut(doc)
            .staged
            .take()
            .expect("commit without a staged edit");
        match staged {
            Staged::Insert { position, text, flags } => {
                let lines_added = self.apply_insert(doc, position, &text);
                self.record_edit(doc, position, text.clone(), true, flags);
                self.notifications(
                    doc,
                    ModFlags::INSERT_TEXT | flags,
                    position,
                    text.len(),
                    lines_added,
                )
            }
            Staged::Delete { position, length, flags } => {
                let (removed, lines_removed) = self.apply_delete(doc, position, length);
                self.record_edit(doc, position, removed, false, flags);
                self.notifications(
                    doc,
                    ModFlags::DELETE_TEXT | flags,
                    position,
                    length,
                    -lines_removed,
                )
            }
        }
    }

    /// Update the undo/redo stacks for a committed edit.
    fn record_edit(&mut self, doc: DocId, position: usize, text: String, insert: bool, flags: ModFlags) {
        let state = self.doc_mut(doc);
        if flags.contains(ModFlags::PERFORMED_UNDO) {
            let undone = state.undo.pop().expect("undo without history");
            state.redo.push(undone);
        } else if flags.contains(ModFlags::PERFORMED_REDO) {
            let redone = state.redo.pop().expect("redo without history");
            state.undo.push(redone);
        } else {
            state.undo.push(EditRecord { position, text, insert });
            state.redo.clear();
        }
    }

    /// Insert text, shifting markers the way the host does: a marker
    /// moves when the start of its line moves.
    fn apply_insert(&mut self, doc: DocId, position: usize, text: &str) -> i64 {
        let state = self.doc_mut(doc);
        let line = state.text.byte_to_line(position) as i64;
        let at_line_start = position == state.text.line_to_byte(line as usize);
        let char_idx = state.text.byte_to_char(position);
        state.text.insert(char_idx, text);

        let added = text.matches('\n').count() as i64;
        if added > 0 {
            for (marker_line, _) in state.markers.values_mut() {
                if *marker_line > line || (at_line_start && *marker_line == line) {
                    *marker_line += added;
                }
            }
        }
        added
    }

    /// Delete a byte span. Markers on removed lines pile onto the merge
    /// line, the behavior this plugin's before-delete pass works around.
    fn apply_delete(&mut self, doc: DocId, position: usize, length: usize) -> (String, i64) {
        let state = self.doc_mut(doc);
        let start_line = state.text.byte_to_line(position) as i64;
        let end_line = state.text.byte_to_line(position + length) as i64;
        let count = end_line - start_line;

        let start_char = state.text.byte_to_char(position);
        let end_char = state.text.byte_to_char(position + length);
        let removed = state.text.slice(start_char..end_char).to_string();
        state.text.remove(start_char..end_char);

        if count > 0 {
            for (marker_line, _) in state.markers.values_mut() {
                if *marker_line > end_line {
                    *marker_line -= count;
                } else if *marker_line >= start_line {
                    *marker_line = start_line;
                }
            }
        }
        (removed, count)
    }
}

impl HostEditor for SimHost {
    fn view_handle(&self, slot: ViewSlot) -> ViewId {
        match slot {
            ViewSlot::Main => MAIN_VIEW,
            ViewSlot::Sub => SUB_VIEW,
        }
    }

    fn visible_doc(&self, slot: ViewSlot) -> Option<DocId> {
        self.view_docs[slot as usize]
    }

    fn document_of_view(&self, view: ViewId) -> Option<DocId> {
        if view == MAIN_VIEW {
            self.view_docs[0]
        } else if view == SUB_VIEW {
            self.view_docs[1]
        } else {
            self.hidden_views.get(&view).copied()
        }
    }

    fn line_from_position(&self, doc: DocId, position: usize) -> i64 {
        let state = self.doc(doc);
        state.text.byte_to_line(position.min(state.text.len_bytes())) as i64
    }

    fn position_of_line(&self, doc: DocId, line: i64) -> usize {
        let state = self.doc(doc);
        let line = (line.max(0) as usize).min(state.text.len_lines().saturating_sub(1));
        state.text.line_to_byte(line)
    }

    fn line_count(&self, doc: DocId) -> i64 {
        self.doc(doc).text.len_lines() as i64
    }

    fn caret_line(&self, doc: DocId) -> i64 {
        self.doc(doc).caret_line
    }

    fn goto_line(&mut self, doc: DocId, line: i64) {
        self.doc_mut(doc).caret_line = line;
    }

    fn add_marker(&mut self, doc: DocId, line: i64, marker: u32) -> Option<HostHandle> {
        if marker >= 32 {
            return None;
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        self.doc_mut(doc).markers.insert(handle, (line, marker));
        Some(handle)
    }

    fn delete_marker(&mut self, doc: DocId, handle: HostHandle) {
        self.doc_mut(doc).markers.remove(&handle);
    }

    fn delete_all_markers(&mut self, doc: DocId, marker: u32) {
        self.doc_mut(doc).markers.retain(|_, &mut (_, m)| m != marker);
    }

    fn marker_line(&self, doc: DocId, handle: HostHandle) -> Option<i64> {
        self.doc(doc).markers.get(&handle).map(|&(line, _)| line)
    }

    fn marker_mask_on_line(&self, doc: DocId, line: i64) -> u32 {
        self.doc(doc)
            .markers
            .values()
            .filter(|&&(l, _)| l == line)
            .fold(0, |mask, &(_, marker)| mask | (1 << marker))
    }

    fn define_marker(
        &mut self,
        slot: ViewSlot,
        marker: u32,
        symbol: u32,
        fore: Color,
        back: Color,
        alpha: u8,
    ) {
        self.marker_defs.push(MarkerDef {
            slot,
            marker,
            symbol,
            fore,
            back,
            alpha,
        });
    }

    fn margin_width(&self, slot: ViewSlot, margin: MarginTarget) -> i32 {
        self.margins[slot as usize][margin_index(margin)].width
    }

    fn set_margin_width(&mut self, slot: ViewSlot, margin: MarginTarget, width: i32) {
        self.margins[slot as usize][margin_index(margin)].width = width;
    }

    fn margin_mask(&self, slot: ViewSlot, margin: MarginTarget) -> u32 {
        self.margins[slot as usize][margin_index(margin)].mask
    }

    fn set_margin_mask(&mut self, slot: ViewSlot, margin: MarginTarget, mask: u32) {
        self.margins[slot as usize][margin_index(margin)].mask = mask;
    }

    fn probe_marker_number(&self, slot: ViewSlot, marker: u32) -> Option<bool> {
        let _ = slot;
        if self.negotiation_silent {
            return None;
        }
        self.free_markers.get(marker as usize).copied()
    }

    fn prompt_retry(&mut self, message: &str) -> bool {
        self.prompts.push(message.to_string());
        if self.prompt_replies.is_empty() {
            false
        } else {
            self.prompt_replies.remove(0)
        }
    }

    fn notify_user(&mut self, title: &str, message: &str) {
        self.notices.push((title.to_string(), message.to_string()));
    }
}

fn margin_index(margin: MarginTarget) -> usize {
    match margin {
        MarginTarget::None => 0,
        MarginTarget::LineNumber => 1,
        MarginTarget::Bookmark => 2,
        MarginTarget::Fold => 3,
        MarginTarget::Reserved => 4,
        MarginTarget::Plugin => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_with(text: &str) -> (SimHost, DocId) {
        let mut host = SimHost::new();
        let doc = host.open_document(text);
        host.show_in_view(ViewSlot::Main, doc);
        (host, doc)
    }

    #[test]
    fn test_stage_then_commit_insert() {
        let (mut host, doc) = host_with("one\ntwo\n");
        let before = host.stage_insert(doc, 4, "1.5\n");
        assert_eq!(before.len(), 1);
        assert!(before[0].flags.contains(ModFlags::BEFORE_INSERT));
        assert_eq!(host.text(doc), "one\ntwo\n");

        let after = host.commit(doc);
        assert!(after[0].flags.contains(ModFlags::INSERT_TEXT));
        assert_eq!(after[0].lines_added, 1);
        assert_eq!(host.text(doc), "one\n1.5\ntwo\n");
    }

    #[test]
    fn test_undo_inverts_insert() {
        let (mut host, doc) = host_with("one\n");
        host.stage_insert(doc, 4, "two\n");
        host.commit(doc);
        let before = host.stage_undo(doc).unwrap();
        assert!(before[0].flags.contains(ModFlags::BEFORE_DELETE));
        assert!(before[0].flags.contains(ModFlags::PERFORMED_UNDO));
        let after = host.commit(doc);
        assert!(after[0].flags.contains(ModFlags::DELETE_TEXT));
        assert!(after[0].flags.contains(ModFlags::MULTILINE_UNDO_REDO));
        assert_eq!(host.text(doc), "one\n");
        // And redo restores it.
        host.stage_redo(doc).unwrap();
        host.commit(doc);
        assert_eq!(host.text(doc), "one\ntwo\n");
    }

    #[test]
    fn test_markers_shift_on_insert() {
        let (mut host, doc) = host_with("a\nb\nc\n");
        let handle = host.add_marker(doc, 2, 5).unwrap();
        host.stage_insert(doc, 2, "x\ny\n");
        host.commit(doc);
        assert_eq!(host.marker_line(doc, handle), Some(4));
    }

    #[test]
    fn test_markers_pile_onto_merge_line_on_delete() {
        let (mut host, doc) = host_with("a\nb\nc\nd\n");
        let h1 = host.add_marker(doc, 1, 5).unwrap();
        let h3 = host.add_marker(doc, 3, 5).unwrap();
        // Delete lines 1..3 ("b\nc\n").
        host.stage_delete(doc, 2, 4);
        host.commit(doc);
        assert_eq!(host.marker_line(doc, h1), Some(1));
        assert_eq!(host.marker_line(doc, h3), Some(1));
    }

    #[test]
    fn test_cloned_views_duplicate_notifications() {
        let (mut host, doc) = host_with("a\n");
        host.show_in_view(ViewSlot::Sub, doc);
        let before = host.stage_insert(doc, 0, "x");
        assert_eq!(before.len(), 2);
        assert_ne!(before[0].view, before[1].view);
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let (mut host, doc) = host_with("a\n");
        host.stage_insert(doc, 0, "x");
        host.commit(doc);
        host.stage_undo(doc).unwrap();
        host.commit(doc);
        host.stage_insert(doc, 0, "y");
        host.commit(doc);
        assert!(host.stage_redo(doc).is_none());
    }
}
