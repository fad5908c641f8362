//! Per-document action counters mirroring the host's edit-action counter.
//!
//! The host keeps one document behind any number of views; every view
//! bound to a document receives a copy of each modification notification.
//! When counting actions for a document those extra copies must be
//! discarded or the count drifts away from the host's internal counter.
//! This module filters notifications by originating view and keeps one
//! counter per document in lockstep with the host.

use std::collections::HashMap;

use crate::host::{HostEditor, ViewSlot};
use crate::notification::{DocId, ModFlags, Notification};

/// Result of feeding one notification through the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexUpdate {
    /// Document the notification targeted.
    pub doc: DocId,
    /// Counter value before this notification.
    pub prev_index: i64,
    /// Counter value after this notification. Undo handling should use
    /// `prev_index` instead: an undo travels backwards into history that
    /// was recorded under the earlier value.
    pub curr_index: i64,
    /// The notification was a view duplicate or a non-final undo/redo
    /// step and did not change any state.
    pub excluded: bool,
    /// The notification was a "before" variant: the new value is computed
    /// and returned but not stored. The following performed notification
    /// re-derives and persists it.
    pub dry_run: bool,
}

/// Tracks one action counter per open document.
#[derive(Debug, Default)]
pub struct ActionIndexTracker {
    counters: HashMap<DocId, i64>,
}

impl ActionIndexTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter for a document. Documents never seen count 0.
    pub fn current(&self, doc: DocId) -> i64 {
        self.counters.get(&doc).copied().unwrap_or(0)
    }

    /// Drop the counter for a closed document.
    pub fn forget(&mut self, doc: DocId) {
        self.counters.remove(&doc);
    }

    /// Classify and count one modification notification.
    pub fn process(&mut self, host: &dyn HostEditor, scn: &Notification) -> IndexUpdate {
        let curr = self.current(scn.doc);
        let excluded = IndexUpdate {
            doc: scn.doc,
            prev_index: curr,
            curr_index: curr,
            excluded: true,
            dry_run: false,
        };

        if !scn.flags.is_edit() {
            return excluded;
        }
        if Self::is_view_duplicate(host, scn) {
            return excluded;
        }
        // Non-final steps of a coalesced multi-line undo/redo would double
        // count the action.
        if scn.flags.contains(ModFlags::MULTILINE_UNDO_REDO)
            && !scn.flags.contains(ModFlags::LAST_STEP_IN_UNDO_REDO)
        {
            return excluded;
        }

        let mut new_index = curr;
        let mut dry_run = false;

        if scn
            .flags
            .intersects(ModFlags::PERFORMED_USER | ModFlags::PERFORMED_REDO)
        {
            if scn.flags.intersects(ModFlags::PERFORMED_EDIT) {
                new_index += 1;
            } else if scn.flags.intersects(ModFlags::PENDING_EDIT) {
                new_index += 1;
                dry_run = true;
            }
        }

        if scn.flags.contains(ModFlags::PERFORMED_UNDO) {
            if scn.flags.intersects(ModFlags::PERFORMED_EDIT) {
                new_index -= 1;
            } else if scn.flags.intersects(ModFlags::PENDING_EDIT) {
                new_index -= 1;
                dry_run = true;
            }
        }

        if !dry_run {
            self.counters.insert(scn.doc, new_index);
        }

        IndexUpdate {
            doc: scn.doc,
            prev_index: curr,
            curr_index: new_index,
            excluded: false,
            dry_run,
        }
    }

    /// A notification is processed only when it originates from the view
    /// that authoritatively shows its document: the main view, the sub
    /// view when it shows a different document than the main view, or a
    /// hidden view whose document is not on display at all.
    fn is_view_duplicate(host: &dyn HostEditor, scn: &Notification) -> bool {
        let main_doc = host.visible_doc(ViewSlot::Main);
        let sub_doc = host.visible_doc(ViewSlot::Sub);
        let doc = Some(scn.doc);

        if scn.view == host.view_handle(ViewSlot::Main) {
            return doc != main_doc;
        }
        if scn.view == host.view_handle(ViewSlot::Sub) {
            return doc != sub_doc || doc == main_doc;
        }
        // Hidden view: authoritative only while its document is not
        // visible in either live view.
        doc == main_doc || doc == sub_doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim_host::SimHost;
    use crate::notification::ViewId;

    fn scn(view: ViewId, doc: DocId, flags: ModFlags) -> Notification {
        Notification {
            view,
            doc,
            flags,
            position: 0,
            length: 1,
            lines_added: 0,
        }
    }

    fn host_with_doc() -> (SimHost, DocId, ViewId) {
        let mut host = SimHost::new();
        let doc = host.open_document("");
        host.show_in_view(ViewSlot::Main, doc);
        let view = host.view_handle(ViewSlot::Main);
        (host, doc, view)
    }

    #[test]
    fn test_unseen_document_defaults_to_zero() {
        let tracker = ActionIndexTracker::new();
        assert_eq!(tracker.current(DocId(42)), 0);
    }

    #[test]
    fn test_user_insert_increments() {
        let (host, doc, view) = host_with_doc();
        let mut tracker = ActionIndexTracker::new();
        let update = tracker.process(
            &host,
            &scn(view, doc, ModFlags::INSERT_TEXT | ModFlags::PERFORMED_USER),
        );
        assert!(!update.excluded && !update.dry_run);
        assert_eq!((update.prev_index, update.curr_index), (0, 1));
        assert_eq!(tracker.current(doc), 1);
    }

    #[test]
    fn test_before_insert_is_dry_run() {
        let (host, doc, view) = host_with_doc();
        let mut tracker = ActionIndexTracker::new();
        let update = tracker.process(
            &host,
            &scn(view, doc, ModFlags::BEFORE_INSERT | ModFlags::PERFORMED_USER),
        );
        assert!(update.dry_run);
        assert_eq!(update.curr_index, 1);
        // Not persisted; the performed notification re-derives it.
        assert_eq!(tracker.current(doc), 0);
    }

    #[test]
    fn test_undo_decrements_and_reports_previous() {
        let (host, doc, view) = host_with_doc();
        let mut tracker = ActionIndexTracker::new();
        tracker.process(
            &host,
            &scn(view, doc, ModFlags::INSERT_TEXT | ModFlags::PERFORMED_USER),
        );
        let update = tracker.process(
            &host,
            &scn(view, doc, ModFlags::DELETE_TEXT | ModFlags::PERFORMED_UNDO),
        );
        assert_eq!((update.prev_index, update.curr_index), (1, 0));
        assert_eq!(tracker.current(doc), 0);
    }

    #[test]
    fn test_round_trip_to_baseline() {
        let (host, doc, view) = host_with_doc();
        let mut tracker = ActionIndexTracker::new();
        for _ in 0..5 {
            tracker.process(
                &host,
                &scn(view, doc, ModFlags::INSERT_TEXT | ModFlags::PERFORMED_USER),
            );
        }
        for _ in 0..5 {
            tracker.process(
                &host,
                &scn(view, doc, ModFlags::DELETE_TEXT | ModFlags::PERFORMED_UNDO),
            );
        }
        assert_eq!(tracker.current(doc), 0);
    }

    #[test]
    fn test_cloned_view_duplicate_excluded() {
        let (mut host, doc, view) = host_with_doc();
        host.show_in_view(ViewSlot::Sub, doc);
        let sub_view = host.view_handle(ViewSlot::Sub);
        let mut tracker = ActionIndexTracker::new();

        let flags = ModFlags::INSERT_TEXT | ModFlags::PERFORMED_USER;
        let first = tracker.process(&host, &scn(view, doc, flags));
        let second = tracker.process(&host, &scn(sub_view, doc, flags));
        assert!(!first.excluded);
        assert!(second.excluded);
        assert_eq!(second.prev_index, 1);
        assert_eq!(tracker.current(doc), 1);
    }

    #[test]
    fn test_sub_view_with_distinct_doc_processed() {
        let (mut host, _main_doc, _) = host_with_doc();
        let other = host.open_document("");
        host.show_in_view(ViewSlot::Sub, other);
        let sub_view = host.view_handle(ViewSlot::Sub);
        let mut tracker = ActionIndexTracker::new();
        let update = tracker.process(
            &host,
            &scn(
                sub_view,
                other,
                ModFlags::INSERT_TEXT | ModFlags::PERFORMED_USER,
            ),
        );
        assert!(!update.excluded);
        assert_eq!(tracker.current(other), 1);
    }

    #[test]
    fn test_hidden_view_processed_only_when_doc_hidden() {
        let (mut host, visible_doc, _) = host_with_doc();
        let hidden_doc = host.open_document("");
        let hidden_view = host.hidden_view(hidden_doc);
        let mut tracker = ActionIndexTracker::new();
        let flags = ModFlags::INSERT_TEXT | ModFlags::PERFORMED_USER;

        let ok = tracker.process(&host, &scn(hidden_view, hidden_doc, flags));
        assert!(!ok.excluded);

        // A hidden view bound to the visible document is a duplicate.
        let dup_view = host.hidden_view(visible_doc);
        let dup = tracker.process(&host, &scn(dup_view, visible_doc, flags));
        assert!(dup.excluded);
    }

    #[test]
    fn test_multiline_undo_non_final_step_excluded() {
        let (host, doc, view) = host_with_doc();
        let mut tracker = ActionIndexTracker::new();
        let update = tracker.process(
            &host,
            &scn(
                view,
                doc,
                ModFlags::DELETE_TEXT | ModFlags::PERFORMED_UNDO | ModFlags::MULTILINE_UNDO_REDO,
            ),
        );
        assert!(update.excluded);

        let final_step = tracker.process(
            &host,
            &scn(
                view,
                doc,
                ModFlags::DELETE_TEXT
                    | ModFlags::PERFORMED_UNDO
                    | ModFlags::MULTILINE_UNDO_REDO
                    | ModFlags::LAST_STEP_IN_UNDO_REDO,
            ),
        );
        assert!(!final_step.excluded);
        assert_eq!(tracker.current(doc), -1);
    }

    #[test]
    fn test_non_edit_notification_ignored() {
        let (host, doc, view) = host_with_doc();
        let mut tracker = ActionIndexTracker::new();
        let update = tracker.process(&host, &scn(view, doc, ModFlags::PERFORMED_USER));
        assert!(update.excluded);
        assert_eq!(tracker.current(doc), 0);
    }
}
