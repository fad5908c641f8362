//! Modification notifications delivered by the host editor.
//!
//! The host forwards a notification for every change made to a document,
//! including the "before" variants sent ahead of the actual text change and
//! the replayed changes performed by its own undo/redo machinery.

use bitflags::bitflags;

/// Opaque identity of a host document.
///
/// Stands in for the document pointer the host reports; two views showing
/// the same buffer share one `DocId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(pub u64);

/// Opaque identity of a host view (window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(pub u64);

bitflags! {
    /// Modification-type bitmask, matching the host's wire values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModFlags: u32 {
        /// Text has been inserted into the document.
        const INSERT_TEXT = 0x1;
        /// Text has been deleted from the document.
        const DELETE_TEXT = 0x2;
        /// Modification performed directly by the user.
        const PERFORMED_USER = 0x10;
        /// Modification is a step in an undo being replayed.
        const PERFORMED_UNDO = 0x20;
        /// Modification is a step in a redo being replayed.
        const PERFORMED_REDO = 0x40;
        /// One step of a multi-step undo or redo.
        const MULTI_STEP_UNDO_REDO = 0x80;
        /// Final step of a multi-step undo or redo.
        const LAST_STEP_IN_UNDO_REDO = 0x100;
        /// Sent before text is inserted, while the document is unchanged.
        const BEFORE_INSERT = 0x400;
        /// Sent before text is deleted, while the document is unchanged.
        const BEFORE_DELETE = 0x800;
        /// The undo/redo step spans more than one line.
        const MULTILINE_UNDO_REDO = 0x1000;
    }
}

impl ModFlags {
    /// Flags naming a performed text change.
    pub const PERFORMED_EDIT: ModFlags = ModFlags::INSERT_TEXT.union(ModFlags::DELETE_TEXT);

    /// Flags naming an announced (not yet applied) text change.
    pub const PENDING_EDIT: ModFlags = ModFlags::BEFORE_INSERT.union(ModFlags::BEFORE_DELETE);

    /// True if the notification concerns a text change at all.
    pub fn is_edit(self) -> bool {
        self.intersects(Self::PERFORMED_EDIT | Self::PENDING_EDIT)
    }
}

/// A single modification notification from the host.
#[derive(Debug, Clone)]
pub struct Notification {
    /// View the notification originated from.
    pub view: ViewId,
    /// Document the view is bound to.
    pub doc: DocId,
    /// What kind of modification this is.
    pub flags: ModFlags,
    /// Byte position of the change.
    pub position: usize,
    /// Length in bytes of the inserted or deleted text.
    pub length: usize,
    /// Lines added by the change; negative for deletions. Zero on
    /// "before" notifications, where the change has not happened yet.
    pub lines_added: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_edit() {
        assert!(ModFlags::INSERT_TEXT.union(ModFlags::PERFORMED_USER).is_edit());
        assert!(ModFlags::BEFORE_DELETE.union(ModFlags::PERFORMED_UNDO).is_edit());
        assert!(!ModFlags::PERFORMED_USER.is_edit());
        assert!(!ModFlags::empty().is_edit());
    }
}
