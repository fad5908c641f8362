//! Per-document mapping from line numbers to the change markers on them.
//!
//! Lines are renumbered in place when the document gains or loses lines,
//! so the map always speaks the host's current line coordinates.

use std::collections::BTreeMap;

use crate::change_mark::MarkKind;
use crate::host::HostHandle;

/// A marker handle tracked by the plugin.
///
/// `Assigned` wraps a live handle issued by the host. `Pending` wraps a
/// placeholder issued while the marker is absent from the host (deleted
/// by an undo, or reserved ahead of a multi-line delete), so history
/// entries can keep referring to it until a replay assigns a real handle
/// again. Placeholders are allocated from a per-document descending
/// counter and never collide with host handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Handle {
    Pending(i64),
    Assigned(HostHandle),
}

impl Handle {
    /// The wrapped host handle, if the marker is live.
    pub fn assigned(self) -> Option<HostHandle> {
        match self {
            Handle::Assigned(h) => Some(h),
            Handle::Pending(_) => None,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Handle::Pending(_))
    }
}

/// Markers present on a single line, at most one per marker class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMarks {
    slots: [Option<Handle>; MarkKind::COUNT],
}

impl LineMarks {
    fn get(&self, mark: MarkKind) -> Option<Handle> {
        self.slots[mark as usize]
    }

    fn set(&mut self, mark: MarkKind, handle: Handle) {
        self.slots[mark as usize] = Some(handle);
    }

    fn clear(&mut self, mark: MarkKind) {
        self.slots[mark as usize] = None;
    }

    fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Marker classes present on this line.
    pub fn present(&self) -> impl Iterator<Item = (MarkKind, Handle)> + '_ {
        MarkKind::ALL
            .iter()
            .filter_map(|&mark| self.get(mark).map(|h| (mark, h)))
    }
}

/// Line number → markers map for one document.
#[derive(Debug, Default)]
pub struct LineMap {
    lines: BTreeMap<i64, LineMarks>,
    max_handle: Option<HostHandle>,
}

impl LineMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renumber for `count` lines inserted at `start`: every line at or
    /// above `start` moves down. Lines below are untouched.
    pub fn insert_lines(&mut self, start: i64, count: i64) {
        if count <= 0 {
            return;
        }
        let moved = self.lines.split_off(&start);
        for (line, marks) in moved {
            self.lines.insert(line + count, marks);
        }
    }

    /// Renumber for `count` lines deleted at `start`: lines in
    /// `start..start+count` are dropped, lines at or above `start+count`
    /// move up.
    pub fn delete_lines(&mut self, start: i64, count: i64) {
        if count <= 0 {
            return;
        }
        let moved = self.lines.split_off(&start);
        for (line, marks) in moved {
            if line >= start + count {
                self.lines.insert(line - count, marks);
            }
        }
    }

    /// Record a handle on a line, replacing any previous handle of the
    /// same class.
    pub fn add_handle(&mut self, line: i64, mark: MarkKind, handle: Handle) {
        self.lines.entry(line).or_default().set(mark, handle);
        if let Handle::Assigned(h) = handle
            && self.max_handle.is_none_or(|m| h > m)
        {
            self.max_handle = Some(h);
        }
    }

    /// Remove a handle from a line. A mismatched or absent handle is left
    /// alone.
    pub fn delete_handle(&mut self, line: i64, mark: MarkKind, handle: Handle) {
        if let Some(marks) = self.lines.get_mut(&line) {
            if marks.get(mark) == Some(handle) {
                marks.clear(mark);
            }
            if marks.is_empty() {
                self.lines.remove(&line);
            }
        }
    }

    /// Swap one handle for another in place. Returns false if `old` is
    /// not the handle recorded on that line.
    pub fn modify_handle(&mut self, line: i64, mark: MarkKind, old: Handle, new: Handle) -> bool {
        match self.lines.get_mut(&line) {
            Some(marks) if marks.get(mark) == Some(old) => {
                marks.set(mark, new);
                if let Handle::Assigned(h) = new
                    && self.max_handle.is_none_or(|m| h > m)
                {
                    self.max_handle = Some(h);
                }
                true
            }
            _ => false,
        }
    }

    /// Handle of the given class on a line, if any.
    pub fn handle_on_line(&self, line: i64, mark: MarkKind) -> Option<Handle> {
        self.lines.get(&line).and_then(|marks| marks.get(mark))
    }

    /// Line a handle currently sits on. Linear scan, bounded by the number
    /// of marked lines; `None` if the marker was removed or never tracked.
    pub fn line_of_handle(&self, mark: MarkKind, handle: Handle) -> Option<i64> {
        self.lines
            .iter()
            .find(|(_, marks)| marks.get(mark) == Some(handle))
            .map(|(&line, _)| line)
    }

    /// Largest host handle ever recorded. Seeds "most recent change"
    /// comparisons for change-jump navigation.
    pub fn max_handle(&self) -> Option<HostHandle> {
        self.max_handle
    }

    /// All marked lines in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &LineMarks)> {
        self.lines.iter().map(|(&line, marks)| (line, marks))
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Snapshot of the full line → handles content, for equality checks.
    pub fn snapshot(&self) -> BTreeMap<i64, LineMarks> {
        self.lines.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: MarkKind = MarkKind::NotSaved;
    const SV: MarkKind = MarkKind::Saved;

    #[test]
    fn test_add_and_lookup() {
        let mut map = LineMap::new();
        map.add_handle(5, NS, Handle::Assigned(10));
        assert_eq!(map.handle_on_line(5, NS), Some(Handle::Assigned(10)));
        assert_eq!(map.handle_on_line(5, SV), None);
        assert_eq!(map.line_of_handle(NS, Handle::Assigned(10)), Some(5));
        assert_eq!(map.line_of_handle(NS, Handle::Assigned(11)), None);
        assert_eq!(map.max_handle(), Some(10));
    }

    #[test]
    fn test_insert_lines_renumbers_at_and_above() {
        let mut map = LineMap::new();
        map.add_handle(2, NS, Handle::Assigned(1));
        map.add_handle(5, NS, Handle::Assigned(2));
        map.insert_lines(3, 2);
        assert_eq!(map.line_of_handle(NS, Handle::Assigned(1)), Some(2));
        assert_eq!(map.line_of_handle(NS, Handle::Assigned(2)), Some(7));
    }

    #[test]
    fn test_delete_lines_drops_range_and_renumbers() {
        let mut map = LineMap::new();
        map.add_handle(2, NS, Handle::Assigned(1));
        map.add_handle(3, NS, Handle::Assigned(2));
        map.add_handle(6, SV, Handle::Assigned(3));
        map.delete_lines(2, 3);
        assert_eq!(map.line_of_handle(NS, Handle::Assigned(1)), None);
        assert_eq!(map.line_of_handle(NS, Handle::Assigned(2)), None);
        assert_eq!(map.line_of_handle(SV, Handle::Assigned(3)), Some(3));
    }

    #[test]
    fn test_insert_then_delete_is_identity_outside_range() {
        let mut map = LineMap::new();
        map.add_handle(1, NS, Handle::Assigned(1));
        map.add_handle(9, NS, Handle::Assigned(2));
        let before = map.snapshot();
        map.insert_lines(4, 3);
        map.delete_lines(4, 3);
        assert_eq!(map.snapshot(), before);
    }

    #[test]
    fn test_modify_handle() {
        let mut map = LineMap::new();
        map.add_handle(4, NS, Handle::Assigned(7));
        assert!(map.modify_handle(4, NS, Handle::Assigned(7), Handle::Pending(-1)));
        assert_eq!(map.handle_on_line(4, NS), Some(Handle::Pending(-1)));
        // Mismatched old handle leaves the entry alone.
        assert!(!map.modify_handle(4, NS, Handle::Assigned(7), Handle::Assigned(9)));
        assert_eq!(map.handle_on_line(4, NS), Some(Handle::Pending(-1)));
    }

    #[test]
    fn test_two_classes_share_a_line() {
        let mut map = LineMap::new();
        map.add_handle(3, SV, Handle::Assigned(1));
        map.add_handle(3, NS, Handle::Assigned(2));
        assert_eq!(map.handle_on_line(3, SV), Some(Handle::Assigned(1)));
        assert_eq!(map.handle_on_line(3, NS), Some(Handle::Assigned(2)));
        map.delete_handle(3, NS, Handle::Assigned(2));
        assert_eq!(map.handle_on_line(3, SV), Some(Handle::Assigned(1)));
        assert_eq!(map.handle_on_line(3, NS), None);
    }

    #[test]
    fn test_delete_handle_removes_empty_line() {
        let mut map = LineMap::new();
        map.add_handle(3, NS, Handle::Assigned(1));
        map.delete_handle(3, NS, Handle::Assigned(1));
        assert!(map.is_empty());
    }
}
