//! Host editor abstraction layer.
//!
//! Provides a `HostEditor` trait for everything the plugin asks of the
//! hosting editor: marker placement, margin control, view/document
//! queries, and the user-facing prompts used during marker negotiation.
//! The crate ships one implementation, [`SimHost`](crate::SimHost), which
//! simulates a Scintilla-style host for the replay driver and the tests.
//!
//! Every method on this trait corresponds to information the plugin can
//! only obtain from the host. A production binding must answer these from
//! the host's public messaging surface; none of them may be served by
//! peeking at host-internal object layout.

use crate::change_mark::{Color, MarginTarget};
use crate::notification::{DocId, ViewId};

/// The two live view slots of the host editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewSlot {
    Main,
    Sub,
}

impl ViewSlot {
    pub const BOTH: [ViewSlot; 2] = [ViewSlot::Main, ViewSlot::Sub];
}

/// A marker handle as issued by the host. Host handles are only ever
/// wrapped into [`Handle::Assigned`](crate::Handle) by this crate.
pub type HostHandle = i64;

/// Abstraction over the hosting editor.
pub trait HostEditor {
    /// Window handle of a live view slot.
    fn view_handle(&self, slot: ViewSlot) -> ViewId;

    /// Document currently shown in a live view slot, if any.
    fn visible_doc(&self, slot: ViewSlot) -> Option<DocId>;

    /// Document a given view (live or hidden) is bound to.
    fn document_of_view(&self, view: ViewId) -> Option<DocId>;

    /// Line containing a byte position.
    fn line_from_position(&self, doc: DocId, position: usize) -> i64;

    /// Byte position of the start of a line.
    fn position_of_line(&self, doc: DocId, line: i64) -> usize;

    /// Number of lines in the document.
    fn line_count(&self, doc: DocId) -> i64;

    /// Line the caret is on.
    fn caret_line(&self, doc: DocId) -> i64;

    /// Move the caret to the start of a line and scroll it into view.
    fn goto_line(&mut self, doc: DocId, line: i64);

    /// Place a marker on a line. Returns the handle the host assigned, or
    /// `None` if the marker number is not defined.
    fn add_marker(&mut self, doc: DocId, line: i64, marker: u32) -> Option<HostHandle>;

    /// Delete a marker by handle. Unknown handles are ignored by the host.
    fn delete_marker(&mut self, doc: DocId, handle: HostHandle);

    /// Delete every marker of one number from the whole document.
    fn delete_all_markers(&mut self, doc: DocId, marker: u32);

    /// Line a marker handle currently sits on, or `None` if the handle is
    /// no longer known to the host.
    fn marker_line(&self, doc: DocId, handle: HostHandle) -> Option<i64>;

    /// Bitmask of marker numbers present on a line.
    fn marker_mask_on_line(&self, doc: DocId, line: i64) -> u32;

    /// Define the symbol and colors for a marker number in one view.
    fn define_marker(
        &mut self,
        slot: ViewSlot,
        marker: u32,
        symbol: u32,
        fore: Color,
        back: Color,
        alpha: u8,
    );

    /// Current width of a margin in one view.
    fn margin_width(&self, slot: ViewSlot, margin: MarginTarget) -> i32;

    /// Set the width of a margin in one view.
    fn set_margin_width(&mut self, slot: ViewSlot, margin: MarginTarget, width: i32);

    /// Current marker mask of a margin in one view.
    fn margin_mask(&self, slot: ViewSlot, margin: MarginTarget) -> u32;

    /// Set the marker mask of a margin in one view.
    fn set_margin_mask(&mut self, slot: ViewSlot, margin: MarginTarget, mask: u32);

    /// Ask whether a marker number is free for plugin use in one view.
    /// `None` means the negotiation partner never replied.
    fn probe_marker_number(&self, slot: ViewSlot, marker: u32) -> Option<bool>;

    /// Ask the user whether to retry a failed host exchange.
    fn prompt_retry(&mut self, message: &str) -> bool;

    /// Show the user a non-blocking notification.
    fn notify_user(&mut self, title: &str, message: &str);
}
