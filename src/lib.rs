//! Change-marker tracking for Scintilla-style editor plugins.
//!
//! Tracks, per open document, which lines changed since the file was
//! loaded and since it was last saved, keeping the host editor's margin
//! markers correct through arbitrary edits, undos, redos, multi-line
//! deletes, and saves, without ever reading the host's internal undo
//! stack.
//!
//! # Example
//!
//! ```rust
//! use changemark::{ChangeTracker, MarkKind, PluginConfig, SimHost, ViewSlot, replay};
//!
//! let mut host = SimHost::new();
//! let doc = host.open_document("one\ntwo\nthree\n");
//! host.show_in_view(ViewSlot::Main, doc);
//!
//! let mut tracker = ChangeTracker::new(&PluginConfig::default());
//! tracker.init_markers(&mut host).unwrap();
//!
//! // Edit line 1, then take it back.
//! replay::user_insert(&mut host, &mut tracker, doc, 4, "!");
//! let unsaved = tracker.mark(MarkKind::NotSaved).number.unwrap();
//! assert_eq!(host.marker_lines(doc, unsaved), vec![1]);
//!
//! replay::undo(&mut host, &mut tracker, doc);
//! assert!(host.marker_lines(doc, unsaved).is_empty());
//! ```

mod action_history;
mod action_index;
mod change_mark;
mod config;
mod error;
mod host;
mod line_map;
mod notification;
pub mod replay;
mod sim_host;
mod tracker;

pub use action_history::{ActionHistory, ActionKind, EntryKey, HistoryEntry};
pub use action_index::{ActionIndexTracker, IndexUpdate};
pub use change_mark::{
    ChangeMark, Color, Margin, MarginTarget, MarkKind, margin_from_name, margin_name,
    negotiate_markers, symbol_from_name, symbol_name,
};
pub use config::PluginConfig;
pub use error::ChangeMarkError;
pub use host::{HostEditor, HostHandle, ViewSlot};
pub use line_map::{Handle, LineMap, LineMarks};
pub use notification::{DocId, ModFlags, Notification, ViewId};
pub use replay::Session;
pub use sim_host::SimHost;
pub use tracker::{ChangeTracker, ChangedDocument, Command, InconsistencyCounters};
