//! Change-mark definitions, margin control, and marker negotiation.
//!
//! The plugin owns two marker classes: lines changed since the last save
//! and lines whose changes have been saved. Each class carries its own
//! display configuration and the marker number handed out by the host
//! during negotiation at plugin init.
//!
//! Host marker allotment: the upper marker numbers are reserved for the
//! host's own use; `MAX_PLUGIN_MARKERS` numbers counting from zero are
//! shared between all loaded plugins, which is why free numbers have to
//! be negotiated rather than assumed.

use phf::{Map, phf_map};

use crate::error::ChangeMarkError;
use crate::host::{HostEditor, ViewSlot};

/// Marker numbers plugins may negotiate for.
pub const MAX_PLUGIN_MARKERS: u32 = 16;

/// How many times a failed negotiation exchange may be retried before the
/// feature is disabled.
pub const MAX_NEGOTIATION_ATTEMPTS: u32 = 3;

/// The two marker classes this plugin tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkKind {
    Saved,
    NotSaved,
}

impl MarkKind {
    pub const COUNT: usize = 2;
    pub const ALL: [MarkKind; MarkKind::COUNT] = [MarkKind::Saved, MarkKind::NotSaved];

    /// Configuration section and style-name identity of the class.
    pub fn name(self) -> &'static str {
        match self {
            MarkKind::Saved => "saved",
            MarkKind::NotSaved => "not_saved",
        }
    }

    pub fn style_name(self) -> &'static str {
        match self {
            MarkKind::Saved => "Changes: Saved",
            MarkKind::NotSaved => "Changes: Not Saved",
        }
    }
}

/// An RGB color as stored in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse an `RRGGBB` hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.trim().trim_start_matches("0x");
        if s.len() != 6 {
            return None;
        }
        let value = u32::from_str_radix(s, 16).ok()?;
        Some(Self {
            r: (value >> 16) as u8,
            g: (value >> 8) as u8,
            b: value as u8,
        })
    }

    pub fn to_hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Margins the host exposes on the left edge of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginTarget {
    None,
    LineNumber,
    Bookmark,
    Fold,
    Reserved,
    Plugin,
}

/// Symbol names accepted in configuration, with their host numbers.
static SYMBOL_BY_NAME: Map<&'static str, u32> = phf_map! {
    "MARK_CIRCLE" => 0,
    "MARK_ROUNDRECT" => 1,
    "MARK_ARROW" => 2,
    "MARK_SMALLRECT" => 3,
    "MARK_SHORTARROW" => 4,
    "MARK_EMPTY" => 5,
    "MARK_ARROWDOWN" => 6,
    "MARK_MINUS" => 7,
    "MARK_PLUS" => 8,
    "MARK_VLINE" => 9,
    "MARK_LCORNER" => 10,
    "MARK_TCORNER" => 11,
    "MARK_BOXPLUS" => 12,
    "MARK_BOXPLUSCONNECTED" => 13,
    "MARK_BOXMINUS" => 14,
    "MARK_BOXMINUSCONNECTED" => 15,
    "MARK_LCORNERCURVE" => 16,
    "MARK_TCORNERCURVE" => 17,
    "MARK_CIRCLEPLUS" => 18,
    "MARK_CIRCLEPLUSCONNECTED" => 19,
    "MARK_CIRCLEMINUS" => 20,
    "MARK_CIRCLEMINUSCONNECTED" => 21,
    "MARK_BACKGROUND" => 22,
    "MARK_DOTDOTDOT" => 23,
    "MARK_ARROWS" => 24,
    "MARK_FULLRECT" => 26,
    "MARK_LEFTRECT" => 27,
};

static MARGIN_BY_NAME: Map<&'static str, MarginTarget> = phf_map! {
    "MARGIN_NONE" => MarginTarget::None,
    "MARGIN_LINENUMBER" => MarginTarget::LineNumber,
    "MARGIN_BOOKMARK" => MarginTarget::Bookmark,
    "MARGIN_FOLD" => MarginTarget::Fold,
    "MARGIN_RESERVED" => MarginTarget::Reserved,
    "MARGIN_PLUGIN" => MarginTarget::Plugin,
};

/// Symbol name → host number. Unknown names fall back to the filled
/// circle, the same default the host applies.
pub fn symbol_from_name(name: &str) -> u32 {
    SYMBOL_BY_NAME.get(name).copied().unwrap_or(0)
}

pub fn symbol_name(symbol: u32) -> Option<&'static str> {
    SYMBOL_BY_NAME
        .entries()
        .find(|&(_, &value)| value == symbol)
        .map(|(&name, _)| name)
}

/// Margin name → target. Unknown names fall back to the bookmark margin.
pub fn margin_from_name(name: &str) -> MarginTarget {
    MARGIN_BY_NAME
        .get(name)
        .copied()
        .unwrap_or(MarginTarget::Bookmark)
}

pub fn margin_name(target: MarginTarget) -> &'static str {
    match target {
        MarginTarget::None => "MARGIN_NONE",
        MarginTarget::LineNumber => "MARGIN_LINENUMBER",
        MarginTarget::Bookmark => "MARGIN_BOOKMARK",
        MarginTarget::Fold => "MARGIN_FOLD",
        MarginTarget::Reserved => "MARGIN_RESERVED",
        MarginTarget::Plugin => "MARGIN_PLUGIN",
    }
}

/// Alpha blend derived from the background color's luminance, used when
/// the configuration does not pin one.
pub fn derived_alpha(back: Color) -> u8 {
    let max = back.r.max(back.g).max(back.b) as u32;
    let min = back.r.min(back.g).min(back.b) as u32;
    (255 - (((max + min) * 240 + 255) / 510)) as u8
}

/// Width and mask state for the margin a marker class displays in, with
/// enough memory to hand back what this plugin changed even if a third
/// party resized the margin in between.
#[derive(Debug, Clone, Default)]
pub struct Margin {
    target: Option<MarginTarget>,
    width_orig: i32,
    width_set: i32,
}

impl Margin {
    /// Choose the margin markers display in. The fold and reserved
    /// margins are never valid targets and are ignored.
    pub fn set_target(&mut self, target: MarginTarget) {
        if !matches!(target, MarginTarget::Fold | MarginTarget::Reserved) {
            self.target = Some(target);
        }
    }

    pub fn target(&self) -> Option<MarginTarget> {
        self.target
    }

    /// Widen the margin in one view by `delta` pixels. Returns false if
    /// the current target cannot carry symbols.
    pub fn adjust_width(&mut self, host: &mut dyn HostEditor, slot: ViewSlot, delta: i32) -> bool {
        let target = match self.target {
            Some(MarginTarget::None) | Some(MarginTarget::LineNumber) | None => return false,
            Some(t) => t,
        };
        self.width_orig = host.margin_width(slot, target);
        self.width_set = self.width_orig + delta;
        host.set_margin_width(slot, target, self.width_set);
        true
    }

    /// Hand back the width this plugin added. Someone else may have
    /// resized the margin since; in that case only our delta is removed
    /// from whatever width is current.
    pub fn restore_width(&mut self, host: &mut dyn HostEditor, slot: ViewSlot) {
        let target = match self.target {
            Some(MarginTarget::None) | Some(MarginTarget::LineNumber) | None => return,
            Some(t) => t,
        };
        let current = host.margin_width(slot, target);
        if current != self.width_orig || current < self.width_set {
            let width = (current - self.width_set) + self.width_orig;
            host.set_margin_width(slot, target, width);
        }
    }

    /// Add a marker number to the margin's display mask.
    pub fn show_marker(&mut self, host: &mut dyn HostEditor, slot: ViewSlot, marker: u32) {
        let Some(target) = self.target else { return };
        if matches!(target, MarginTarget::None) {
            return;
        }
        let mask = host.margin_mask(slot, target);
        host.set_margin_mask(slot, target, mask | (1 << marker));
    }

    /// Remove a marker number from the margin's display mask. With no
    /// margin displaying it, the host renders the marker as a full-line
    /// highlight instead.
    pub fn hide_marker(&mut self, host: &mut dyn HostEditor, slot: ViewSlot, marker: u32) {
        let Some(target) = self.target else { return };
        if matches!(target, MarginTarget::None) {
            return;
        }
        let mask = host.margin_mask(slot, target);
        host.set_margin_mask(slot, target, mask & !(1 << marker));
    }
}

/// Display definition and negotiated identity of one marker class.
#[derive(Debug, Clone)]
pub struct ChangeMark {
    pub kind: MarkKind,
    /// Marker number assigned during negotiation; `None` until then.
    pub number: Option<u32>,
    pub symbol: u32,
    pub fore: Color,
    pub back: Color,
    /// Pinned alpha, or derived from `back` when absent.
    pub alpha: Option<u8>,
    pub display: bool,
    pub margin: Margin,
}

impl ChangeMark {
    pub fn new(kind: MarkKind) -> Self {
        let back = match kind {
            MarkKind::Saved => Color::new(0x00, 0x80, 0x00),
            MarkKind::NotSaved => Color::new(0xFF, 0x80, 0x00),
        };
        Self {
            kind,
            number: None,
            symbol: symbol_from_name("MARK_LEFTRECT"),
            fore: Color::new(0x00, 0x00, 0x00),
            back,
            alpha: None,
            display: true,
            margin: Margin::default(),
        }
    }

    pub fn effective_alpha(&self) -> u8 {
        self.alpha.unwrap_or_else(|| derived_alpha(self.back))
    }

    /// Register this mark's symbol, colors, and margin mask with both
    /// host views. Requires a negotiated number.
    pub fn define_in_host(&mut self, host: &mut dyn HostEditor) {
        let Some(number) = self.number else { return };
        let alpha = self.effective_alpha();
        for slot in ViewSlot::BOTH {
            host.define_marker(slot, number, self.symbol, self.fore, self.back, alpha);
            if self.display {
                self.margin.show_marker(host, slot, number);
            }
        }
    }
}

/// Negotiate `needed` free marker numbers with the host.
///
/// Probes each candidate number in both views; a number is taken only
/// when both views report it free. When the negotiation partner never
/// replies at all, the user is asked whether to retry, a bounded number
/// of times. Exhausting the retries is a recoverable failure: the
/// caller disables marker tracking and the host stays up.
pub fn negotiate_markers(
    host: &mut dyn HostEditor,
    needed: usize,
) -> Result<Vec<u32>, ChangeMarkError> {
    for attempt in 1..=MAX_NEGOTIATION_ATTEMPTS {
        let mut found = Vec::with_capacity(needed);
        let mut any_reply = false;

        for marker in 0..MAX_PLUGIN_MARKERS {
            let main = host.probe_marker_number(ViewSlot::Main, marker);
            let sub = host.probe_marker_number(ViewSlot::Sub, marker);
            if let (Some(main_free), Some(sub_free)) = (main, sub) {
                any_reply = true;
                if main_free && sub_free {
                    found.push(marker);
                    if found.len() == needed {
                        return Ok(found);
                    }
                }
            }
        }

        if any_reply {
            // The partner answered; there simply are not enough numbers.
            return Err(ChangeMarkError::MarkersExhausted {
                needed,
                found: found.len(),
            });
        }

        let retry = host.prompt_retry(
            "A communication error occurred while negotiating marker \
             symbols with the host. This can happen when plugins load in \
             the wrong order or a plugin file is missing. Try again?",
        );
        if !retry {
            return Err(ChangeMarkError::MarkerNegotiation { attempts: attempt });
        }
    }

    Err(ChangeMarkError::MarkerNegotiation {
        attempts: MAX_NEGOTIATION_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_hex_round_trip() {
        let color = Color::from_hex("FF8000").unwrap();
        assert_eq!(color, Color::new(0xFF, 0x80, 0x00));
        assert_eq!(color.to_hex(), "FF8000");
        assert_eq!(Color::from_hex("0x0080FF"), Some(Color::new(0, 0x80, 0xFF)));
        assert_eq!(Color::from_hex("nope"), None);
    }

    #[test]
    fn test_symbol_lookup_defaults_to_circle() {
        assert_eq!(symbol_from_name("MARK_LEFTRECT"), 27);
        assert_eq!(symbol_from_name("MARK_BOGUS"), 0);
        assert_eq!(symbol_name(27), Some("MARK_LEFTRECT"));
    }

    #[test]
    fn test_margin_lookup_defaults_to_bookmark() {
        assert_eq!(margin_from_name("MARGIN_PLUGIN"), MarginTarget::Plugin);
        assert_eq!(margin_from_name("whatever"), MarginTarget::Bookmark);
    }

    #[test]
    fn test_derived_alpha_tracks_luminance() {
        // Black background: fully opaque end of the scale.
        assert_eq!(derived_alpha(Color::new(0, 0, 0)), 255);
        // White background: mostly transparent.
        assert!(derived_alpha(Color::new(255, 255, 255)) < 20);
    }

    #[test]
    fn test_margin_rejects_fold_target() {
        let mut margin = Margin::default();
        margin.set_target(MarginTarget::Fold);
        assert_eq!(margin.target(), None);
        margin.set_target(MarginTarget::Bookmark);
        assert_eq!(margin.target(), Some(MarginTarget::Bookmark));
        margin.set_target(MarginTarget::Reserved);
        assert_eq!(margin.target(), Some(MarginTarget::Bookmark));
    }
}
