//! Plugin configuration: display preferences persisted to a toml file.
//!
//! Only display state lives here: margin choice, colors, symbols, and
//! the enabled flags. Marker history is never persisted; a freshly
//! tracked document always starts with an empty history.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use toml::Table;
use toml::Value;
use tracing::debug;

use crate::change_mark::{
    ChangeMark, Color, MarginTarget, MarkKind, margin_from_name, margin_name, symbol_from_name,
    symbol_name,
};
use crate::error::ChangeMarkError;

/// Section holding the plugin-wide settings.
pub const MARKERS_SECTION: &str = "markers";

/// String-keyed configuration data, section → attribute → value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    sections: BTreeMap<String, BTreeMap<String, String>>,
    path: Option<PathBuf>,
}

impl Default for PluginConfig {
    /// The configuration generated when no file exists yet.
    fn default() -> Self {
        let mut config = Self {
            sections: BTreeMap::new(),
            path: None,
        };
        config.set(MARKERS_SECTION, "active", "true");
        config.set(MARKERS_SECTION, "track_undo_redo", "true");
        config.set(MARKERS_SECTION, "margin", "MARGIN_BOOKMARK");
        for kind in MarkKind::ALL {
            let mark = ChangeMark::new(kind);
            config.set(kind.name(), "display", "true");
            config.set(kind.name(), "fg_color", &mark.fore.to_hex());
            config.set(kind.name(), "bg_color", &mark.back.to_hex());
            config.set(
                kind.name(),
                "symbol",
                symbol_name(mark.symbol).unwrap_or("MARK_CIRCLE"),
            );
        }
        config
    }
}

impl PluginConfig {
    /// Load from a toml file. A missing file yields the defaults bound to
    /// that path, so a later `store` creates it; an unreadable or
    /// malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, ChangeMarkError> {
        if !path.exists() {
            debug!(path = %path.display(), "config file missing, generating defaults");
            let mut config = Self::default();
            config.path = Some(path.to_path_buf());
            return Ok(config);
        }
        let text = fs::read_to_string(path).map_err(|err| ChangeMarkError::Config {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let table: Table = text.parse().map_err(|err: toml::de::Error| {
            ChangeMarkError::Config {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        })?;

        let mut sections = BTreeMap::new();
        for (name, value) in table {
            let Value::Table(attrs) = value else { continue };
            let section: &mut BTreeMap<String, String> =
                sections.entry(name).or_default();
            for (attr, value) in attrs {
                if let Value::String(s) = value {
                    section.insert(attr, s);
                }
            }
        }
        Ok(Self {
            sections,
            path: Some(path.to_path_buf()),
        })
    }

    /// Write the current values back to the file this config was loaded
    /// from. A config never bound to a path is a silent no-op.
    pub fn store(&self) -> Result<(), ChangeMarkError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut table = Table::new();
        for (name, attrs) in &self.sections {
            let mut section = Table::new();
            for (attr, value) in attrs {
                section.insert(attr.clone(), Value::String(value.clone()));
            }
            table.insert(name.clone(), Value::Table(section));
        }
        fs::write(path, table.to_string()).map_err(|err| ChangeMarkError::Config {
            path: path.clone(),
            message: err.to_string(),
        })
    }

    /// Look up one attribute.
    pub fn get(&self, section: &str, attribute: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|attrs| attrs.get(attribute))
            .map(String::as_str)
    }

    /// Set one attribute, creating the section as needed.
    pub fn set(&mut self, section: &str, attribute: &str, value: &str) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(attribute.to_string(), value.to_string());
    }

    fn get_bool(&self, section: &str, attribute: &str, default: bool) -> bool {
        self.get(section, attribute)
            .map(|v| v == "true")
            .unwrap_or(default)
    }

    /// Plugin-wide active flag.
    pub fn active(&self) -> bool {
        self.get_bool(MARKERS_SECTION, "active", true)
    }

    /// Whether undo/redo tracking is on at all.
    pub fn track_undo_redo(&self) -> bool {
        self.get_bool(MARKERS_SECTION, "track_undo_redo", true)
    }

    /// Build the display side of a change mark from this configuration,
    /// falling back to the built-in defaults attribute by attribute.
    pub fn change_mark(&self, kind: MarkKind) -> ChangeMark {
        let mut mark = ChangeMark::new(kind);
        let section = kind.name();
        if let Some(hex) = self.get(section, "fg_color") {
            if let Some(color) = Color::from_hex(hex) {
                mark.fore = color;
            } else {
                debug!(section, value = hex, "unparseable fg_color, keeping default");
            }
        }
        if let Some(hex) = self.get(section, "bg_color") {
            if let Some(color) = Color::from_hex(hex) {
                mark.back = color;
            } else {
                debug!(section, value = hex, "unparseable bg_color, keeping default");
            }
        }
        if let Some(name) = self.get(section, "symbol") {
            mark.symbol = symbol_from_name(name);
        }
        mark.display = self.get_bool(section, "display", true);
        let margin = self
            .get(MARKERS_SECTION, "margin")
            .map(margin_from_name)
            .unwrap_or(MarginTarget::Bookmark);
        mark.margin.set_target(margin);
        mark
    }

    /// Record a margin choice for both marker classes.
    pub fn set_margin(&mut self, target: MarginTarget) {
        self.set(MARKERS_SECTION, "margin", margin_name(target));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_mark::MarginTarget;

    #[test]
    fn test_defaults() {
        let config = PluginConfig::default();
        assert!(config.active());
        assert!(config.track_undo_redo());
        assert_eq!(config.get("not_saved", "bg_color"), Some("FF8000"));
        let mark = config.change_mark(MarkKind::NotSaved);
        assert_eq!(mark.margin.target(), Some(MarginTarget::Bookmark));
        assert!(mark.display);
    }

    #[test]
    fn test_missing_file_generates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("changemark.toml");
        let config = PluginConfig::load(&path).unwrap();
        assert_eq!(config.sections, PluginConfig::default().sections);
        // Write-back creates the file.
        config.store().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("changemark.toml");
        let mut config = PluginConfig::load(&path).unwrap();
        config.set("not_saved", "bg_color", "112233");
        config.set_margin(MarginTarget::Plugin);
        config.store().unwrap();

        let reloaded = PluginConfig::load(&path).unwrap();
        assert_eq!(reloaded.get("not_saved", "bg_color"), Some("112233"));
        let mark = reloaded.change_mark(MarkKind::NotSaved);
        assert_eq!(mark.back, Color::new(0x11, 0x22, 0x33));
        assert_eq!(mark.margin.target(), Some(MarginTarget::Plugin));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "not [valid toml").unwrap();
        assert!(PluginConfig::load(&path).is_err());
    }

    #[test]
    fn test_bad_color_falls_back() {
        let mut config = PluginConfig::default();
        config.set("not_saved", "bg_color", "garbage");
        let mark = config.change_mark(MarkKind::NotSaved);
        assert_eq!(mark.back, ChangeMark::new(MarkKind::NotSaved).back);
    }
}
