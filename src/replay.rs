//! Edit-script replay against the simulated host.
//!
//! Scripts drive the full notification pipeline the way the host would:
//! every edit goes through the before/performed notification pair, undo
//! and redo replay the host's own stacks, and cloned views deliver their
//! duplicate notifications. Used by the driver binary and the tests.

use std::collections::HashMap;

use anyhow::{Result, bail};

use crate::change_mark::MarkKind;
use crate::config::PluginConfig;
use crate::host::{HostEditor, ViewSlot};
use crate::notification::{DocId, Notification};
use crate::sim_host::SimHost;
use crate::tracker::{ChangeTracker, Command};

/// Run one staged edit's notification batches through the tracker.
fn feed(host: &mut SimHost, tracker: &mut ChangeTracker, batch: Vec<Notification>) {
    for scn in batch {
        tracker.on_modification(host, &scn);
    }
}

/// A user insertion at a byte position.
pub fn user_insert(
    host: &mut SimHost,
    tracker: &mut ChangeTracker,
    doc: DocId,
    position: usize,
    text: &str,
) {
    let before = host.stage_insert(doc, position, text);
    feed(host, tracker, before);
    let after = host.commit(doc);
    feed(host, tracker, after);
}

/// A user deletion of a byte span.
pub fn user_delete(
    host: &mut SimHost,
    tracker: &mut ChangeTracker,
    doc: DocId,
    position: usize,
    length: usize,
) {
    let before = host.stage_delete(doc, position, length);
    feed(host, tracker, before);
    let after = host.commit(doc);
    feed(host, tracker, after);
}

/// One host undo step. False if the undo stack is empty.
pub fn undo(host: &mut SimHost, tracker: &mut ChangeTracker, doc: DocId) -> bool {
    let Some(before) = host.stage_undo(doc) else {
        return false;
    };
    feed(host, tracker, before);
    let after = host.commit(doc);
    feed(host, tracker, after);
    true
}

/// One host redo step. False if the redo stack is empty.
pub fn redo(host: &mut SimHost, tracker: &mut ChangeTracker, doc: DocId) -> bool {
    let Some(before) = host.stage_redo(doc) else {
        return false;
    };
    feed(host, tracker, before);
    let after = host.commit(doc);
    feed(host, tracker, after);
    true
}

/// An interactive replay session: one simulated host, one tracker, and
/// the documents the script has opened by name.
pub struct Session {
    pub host: SimHost,
    pub tracker: ChangeTracker,
    docs: HashMap<String, DocId>,
    current: Option<DocId>,
}

impl Session {
    pub fn new(config: &PluginConfig) -> Result<Self> {
        let mut host = SimHost::new();
        let mut tracker = ChangeTracker::new(config);
        tracker.init_markers(&mut host)?;
        Ok(Self {
            host,
            tracker,
            docs: HashMap::new(),
            current: None,
        })
    }

    /// Run a whole script, collecting the output lines.
    pub fn run_script(&mut self, script: &str) -> Result<Vec<String>> {
        let mut output = Vec::new();
        for (number, line) in script.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(out) = self
                .run_line(line)
                .map_err(|err| err.context(format!("script line {}", number + 1)))?
            {
                output.push(out);
            }
        }
        Ok(output)
    }

    /// Execute a single script command. Commands:
    ///
    /// ```text
    /// open NAME "TEXT"        create a document and show it in the main view
    /// clone                   show the current document in the sub view too
    /// insert LINE:COL "TEXT"  insert text (\n escapes accepted)
    /// delete LINE:COL LINE:COL  delete the span between two positions
    /// undo / redo             replay one host undo or redo step
    /// save                    save the current document
    /// jump next|prev|up|down  run the corresponding jump command
    /// state                   report marker state
    /// ```
    pub fn run_line(&mut self, line: &str) -> Result<Option<String>> {
        let (cmd, rest) = match line.split_once(' ') {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };
        match cmd {
            "open" => {
                let (name, rest) = match rest.split_once(' ') {
                    Some((name, rest)) => (name, rest.trim()),
                    None => (rest, ""),
                };
                if name.is_empty() {
                    bail!("open needs a document name");
                }
                let text = parse_text(rest)?;
                let doc = self.host.open_document(&text);
                self.host.show_in_view(ViewSlot::Main, doc);
                self.docs.insert(name.to_string(), doc);
                self.current = Some(doc);
                Ok(None)
            }
            "clone" => {
                let doc = self.current_doc()?;
                self.host.show_in_view(ViewSlot::Sub, doc);
                Ok(None)
            }
            "insert" => {
                let doc = self.current_doc()?;
                let (pos_str, text_str) = rest
                    .split_once(' ')
                    .ok_or_else(|| anyhow::anyhow!("insert needs a position and text"))?;
                let position = self.parse_position(doc, pos_str)?;
                let text = parse_text(text_str.trim())?;
                user_insert(&mut self.host, &mut self.tracker, doc, position, &text);
                Ok(None)
            }
            "delete" => {
                let doc = self.current_doc()?;
                let (from_str, to_str) = rest
                    .split_once(' ')
                    .ok_or_else(|| anyhow::anyhow!("delete needs two positions"))?;
                let from = self.parse_position(doc, from_str)?;
                let to = self.parse_position(doc, to_str.trim())?;
                if to <= from {
                    bail!("delete span is empty");
                }
                user_delete(&mut self.host, &mut self.tracker, doc, from, to - from);
                Ok(None)
            }
            "undo" => {
                let doc = self.current_doc()?;
                if !undo(&mut self.host, &mut self.tracker, doc) {
                    bail!("nothing to undo");
                }
                Ok(None)
            }
            "redo" => {
                let doc = self.current_doc()?;
                if !redo(&mut self.host, &mut self.tracker, doc) {
                    bail!("nothing to redo");
                }
                Ok(None)
            }
            "save" => {
                let doc = self.current_doc()?;
                self.tracker.process_file_save(&mut self.host, doc);
                Ok(None)
            }
            "jump" => {
                let doc = self.current_doc()?;
                let command = match rest {
                    "next" => Command::JumpChangeNext,
                    "prev" => Command::JumpChangePrev,
                    "up" => Command::JumpLineUp,
                    "down" => Command::JumpLineDown,
                    other => bail!("unknown jump direction {other:?}"),
                };
                let line = self.tracker.run_command(&mut self.host, doc, command);
                Ok(Some(match line {
                    Some(line) => format!("jump -> line {line}"),
                    None => "jump -> no change found".to_string(),
                }))
            }
            "state" => {
                let doc = self.current_doc()?;
                Ok(Some(self.describe(doc)))
            }
            other => bail!("unknown command {other:?}"),
        }
    }

    /// Marker state summary for one document.
    pub fn describe(&self, doc: DocId) -> String {
        let unsaved = self
            .tracker
            .mark(MarkKind::NotSaved)
            .number
            .map(|n| self.host.marker_lines(doc, n))
            .unwrap_or_default();
        let saved = self
            .tracker
            .mark(MarkKind::Saved)
            .number
            .map(|n| self.host.marker_lines(doc, n))
            .unwrap_or_default();
        format!(
            "action index {}; unsaved {:?}; saved {:?}",
            self.tracker.action_index(doc),
            unsaved,
            saved,
        )
    }

    /// Documents the script has opened, sorted by name.
    pub fn documents(&self) -> Vec<(String, DocId)> {
        let mut docs: Vec<(String, DocId)> = self
            .docs
            .iter()
            .map(|(name, &doc)| (name.clone(), doc))
            .collect();
        docs.sort();
        docs
    }

    fn current_doc(&self) -> Result<DocId> {
        self.current
            .ok_or_else(|| anyhow::anyhow!("no document open"))
    }

    /// `LINE:COL` → byte position.
    fn parse_position(&self, doc: DocId, s: &str) -> Result<usize> {
        let Some((line, col)) = s.split_once(':') else {
            bail!("position must be LINE:COL, got {s:?}");
        };
        let line: i64 = line.parse()?;
        let col: usize = col.parse()?;
        Ok(self.host.position_of_line(doc, line) + col)
    }
}

/// Strip surrounding quotes and expand `\n` / `\t` / `\\` escapes.
fn parse_text(s: &str) -> Result<String> {
    let inner = match s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => inner,
        None if s.is_empty() => "",
        None => bail!("text must be double-quoted, got {s:?}"),
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => bail!("unknown escape \\{other}"),
            None => bail!("dangling escape"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_escapes() {
        assert_eq!(parse_text(r#""a\nb""#).unwrap(), "a\nb");
        assert_eq!(parse_text(r#""""#).unwrap(), "");
        assert!(parse_text("unquoted").is_err());
    }

    #[test]
    fn test_script_end_to_end() {
        let mut session = Session::new(&PluginConfig::default()).unwrap();
        let output = session
            .run_script(
                r#"
                # a three line file, edit the middle line
                open demo "one\ntwo\nthree\n"
                insert 1:3 "!"
                state
                undo
                state
                "#,
            )
            .unwrap();
        assert_eq!(output.len(), 2);
        assert_eq!(output[0], "action index 1; unsaved [1]; saved []");
        assert_eq!(output[1], "action index 0; unsaved []; saved []");
    }

    #[test]
    fn test_script_save_and_jump() {
        let mut session = Session::new(&PluginConfig::default()).unwrap();
        let output = session
            .run_script(
                r#"
                open demo "a\nb\nc\nd\n"
                insert 0:1 "x"
                insert 2:1 "y"
                save
                insert 3:0 "z"
                state
                jump next
                "#,
            )
            .unwrap();
        assert_eq!(output[0], "action index 3; unsaved [3]; saved [0, 2]");
        assert_eq!(output[1], "jump -> line 3");
    }

    #[test]
    fn test_script_errors_carry_line_context() {
        let mut session = Session::new(&PluginConfig::default()).unwrap();
        let err = session.run_script("open demo \"\"\nbogus").unwrap_err();
        assert!(format!("{err:#}").contains("script line 2"));
    }
}
