//! Text editing of connection tables
//!
//! The connection graph itself only parses and repairs text. The loop that
//! hands the text to a human and asks again after a bad edit lives here,
//! behind the [`TextEditor`] trait.

use std::io::Write;
use std::process::Command;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::graph::ConnectionGraph;
use crate::report::Report;

/// Something that lets a user edit a string
pub trait TextEditor {
    fn edit(&self, text: &str) -> Result<String>;
}

/// Runs an external editor on a scratch file
#[derive(Debug, Clone)]
pub struct ExternalEditor {
    command: String,
}

impl ExternalEditor {
    /// `command` may carry arguments, e.g. `"code --wait"`
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl TextEditor for ExternalEditor {
    fn edit(&self, text: &str) -> Result<String> {
        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::Editor("no editor configured".into()))?;

        let mut file = tempfile::Builder::new()
            .prefix("wolfgrid-")
            .suffix(".txt")
            .tempfile()?;
        file.write_all(text.as_bytes())?;
        file.flush()?;

        let status = Command::new(program)
            .args(parts)
            .arg(file.path())
            .status()
            .map_err(|e| Error::Editor(format!("failed to start {}: {}", program, e)))?;
        if !status.success() {
            return Err(Error::Editor(format!("{} exited with {}", program, status)));
        }

        Ok(std::fs::read_to_string(file.path())?)
    }
}

/// Let the user edit `graph` until it parses and needs no repair
///
/// `repairs` are the messages from repairing the table before the first
/// round; they are shown with it. After a failed or repaired edit the
/// current table is presented again with the diagnostics appended as `#`
/// comments. An emptied file aborts.
pub fn edit_connection_graph(
    graph: &mut ConnectionGraph,
    editor: &dyn TextEditor,
    repairs: &Report,
) -> Result<()> {
    let mut notes = comment_lines(repairs);
    loop {
        let text = format!("{}{}", graph.serialize(), notes);
        let edited = editor.edit(&text)?;
        if edited.trim().is_empty() {
            return Err(Error::Editor("connection table edit aborted".into()));
        }

        let report = graph.update(&edited);
        if report.is_empty() {
            info!("Connection table accepted");
            return Ok(());
        }

        debug!("Connection table needs another pass: {} message(s)", report.len());
        notes = comment_lines(&report);
    }
}

/// Messages as `#` lines to append below a serialized table
pub fn comment_lines(report: &Report) -> String {
    if report.is_empty() {
        return String::new();
    }
    let mut notes = String::from("\n");
    for message in report {
        notes.push_str(&format!("\n# {}", message));
    }
    notes
}
