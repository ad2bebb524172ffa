//! Transcript capture.
//!
//! Responses are never parsed, so the transcript is the only record of what
//! the device said. Each command produces exactly one entry; sinks get the
//! entries as they happen and decide how to render or persist them.

use crate::console::policy::SettleCategory;
use crate::console::types::Command;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One command and what the console printed while it settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    /// 1-based position among the commands sent in the session.
    pub index: usize,
    /// Command text with secrets masked.
    pub command: String,
    pub category: SettleCategory,
    pub settle_ms: u64,
    /// Captured output, decoded as UTF-8, with echoed secrets masked.
    pub output: String,
    /// Bytes received but dropped because they were not valid UTF-8.
    pub undecodable_bytes: usize,
    pub sent_at: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn new(index: usize, command: &Command, captured: &[u8]) -> Self {
        let (output, undecodable_bytes) = decode_capture(captured);
        Self {
            index,
            command: command.display_text().to_string(),
            category: command.category,
            settle_ms: command.settle.as_millis() as u64,
            output: command.mask(&output),
            undecodable_bytes,
            sent_at: Utc::now(),
        }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Decode console bytes, skipping invalid UTF-8 sequences.
///
/// Returns the text and the number of bytes skipped.
pub fn decode_capture(bytes: &[u8]) -> (String, usize) {
    let mut text = String::with_capacity(bytes.len());
    let mut skipped = 0;
    let mut rest = bytes;
    while !rest.is_empty() {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                // Prefix is valid by construction.
                text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let bad = e.error_len().unwrap_or(after.len());
                skipped += bad;
                rest = &after[bad..];
            }
        }
    }
    (text, skipped)
}

/// Append-only log of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Command texts in send order (masked).
    pub fn commands(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.command.as_str()).collect()
    }

    /// Everything the console printed, in order.
    pub fn output(&self) -> String {
        self.entries.iter().map(|e| e.output.as_str()).collect()
    }

    pub fn undecodable_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.undecodable_bytes).sum()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Sinks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Receives the session's progress as it happens.
///
/// All methods default to doing nothing.
pub trait TranscriptSink: Send + Sync {
    fn on_open(&self, _session_id: &str, _port_name: &str) {}

    fn on_entry(&self, _entry: &TranscriptEntry) {}

    fn on_pause_start(&self, _reason: &str, _total: Duration) {}

    fn on_pause_tick(&self, _elapsed: Duration, _total: Duration) {}

    fn on_pause_end(&self) {}

    fn on_close(&self) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TranscriptSink for NullSink {}

/// On-disk transcript layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TranscriptFormat {
    /// Console output only, as it would have scrolled past.
    #[default]
    Plain,
    /// One header line per command followed by its output.
    Timestamped,
    /// One JSON object per command.
    JsonLines,
}

impl std::str::FromStr for TranscriptFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "timestamped" => Ok(Self::Timestamped),
            "json" | "jsonl" | "json-lines" => Ok(Self::JsonLines),
            other => Err(format!(
                "unknown transcript format '{}' (expected plain, timestamped or json)",
                other
            )),
        }
    }
}

/// Format an entry as plain console output.
pub fn format_plain(entry: &TranscriptEntry) -> String {
    entry.output.clone()
}

/// Format an entry with a timestamped command header.
pub fn format_timestamped(entry: &TranscriptEntry) -> String {
    let ts = entry.sent_at.format("%Y-%m-%d %H:%M:%S%.3f");
    let mut out = format!(
        "[{}] #{} >>> {} (settle {} ms)\n",
        ts, entry.index, entry.command, entry.settle_ms
    );
    out.push_str(&entry.output);
    if !entry.output.is_empty() && !entry.output.ends_with('\n') {
        out.push('\n');
    }
    if entry.undecodable_bytes > 0 {
        out.push_str(&format!("[{} undecodable bytes]\n", entry.undecodable_bytes));
    }
    out
}

/// Format an entry as a JSON line.
pub fn format_json_line(entry: &TranscriptEntry) -> String {
    let mut line = serde_json::to_string(entry).unwrap_or_default();
    line.push('\n');
    line
}

pub fn format_entry(entry: &TranscriptEntry, format: TranscriptFormat) -> String {
    match format {
        TranscriptFormat::Plain => format_plain(entry),
        TranscriptFormat::Timestamped => format_timestamped(entry),
        TranscriptFormat::JsonLines => format_json_line(entry),
    }
}

/// Sink that appends entries to a file as they arrive.
pub struct TranscriptWriter {
    format: TranscriptFormat,
    file: Mutex<std::fs::File>,
}

impl TranscriptWriter {
    /// Create (truncate) the transcript file.
    pub fn create(path: impl AsRef<Path>, format: TranscriptFormat) -> Result<Self, String> {
        let path = path.as_ref();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| format!("Failed to open transcript file {}: {}", path.display(), e))?;
        Ok(Self {
            format,
            file: Mutex::new(file),
        })
    }

    fn write_text(&self, text: &str) {
        let result = match self.file.lock() {
            Ok(mut file) => file.write_all(text.as_bytes()).and_then(|_| file.flush()),
            Err(_) => return,
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Transcript write failed");
        }
    }
}

impl TranscriptSink for TranscriptWriter {
    fn on_open(&self, session_id: &str, port_name: &str) {
        if self.format == TranscriptFormat::Timestamped {
            self.write_text(&format!(
                "=== Console Session Log ===\nSession: {} | Port: {}\nStarted: {}\n===========================\n",
                session_id,
                port_name,
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
    }

    fn on_entry(&self, entry: &TranscriptEntry) {
        self.write_text(&format_entry(entry, self.format));
    }

    fn on_pause_start(&self, reason: &str, total: Duration) {
        if self.format == TranscriptFormat::Timestamped {
            self.write_text(&format!(
                "[{}] --- pause {} s: {} ---\n",
                Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                total.as_secs(),
                reason
            ));
        }
    }

    fn on_close(&self) {
        if self.format == TranscriptFormat::Timestamped {
            self.write_text(&format!(
                "=== Closed: {} ===\n",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
    }
}

/// Forwards to several sinks in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<std::sync::Arc<dyn TranscriptSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: std::sync::Arc<dyn TranscriptSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl TranscriptSink for FanoutSink {
    fn on_open(&self, session_id: &str, port_name: &str) {
        self.sinks.iter().for_each(|s| s.on_open(session_id, port_name));
    }

    fn on_entry(&self, entry: &TranscriptEntry) {
        self.sinks.iter().for_each(|s| s.on_entry(entry));
    }

    fn on_pause_start(&self, reason: &str, total: Duration) {
        self.sinks.iter().for_each(|s| s.on_pause_start(reason, total));
    }

    fn on_pause_tick(&self, elapsed: Duration, total: Duration) {
        self.sinks.iter().for_each(|s| s.on_pause_tick(elapsed, total));
    }

    fn on_pause_end(&self) {
        self.sinks.iter().for_each(|s| s.on_pause_end());
    }

    fn on_close(&self) {
        self.sinks.iter().for_each(|s| s.on_close());
    }
}
