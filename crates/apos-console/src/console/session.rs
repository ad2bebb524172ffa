//! Console session.
//!
//! A session owns the open transport for one provisioning run and threads
//! every command through the same send / settle / capture loop. It never
//! looks at what the device answered; the capture only feeds the transcript.

use crate::console::completion::CompletionDetector;
use crate::console::error::{ProvisionError, ProvisionResult};
use crate::console::policy::SettleCategory;
use crate::console::transcript::{Transcript, TranscriptEntry, TranscriptSink};
use crate::console::transport::ConsoleTransport;
use crate::console::types::{Command, LineEnding, Pause, PortConfig, Step};
use std::sync::Arc;
use std::time::Duration;

/// One open console connection and everything captured on it so far.
pub struct ConsoleSession {
    id: String,
    transport: Arc<dyn ConsoleTransport>,
    detector: Arc<dyn CompletionDetector>,
    sink: Arc<dyn TranscriptSink>,
    line_ending: LineEnding,
    transcript: Transcript,
    /// Commands issued so far, including one that failed mid-flight.
    issued: usize,
    closed: bool,
}

impl ConsoleSession {
    /// Open the transport and start a session on it.
    pub async fn open(
        transport: Arc<dyn ConsoleTransport>,
        config: &PortConfig,
        detector: Arc<dyn CompletionDetector>,
        sink: Arc<dyn TranscriptSink>,
    ) -> ProvisionResult<Self> {
        let port = if config.port_name.is_empty() {
            transport.port_name().to_string()
        } else {
            config.port_name.clone()
        };
        transport
            .open(config)
            .await
            .map_err(|e| ProvisionError::transport_open(&port, e))?;

        let id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            session = %id,
            port = %port,
            line = %config.shorthand(),
            completion = detector.name(),
            "Console session opened"
        );
        sink.on_open(&id, &port);

        Ok(Self {
            id,
            transport,
            detector,
            sink,
            line_ending: config.line_ending,
            transcript: Transcript::new(),
            issued: 0,
            closed: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Commands that completed and were recorded.
    pub fn commands_sent(&self) -> usize {
        self.transcript.len()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn into_transcript(self) -> Transcript {
        self.transcript
    }

    /// Send one line, wait `settle`, and return what the console printed.
    pub async fn send(&mut self, text: &str, settle: Duration) -> ProvisionResult<String> {
        self.execute(&Command::new(text, settle, SettleCategory::Default))
            .await
    }

    /// Run one command through the send / settle / capture loop.
    ///
    /// A transport failure tears the session down; the error carries the
    /// command's 1-based index and its masked text.
    pub async fn execute(&mut self, command: &Command) -> ProvisionResult<String> {
        if command.text.contains(['\r', '\n']) {
            return Err(ProvisionError::config(format!(
                "command `{}` contains a line terminator",
                command.display_text().escape_debug()
            )));
        }

        self.issued += 1;
        let index = self.issued;
        if self.closed {
            return Err(ProvisionError::transport_io(
                index,
                command.display_text(),
                "session is closed",
            ));
        }

        tracing::debug!(
            session = %self.id,
            index,
            category = command.category.label(),
            settle_ms = command.settle.as_millis() as u64,
            command = %command.display_text(),
            "Sending command"
        );

        let mut line = Vec::with_capacity(command.text.len() + 2);
        line.extend_from_slice(command.text.as_bytes());
        line.extend_from_slice(self.line_ending.bytes());

        let captured = match self.write_then_capture(&line, command.settle).await {
            Ok(captured) => captured,
            Err(message) => {
                tracing::error!(
                    session = %self.id,
                    index,
                    command = %command.display_text(),
                    error = %message,
                    "Console I/O failed, aborting"
                );
                self.close().await;
                return Err(ProvisionError::transport_io(
                    index,
                    command.display_text(),
                    message,
                ));
            }
        };

        let entry = TranscriptEntry::new(index, command, &captured);
        if entry.undecodable_bytes > 0 {
            tracing::warn!(
                session = %self.id,
                index,
                bytes = entry.undecodable_bytes,
                "Dropped undecodable console output"
            );
        }
        self.sink.on_entry(&entry);
        let output = entry.output.clone();
        self.transcript.push(entry);
        Ok(output)
    }

    async fn write_then_capture(&self, line: &[u8], settle: Duration) -> Result<Vec<u8>, String> {
        let written = self.transport.write(line).await?;
        if written != line.len() {
            return Err(format!(
                "short write: {} of {} bytes",
                written,
                line.len()
            ));
        }
        self.detector
            .await_completion(self.transport.as_ref(), settle)
            .await
    }

    /// Wait out a fixed pause, reporting progress every tick.
    pub async fn pause(&mut self, pause: &Pause) {
        tracing::info!(
            session = %self.id,
            seconds = pause.duration.as_secs_f64(),
            reason = %pause.reason,
            "Pausing"
        );
        self.sink.on_pause_start(&pause.reason, pause.duration);
        let tick = pause.tick.max(Duration::from_millis(1));
        let mut elapsed = Duration::ZERO;
        while elapsed < pause.duration {
            let step = tick.min(pause.duration - elapsed);
            tokio::time::sleep(step).await;
            elapsed += step;
            self.sink.on_pause_tick(elapsed, pause.duration);
        }
        self.sink.on_pause_end();
    }

    /// Run steps in order, stopping at the first error.
    pub async fn run(&mut self, steps: &[Step]) -> ProvisionResult<()> {
        for step in steps {
            match step {
                Step::Send(command) => {
                    self.execute(command).await?;
                }
                Step::Pause(pause) => self.pause(pause).await,
            }
        }
        Ok(())
    }

    /// Release the transport. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.transport.close().await {
            tracing::warn!(session = %self.id, error = %e, "Closing console failed");
        }
        self.sink.on_close();
        tracing::info!(
            session = %self.id,
            commands = self.transcript.len(),
            "Console session closed"
        );
    }
}
