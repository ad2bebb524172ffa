//! Terminal rendering of a provisioning run.
//!
//! Streams the console's output as it is captured, the way an operator
//! watching a terminal emulator would see it, and draws a dot per tick
//! while the run waits for the AP to rejoin the controller.

use apos_console::console::transcript::{TranscriptEntry, TranscriptSink};
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

/// Transcript sink that writes to a terminal-like stream.
pub struct ConsoleRenderer {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleRenderer {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Write and flush; a broken terminal must not abort the run.
    pub fn print(&self, text: &str) {
        if let Ok(mut out) = self.out.lock() {
            let _ = out.write_all(text.as_bytes());
            let _ = out.flush();
        }
    }

    pub fn println(&self, text: &str) {
        self.print(&format!("{}\n", text));
    }
}

impl TranscriptSink for ConsoleRenderer {
    fn on_open(&self, _session_id: &str, port_name: &str) {
        self.println(&format!("Connecting to {}...", port_name));
    }

    fn on_entry(&self, entry: &TranscriptEntry) {
        self.print(&entry.output);
    }

    fn on_pause_start(&self, reason: &str, _total: Duration) {
        self.print(&format!("\r{}", reason));
    }

    fn on_pause_tick(&self, _elapsed: Duration, _total: Duration) {
        self.print(".");
    }

    fn on_pause_end(&self) {
        self.print("\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apos_console::console::policy::SettleCategory;
    use apos_console::console::types::Command;
    use std::sync::Arc;

    /// Clonable in-memory stream for inspecting rendered output.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_streams_output_without_headers() {
        let buf = SharedBuffer::default();
        let renderer = ConsoleRenderer::new(buf.clone());
        renderer.on_open("id", "/dev/ttyUSB0");
        let cmd = Command::new("enable", Duration::from_millis(500), SettleCategory::Default);
        renderer.on_entry(&TranscriptEntry::new(1, &cmd, b"enable\r\nAP#"));
        assert_eq!(buf.text(), "Connecting to /dev/ttyUSB0...\nenable\r\nAP#");
    }

    #[test]
    fn test_pause_draws_one_dot_per_tick() {
        let buf = SharedBuffer::default();
        let renderer = ConsoleRenderer::new(buf.clone());
        renderer.on_pause_start("Waiting", Duration::from_secs(3));
        for s in 1..=3 {
            renderer.on_pause_tick(Duration::from_secs(s), Duration::from_secs(3));
        }
        renderer.on_pause_end();
        assert_eq!(buf.text(), "\rWaiting...\n");
    }
}
