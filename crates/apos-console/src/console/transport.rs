//! Console transport abstraction.
//!
//! The driver only needs four things from the wire: open it, write bytes,
//! take whatever bytes are already buffered without waiting for more, and
//! close it. `SerialPortTransport` does that over a real device through the
//! `serialport` crate; `SimulatedTransport` does it in memory so tests and
//! dry demos can script the device side, including failures.

use crate::console::types::PortConfig;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Transport trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Byte channel to a device console.
///
/// Implementations must be `Send + Sync` so they can be held behind an
/// `Arc` by the session.
#[async_trait::async_trait]
pub trait ConsoleTransport: Send + Sync {
    /// Open the port with the given configuration.
    async fn open(&self, config: &PortConfig) -> Result<(), String>;

    /// Close the port. Closing a closed port is not an error.
    async fn close(&self) -> Result<(), String>;

    /// Write all bytes in `buf`.
    async fn write(&self, buf: &[u8]) -> Result<usize, String>;

    /// Drain and return the bytes currently buffered; never waits for more.
    async fn read_available(&self) -> Result<Vec<u8>, String>;

    /// Check whether the port is open.
    fn is_open(&self) -> bool;

    /// Retrieve the port name.
    fn port_name(&self) -> &str;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Serial device transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type PortSlot = Arc<std::sync::Mutex<Option<Box<dyn serialport::SerialPort>>>>;

/// Transport over an OS serial device.
///
/// `serialport` is blocking, so every operation runs on the blocking pool.
pub struct SerialPortTransport {
    name: String,
    port: PortSlot,
    open: Arc<AtomicBool>,
}

impl SerialPortTransport {
    pub fn new(port_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: port_name.into(),
            port: Arc::new(std::sync::Mutex::new(None)),
            open: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn with_port<T, F>(&self, op: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&mut Box<dyn serialport::SerialPort>) -> Result<T, String> + Send + 'static,
    {
        let slot = self.port.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| "Serial port lock poisoned".to_string())?;
            let port = guard.as_mut().ok_or_else(|| "Port not open".to_string())?;
            op(port)
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }
}

#[async_trait::async_trait]
impl ConsoleTransport for SerialPortTransport {
    async fn open(&self, config: &PortConfig) -> Result<(), String> {
        if self.open.load(Ordering::SeqCst) {
            return Err(format!("Port {} already open", self.name));
        }
        let name = self.name.clone();
        let cfg = config.clone();
        let port = tokio::task::spawn_blocking(move || {
            serialport::new(&name, cfg.baud_rate)
                .data_bits(cfg.data_bits.into())
                .parity(cfg.parity.into())
                .stop_bits(cfg.stop_bits.into())
                .flow_control(cfg.flow_control.into())
                .timeout(cfg.io_timeout())
                .open()
                .map_err(|e| format!("Failed to open serial port {}: {}", name, e))
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))??;

        let mut slot = self
            .port
            .lock()
            .map_err(|_| "Serial port lock poisoned".to_string())?;
        *slot = Some(port);
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), String> {
        self.open.store(false, Ordering::SeqCst);
        let mut slot = self
            .port
            .lock()
            .map_err(|_| "Serial port lock poisoned".to_string())?;
        // Dropping the handle releases the OS device.
        slot.take();
        Ok(())
    }

    async fn write(&self, buf: &[u8]) -> Result<usize, String> {
        let data = buf.to_vec();
        self.with_port(move |port| {
            port.write_all(&data)
                .map_err(|e| format!("Serial write failed: {}", e))?;
            port.flush()
                .map_err(|e| format!("Serial flush failed: {}", e))?;
            Ok(data.len())
        })
        .await
    }

    async fn read_available(&self) -> Result<Vec<u8>, String> {
        self.with_port(|port| {
            let waiting = port
                .bytes_to_read()
                .map_err(|e| format!("Serial status query failed: {}", e))?
                as usize;
            if waiting == 0 {
                return Ok(Vec::new());
            }
            let mut buf = vec![0u8; waiting];
            let n = port
                .read(&mut buf)
                .map_err(|e| format!("Serial read failed: {}", e))?;
            buf.truncate(n);
            Ok(buf)
        })
        .await
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Simulated transport (for testing & offline use)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Produces the device's reply to one write.
pub type Responder = Box<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// A fully in-memory transport useful for unit tests and demos.
pub struct SimulatedTransport {
    name: String,
    open: AtomicBool,
    rx_buf: Mutex<VecDeque<u8>>,
    writes: Mutex<Vec<Vec<u8>>>,
    responder: std::sync::Mutex<Option<Responder>>,
    loopback: AtomicBool,
    fail_open: std::sync::Mutex<Option<String>>,
    /// 1-based write call that fails; 0 disables.
    fail_write_at: AtomicUsize,
    /// 1-based read call that fails; 0 disables.
    fail_read_at: AtomicUsize,
    reads: AtomicUsize,
    close_count: AtomicUsize,
}

impl SimulatedTransport {
    /// Create a new simulated transport for the given port name.
    pub fn new(port_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: port_name.into(),
            open: AtomicBool::new(false),
            rx_buf: Mutex::new(VecDeque::with_capacity(4096)),
            writes: Mutex::new(Vec::new()),
            responder: std::sync::Mutex::new(None),
            loopback: AtomicBool::new(false),
            fail_open: std::sync::Mutex::new(None),
            fail_write_at: AtomicUsize::new(0),
            fail_read_at: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
        })
    }

    /// A console that echoes each line and prints an IOS-style prompt.
    pub fn ios_console(port_name: impl Into<String>, hostname: &str) -> Arc<Self> {
        let t = Self::new(port_name);
        let prompt = format!("\r\n{}#", hostname);
        t.set_responder(move |written| {
            let mut reply = written.to_vec();
            reply.extend_from_slice(prompt.as_bytes());
            reply
        });
        t
    }

    /// Enable loopback mode (written bytes become readable).
    pub fn set_loopback(&self, enabled: bool) {
        self.loopback.store(enabled, Ordering::SeqCst);
    }

    /// Script the device: the responder's output is queued after each write.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.responder.lock() {
            *slot = Some(Box::new(responder));
        }
    }

    /// Make the next `open` fail with `message`.
    pub fn fail_open_with(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.fail_open.lock() {
            *slot = Some(message.into());
        }
    }

    /// Fail the `n`th write call (1-based).
    pub fn fail_write_at(&self, n: usize) {
        self.fail_write_at.store(n, Ordering::SeqCst);
    }

    /// Fail the `n`th read call (1-based).
    pub fn fail_read_at(&self, n: usize) {
        self.fail_read_at.store(n, Ordering::SeqCst);
    }

    /// Inject bytes into the receive buffer (simulate unsolicited output).
    pub async fn inject_rx(&self, data: &[u8]) {
        let mut buf = self.rx_buf.lock().await;
        buf.extend(data);
    }

    /// Every successful write, in order.
    pub async fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().await.clone()
    }

    /// Successful writes decoded as text, line terminators stripped.
    pub async fn written_lines(&self) -> Vec<String> {
        self.writes
            .lock()
            .await
            .iter()
            .map(|w| {
                String::from_utf8_lossy(w)
                    .trim_end_matches(['\r', '\n'])
                    .to_string()
            })
            .collect()
    }

    /// How many times `close` was called.
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ConsoleTransport for SimulatedTransport {
    async fn open(&self, _config: &PortConfig) -> Result<(), String> {
        if self.open.load(Ordering::SeqCst) {
            return Err(format!("Port {} already open", self.name));
        }
        let injected = self.fail_open.lock().ok().and_then(|mut slot| slot.take());
        if let Some(message) = injected {
            return Err(message);
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), String> {
        self.open.store(false, Ordering::SeqCst);
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, buf: &[u8]) -> Result<usize, String> {
        if !self.open.load(Ordering::SeqCst) {
            return Err("Port not open".to_string());
        }
        let mut writes = self.writes.lock().await;
        let call = writes.len() + 1;
        if self.fail_write_at.load(Ordering::SeqCst) == call {
            return Err(format!("Simulated write failure on call {}", call));
        }
        writes.push(buf.to_vec());
        drop(writes);

        let reply = match self.responder.lock() {
            Ok(slot) => slot.as_ref().map(|respond| respond(buf)),
            Err(_) => None,
        };
        let mut rx = self.rx_buf.lock().await;
        if self.loopback.load(Ordering::SeqCst) {
            rx.extend(buf);
        }
        if let Some(reply) = reply {
            rx.extend(reply);
        }
        Ok(buf.len())
    }

    async fn read_available(&self) -> Result<Vec<u8>, String> {
        if !self.open.load(Ordering::SeqCst) {
            return Err("Port not open".to_string());
        }
        let call = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_read_at.load(Ordering::SeqCst) == call {
            return Err(format!("Simulated read failure on call {}", call));
        }
        let mut rx = self.rx_buf.lock().await;
        Ok(rx.drain(..).collect())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_transport_open_close() {
        let t = SimulatedTransport::new("/dev/ttyUSB0");
        assert!(!t.is_open());
        t.open(&PortConfig::default()).await.unwrap();
        assert!(t.is_open());
        t.close().await.unwrap();
        assert!(!t.is_open());
        assert_eq!(t.close_count(), 1);
    }

    #[tokio::test]
    async fn test_simulated_transport_read_available_drains() {
        let t = SimulatedTransport::new("/dev/ttyUSB0");
        t.open(&PortConfig::default()).await.unwrap();

        t.inject_rx(b"Press RETURN to get started").await;
        let data = t.read_available().await.unwrap();
        assert_eq!(data, b"Press RETURN to get started");
        assert!(t.read_available().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_simulated_transport_loopback() {
        let t = SimulatedTransport::new("/dev/ttyUSB0");
        t.open(&PortConfig::default()).await.unwrap();
        t.set_loopback(true);

        t.write(b"enable\r").await.unwrap();
        assert_eq!(t.read_available().await.unwrap(), b"enable\r");
    }

    #[tokio::test]
    async fn test_ios_console_echoes_with_prompt() {
        let t = SimulatedTransport::ios_console("/dev/ttyUSB0", "EWC1");
        t.open(&PortConfig::default()).await.unwrap();
        t.write(b"conf t\r").await.unwrap();
        let text = String::from_utf8(t.read_available().await.unwrap()).unwrap();
        assert_eq!(text, "conf t\r\r\nEWC1#");
        assert_eq!(t.written_lines().await, vec!["conf t".to_string()]);
    }

    #[tokio::test]
    async fn test_simulated_transport_error_when_closed() {
        let t = SimulatedTransport::new("/dev/ttyUSB0");
        assert!(t.read_available().await.is_err());
        assert!(t.write(b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let t = SimulatedTransport::new("/dev/ttyUSB0");
        t.fail_open_with("device busy");
        assert_eq!(t.open(&PortConfig::default()).await.unwrap_err(), "device busy");
        t.open(&PortConfig::default()).await.unwrap();

        t.fail_write_at(2);
        t.fail_read_at(1);
        t.write(b"one\r").await.unwrap();
        assert!(t.write(b"two\r").await.is_err());
        assert!(t.read_available().await.is_err());
        assert!(t.read_available().await.is_ok());
        assert_eq!(t.writes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_serial_port_transport_requires_open() {
        let t = SerialPortTransport::new("/dev/does-not-exist");
        assert!(!t.is_open());
        assert_eq!(t.port_name(), "/dev/does-not-exist");
        assert!(t.write(b"x").await.is_err());
        assert!(t.read_available().await.is_err());
        assert!(t.close().await.is_ok());
    }
}
