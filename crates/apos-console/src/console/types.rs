//! Shared types for the console crate.
//!
//! Covers serial port parameters, the command / step values produced by the
//! script generator, and the conversions into `serialport` settings.

use crate::console::policy::SettleCategory;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Placeholder shown wherever a secret would appear.
pub const MASK: &str = "*****";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Port Configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
}

impl Default for DataBits {
    fn default() -> Self {
        Self::Eight
    }
}

impl DataBits {
    pub fn value(&self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl Default for Parity {
    fn default() -> Self {
        Self::None
    }
}

impl Parity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "N",
            Self::Odd => "O",
            Self::Even => "E",
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
}

impl Default for StopBits {
    fn default() -> Self {
        Self::One
    }
}

impl StopBits {
    pub fn label(&self) -> &'static str {
        match self {
            Self::One => "1",
            Self::Two => "2",
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowControl {
    None,
    /// Software flow control (XON/XOFF).
    XonXoff,
    /// Hardware flow control (RTS/CTS).
    RtsCts,
}

impl Default for FlowControl {
    fn default() -> Self {
        Self::None
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::XonXoff => serialport::FlowControl::Software,
            FlowControl::RtsCts => serialport::FlowControl::Hardware,
        }
    }
}

/// Line ending appended to every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LineEnding {
    /// Carriage Return (`\r`), what the IOS-XE console expects.
    Cr,
    /// Line Feed (`\n`).
    Lf,
    /// Carriage Return + Line Feed (`\r\n`).
    CrLf,
}

impl Default for LineEnding {
    fn default() -> Self {
        Self::Cr
    }
}

impl LineEnding {
    /// The byte sequence for this line ending.
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            Self::Cr => b"\r",
            Self::Lf => b"\n",
            Self::CrLf => b"\r\n",
        }
    }
}

/// Serial port parameters for the console connection.
///
/// The device path itself comes from `ProvisioningConfig::tty`; everything
/// else is driver settings with console-friendly defaults (9600-8N1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortConfig {
    /// Port name (e.g. `/dev/ttyUSB0`, `COM3`).
    #[serde(default)]
    pub port_name: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default)]
    pub data_bits: DataBits,

    #[serde(default)]
    pub parity: Parity,

    #[serde(default)]
    pub stop_bits: StopBits,

    #[serde(default)]
    pub flow_control: FlowControl,

    /// Timeout applied to individual port reads and writes.
    #[serde(default = "default_io_timeout")]
    pub io_timeout_ms: u64,

    #[serde(default)]
    pub line_ending: LineEnding,
}

fn default_baud_rate() -> u32 {
    9600
}
fn default_io_timeout() -> u64 {
    1000
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: default_baud_rate(),
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            flow_control: FlowControl::default(),
            io_timeout_ms: default_io_timeout(),
            line_ending: LineEnding::default(),
        }
    }
}

impl PortConfig {
    /// Shorthand notation (e.g. "9600-8N1").
    pub fn shorthand(&self) -> String {
        format!(
            "{}-{}{}{}",
            self.baud_rate,
            self.data_bits.value(),
            self.parity.label(),
            self.stop_bits.label()
        )
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Commands & steps
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One console line plus the time to let it settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Text written to the console, without the line terminator.
    pub text: String,
    /// Wait after the write, before the capture read.
    pub settle: Duration,
    /// Timing category the settle was resolved from.
    pub category: SettleCategory,
    /// Text safe for logs when `text` carries a secret.
    redacted: Option<String>,
    /// Secret values to mask in anything the console echoes back.
    hidden: Vec<String>,
}

impl Command {
    pub fn new(text: impl Into<String>, settle: Duration, category: SettleCategory) -> Self {
        Self {
            text: text.into(),
            settle,
            category,
            redacted: None,
            hidden: Vec::new(),
        }
    }

    /// A command whose full text must stay out of logs and error messages.
    pub fn secret(
        text: impl Into<String>,
        redacted: impl Into<String>,
        settle: Duration,
        category: SettleCategory,
    ) -> Self {
        Self {
            text: text.into(),
            settle,
            category,
            redacted: Some(redacted.into()),
            hidden: Vec::new(),
        }
    }

    /// Register values to mask in the captured output of this command.
    pub fn hiding<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            let value: String = value.into();
            if !value.is_empty() {
                self.hidden.push(value);
            }
        }
        // Longest first so a value containing another is masked whole.
        self.hidden
            .sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        self.hidden.dedup();
        self
    }

    /// Replace every hidden value in `output` with [`MASK`].
    pub fn mask(&self, output: &str) -> String {
        self.hidden
            .iter()
            .fold(output.to_string(), |acc, value| acc.replace(value.as_str(), MASK))
    }

    /// Text for logs, transcripts headers and errors.
    pub fn display_text(&self) -> &str {
        self.redacted.as_deref().unwrap_or(&self.text)
    }

    pub fn is_secret(&self) -> bool {
        self.redacted.is_some()
    }
}

/// Unconditional dead-reckoning wait between commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pause {
    pub reason: String,
    pub duration: Duration,
    /// Interval between progress notifications.
    pub tick: Duration,
}

/// One element of a provisioning script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Send(Command),
    Pause(Pause),
}

impl Step {
    pub fn as_command(&self) -> Option<&Command> {
        match self {
            Self::Send(cmd) => Some(cmd),
            Self::Pause(_) => None,
        }
    }
}
