//! Provisioning error taxonomy.

use crate::console::transcript::Transcript;

/// Fatal errors of a provisioning run.
///
/// Nothing here describes a device-side failure: responses are never parsed,
/// so a command the device rejected still counts as sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
    /// Input document unreadable, incomplete, or failing validation.
    /// Always raised before the transport is touched.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The console transport could not be acquired.
    #[error("failed to open console {port}: {message}")]
    TransportOpen { port: String, message: String },

    /// A write or read failed mid-sequence. `index` is the 1-based position
    /// of the in-flight command among all commands sent in the session.
    #[error("console I/O failed on command #{index} `{command}`: {message}")]
    TransportIo {
        index: usize,
        command: String,
        message: String,
    },
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

impl ProvisionError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transport_open(port: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::TransportOpen {
            port: port.into(),
            message: msg.into(),
        }
    }

    pub fn transport_io(index: usize, command: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::TransportIo {
            index,
            command: command.into(),
            message: msg.into(),
        }
    }

    /// Index of the command in flight when the run aborted, if any.
    pub fn failed_command_index(&self) -> Option<usize> {
        match self {
            Self::TransportIo { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<serde_json::Error> for ProvisionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Configuration(format!("invalid JSON: {}", e))
    }
}

/// A failed run: the error plus everything captured before it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("provisioning stopped after {} completed command(s)", .transcript.len())]
pub struct ProvisionFailure {
    #[source]
    pub error: ProvisionError,
    /// Entries for the commands that completed before the failure.
    pub transcript: Transcript,
}

impl From<ProvisionError> for ProvisionFailure {
    fn from(error: ProvisionError) -> Self {
        Self {
            error,
            transcript: Transcript::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_io_reports_index() {
        let e = ProvisionError::transport_io(7, "hostname EWC1", "broken pipe");
        assert_eq!(e.failed_command_index(), Some(7));
        let text = e.to_string();
        assert!(text.contains("#7"));
        assert!(text.contains("hostname EWC1"));
        assert!(text.contains("broken pipe"));
    }

    #[test]
    fn test_json_errors_become_configuration_errors() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e: ProvisionError = err.into();
        assert!(e.is_configuration());
        assert_eq!(e.failed_command_index(), None);
    }

    #[test]
    fn test_failure_from_error_has_empty_transcript() {
        let f: ProvisionFailure = ProvisionError::config("no wlans").into();
        assert!(f.transcript.is_empty());
        assert_eq!(f.to_string(), "provisioning stopped after 0 completed command(s)");
    }

    #[test]
    fn test_failure_display_does_not_repeat_source() {
        use std::error::Error;

        let f = ProvisionFailure {
            error: ProvisionError::transport_io(3, "enable", "broken pipe"),
            transcript: Transcript::default(),
        };
        let source = f.source().map(|s| s.to_string()).unwrap();
        assert!(source.contains("broken pipe"));
        assert!(!f.to_string().contains("broken pipe"));
    }
}
