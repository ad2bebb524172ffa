//! Console crate: sub-modules.

pub mod types;
pub mod error;
pub mod config;
pub mod policy;
pub mod transport;
pub mod completion;
pub mod transcript;
pub mod session;
pub mod script;
pub mod service;

// Re-export top-level items for convenience.
pub use types::*;
pub use error::{ProvisionError, ProvisionFailure, ProvisionResult};
pub use config::{DriverSettings, ProvisioningConfig};
pub use policy::{SettleCategory, SettlePolicy, SettlePreset};
pub use session::ConsoleSession;
pub use script::{build_script, Script, ScriptOptions};
pub use service::{plan, provision, ProvisionReport};
pub use transport::{ConsoleTransport, SerialPortTransport, SimulatedTransport};
pub use completion::{BlindSettle, CompletionDetector, CompletionMode, PromptMatch};
pub use transcript::{
    NullSink, Transcript, TranscriptEntry, TranscriptFormat, TranscriptSink, TranscriptWriter,
};
