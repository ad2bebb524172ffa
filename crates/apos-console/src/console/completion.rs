//! Completion detection.
//!
//! Decides when a command is "done" and collects what the console printed
//! meanwhile. The default never looks at the output: it sleeps the settle
//! and takes one read. `PromptMatch` is an opt-in alternative that returns
//! early once the capture matches a prompt pattern, keeping the settle as an
//! upper bound.

use crate::console::error::{ProvisionError, ProvisionResult};
use crate::console::transport::ConsoleTransport;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Waits for a command to take effect and returns the captured bytes.
#[async_trait::async_trait]
pub trait CompletionDetector: Send + Sync {
    async fn await_completion(
        &self,
        transport: &dyn ConsoleTransport,
        settle: Duration,
    ) -> Result<Vec<u8>, String>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Sleep for exactly the settle, then one non-blocking read.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlindSettle;

#[async_trait::async_trait]
impl CompletionDetector for BlindSettle {
    async fn await_completion(
        &self,
        transport: &dyn ConsoleTransport,
        settle: Duration,
    ) -> Result<Vec<u8>, String> {
        tokio::time::sleep(settle).await;
        transport.read_available().await
    }

    fn name(&self) -> &'static str {
        "blind"
    }
}

/// Poll the console until the capture ends in a prompt or the settle runs out.
#[derive(Debug, Clone)]
pub struct PromptMatch {
    pattern: Regex,
    poll_interval: Duration,
}

impl PromptMatch {
    pub fn new(pattern: &str, poll_interval: Duration) -> ProvisionResult<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            ProvisionError::config(format!("invalid prompt pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            pattern,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        })
    }

    fn is_complete(&self, captured: &[u8]) -> bool {
        self.pattern.is_match(&String::from_utf8_lossy(captured))
    }
}

#[async_trait::async_trait]
impl CompletionDetector for PromptMatch {
    async fn await_completion(
        &self,
        transport: &dyn ConsoleTransport,
        settle: Duration,
    ) -> Result<Vec<u8>, String> {
        let deadline = tokio::time::Instant::now() + settle;
        let mut captured = Vec::new();
        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            let nap = self.poll_interval.min(deadline - now);
            tokio::time::sleep(nap).await;
            captured.extend(transport.read_available().await?);
            if self.is_complete(&captured) {
                return Ok(captured);
            }
        }
        // Late bytes that arrived during the final nap.
        captured.extend(transport.read_available().await?);
        Ok(captured)
    }

    fn name(&self) -> &'static str {
        "prompt"
    }
}

/// Completion strategy as written in the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum CompletionMode {
    #[default]
    Blind,
    #[serde(rename_all = "camelCase")]
    Prompt {
        #[serde(default = "default_prompt_pattern")]
        pattern: String,
        #[serde(default = "default_poll_ms")]
        poll_ms: u64,
    },
}

fn default_prompt_pattern() -> String {
    r"[>#]\s*$".to_string()
}
fn default_poll_ms() -> u64 {
    50
}

impl CompletionMode {
    pub fn validate(&self) -> ProvisionResult<()> {
        self.build().map(|_| ())
    }

    pub fn build(&self) -> ProvisionResult<Arc<dyn CompletionDetector>> {
        match self {
            Self::Blind => Ok(Arc::new(BlindSettle)),
            Self::Prompt { pattern, poll_ms } => Ok(Arc::new(PromptMatch::new(
                pattern,
                Duration::from_millis(*poll_ms),
            )?)),
        }
    }
}
