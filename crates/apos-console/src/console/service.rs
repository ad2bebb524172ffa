//! Provisioning service.
//!
//! Glues the pieces together for one run: validate, generate the script,
//! open a session on the transport, execute, and release the transport on
//! every exit path.

use crate::console::config::{DriverSettings, ProvisioningConfig};
use crate::console::error::{ProvisionFailure, ProvisionResult};
use crate::console::script::{build_script, Script};
use crate::console::session::ConsoleSession;
use crate::console::transcript::{Transcript, TranscriptSink};
use crate::console::transport::ConsoleTransport;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub session_id: String,
    pub transcript: Transcript,
    pub elapsed: Duration,
}

/// Generate the script a run would execute, without touching any transport.
pub fn plan(config: &ProvisioningConfig, settings: &DriverSettings) -> ProvisionResult<Script> {
    settings.completion.validate()?;
    build_script(config, &settings.settle_policy(), &settings.script)
}

/// Provision the AP over `transport`.
///
/// Configuration problems surface before the transport is opened. On a
/// transport failure the returned `ProvisionFailure` holds the transcript of
/// every command that completed.
pub async fn provision(
    config: &ProvisioningConfig,
    settings: &DriverSettings,
    transport: Arc<dyn ConsoleTransport>,
    sink: Arc<dyn TranscriptSink>,
) -> Result<ProvisionReport, ProvisionFailure> {
    let started = tokio::time::Instant::now();
    let script = plan(config, settings)?;
    let detector = settings.completion.build()?;
    let port = settings.port_for(config);

    tracing::info!(
        port = %port.port_name,
        preset = %settings.preset,
        commands = script.command_count(),
        estimated_s = script.estimated_duration().as_secs(),
        "Starting provisioning run"
    );

    let mut session = ConsoleSession::open(transport, &port, detector, sink).await?;
    let result = session.run(script.steps()).await;
    session.close().await;

    let session_id = session.id().to_string();
    match result {
        Ok(()) => {
            let elapsed = started.elapsed();
            tracing::info!(
                session = %session_id,
                elapsed_s = elapsed.as_secs_f64(),
                "Provisioning complete"
            );
            Ok(ProvisionReport {
                session_id,
                transcript: session.into_transcript(),
                elapsed,
            })
        }
        Err(error) => {
            tracing::error!(session = %session_id, error = %error, "Provisioning aborted");
            Err(ProvisionFailure {
                error,
                transcript: session.into_transcript(),
            })
        }
    }
}
