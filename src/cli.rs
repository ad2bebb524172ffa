//! Command-line front end.

use crate::render::ConsoleRenderer;
use apos_console::console::config::{DriverSettings, ProvisioningConfig};
use apos_console::console::error::{ProvisionError, ProvisionFailure, ProvisionResult};
use apos_console::console::policy::SettlePreset;
use apos_console::console::service::{plan, provision, ProvisionReport};
use apos_console::console::transcript::{
    FanoutSink, TranscriptFormat, TranscriptSink, TranscriptWriter,
};
use apos_console::console::transport::{ConsoleTransport, SerialPortTransport};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Configure a Cisco IOS-XE AP as an embedded wireless controller for an
/// AP-on-a-Stick site survey, over its serial console.
#[derive(Parser, Debug, Clone)]
#[command(name = "apos-setup", version, long_about = None)]
pub struct Args {
    /// JSON file describing the AP, the controller and the survey WLANs
    pub config: PathBuf,

    /// Driver settings file (port parameters, timing, script options)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Timing preset: standard, brisk or patient (overrides the settings file)
    #[arg(long)]
    pub preset: Option<SettlePreset>,

    /// Also write the session transcript to this file
    #[arg(long)]
    pub transcript: Option<PathBuf>,

    /// Transcript file layout: plain, timestamped or json
    #[arg(long, default_value = "plain")]
    pub transcript_format: TranscriptFormat,

    /// Print the command plan and exit without touching the console
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

const BANNER: &str = "** Setting up Cisco C9800 APoS AP";

const TIMING_NOTE: &str = "   Console replies are not checked: every command gets a fixed wait.\n   \
     If the AP is slower than that, later commands may be lost.";

/// Read the provisioning document and the driver settings.
pub fn load_inputs(args: &Args) -> ProvisionResult<(ProvisioningConfig, DriverSettings)> {
    let config = ProvisioningConfig::load(&args.config)?;
    let mut settings = match &args.settings {
        Some(path) => DriverSettings::load(path)?,
        None => DriverSettings::default(),
    };
    if let Some(preset) = args.preset {
        settings.preset = preset;
    }
    Ok((config, settings))
}

/// Sink for a run: the terminal plus the optional transcript file.
pub fn build_sink(
    args: &Args,
    renderer: Arc<ConsoleRenderer>,
) -> ProvisionResult<Arc<dyn TranscriptSink>> {
    let Some(path) = &args.transcript else {
        return Ok(renderer);
    };
    let writer = TranscriptWriter::create(path, args.transcript_format)
        .map_err(ProvisionError::config)?;
    Ok(Arc::new(FanoutSink::new().with(renderer).with(Arc::new(writer))))
}

/// Provision over `transport`, rendering to `renderer`.
pub async fn execute(
    args: &Args,
    config: &ProvisioningConfig,
    settings: &DriverSettings,
    transport: Arc<dyn ConsoleTransport>,
    renderer: Arc<ConsoleRenderer>,
) -> Result<ProvisionReport, ProvisionFailure> {
    let sink = build_sink(args, renderer.clone())?;
    let report = provision(config, settings, transport, sink).await?;
    renderer.println("");
    renderer.println("Now, wait for the AP to reboot and start broadcasting the survey SSID!");
    renderer.println("Happy Site Survey!");
    Ok(report)
}

/// Program body; returns the process exit code.
pub async fn run(args: Args) -> ExitCode {
    let renderer = Arc::new(ConsoleRenderer::stdout());
    run_with(&args, renderer, |tty| -> Arc<dyn ConsoleTransport> {
        SerialPortTransport::new(tty)
    })
    .await
}

/// Same as [`run`], with the terminal and the console transport supplied by
/// the caller. `connect` receives the configured tty.
pub async fn run_with<F>(args: &Args, renderer: Arc<ConsoleRenderer>, connect: F) -> ExitCode
where
    F: FnOnce(&str) -> Arc<dyn ConsoleTransport>,
{
    let started = std::time::Instant::now();
    renderer.println(BANNER);

    let outcome = run_inner(args, renderer.clone(), connect).await;

    renderer.println(&format!(
        "\n** Time to run: {:.2} sec",
        started.elapsed().as_secs_f64()
    ));
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("error: {}", failure.error);
            if failure.error.failed_command_index().is_some() {
                eprintln!(
                    "{} command(s) completed before the failure; nothing was rolled back",
                    failure.transcript.len()
                );
            }
            ExitCode::FAILURE
        }
    }
}

async fn run_inner<F>(
    args: &Args,
    renderer: Arc<ConsoleRenderer>,
    connect: F,
) -> Result<(), ProvisionFailure>
where
    F: FnOnce(&str) -> Arc<dyn ConsoleTransport>,
{
    let (config, settings) = load_inputs(args)?;

    if args.dry_run {
        let script = plan(&config, &settings)?;
        renderer.println(&format!(
            "Plan for {} on {} ({} preset):",
            config.ap.name, config.tty, settings.preset
        ));
        renderer.print(&script.render());
        return Ok(());
    }

    renderer.println(TIMING_NOTE);
    let transport = connect(&config.tty);
    let report = execute(args, &config, &settings, transport, renderer).await?;
    tracing::info!(
        session = %report.session_id,
        commands = report.transcript.len(),
        undecodable_bytes = report.transcript.undecodable_bytes(),
        "Run finished"
    );
    Ok(())
}
