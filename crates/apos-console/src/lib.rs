//! # AP-on-a-Stick – Console Provisioning
//!
//! Serial console command sequencing for survey access points:
//!
//! - **Transport** – open / write / read-available / close over a serial
//!   device, plus an in-memory simulated port for tests and demos
//! - **Session** – one blind send → settle → capture loop per run, with a
//!   transcript of every command and the output it produced
//! - **Settle Policy** – per-category wait table with presets and per-command
//!   overrides, injected from configuration
//! - **Completion Detection** – pluggable strategy; blind settling by default,
//!   regex prompt matching as an opt-in
//! - **Provisioning Script** – the ordered IOS-XE command sequence derived from
//!   a validated `ProvisioningConfig`
//! - **Transcript Capture** – file sinks in plain, timestamped, or JSON-lines form

pub mod console;
