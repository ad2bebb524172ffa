//! `apos-setup`: provision a survey AP over its serial console.
//!
//! The engine lives in the `apos-console` crate and is re-exported here as
//! [`console`]; this crate adds the command-line front end and the terminal
//! renderer.

pub mod cli;
pub mod render;

pub use apos_console::console;
