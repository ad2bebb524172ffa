//! Settle policy.
//!
//! The console never says "done", so every command is followed by a fixed
//! wait. How long depends on what the command does to the device: most
//! lines apply instantly, re-addressing an interface stalls the console for
//! seconds. The table below is keyed by command category, comes in a few
//! presets, and can be tuned per firmware from the settings file without
//! touching the script.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Timing category of a console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettleCategory {
    /// Ordinary configuration line.
    Default,
    /// Empty line sent to flush console buffering after boot.
    Wake,
    /// Assigning the controller's management address.
    InterfaceAddress,
    /// Creating accounts and management credentials.
    Credential,
    /// PSKs and the master encryption key.
    KeyMaterial,
    /// Static addressing of the AP itself.
    StaticIp,
}

impl SettleCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Wake => "wake",
            Self::InterfaceAddress => "interface_address",
            Self::Credential => "credential",
            Self::KeyMaterial => "key_material",
            Self::StaticIp => "static_ip",
        }
    }
}

/// Named timing presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SettlePreset {
    /// The timings the survey kit has always shipped with.
    #[default]
    Standard,
    /// Shorter default settle for fast consoles.
    Brisk,
    /// Longer interface re-addressing wait for slow firmware.
    Patient,
}

impl fmt::Display for SettlePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Standard => "standard",
            Self::Brisk => "brisk",
            Self::Patient => "patient",
        };
        f.write_str(name)
    }
}

impl FromStr for SettlePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "brisk" => Ok(Self::Brisk),
            "patient" => Ok(Self::Patient),
            other => Err(format!(
                "unknown timing preset '{}' (expected standard, brisk or patient)",
                other
            )),
        }
    }
}

/// Settle override for every command starting with `prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleOverride {
    pub prefix: String,
    pub settle_ms: u64,
}

/// Resolved settle table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlePolicy {
    pub default_ms: u64,
    pub wake_ms: u64,
    pub interface_address_ms: u64,
    pub credential_ms: u64,
    pub key_material_ms: u64,
    pub static_ip_ms: u64,
    /// Wait for the AP to rejoin the controller after `end`.
    pub association_wait_ms: u64,
    pub association_tick_ms: u64,
    /// Checked in order before the category table; first match wins.
    #[serde(default)]
    pub overrides: Vec<SettleOverride>,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self::preset(SettlePreset::Standard)
    }
}

impl SettlePolicy {
    pub fn preset(preset: SettlePreset) -> Self {
        let standard = Self {
            default_ms: 500,
            wake_ms: 1000,
            interface_address_ms: 3000,
            credential_ms: 1000,
            key_material_ms: 500,
            static_ip_ms: 1000,
            association_wait_ms: 71_000,
            association_tick_ms: 1000,
            overrides: Vec::new(),
        };
        match preset {
            SettlePreset::Standard => standard,
            SettlePreset::Brisk => Self {
                default_ms: 400,
                key_material_ms: 400,
                ..standard
            },
            SettlePreset::Patient => Self {
                interface_address_ms: 5000,
                ..standard
            },
        }
    }

    /// Settle for one category, ignoring prefix overrides.
    pub fn for_category(&self, category: SettleCategory) -> Duration {
        let ms = match category {
            SettleCategory::Default => self.default_ms,
            SettleCategory::Wake => self.wake_ms,
            SettleCategory::InterfaceAddress => self.interface_address_ms,
            SettleCategory::Credential => self.credential_ms,
            SettleCategory::KeyMaterial => self.key_material_ms,
            SettleCategory::StaticIp => self.static_ip_ms,
        };
        Duration::from_millis(ms)
    }

    /// Settle for a concrete command.
    pub fn settle_for(&self, category: SettleCategory, text: &str) -> Duration {
        // An empty prefix would match every line, including wake lines.
        self.overrides
            .iter()
            .find(|o| !o.prefix.is_empty() && text.starts_with(&o.prefix))
            .map(|o| Duration::from_millis(o.settle_ms))
            .unwrap_or_else(|| self.for_category(category))
    }

    pub fn association_wait(&self) -> Duration {
        Duration::from_millis(self.association_wait_ms)
    }

    /// Never zero, so a progress loop always terminates.
    pub fn association_tick(&self) -> Duration {
        Duration::from_millis(self.association_tick_ms.max(1))
    }
}

/// Partial timing adjustments layered over a preset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingOverrides {
    #[serde(default)]
    pub default_ms: Option<u64>,
    #[serde(default)]
    pub wake_ms: Option<u64>,
    #[serde(default)]
    pub interface_address_ms: Option<u64>,
    #[serde(default)]
    pub credential_ms: Option<u64>,
    #[serde(default)]
    pub key_material_ms: Option<u64>,
    #[serde(default)]
    pub static_ip_ms: Option<u64>,
    #[serde(default)]
    pub association_wait_ms: Option<u64>,
    #[serde(default)]
    pub association_tick_ms: Option<u64>,
    #[serde(default)]
    pub commands: Vec<SettleOverride>,
}

impl TimingOverrides {
    pub fn apply(&self, mut policy: SettlePolicy) -> SettlePolicy {
        let fields = [
            (self.default_ms, &mut policy.default_ms),
            (self.wake_ms, &mut policy.wake_ms),
            (self.interface_address_ms, &mut policy.interface_address_ms),
            (self.credential_ms, &mut policy.credential_ms),
            (self.key_material_ms, &mut policy.key_material_ms),
            (self.static_ip_ms, &mut policy.static_ip_ms),
            (self.association_wait_ms, &mut policy.association_wait_ms),
            (self.association_tick_ms, &mut policy.association_tick_ms),
        ];
        for (value, slot) in fields {
            if let Some(v) = value {
                *slot = v;
            }
        }
        policy.overrides.extend(self.commands.iter().cloned());
        policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_preset_matches_shipped_timings() {
        let p = SettlePolicy::preset(SettlePreset::Standard);
        assert_eq!(p.for_category(SettleCategory::Default), Duration::from_millis(500));
        assert_eq!(p.for_category(SettleCategory::Wake), Duration::from_secs(1));
        assert_eq!(p.for_category(SettleCategory::InterfaceAddress), Duration::from_secs(3));
        assert_eq!(p.for_category(SettleCategory::Credential), Duration::from_secs(1));
        assert_eq!(p.for_category(SettleCategory::StaticIp), Duration::from_secs(1));
        assert_eq!(p.association_wait(), Duration::from_secs(71));
    }

    #[test]
    fn test_presets_differ_only_where_intended() {
        let standard = SettlePolicy::preset(SettlePreset::Standard);
        let brisk = SettlePolicy::preset(SettlePreset::Brisk);
        let patient = SettlePolicy::preset(SettlePreset::Patient);
        assert_eq!(brisk.default_ms, 400);
        assert_eq!(brisk.interface_address_ms, standard.interface_address_ms);
        assert_eq!(patient.interface_address_ms, 5000);
        assert_eq!(patient.default_ms, standard.default_ms);
    }

    #[test]
    fn test_prefix_override_wins_over_category() {
        let mut p = SettlePolicy::default();
        p.overrides.push(SettleOverride {
            prefix: "write memory".into(),
            settle_ms: 4000,
        });
        assert_eq!(
            p.settle_for(SettleCategory::Default, "write memory"),
            Duration::from_secs(4)
        );
        assert_eq!(
            p.settle_for(SettleCategory::Default, "end"),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_empty_prefix_override_is_ignored() {
        let mut p = SettlePolicy::default();
        p.overrides.push(SettleOverride {
            prefix: String::new(),
            settle_ms: 9000,
        });
        assert_eq!(p.settle_for(SettleCategory::Wake, ""), Duration::from_secs(1));
    }

    #[test]
    fn test_timing_overrides_layer_over_preset() {
        let overrides: TimingOverrides = serde_json::from_str(
            r#"{"interfaceAddressMs": 4500, "commands": [{"prefix": "ap name", "settleMs": 800}]}"#,
        )
        .unwrap();
        let p = overrides.apply(SettlePolicy::preset(SettlePreset::Brisk));
        assert_eq!(p.interface_address_ms, 4500);
        assert_eq!(p.default_ms, 400);
        assert_eq!(
            p.settle_for(SettleCategory::Default, "ap name AP1 dot11 5ghz channel 36"),
            Duration::from_millis(800)
        );
    }

    #[test]
    fn test_preset_parses_case_insensitively() {
        assert_eq!("Patient".parse::<SettlePreset>().unwrap(), SettlePreset::Patient);
        assert!("sluggish".parse::<SettlePreset>().is_err());
        assert_eq!(SettlePreset::Brisk.to_string(), "brisk");
    }

    #[test]
    fn test_zero_tick_is_clamped() {
        let p = SettlePolicy {
            association_tick_ms: 0,
            ..SettlePolicy::default()
        };
        assert_eq!(p.association_tick(), Duration::from_millis(1));
    }
}
