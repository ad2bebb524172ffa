//! Input documents.
//!
//! `ProvisioningConfig` is the survey kit's JSON file describing the AP, the
//! controller and the WLANs to broadcast. `DriverSettings` is an optional
//! second document tuning how the console is driven (port parameters,
//! timing, script options, completion detection).
//!
//! Both are validated completely before a single byte reaches the console.

use crate::console::completion::CompletionMode;
use crate::console::error::{ProvisionError, ProvisionResult};
use crate::console::policy::{SettlePolicy, SettlePreset, TimingOverrides};
use crate::console::script::ScriptOptions;
use crate::console::types::PortConfig;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Provisioning document
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything needed to provision one survey AP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Console device path (e.g. `/dev/tty.AirConsole-68-raw-serial`).
    pub tty: String,
    pub ap: ApConfig,
    pub ewc: EwcConfig,
    /// Broadcast networks; position N (1-based) becomes WLAN id N.
    pub wlans: Vec<WlanConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApConfig {
    /// Base radio MAC as bare hex, e.g. `AABBCCDDEEFF`.
    pub mac: String,
    pub name: String,
    pub ip: String,
    pub netmask: String,
    pub gateway: String,
    /// The AP has a flexible (dual-band) radio slot.
    #[serde(deserialize_with = "deserialize_flag")]
    pub fra_ap: bool,
    #[serde(default)]
    pub band_24: Option<RadioSettings>,
    pub band_5: RadioSettings,
    #[serde(default)]
    pub band_fra: Option<RadioSettings>,
}

/// Channel and transmit power level for one radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioSettings {
    #[serde(deserialize_with = "deserialize_token")]
    pub channel: String,
    #[serde(alias = "tx-power", deserialize_with = "deserialize_token")]
    pub tx_power: String,
}

/// Embedded wireless controller identity and admin credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EwcConfig {
    pub name: String,
    pub ip: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WlanConfig {
    /// Profile name, reused as the policy profile name.
    pub name: String,
    pub ssid: String,
    /// `"5"` or `"2.4"` pins the WLAN to one band; anything else leaves both.
    #[serde(default, deserialize_with = "deserialize_opt_token")]
    pub band: Option<String>,
    pub psk: String,
}

/// Radio band a WLAN can be restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WlanBand {
    FiveGhz,
    TwoPointFourGhz,
}

impl WlanBand {
    /// IOS-XE radio keyword for the band.
    pub fn radio_keyword(&self) -> &'static str {
        match self {
            Self::FiveGhz => "dot11a",
            Self::TwoPointFourGhz => "dot11g",
        }
    }
}

impl WlanConfig {
    pub fn radio_band(&self) -> Option<WlanBand> {
        match self.band.as_deref().map(str::trim) {
            Some("5") => Some(WlanBand::FiveGhz),
            Some("2.4") => Some(WlanBand::TwoPointFourGhz),
            _ => None,
        }
    }
}

/// Factory name of an AP: `AP` followed by the MAC in dotted groups of four.
///
/// `AABBCCDDEEFF` becomes `APAABB.CCDD.EEFF`.
pub fn default_ap_name(mac: &str) -> ProvisionResult<String> {
    if mac.is_empty() {
        return Err(ProvisionError::config("ap.mac is empty"));
    }
    if !mac.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ProvisionError::config(format!(
            "ap.mac '{}' must contain hexadecimal digits only",
            mac
        )));
    }
    if mac.len() % 4 != 0 {
        return Err(ProvisionError::config(format!(
            "ap.mac '{}' has {} digits, expected a multiple of 4",
            mac,
            mac.len()
        )));
    }
    // ASCII-only at this point, so byte chunks are char chunks.
    let groups: Vec<&str> = mac
        .as_bytes()
        .chunks(4)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .collect();
    Ok(format!("AP{}", groups.join(".")))
}

impl ProvisioningConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> ProvisionResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> ProvisionResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Radio pair applied before the 5 GHz radio: dual-band on FRA models,
    /// 2.4 GHz otherwise.
    pub fn primary_radio(&self) -> Option<&RadioSettings> {
        if self.ap.fra_ap {
            self.ap.band_fra.as_ref()
        } else {
            self.ap.band_24.as_ref()
        }
    }

    /// Check every invariant the script generator relies on.
    ///
    /// All problems are reported together.
    pub fn validate(&self) -> ProvisionResult<()> {
        let mut problems: Vec<String> = Vec::new();

        self.collect_control_chars(&mut problems);

        if self.tty.trim().is_empty() {
            problems.push("tty is empty".into());
        }
        if let Err(ProvisionError::Configuration(msg)) = default_ap_name(&self.ap.mac) {
            problems.push(msg);
        }
        check_token("ap.name", &self.ap.name, &mut problems);
        check_token("ewc.name", &self.ewc.name, &mut problems);
        check_token("ewc.username", &self.ewc.username, &mut problems);
        // Never echo the password itself.
        if self.ewc.password.is_empty() {
            problems.push("ewc.password is empty".into());
        } else if self.ewc.password.chars().any(char::is_whitespace) {
            problems.push("ewc.password must not contain whitespace".into());
        }
        check_ipv4("ewc.ip", &self.ewc.ip, &mut problems);
        check_ipv4("ap.ip", &self.ap.ip, &mut problems);
        check_ipv4("ap.netmask", &self.ap.netmask, &mut problems);
        check_ipv4("ap.gateway", &self.ap.gateway, &mut problems);

        check_radio("ap.band_5", &self.ap.band_5, &mut problems);
        match (self.ap.fra_ap, self.primary_radio()) {
            (true, Some(radio)) => check_radio("ap.band_fra", radio, &mut problems),
            (false, Some(radio)) => check_radio("ap.band_24", radio, &mut problems),
            (true, None) => problems.push("ap.band_fra is required when ap.fra_ap is true".into()),
            (false, None) => problems.push("ap.band_24 is required when ap.fra_ap is false".into()),
        }

        if self.wlans.is_empty() {
            problems.push("wlans must contain at least one WLAN".into());
        }
        let mut seen = HashSet::new();
        for (i, wlan) in self.wlans.iter().enumerate() {
            let at = format!("wlans[{}]", i);
            check_token(&format!("{}.name", at), &wlan.name, &mut problems);
            if !wlan.name.is_empty() && !seen.insert(wlan.name.as_str()) {
                problems.push(format!("{}.name '{}' is used more than once", at, wlan.name));
            }
            if wlan.ssid.is_empty() {
                problems.push(format!("{}.ssid is empty", at));
            } else if wlan.ssid.contains('"') {
                problems.push(format!("{}.ssid must not contain '\"'", at));
            }
            let psk_len = wlan.psk.chars().count();
            if !(8..=63).contains(&psk_len) {
                problems.push(format!(
                    "{}.psk must be 8 to 63 characters, got {}",
                    at, psk_len
                ));
            }
            if let Some(band) = wlan.band.as_deref() {
                if wlan.radio_band().is_none() && !band.trim().is_empty() {
                    tracing::warn!(
                        wlan = %wlan.name,
                        band = %band,
                        "Unrecognised band, WLAN will broadcast on all radios"
                    );
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ProvisionError::Configuration(problems.join("; ")))
        }
    }

    fn collect_control_chars(&self, problems: &mut Vec<String>) {
        let mut fields: Vec<(String, &str)> = vec![
            ("tty".into(), self.tty.as_str()),
            ("ap.mac".into(), self.ap.mac.as_str()),
            ("ap.name".into(), self.ap.name.as_str()),
            ("ap.ip".into(), self.ap.ip.as_str()),
            ("ap.netmask".into(), self.ap.netmask.as_str()),
            ("ap.gateway".into(), self.ap.gateway.as_str()),
            ("ewc.name".into(), self.ewc.name.as_str()),
            ("ewc.ip".into(), self.ewc.ip.as_str()),
            ("ewc.username".into(), self.ewc.username.as_str()),
            ("ewc.password".into(), self.ewc.password.as_str()),
        ];
        for (i, wlan) in self.wlans.iter().enumerate() {
            fields.push((format!("wlans[{}].name", i), wlan.name.as_str()));
            fields.push((format!("wlans[{}].ssid", i), wlan.ssid.as_str()));
            fields.push((format!("wlans[{}].psk", i), wlan.psk.as_str()));
        }
        for (name, value) in fields {
            if value.chars().any(char::is_control) {
                problems.push(format!("{} contains control characters", name));
            }
        }
    }
}

fn check_token(field: &str, value: &str, problems: &mut Vec<String>) {
    if value.is_empty() {
        problems.push(format!("{} is empty", field));
    } else if value.chars().any(char::is_whitespace) {
        problems.push(format!("{} '{}' must not contain whitespace", field, value));
    }
}

fn check_ipv4(field: &str, value: &str, problems: &mut Vec<String>) {
    if value.parse::<Ipv4Addr>().is_err() {
        problems.push(format!("{} '{}' is not an IPv4 address", field, value));
    }
}

fn check_radio(field: &str, radio: &RadioSettings, problems: &mut Vec<String>) {
    check_token(&format!("{}.channel", field), &radio.channel, problems);
    check_token(&format!("{}.tx_power", field), &radio.tx_power, problems);
}

// ── Lenient scalar decoding ─────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn into_token(self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s,
        }
    }
}

/// Numbers and strings are both accepted where the device wants a token.
fn deserialize_token<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Scalar::deserialize(deserializer).map(Scalar::into_token)
}

fn deserialize_opt_token<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(Scalar::into_token))
}

/// Survey kit files write booleans as `"true"` / `"false"`.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Scalar::deserialize(deserializer)? {
        Scalar::Bool(b) => Ok(b),
        Scalar::Text(s) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
        Scalar::Text(s) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected true or false, got '{}'",
            other.into_token()
        ))),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Driver settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the console is driven. Every field is optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverSettings {
    #[serde(default)]
    pub port: PortConfig,
    #[serde(default)]
    pub preset: SettlePreset,
    #[serde(default)]
    pub timing: TimingOverrides,
    #[serde(default)]
    pub script: ScriptOptions,
    #[serde(default)]
    pub completion: CompletionMode,
}

impl DriverSettings {
    pub fn from_json(json: &str) -> ProvisionResult<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.completion.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> ProvisionResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Preset with the file's adjustments applied.
    pub fn settle_policy(&self) -> SettlePolicy {
        self.timing.apply(SettlePolicy::preset(self.preset))
    }

    /// Port parameters bound to the configured console device.
    pub fn port_for(&self, config: &ProvisioningConfig) -> PortConfig {
        PortConfig {
            port_name: config.tty.clone(),
            ..self.port.clone()
        }
    }
}
