//! Provisioning script generator.
//!
//! Turns a validated `ProvisioningConfig` into the exact ordered list of
//! console lines (and the one fixed pause) that bring a factory IOS-XE AP up
//! as a standalone embedded controller broadcasting the survey WLANs.
//! Output depends on nothing but the inputs.

use crate::console::config::{default_ap_name, ProvisioningConfig, RadioSettings};
use crate::console::error::{ProvisionError, ProvisionResult};
use crate::console::policy::{SettleCategory, SettlePolicy};
use crate::console::types::{Command, Pause, Step, MASK};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;

/// Controller management interface netmask; the EWC always sits on a /24.
const EWC_NETMASK: &str = "255.255.255.0";

const ASSOCIATION_REASON: &str = "Waiting for the AP to join the controller (it takes about 1min)";

/// Optional parts of the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptOptions {
    /// Empty lines sent first to flush the console after boot.
    #[serde(default = "default_wake_lines")]
    pub wake_lines: usize,
    #[serde(default = "default_true")]
    pub enable_netconf: bool,
    /// Extra empty line after the AP static-ip command.
    #[serde(default = "default_true")]
    pub static_ip_nudge: bool,
    /// Finish with `write memory`.
    #[serde(default = "default_true")]
    pub save_config: bool,
}

fn default_wake_lines() -> usize {
    2
}
fn default_true() -> bool {
    true
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            wake_lines: default_wake_lines(),
            enable_netconf: true,
            static_ip_nudge: true,
            save_config: true,
        }
    }
}

/// Ordered steps of one provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script {
    steps: Vec<Step>,
}

impl Script {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.steps.iter().filter_map(Step::as_command)
    }

    /// Raw command texts, secrets included.
    pub fn command_texts(&self) -> Vec<&str> {
        self.commands().map(|c| c.text.as_str()).collect()
    }

    pub fn command_count(&self) -> usize {
        self.commands().count()
    }

    /// Lower bound on wall time: every settle plus every pause.
    pub fn estimated_duration(&self) -> Duration {
        self.steps
            .iter()
            .map(|step| match step {
                Step::Send(cmd) => cmd.settle,
                Step::Pause(p) => p.duration,
            })
            .sum()
    }

    /// Human-readable plan with secrets masked.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut index = 0;
        for step in &self.steps {
            match step {
                Step::Send(cmd) => {
                    index += 1;
                    let text = if cmd.text.is_empty() {
                        "<empty line>"
                    } else {
                        cmd.display_text()
                    };
                    let _ = writeln!(
                        out,
                        "{:>3}  {:>5} ms  {:<17} {}",
                        index,
                        cmd.settle.as_millis(),
                        cmd.category.label(),
                        text
                    );
                }
                Step::Pause(p) => {
                    let _ = writeln!(
                        out,
                        "     pause {} s: {}",
                        p.duration.as_secs_f64(),
                        p.reason
                    );
                }
            }
        }
        let _ = writeln!(
            out,
            "{} commands, at least {:.1} s",
            index,
            self.estimated_duration().as_secs_f64()
        );
        out
    }
}

struct ScriptBuilder<'a> {
    policy: &'a SettlePolicy,
    steps: Vec<Step>,
}

impl<'a> ScriptBuilder<'a> {
    fn send(&mut self, text: impl Into<String>, category: SettleCategory) {
        let text = text.into();
        let settle = self.policy.settle_for(category, &text);
        self.steps.push(Step::Send(Command::new(text, settle, category)));
    }

    fn secret(&mut self, text: String, redacted: String, value: &str, category: SettleCategory) {
        // Overrides match the masked text.
        let settle = self.policy.settle_for(category, &redacted);
        let cmd = Command::secret(text, redacted, settle, category).hiding([value]);
        self.steps.push(Step::Send(cmd));
    }

    fn line(&mut self, text: &str) {
        self.send(text, SettleCategory::Default);
    }

    fn pause(&mut self, reason: &str, duration: Duration, tick: Duration) {
        self.steps.push(Step::Pause(Pause {
            reason: reason.to_string(),
            duration,
            tick,
        }));
    }

    fn radio_pair(&mut self, ap: &str, band: &str, radio: &RadioSettings) {
        self.line(&format!("ap name {} dot11 {} channel {}", ap, band, radio.channel));
        self.line(&format!("ap name {} dot11 {} txpower {}", ap, band, radio.tx_power));
    }
}

/// Generate the full provisioning script.
pub fn build_script(
    config: &ProvisioningConfig,
    policy: &SettlePolicy,
    options: &ScriptOptions,
) -> ProvisionResult<Script> {
    config.validate()?;
    let factory_name = default_ap_name(&config.ap.mac)?;
    let primary = config.primary_radio().ok_or_else(|| {
        ProvisionError::config("no radio settings for the AP's primary band")
    })?;
    let ap = config.ap.name.as_str();
    let ewc = &config.ewc;

    let mut b = ScriptBuilder {
        policy,
        steps: Vec::new(),
    };

    // Wake the console; the last empty line gets the long settle.
    for i in 0..options.wake_lines {
        let category = if i + 1 == options.wake_lines {
            SettleCategory::Wake
        } else {
            SettleCategory::Default
        };
        b.send("", category);
    }

    b.line("enable");
    b.line(&format!("ap name {} name {}", factory_name, ap));

    // Controller base configuration.
    b.line("conf t");
    b.line("line console 0");
    b.line("logging sync");
    b.line("exit");
    if options.enable_netconf {
        b.line("netconf-yang");
    }
    b.line(&format!("hostname {}", ewc.name));
    b.line("interface gigabitEthernet 0");
    b.send(
        format!("ip address {} {}", ewc.ip, EWC_NETMASK),
        SettleCategory::InterfaceAddress,
    );
    b.line("exit");

    b.secret(
        format!("username {} privilege 15 password {}", ewc.username, ewc.password),
        format!("username {} privilege 15 password {}", ewc.username, MASK),
        &ewc.password,
        SettleCategory::Credential,
    );

    // The AP profile is left implicitly by the next top-level command.
    b.line("ap profile default-ap-profile");
    b.secret(
        format!(
            "mgmtuser username {} password 0 {} secret 0 {}",
            ewc.username, ewc.password, ewc.password
        ),
        format!(
            "mgmtuser username {} password 0 {} secret 0 {}",
            ewc.username, MASK, MASK
        ),
        &ewc.password,
        SettleCategory::Credential,
    );

    for (i, wlan) in config.wlans.iter().enumerate() {
        b.line(&format!("wlan {} {} \"{}\"", wlan.name, i + 1, wlan.ssid));
        if let Some(band) = wlan.radio_band() {
            b.line(&format!("radio {}", band.radio_keyword()));
        }
        b.line("no security wpa akm dot1x");
        b.secret(
            format!("security wpa psk set-key ascii 0 {}", wlan.psk),
            format!("security wpa psk set-key ascii 0 {}", MASK),
            &wlan.psk,
            SettleCategory::KeyMaterial,
        );
        b.line("security wpa akm psk");
        b.line("no shutdown");
        b.line("exit");
    }

    for wlan in &config.wlans {
        b.line(&format!("wireless profile policy {}", wlan.name));
        b.line("no central association");
        b.line("no central dhcp");
        b.line("no central switching");
        b.line("http-tlv-caching");
        b.line("session-timeout 86400");
        b.line("no shutdown");
        b.line("exit");
    }

    b.line("wireless tag policy default-policy-tag");
    for wlan in &config.wlans {
        b.line(&format!("wlan {} policy {}", wlan.name, wlan.name));
    }
    b.line("exit");

    b.line("service password-encryption");
    b.line("password encryption aes");
    b.secret(
        format!("key config-key newpass {}", ewc.password),
        format!("key config-key newpass {}", MASK),
        &ewc.password,
        SettleCategory::KeyMaterial,
    );
    b.line("end");

    b.pause(
        ASSOCIATION_REASON,
        policy.association_wait(),
        policy.association_tick(),
    );

    let primary_band = if config.ap.fra_ap { "dual-band" } else { "24ghz" };
    b.radio_pair(ap, primary_band, primary);
    b.radio_pair(ap, "5ghz", &config.ap.band_5);

    b.send(
        format!(
            "ap name {} static-ip ip-address {} netmask {} gateway {}",
            ap, config.ap.ip, config.ap.netmask, config.ap.gateway
        ),
        SettleCategory::StaticIp,
    );
    if options.static_ip_nudge {
        b.line("");
    }

    if options.save_config {
        b.line("write memory");
    }

    Ok(Script { steps: b.steps })
}
