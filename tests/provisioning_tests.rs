use apos_setup::console::completion::CompletionMode;
use apos_setup::console::config::{DriverSettings, ProvisioningConfig};
use apos_setup::console::error::ProvisionError;
use apos_setup::console::service::{plan, provision};
use apos_setup::console::transcript::{
    NullSink, TranscriptFormat, TranscriptSink, TranscriptWriter,
};
use apos_setup::console::transport::{ConsoleTransport, SimulatedTransport};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const SURVEY: &str = r#"{
    "tty": "/dev/tty.AirConsole-68-raw-serial",
    "ap": {
        "mac": "AABBCCDDEEFF",
        "name": "Survey-AP",
        "ip": "192.168.1.20",
        "netmask": "255.255.255.0",
        "gateway": "192.168.1.1",
        "fra_ap": "true",
        "band_24": {"channel": "1", "tx-power": "1"},
        "band_5": {"channel": "36", "tx-power": "1"},
        "band_fra": {"channel": "40", "tx-power": "2"}
    },
    "ewc": {"name": "EWC1", "ip": "10.0.0.5", "username": "admin", "password": "Survey123"},
    "wlans": [
        {"name": "Survey", "ssid": "SurveyNet", "band": "5", "psk": "abc12345"}
    ]
}"#;

fn survey() -> ProvisioningConfig {
    ProvisioningConfig::from_json(SURVEY).unwrap()
}

fn sink() -> Arc<dyn TranscriptSink> {
    Arc::new(NullSink)
}

fn expected_commands() -> Vec<&'static str> {
    vec![
        "",
        "",
        "enable",
        "ap name APAABB.CCDD.EEFF name Survey-AP",
        "conf t",
        "line console 0",
        "logging sync",
        "exit",
        "netconf-yang",
        "hostname EWC1",
        "interface gigabitEthernet 0",
        "ip address 10.0.0.5 255.255.255.0",
        "exit",
        "username admin privilege 15 password Survey123",
        "ap profile default-ap-profile",
        "mgmtuser username admin password 0 Survey123 secret 0 Survey123",
        "wlan Survey 1 \"SurveyNet\"",
        "radio dot11a",
        "no security wpa akm dot1x",
        "security wpa psk set-key ascii 0 abc12345",
        "security wpa akm psk",
        "no shutdown",
        "exit",
        "wireless profile policy Survey",
        "no central association",
        "no central dhcp",
        "no central switching",
        "http-tlv-caching",
        "session-timeout 86400",
        "no shutdown",
        "exit",
        "wireless tag policy default-policy-tag",
        "wlan Survey policy Survey",
        "exit",
        "service password-encryption",
        "password encryption aes",
        "key config-key newpass Survey123",
        "end",
        "ap name Survey-AP dot11 dual-band channel 40",
        "ap name Survey-AP dot11 dual-band txpower 2",
        "ap name Survey-AP dot11 5ghz channel 36",
        "ap name Survey-AP dot11 5ghz txpower 1",
        "ap name Survey-AP static-ip ip-address 192.168.1.20 netmask 255.255.255.0 gateway 192.168.1.1",
        "",
        "write memory",
    ]
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_survey_run() {
    let t = SimulatedTransport::ios_console("/dev/tty.AirConsole-68-raw-serial", "EWC1");
    let report = provision(&survey(), &DriverSettings::default(), t.clone(), sink())
        .await
        .unwrap();

    assert_eq!(t.written_lines().await, expected_commands());
    for write in t.writes().await {
        assert_eq!(write.last(), Some(&b'\r'));
        assert_eq!(write.iter().filter(|b| **b == b'\r').count(), 1);
    }

    // 27 s of settles plus the 71 s association wait.
    assert_eq!(report.elapsed, Duration::from_secs(98));
    assert_eq!(report.transcript.len(), expected_commands().len());
    assert!(report.transcript.output().ends_with("write memory\r\r\nEWC1#"));
    assert!(!t.is_open());
    assert_eq!(t.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transcript_masks_secrets() {
    let t = SimulatedTransport::new("/dev/ttyUSB0");
    let report = provision(&survey(), &DriverSettings::default(), t.clone(), sink())
        .await
        .unwrap();

    let commands = report.transcript.commands();
    assert!(commands.contains(&"username admin privilege 15 password *****"));
    assert!(commands.contains(&"key config-key newpass *****"));
    assert!(!commands.iter().any(|c| c.contains("Survey123")));
    assert!(!commands.iter().any(|c| c.contains("abc12345")));
}

#[tokio::test(start_paused = true)]
async fn test_echoed_secrets_are_masked_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.jsonl");
    let writer = TranscriptWriter::create(&path, TranscriptFormat::JsonLines).unwrap();
    let t = SimulatedTransport::ios_console("/dev/ttyUSB0", "EWC1");

    let report = provision(&survey(), &DriverSettings::default(), t.clone(), Arc::new(writer))
        .await
        .unwrap();

    // The device itself still received the real values.
    let sent = t.written_lines().await;
    assert!(sent.iter().any(|l| l.ends_with("password Survey123")));
    assert!(sent.iter().any(|l| l.ends_with("ascii 0 abc12345")));

    let output = report.transcript.output();
    assert!(output.contains("username admin privilege 15 password *****\r\r\nEWC1#"));
    assert!(!output.contains("Survey123"));
    assert!(!output.contains("abc12345"));

    let file = std::fs::read_to_string(&path).unwrap();
    assert_eq!(file.lines().count(), report.transcript.len());
    assert!(!file.contains("Survey123"));
    assert!(!file.contains("abc12345"));
}

#[tokio::test(start_paused = true)]
async fn test_each_command_waits_for_previous_settle() {
    let t = SimulatedTransport::new("/dev/ttyUSB0");
    let stamps: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = stamps.clone();
    t.set_responder(move |_| {
        recorded.lock().unwrap().push(Instant::now());
        Vec::new()
    });

    let settings = DriverSettings::default();
    let script = plan(&survey(), &settings).unwrap();
    provision(&survey(), &settings, t.clone(), sink()).await.unwrap();

    let stamps = stamps.lock().unwrap().clone();
    let settles: Vec<Duration> = script.commands().map(|c| c.settle).collect();
    assert_eq!(stamps.len(), settles.len());

    let end = script.command_texts().iter().position(|c| *c == "end").unwrap();
    for i in 1..stamps.len() {
        let gap = stamps[i] - stamps[i - 1];
        if i == end + 1 {
            assert_eq!(gap, settles[i - 1] + Duration::from_secs(71));
        } else {
            assert_eq!(gap, settles[i - 1], "gap before command {}", i + 1);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_at_k_aborts_remaining_sequence() {
    let total = expected_commands().len();
    for k in [1, 12, 38, 39, total] {
        let t = SimulatedTransport::ios_console("/dev/ttyUSB0", "EWC1");
        t.fail_write_at(k);
        let failure = provision(&survey(), &DriverSettings::default(), t.clone(), sink())
            .await
            .unwrap_err();

        match &failure.error {
            ProvisionError::TransportIo { index, command, .. } => {
                assert_eq!(*index, k);
                assert!(!command.contains("Survey123"));
            }
            other => panic!("unexpected error for k={}: {}", k, other),
        }
        assert_eq!(failure.transcript.len(), k - 1);
        assert_eq!(t.writes().await.len(), k - 1);
        assert!(!t.is_open());
        assert_eq!(t.close_count(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_read_failure_reports_in_flight_command() {
    let t = SimulatedTransport::ios_console("/dev/ttyUSB0", "EWC1");
    t.fail_read_at(3);
    let failure = provision(&survey(), &DriverSettings::default(), t.clone(), sink())
        .await
        .unwrap_err();
    assert_eq!(failure.error.failed_command_index(), Some(3));
    assert!(failure.error.to_string().contains("`enable`"));
    assert_eq!(failure.transcript.len(), 2);
    assert_eq!(t.close_count(), 1);
}

#[tokio::test]
async fn test_open_failure_is_reported_before_any_write() {
    let t = SimulatedTransport::new("/dev/tty.AirConsole-68-raw-serial");
    t.fail_open_with("No such file or directory");
    let failure = provision(&survey(), &DriverSettings::default(), t.clone(), sink())
        .await
        .unwrap_err();
    assert!(matches!(failure.error, ProvisionError::TransportOpen { .. }));
    assert!(failure
        .error
        .to_string()
        .contains("/dev/tty.AirConsole-68-raw-serial"));
    assert!(t.writes().await.is_empty());
}

#[tokio::test]
async fn test_configuration_errors_precede_transport() {
    let json = SURVEY.replace("AABBCCDDEEFF", "AABBCCDDEEF");
    let err = ProvisioningConfig::from_json(&json).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("multiple of 4"));

    let json = SURVEY.replace(r#""ip": "10.0.0.5", "#, "");
    assert!(ProvisioningConfig::from_json(&json)
        .unwrap_err()
        .is_configuration());

    let mut cfg = survey();
    cfg.wlans.clear();
    let t = SimulatedTransport::new("/dev/ttyUSB0");
    let failure = provision(&cfg, &DriverSettings::default(), t.clone(), sink())
        .await
        .unwrap_err();
    assert!(failure.error.is_configuration());
    assert_eq!(t.close_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_non_fra_ap_uses_24ghz_radio() {
    let json = SURVEY.replace(r#""fra_ap": "true""#, r#""fra_ap": "false""#);
    let cfg = ProvisioningConfig::from_json(&json).unwrap();
    let t = SimulatedTransport::new("/dev/ttyUSB0");
    provision(&cfg, &DriverSettings::default(), t.clone(), sink())
        .await
        .unwrap();

    let lines = t.written_lines().await;
    let end = lines.iter().position(|l| l == "end").unwrap();
    assert_eq!(
        &lines[end + 1..end + 5],
        &[
            "ap name Survey-AP dot11 24ghz channel 1",
            "ap name Survey-AP dot11 24ghz txpower 1",
            "ap name Survey-AP dot11 5ghz channel 36",
            "ap name Survey-AP dot11 5ghz txpower 1",
        ]
    );
    assert!(!lines.iter().any(|l| l.contains("dual-band")));
}

#[tokio::test(start_paused = true)]
async fn test_settings_change_timing_not_commands() {
    let settings = DriverSettings::from_json(
        r#"{
            "preset": "brisk",
            "timing": {"associationWaitMs": 5000, "commands": [{"prefix": "write memory", "settleMs": 4000}]},
            "port": {"lineEnding": "crLf"}
        }"#,
    )
    .unwrap();
    let default_plan = plan(&survey(), &DriverSettings::default()).unwrap();
    let tuned_plan = plan(&survey(), &settings).unwrap();
    assert_eq!(default_plan.command_texts(), tuned_plan.command_texts());
    assert_eq!(
        tuned_plan.commands().last().unwrap().settle,
        Duration::from_secs(4)
    );

    let t = SimulatedTransport::new("/dev/ttyUSB0");
    let report = provision(&survey(), &settings, t.clone(), sink())
        .await
        .unwrap();
    assert_eq!(report.elapsed, tuned_plan.estimated_duration());
    assert!(t.writes().await.iter().all(|w| w.ends_with(b"\r\n")));
}

#[tokio::test(start_paused = true)]
async fn test_prompt_match_finishes_early() {
    let settings = DriverSettings {
        completion: CompletionMode::Prompt {
            pattern: r"[>#]\s*$".into(),
            poll_ms: 50,
        },
        ..DriverSettings::default()
    };
    let t = SimulatedTransport::ios_console("/dev/ttyUSB0", "EWC1");
    let report = provision(&survey(), &settings, t.clone(), sink())
        .await
        .unwrap();
    assert_eq!(t.written_lines().await, expected_commands());
    // Every command returns on the first poll; only the association wait is fixed.
    let commands = expected_commands().len() as u32;
    assert_eq!(
        report.elapsed,
        Duration::from_secs(71) + Duration::from_millis(50) * commands
    );
}

#[test]
fn test_plan_is_deterministic() {
    let settings = DriverSettings::default();
    let a = plan(&survey(), &settings).unwrap();
    let b = plan(&survey(), &settings).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.command_texts(), expected_commands());
}
