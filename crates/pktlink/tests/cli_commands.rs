#![cfg(feature = "cli")]

use std::process::Command;

fn pktlink() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pktlink"))
}

#[test]
fn version_prints_package_version() {
    let output = pktlink().arg("version").output().expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("pktlink {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn version_extended_lists_provenance() {
    let output = pktlink()
        .arg("version")
        .arg("--extended")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("name: pktlink"));
    assert!(stdout.contains("target_os: "));
}

#[test]
fn crc_table_json_matches_reference() {
    let output = pktlink()
        .arg("--format")
        .arg("json")
        .arg("crc-table")
        .output()
        .expect("crc-table should run");

    assert!(output.status.success());
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("crc-table should emit json");
    assert_eq!(payload["polynomial"], 7);
    let table = payload["table"].as_array().expect("table should be an array");
    assert_eq!(table.len(), 256);
    assert_eq!(table[0], 0x00);
    assert_eq!(table[1], 0x07);
    assert_eq!(table[2], 0x0E);
    assert_eq!(table[255], 0xF3);
}

#[test]
fn crc_table_style_emits_source() {
    let output = pktlink()
        .arg("crc-table")
        .arg("--style")
        .arg("python")
        .output()
        .expect("crc-table should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("CRC8_POLYNOMIAL = 0x07"));
    assert!(stdout.contains("0x00, 0x07, 0x0e, 0x09,"));
}

#[test]
fn send_unknown_id_is_usage_error() {
    let output = pktlink()
        .arg("send")
        .arg("127.0.0.1:1")
        .arg("--id")
        .arg("9")
        .arg("--set")
        .arg("value=1")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown message id 0x09"));
}

#[test]
fn send_bad_value_is_data_error() {
    let output = pktlink()
        .arg("send")
        .arg("127.0.0.1:1")
        .arg("--id")
        .arg("1")
        .arg("--set")
        .arg("value=fast")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn missing_definitions_file_is_data_error() {
    let output = pktlink()
        .arg("watch")
        .arg("127.0.0.1:1")
        .arg("--definitions")
        .arg("/nonexistent/pktlink-defs.json")
        .output()
        .expect("watch should run");

    assert_eq!(output.status.code(), Some(60));
}
