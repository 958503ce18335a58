//! Bootstrap result contract, exercised through the public API
//!
//! The result file is the handoff to downstream stages; these tests pin the
//! round-trip and normalization laws across both encodings.

use std::fs;

use tempfile::TempDir;

use vcenter_vm_bootstrap_lib::domain::{BootstrapResult, DEFAULT_SSH_PORT};

fn reference_result() -> BootstrapResult {
    BootstrapResult {
        vm_name: "test-vm".to_string(),
        ip: "192.168.1.10".to_string(),
        ssh_user: "sysadmin".to_string(),
        ssh_key_path: "/home/op/.ssh/id_ed25519".to_string(),
        ssh_port: 2222,
        ssh_host_fingerprint: Some("SHA256:Yrn5dV3RUDjMJkmbsTrbS9Mgvws04k3fuTr0L9HzXHk".to_string()),
    }
}

#[test]
fn it_should_round_trip_yaml_and_json_identically() {
    let dir = TempDir::new().unwrap();
    let original = reference_result();

    for file_name in ["result.yaml", "result.yml", "result.json"] {
        let path = dir.path().join(file_name);
        original.save(&path).unwrap();
        let loaded = BootstrapResult::load(&path).unwrap();
        assert_eq!(loaded, original, "round trip via {file_name}");
    }
}

#[test]
fn it_should_normalize_a_missing_port_to_the_ssh_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("result.json");
    fs::write(
        &path,
        r#"{"vm_name":"test-vm","ip":"192.168.1.10","ssh_user":"sysadmin","ssh_key_path":"/k"}"#,
    )
    .unwrap();

    let loaded = BootstrapResult::load(&path).unwrap();
    assert_eq!(loaded.ssh_port, DEFAULT_SSH_PORT);
}

#[test]
fn it_should_refuse_to_save_what_it_would_refuse_to_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("result.yaml");

    let mut bad_fingerprint = reference_result();
    bad_fingerprint.ssh_host_fingerprint = Some("md5:abc".to_string());
    assert!(bad_fingerprint.save(&path).is_err());

    let mut missing_user = reference_result();
    missing_user.ssh_user.clear();
    assert!(missing_user.save(&path).is_err());

    assert!(!path.exists());
}
