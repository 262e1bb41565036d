use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn base_config(temp: &TempDir) -> Value {
    json!({
        "fileRead": temp.path().join("raw.h5"),
        "fileSave": temp.path().join("out/fit.h5"),
        "sample": "steel",
        "dataset": "d",
        "scanNumber": [3, 4],
        "nameHorizontalDetector": "mca1",
        "nameVerticalDetector": "mca2",
        "positioners": ["x", "y"],
        "nbPeaksInBoxes": [2, 1],
        "rangeFitHD": [100, 300, 400, 500],
        "rangeFitVD": [110, 310, 410, 510]
    })
}

#[test]
fn validate_lists_selected_scans() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config_path = temp.path().join("config.json");
    write_config(&config_path, &base_config(&temp));

    let output = run_cli(&["validate", config_path.to_str().expect("utf-8 path")]);

    assert!(
        output.status.success(),
        "validate should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Configuration OK: 2 box(es), 3 peak(s) per detector"));
    assert!(stdout.contains("Scan steel_d_3.1"));
    assert!(stdout.contains("Scan steel_d_4.1"));
    assert!(
        !temp.path().join("out").exists(),
        "validate must not create the output file"
    );
}

#[test]
fn scan_override_replaces_configured_selection() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config_path = temp.path().join("config.json");
    write_config(&config_path, &base_config(&temp));

    let output = run_cli(&[
        "validate",
        config_path.to_str().expect("utf-8 path"),
        "--scan",
        "7:9",
    ]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Scan steel_d_7.1"));
    assert!(stdout.contains("Scan steel_d_8.1"));
    assert!(!stdout.contains("Scan steel_d_9.1"));
    assert!(!stdout.contains("Scan steel_d_3.1"));
}

#[test]
fn malformed_scan_number_exits_with_configuration_code() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config_path = temp.path().join("config.json");
    let mut config = base_config(&temp);
    config["scanNumber"] = json!("three");
    write_config(&config_path, &config);

    let output = run_cli(&["validate", config_path.to_str().expect("utf-8 path")]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: [INPUT.SCAN_NUMBER]"), "stderr: {stderr}");
    assert!(stderr.contains("FATAL EXIT CODE: 2"), "stderr: {stderr}");
}

#[test]
fn inconsistent_box_ranges_are_rejected() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config_path = temp.path().join("config.json");
    let mut config = base_config(&temp);
    config["rangeFitVD"] = json!([110, 310]);
    write_config(&config_path, &config);

    let output = run_cli(&["validate", config_path.to_str().expect("utf-8 path")]);

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("INPUT.FIT_RANGE"));
}

#[test]
fn missing_config_file_exits_with_configuration_code() {
    let temp = TempDir::new().expect("tempdir should be created");
    let missing = temp.path().join("absent.json");

    let output = run_cli(&["validate", missing.to_str().expect("utf-8 path")]);

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("INPUT.CONFIG_READ"));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let output = run_cli(&["validate", "--frobnicate"]);

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("INPUT.CLI_USAGE"));
}

#[cfg(not(feature = "hdf5"))]
#[test]
fn fit_without_hdf5_support_exits_with_storage_code() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config_path = temp.path().join("config.json");
    write_config(&config_path, &base_config(&temp));

    let output = run_cli(&["fit", config_path.to_str().expect("utf-8 path")]);

    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("STORE.HDF5_UNAVAILABLE"));
}

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fit-edd"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("fit-edd should run")
}

fn write_config(path: &Path, config: &Value) {
    let rendered = serde_json::to_string_pretty(config).expect("config should serialize");
    fs::write(path, rendered).expect("config should be written");
}
