//! End-to-end runs of the `bess-sizing` binary.

mod common;

use std::path::Path;
use std::process::{Command, Output};

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_bess-sizing"))
        .args(args)
        .output()
        .expect("bess-sizing process should run")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "bess-sizing failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

#[test]
fn simulate_writes_telemetry_and_json() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("dispatch.csv");
    let json = dir.path().join("result.json");

    let out = stdout(&run(&[
        "simulate",
        "--synthetic",
        "3",
        "--capacity-kwh",
        "500",
        "--power-kw",
        "250",
        "--threshold-kw",
        "600",
        "--telemetry-out",
        path_arg(&csv),
        "--json",
        path_arg(&json),
    ]));
    assert!(out.contains("--- Dispatch KPIs ---"));

    let telemetry = std::fs::read_to_string(&csv).unwrap();
    assert_eq!(
        telemetry.lines().next(),
        Some("index,timestamp,load_kw,net_load_kw,battery_kw,soc_kwh")
    );
    assert_eq!(telemetry.lines().count(), 3 * 96 + 1);

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(value["threshold_kw"], 600.0);
}

#[test]
fn select_reads_catalog_and_preset() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = dir.path().join("catalog.toml");
    std::fs::write(&catalog, common::POWERBLOCK_TOML).unwrap();

    let out = stdout(&run(&[
        "select",
        "--synthetic",
        "14",
        "--preset",
        "lenient",
        "--catalog",
        path_arg(&catalog),
        "--demand-rate",
        "20",
        "--target",
        "15",
    ]));
    assert!(out.contains("--- Battery Selection ---"));
    assert!(out.contains("PowerBlock 250"));
}

#[test]
fn unknown_preset_fails() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = dir.path().join("catalog.toml");
    std::fs::write(&catalog, common::POWERBLOCK_TOML).unwrap();

    let output = run(&[
        "select",
        "--synthetic",
        "2",
        "--preset",
        "reckless",
        "--catalog",
        path_arg(&catalog),
        "--demand-rate",
        "20",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown preset"));
}

#[test]
fn invalid_config_file_is_reported_per_field() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("engine.toml");
    std::fs::write(&config, "[search]\ntolerance_kw = -1.0\n").unwrap();

    let output = run(&[
        "caps",
        "--synthetic",
        "2",
        "--config",
        path_arg(&config),
        "--capacity-kwh",
        "100",
        "--power-kw",
        "50",
        "--demand-rate",
        "20",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("search.tolerance_kw"));
}

#[test]
fn option_s_compares_paths() {
    let out = stdout(&run(&[
        "option-s",
        "--synthetic",
        "7",
        "--capacity-kwh",
        "500",
        "--power-kw",
        "250",
        "--threshold-kw",
        "600",
        "--mode",
        "window-threshold",
    ]));
    assert!(out.contains("--- Demand Charges ---"));
    assert!(out.contains("Better path"));
}
