use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;

fn write_environment(dir: &Path) -> PathBuf {
    let path = dir.join("env.png");
    let pixels = vec![128u8; 8 * 4 * 4];
    image::save_buffer(&path, &pixels, 8, 4, image::ColorType::Rgba8).expect("write env");
    path
}

#[test]
fn summary_reports_the_inputs() {
    let dir = tempfile::tempdir().expect("temp dir");
    let env_path = write_environment(dir.path());

    let mut cmd = Command::cargo_bin("pbr-viewer").expect("binary exists");
    cmd.arg(&env_path).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Environment: 8x4 RGBM"))
        .stdout(contains("BRDF LUT: built-in"))
        .stdout(contains("Toggles: direct(false, false) indirect(true, false)"));
}

#[test]
fn settings_file_overrides_the_toggles() {
    let dir = tempfile::tempdir().expect("temp dir");
    let env_path = write_environment(dir.path());
    let settings_path = dir.path().join("settings.json");
    fs::write(
        &settings_path,
        r#"{ "direct_diffuse": true, "indirect_diffuse": false }"#,
    )
    .expect("write settings");

    let mut cmd = Command::cargo_bin("pbr-viewer").expect("binary exists");
    cmd.arg(&env_path)
        .arg("--settings")
        .arg(&settings_path)
        .arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Toggles: direct(true, false) indirect(false, false)"));
}

#[test]
fn missing_environment_argument_prints_usage() {
    let mut cmd = Command::cargo_bin("pbr-viewer").expect("binary exists");
    cmd.assert().failure().stderr(contains("Usage"));
}

#[test]
fn unknown_flags_are_rejected() {
    let mut cmd = Command::cargo_bin("pbr-viewer").expect("binary exists");
    cmd.arg("env.png").arg("--frobnicate");
    cmd.assert().failure().stderr(contains("Unknown argument"));
}
