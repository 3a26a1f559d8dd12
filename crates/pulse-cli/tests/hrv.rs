use assert_cmd::cargo::cargo_bin_cmd;
use serde::Deserialize;
use std::{error::Error, path::PathBuf};

#[derive(Deserialize)]
struct HrvTimeOutput {
    n: usize,
    avnn: f64,
    sdnn: f64,
    rmssd: f64,
}

#[derive(Deserialize)]
struct HrvOutput {
    hrv: HrvTimeOutput,
    lfia: Option<f64>,
    hfia: Option<f64>,
    heart_rate_bpm: Option<i64>,
}

fn rr_path() -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .join("test_data/rri_sample.txt")
        .to_string_lossy()
        .to_string()
}

#[test]
fn hrv_command_reports_proxies() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["hrv", "--input", &rr_path()]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let value: HrvOutput = serde_json::from_slice(&out)?;
    assert_eq!(value.hrv.n, 10);
    assert!((value.hrv.avnn - 821.7).abs() < 1e-9);
    assert!(value.hrv.sdnn > 0.0 && value.hrv.rmssd > value.hrv.sdnn);
    let lfia = value.lfia.expect("lfia");
    let hfia = value.hfia.expect("hfia");
    assert!((10.0..=60.0).contains(&lfia));
    assert!((5.0..=50.0).contains(&hfia));
    // the last five intervals average to 821 ms
    assert_eq!(value.heart_rate_bpm, Some(73));
    Ok(())
}

#[test]
fn hrv_command_without_enough_intervals() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.arg("hrv").write_stdin("800\n810\n790\n");
    let out = cmd.assert().success().get_output().stdout.clone();
    let value: HrvOutput = serde_json::from_slice(&out)?;
    assert_eq!(value.hrv.n, 3);
    assert!(value.lfia.is_none());
    assert!(value.hfia.is_none());
    Ok(())
}
