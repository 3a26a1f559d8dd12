use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use pulse_lib::{
    config::PipelineConfig,
    io::{csv as csv_io, text as text_io},
    metrics::hrv::{heart_rate_bpm, hrv_time, rri_amplitude_proxies, HRVTime},
    metrics::stress::{substitute_defaults, StressQuadrant},
    pipeline::PpgPipeline,
    signal::Sample,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::{
    f64::consts::PI,
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

/// Capture rate of synthetic streams.
const SIMULATED_FS: f64 = 30.0;
/// Respiratory rate used to modulate synthetic streams.
const BREATH_HZ: f64 = 0.25;

#[derive(Parser)]
#[command(
    name = "pulse",
    version,
    about = "Streaming PPG analysis: band amplitudes, beats and stress state"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed `value,timestamp_ms` samples through the pipeline and print the final state
    Replay {
        #[arg(long)]
        input: Option<PathBuf>,
        /// Partial TOML pipeline configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Sample time between analysis cycles (overrides the config)
        #[arg(long)]
        analysis_interval_ms: Option<i64>,
        /// Print the session summary instead of the last snapshot
        #[arg(long)]
        summary: bool,
    },
    /// Write a synthetic 30 Hz PPG stream as CSV
    Simulate {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 60.0)]
        seconds: f64,
        #[arg(long, default_value_t = 72.0)]
        bpm: f64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Peak amplitude of uniform noise added to each sample
        #[arg(long, default_value_t = 1.0)]
        noise: f64,
    },
    /// Time-domain HRV and amplitude proxies from newline-delimited RR intervals (ms)
    Hrv {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 8)]
        min_intervals: usize,
    },
    /// Print the stress quadrant of an (LFiA, HFiA) pair
    Classify {
        #[arg(long, allow_negative_numbers = true)]
        lfia: f64,
        #[arg(long, allow_negative_numbers = true)]
        hfia: f64,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Replay {
            input,
            config,
            analysis_interval_ms,
            summary,
        } => cmd_replay(
            input.as_deref(),
            config.as_deref(),
            analysis_interval_ms,
            summary,
        )?,
        Commands::Simulate {
            out,
            seconds,
            bpm,
            seed,
            noise,
        } => cmd_simulate(&out, seconds, bpm, seed, noise)?,
        Commands::Hrv {
            input,
            min_intervals,
        } => cmd_hrv(input.as_deref(), min_intervals)?,
        Commands::Classify { lfia, hfia } => cmd_classify(lfia, hfia),
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}

fn read_samples(input: Option<&Path>) -> Result<Vec<Sample>> {
    match input {
        Some(path) => csv_io::read_samples_path(path),
        None => csv_io::read_samples(io::stdin().lock()),
    }
}

fn cmd_replay(
    input: Option<&Path>,
    config: Option<&Path>,
    analysis_interval_ms: Option<i64>,
    summary: bool,
) -> Result<()> {
    let mut cfg = load_config(config)?;
    if let Some(interval) = analysis_interval_ms {
        cfg.analysis_interval_ms = interval;
    }
    let interval = cfg.analysis_interval_ms.max(1);
    let mut pipeline = PpgPipeline::new(cfg).context("invalid pipeline configuration")?;
    let samples = read_samples(input)?;
    info!("replaying {} samples", samples.len());

    let mut last_analysis = None;
    for sample in &samples {
        pipeline.ingest(sample.value, sample.timestamp_ms);
        let start = *last_analysis.get_or_insert(sample.timestamp_ms);
        if sample.timestamp_ms.saturating_sub(start) >= interval {
            pipeline.analyze();
            last_analysis = Some(sample.timestamp_ms);
        }
    }
    pipeline.analyze();

    let js = if summary {
        serde_json::to_string(&pipeline.finish())?
    } else {
        serde_json::to_string(&pipeline.snapshot())?
    };
    println!("{}", js);
    Ok(())
}

/// Systolic peak plus a smaller diastolic wave, `phase` in [0, 1).
fn pulse_shape(phase: f64) -> f64 {
    let systolic = (-((phase - 0.2) / 0.08).powi(2)).exp();
    let diastolic = 0.4 * (-((phase - 0.45) / 0.1).powi(2)).exp();
    systolic + diastolic
}

fn simulate_samples(seconds: f64, bpm: f64, seed: u64, noise: f64) -> Result<Vec<Sample>> {
    if !(seconds > 0.0 && seconds.is_finite()) {
        anyhow::bail!("--seconds must be positive, got {}", seconds);
    }
    if !(bpm > 0.0 && bpm.is_finite()) {
        anyhow::bail!("--bpm must be positive, got {}", bpm);
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let n = (seconds * SIMULATED_FS).round() as usize;
    let base_period = 60.0 / bpm;
    let noise = noise.abs();
    let mut phase = 0.0_f64;
    let mut samples = Vec::with_capacity(n);
    for i in 0..n {
        let t = i as f64 / SIMULATED_FS;
        let breath = (2.0 * PI * BREATH_HZ * t).sin();
        // respiratory sinus arrhythmia: beats speed up on inspiration
        let period = base_period * (1.0 - 0.05 * breath);
        phase = (phase + 1.0 / (SIMULATED_FS * period)).fract();
        let jitter = if noise > 0.0 {
            rng.gen_range(-noise..=noise)
        } else {
            0.0
        };
        let pulse = 40.0 * (1.0 + 0.15 * breath) * pulse_shape(phase);
        let value = 140.0 + 4.0 * breath + pulse + jitter;
        let timestamp_ms = (i as f64 * 1000.0 / SIMULATED_FS).round() as i64;
        samples.push(Sample::new(value.clamp(0.0, 255.0), timestamp_ms));
    }
    Ok(samples)
}

fn cmd_simulate(out: &Path, seconds: f64, bpm: f64, seed: u64, noise: f64) -> Result<()> {
    let samples = simulate_samples(seconds, bpm, seed, noise)?;
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    csv_io::write_samples_path(out, &samples)?;
    info!("wrote {} samples to {}", samples.len(), out.display());
    Ok(())
}

#[derive(Serialize)]
struct HrvReport {
    hrv: HRVTime,
    lfia: Option<f64>,
    hfia: Option<f64>,
    heart_rate_bpm: Option<i64>,
}

fn cmd_hrv(input: Option<&Path>, min_intervals: usize) -> Result<()> {
    let rr = match input {
        Some(path) => text_io::read_rri_series(path)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_rri_series(&buf)?
        }
    };
    let proxies = rri_amplitude_proxies(&rr, min_intervals).and_then(|o| o.computed());
    let report = HrvReport {
        hrv: hrv_time(&rr),
        lfia: proxies.map(|p| p.lfia),
        hfia: proxies.map(|p| p.hfia),
        heart_rate_bpm: heart_rate_bpm(&rr),
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn cmd_classify(lfia: f64, hfia: f64) {
    let (lfia, hfia) = substitute_defaults(Some(lfia), Some(hfia));
    println!("{}", StressQuadrant::classify(lfia, hfia).label());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_stream_is_seeded_and_clipped() {
        let a = simulate_samples(5.0, 72.0, 7, 3.0).expect("simulate");
        let b = simulate_samples(5.0, 72.0, 7, 3.0).expect("simulate");
        assert_eq!(a, b);
        assert_eq!(a.len(), 150);
        assert_eq!(a[30].timestamp_ms, 1000);
        assert!(a.iter().all(|s| (0.0..=255.0).contains(&s.value)));
        let c = simulate_samples(5.0, 72.0, 8, 3.0).expect("simulate");
        assert_ne!(a, c);
    }

    #[test]
    fn simulate_rejects_bad_arguments() {
        assert!(simulate_samples(0.0, 72.0, 0, 1.0).is_err());
        assert!(simulate_samples(10.0, -1.0, 0, 1.0).is_err());
    }

    #[test]
    fn pulse_shape_peaks_at_systole() {
        assert!(pulse_shape(0.2) > pulse_shape(0.45));
        assert!(pulse_shape(0.45) > pulse_shape(0.8));
    }
}
