use crate::config::{PipelineConfig, Tunables};
use crate::detectors::ppg::{BeatEvent, PeakDetector, PeakDetectorConfig};
use crate::envelope::{instantaneous_amplitude, EnvelopeParams};
use crate::error::{ConfigError, Outcome};
use crate::filters::{BandSignals, FilterBank};
use crate::metrics::hrv::{heart_rate_bpm, rri_amplitude_proxies};
use crate::metrics::sqi::{evaluate_sqi, SQIResult};
use crate::metrics::stress::{substitute_defaults, StressQuadrant, HF_CENTER, LF_CENTER};
use crate::normalize::AmplitudeNormalizer;
use crate::preprocess::display_trace;
use crate::session::{FrameRateTracker, MeasurementTimer, SessionRecorder, SessionSummary};
use crate::signal::{Sample, SampleWindow};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What one analysis cycle refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisCycle {
    pub bands_updated: bool,
    pub amplitudes_updated: bool,
    pub stress: StressQuadrant,
}

/// Everything the presentation side reads after a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub values: Vec<f64>,
    pub timestamps: Vec<i64>,
    pub display_trace: Vec<f64>,
    pub lf: Vec<f64>,
    pub hf: Vec<f64>,
    pub lfia: Vec<f64>,
    pub hfia: Vec<f64>,
    pub latest_lfia: f64,
    pub latest_hfia: f64,
    pub heart_rate_bpm: Option<i64>,
    pub rri: Vec<f64>,
    pub beat_count: usize,
    pub stress: StressQuadrant,
    pub stress_label: String,
    pub sqi: SQIResult,
    pub fps: Option<i64>,
    pub remaining_seconds: u64,
    pub complete: bool,
}

/// Streaming PPG pipeline: raw samples in, band amplitudes, beats and
/// stress state out.
#[derive(Debug, Clone)]
pub struct PpgPipeline {
    cfg: PipelineConfig,
    window: SampleWindow,
    filters: FilterBank,
    lf_normalizer: AmplitudeNormalizer,
    hf_normalizer: AmplitudeNormalizer,
    detector: PeakDetector,
    bands: BandSignals,
    lfia: VecDeque<f64>,
    hfia: VecDeque<f64>,
    heart_rate: Option<i64>,
    frame_rate: FrameRateTracker,
    timer: MeasurementTimer,
    recorder: SessionRecorder,
}

impl PpgPipeline {
    pub fn new(cfg: PipelineConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        debug!(
            "pipeline at {} Hz, window {}, LF {:?} Hz, HF {:?} Hz, filter mode {:?}",
            cfg.sample_rate_hz, cfg.max_window_size, cfg.lf_band, cfg.hf_band, cfg.filter_mode
        );
        Ok(Self {
            window: SampleWindow::with_capacity(cfg.max_window_size),
            filters: FilterBank::new(cfg.lf_band, cfg.hf_band, cfg.sample_rate_hz, cfg.filter_mode),
            lf_normalizer: AmplitudeNormalizer::lf(),
            hf_normalizer: AmplitudeNormalizer::hf(),
            detector: PeakDetector::new(PeakDetectorConfig::from(&cfg)),
            bands: BandSignals::default(),
            lfia: VecDeque::with_capacity(cfg.max_window_size),
            hfia: VecDeque::with_capacity(cfg.max_window_size),
            heart_rate: None,
            frame_rate: FrameRateTracker::new(),
            timer: MeasurementTimer::new(cfg.measure_seconds),
            recorder: SessionRecorder::new(),
            cfg,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Accept one pre-validated sample and run beat detection on the window.
    pub fn ingest(&mut self, value: f64, timestamp_ms: i64) -> Option<BeatEvent> {
        self.window.push(Sample::new(value, timestamp_ms));
        self.frame_rate.record(timestamp_ms);
        self.timer.observe(timestamp_ms);

        let values = self.window.values();
        let timestamps = self.window.timestamps();
        let event = self.detector.evaluate(&values, &timestamps)?;
        if event.rri_ms.is_some() {
            let rri = self.detector.rri_series();
            if let Some(bpm) = heart_rate_bpm(&rri) {
                self.heart_rate = Some(bpm);
            }
            self.append_rri_proxies();
        }
        Some(event)
    }

    fn append_rri_proxies(&mut self) {
        let rri = self.detector.rri_series();
        match rri_amplitude_proxies(&rri, self.cfg.hrv_min_intervals) {
            None => {}
            Some(Outcome::Computed(proxies)) => {
                debug!(
                    "RRI proxies lfia {:.2} hfia {:.2} (sdnn {:.1}, rmssd {:.1})",
                    proxies.lfia, proxies.hfia, proxies.hrv.sdnn, proxies.hrv.rmssd
                );
                self.push_amplitudes(proxies.lfia, proxies.hfia);
            }
            Some(Outcome::Fallback(reason)) => {
                warn!("RRI amplitude proxies fell back: {}", reason);
                self.push_amplitudes(LF_CENTER, HF_CENTER);
                self.lfia.iter_mut().for_each(|v| *v = LF_CENTER);
                self.hfia.iter_mut().for_each(|v| *v = HF_CENTER);
            }
        }
    }

    fn push_amplitudes(&mut self, lfia: f64, hfia: f64) {
        let cap = self.cfg.max_window_size;
        for (buffer, value) in [(&mut self.lfia, lfia), (&mut self.hfia, hfia)] {
            buffer.push_back(value);
            while buffer.len() > cap {
                buffer.pop_front();
            }
        }
    }

    /// One advanced-analysis cycle over the current window.
    pub fn analyze(&mut self) -> AnalysisCycle {
        let mut cycle = AnalysisCycle {
            bands_updated: false,
            amplitudes_updated: false,
            stress: self.stress(),
        };
        if self.window.len() < self.cfg.min_analysis_samples {
            debug!(
                "{} samples buffered, band analysis waits for {}",
                self.window.len(),
                self.cfg.min_analysis_samples
            );
            return cycle;
        }

        self.bands = self.filters.split(&self.window.values());
        cycle.bands_updated = true;

        let params = EnvelopeParams {
            window: self.cfg.envelope_window_size,
            smoothing: self.cfg.smoothing_window_size,
            averaging: self.cfg.averaging_window_size,
        };
        let needed = params.min_samples();
        if self.bands.lf.len() >= needed && self.bands.hf.len() >= needed {
            let lf_env = instantaneous_amplitude(&self.bands.lf, &params);
            let hf_env = instantaneous_amplitude(&self.bands.hf, &params);
            let lfia = normalize_band(&mut self.lf_normalizer, &lf_env, "LF");
            let hfia = normalize_band(&mut self.hf_normalizer, &hf_env, "HF");
            self.lfia = lfia.into();
            self.hfia = hfia.into();
            cycle.amplitudes_updated = true;
        } else {
            debug!(
                "band signals hold {} samples, envelope needs {}",
                self.bands.lf.len(),
                needed
            );
        }

        if let (Some(&lfia), Some(&hfia)) = (self.lfia.back(), self.hfia.back()) {
            self.recorder.record_amplitudes(lfia, hfia);
        }
        if let Some(bpm) = self.heart_rate {
            self.recorder.record_heart_rate(bpm);
        }
        self.recorder.record_bands(&self.bands);
        cycle.stress = self.stress();
        cycle
    }

    /// Swap runtime parameters; effective from the next computation.
    pub fn apply_tunables(&mut self, tunables: &Tunables) -> Result<(), ConfigError> {
        let mut cfg = self.cfg.clone();
        cfg.set_tunables(tunables);
        cfg.validate()?;
        self.detector.set_config(PeakDetectorConfig::from(&cfg));
        self.cfg = cfg;
        debug!("tunables applied: {:?}", tunables);
        Ok(())
    }

    /// Clear every buffer and all filter, normaliser and detector state.
    pub fn reset(&mut self) {
        self.window.clear();
        self.filters.reset();
        self.lf_normalizer.reset();
        self.hf_normalizer.reset();
        self.detector.reset();
        self.bands = BandSignals::default();
        self.lfia.clear();
        self.hfia.clear();
        self.heart_rate = None;
        self.frame_rate.reset();
        self.timer.reset();
        self.recorder.reset();
        info!("pipeline reset");
    }

    /// Close the session: summarise it, then reset.
    pub fn finish(&mut self) -> SessionSummary {
        let summary = self
            .recorder
            .summarize(self.detector.beat_count(), &self.detector.rri_series());
        info!(
            "session finished: {} beats, {} RR intervals, {}",
            summary.beat_count, summary.rri_count, summary.stress_label
        );
        self.reset();
        summary
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn bands(&self) -> &BandSignals {
        &self.bands
    }

    pub fn lfia(&self) -> Vec<f64> {
        self.lfia.iter().copied().collect()
    }

    pub fn hfia(&self) -> Vec<f64> {
        self.hfia.iter().copied().collect()
    }

    /// Latest amplitudes with the classifier defaults substituted.
    pub fn latest_amplitudes(&self) -> (f64, f64) {
        substitute_defaults(self.lfia.back().copied(), self.hfia.back().copied())
    }

    pub fn heart_rate(&self) -> Option<i64> {
        self.heart_rate
    }

    pub fn beat_count(&self) -> usize {
        self.detector.beat_count()
    }

    pub fn stress(&self) -> StressQuadrant {
        let (lfia, hfia) = self.latest_amplitudes();
        StressQuadrant::classify(lfia, hfia)
    }

    pub fn filters_at_rest(&self) -> bool {
        self.filters.is_at_rest()
    }

    /// Whether the measurement duration has elapsed in sample time.
    pub fn is_complete(&self) -> bool {
        self.window
            .last()
            .is_some_and(|s| self.timer.is_complete(s.timestamp_ms))
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        let values = self.window.values();
        let rri = self.detector.rri_series();
        let (latest_lfia, latest_hfia) = self.latest_amplitudes();
        let stress = StressQuadrant::classify(latest_lfia, latest_hfia);
        let now_ms = self.window.last().map(|s| s.timestamp_ms);
        PipelineSnapshot {
            display_trace: display_trace(&values),
            sqi: evaluate_sqi(&values, &rri, self.cfg.saturation_level),
            timestamps: self.window.timestamps(),
            values,
            lf: self.bands.lf.clone(),
            hf: self.bands.hf.clone(),
            lfia: self.lfia(),
            hfia: self.hfia(),
            latest_lfia,
            latest_hfia,
            heart_rate_bpm: self.heart_rate,
            rri: rri.rr,
            beat_count: self.detector.beat_count(),
            stress,
            stress_label: stress.label().to_string(),
            fps: self.frame_rate.fps(),
            remaining_seconds: self.timer.remaining_seconds(now_ms.unwrap_or(0)),
            complete: self.is_complete(),
        }
    }
}

fn normalize_band(
    normalizer: &mut AmplitudeNormalizer,
    envelope: &[f64],
    band: &str,
) -> Vec<f64> {
    match normalizer.normalize(envelope) {
        Outcome::Computed(values) => values,
        Outcome::Fallback(reason) => {
            warn!("{} normalisation fell back: {}", band, reason);
            normalizer.fallback_buffer(envelope.len())
        }
    }
}

/// A pipeline shared between threads; every call is one critical section.
#[derive(Debug, Clone)]
pub struct SharedPipeline {
    inner: Arc<Mutex<PpgPipeline>>,
}

impl SharedPipeline {
    pub fn new(pipeline: PpgPipeline) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pipeline)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PpgPipeline> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ingest(&self, value: f64, timestamp_ms: i64) -> Option<BeatEvent> {
        self.lock().ingest(value, timestamp_ms)
    }

    pub fn analyze(&self) -> AnalysisCycle {
        self.lock().analyze()
    }

    pub fn apply_tunables(&self, tunables: &Tunables) -> Result<(), ConfigError> {
        self.lock().apply_tunables(tunables)
    }

    pub fn reset(&self) {
        self.lock().reset()
    }

    pub fn finish(&self) -> SessionSummary {
        self.lock().finish()
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        self.lock().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterMode;
    use std::f64::consts::PI;
    use std::thread;

    /// 30 Hz pulse at `beat_hz` with a slow respiratory swing.
    fn pulse(seconds: usize, beat_hz: f64) -> Vec<(f64, i64)> {
        (0..seconds * 30)
            .map(|i| {
                let t = i as f64 / 30.0;
                let breath = 1.0 + 0.2 * (2.0 * PI * 0.25 * t).sin();
                let value = 150.0 + 20.0 * breath * (2.0 * PI * beat_hz * t + 0.3).sin();
                (value, i as i64 * 1000 / 30)
            })
            .collect()
    }

    fn run(pipeline: &mut PpgPipeline, samples: &[(f64, i64)]) {
        for (i, &(value, ts)) in samples.iter().enumerate() {
            pipeline.ingest(value, ts);
            if (i + 1) % 30 == 0 {
                pipeline.analyze();
            }
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = PipelineConfig {
            envelope_window_size: 0,
            ..PipelineConfig::default()
        };
        assert!(PpgPipeline::new(cfg).is_err());
    }

    #[test]
    fn analysis_waits_for_enough_samples() {
        let mut pipeline = PpgPipeline::new(PipelineConfig::default()).expect("pipeline");
        for (value, ts) in pulse(1, 1.0).into_iter().take(29) {
            pipeline.ingest(value, ts);
        }
        let cycle = pipeline.analyze();
        assert!(!cycle.bands_updated);
        assert!(pipeline.bands().lf.is_empty());
        // no amplitudes yet: classifier runs on the defaults
        assert_eq!(pipeline.latest_amplitudes(), (30.0, 25.0));
        assert_eq!(cycle.stress, StressQuadrant::LightMentalStress);
    }

    #[test]
    fn steady_pulse_produces_bounded_amplitudes_and_heart_rate() {
        let mut pipeline = PpgPipeline::new(PipelineConfig::default()).expect("pipeline");
        run(&mut pipeline, &pulse(20, 1.0));
        let snapshot = pipeline.snapshot();

        assert_eq!(snapshot.values.len(), 300);
        assert_eq!(snapshot.values.len(), snapshot.timestamps.len());
        assert_eq!(snapshot.lf.len(), 300);
        assert_eq!(snapshot.hf.len(), 300);
        assert_eq!(snapshot.lfia.len(), 300);
        assert!(snapshot.lfia.iter().all(|v| (0.0..=60.0).contains(v)));
        assert!(snapshot.hfia.iter().all(|v| (0.0..=50.0).contains(v)));
        assert_eq!(snapshot.heart_rate_bpm, Some(60));
        assert!(snapshot.rri.iter().all(|r| (300.0..=1500.0).contains(r)));
        assert!(snapshot.beat_count >= 15);
        assert_eq!(snapshot.fps, Some(30));
        assert_eq!(snapshot.display_trace.len(), 300);
        assert!(snapshot.sqi.is_acceptable());
        assert_eq!(
            snapshot.stress,
            StressQuadrant::classify(snapshot.latest_lfia, snapshot.latest_hfia)
        );
        assert_eq!(snapshot.remaining_seconds, 41);
    }

    #[test]
    fn rri_proxies_fill_amplitudes_before_band_path() {
        let cfg = PipelineConfig {
            min_analysis_samples: 300,
            max_window_size: 300,
            ..PipelineConfig::default()
        };
        let mut pipeline = PpgPipeline::new(cfg).expect("pipeline");
        // ten 1 Hz beats, one sample short of a full window
        for (value, ts) in pulse(10, 1.0).into_iter().take(299) {
            pipeline.ingest(value, ts);
        }
        assert!(!pipeline.analyze().bands_updated);
        let lfia = pipeline.lfia();
        assert!(!lfia.is_empty());
        assert!(lfia.iter().all(|v| (10.0..=60.0).contains(v)));
        assert!(pipeline.hfia().iter().all(|v| (5.0..=50.0).contains(v)));
    }

    #[test]
    fn short_bands_keep_previous_amplitudes() {
        let cfg = PipelineConfig {
            max_window_size: 45,
            min_analysis_samples: 30,
            envelope_window_size: 30,
            ..PipelineConfig::default()
        };
        let mut pipeline = PpgPipeline::new(cfg).expect("pipeline");
        for (value, ts) in pulse(15, 1.0) {
            pipeline.ingest(value, ts);
        }
        let before = (pipeline.lfia(), pipeline.hfia());
        assert!(!before.0.is_empty(), "RRI proxies should seed the amplitudes");

        // 45 band samples: enough to filter, short of the 60 the envelope needs
        let cycle = pipeline.analyze();
        assert!(cycle.bands_updated);
        assert!(!cycle.amplitudes_updated);
        assert_eq!(pipeline.bands().lf.len(), 45);
        assert_eq!(pipeline.bands().hf.len(), 45);
        assert_eq!((pipeline.lfia(), pipeline.hfia()), before);
    }

    #[test]
    fn extreme_duration_and_timestamps_do_not_panic() {
        let cfg = PipelineConfig {
            measure_seconds: u64::MAX,
            ..PipelineConfig::default()
        };
        let mut pipeline = PpgPipeline::new(cfg).expect("pipeline");
        pipeline.ingest(100.0, 0);
        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.remaining_seconds, (i64::MAX as u64).div_ceil(1000));
        assert!(!snapshot.complete);

        let mut pipeline = PpgPipeline::new(PipelineConfig::default()).expect("pipeline");
        pipeline.ingest(100.0, i64::MIN);
        pipeline.ingest(101.0, i64::MAX);
        pipeline.analyze();
        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.timestamps, vec![i64::MIN, i64::MAX]);
        assert_eq!(snapshot.remaining_seconds, 0);
        assert!(snapshot.complete);
    }

    #[test]
    fn reset_then_replay_is_deterministic() {
        for mode in [FilterMode::Stateless, FilterMode::Carry] {
            let cfg = PipelineConfig {
                filter_mode: mode,
                ..PipelineConfig::default()
            };
            let mut pipeline = PpgPipeline::new(cfg).expect("pipeline");
            let samples = pulse(15, 1.2);
            run(&mut pipeline, &samples);
            let first = serde_json::to_string(&pipeline.snapshot()).expect("serialize");

            pipeline.reset();
            assert!(pipeline.is_empty());
            assert!(pipeline.filters_at_rest());
            assert_eq!(pipeline.beat_count(), 0);
            assert!(pipeline.lfia().is_empty());

            run(&mut pipeline, &samples);
            let second = serde_json::to_string(&pipeline.snapshot()).expect("serialize");
            assert_eq!(first, second, "mode {:?}", mode);
        }
    }

    #[test]
    fn tunables_apply_without_reset() {
        let mut pipeline = PpgPipeline::new(PipelineConfig::default()).expect("pipeline");
        run(&mut pipeline, &pulse(5, 1.0));
        let beats = pipeline.beat_count();
        let tunables = Tunables {
            envelope_window_size: 10,
            min_peak_distance_ms: 400,
            ..Tunables::default()
        };
        pipeline.apply_tunables(&tunables).expect("valid tunables");
        assert_eq!(pipeline.beat_count(), beats);
        assert_eq!(pipeline.config().envelope_window_size, 10);

        let bad = Tunables {
            peak_threshold_percent: 0.0,
            ..Tunables::default()
        };
        assert!(pipeline.apply_tunables(&bad).is_err());
        assert_eq!(pipeline.config().envelope_window_size, 10);
    }

    #[test]
    fn finish_summarises_and_clears() {
        let mut pipeline = PpgPipeline::new(PipelineConfig::default()).expect("pipeline");
        run(&mut pipeline, &pulse(20, 1.0));
        let beats = pipeline.beat_count();
        let summary = pipeline.finish();
        assert_eq!(summary.beat_count, beats);
        assert!(summary.rri_count > 0);
        assert!((summary.mean_heart_rate - 60.0).abs() < 1.0);
        assert!(summary.lf_hf_ratio > 0.0);
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.heart_rate(), None);
    }

    #[test]
    fn shared_pipeline_accepts_samples_from_threads() {
        let shared = SharedPipeline::new(
            PpgPipeline::new(PipelineConfig::default()).expect("pipeline"),
        );
        let samples = pulse(4, 1.0);
        let producer = {
            let shared = shared.clone();
            thread::spawn(move || {
                for (value, ts) in samples {
                    shared.ingest(value, ts);
                }
            })
        };
        producer.join().expect("producer thread");
        shared.analyze();
        let snapshot = shared.snapshot();
        assert_eq!(snapshot.values.len(), 120);
        assert!(!snapshot.lf.is_empty());
        shared.reset();
        assert!(shared.snapshot().values.is_empty());
    }
}
