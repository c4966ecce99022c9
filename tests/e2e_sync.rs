//! E2E tests for timestamp synchronization
//!
//! Two cameras run on their own clocks at different rates. These tests
//! check the unified timeline, drift and frame-drop accounting, artifact
//! masking and auxiliary metric alignment.

use pulsesync::config::SyncConfig;
use pulsesync::synth::{PulseWaveGenerator, StreamClock};
use pulsesync::sync::auxiliary::{AuxiliaryMetrics, AuxiliarySeries};
use pulsesync::sync::drift::{analyze_drift, build_artifact_mask};
use pulsesync::sync::timeline::sanitize;
use pulsesync::{TimestampSynchronizer, TimestampedSample};

fn constant(fps: f64, seconds: f64, offset_s: f64, value: f64) -> Vec<TimestampedSample> {
    (0..(seconds * fps) as usize)
        .map(|i| {
            let t = offset_s + i as f64 / fps;
            TimestampedSample::new((t * 1e9).round() as i64, value)
        })
        .collect()
}

/// Identical values at 30 and 60 fps resample to constant arrays
#[test]
fn test_constant_streams_stay_constant() {
    let a = constant(30.0, 10.0, 0.0, 3.5);
    let b = constant(60.0, 10.0, 0.0, 3.5);
    let series = TimestampSynchronizer::new(100.0).resample(&a, &b);

    assert!(series.is_valid);
    assert_eq!(series.values_a.len(), series.values_b.len());
    assert!(series.values_a.iter().all(|&v| (v - 3.5).abs() < 1e-12));
    assert!(series.values_b.iter().all(|&v| (v - 3.5).abs() < 1e-12));
}

/// Output length tracks the overlap duration times the target rate
#[test]
fn test_length_matches_overlap() {
    let a = constant(30.0, 10.0, 0.0, 1.0);
    let b = constant(60.0, 10.0, 0.5, 1.0);
    let series = TimestampSynchronizer::new(100.0).resample(&a, &b);

    let overlap_s = (a.last().unwrap().timestamp_ns - b[0].timestamp_ns) as f64 / 1e9;
    let expected = overlap_s * 100.0;
    assert!(
        (series.len() as f64 - expected).abs() <= 1.0,
        "len {} expected {:.1}",
        series.len(),
        expected
    );
    assert_eq!(series.timestamps_ns[0], b[0].timestamp_ns);
    assert!((series.duration_s() - overlap_s).abs() < 0.011);
}

#[test]
fn test_disjoint_streams_are_invalid() {
    let a = constant(30.0, 2.0, 0.0, 1.0);
    let b = constant(30.0, 2.0, 5.0, 1.0);
    let series = TimestampSynchronizer::new(100.0).resample(&a, &b);

    assert!(!series.is_valid);
    assert!(series.is_empty());
    assert!(series.message.is_some());
}

#[test]
fn test_empty_channel_is_invalid() {
    let a = constant(30.0, 2.0, 0.0, 1.0);
    let series = TimestampSynchronizer::new(100.0).resample(&a, &[]);
    assert!(!series.is_valid);
    assert!(series.message.unwrap().contains('B'));
}

/// Jittered capture still lands on the pulse waveform
#[test]
fn test_resampled_pulse_follows_waveform() {
    let gen = PulseWaveGenerator::new(72.0);
    let a = StreamClock::new(30.0)
        .with_jitter(1.0, 9)
        .capture(&mut gen.clone(), 10.0, 0.0);
    let b = StreamClock::new(60.0).capture(&mut gen.clone(), 10.0, 0.0);
    let series = TimestampSynchronizer::new(100.0).resample(&a, &b);

    // Linear interpolation of a 1.2 Hz sine at 60 fps stays close
    for (i, &t) in series.timestamps_ns.iter().enumerate() {
        let truth = gen.clean_value(t as f64 / 1e9);
        assert!((series.values_b[i] - truth).abs() < 0.02, "at {}", i);
    }
}

/// Identical clocks report no drift; a skewed clock reports its skew
#[test]
fn test_drift_measurement() {
    let config = SyncConfig::default();
    let a = StreamClock::new(50.0).capture(&mut PulseWaveGenerator::new(60.0), 20.0, 0.0);
    let b = StreamClock::new(50.0).capture(&mut PulseWaveGenerator::new(60.0), 20.0, 0.0);
    let report = analyze_drift(&a, &b, &config);
    assert!(report.drift_ms_per_second.abs() < 1.0);
    assert!(report.is_acceptable);
    assert!((report.channel_a.observed_rate_hz - 50.0).abs() < 0.01);

    // 2000 ppm fast clock: 2 ms of drift per second
    let skewed = StreamClock::new(50.0)
        .with_skew_ppm(2000.0)
        .capture(&mut PulseWaveGenerator::new(60.0), 20.0, 0.0);
    let report = analyze_drift(&a, &skewed, &config);
    assert!(
        (report.drift_ms_per_second - 2.0).abs() < 1.0,
        "drift {}",
        report.drift_ms_per_second
    );
    // Same clock, B joins 2 s late: a staggered start is not drift
    let late = StreamClock::new(30.0)
        .with_start_ns(2_000_000_000)
        .capture(&mut PulseWaveGenerator::new(60.0), 28.0, 0.0);
    let early = StreamClock::new(30.0).capture(&mut PulseWaveGenerator::new(60.0), 30.0, 0.0);
    let report = analyze_drift(&early, &late, &config);
    assert!(
        report.drift_ms_per_second.abs() < 1.0,
        "drift {}",
        report.drift_ms_per_second
    );
    assert!(report.is_acceptable);
}

/// Dropped frames are counted and a long outage is masked
#[test]
fn test_frame_drops_and_artifact_mask() {
    let config = SyncConfig::default();
    let mut a = constant(30.0, 20.0, 0.0, 1.0);
    // 3 s outage from 8 s to 11 s
    a.retain(|s| s.timestamp_ns < 8_000_000_000 || s.timestamp_ns >= 11_000_000_000);
    let b = constant(60.0, 20.0, 0.0, 1.0);

    let report = analyze_drift(&a, &b, &config);
    assert_eq!(report.channel_a.frame_drops, 1);
    assert_eq!(report.channel_b.frame_drops, 0);
    assert_eq!(report.total_frame_drops(), 1);

    let series = TimestampSynchronizer::new(100.0).resample_sorted(&a, &b);
    let mask = build_artifact_mask(&series.timestamps_ns, &report, None, &config);
    assert_eq!(mask.bad.len(), series.len());
    assert!(!mask.bad_windows.is_empty());
    // Grid index 950 is 9.5 s, inside the outage
    assert!(mask.is_bad(950));
    assert!(!mask.is_bad(100));
    assert!(!mask.is_bad(1800));
}

/// Out-of-order and repeated frames are sorted and deduplicated
#[test]
fn test_sanitize_counts() {
    let mut raw = constant(30.0, 1.0, 0.0, 1.0);
    raw.swap(3, 4);
    raw.push(raw[10]);
    let clean = sanitize(&raw);

    assert_eq!(clean.samples.len(), 30);
    assert_eq!(clean.duplicates, 1);
    assert!(clean.reordered >= 1);
    assert!(clean
        .samples
        .windows(2)
        .all(|w| w[0].timestamp_ns < w[1].timestamp_ns));
}

/// Motion metrics with and without their own timestamps
#[test]
fn test_auxiliary_alignment() {
    let a = constant(30.0, 10.0, 0.0, 1.0);
    let b = constant(60.0, 10.0, 0.0, 1.0);
    let series = TimestampSynchronizer::new(100.0).resample(&a, &b);
    let grid = &series.timestamps_ns;

    let metrics = AuxiliaryMetrics {
        motion_px: Some(AuxiliarySeries::timed(
            vec![0, 10_000_000_000],
            vec![0.0, 10.0],
        )),
        saturation: Some(AuxiliarySeries::untimed(vec![0.1, 0.3])),
        inertial_rms: None,
    };
    let aligned = metrics.align(grid);

    let motion = aligned.motion_px.unwrap();
    assert_eq!(motion.len(), grid.len());
    // Linear ramp: 1 px per second
    assert!((motion[500] - grid[500] as f64 / 1e9).abs() < 1e-9);

    let saturation = aligned.saturation.unwrap();
    assert_eq!(saturation.len(), grid.len());
    assert_eq!(saturation[0], 0.1);
    assert_eq!(*saturation.last().unwrap(), 0.3);
    assert!(aligned.inertial_rms.is_none());
}

/// Motion above the mask level marks the whole recording
#[test]
fn test_motion_drives_mask() {
    let config = SyncConfig::default();
    let a = constant(30.0, 10.0, 0.0, 1.0);
    let b = constant(60.0, 10.0, 0.0, 1.0);
    let series = TimestampSynchronizer::new(100.0).resample(&a, &b);
    let report = analyze_drift(&a, &b, &config);

    let still = vec![0.5; series.len()];
    let mask = build_artifact_mask(&series.timestamps_ns, &report, Some(&still), &config);
    assert_eq!(mask.total_bad_fraction(), 0.0);

    let shaking = vec![config.motion_mask_px * 2.0; series.len()];
    let mask = build_artifact_mask(&series.timestamps_ns, &report, Some(&shaking), &config);
    assert_eq!(mask.total_bad_fraction(), 1.0);
}
