//! E2E tests for the full PTT pipeline
//!
//! Raw timestamped samples in, one `PipelineReport` out. Covers the two
//! reference scenarios (clean delayed sine, empty input) and realistic
//! synthetic sessions with mixed frame rates, jitter, drops and noise.

use pulsesync::consensus::LagMethod;
use pulsesync::sync::auxiliary::{AuxiliaryMetrics, AuxiliarySeries};
use pulsesync::synth::SyntheticSession;
use pulsesync::{PipelineConfig, PipelineReport, PttPipeline, SessionInput, TimestampedSample};
use std::f64::consts::PI;

fn sine(delay_s: f64, fps: f64, seconds: f64) -> Vec<TimestampedSample> {
    (0..(seconds * fps) as usize)
        .map(|i| {
            let t = i as f64 / fps;
            let v = 120.0 + (2.0 * PI * 1.2 * (t - delay_s)).sin();
            TimestampedSample::new((t * 1e9).round() as i64, v)
        })
        .collect()
}

/// 1.2 Hz sine, B delayed by 100 ms, 30 s at 100 Hz, no noise
#[test]
fn test_reference_delayed_sine() {
    let input = SessionInput::new(sine(0.0, 100.0, 30.0), sine(0.1, 100.0, 30.0));
    let mut pipeline = PttPipeline::new(PipelineConfig::default()).unwrap();
    let report = pipeline.process(&input);

    assert!(report.series.is_valid);
    assert!(report.ptt.is_valid, "{:?}", report.ptt.message);
    assert!(
        (report.ptt.lag_ms - 100.0).abs() < 5.0,
        "lag {}",
        report.ptt.lag_ms
    );
    assert!(report.ptt.reportable, "{:?}", report.ptt.message);
    assert!(!report.ptt.methods_disagree);
    assert_eq!(report.ptt.methods.len(), 2);
    assert!(report.ptt.beat_count >= 30);
}

/// Two empty streams: invalid series, invalid result, no panic
#[test]
fn test_reference_empty_streams() {
    let mut pipeline = PttPipeline::default();
    let report = pipeline.process(&SessionInput::new(Vec::new(), Vec::new()));

    assert!(!report.series.is_valid);
    assert!(!report.ptt.is_valid);
    assert!(!report.ptt.reportable);
    assert!(report.ptt.message.is_some());
    assert!(!report.is_valid());
}

/// 30 fps face against 60 fps finger with 2 ms timestamp jitter
#[test]
fn test_mixed_rate_jittered_session() {
    let input = SyntheticSession {
        lag_ms: 120.0,
        noise_std: 0.05,
        ..Default::default()
    }
    .generate();
    let report = PttPipeline::default().process(&input);

    assert!(report.is_valid(), "{:?}", report.ptt.message);
    assert!(
        (report.ptt.lag_ms - 120.0).abs() < 10.0,
        "lag {}",
        report.ptt.lag_ms
    );
    assert!((report.drift.channel_a.observed_rate_hz - 30.0).abs() < 0.5);
    assert!((report.drift.channel_b.observed_rate_hz - 60.0).abs() < 0.5);
    assert!(report.harmonics_a.is_valid);
    assert!((report.harmonics_a.heart_rate_bpm - 72.0).abs() < 3.0);
}

/// Every method contributes and the estimates agree
#[test]
fn test_methods_agree_on_clean_session() {
    let input = SyntheticSession {
        jitter_ms: 0.0,
        ..Default::default()
    }
    .generate();
    let report = PttPipeline::default().process(&input);

    let corr = report
        .ptt
        .methods
        .iter()
        .find(|m| m.method == LagMethod::Correlation)
        .expect("correlation contributes");
    let foot = report
        .ptt
        .methods
        .iter()
        .find(|m| m.method == LagMethod::FootToFoot)
        .expect("foot-to-foot contributes");
    assert!((corr.lag_ms - foot.lag_ms).abs() < 20.0);
    assert!(report.ptt.agreement_ms < 20.0);
    assert!(report.foot_to_foot.is_valid);
}

/// Noise lowers confidence without collapsing the estimate
#[test]
fn test_noise_lowers_confidence() {
    let run = |noise_std: f64| -> PipelineReport {
        let input = SyntheticSession {
            noise_std,
            ..Default::default()
        }
        .generate();
        PttPipeline::default().process(&input)
    };
    let clean = run(0.0);
    let noisy = run(0.8);

    assert!(noisy.ptt.confidence < clean.ptt.confidence);
    assert!(noisy.quality_a.score < clean.quality_a.score);
    assert!(noisy.ptt.is_valid);
    assert!((noisy.ptt.lag_ms - 100.0).abs() < 20.0, "lag {}", noisy.ptt.lag_ms);
}

/// Frame drops are counted without breaking the measurement
#[test]
fn test_frame_drops_tolerated() {
    let input = SyntheticSession {
        drop_probability: 0.02,
        ..Default::default()
    }
    .generate();
    let report = PttPipeline::default().process(&input);

    assert!(report.drift.total_frame_drops() > 0);
    assert!(report.is_valid());
    assert!((report.ptt.lag_ms - 100.0).abs() < 10.0, "lag {}", report.ptt.lag_ms);
}

/// Strong motion on one channel lowers its score and masks the timeline
#[test]
fn test_motion_on_face_channel() {
    let session = SyntheticSession::default();
    let input = session.generate();
    let frames = input.channel_a.len();
    let motion = AuxiliaryMetrics {
        motion_px: Some(AuxiliarySeries::untimed(vec![20.0; frames])),
        ..Default::default()
    };
    let input = input.with_auxiliary(motion, AuxiliaryMetrics::default());
    let report = PttPipeline::default().process(&input);

    assert!(report.quality_a.motion_penalty.unwrap() > 99.0);
    assert!(report.quality_b.motion_penalty.is_none());
    assert!(report.artifact_mask.total_bad_fraction() > 0.9);
    assert_eq!(report.foot_to_foot.pair_count, 0);
    assert!(!report.ptt.reportable);
    assert!(!report.lag.is_valid);
    assert!(report.ptt.message.as_deref().unwrap().contains("masked"));
}

/// Shaking on both sites for the whole session
#[test]
fn test_full_motion_is_never_reportable() {
    let input = SyntheticSession::default().generate();
    let shaking = |frames: usize| AuxiliaryMetrics {
        motion_px: Some(AuxiliarySeries::untimed(vec![50.0; frames])),
        ..Default::default()
    };
    let (a, b) = (input.channel_a.len(), input.channel_b.len());
    let input = input.with_auxiliary(shaking(a), shaking(b));
    let report = PttPipeline::default().process(&input);

    assert_eq!(report.artifact_mask.total_bad_fraction(), 1.0);
    assert_eq!(report.lag_window, (0, 0));
    assert!(!report.ptt.reportable);
}

/// A staggered start on identical clocks keeps the session reportable
#[test]
fn test_late_finger_channel_is_not_drift() {
    let a = sine(0.0, 100.0, 32.0);
    let b: Vec<TimestampedSample> = sine(0.1, 100.0, 32.0).split_off(200);
    let report = PttPipeline::default().process(&SessionInput::new(a, b));

    assert!(report.drift.is_acceptable, "drift {}", report.drift.drift_ms_per_second);
    assert!(report.ptt.reportable, "{:?}", report.ptt.message);
    assert!((report.ptt.lag_ms - 100.0).abs() < 5.0, "lag {}", report.ptt.lag_ms);
}

/// Sample order on the wire does not matter
#[test]
fn test_shuffled_input_matches_sorted() {
    let a = sine(0.0, 100.0, 20.0);
    let b = sine(0.1, 100.0, 20.0);
    let mut shuffled = a.clone();
    shuffled.reverse();

    let sorted = PttPipeline::default().process(&SessionInput::new(a, b.clone()));
    let reversed = PttPipeline::default().process(&SessionInput::new(shuffled, b));
    assert_eq!(sorted.series.values_a, reversed.series.values_a);
    assert!((sorted.ptt.lag_ms - reversed.ptt.lag_ms).abs() < 1e-9);
    assert!(reversed.drift.channel_a.reordered > 0);
}

/// Reports serialize for export collaborators
#[test]
fn test_report_json_round_trip() {
    let input = SessionInput::new(sine(0.0, 100.0, 20.0), sine(0.08, 100.0, 20.0));
    let report = PttPipeline::default().process(&input);

    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"generated_at\""));
    let back: PipelineReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back.ptt.reportable, report.ptt.reportable);
    assert_eq!(back.ptt.methods.len(), report.ptt.methods.len());
    assert!((back.ptt.lag_ms - report.ptt.lag_ms).abs() < 1e-9);
    assert_eq!(back.series.len(), report.series.len());
}
