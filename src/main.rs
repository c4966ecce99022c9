//! Pulsesync - PTT estimation from two PPG streams
//!
//! Runs the timing engine on a synthetic face/finger session, either as one
//! batch window or live with two capture threads feeding ring buffers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use pulsesync::config::{self, PipelineConfig};
use pulsesync::synth::SyntheticSession;
use pulsesync::{Channel, PipelineReport, PttPipeline, QualityMonitor, SampleRing, TimestampedSample};
use tracing::{error, info};

/// Parsed command line
#[derive(Debug)]
struct Options {
    session: SyntheticSession,
    config_path: Option<PathBuf>,
    dump_config: Option<PathBuf>,
    live: bool,
    json: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pulsesync=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(options) = parse_args(&args)? else {
        return Ok(());
    };

    let config = match &options.config_path {
        Some(path) => config::load(path),
        None => PipelineConfig::default(),
    };
    if let Some(path) = &options.dump_config {
        config::save(&config, path)?;
        println!("Config written to {}", path.display());
    }

    let mut pipeline = match PttPipeline::new(config.clone()) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "config_rejected");
            bail!("invalid configuration: {}", e);
        }
    };

    let report = if options.live {
        run_live(&options.session, &config, &mut pipeline)?
    } else {
        info!(
            duration_s = options.session.duration_s,
            lag_ms = options.session.lag_ms,
            "batch_session_started"
        );
        pipeline.process(&options.session.generate())
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// `Ok(None)` when the invocation was fully handled (help, version)
fn parse_args(args: &[String]) -> Result<Option<Options>> {
    let mut options = Options {
        session: SyntheticSession::default(),
        config_path: None,
        dump_config: None,
        live: false,
        json: false,
    };

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            "--version" | "-v" => {
                println!("pulsesync {}", pulsesync::VERSION);
                return Ok(None);
            }
            "--duration" | "-d" => {
                options.session.duration_s = parse_number(flag, take_value(args, &mut i, flag)?)?
            }
            "--lag-ms" => {
                options.session.lag_ms = parse_number(flag, take_value(args, &mut i, flag)?)?
            }
            "--heart-rate" => {
                options.session.heart_rate_bpm = parse_number(flag, take_value(args, &mut i, flag)?)?
            }
            "--noise" => {
                options.session.noise_std = parse_number(flag, take_value(args, &mut i, flag)?)?
            }
            "--config" | "-c" => {
                options.config_path = Some(PathBuf::from(take_value(args, &mut i, flag)?))
            }
            "--dump-config" => {
                options.dump_config = Some(PathBuf::from(take_value(args, &mut i, flag)?))
            }
            "--live" => options.live = true,
            "--json" => options.json = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                print_help();
                return Ok(None);
            }
        }
        i += 1;
    }

    if options.session.duration_s <= 0.0 {
        bail!("--duration must be positive");
    }
    Ok(Some(options))
}

/// Advance past `flag` and return its value
fn take_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str> {
    *i += 1;
    match args.get(*i) {
        Some(v) => Ok(v.as_str()),
        None => bail!("{} requires a value", flag),
    }
}

fn parse_number(flag: &str, raw: &str) -> Result<f64> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => bail!("invalid value for {}: {}", flag, raw),
    }
}

fn print_help() {
    println!("Usage: pulsesync [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -d, --duration SECONDS  Session length (default: 30)");
    println!("      --lag-ms MS         Injected face-to-finger delay (default: 100)");
    println!("      --heart-rate BPM    Synthetic heart rate (default: 72)");
    println!("      --noise STD         Gaussian noise on both channels (default: 0)");
    println!("  -c, --config PATH       Load pipeline config from JSON");
    println!("      --dump-config PATH  Write the effective config as JSON");
    println!("      --live              Stream in real time with capture threads");
    println!("      --json              Print the full report as JSON");
    println!("  -v, --version           Show version");
    println!("  -h, --help              Show this help");
    println!();
    println!("Examples:");
    println!("  pulsesync --lag-ms 120 --noise 0.2");
    println!("  pulsesync --live --duration 20");
}

/// Stream a session through two capture threads, printing quality updates
fn run_live(
    session: &SyntheticSession,
    config: &PipelineConfig,
    pipeline: &mut PttPipeline,
) -> Result<PipelineReport> {
    let capacity = (session.duration_s * session.fps_a.max(session.fps_b) * 1.2).ceil() as usize;
    let mut monitor = QualityMonitor::with_rings(
        Arc::new(SampleRing::new(capacity)),
        Arc::new(SampleRing::new(capacity)),
        config,
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .ok();

    let updates = monitor.subscribe(8);
    let printer = thread::spawn(move || {
        for update in updates.iter() {
            println!(
                "SQI face: {:>5.1} | finger: {:>5.1} | samples: {:>5}",
                update.quality_a.score, update.quality_b.score, update.samples
            );
        }
    });

    let start = Instant::now();
    let producers = [Channel::A, Channel::B].map(|channel| {
        let ring = monitor.ring(channel);
        let running = running.clone();
        let session = session.clone();
        thread::spawn(move || capture(channel, &session, &ring, &running, start))
    });

    println!("Streaming {:.0} s session. Press Ctrl+C to stop.", session.duration_s);
    while running.load(Ordering::SeqCst) && producers.iter().any(|p| !p.is_finished()) {
        monitor.emit(Instant::now());
        thread::sleep(Duration::from_millis(50));
    }
    running.store(false, Ordering::SeqCst);
    for producer in producers {
        if producer.join().is_err() {
            error!("capture_thread_panicked");
        }
    }

    let report = pipeline.process_rings(
        &monitor.ring(Channel::A),
        &monitor.ring(Channel::B),
        session.duration_s,
    );
    // Dropping the monitor closes the subscriber channel
    drop(monitor);
    if printer.join().is_err() {
        error!("printer_thread_panicked");
    }
    Ok(report)
}

/// Replay one channel's frames at their capture times
fn capture(
    channel: Channel,
    session: &SyntheticSession,
    ring: &SampleRing,
    running: &AtomicBool,
    start: Instant,
) {
    let (fps, seed, delay_s) = match channel {
        Channel::A => (session.fps_a, session.seed, 0.0),
        Channel::B => (session.fps_b, session.seed.wrapping_add(1), session.lag_ms / 1000.0),
    };
    let mut generator = session.generator(seed);
    let ticks = session.clock(fps, seed).ticks(session.duration_s);
    info!(channel = channel.role().label(), frames = ticks.len(), "capture_started");

    for (t, timestamp_ns) in ticks {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let due = start + Duration::from_secs_f64(t);
        if let Some(wait) = due.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
        ring.push(TimestampedSample::new(timestamp_ns, generator.sample(t - delay_s)));
    }
}

fn print_report(report: &PipelineReport) {
    let ptt = &report.ptt;
    println!();
    println!("────────────────────────────────────────");
    if !ptt.is_valid {
        println!(
            "No measurement: {}",
            ptt.message.as_deref().unwrap_or("unknown reason")
        );
        return;
    }
    println!(
        "PTT: {:>6.1} ms | Confidence: {:>5.1}% | {}",
        ptt.lag_ms,
        ptt.confidence * 100.0,
        if ptt.reportable { "REPORTABLE" } else { "LOW QUALITY" }
    );
    for method in &ptt.methods {
        println!("  {:?}: {:.1} ms", method.method, method.lag_ms);
    }
    println!("  Beats paired: {}", ptt.beat_count);
    println!(
        "SQI face: {:.1} | finger: {:.1} | HR: {:.0} bpm",
        report.quality_a.score, report.quality_b.score, report.harmonics_a.heart_rate_bpm
    );
    println!(
        "Drift: {:.3} ms/s | Frame drops: {} | Masked: {:.1}%",
        report.drift.drift_ms_per_second,
        report.drift.total_frame_drops(),
        report.artifact_mask.total_bad_fraction() * 100.0
    );
    if report.stability.window_count() > 0 {
        println!(
            "Stability: {:.1} ± {:.1} ms over {} windows{}",
            report.stability.mean_lag_ms,
            report.stability.std_lag_ms,
            report.stability.window_count(),
            if report.stability.is_stable { "" } else { " (unstable)" }
        );
    }
    if let Some(message) = &ptt.message {
        println!("Note: {}", message);
    }
}
