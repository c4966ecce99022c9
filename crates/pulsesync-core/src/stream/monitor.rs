//! Rate-limited streaming quality updates
//!
//! Capture threads only ever [`QualityMonitor::ingest`] (or write to the
//! shared rings directly). The consumer calls [`QualityMonitor::emit`] as
//! often as it likes; a new update is computed at most once per emit
//! interval, so telemetry cadence is independent of sensor cadence.
//! Auxiliary levels (motion, inertial, saturation) reported through
//! [`QualityMonitor::ingest_auxiliary`] apply to every later update until
//! replaced.
//! Updates are returned and also pushed to subscribers over bounded
//! crossbeam channels; a full channel drops the update.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::dsp::chain::ConditioningChain;
use crate::quality::sqi::{AuxiliaryLevels, ChannelQuality, QualityEngine};
use crate::stream::ring::SampleRing;
use crate::sync::timeline::TimestampSynchronizer;
use crate::types::{Channel, TimestampedSample, NANOS_PER_SEC};

/// One streaming quality snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityUpdate {
    pub quality_a: ChannelQuality,
    pub quality_b: ChannelQuality,
    /// Lower of the two channel scores
    pub weakest_score: f64,
    /// Unified samples the scores were computed on
    pub samples: usize,
    /// Newest capture timestamp covered (ns)
    pub newest_timestamp_ns: i64,
}

/// Streaming quality consumer over two shared rings
pub struct QualityMonitor {
    ring_a: Arc<SampleRing>,
    ring_b: Arc<SampleRing>,
    synchronizer: TimestampSynchronizer,
    chain: ConditioningChain,
    engine: QualityEngine,
    /// Latest auxiliary levels per channel
    auxiliary: Mutex<[AuxiliaryLevels; 2]>,
    window_ns: i64,
    interval: Duration,
    last_emit: Option<Instant>,
    subscribers: Vec<Sender<QualityUpdate>>,
}

impl std::fmt::Debug for QualityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityMonitor")
            .field("ring_a", &self.ring_a)
            .field("ring_b", &self.ring_b)
            .field("interval", &self.interval)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl QualityMonitor {
    /// Monitor owning two new rings of `capacity` samples each
    pub fn new(config: &PipelineConfig, capacity: usize) -> Self {
        Self::with_rings(
            Arc::new(SampleRing::new(capacity)),
            Arc::new(SampleRing::new(capacity)),
            config,
        )
    }

    /// Monitor reading rings shared with capture threads
    pub fn with_rings(
        ring_a: Arc<SampleRing>,
        ring_b: Arc<SampleRing>,
        config: &PipelineConfig,
    ) -> Self {
        let rate = config.sync.target_rate_hz;
        Self {
            ring_a,
            ring_b,
            synchronizer: TimestampSynchronizer::new(rate),
            chain: ConditioningChain::new(&config.dsp, rate),
            engine: QualityEngine::new(&config.quality),
            auxiliary: Mutex::new([AuxiliaryLevels::default(); 2]),
            window_ns: (config.quality.stream_window_s * NANOS_PER_SEC) as i64,
            interval: Duration::from_millis(config.quality.emit_interval_ms),
            last_emit: None,
            subscribers: Vec::new(),
        }
    }

    /// Shared handle to a channel's ring, for a producer thread
    pub fn ring(&self, channel: Channel) -> Arc<SampleRing> {
        match channel {
            Channel::A => Arc::clone(&self.ring_a),
            Channel::B => Arc::clone(&self.ring_b),
        }
    }

    /// Append a sample; never computes anything
    pub fn ingest(&self, channel: Channel, sample: TimestampedSample) {
        match channel {
            Channel::A => self.ring_a.push(sample),
            Channel::B => self.ring_b.push(sample),
        }
    }

    /// Replace the auxiliary levels scored with `channel`
    pub fn ingest_auxiliary(&self, channel: Channel, levels: AuxiliaryLevels) {
        let mut slots = self.auxiliary.lock().unwrap_or_else(PoisonError::into_inner);
        slots[channel_slot(channel)] = levels;
    }

    fn auxiliary_levels(&self) -> [AuxiliaryLevels; 2] {
        *self.auxiliary.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a subscriber with room for `capacity` pending updates
    pub fn subscribe(&mut self, capacity: usize) -> Receiver<QualityUpdate> {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        self.subscribers.push(tx);
        rx
    }

    /// Compute an update if the emit interval has elapsed since the last one
    ///
    /// Returns `None` while gated or while either ring lacks data for a
    /// valid unified window; in the latter case the next call retries.
    pub fn emit(&mut self, now: Instant) -> Option<QualityUpdate> {
        if let Some(last) = self.last_emit {
            if now.saturating_duration_since(last) < self.interval {
                return None;
            }
        }

        let a = self.ring_a.snapshot(self.window_ns)?;
        let b = self.ring_b.snapshot(self.window_ns)?;
        let series = self.synchronizer.resample(&a, &b);
        if !series.is_valid || series.len() < 2 {
            tracing::trace!(message = ?series.message, "quality_window_unavailable");
            return None;
        }

        let rate = series.sample_rate_hz;
        let [aux_a, aux_b] = self.auxiliary_levels();
        let quality_a = self.engine.assess(&self.chain.process(&series.values_a), rate, &aux_a);
        let quality_b = self.engine.assess(&self.chain.process(&series.values_b), rate, &aux_b);
        let update = QualityUpdate {
            weakest_score: quality_a.score.min(quality_b.score),
            quality_a,
            quality_b,
            samples: series.len(),
            newest_timestamp_ns: series.timestamps_ns.last().copied().unwrap_or_default(),
        };
        self.last_emit = Some(now);

        self.subscribers.retain(|tx| match tx.try_send(update.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::trace!("quality_update_dropped_subscriber_full");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });

        tracing::debug!(
            score_a = %format!("{:.1}", update.quality_a.score),
            score_b = %format!("{:.1}", update.quality_b.score),
            samples = update.samples,
            "quality_update"
        );
        Some(update)
    }

    /// Drop buffered samples, auxiliary levels and the emit gate
    pub fn reset(&mut self) {
        self.ring_a.reset();
        self.ring_b.reset();
        *self.auxiliary.lock().unwrap_or_else(PoisonError::into_inner) = Default::default();
        self.last_emit = None;
    }
}

fn channel_slot(channel: Channel) -> usize {
    match channel {
        Channel::A => 0,
        Channel::B => 1,
    }
}
