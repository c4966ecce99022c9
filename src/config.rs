//! Pipeline configuration files
//!
//! The engine's [`PipelineConfig`] stored as (possibly partial) JSON. Loading
//! never fails: a missing or invalid file falls back to the defaults.

use std::path::Path;

use anyhow::Context;

pub use pulsesync_core::config::{
    ConfigError, ConsensusConfig, DspConfig, LagConfig, PipelineConfig, QualityConfig,
    SpectralConfig, SyncConfig, WaveletConfig,
};

/// Load and validate a config file, falling back to defaults on any error
pub fn load(path: &Path) -> PipelineConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => match PipelineConfig::from_json_str(&contents) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "config_loaded");
                config
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config_invalid_using_defaults");
                PipelineConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "config_unreadable_using_defaults");
            PipelineConfig::default()
        }
    }
}

/// Write `config` as pretty JSON, creating parent directories if needed
pub fn save(config: &PipelineConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = config.to_json_string()?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), "config_saved");
    Ok(())
}
