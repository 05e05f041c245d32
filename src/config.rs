use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Player-wide tuning shared by every pipeline a registry creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// How late (ms) a frame may be and still be delivered instead of dropped.
    pub late_tolerance_ms: u64,
    /// Pause between loop restarts of a source that produced no packets.
    pub restart_backoff_ms: u64,
    /// Upper bound on any single sleep, so stop requests are noticed quickly.
    pub stop_poll_ms: u64,
    pub log_level: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            late_tolerance_ms: 40,
            restart_backoff_ms: 500,
            stop_poll_ms: 20,
            log_level: "info".to_string(),
        }
    }
}

impl PlayerConfig {
    /// Reads `path` (JSON, missing fields take defaults) if given, then applies
    /// `ROI_PLAYER_*` environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        fn millis(name: &str, value: Option<String>, slot: &mut u64) -> anyhow::Result<()> {
            if let Some(value) = value {
                *slot = value
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a whole number of ms", name))?;
            }
            Ok(())
        }

        millis(
            "ROI_PLAYER_LATE_TOLERANCE_MS",
            var("ROI_PLAYER_LATE_TOLERANCE_MS"),
            &mut self.late_tolerance_ms,
        )?;
        millis(
            "ROI_PLAYER_RESTART_BACKOFF_MS",
            var("ROI_PLAYER_RESTART_BACKOFF_MS"),
            &mut self.restart_backoff_ms,
        )?;
        millis(
            "ROI_PLAYER_STOP_POLL_MS",
            var("ROI_PLAYER_STOP_POLL_MS"),
            &mut self.stop_poll_ms,
        )?;
        if let Some(level) = var("ROI_PLAYER_LOG_LEVEL") {
            self.log_level = level;
        }
        if self.stop_poll_ms == 0 {
            self.stop_poll_ms = 1;
        }
        Ok(())
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        self.log_level
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }
}

/// Per-stream options for [`crate::StreamRegistry::add_stream_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// Start in the paused state; nothing is decoded until `resume`.
    pub start_paused: bool,
}
