//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use cartile_stream::{DEFAULT_PRIORITY_CONSTANT, LodMode, SchedulerSettings, ViewSettings};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Default config directory: `<platform config dir>/cartile`, or `./cartile`
/// when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cartile")
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Dispatch and LOD settings.
    pub scheduler: SchedulerConfig,
    /// View extent resolution.
    pub view: ViewConfig,
    /// Logging settings.
    pub debug: DebugConfig,
    /// Demo host settings. Ignored by the library.
    pub demo: DemoConfig,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Concurrent non-Remove changes allowed per source.
    pub max_concurrent_per_source: usize,
    /// How the target LOD is chosen: `Auto`, `Fixed1` or `Fixed2`.
    pub lod_mode: LodMode,
    /// Scales all dataset distance thresholds.
    pub max_distance_multiplier: f64,
    /// Numerator of the distance factor in priority scores.
    pub priority_constant: f64,
    /// Candidate limit per tile size and tick.
    pub max_tiles_per_size: usize,
}

/// View configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewConfig {
    /// Drop candidates outside the camera frustum (far mode only).
    pub filter_by_frustum: bool,
    /// Camera heights at or below this use a fixed square around the camera.
    pub ground_level_threshold: f64,
    /// Half width of that square in meters.
    pub ground_level_clip_range: f64,
    /// Camera far clip distance in meters.
    pub far_clip_distance: f64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

/// Demo host configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of ticks to run.
    pub ticks: u32,
    /// Sleep between ticks in milliseconds.
    pub tick_interval_ms: u64,
    /// Fetch worker threads (0 = one per CPU).
    pub worker_threads: usize,
    /// Simulated fetch latency range `[min, max]` in milliseconds.
    pub simulated_latency_ms: (u64, u64),
    /// Seed for the latency generator.
    pub seed: u64,
}

// --- Default implementations ---

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_source: 6,
            lod_mode: LodMode::Auto,
            max_distance_multiplier: 1.0,
            priority_constant: DEFAULT_PRIORITY_CONSTANT,
            max_tiles_per_size: 65_536,
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            filter_by_frustum: true,
            ground_level_threshold: 20.0,
            ground_level_clip_range: 1000.0,
            far_clip_distance: 5000.0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            ticks: 600,
            tick_interval_ms: 16,
            worker_threads: 0,
            simulated_latency_ms: (20, 250),
            seed: 0x5EED,
        }
    }
}

impl Config {
    /// Settings for [`cartile_stream::TileScheduler::new`].
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            max_concurrent_per_source: self.scheduler.max_concurrent_per_source,
            lod_mode: self.scheduler.lod_mode,
            max_distance_multiplier: self.scheduler.max_distance_multiplier,
            priority_constant: self.scheduler.priority_constant,
            max_tiles_per_size: self.scheduler.max_tiles_per_size,
            view: ViewSettings {
                ground_level_threshold: self.view.ground_level_threshold,
                ground_level_clip_range: self.view.ground_level_clip_range,
                filter_by_frustum: self.view.filter_by_frustum,
            },
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)
    }

    /// Re-read the file. Returns `Some(new_config)` only if it differs.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = std::fs::read_to_string(config_dir.join(CONFIG_FILE))
            .map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
