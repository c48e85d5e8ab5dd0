//! Command-line argument parsing.

use std::path::PathBuf;

use cartile_stream::LodMode;
use clap::Parser;

use crate::Config;

/// cartile command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "cartile", about = "Tile streaming scheduler demo")]
pub struct CliArgs {
    /// Concurrent requests per source.
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// LOD selection mode (auto, fixed1, fixed2).
    #[arg(long)]
    pub lod_mode: Option<LodMode>,

    /// Multiplier on every dataset's visibility distance.
    #[arg(long)]
    pub max_distance_multiplier: Option<f64>,

    /// Cull tiles outside the camera frustum.
    #[arg(long)]
    pub filter_by_frustum: Option<bool>,

    /// Number of demo ticks to run.
    #[arg(long)]
    pub ticks: Option<u32>,

    /// Seed for simulated fetch latency.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(max) = args.max_concurrent {
            self.scheduler.max_concurrent_per_source = max;
        }
        if let Some(mode) = args.lod_mode {
            self.scheduler.lod_mode = mode;
        }
        if let Some(multiplier) = args.max_distance_multiplier {
            self.scheduler.max_distance_multiplier = multiplier;
        }
        if let Some(filter) = args.filter_by_frustum {
            self.view.filter_by_frustum = filter;
        }
        if let Some(ticks) = args.ticks {
            self.demo.ticks = ticks;
        }
        if let Some(seed) = args.seed {
            self.demo.seed = seed;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
