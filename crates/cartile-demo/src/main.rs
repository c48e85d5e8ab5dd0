//! Headless demo that streams three tile layers along a descending fly-over.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p cartile-demo -- --ticks 300 --log-level debug`.

mod fetch;
mod flight;
mod layers;

use std::collections::BTreeMap;
use std::time::Duration;

use cartile_config::{CliArgs, Config, default_config_dir};
use cartile_stream::{DataSet, Layer, SourceId, TileScheduler, TileSize};
use clap::Parser;
use tracing::info;

use crate::fetch::{FetchJob, FetchPool};
use crate::flight::FlightPath;
use crate::layers::SimulatedLayer;

const STATS_EVERY: u32 = 60;

fn main() {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    cartile_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let threads = match config.demo.worker_threads {
        0 => num_cpus::get().max(1),
        n => n,
    };
    let pool = match FetchPool::new(threads, config.demo.simulated_latency_ms, config.demo.seed) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to start fetch workers: {e}");
            return;
        }
    };
    let Some(jobs) = pool.submitter() else {
        return;
    };
    info!("Started {} fetch workers", threads);

    let mut scheduler = TileScheduler::new(config.scheduler_settings());
    let mut sources = Vec::new();
    for layer in demo_layers(jobs) {
        if let Some(dataset) = layer.datasets().first() {
            sources.push(dataset.source.clone());
        }
        if let Err(e) = scheduler.add_layer(Box::new(layer)) {
            tracing::warn!("{e}");
        }
    }
    sources.sort();
    sources.dedup();

    run_flight(&mut scheduler, &pool, &config, &sources);

    // Removing the layers drops every tile and cancels queued fetches.
    let ids: Vec<_> = scheduler.layers().map(|(id, _)| id).collect();
    for id in ids {
        scheduler.remove_layer(id);
    }
    drop(scheduler);
    pool.shutdown();
    info!("Demo finished");
}

fn run_flight(
    scheduler: &mut TileScheduler,
    pool: &FetchPool,
    config: &Config,
    sources: &[SourceId],
) {
    let path = FlightPath::descent(config.view.far_clip_distance);
    let ticks = config.demo.ticks.max(1);
    let mut fetched: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut cancelled = 0usize;

    for tick in 0..ticks {
        let t = f64::from(tick) / f64::from(ticks.saturating_sub(1).max(1));
        let camera = path.camera(t);
        let report = scheduler.tick(&camera);

        for outcome in pool.drain_outcomes() {
            tracing::trace!(
                "{} {} LOD {} settled after {:?}",
                outcome.layer,
                outcome.key,
                outcome.lod,
                outcome.elapsed
            );
            if outcome.cancelled {
                cancelled += 1;
            } else {
                *fetched.entry(outcome.layer).or_default() += 1;
            }
        }

        if tick % STATS_EVERY == 0 || tick + 1 == ticks {
            let position = path.position(t);
            info!(
                "tick {tick}: camera ({:.0}, {:.0}, {:.0}) {:?} mode, {} candidates",
                position.x,
                position.y,
                position.z,
                report.mode,
                scheduler.candidates().total()
            );
            for source in sources {
                info!("  {source}: {} in flight", scheduler.in_flight(source));
            }
            info!(
                "  pending {}, fetched {:?}, cancelled {}",
                scheduler.pending_count(),
                fetched,
                cancelled
            );
        }
        for (size, err) in &report.skipped_sizes {
            tracing::debug!("tick {tick}: size {size} skipped: {err}");
        }

        std::thread::sleep(Duration::from_millis(config.demo.tick_interval_ms));
    }
}

/// Terrain on its own source; buildings and trees share a feature server.
fn demo_layers(jobs: crossbeam_channel::Sender<FetchJob>) -> Vec<SimulatedLayer> {
    let (Some(large), Some(small)) = (TileSize::new(1000), TileSize::new(500)) else {
        return Vec::new();
    };
    vec![
        SimulatedLayer::new(
            "terrain",
            large,
            0,
            vec![DataSet::new("terrain", 5000.0), DataSet::new("terrain", 1500.0)],
            jobs.clone(),
        ),
        SimulatedLayer::new(
            "buildings",
            large,
            1,
            vec![DataSet::new("features", 2500.0), DataSet::new("features", 800.0)],
            jobs.clone(),
        ),
        SimulatedLayer::new(
            "trees",
            small,
            0,
            vec![DataSet::new("features", 600.0)],
            jobs,
        ),
    ]
}
