//! Configuration for the cartile tile scheduler and its demo host.
//!
//! Settings persist to disk as a RON file and can be overridden from the
//! command line via clap. Every section defaults field by field, so older and
//! newer config files both load.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, DemoConfig, SchedulerConfig, ViewConfig, default_config_dir};
pub use error::ConfigError;
