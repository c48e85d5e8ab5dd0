//! Distance-based LOD selection over a layer's dataset ladder.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::DataSet;
use crate::error::ParseLodModeError;

/// How the desired LOD of a tile is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LodMode {
    /// Pick from the dataset thresholds using the tile's distance.
    #[default]
    Auto,
    /// Force one low tier everywhere: LOD 1 when the ladder has more than two
    /// rungs, LOD 0 otherwise.
    Fixed1,
    /// Force the last rung of every ladder.
    Fixed2,
}

impl fmt::Display for LodMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LodMode::Auto => "auto",
            LodMode::Fixed1 => "fixed1",
            LodMode::Fixed2 => "fixed2",
        };
        f.write_str(name)
    }
}

impl FromStr for LodMode {
    type Err = ParseLodModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(LodMode::Auto),
            "fixed1" | "lod1" => Ok(LodMode::Fixed1),
            "fixed2" | "lod2" => Ok(LodMode::Fixed2),
            _ => Err(ParseLodModeError(s.to_string())),
        }
    }
}

/// Maps a tile distance and a dataset ladder to a desired LOD.
#[derive(Clone, Copy, Debug)]
pub struct LodEvaluator {
    mode: LodMode,
    max_distance_multiplier: f64,
}

impl LodEvaluator {
    pub fn new(mode: LodMode, max_distance_multiplier: f64) -> Self {
        Self {
            mode,
            max_distance_multiplier,
        }
    }

    pub fn mode(&self) -> LodMode {
        self.mode
    }

    /// Desired LOD index for a tile at `distance_squared`, or `None` when the
    /// tile should not exist.
    ///
    /// In [`LodMode::Auto`] every enabled dataset whose scaled threshold
    /// exceeds the distance is a match, and the *last* match in list order
    /// wins. The fixed modes ignore distance but still need at least one
    /// enabled dataset.
    #[must_use]
    pub fn desired_lod(&self, datasets: &[DataSet], distance_squared: i64) -> Option<usize> {
        let distance_squared = distance_squared as f64;
        match self.mode {
            LodMode::Auto => {
                let mut desired = None;
                for (index, dataset) in datasets.iter().enumerate() {
                    if dataset.enabled
                        && dataset.max_distance_squared * self.max_distance_multiplier
                            > distance_squared
                    {
                        desired = Some(index);
                    }
                }
                desired
            }
            LodMode::Fixed1 => {
                let level = if datasets.len() > 2 { 1 } else { 0 };
                has_enabled(datasets).then_some(level)
            }
            LodMode::Fixed2 => {
                let level = datasets.len().checked_sub(1)?;
                has_enabled(datasets).then_some(level)
            }
        }
    }
}

impl Default for LodEvaluator {
    fn default() -> Self {
        Self::new(LodMode::Auto, 1.0)
    }
}

fn has_enabled(datasets: &[DataSet]) -> bool {
    datasets.iter().any(|dataset| dataset.enabled)
}
