//! Change requests and their priority scores.

use std::fmt;

use crate::dataset::SourceId;
use crate::tile::TileKey;

/// Reference value for the distance factor numerator (5 km squared).
pub const DEFAULT_PRIORITY_CONSTANT: f64 = 5000.0 * 5000.0;

/// Score given to every Remove. Nothing outranks it.
pub const REMOVE_SCORE: f64 = f64::MAX;

/// Handle for a layer registered with the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u32);

impl LayerId {
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Transition requested for one tile of one layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TileAction {
    Create,
    Upgrade,
    Downgrade,
    Remove,
}

/// Identity of a change slot: at most one change per key is pending or
/// in flight at a time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangeKey {
    /// Source whose concurrency budget the change counts against.
    pub source: SourceId,
    /// Tile the change targets.
    pub key: TileKey,
    /// Layer that owns the tile.
    pub layer: LayerId,
}

/// A requested transition, scored for dispatch order.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeRequest {
    /// Transition to apply.
    pub action: TileAction,
    /// Tile the change targets.
    pub key: TileKey,
    /// Layer that owns the tile.
    pub layer: LayerId,
    /// Source whose concurrency budget the change counts against.
    pub source: SourceId,
    /// LOD the tile should end up at. Unused for Remove.
    pub lod: usize,
    /// Higher is more urgent.
    pub score: f64,
}

impl ChangeRequest {
    pub fn change_key(&self) -> ChangeKey {
        ChangeKey {
            source: self.source.clone(),
            key: self.key,
            layer: self.layer,
        }
    }

    pub fn is_remove(&self) -> bool {
        self.action == TileAction::Remove
    }
}

/// Inputs to the priority score of a single change.
#[derive(Clone, Copy, Debug)]
pub struct PriorityFactors {
    /// Priority of the owning layer, added to the LOD.
    pub layer_priority: i32,
    /// LOD the score is computed for.
    pub lod: usize,
    /// Approximate squared distance from the camera to the tile center.
    pub distance_squared: i64,
}

/// Compute a dispatch score. Higher scores are dispatched first.
///
/// `constant / max(distance_squared, 1)` scales a per-action weight:
/// Create weighs LOD and layer priority by 10, Upgrade by 1, Downgrade by 0.5.
/// Remove always scores [`REMOVE_SCORE`].
#[must_use]
pub fn compute_priority(action: TileAction, factors: &PriorityFactors, constant: f64) -> f64 {
    let weight = match action {
        TileAction::Remove => return REMOVE_SCORE,
        TileAction::Create => 10.0,
        TileAction::Upgrade => 1.0,
        TileAction::Downgrade => 0.5,
    };
    let distance_factor = constant / factors.distance_squared.max(1) as f64;
    let level = factors.lod as f64 + f64::from(factors.layer_priority);
    (1.0 + weight * level) * distance_factor
}
