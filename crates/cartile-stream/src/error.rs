//! Error types for tile enumeration and layer registration.

use crate::tile::TileSize;

/// Enumeration of one tile size failed. Other sizes are unaffected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    /// The view extent contains NaN or infinite values, or has a negative
    /// width or height.
    #[error("view extent is not finite or is inverted")]
    InvalidExtent,

    /// The extent would produce more candidates than allowed.
    #[error("tile size {tile_size}: {count} candidates exceeds limit of {limit}")]
    TooManyTiles {
        tile_size: TileSize,
        count: u128,
        limit: usize,
    },

    /// Grid coordinates do not fit in 64-bit integers.
    #[error("tile size {tile_size}: grid coordinates overflow")]
    Overflow { tile_size: TileSize },
}

/// A layer cannot be registered with the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayerError {
    /// Without datasets a layer has no LOD ladder and no source to budget against.
    #[error("layer `{name}` has no datasets")]
    NoDatasets { name: String },
}

/// Unrecognised LOD mode name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown LOD mode `{0}` (expected auto, fixed1 or fixed2)")]
pub struct ParseLodModeError(pub String);
