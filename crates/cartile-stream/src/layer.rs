//! The contract between the scheduler and a tile layer.

use crate::change::ChangeRequest;
use crate::completion::Completion;
use crate::dataset::{DataSet, SourceId};
use crate::tile::{TileKey, TileMap, TileSize};

/// A set of tiles of one size, backed by a LOD ladder of datasets.
///
/// The scheduler decides which tiles should exist at which LOD; the layer
/// does the actual fetching and building. Layers are driven from the thread
/// that calls [`TileScheduler::tick`](crate::TileScheduler::tick).
pub trait Layer {
    /// Name used in log output.
    fn name(&self) -> &str {
        "layer"
    }

    fn tile_size(&self) -> TileSize;

    /// Added to the LOD term of every priority score for this layer.
    fn priority(&self) -> i32 {
        0
    }

    /// Disabled layers are skipped entirely while ticking.
    fn is_enabled(&self) -> bool {
        true
    }

    /// The LOD ladder. Index in this list is the LOD index.
    fn datasets(&self) -> &[DataSet];

    /// Tiles the layer currently holds.
    fn tiles(&self) -> &TileMap;

    /// Carry out a change.
    ///
    /// Tile state must reflect the change when this returns (see
    /// [`TileMap::apply`]); the work itself may continue elsewhere and call
    /// [`Completion::complete`] when done.
    fn handle_tile(&mut self, change: &ChangeRequest, completion: Completion);

    /// Abort any work running for `key`. Must tolerate keys with nothing
    /// running and repeated calls.
    fn interrupt_in_flight(&mut self, key: TileKey);
}

/// The source a layer's changes are budgeted against: its first dataset's.
pub fn layer_source(layer: &dyn Layer) -> Option<&SourceId> {
    layer.datasets().first().map(|dataset| &dataset.source)
}
