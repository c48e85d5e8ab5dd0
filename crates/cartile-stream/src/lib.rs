//! Tile streaming scheduler for Cartesian tiled datasets.
//!
//! Every frame the host calls [`TileScheduler::tick`] with the current view.
//! The scheduler resolves the visible extent, enumerates grid-aligned tiles for
//! each tile size in use, picks a level of detail per layer, diffs that against
//! what each layer already holds, and dispatches the resulting changes to the
//! layers under a per-source concurrency cap. Layers do the actual fetching and
//! building and report back through a [`Completion`].

mod change;
mod completion;
mod dataset;
mod detector;
mod error;
mod frustum;
mod grid;
mod layer;
mod lod;
mod queue;
mod scheduler;
mod tile;
mod view;

#[cfg(test)]
mod test_support;

pub use change::{
    ChangeKey, ChangeRequest, DEFAULT_PRIORITY_CONSTANT, LayerId, PriorityFactors, REMOVE_SCORE,
    TileAction, compute_priority,
};
pub use completion::{Completion, DispatchId};
pub use dataset::{DataSet, SourceId};
pub use detector::{ChangeDetector, step_towards};
pub use error::{GridError, LayerError, ParseLodModeError};
pub use frustum::{CameraView, Frustum};
pub use grid::{
    TileCandidate, TileCandidates, enumerate_size, enumerate_tiles, tile_distance_squared,
};
pub use layer::{Layer, layer_source};
pub use lod::{LodEvaluator, LodMode};
pub use queue::{PendingQueue, QueuedRemove};
pub use scheduler::{SchedulerSettings, TickReport, TileScheduler};
pub use tile::{CancelToken, TileBounds, TileKey, TileMap, TileSize, TileState};
pub use view::{ResolvedView, ViewExtent, ViewMode, ViewProvider, ViewSettings, resolve_view};
