//! Grid-aligned tile enumeration over a view extent.
//!
//! For every tile size in use the extent is snapped outward to multiples of
//! that size and each cell inside becomes a candidate tagged with a cheap
//! squared distance to the camera.

use std::collections::BTreeMap;

use glam::DVec3;
use rustc_hash::FxHashSet;

use crate::error::GridError;
use crate::tile::{TileBounds, TileKey, TileSize};
use crate::view::{ResolvedView, ViewExtent, ViewProvider};

/// A tile in view, with its squared distance to the camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileCandidate {
    /// Grid-aligned tile origin.
    pub key: TileKey,
    /// Squared distance from the truncated camera position to the tile center.
    pub distance_squared: i64,
}

/// Candidate lists for one tick, per tile size.
#[derive(Debug, Default)]
pub struct TileCandidates {
    by_size: BTreeMap<TileSize, SizeCandidates>,
}

#[derive(Debug, Default)]
struct SizeCandidates {
    list: Vec<TileCandidate>,
    keys: FxHashSet<TileKey>,
}

impl TileCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the candidate list for `size`, replacing any previous list.
    pub fn insert(&mut self, size: TileSize, list: Vec<TileCandidate>) {
        let keys = list.iter().map(|candidate| candidate.key).collect();
        self.by_size.insert(size, SizeCandidates { list, keys });
    }

    /// Candidates for `size` in enumeration order, or `None` if the size was
    /// not enumerated this tick.
    pub fn get(&self, size: TileSize) -> Option<&[TileCandidate]> {
        self.by_size.get(&size).map(|entry| entry.list.as_slice())
    }

    pub fn contains(&self, size: TileSize, key: TileKey) -> bool {
        self.by_size
            .get(&size)
            .is_some_and(|entry| entry.keys.contains(&key))
    }

    pub fn sizes(&self) -> impl Iterator<Item = TileSize> + '_ {
        self.by_size.keys().copied()
    }

    /// Total number of candidates across all sizes.
    pub fn total(&self) -> usize {
        self.by_size.values().map(|entry| entry.list.len()).sum()
    }

    pub fn clear(&mut self) {
        self.by_size.clear();
    }
}

/// Squared distance from the tile center to the camera's planar position,
/// plus the squared camera height.
///
/// Positions are truncated to whole units and the tile center is
/// `key + size / 2` in integer arithmetic, so the value is stable between ticks
/// for a stationary camera.
pub fn tile_distance_squared(key: TileKey, size: TileSize, camera: DVec3) -> i64 {
    let half = size.get() / 2;
    let dx = key.x.saturating_add(half).saturating_sub(camera.x as i64);
    let dy = key.y.saturating_add(half).saturating_sub(camera.y as i64);
    let dz = camera.z as i64;
    dx.saturating_mul(dx)
        .saturating_add(dy.saturating_mul(dy))
        .saturating_add(dz.saturating_mul(dz))
}

/// Grid-aligned `[start, end]` bounds (inclusive) for one axis.
fn axis_bounds(min: f64, max: f64, size: TileSize) -> Option<(i64, i64)> {
    let edge = size.get() as f64;
    let start = (min / edge).floor();
    let end = (max / edge).ceil();
    let limit = (i64::MAX / size.get()) as f64;
    if start.abs() >= limit || end.abs() >= limit {
        return None;
    }
    Some((start as i64 * size.get(), end as i64 * size.get()))
}

/// Number of cells between inclusive grid-aligned bounds.
fn axis_cells(start: i64, end: i64, size: TileSize) -> Option<u128> {
    let span = end.checked_sub(start)?;
    let cells = u128::try_from(span / size.get()).ok()?;
    cells.checked_add(1)
}

/// Enumerate every tile of `size` inside `extent`.
///
/// Iterates x-major with both ends inclusive. When `culler` is given, tiles
/// whose bounds fail its frustum test are dropped. Fails without enumerating
/// when the extent would yield more than `limit` cells.
pub fn enumerate_size(
    extent: &ViewExtent,
    size: TileSize,
    camera: DVec3,
    culler: Option<&dyn ViewProvider>,
    limit: usize,
) -> Result<Vec<TileCandidate>, GridError> {
    if !extent.is_finite() || extent.width < 0.0 || extent.height < 0.0 {
        return Err(GridError::InvalidExtent);
    }
    let overflow = || GridError::Overflow { tile_size: size };
    let (start_x, end_x) = axis_bounds(extent.min_x, extent.max_x(), size).ok_or_else(overflow)?;
    let (start_y, end_y) = axis_bounds(extent.min_y, extent.max_y(), size).ok_or_else(overflow)?;

    let columns = axis_cells(start_x, end_x, size).ok_or_else(overflow)?;
    let rows = axis_cells(start_y, end_y, size).ok_or_else(overflow)?;
    let count = columns.checked_mul(rows).ok_or_else(overflow)?;
    if count > limit as u128 {
        return Err(GridError::TooManyTiles {
            tile_size: size,
            count,
            limit,
        });
    }

    let mut candidates = Vec::with_capacity(count as usize);
    let step = size.get() as usize;
    for x in (start_x..=end_x).step_by(step) {
        for y in (start_y..=end_y).step_by(step) {
            let key = TileKey::new(x, y);
            if let Some(culler) = culler
                && !culler.is_visible(&TileBounds::new(key, size))
            {
                continue;
            }
            candidates.push(TileCandidate {
                key,
                distance_squared: tile_distance_squared(key, size, camera),
            });
        }
    }
    Ok(candidates)
}

/// Enumerate all `sizes` for a resolved view.
///
/// Sizes that fail are reported alongside the candidates and left out of
/// them; the remaining sizes are unaffected.
pub fn enumerate_tiles(
    sizes: &[TileSize],
    view: &ResolvedView,
    culler: Option<&dyn ViewProvider>,
    limit: usize,
) -> (TileCandidates, Vec<(TileSize, GridError)>) {
    let mut candidates = TileCandidates::new();
    let mut failures = Vec::new();
    for &size in sizes {
        match enumerate_size(&view.extent, size, view.camera, culler, limit) {
            Ok(list) => candidates.insert(size, list),
            Err(err) => failures.push((size, err)),
        }
    }
    (candidates, failures)
}
