//! Tile identity, per-layer tile state, and cancellation tokens.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rustc_hash::FxHashMap;

use crate::change::{ChangeRequest, TileAction};

/// World-space coordinate of a tile's reference (minimum) corner.
///
/// Keys are aligned to the owning layer's [`TileSize`], so a layer with
/// 1000 m tiles only ever sees keys whose components are multiples of 1000.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// Western edge of the tile.
    pub x: i64,
    /// Southern edge of the tile.
    pub y: i64,
}

impl TileKey {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Edge length of a square tile. Always strictly positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileSize(i64);

impl TileSize {
    /// Returns `None` for zero or negative edge lengths.
    #[must_use]
    pub const fn new(edge: i64) -> Option<Self> {
        if edge > 0 { Some(Self(edge)) } else { None }
    }

    /// The edge length.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ground-plane rectangle covered by one tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileBounds {
    /// Western edge.
    pub min_x: f64,
    /// Southern edge.
    pub min_y: f64,
    /// Eastern edge.
    pub max_x: f64,
    /// Northern edge.
    pub max_y: f64,
}

impl TileBounds {
    pub fn new(key: TileKey, size: TileSize) -> Self {
        let edge = size.get() as f64;
        Self {
            min_x: key.x as f64,
            min_y: key.y as f64,
            max_x: key.x as f64 + edge,
            max_y: key.y as f64 + edge,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) * 0.5,
            (self.min_y + self.max_y) * 0.5,
        )
    }
}

/// Shared cancellation flag for a piece of in-flight tile work.
///
/// Clones observe the same flag. Cancelling is idempotent.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What a layer currently holds for one tile key.
#[derive(Clone, Debug)]
pub struct TileState {
    /// Index into the layer's dataset ladder.
    pub lod: usize,
    /// Token for work started on behalf of this tile, if any is running.
    pub in_flight: Option<CancelToken>,
}

impl TileState {
    pub fn new(lod: usize) -> Self {
        Self {
            lod,
            in_flight: None,
        }
    }

    /// Cancel and forget any in-flight work. Safe to call when nothing runs.
    pub fn interrupt(&mut self) {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
    }
}

/// Per-layer mapping from tile key to tile state.
#[derive(Debug, Default)]
pub struct TileMap {
    tiles: FxHashMap<TileKey, TileState>,
}

impl TileMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: TileKey) -> Option<&TileState> {
        self.tiles.get(&key)
    }

    pub fn get_mut(&mut self, key: TileKey) -> Option<&mut TileState> {
        self.tiles.get_mut(&key)
    }

    pub fn contains(&self, key: TileKey) -> bool {
        self.tiles.contains_key(&key)
    }

    pub fn insert(&mut self, key: TileKey, state: TileState) -> Option<TileState> {
        self.tiles.insert(key, state)
    }

    /// Remove a tile, cancelling its in-flight work.
    pub fn remove(&mut self, key: TileKey) -> Option<TileState> {
        let mut state = self.tiles.remove(&key)?;
        state.interrupt();
        Some(state)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        self.tiles.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileKey, &TileState)> {
        self.tiles.iter().map(|(key, state)| (*key, state))
    }

    /// Cancel in-flight work for `key`. Unknown keys are ignored.
    pub fn interrupt(&mut self, key: TileKey) {
        if let Some(state) = self.tiles.get_mut(&key) {
            state.interrupt();
        }
    }

    /// Record the effect of a dispatched change at request time.
    ///
    /// Create inserts the tile at the requested LOD, Upgrade and Downgrade move
    /// it to the requested LOD, Remove drops it. Returns the tile's state when
    /// it still exists afterwards, so the caller can attach a [`CancelToken`].
    pub fn apply(&mut self, change: &ChangeRequest) -> Option<&mut TileState> {
        match change.action {
            TileAction::Create => {
                let state = self
                    .tiles
                    .entry(change.key)
                    .or_insert_with(|| TileState::new(change.lod));
                state.lod = change.lod;
                Some(state)
            }
            TileAction::Upgrade | TileAction::Downgrade => {
                let state = self.tiles.get_mut(&change.key)?;
                state.lod = change.lod;
                Some(state)
            }
            TileAction::Remove => {
                self.remove(change.key);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{LayerId, REMOVE_SCORE};
    use crate::dataset::SourceId;

    fn change(action: TileAction, lod: usize) -> ChangeRequest {
        ChangeRequest {
            action,
            key: TileKey::new(1000, 2000),
            layer: LayerId::new(0),
            source: SourceId::from("src"),
            lod,
            score: REMOVE_SCORE,
        }
    }

    #[test]
    fn test_tile_size_rejects_non_positive() {
        assert!(TileSize::new(0).is_none());
        assert!(TileSize::new(-100).is_none());
        assert_eq!(TileSize::new(500).map(TileSize::get), Some(500));
    }

    #[test]
    fn test_tile_bounds_center() {
        let size = TileSize::new(1000).unwrap();
        let bounds = TileBounds::new(TileKey::new(121_000, 480_000), size);
        assert_eq!(bounds.center(), (121_500.0, 480_500.0));
        assert_eq!(bounds.max_x, 122_000.0);
    }

    #[test]
    fn test_cancel_token_is_shared_and_idempotent() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_apply_follows_tile_lifecycle() {
        let mut tiles = TileMap::new();
        let key = TileKey::new(1000, 2000);

        tiles.apply(&change(TileAction::Create, 0));
        assert_eq!(tiles.get(key).map(|t| t.lod), Some(0));

        tiles.apply(&change(TileAction::Upgrade, 1));
        assert_eq!(tiles.get(key).map(|t| t.lod), Some(1));

        tiles.apply(&change(TileAction::Downgrade, 0));
        assert_eq!(tiles.get(key).map(|t| t.lod), Some(0));

        tiles.apply(&change(TileAction::Remove, 0));
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_upgrade_of_absent_tile_is_ignored() {
        let mut tiles = TileMap::new();
        assert!(tiles.apply(&change(TileAction::Upgrade, 1)).is_none());
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_remove_cancels_in_flight_work() {
        let mut tiles = TileMap::new();
        let token = CancelToken::new();
        if let Some(state) = tiles.apply(&change(TileAction::Create, 0)) {
            state.in_flight = Some(token.clone());
        }
        tiles.apply(&change(TileAction::Remove, 0));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_interrupt_unknown_key_is_noop() {
        let mut tiles = TileMap::new();
        tiles.interrupt(TileKey::new(5, 5));
        tiles.interrupt(TileKey::new(5, 5));
        assert!(tiles.is_empty());
    }
}
