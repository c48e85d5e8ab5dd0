//! Diffing desired tile state against what a layer holds.

use crate::change::{
    ChangeRequest, LayerId, PriorityFactors, REMOVE_SCORE, TileAction, compute_priority,
};
use crate::dataset::SourceId;
use crate::grid::{TileCandidate, TileCandidates};
use crate::layer::Layer;
use crate::lod::LodEvaluator;
use crate::tile::TileKey;

/// One step from `current` towards `desired`, with the LOD it lands on.
///
/// LOD moves by a single rung per step; creation goes straight to the
/// desired LOD. Returns `None` when nothing needs to change.
#[must_use]
pub fn step_towards(current: Option<usize>, desired: Option<usize>) -> Option<(TileAction, usize)> {
    match (current, desired) {
        (None, None) => None,
        (Some(current), None) => Some((TileAction::Remove, current)),
        (None, Some(desired)) => Some((TileAction::Create, desired)),
        (Some(current), Some(desired)) if desired > current => {
            Some((TileAction::Upgrade, current + 1))
        }
        (Some(current), Some(desired)) if desired < current => {
            Some((TileAction::Downgrade, current - 1))
        }
        (Some(_), Some(_)) => None,
    }
}

/// Produces scored change requests for one tick.
#[derive(Clone, Copy, Debug)]
pub struct ChangeDetector<'a> {
    evaluator: &'a LodEvaluator,
    priority_constant: f64,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(evaluator: &'a LodEvaluator, priority_constant: f64) -> Self {
        Self {
            evaluator,
            priority_constant,
        }
    }

    /// Compare each candidate's desired LOD with the layer's tile state and
    /// append the resulting changes in candidate order.
    pub fn diff_layer(
        &self,
        id: LayerId,
        layer: &dyn Layer,
        source: &SourceId,
        candidates: &[TileCandidate],
        out: &mut Vec<ChangeRequest>,
    ) {
        let datasets = layer.datasets();
        let tiles = layer.tiles();
        for candidate in candidates {
            let current = tiles.get(candidate.key).map(|tile| tile.lod);
            let desired = self.evaluator.desired_lod(datasets, candidate.distance_squared);
            let Some((action, lod)) = step_towards(current, desired) else {
                continue;
            };
            // Creation is scored as the coarsest rung regardless of target.
            let scored_lod = if action == TileAction::Create { 0 } else { lod };
            let score = compute_priority(
                action,
                &PriorityFactors {
                    layer_priority: layer.priority(),
                    lod: scored_lod,
                    distance_squared: candidate.distance_squared,
                },
                self.priority_constant,
            );
            out.push(ChangeRequest {
                action,
                key: candidate.key,
                layer: id,
                source: source.clone(),
                lod,
                score,
            });
        }
    }

    /// Append a Remove for every tile the layer holds that is not among this
    /// tick's candidates for its tile size. Emitted in key order.
    ///
    /// Layers whose tile size was not enumerated this tick are left alone.
    pub fn evict_out_of_view(
        &self,
        id: LayerId,
        layer: &dyn Layer,
        source: &SourceId,
        candidates: &TileCandidates,
        out: &mut Vec<ChangeRequest>,
    ) {
        let size = layer.tile_size();
        if candidates.get(size).is_none() {
            return;
        }
        let mut stale: Vec<(TileKey, usize)> = layer
            .tiles()
            .iter()
            .filter(|(key, _)| !candidates.contains(size, *key))
            .map(|(key, tile)| (key, tile.lod))
            .collect();
        stale.sort_unstable();
        out.extend(stale.into_iter().map(|(key, lod)| ChangeRequest {
            action: TileAction::Remove,
            key,
            layer: id,
            source: source.clone(),
            lod,
            score: REMOVE_SCORE,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::DEFAULT_PRIORITY_CONSTANT;
    use crate::dataset::DataSet;
    use crate::lod::LodMode;
    use crate::test_support::RecordingLayer;
    use crate::tile::{TileSize, TileState};

    fn layer() -> RecordingLayer {
        RecordingLayer::new(
            TileSize::new(100).unwrap(),
            vec![
                DataSet::new("src", 3000.0),
                DataSet::new("src", 1000.0),
                DataSet::new("src", 300.0),
            ],
        )
    }

    fn candidate(x: i64, distance: i64) -> TileCandidate {
        TileCandidate {
            key: TileKey::new(x, 0),
            distance_squared: distance * distance,
        }
    }

    fn diff(layer: &RecordingLayer, candidates: &[TileCandidate]) -> Vec<ChangeRequest> {
        let evaluator = LodEvaluator::default();
        let detector = ChangeDetector::new(&evaluator, DEFAULT_PRIORITY_CONSTANT);
        let mut out = Vec::new();
        detector.diff_layer(LayerId::new(0), layer, &SourceId::from("src"), candidates, &mut out);
        out
    }

    #[test]
    fn test_step_towards() {
        assert_eq!(step_towards(None, None), None);
        assert_eq!(step_towards(None, Some(2)), Some((TileAction::Create, 2)));
        assert_eq!(step_towards(Some(0), Some(2)), Some((TileAction::Upgrade, 1)));
        assert_eq!(step_towards(Some(2), Some(0)), Some((TileAction::Downgrade, 1)));
        assert_eq!(step_towards(Some(1), Some(1)), None);
        assert_eq!(step_towards(Some(1), None), Some((TileAction::Remove, 1)));
    }

    #[test]
    fn test_absent_tile_in_range_is_created() {
        let changes = diff(&layer(), &[candidate(0, 100), candidate(100, 4000)]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, TileAction::Create);
        assert_eq!(changes[0].lod, 2);
    }

    /// Creates are scored with LOD 0 no matter which LOD they target.
    #[test]
    fn test_create_scored_at_lod_zero() {
        let changes = diff(&layer(), &[candidate(0, 100)]);
        let expected = compute_priority(
            TileAction::Create,
            &PriorityFactors {
                layer_priority: 0,
                lod: 0,
                distance_squared: 100 * 100,
            },
            DEFAULT_PRIORITY_CONSTANT,
        );
        assert_eq!(changes[0].score, expected);
    }

    #[test]
    fn test_layer_priority_raises_score() {
        let plain = diff(&layer(), &[candidate(0, 100)]);
        let boosted = diff(&layer().with_priority(2), &[candidate(0, 100)]);
        let expected = compute_priority(
            TileAction::Create,
            &PriorityFactors {
                layer_priority: 2,
                lod: 0,
                distance_squared: 100 * 100,
            },
            DEFAULT_PRIORITY_CONSTANT,
        );
        assert_eq!(boosted[0].score, expected);
        assert!(boosted[0].score > plain[0].score);
    }

    #[test]
    fn test_existing_tile_steps_one_level() {
        let mut layer = layer();
        layer.tiles_mut().insert(TileKey::new(0, 0), TileState::new(2));
        layer.tiles_mut().insert(TileKey::new(100, 0), TileState::new(0));

        let changes = diff(&layer, &[candidate(0, 2000), candidate(100, 100)]);
        assert_eq!(changes.len(), 2);
        assert_eq!((changes[0].action, changes[0].lod), (TileAction::Downgrade, 1));
        assert_eq!((changes[1].action, changes[1].lod), (TileAction::Upgrade, 1));
    }

    #[test]
    fn test_tile_out_of_range_is_removed() {
        let mut layer = layer();
        layer.tiles_mut().insert(TileKey::new(0, 0), TileState::new(0));
        let changes = diff(&layer, &[candidate(0, 9000)]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, TileAction::Remove);
        assert_eq!(changes[0].score, REMOVE_SCORE);
    }

    #[test]
    fn test_fixed_mode_ignores_distance() {
        let layer = layer();
        let evaluator = LodEvaluator::new(LodMode::Fixed2, 1.0);
        let detector = ChangeDetector::new(&evaluator, DEFAULT_PRIORITY_CONSTANT);
        let mut out = Vec::new();
        detector.diff_layer(
            LayerId::new(0),
            &layer,
            &SourceId::from("src"),
            &[candidate(0, 1_000_000)],
            &mut out,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].lod, 2);
    }

    #[test]
    fn test_evicts_tiles_outside_candidates() {
        let mut layer = layer();
        for x in [300, 0, 200] {
            layer.tiles_mut().insert(TileKey::new(x, 0), TileState::new(1));
        }
        let mut candidates = TileCandidates::new();
        candidates.insert(layer.tile_size(), vec![candidate(0, 10)]);

        let evaluator = LodEvaluator::default();
        let detector = ChangeDetector::new(&evaluator, DEFAULT_PRIORITY_CONSTANT);
        let mut out = Vec::new();
        detector.evict_out_of_view(
            LayerId::new(0),
            &layer,
            &SourceId::from("src"),
            &candidates,
            &mut out,
        );

        let evicted: Vec<i64> = out.iter().map(|c| c.key.x).collect();
        assert_eq!(evicted, vec![200, 300]);
        assert!(out.iter().all(ChangeRequest::is_remove));
    }

    #[test]
    fn test_no_eviction_without_enumeration() {
        let mut layer = layer();
        layer.tiles_mut().insert(TileKey::new(0, 0), TileState::new(1));
        let evaluator = LodEvaluator::default();
        let detector = ChangeDetector::new(&evaluator, DEFAULT_PRIORITY_CONSTANT);
        let mut out = Vec::new();
        detector.evict_out_of_view(
            LayerId::new(0),
            &layer,
            &SourceId::from("src"),
            &TileCandidates::new(),
            &mut out,
        );
        assert!(out.is_empty());
    }
}
