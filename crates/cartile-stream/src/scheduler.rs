//! The per-frame scheduling loop.
//!
//! Each [`TileScheduler::tick`] runs these steps in order:
//!
//! 1. Drain completion signals and free their concurrency slots.
//! 2. Resolve the view extent and enumerate candidates per tile size.
//! 3. Rebuild the pending queues from the layers' current tile state.
//! 4. Apply every Remove immediately, ignoring concurrency caps.
//! 5. Dispatch the highest-scoring changes per source until the source's cap
//!    is reached.
//!
//! All bookkeeping is single threaded. Layers may finish work on other
//! threads; their [`Completion`] handles are sent back over a channel and
//! picked up at the start of the next tick.

use std::collections::{BTreeMap, BTreeSet};

use crossbeam_channel::{Receiver, Sender};
use rustc_hash::FxHashMap;

use crate::change::{
    ChangeKey, ChangeRequest, DEFAULT_PRIORITY_CONSTANT, LayerId, REMOVE_SCORE, TileAction,
};
use crate::completion::{Completion, CompletionMessage, DispatchId};
use crate::dataset::SourceId;
use crate::detector::ChangeDetector;
use crate::error::{GridError, LayerError};
use crate::grid::{TileCandidates, enumerate_tiles};
use crate::layer::{Layer, layer_source};
use crate::lod::{LodEvaluator, LodMode};
use crate::queue::{PendingQueue, QueuedRemove};
use crate::tile::{TileKey, TileSize};
use crate::view::{ViewMode, ViewProvider, ViewSettings, resolve_view};

/// Tuning for a [`TileScheduler`].
#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerSettings {
    /// Maximum number of non-Remove changes in flight per source.
    pub max_concurrent_per_source: usize,
    /// How the target LOD is chosen.
    pub lod_mode: LodMode,
    /// Scales every dataset's distance threshold.
    pub max_distance_multiplier: f64,
    /// Numerator of the distance factor in priority scores.
    pub priority_constant: f64,
    /// Tile sizes whose enumeration exceeds this many cells are skipped.
    pub max_tiles_per_size: usize,
    /// View extent resolution.
    pub view: ViewSettings,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_per_source: 6,
            lod_mode: LodMode::Auto,
            max_distance_multiplier: 1.0,
            priority_constant: DEFAULT_PRIORITY_CONSTANT,
            max_tiles_per_size: 65_536,
            view: ViewSettings::default(),
        }
    }
}

/// What one tick (or one explicit dispatch) did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Extent strategy used. `None` when the tick did no view work.
    pub mode: Option<ViewMode>,
    /// Completions that released an active slot.
    pub completions: usize,
    /// Removes handed to layers.
    pub removes: usize,
    /// Non-Remove changes handed to layers, replacements included.
    pub dispatched: usize,
    /// Active changes replaced by a higher-scoring one.
    pub replaced: usize,
    /// Queued changes dropped because a change for the same key was active.
    pub dropped_duplicates: usize,
    /// Tile sizes whose enumeration failed this tick.
    pub skipped_sizes: Vec<(TileSize, GridError)>,
}

impl TickReport {
    fn merge(&mut self, other: TickReport) {
        self.removes += other.removes;
        self.dispatched += other.dispatched;
        self.replaced += other.replaced;
        self.dropped_duplicates += other.dropped_duplicates;
    }
}

struct RegisteredLayer {
    id: LayerId,
    source: SourceId,
    layer: Box<dyn Layer>,
}

#[derive(Clone, Debug)]
struct ActiveChange {
    id: DispatchId,
    change: ChangeRequest,
}

/// Decides which tiles every layer should hold and drives the layers there.
pub struct TileScheduler {
    settings: SchedulerSettings,
    layers: Vec<RegisteredLayer>,
    next_layer_id: u32,
    candidates: TileCandidates,
    pending: BTreeMap<SourceId, PendingQueue>,
    active: FxHashMap<ChangeKey, ActiveChange>,
    in_flight: FxHashMap<SourceId, usize>,
    completion_tx: Sender<CompletionMessage>,
    completion_rx: Receiver<CompletionMessage>,
    next_dispatch: u64,
    paused: bool,
}

impl Default for TileScheduler {
    fn default() -> Self {
        Self::new(SchedulerSettings::default())
    }
}

impl TileScheduler {
    pub fn new(settings: SchedulerSettings) -> Self {
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        Self {
            settings,
            layers: Vec::new(),
            next_layer_id: 0,
            candidates: TileCandidates::new(),
            pending: BTreeMap::new(),
            active: FxHashMap::default(),
            in_flight: FxHashMap::default(),
            completion_tx,
            completion_rx,
            next_dispatch: 0,
            paused: false,
        }
    }

    // -- Layers ---------------------------------------------------------------

    /// Register a layer. Its changes are budgeted against the source of its
    /// first dataset.
    pub fn add_layer(&mut self, layer: Box<dyn Layer>) -> Result<LayerId, LayerError> {
        let Some(source) = layer_source(layer.as_ref()).cloned() else {
            tracing::warn!("Rejecting layer `{}`: no datasets", layer.name());
            return Err(LayerError::NoDatasets {
                name: layer.name().to_string(),
            });
        };
        let id = LayerId::new(self.next_layer_id);
        self.next_layer_id += 1;
        tracing::info!(
            "Registered {} `{}` (tile size {}, source {})",
            id,
            layer.name(),
            layer.tile_size(),
            source
        );
        self.layers.push(RegisteredLayer { id, source, layer });
        Ok(id)
    }

    /// Unregister a layer, removing every tile it holds first.
    pub fn remove_layer(&mut self, id: LayerId) -> Option<Box<dyn Layer>> {
        let index = self.layers.iter().position(|entry| entry.id == id)?;
        let mut entry = self.layers.remove(index);

        let stale: Vec<ChangeKey> = self
            .active
            .keys()
            .filter(|key| key.layer == id)
            .cloned()
            .collect();
        for key in &stale {
            self.release_active(key);
        }
        if let Some(queue) = self.pending.get_mut(&entry.source) {
            queue.retain_layer(id);
        }

        let mut keys: Vec<TileKey> = entry.layer.tiles().keys().collect();
        keys.sort_unstable();
        for key in keys {
            let lod = entry.layer.tiles().get(key).map_or(0, |tile| tile.lod);
            let change = ChangeRequest {
                action: TileAction::Remove,
                key,
                layer: id,
                source: entry.source.clone(),
                lod,
                score: REMOVE_SCORE,
            };
            entry.layer.interrupt_in_flight(key);
            let dispatch = self.next_dispatch_id();
            entry.layer.handle_tile(&change, Completion::untracked(dispatch));
        }
        tracing::info!("Removed {} `{}`", id, entry.layer.name());
        Some(entry.layer)
    }

    pub fn layer(&self, id: LayerId) -> Option<&dyn Layer> {
        self.layers
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.layer.as_ref())
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut (dyn Layer + 'static)> {
        self.layers
            .iter_mut()
            .find(|entry| entry.id == id)
            .map(|entry| entry.layer.as_mut())
    }

    pub fn layers(&self) -> impl Iterator<Item = (LayerId, &dyn Layer)> {
        self.layers.iter().map(|entry| (entry.id, entry.layer.as_ref()))
    }

    // -- Settings -------------------------------------------------------------

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// While paused, ticks only drain completions.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            tracing::info!("Tile loading {}", if paused { "paused" } else { "resumed" });
        }
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_lod_mode(&mut self, mode: LodMode) {
        self.settings.lod_mode = mode;
    }

    pub fn set_max_distance_multiplier(&mut self, multiplier: f64) {
        self.settings.max_distance_multiplier = multiplier;
    }

    /// Lowering the cap does not cancel work already in flight.
    pub fn set_max_concurrent_per_source(&mut self, max: usize) {
        self.settings.max_concurrent_per_source = max;
    }

    pub fn set_filter_by_frustum(&mut self, enabled: bool) {
        self.settings.view.filter_by_frustum = enabled;
    }

    // -- Inspection -----------------------------------------------------------

    /// Candidates enumerated by the last tick that did view work.
    pub fn candidates(&self) -> &TileCandidates {
        &self.candidates
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Non-Remove changes in flight for `source`.
    pub fn in_flight(&self, source: &SourceId) -> usize {
        self.in_flight.get(source).copied().unwrap_or(0)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().map(PendingQueue::len).sum()
    }

    pub fn is_active(&self, key: &ChangeKey) -> bool {
        self.active.contains_key(key)
    }

    pub fn is_pending(&self, key: &ChangeKey) -> bool {
        self.pending
            .get(&key.source)
            .is_some_and(|queue| queue.contains(key.key, key.layer))
    }

    /// Changes left queued for `source` after the last dispatch.
    pub fn pending(&self, source: &SourceId) -> impl Iterator<Item = &ChangeRequest> {
        self.pending
            .get(source)
            .into_iter()
            .flat_map(|queue| queue.iter())
    }

    /// The change in flight for `key`, if any.
    pub fn active_change(&self, key: &ChangeKey) -> Option<&ChangeRequest> {
        self.active.get(key).map(|active| &active.change)
    }

    // -- Ticking --------------------------------------------------------------

    /// Run one scheduling pass against the current view.
    ///
    /// Never fails: tile sizes that cannot be enumerated are reported in
    /// [`TickReport::skipped_sizes`] and skipped, and with no enabled layers
    /// the tick does nothing beyond draining completions.
    pub fn tick(&mut self, view: &dyn ViewProvider) -> TickReport {
        let mut report = TickReport {
            completions: self.drain_completions(),
            ..TickReport::default()
        };
        if self.paused {
            return report;
        }

        let sizes = self.tile_sizes();
        let Some(&max_size) = sizes.last() else {
            tracing::trace!("No enabled layers, nothing to schedule");
            return report;
        };

        let resolved = resolve_view(view, &self.settings.view, max_size);
        report.mode = Some(resolved.mode);
        let culler = resolved.cull_with_frustum(&self.settings.view).then_some(view);
        let (candidates, failures) =
            enumerate_tiles(&sizes, &resolved, culler, self.settings.max_tiles_per_size);
        for (size, err) in &failures {
            tracing::warn!("Skipping tile size {} this tick: {}", size, err);
        }
        report.skipped_sizes = failures;
        self.candidates = candidates;
        tracing::trace!(
            "Enumerated {} candidates in {:?} mode",
            self.candidates.total(),
            resolved.mode
        );

        self.rebuild_pending();
        report.merge(self.dispatch_pending());
        tracing::debug!(
            "Tick: {} removes, {} dispatched, {} active, {} pending",
            report.removes,
            report.dispatched,
            self.active.len(),
            self.pending_count()
        );
        report
    }

    /// Queue a change directly, bypassing the detector.
    ///
    /// Unlike detector output, a change for a key that is already in flight
    /// is accepted; on dispatch it replaces the active change if its score is
    /// strictly higher. The change is budgeted against its layer's source,
    /// whatever source it names. Returns `false` for an unregistered layer or
    /// when the queue keeps an existing change for the key. Queued changes are
    /// discarded at the next tick.
    pub fn submit(&mut self, mut change: ChangeRequest) -> bool {
        let Some(entry) = self.layers.iter().find(|entry| entry.id == change.layer) else {
            tracing::debug!("Rejecting change for unregistered {}", change.layer);
            return false;
        };
        if change.source != entry.source {
            tracing::debug!(
                "Change for {} of {} names source {}, using {}",
                change.key,
                change.layer,
                change.source,
                entry.source
            );
            change.source = entry.source.clone();
        }
        self.pending
            .entry(change.source.clone())
            .or_default()
            .push(change)
    }

    /// Apply every queued Remove, then dispatch queued changes up to each
    /// source's concurrency cap.
    ///
    /// Changes still queued for a key that is in flight afterwards are
    /// dropped, so no key is both active and pending.
    pub fn dispatch_pending(&mut self) -> TickReport {
        let mut report = TickReport {
            removes: self.process_removes(),
            ..TickReport::default()
        };
        self.dispatch_capped(&mut report);
        report.dropped_duplicates += self.drop_pending_for_active();
        report
    }

    /// Release active slots for every completion received so far. Returns the
    /// number of slots released.
    pub fn drain_completions(&mut self) -> usize {
        let mut released = 0;
        while let Ok(message) = self.completion_rx.try_recv() {
            let current = self
                .active
                .get(&message.key)
                .is_some_and(|active| active.id == message.id);
            if current {
                self.release_active(&message.key);
                released += 1;
            } else {
                tracing::trace!("Ignoring stale completion {} for {}", message.id, message.key.key);
            }
        }
        released
    }

    /// Distinct tile sizes of enabled layers, ascending.
    fn tile_sizes(&self) -> Vec<TileSize> {
        self.layers
            .iter()
            .filter(|entry| entry.layer.is_enabled())
            .map(|entry| entry.layer.tile_size())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn rebuild_pending(&mut self) {
        for queue in self.pending.values_mut() {
            queue.clear();
        }

        let evaluator =
            LodEvaluator::new(self.settings.lod_mode, self.settings.max_distance_multiplier);
        let detector = ChangeDetector::new(&evaluator, self.settings.priority_constant);
        let mut changes = Vec::new();
        for entry in self.layers.iter().filter(|entry| entry.layer.is_enabled()) {
            let layer = entry.layer.as_ref();
            detector.evict_out_of_view(
                entry.id,
                layer,
                &entry.source,
                &self.candidates,
                &mut changes,
            );
            if let Some(list) = self.candidates.get(layer.tile_size()) {
                detector.diff_layer(entry.id, layer, &entry.source, list, &mut changes);
            }
        }

        for change in changes {
            // In-flight keys wait for their completion before the next step.
            if !change.is_remove() && self.active.contains_key(&change.change_key()) {
                continue;
            }
            self.pending.entry(change.source.clone()).or_default().push(change);
        }
    }

    /// Apply all queued Removes across all sources. Returns how many reached
    /// a layer.
    fn process_removes(&mut self) -> usize {
        let removes: Vec<QueuedRemove> = self
            .pending
            .values_mut()
            .flat_map(PendingQueue::take_removes)
            .collect();

        let mut applied = 0;
        for QueuedRemove { change, superseded } in removes {
            let key = change.change_key();
            let was_active = self.release_active(&key).is_some();
            let dispatch = self.next_dispatch_id();
            let Some(entry) = self.layers.iter_mut().find(|entry| entry.id == change.layer) else {
                continue;
            };
            if was_active || superseded {
                entry.layer.interrupt_in_flight(change.key);
            }
            if !was_active && !superseded && !entry.layer.tiles().contains(change.key) {
                tracing::trace!(
                    "Remove for absent tile {} of {} ignored",
                    change.key,
                    change.layer
                );
                continue;
            }
            entry.layer.handle_tile(&change, Completion::untracked(dispatch));
            applied += 1;
        }
        applied
    }

    fn dispatch_capped(&mut self, report: &mut TickReport) {
        let cap = self.settings.max_concurrent_per_source;
        let sources: Vec<SourceId> = self.pending.keys().cloned().collect();
        for source in sources {
            while self.in_flight(&source) < cap {
                let Some(change) = self.pending.get_mut(&source).and_then(PendingQueue::pop) else {
                    break;
                };
                let key = change.change_key();
                match self.active.get(&key) {
                    Some(active) if change.score > active.change.score => {
                        tracing::debug!(
                            "Replacing {:?} of {} with {:?} (score {} > {})",
                            active.change.action,
                            change.key,
                            change.action,
                            change.score,
                            active.change.score
                        );
                        if let Some(entry) =
                            self.layers.iter_mut().find(|entry| entry.id == change.layer)
                        {
                            entry.layer.interrupt_in_flight(change.key);
                        }
                        if self.start(change) {
                            report.replaced += 1;
                            report.dispatched += 1;
                        }
                    }
                    Some(_) => {
                        tracing::trace!(
                            "Dropping duplicate {:?} for {}",
                            change.action,
                            change.key
                        );
                        report.dropped_duplicates += 1;
                    }
                    None => {
                        if self.start(change) {
                            report.dispatched += 1;
                        }
                    }
                }
            }
        }
    }

    fn drop_pending_for_active(&mut self) -> usize {
        let active = &self.active;
        let mut dropped = 0;
        for queue in self.pending.values_mut() {
            let before = queue.len();
            queue.retain(|change| !active.contains_key(&change.change_key()));
            dropped += before - queue.len();
        }
        if dropped > 0 {
            tracing::trace!("Dropped {} queued changes for in-flight keys", dropped);
        }
        dropped
    }

    /// Hand a change to its layer and mark it active. A change that replaces
    /// an active one reuses its concurrency slot.
    fn start(&mut self, change: ChangeRequest) -> bool {
        let dispatch = self.next_dispatch_id();
        let key = change.change_key();
        let Some(entry) = self.layers.iter_mut().find(|entry| entry.id == change.layer) else {
            tracing::trace!("Dropping change for unregistered {}", change.layer);
            return false;
        };
        tracing::trace!(
            "Dispatch {} {:?} {} of {} at LOD {}",
            dispatch,
            change.action,
            change.key,
            change.layer,
            change.lod
        );
        let change_source = key.source.clone();
        let completion = Completion::tracked(self.completion_tx.clone(), dispatch, key.clone());
        entry.layer.handle_tile(&change, completion);

        let previous = self.active.insert(
            key,
            ActiveChange {
                id: dispatch,
                change,
            },
        );
        if previous.is_none() {
            *self.in_flight.entry(change_source).or_insert(0) += 1;
        }
        true
    }

    fn release_active(&mut self, key: &ChangeKey) -> Option<ActiveChange> {
        let released = self.active.remove(key)?;
        if let Some(count) = self.in_flight.get_mut(&key.source) {
            *count = count.saturating_sub(1);
        }
        Some(released)
    }

    fn next_dispatch_id(&mut self) -> DispatchId {
        let id = DispatchId::new(self.next_dispatch);
        self.next_dispatch += 1;
        id
    }
}
