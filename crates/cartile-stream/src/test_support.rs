//! Fixtures shared by unit tests.

use std::cell::RefCell;
use std::rc::Rc;

use glam::DVec3;

use crate::change::{ChangeRequest, TileAction};
use crate::completion::Completion;
use crate::dataset::DataSet;
use crate::layer::Layer;
use crate::tile::{CancelToken, TileBounds, TileKey, TileMap, TileSize};
use crate::view::{ViewExtent, ViewProvider};

/// A view with a fixed camera and extent.
#[derive(Clone, Debug)]
pub struct FixedView {
    /// Reported camera position.
    pub position: DVec3,
    /// Returned by `visible_extent` before padding.
    pub extent: ViewExtent,
    /// Tiles must overlap this region to pass the frustum test.
    /// `None` lets everything through.
    pub visible_region: Option<ViewExtent>,
}

impl FixedView {
    pub fn new(position: DVec3, extent: ViewExtent) -> Self {
        Self {
            position,
            extent,
            visible_region: None,
        }
    }

    pub fn with_visible_region(mut self, region: ViewExtent) -> Self {
        self.visible_region = Some(region);
        self
    }
}

impl ViewProvider for FixedView {
    fn camera_position(&self) -> DVec3 {
        self.position
    }

    fn visible_extent(&self, padding: f64) -> ViewExtent {
        self.extent.padded(padding)
    }

    fn is_visible(&self, bounds: &TileBounds) -> bool {
        self.visible_region.is_none_or(|region| {
            bounds.min_x < region.max_x()
                && bounds.max_x > region.min_x
                && bounds.min_y < region.max_y()
                && bounds.max_y > region.min_y
        })
    }
}

/// Everything a [`RecordingLayer`] was asked to do.
#[derive(Debug, Default)]
pub struct Record {
    /// Every change passed to `handle_tile`, in order.
    pub handled: Vec<ChangeRequest>,
    /// Keys passed to `interrupt_in_flight`, in order.
    pub interrupts: Vec<TileKey>,
    /// Completions not yet fired, in dispatch order.
    pub completions: Vec<(ChangeRequest, Completion)>,
}

impl Record {
    pub fn actions(&self) -> Vec<(TileAction, TileKey)> {
        self.handled.iter().map(|c| (c.action, c.key)).collect()
    }

    /// Fire every held completion.
    pub fn complete_all(&mut self) {
        for (_, completion) in self.completions.drain(..) {
            completion.complete();
        }
    }

    /// Fire the held completion for `key`, if any.
    pub fn complete(&mut self, key: TileKey) -> bool {
        match self.completions.iter().position(|(c, _)| c.key == key) {
            Some(index) => {
                self.completions.remove(index).1.complete();
                true
            }
            None => false,
        }
    }
}

/// A layer that applies changes to its tile map and records the calls.
///
/// Completions are held until the test fires them through the shared record.
pub struct RecordingLayer {
    name: String,
    size: TileSize,
    priority: i32,
    enabled: bool,
    datasets: Vec<DataSet>,
    tiles: TileMap,
    record: Rc<RefCell<Record>>,
}

impl RecordingLayer {
    pub fn new(size: TileSize, datasets: Vec<DataSet>) -> Self {
        Self {
            name: "recording".to_string(),
            size,
            priority: 0,
            enabled: true,
            datasets,
            tiles: TileMap::new(),
            record: Rc::default(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn record(&self) -> Rc<RefCell<Record>> {
        Rc::clone(&self.record)
    }

    pub fn tiles_mut(&mut self) -> &mut TileMap {
        &mut self.tiles
    }
}

impl Layer for RecordingLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn tile_size(&self) -> TileSize {
        self.size
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn datasets(&self) -> &[DataSet] {
        &self.datasets
    }

    fn tiles(&self) -> &TileMap {
        &self.tiles
    }

    fn handle_tile(&mut self, change: &ChangeRequest, completion: Completion) {
        if let Some(state) = self.tiles.apply(change) {
            state.in_flight = Some(CancelToken::new());
        }
        let mut record = self.record.borrow_mut();
        record.handled.push(change.clone());
        record.completions.push((change.clone(), completion));
    }

    fn interrupt_in_flight(&mut self, key: TileKey) {
        self.tiles.interrupt(key);
        self.record.borrow_mut().interrupts.push(key);
    }
}
