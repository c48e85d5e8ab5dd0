//! Demo layers whose tile work runs on the fetch pool.

use cartile_stream::{
    CancelToken, ChangeRequest, Completion, DataSet, Layer, TileKey, TileMap, TileSize,
};
use crossbeam_channel::Sender;

use crate::fetch::FetchJob;

pub struct SimulatedLayer {
    name: &'static str,
    size: TileSize,
    priority: i32,
    datasets: Vec<DataSet>,
    tiles: TileMap,
    jobs: Sender<FetchJob>,
}

impl SimulatedLayer {
    pub fn new(
        name: &'static str,
        size: TileSize,
        priority: i32,
        datasets: Vec<DataSet>,
        jobs: Sender<FetchJob>,
    ) -> Self {
        Self {
            name,
            size,
            priority,
            datasets,
            tiles: TileMap::new(),
            jobs,
        }
    }
}

impl Layer for SimulatedLayer {
    fn name(&self) -> &str {
        self.name
    }

    fn tile_size(&self) -> TileSize {
        self.size
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn datasets(&self) -> &[DataSet] {
        &self.datasets
    }

    fn tiles(&self) -> &TileMap {
        &self.tiles
    }

    fn handle_tile(&mut self, change: &ChangeRequest, completion: Completion) {
        // Removes are synchronous: dropping the tile is all there is to do.
        let Some(state) = self.tiles.apply(change) else {
            completion.complete();
            return;
        };
        state.interrupt();
        let cancel = CancelToken::new();
        state.in_flight = Some(cancel.clone());

        let job = FetchJob {
            layer: self.name,
            action: change.action,
            key: change.key,
            lod: change.lod,
            cancel,
            completion,
        };
        // A closed pool drops the job, and with it the completion.
        if self.jobs.send(job).is_err() {
            tracing::warn!("{}: fetch pool closed, dropping {}", self.name, change.key);
        }
    }

    fn interrupt_in_flight(&mut self, key: TileKey) {
        self.tiles.interrupt(key);
    }
}
