//! Simulated tile fetches on a pool of worker threads.
//!
//! Each job sleeps for a random latency to stand in for a network request.
//! Cancellation is checked before and after the wait; either way the job's
//! completion is signalled so the scheduler frees the slot.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cartile_stream::{CancelToken, Completion, TileAction, TileKey};
use crossbeam_channel::{Receiver, Sender, unbounded};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

/// A fetch handed to the pool by a layer.
pub struct FetchJob {
    /// Name of the submitting layer.
    pub layer: &'static str,
    /// Transition being fetched.
    pub action: TileAction,
    /// Tile being fetched.
    pub key: TileKey,
    /// Target LOD.
    pub lod: usize,
    /// Set when the layer interrupts the fetch.
    pub cancel: CancelToken,
    /// Signalled once the job settles.
    pub completion: Completion,
}

/// What happened to a job, reported back to the main thread for stats.
#[derive(Clone, Debug)]
pub struct FetchOutcome {
    /// Name of the submitting layer.
    pub layer: &'static str,
    /// Tile that was fetched.
    pub key: TileKey,
    /// Target LOD.
    pub lod: usize,
    /// Whether the fetch was interrupted.
    pub cancelled: bool,
    /// Time from pickup to completion.
    pub elapsed: Duration,
}

/// Worker threads that run [`FetchJob`]s.
pub struct FetchPool {
    jobs: Option<Sender<FetchJob>>,
    outcomes: Receiver<FetchOutcome>,
    workers: Vec<JoinHandle<()>>,
}

impl FetchPool {
    /// Spawn `threads` workers. Latencies are drawn from `latency_ms`
    /// (inclusive) with one generator per worker derived from `seed`.
    pub fn new(threads: usize, latency_ms: (u64, u64), seed: u64) -> std::io::Result<Self> {
        let (job_tx, job_rx) = unbounded::<FetchJob>();
        let (outcome_tx, outcome_rx) = unbounded::<FetchOutcome>();
        let (min_ms, max_ms) = (latency_ms.0.min(latency_ms.1), latency_ms.0.max(latency_ms.1));

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let jobs = job_rx.clone();
            let outcomes = outcome_tx.clone();
            let mut rng = Xoshiro256StarStar::seed_from_u64(seed.wrapping_add(index as u64));

            let handle = std::thread::Builder::new()
                .name(format!("tile-fetch-{index}"))
                .spawn(move || {
                    while let Ok(job) = jobs.recv() {
                        let start = Instant::now();
                        let mut cancelled = job.cancel.is_cancelled();
                        if !cancelled {
                            let latency = rng.gen_range(min_ms..=max_ms);
                            std::thread::sleep(Duration::from_millis(latency));
                            cancelled = job.cancel.is_cancelled();
                        }
                        tracing::trace!(
                            "{} {:?} {} LOD {} {}",
                            job.layer,
                            job.action,
                            job.key,
                            job.lod,
                            if cancelled { "cancelled" } else { "fetched" }
                        );
                        job.completion.complete();
                        let _ = outcomes.send(FetchOutcome {
                            layer: job.layer,
                            key: job.key,
                            lod: job.lod,
                            cancelled,
                            elapsed: start.elapsed(),
                        });
                    }
                })?;
            workers.push(handle);
        }

        Ok(Self {
            jobs: Some(job_tx),
            outcomes: outcome_rx,
            workers,
        })
    }

    /// Handle for submitting jobs.
    pub fn submitter(&self) -> Option<Sender<FetchJob>> {
        self.jobs.clone()
    }

    /// Outcomes reported since the last call.
    pub fn drain_outcomes(&self) -> Vec<FetchOutcome> {
        self.outcomes.try_iter().collect()
    }

    /// Stop accepting jobs and wait for the workers to finish the queue.
    ///
    /// Workers only exit once every submitter handle has been dropped.
    pub fn shutdown(mut self) {
        self.jobs.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!("Fetch worker panicked");
            }
        }
    }
}
