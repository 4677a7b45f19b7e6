//! Aggregation of "preserve" seeds from the workers.
//!
//! Workers hand over sets of anthropocene block positions. A single
//! merge task expands each seed by the preserve radius and accumulates
//! the result, periodically draining it into the shared annotations to
//! bound memory on large worlds.

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex},
};

use rustc_hash::FxHashSet;

use mtscan_map::MapBlockPos;
use mtscan_utils::ShardedMap;

use crate::annotation::MapBlockAnnotation;

// Seed sets buffered before `enqueue` blocks its worker.
const MERGE_QUEUE_CAPACITY: usize = 64;

/// Channel of seed sets plus the accumulated final set.
///
/// An empty seed set is the tombstone; workers never send one.
pub struct PreserveQueue {
    radius: i32,
    limit: usize,

    merge_queue: Mutex<VecDeque<Vec<MapBlockPos>>>,
    cv: Condvar,

    final_set: Mutex<FxHashSet<MapBlockPos>>,
}

impl PreserveQueue {
    pub fn new(radius: u16, limit: usize) -> Self {
        Self {
            radius: radius as i32,
            limit,
            merge_queue: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
            final_set: Mutex::new(FxHashSet::default()),
        }
    }

    /// Hands a worker's staging set to the merge task. Empty sets are
    /// discarded; they would read as the tombstone.
    pub fn enqueue(&self, seeds: Vec<MapBlockPos>) {
        if seeds.is_empty() {
            return;
        }

        let guard = self.merge_queue.lock().expect("lock is poisoned");
        let mut guard = self
            .cv
            .wait_while(guard, |q| q.len() >= MERGE_QUEUE_CAPACITY)
            .expect("lock is poisoned");
        guard.push_back(seeds);
        self.cv.notify_all();
    }

    pub fn set_tombstone(&self) {
        let mut guard = self.merge_queue.lock().expect("lock is poisoned");
        guard.push_back(Vec::new());
        self.cv.notify_all();
    }

    /// The merge task. Exits once the tombstone is observed; whatever
    /// remains in the final set at that point is left for the driver
    /// to apply.
    pub fn run_merge(&self, annotations: &ShardedMap<MapBlockAnnotation>) {
        log::trace!("preserve merge entry");

        loop {
            let seeds = {
                let guard = self.merge_queue.lock().expect("lock is poisoned");
                let mut guard = self
                    .cv
                    .wait_while(guard, |q| q.is_empty())
                    .expect("lock is poisoned");

                // The tombstone stays in the queue.
                if guard.front().is_some_and(|s| s.is_empty()) {
                    break;
                }

                let seeds = guard.pop_front().expect("queue is non-empty");
                self.cv.notify_all();
                seeds
            };

            self.merge(seeds, annotations);
        }

        log::trace!("preserve merge exit");
    }

    fn merge(&self, seeds: Vec<MapBlockPos>, annotations: &ShardedMap<MapBlockAnnotation>) {
        let mut set = self.final_set.lock().expect("lock is poisoned");
        let r = self.radius;

        for seed in seeds {
            for z in seed.z as i32 - r..=seed.z as i32 + r {
                for y in seed.y as i32 - r..=seed.y as i32 + r {
                    for x in seed.x as i32 - r..=seed.x as i32 + r {
                        set.insert(MapBlockPos::new(x as i16, y as i16, z as i16));
                    }
                }
            }
        }

        if set.len() > self.limit {
            for pos in set.drain() {
                annotations.update(pos.id(), |a| a.preserve = true);
            }
        }
    }

    /// Takes the remaining final set, leaving it empty.
    pub fn surrender_final_set(&self) -> FxHashSet<MapBlockPos> {
        let mut set = self.final_set.lock().expect("lock is poisoned");
        std::mem::take(&mut set)
    }
}
