//! The single producer feeding the work queue.

use std::{mem, sync::atomic::Ordering};

use mtscan_store::{MapStore, StoreError};

use crate::{app::App, queue::BATCH_SIZE};

impl App {
    /// Enumerates the requested block range into the work queue in
    /// fixed-size batches, then posts the tombstone.
    pub(crate) fn run_producer(&self) -> Result<(), StoreError> {
        log::trace!("producer entry");

        let mut map = MapStore::open(self.config.driver, &self.config.map_location)?;

        let mut batch = Vec::with_capacity(BATCH_SIZE);
        map.produce(self.config.min_pos, self.config.max_pos, |pos| {
            batch.push(pos.id());
            if batch.len() == BATCH_SIZE {
                self.counters.queued.fetch_add(batch.len() as u64, Ordering::Relaxed);
                self.queue.push(mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE)));
            }
            true
        })?;

        if !batch.is_empty() {
            self.counters.queued.fetch_add(batch.len() as u64, Ordering::Relaxed);
            self.queue.push(batch);
        }

        log::info!("mapblocks: {}", self.counters.queued());
        self.queue.set_tombstone();

        log::trace!("producer exit");
        Ok(())
    }
}
