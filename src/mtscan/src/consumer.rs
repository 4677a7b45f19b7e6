//! Worker loop: fetch, decode, annotate, queue output rows.

use std::{mem, sync::atomic::Ordering};

use mtscan_map::{MapBlock, MapBlockPos, NodePos};
use mtscan_store::{MapStore, StoreError};
use mtscan_utils::{BlobReader, LocalIdCache};

use crate::{annotation::NodeNameInfo, app::App, sink::NodeRow};

impl App {
    /// One worker. Symmetric and stateless apart from its id caches
    /// and its staging set of preserve seeds.
    pub(crate) fn run_consumer(&self) -> Result<(), StoreError> {
        log::trace!("consumer entry");

        let mut map = MapStore::open(self.config.driver, &self.config.map_location)?;
        let mut node_ids = LocalIdCache::new(&self.node_ids);
        let mut actor_ids = LocalIdCache::new(&self.actor_ids);
        let mut staging: Vec<MapBlockPos> = Vec::new();

        while let Some(batch) = self.queue.pop() {
            for id in batch {
                let pos = MapBlockPos::from_id(id);

                let Some(raw) = map.load(pos)? else {
                    self.counters.bad.fetch_add(1, Ordering::Relaxed);
                    log::warn!("failed to load mapblock {pos} {id}");
                    continue;
                };

                let mut blob = BlobReader::new(&raw);
                let mut block = match MapBlock::deserialize(&mut blob, &mut node_ids) {
                    Ok(block) => block,
                    Err(err) => {
                        self.counters.bad.fetch_add(1, Ordering::Relaxed);
                        log::warn!("failed to deserialize mapblock {pos} {id}: {err}");
                        continue;
                    }
                };

                self.counters.good.fetch_add(1, Ordering::Relaxed);
                self.process_block(pos, &mut block, &mut node_ids, &mut actor_ids, &mut staging);
            }
        }

        self.preserve.enqueue(mem::take(&mut staging));

        log::trace!("consumer exit");
        Ok(())
    }

    fn process_block(
        &self,
        pos: MapBlockPos,
        block: &mut MapBlock,
        node_ids: &mut LocalIdCache<'_, NodeNameInfo>,
        actor_ids: &mut LocalIdCache<'_, ()>,
        staging: &mut Vec<MapBlockPos>,
    ) {
        let mut rows = Vec::new();
        let mut anthropocene = false;

        for (index, node) in block.nodes_mut().iter_mut().enumerate() {
            let (name_anthropocene, is_bones) = {
                let entry = node_ids.entry(node.param0 as u64);
                (entry.extra.anthropocene, entry.key == "bones:bones")
            };
            anthropocene |= name_anthropocene;

            let owner = node.owner().unwrap_or("");
            let actor_id = if owner.is_empty() { 0 } else { actor_ids.add(owner) };

            let minegeld = if self.config.track_minegeld {
                node.inventory().total_minegeld()
            } else {
                0
            };
            let has_inventory = !node.inventory().is_empty();

            if minegeld > 0 || is_bones || has_inventory || actor_id > 0 {
                rows.push(NodeRow {
                    pos: NodePos::new(pos, index as u16),
                    actor_id,
                    node_id: node.param0,
                    minegeld,
                    inventory: node.take_inventory(),
                });
            }
        }

        let uniform = if block.unique_content_ids() == 1 {
            block.nodes()[0].param0
        } else {
            0
        };

        // The annotation must exist before the block id is queued for
        // the final flush.
        self.annotations.update(pos.id(), |a| {
            a.uniform = uniform;
            a.anthropocene = anthropocene;
        });
        self.sink.enqueue_block(pos);

        if !rows.is_empty() {
            self.sink.enqueue_nodes(rows);
        }

        if anthropocene {
            staging.push(pos);
            if staging.len() > self.config.preserve_threshold {
                self.preserve.enqueue(mem::take(staging));
            }
        }
    }
}
