//! Buffered, transactional writing of the analytic output.
//!
//! Workers append rows to the in-memory [`Queues`] while the scan runs;
//! the driver drains everything into the database in a fixed order once
//! the pipeline has been joined. The id tables must always be flushed
//! before the row streams that carry references into them.

use std::{path::Path, sync::Mutex};

use rusqlite::{Connection, params};

use mtscan_map::{Inventory, MapBlockPos, NodePos};
use mtscan_utils::{IdTable, ShardedMap};

use crate::{
    annotation::{MapBlockAnnotation, NodeNameInfo},
    schema,
};

const SQL_WRITE_NODE_ID: &str = "\
insert into node (id, name, anthropocene) values (?1, ?2, ?3)";

const SQL_WRITE_ACTOR_ID: &str = "\
insert into actor (id, name) values (?1, ?2)";

const SQL_WRITE_NODE: &str = "\
insert into nodes (pos_id, x, y, z, actor_id, node_id, minegeld)
values (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

const SQL_WRITE_INVENTORY: &str = "\
insert into inventory (pos_id, list_name, item_string) values (?1, ?2, ?3)";

const SQL_WRITE_BLOCK: &str = "\
insert into blocks (block_id, x, y, z, uniform, anthropocene, preserve)
values (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

/// One node of interest, queued by a worker.
pub struct NodeRow {
    pub pos: NodePos,
    pub actor_id: u64,
    pub node_id: u16,
    pub minegeld: u64,
    pub inventory: Inventory,
}

/// Thread-safe buffers between the workers and the writer.
#[derive(Default)]
pub struct Queues {
    nodes: Mutex<Vec<NodeRow>>,
    blocks: Mutex<Vec<MapBlockPos>>,
}

impl Queues {
    pub fn enqueue_nodes(&self, rows: Vec<NodeRow>) {
        self.nodes.lock().expect("lock is poisoned").extend(rows);
    }

    /// Queues a block for the annotation flush. Its annotation record
    /// must already exist; the flush reads it at write time.
    pub fn enqueue_block(&self, pos: MapBlockPos) {
        self.blocks.lock().expect("lock is poisoned").push(pos);
    }

    fn take_nodes(&self) -> Vec<NodeRow> {
        std::mem::take(&mut self.nodes.lock().expect("lock is poisoned"))
    }

    fn take_blocks(&self) -> Vec<MapBlockPos> {
        std::mem::take(&mut self.blocks.lock().expect("lock is poisoned"))
    }
}

/// Owns the output database connection. Driver-thread only.
pub struct Writer {
    conn: Connection,
}

impl Writer {
    /// Opens (and creates, if needed) the output database.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        schema::ensure_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Writes all node names interned since the last flush.
    pub fn flush_node_ids(&mut self, ids: &IdTable<NodeNameInfo>) -> rusqlite::Result<()> {
        let dirty = ids.take_dirty();
        if dirty.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(SQL_WRITE_NODE_ID)?;
            for entry in &dirty {
                stmt.execute(params![entry.id as i64, entry.key, entry.extra.anthropocene])?;
            }
        }
        tx.commit()
    }

    /// Writes all actor names interned since the last flush.
    pub fn flush_actor_ids(&mut self, ids: &IdTable<()>) -> rusqlite::Result<()> {
        let dirty = ids.take_dirty();
        if dirty.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(SQL_WRITE_ACTOR_ID)?;
            for entry in &dirty {
                stmt.execute(params![entry.id as i64, entry.key])?;
            }
        }
        tx.commit()
    }

    /// Drains the queued nodes of interest, one `nodes` row each plus
    /// one `inventory` row per non-empty item.
    pub fn flush_nodes(&mut self, queues: &Queues) -> rusqlite::Result<()> {
        let rows = queues.take_nodes();
        if rows.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut node_stmt = tx.prepare_cached(SQL_WRITE_NODE)?;
            let mut inv_stmt = tx.prepare_cached(SQL_WRITE_INVENTORY)?;

            for row in &rows {
                let pos_id = row.pos.id();
                node_stmt.execute(params![
                    pos_id,
                    row.pos.x,
                    row.pos.y,
                    row.pos.z,
                    row.actor_id as i64,
                    row.node_id,
                    row.minegeld as i64,
                ])?;

                for (list_name, items) in row.inventory.lists() {
                    for item in items {
                        // Empty strings are placeholder slots.
                        if !item.is_empty() {
                            inv_stmt.execute(params![pos_id, list_name, item])?;
                        }
                    }
                }
            }
        }
        tx.commit()
    }

    /// Drains the queued blocks, reading each annotation from the
    /// sharded map as it is written so late preserve bits are captured.
    pub fn flush_blocks(
        &mut self,
        queues: &Queues,
        annotations: &ShardedMap<MapBlockAnnotation>,
    ) -> rusqlite::Result<()> {
        let blocks = queues.take_blocks();
        if blocks.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(SQL_WRITE_BLOCK)?;
            for pos in &blocks {
                let annotation = annotations.get(pos.id()).unwrap_or_default();
                stmt.execute(params![
                    pos.id(),
                    pos.x,
                    pos.y,
                    pos.z,
                    annotation.uniform,
                    annotation.anthropocene,
                    annotation.preserve,
                ])?;
            }
        }
        tx.commit()
    }
}
