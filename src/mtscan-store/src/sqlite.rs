//! The embedded `map.sqlite` back-end.

use mtscan_map::MapBlockPos;
use rusqlite::{Connection, OpenFlags, OptionalExtension};

use crate::StoreError;

const SQL_LOAD_BLOCK: &str = "select data from blocks where pos = ?1";

const SQL_LIST_BLOCKS: &str = "select pos from blocks where pos between ?1 and ?2";

/// World database stored as a single SQLite file, keyed by the packed
/// 48-bit block id.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    pub fn load(&mut self, pos: MapBlockPos) -> Result<Option<Vec<u8>>, StoreError> {
        let mut stmt = self.conn.prepare_cached(SQL_LOAD_BLOCK)?;
        let blob = stmt
            .query_row([pos.id()], |row| row.get::<_, Vec<u8>>(0))
            .optional()?;
        Ok(blob)
    }

    pub fn produce(
        &mut self,
        min: MapBlockPos,
        max: MapBlockPos,
        mut cb: impl FnMut(MapBlockPos) -> bool,
    ) -> Result<bool, StoreError> {
        let mut stmt = self.conn.prepare_cached(SQL_LIST_BLOCKS)?;
        let mut rows = stmt.query([min.id(), max.id()])?;

        while let Some(row) = rows.next()? {
            let pos = MapBlockPos::from_id(row.get(0)?);

            // The id range is not monotonic per axis; rows between the
            // two ids can still lie outside the requested cube.
            if !pos.inside(min, max) {
                continue;
            }

            if !cb(pos) {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
