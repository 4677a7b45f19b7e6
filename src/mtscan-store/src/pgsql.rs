//! The PostgreSQL world database back-end.
//!
//! Block coordinates live in separate `posx`/`posy`/`posz` integer
//! columns here, unlike the packed id the SQLite schema uses.

use mtscan_map::MapBlockPos;
use postgres::{Client, NoTls, Statement};

use crate::StoreError;

const SQL_LOAD_BLOCK: &str = "\
select data from blocks where posx = $1 and posy = $2 and posz = $3";

const SQL_LIST_BLOCKS: &str = "\
select posx, posy, posz from blocks \
where posx between $1 and $2 and posy between $3 and $4 and posz between $5 and $6";

pub struct PostgresStore {
    client: Client,
    load_block: Statement,
    list_blocks: Statement,
}

impl PostgresStore {
    pub fn open(connection_str: &str) -> Result<Self, StoreError> {
        let mut client = Client::connect(connection_str, NoTls)?;
        let load_block = client.prepare(SQL_LOAD_BLOCK)?;
        let list_blocks = client.prepare(SQL_LIST_BLOCKS)?;

        Ok(Self {
            client,
            load_block,
            list_blocks,
        })
    }

    pub fn load(&mut self, pos: MapBlockPos) -> Result<Option<Vec<u8>>, StoreError> {
        let row = self.client.query_opt(
            &self.load_block,
            &[&(pos.x as i32), &(pos.y as i32), &(pos.z as i32)],
        )?;

        Ok(row.map(|row| row.get::<_, Vec<u8>>(0)))
    }

    pub fn produce(
        &mut self,
        min: MapBlockPos,
        max: MapBlockPos,
        mut cb: impl FnMut(MapBlockPos) -> bool,
    ) -> Result<bool, StoreError> {
        let rows = self.client.query(
            &self.list_blocks,
            &[
                &(min.x as i32),
                &(max.x as i32),
                &(min.y as i32),
                &(max.y as i32),
                &(min.z as i32),
                &(max.z as i32),
            ],
        )?;

        for row in rows {
            let pos = MapBlockPos::new(
                row.get::<_, i32>(0) as i16,
                row.get::<_, i32>(1) as i16,
                row.get::<_, i32>(2) as i16,
            );

            // `between` is inclusive; trim the upper faces of the cube.
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
