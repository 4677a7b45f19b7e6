//! Read access to the `map.sqlite` world database (or its PostgreSQL
//! equivalent).
//!
//! The back-end set is closed, so [`MapStore`] is a plain two-variant
//! enum rather than a trait object.

#![deny(rust_2018_idioms, rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

use mtscan_map::MapBlockPos;
use thiserror::Error;

mod pgsql;
pub use pgsql::PostgresStore;

mod sqlite;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("postgresql: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("not implemented: {0}")]
    Unimplemented(&'static str),
}

/// Which back-end to open a world database with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverKind {
    /// Embedded `map.sqlite` file; the location is its path.
    Sqlite,
    /// Remote server; the location is a connection string such as
    /// `user=minetest password=... dbname=world port=5432`.
    Postgres,
}

/// An open world database.
pub enum MapStore {
    Sqlite(SqliteStore),
    Postgres(PostgresStore),
}

impl MapStore {
    pub fn open(kind: DriverKind, location: &str) -> Result<Self, StoreError> {
        match kind {
            DriverKind::Sqlite => SqliteStore::open(location).map(Self::Sqlite),
            DriverKind::Postgres => PostgresStore::open(location).map(Self::Postgres),
        }
    }

    /// Loads the serialized block at `pos`, or `None` when the world
    /// has no block there.
    pub fn load(&mut self, pos: MapBlockPos) -> Result<Option<Vec<u8>>, StoreError> {
        match self {
            Self::Sqlite(s) => s.load(pos),
            Self::Postgres(s) => s.load(pos),
        }
    }

    /// Invokes `cb` for every block inside the half-open cube
    /// `[min, max)`.
    ///
    /// Returns `false` when `cb` stopped the iteration early, `true`
    /// after the full range was visited.
    pub fn produce(
        &mut self,
        min: MapBlockPos,
        max: MapBlockPos,
        cb: impl FnMut(MapBlockPos) -> bool,
    ) -> Result<bool, StoreError> {
        match self {
            Self::Sqlite(s) => s.produce(min, max, cb),
            Self::Postgres(s) => s.produce(min, max, cb),
        }
    }

    /// Bulk deletion is part of the interface contract but not offered
    /// by any back-end yet.
    pub fn delete(&mut self, _blocks: &[MapBlockPos]) -> Result<(), StoreError> {
        match self {
            Self::Sqlite(_) => Err(StoreError::Unimplemented("SqliteStore::delete")),
            Self::Postgres(_) => Err(StoreError::Unimplemented("PostgresStore::delete")),
        }
    }
}
