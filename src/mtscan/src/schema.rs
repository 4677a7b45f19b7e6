//! Schema of the analytic output database.

use rusqlite::Connection;

const SCHEMA_SQL: &str = "\
create table node (
  id integer primary key,
  name text not null unique,
  anthropocene integer not null
);

create table actor (
  id integer primary key,
  name text not null unique
);

create table nodes (
  pos_id integer primary key,
  x integer not null,
  y integer not null,
  z integer not null,
  actor_id integer not null,
  node_id integer not null,
  minegeld integer not null
);

create table inventory (
  pos_id integer not null,
  list_name text not null,
  item_string text not null
);

create index inventory_pos on inventory (pos_id);

create table blocks (
  block_id integer primary key,
  x integer not null,
  y integer not null,
  z integer not null,
  uniform integer not null,
  anthropocene integer not null,
  preserve integer not null
);
";

const SQL_CHECK_SCHEMA: &str = "\
select count(1) from sqlite_schema where type = 'table' and name = 'actor'";

/// Creates the output schema unless a previous open already did.
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    let tables: i64 = conn.query_row(SQL_CHECK_SCHEMA, [], |row| row.get(0))?;
    if tables > 0 {
        return Ok(());
    }

    conn.execute_batch(SCHEMA_SQL)?;
    log::info!("created output schema");
    Ok(())
}
