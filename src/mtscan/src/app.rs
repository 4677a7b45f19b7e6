//! The pipeline driver: one producer, a pool of workers, one preserve
//! merge task, and the terminal flush of everything into the output
//! database.

use std::{
    io::{self, Write},
    process, thread,
    time::{Duration, Instant},
};

use eyre::WrapErr;

use mtscan_map::NameFilter;
use mtscan_utils::{IdTable, ShardedMap};

use crate::{
    annotation::{MapBlockAnnotation, NodeNameInfo},
    config::Config,
    preserve::PreserveQueue,
    queue::BlockQueue,
    sink::{Queues, Writer},
    stats::{self, Counters},
};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Everything the pipeline stages share.
pub struct App {
    pub(crate) config: Config,
    pub(crate) node_ids: IdTable<NodeNameInfo>,
    pub(crate) actor_ids: IdTable<()>,
    pub(crate) queue: BlockQueue,
    pub(crate) preserve: PreserveQueue,
    pub(crate) annotations: ShardedMap<MapBlockAnnotation>,
    pub(crate) sink: Queues,
    pub(crate) counters: Counters,
}

impl App {
    pub fn new(config: Config) -> eyre::Result<Self> {
        let filter = match &config.pattern_path {
            Some(path) => NameFilter::load(path)
                .wrap_err_with(|| format!("failed to load pattern file {}", path.display()))?,
            None => NameFilter::new(),
        };
        log::debug!("name filter patterns: {}", filter.len());

        let node_ids = IdTable::new(move |name: &str| NodeNameInfo {
            anthropocene: filter.search(name),
        });
        let actor_ids = IdTable::new(|_: &str| ());

        // Reserved sentinel rows, installed before any thread starts.
        for name in ["", "ignore", "air"] {
            node_ids.add(name);
        }
        actor_ids.add("");

        let queue = if config.threads == 0 {
            // The producer finishes before the worker loop starts, so
            // the queue must hold the entire range.
            BlockQueue::unbounded()
        } else {
            BlockQueue::bounded()
        };
        let preserve = PreserveQueue::new(config.preserve_radius, config.preserve_limit);

        Ok(Self {
            config,
            node_ids,
            actor_ids,
            queue,
            preserve,
            annotations: ShardedMap::new(),
            sink: Queues::default(),
            counters: Counters::default(),
        })
    }

    pub fn run(&self) -> eyre::Result<()> {
        let mut writer = Writer::open(&self.config.out_path).wrap_err_with(|| {
            format!("failed to open output database {}", self.config.out_path.display())
        })?;

        let scan_start = Instant::now();
        if self.config.threads == 0 {
            self.run_serially()?;
        } else {
            self.run_threaded();
        }
        let scan_time = scan_start.elapsed();

        let flush_start = Instant::now();

        // Id tables first; the row streams carry references into them.
        writer
            .flush_node_ids(&self.node_ids)
            .wrap_err("failed to flush node ids")?;
        writer
            .flush_actor_ids(&self.actor_ids)
            .wrap_err("failed to flush actor ids")?;

        // The merge task has been joined, so the remaining set is ours.
        for pos in self.preserve.surrender_final_set() {
            self.annotations.update(pos.id(), |a| a.preserve = true);
        }

        writer.flush_nodes(&self.sink).wrap_err("failed to flush node rows")?;
        writer
            .flush_blocks(&self.sink, &self.annotations)
            .wrap_err("failed to flush block annotations")?;

        let flush_time = flush_start.elapsed();
        self.counters.sample_memory();

        let total = self.counters.total_blocks();
        let rate = total as f64 / scan_time.as_secs_f64().max(f64::EPSILON);
        log::info!(
            "processed {total} blocks in {:.2} seconds, {rate:.2} blocks/sec",
            scan_time.as_secs_f64()
        );

        if let Some(stats_path) = &self.config.stats_path {
            stats::append_stats_line(
                stats_path,
                self.config.threads,
                self.counters.queued(),
                scan_time.as_secs_f64(),
                flush_time.as_secs_f64(),
                self.counters.peak_vsize(),
            )
            .wrap_err("failed to append stats line")?;
        }

        Ok(())
    }

    /// Runs every stage in order on the calling thread. Meant for
    /// debugging; store errors surface instead of killing the process.
    fn run_serially(&self) -> eyre::Result<()> {
        self.run_producer().wrap_err("producer failed")?;
        self.run_consumer().wrap_err("worker failed")?;
        self.preserve.set_tombstone();
        self.preserve.run_merge(&self.annotations);
        Ok(())
    }

    fn run_threaded(&self) {
        thread::scope(|s| {
            let producer = s.spawn(|| {
                if let Err(err) = self.run_producer() {
                    log::error!("fatal producer error: {err}");
                    process::exit(1);
                }
            });

            let workers: Vec<_> = (0..self.config.threads)
                .map(|_| {
                    s.spawn(|| {
                        if let Err(err) = self.run_consumer() {
                            log::error!("fatal worker error: {err}");
                            process::exit(1);
                        }
                    })
                })
                .collect();

            let merger = s.spawn(|| self.preserve.run_merge(&self.annotations));

            while self.queue.idle_wait(PROGRESS_INTERVAL) {
                self.report_progress();
            }

            // Join order matters: the producer has posted the work
            // tombstone, the workers drain it, and only then may the
            // preserve channel be tombstoned so no seed set is lost.
            producer.join().expect("producer thread panicked");
            for worker in workers {
                worker.join().expect("worker thread panicked");
            }

            self.preserve.set_tombstone();
            merger.join().expect("preserve merge thread panicked");
        });

        self.report_progress();
        eprintln!();
    }

    /// One line, repainted in place so interleaved log output does not
    /// shred it.
    fn report_progress(&self) {
        self.counters.sample_memory();
        eprint!(
            "\r\x1b[K{} queued, {} good, {} bad, peak rss {} MiB, peak vsize {} MiB",
            self.counters.queued(),
            self.counters.good(),
            self.counters.bad(),
            self.counters.peak_rss() >> 20,
            self.counters.peak_vsize() >> 20,
        );
        let _ = io::stderr().flush();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use rusqlite::Connection;

    use mtscan_map::{MapBlockPos, NodePos, NODES_PER_BLOCK};
    use mtscan_store::DriverKind;

    use super::App;
    use crate::config::Config;

    // Pre-seeded sentinel ids ("", "ignore", "air") occupy 0..=2.
    const AIR_ID: i64 = 2;
    const FIRST_FRESH_ID: i64 = 3;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn node_data(param0: &[u16]) -> Vec<u8> {
        let mut out = Vec::with_capacity(NODES_PER_BLOCK * 4);
        for p in param0 {
            out.extend_from_slice(&p.to_be_bytes());
        }
        out.resize(NODES_PER_BLOCK * 4, 0);
        out
    }

    fn name_id_table(entries: &[(u16, &str)]) -> Vec<u8> {
        let mut out = vec![0u8];
        out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
        for (id, name) in entries {
            out.extend_from_slice(&id.to_be_bytes());
            out.extend_from_slice(&(name.len() as u16).to_be_bytes());
            out.extend_from_slice(name.as_bytes());
        }
        out
    }

    fn metadata(entries: &[(u16, &[(&str, &str)], &str)]) -> Vec<u8> {
        let mut out = vec![2u8];
        out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
        for (pos, vars, inventory) in entries {
            out.extend_from_slice(&pos.to_be_bytes());
            out.extend_from_slice(&(vars.len() as u32).to_be_bytes());
            for (key, value) in *vars {
                out.extend_from_slice(&(key.len() as u16).to_be_bytes());
                out.extend_from_slice(key.as_bytes());
                out.extend_from_slice(&(value.len() as u32).to_be_bytes());
                out.extend_from_slice(value.as_bytes());
                out.push(0);
            }
            out.extend_from_slice(inventory.as_bytes());
        }
        out
    }

    fn v28_block(param0: &[u16], names: &[(u16, &str)], meta: &[u8]) -> Vec<u8> {
        let mut out = vec![28, 0, 0xff, 0xff, 2, 2];
        out.extend_from_slice(&zlib(&node_data(param0)));
        out.extend_from_slice(&zlib(meta));
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&name_id_table(names));
        out.extend_from_slice(&[10, 0, 0]);
        out
    }

    fn v29_block(param0: &[u16], names: &[(u16, &str)], meta: &[u8]) -> Vec<u8> {
        let mut inner = vec![0u8, 0xff, 0xff];
        inner.extend_from_slice(&0u32.to_be_bytes());
        inner.extend_from_slice(&name_id_table(names));
        inner.extend_from_slice(&[2, 2]);
        inner.extend_from_slice(&node_data(param0));
        inner.extend_from_slice(meta);
        inner.extend_from_slice(&[0, 0, 0]);
        inner.extend_from_slice(&[10, 0, 0]);

        let mut out = vec![29];
        out.extend_from_slice(&zstd::encode_all(&inner[..], 0).unwrap());
        out
    }

    fn air_block() -> Vec<u8> {
        v28_block(&[0; NODES_PER_BLOCK], &[(0, "air")], &[0])
    }

    fn world(dir: &tempfile::TempDir, blocks: &[(MapBlockPos, Vec<u8>)]) -> String {
        let path = dir.path().join("map.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("create table blocks (pos integer primary key, data blob not null)")
            .unwrap();
        for (pos, data) in blocks {
            conn.execute(
                "insert into blocks (pos, data) values (?1, ?2)",
                rusqlite::params![pos.id(), data],
            )
            .unwrap();
        }
        path.to_str().unwrap().to_owned()
    }

    fn test_config(dir: &tempfile::TempDir, map: String) -> Config {
        Config {
            min_pos: MapBlockPos::MIN,
            max_pos: MapBlockPos::MAX,
            driver: DriverKind::Sqlite,
            map_location: map,
            out_path: dir.path().join("out.sqlite"),
            pattern_path: None,
            stats_path: None,
            threads: 0,
            max_load_avg: 1.0,
            preserve_radius: 5,
            preserve_threshold: 2048,
            preserve_limit: 32768,
            track_minegeld: false,
        }
    }

    fn run(config: Config) -> (App, Connection) {
        let out_path = config.out_path.clone();
        let app = App::new(config).unwrap();
        app.run().unwrap();
        (app, Connection::open(out_path).unwrap())
    }

    fn count(conn: &Connection, sql: &str) -> i64 {
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn bones_block_yields_one_owned_row() {
        let dir = tempfile::tempdir().unwrap();

        let mut param0 = [0u16; NODES_PER_BLOCK];
        param0[42] = 1;
        let block = v28_block(
            &param0,
            &[(0, "air"), (1, "bones:bones")],
            &metadata(&[(42, &[("owner", "alice")], "EndInventory\n")]),
        );

        let map = world(&dir, &[(MapBlockPos::new(0, 0, 0), block)]);
        let (app, out) = run(test_config(&dir, map));

        assert_eq!(app.counters.good(), 1);
        assert_eq!(app.counters.bad(), 0);

        // Sentinels plus the two names from the block.
        assert_eq!(count(&out, "select count(1) from node"), 4);
        let bones: i64 = out
            .query_row("select id from node where name = 'bones:bones'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(bones, FIRST_FRESH_ID);

        let alice: i64 = out
            .query_row("select id from actor where name = 'alice'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(alice, 1);

        assert_eq!(count(&out, "select count(1) from nodes"), 1);
        let expected_pos = NodePos::new(MapBlockPos::new(0, 0, 0), 42);
        let (pos_id, actor_id, node_id, minegeld): (i64, i64, i64, i64) = out
            .query_row(
                "select pos_id, actor_id, node_id, minegeld from nodes",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(pos_id, expected_pos.id());
        assert_eq!(actor_id, alice);
        assert_eq!(node_id, bones);
        assert_eq!(minegeld, 0);

        // Two distinct contents, so the block is not uniform.
        let uniform: i64 = out
            .query_row("select uniform from blocks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(uniform, 0);
    }

    #[test]
    fn uniform_air_terrain_v29() {
        let dir = tempfile::tempdir().unwrap();
        let block = v29_block(&[0; NODES_PER_BLOCK], &[(0, "air")], &[0]);
        let map = world(&dir, &[(MapBlockPos::new(3, -1, 2), block)]);

        let (app, out) = run(test_config(&dir, map));

        assert_eq!(app.counters.good(), 1);
        assert_eq!(count(&out, "select count(1) from nodes"), 0);
        assert_eq!(count(&out, "select count(1) from inventory"), 0);

        let uniform: i64 = out
            .query_row("select uniform from blocks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(uniform, AIR_ID);
    }

    #[test]
    fn currency_chest_is_tallied() {
        let dir = tempfile::tempdir().unwrap();

        let inventory = "List main 32\n\
                         Item currency:minegeld_10 3\n\
                         Item currency:minegeld_25\n\
                         Item currency:minegeld_bundle\n\
                         EndInventoryList\n\
                         EndInventory\n";
        let block = v28_block(
            &[0; NODES_PER_BLOCK],
            &[(0, "default:chest")],
            &metadata(&[(0, &[], inventory)]),
        );

        let map = world(&dir, &[(MapBlockPos::new(1, 0, 0), block)]);
        let mut config = test_config(&dir, map);
        config.track_minegeld = true;
        let (_, out) = run(config);

        assert_eq!(count(&out, "select count(1) from nodes"), 1);
        let (pos_id, minegeld): (i64, i64) = out
            .query_row("select pos_id, minegeld from nodes", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(pos_id, NodePos::new(MapBlockPos::new(1, 0, 0), 0).id());
        assert_eq!(minegeld, 30 + 25);

        // Placeholder slots write no rows; the bundle is an item like
        // any other.
        assert_eq!(count(&out, "select count(1) from inventory"), 3);
        let uniform: i64 = out
            .query_row("select uniform from blocks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(uniform, FIRST_FRESH_ID);
    }

    #[test]
    fn anthropocene_preserve_propagation() {
        let dir = tempfile::tempdir().unwrap();

        let pattern_path = dir.path().join("patterns.txt");
        std::fs::write(&pattern_path, "# player-built things\ndefault:mese\n").unwrap();

        let mut blocks = Vec::new();
        for z in -3i16..=3 {
            for y in -3i16..=3 {
                for x in -3i16..=3 {
                    blocks.push((MapBlockPos::new(x, y, z), air_block()));
                }
            }
        }
        let mut param0 = [0u16; NODES_PER_BLOCK];
        param0[0] = 1;
        let mid = blocks.len() / 2;
        blocks[mid] = (
            MapBlockPos::new(0, 0, 0),
            v28_block(&param0, &[(0, "air"), (1, "default:mese")], &[0]),
        );

        let map = world(&dir, &blocks);
        let mut config = test_config(&dir, map);
        config.pattern_path = Some(pattern_path);
        config.preserve_radius = 2;
        config.threads = 2;
        let (app, out) = run(config);

        assert_eq!(app.counters.good(), 343);
        assert_eq!(count(&out, "select count(1) from blocks"), 343);
        assert_eq!(count(&out, "select count(1) from blocks where anthropocene = 1"), 1);

        // The closed 5x5x5 cube around the origin and nothing else.
        assert_eq!(count(&out, "select count(1) from blocks where preserve = 1"), 125);
        assert_eq!(
            count(
                &out,
                "select count(1) from blocks where preserve = 1 \
                 and (abs(x) > 2 or abs(y) > 2 or abs(z) > 2)"
            ),
            0
        );
    }

    #[test]
    fn malformed_block_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();

        let mut bad = air_block();
        bad[4] = 3; // content_width

        let map = world(
            &dir,
            &[
                (MapBlockPos::new(0, 0, 0), air_block()),
                (MapBlockPos::new(1, 0, 0), bad),
            ],
        );
        let (app, out) = run(test_config(&dir, map));

        assert_eq!(app.counters.good(), 1);
        assert_eq!(app.counters.bad(), 1);

        assert_eq!(count(&out, "select count(1) from blocks"), 1);
        let block_id: i64 = out
            .query_row("select block_id from blocks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(block_id, MapBlockPos::new(0, 0, 0).id());
    }

    #[test]
    fn range_restriction_touches_only_the_requested_block() {
        let dir = tempfile::tempdir().unwrap();

        let positions = [
            MapBlockPos::new(5, 6, 7),
            MapBlockPos::new(0, 0, 0),
            MapBlockPos::new(5, 6, 8),
            MapBlockPos::new(4, 6, 7),
            MapBlockPos::new(2047, 0, 0),
        ];
        let blocks: Vec<_> = positions.iter().map(|&p| (p, air_block())).collect();

        let map = world(&dir, &blocks);
        let mut config = test_config(&dir, map);
        config.min_pos = MapBlockPos::new(5, 6, 7);
        config.max_pos = MapBlockPos::new(6, 7, 8);
        let (app, out) = run(config);

        assert_eq!(app.counters.queued(), 1);
        assert_eq!(count(&out, "select count(1) from blocks"), 1);
        let block_id: i64 = out
            .query_row("select block_id from blocks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(block_id, MapBlockPos::new(5, 6, 7).id());
    }

    fn dump(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("select * from {table}"))
            .unwrap();
        let columns = stmt.column_count();
        let mut rows: Vec<String> = stmt
            .query_map([], |row| {
                let mut line = String::new();
                for i in 0..columns {
                    let value: rusqlite::types::Value = row.get(i)?;
                    line.push_str(&format!("{value:?};"));
                }
                Ok(line)
            })
            .unwrap()
            .map(|row| row.unwrap())
            .collect();
        rows.sort();
        rows
    }

    #[test]
    fn rerun_produces_identical_contents() {
        let dir = tempfile::tempdir().unwrap();

        let mut param0 = [0u16; NODES_PER_BLOCK];
        param0[42] = 1;
        let bones = v28_block(
            &param0,
            &[(0, "air"), (1, "bones:bones")],
            &metadata(&[(42, &[("_owner", "bob")], "EndInventory\n")]),
        );
        let map = world(
            &dir,
            &[
                (MapBlockPos::new(0, 0, 0), bones),
                (MapBlockPos::new(1, 0, 0), air_block()),
            ],
        );

        let mut first = test_config(&dir, map.clone());
        first.out_path = dir.path().join("first.sqlite");
        let mut second = test_config(&dir, map);
        second.out_path = dir.path().join("second.sqlite");

        let (_, out1) = run(first);
        let (_, out2) = run(second);

        for table in ["node", "actor", "nodes", "inventory", "blocks"] {
            assert_eq!(dump(&out1, table), dump(&out2, table), "table {table}");
        }
    }

    #[test]
    fn stats_line_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let map = world(&dir, &[(MapBlockPos::new(0, 0, 0), air_block())]);

        let stats_path = dir.path().join("stats.csv");
        let mut config = test_config(&dir, map);
        config.stats_path = Some(stats_path.clone());
        run(config);

        let stats = std::fs::read_to_string(stats_path).unwrap();
        let fields: Vec<_> = stats.trim().split(',').collect();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[0], "0");
        assert_eq!(fields[1], "1");
    }
}
