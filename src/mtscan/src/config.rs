//! Effective run configuration, shared read-only between all threads.

use std::{path::PathBuf, thread};

use mtscan_map::MapBlockPos;
use mtscan_store::DriverKind;

use crate::cli::{Cli, Driver};

// Max size of a worker's staging set of preserve seeds before it is
// handed to the aggregator.
const DEFAULT_PRESERVE_THRESHOLD: usize = 2048;

// Max size of the aggregated preserve set before it is drained into
// the block annotations. Bounds memory on long runs.
const DEFAULT_PRESERVE_LIMIT: usize = 32768;

#[derive(Debug)]
pub struct Config {
    pub min_pos: MapBlockPos,
    pub max_pos: MapBlockPos,

    pub driver: DriverKind,
    /// SQLite: path to the `map.sqlite` file. PostgreSQL: connection
    /// string, passed through unmodified.
    pub map_location: String,

    pub out_path: PathBuf,
    pub pattern_path: Option<PathBuf>,
    pub stats_path: Option<PathBuf>,

    /// Count of consumer worker threads. Zero runs producer and
    /// consumer serially on the calling thread.
    pub threads: usize,

    /// Reserved throttle; parsed and reported but not yet acted on.
    pub max_load_avg: f64,

    pub preserve_radius: u16,
    pub preserve_threshold: usize,
    pub preserve_limit: usize,

    pub track_minegeld: bool,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Self {
        let hw_threads = thread::available_parallelism().map(|p| p.get()).unwrap_or(1);

        let (mut min_pos, mut max_pos) = match cli.pos {
            Some(pos) => (
                pos,
                MapBlockPos::new(pos.x + 1, pos.y + 1, pos.z + 1),
            ),
            None => (
                cli.min.unwrap_or(MapBlockPos::MIN),
                cli.max.unwrap_or(MapBlockPos::MAX),
            ),
        };
        min_pos.sort(&mut max_pos);

        Self {
            min_pos,
            max_pos,
            driver: match cli.driver {
                Driver::Sqlite => DriverKind::Sqlite,
                Driver::Postgresql => DriverKind::Postgres,
            },
            map_location: cli.map,
            out_path: cli.out,
            pattern_path: cli.pattern,
            stats_path: cli.stats,
            threads: cli.threads.min(hw_threads),
            max_load_avg: cli.max_load_avg.unwrap_or(hw_threads as f64),
            preserve_radius: cli.radius,
            preserve_threshold: DEFAULT_PRESERVE_THRESHOLD,
            preserve_limit: DEFAULT_PRESERVE_LIMIT,
            track_minegeld: cli.minegeld,
        }
    }

    pub fn debug_log(&self) {
        log::debug!("config.map_location: {}", self.map_location);
        log::debug!("config.out_path: {}", self.out_path.display());
        log::debug!("config.pattern_path: {:?}", self.pattern_path);
        log::debug!("config.min_pos: {} {}", self.min_pos, self.min_pos.id());
        log::debug!("config.max_pos: {} {}", self.max_pos, self.max_pos.id());
        log::debug!("config.threads: {}", self.threads);
        log::debug!("config.max_load_avg: {}", self.max_load_avg);
        log::debug!("config.preserve_radius: {}", self.preserve_radius);
        log::debug!("config.preserve_threshold: {}", self.preserve_threshold);
        log::debug!("config.preserve_limit: {}", self.preserve_limit);
        log::debug!("config.track_minegeld: {}", self.track_minegeld);
    }
}
