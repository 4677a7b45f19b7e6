use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, ValueEnum};

use mtscan_map::MapBlockPos;

/// Scans every node of a Minetest world database and writes a summary
/// of the interesting ones into a new analytic database.
///
/// Only map block serialization versions 28 and 29 are supported.
#[derive(Debug, Parser)]
#[clap(version, about)]
pub struct Cli {
    /// Minimum map block to examine, inclusive.
    #[clap(long, value_name = "x,y,z")]
    pub min: Option<MapBlockPos>,

    /// Maximum map block to examine.
    #[clap(long, value_name = "x,y,z")]
    pub max: Option<MapBlockPos>,

    /// The only map block to examine.
    #[clap(long, value_name = "x,y,z", conflicts_with_all = ["min", "max"])]
    pub pos: Option<MapBlockPos>,

    /// Path to the map.sqlite file, or a PostgreSQL connection string.
    #[clap(long, value_name = "LOCATION")]
    pub map: String,

    /// Path of the output database. An existing file is replaced.
    #[clap(long, value_name = "PATH")]
    pub out: PathBuf,

    /// Map database driver.
    #[clap(long, value_enum, default_value_t = Driver::Sqlite)]
    pub driver: Driver,

    /// Path to a node name pattern file; matching nodes mark their
    /// block as player-built.
    #[clap(long, value_name = "PATH")]
    pub pattern: Option<PathBuf>,

    /// Count of worker threads. 0 runs everything on the main thread
    /// and emits no progress line.
    #[clap(long, short = 't', default_value_t = 1)]
    pub threads: usize,

    /// Reserved load-average throttle.
    #[clap(long, short = 'l', value_name = "LOAD")]
    pub max_load_avg: Option<f64>,

    /// Radius of map blocks to preserve around player-built blocks.
    #[clap(long, value_name = "BLOCKS", default_value_t = 5)]
    pub radius: u16,

    /// Append one CSV line of runtime statistics to this file.
    #[clap(long, value_name = "PATH")]
    pub stats: Option<PathBuf>,

    /// Track per-node minegeld amounts.
    #[clap(long)]
    pub minegeld: bool,

    #[clap(flatten)]
    pub verbosity: Verbosity,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Driver {
    Sqlite,
    #[clap(alias = "pgsql")]
    Postgresql,
}

/// Configures the verbosity of the builtin logger.
#[derive(Clone, Copy, Debug, Args)]
pub struct Verbosity {
    /// Raises the log verbosity.
    ///
    /// `-v` is Debug, `-vv` is Trace. Per-block decode problems are
    /// visible at the default level already.
    #[clap(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl Verbosity {
    /// Configures the global logger based on the settings.
    pub fn setup(self) {
        let level = self.log_level();
        simple_logger::init_with_level(level).unwrap();
    }

    fn log_level(self) -> log::Level {
        match self.verbose {
            0 => log::Level::Info,
            1 => log::Level::Debug,
            _ => log::Level::Trace,
        }
    }
}
