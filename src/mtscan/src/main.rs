#![deny(rust_2018_idioms, rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

use std::fs;

use clap::Parser;

mod annotation;
mod app;
mod cli;
mod config;
mod consumer;
mod preserve;
mod producer;
mod queue;
mod schema;
mod sink;
mod stats;

use app::App;
use config::Config;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();
    cli.verbosity.setup();

    let config = Config::from_cli(cli);
    config.debug_log();

    // Re-running into an existing analysis would collide on primary
    // keys; resuming an aborted scan is unsupported.
    let _ = fs::remove_file(&config.out_path);

    App::new(config)?.run()
}
