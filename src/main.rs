use std::io;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod storage;

use app::App;
use cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut app = App::load(cli.config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    app.run(cli.command, &mut out)
}

/// `-v` selects info, `-vv` debug; otherwise `RUST_LOG`, falling back to warn.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
