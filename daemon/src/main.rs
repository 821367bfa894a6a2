//! Daemon entry point: parse arguments, install the logger, and hand an
//! (as yet empty, since config loading is a collaborator contract per
//! spec.md §1) [`config::Config`] to the reactor.

mod api;
mod arg;
mod config;
mod reactor;
mod session;
mod status;

use clap::Parser;

fn setup_logger(level: log::LevelFilter) {
    let config = simplelog::ConfigBuilder::new().set_time_format_rfc3339().build();
    simplelog::TermLogger::init(level, config, simplelog::TerminalMode::Mixed, simplelog::ColorChoice::Auto).expect("failed to initialize logger");
}

#[tokio::main]
async fn main() {
    let args = arg::Args::parse();
    setup_logger(if args.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info });

    if args.config.is_some() {
        log::warn!("--config was given but this core has no file-format loader (spec.md §1); starting with an empty configuration");
    }

    let cfg = config::Config::new();
    if let Err(e) = reactor::run(cfg).await {
        log::error!("reactor exited: {e}");
        std::process::exit(1);
    }
}
