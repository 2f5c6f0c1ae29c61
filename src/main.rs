mod bluetooth;
mod cli;
mod config;
mod controller;
mod logging;
mod models;
mod relay;
mod units;

use clap::Parser;
use cli::Cli;
use config::Config;
use controller::Controller;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.debug);

    let path = cli
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let file = match Config::load(&path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut config = Config::default();
    config.apply_file(file);
    cli.apply(&mut config);
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match Controller::new(config).run().await {
        Ok(()) => ExitCode::SUCCESS,
        // Already logged where it happened; cleanup has run.
        Err(_) => ExitCode::FAILURE,
    }
}
