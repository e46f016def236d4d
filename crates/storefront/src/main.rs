mod app;
mod assets;
mod cli;
mod config;
mod errors;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::Result;

use crate::app::Storefront;
use crate::cli::Cli;
use crate::config::Config;

#[tokio::main]
pub async fn main() -> Result<ExitCode> {
    errors::init()?;
    let args = Cli::parse();
    config::ensure_data_and_config_dirs_exist()?;
    let config = Config::new()?;
    let _log_guard = logging::init(&config)?;

    let storefront = Storefront::new(config, args.locale)?;
    storefront.run(args.cmd).await
}
