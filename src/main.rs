mod cli;

use aemet::{Aemet, AemetConfig, AemetError};
use clap::Parser;
use cli::{Args, Command};
use log::error;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), AemetError> {
    let config = AemetConfig::from_env()?;

    match args.command {
        Command::Estaciones {
            output,
            fill_missing,
        } => {
            let client = Aemet::new(config, output)?;
            client.sync_stations().fill_missing(fill_missing).call().await?;
        }
        Command::ValoresClimatologicos { start, end, output } => {
            let client = Aemet::new(config, output)?;
            client
                .sync_climate_values()
                .maybe_start(start)
                .maybe_end(end)
                .call()
                .await?;
        }
    }
    Ok(())
}
