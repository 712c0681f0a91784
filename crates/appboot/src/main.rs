use anyhow::Result;
use clap::Parser;

mod cli;
mod ui;

#[tokio::main]
async fn main() -> Result<()> {
    let parsed = cli::Cli::parse();

    match parsed.dispatch().await {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::error!("{:#}", err);
            std::process::exit(1);
        }
    }
}
