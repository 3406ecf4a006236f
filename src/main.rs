use clap::Parser;

use packline::config::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    packline::run(Cli::parse()).await
}
