use clap::Parser;
use leaseflow::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => cli::serve::run().await,
        Command::Drain(args) => cli::drain::run(args).await,
        Command::Definition(command) => cli::definition::run(command).await,
    }
}
