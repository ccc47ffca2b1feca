use anyhow::Context;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "nestegg",
    about = "Retirement drawdown projections over stochastic or historical returns"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the JSON simulation API.
    Serve {
        #[arg(long, short, default_value_t = 8080)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { port } => nestegg::api::run_http_server(port)
            .await
            .with_context(|| format!("HTTP server on port {port} failed")),
    }
}
