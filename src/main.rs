mod commands;
mod llm;
mod research;
mod state;

use clap::Parser;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load env
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    commands::init_tracing(cli.verbose);

    commands::ask::ask(cli).await
}
