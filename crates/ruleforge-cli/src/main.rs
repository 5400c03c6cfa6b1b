use clap::Parser;
use ruleforge_cli::{run, Cli};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).init();
    let cli = Cli::parse();
    std::process::exit(run(cli).await);
}
