use clap::Parser;

use task_explorer::ui::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    task_explorer::init();

    cli::run(Cli::parse()).await
}
