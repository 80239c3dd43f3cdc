use clap::Parser;
use proxy_monitor::cli::{self, Cli, Commands};
use proxy_monitor::error::Result;

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let _guard = init_logging();
            cli::run_monitor(&cli.config).await?;
        }
        Commands::Stop => {
            init_logging_simple();
            cli::stop_monitor(&cli.config)?;
        }
        Commands::Status => {
            init_logging_simple();
            cli::show_status(&cli.config).await?;
        }
        Commands::Test => {
            init_logging_simple();
            cli::test_setup(&cli.config).await?;
        }
        Commands::Config => {
            init_logging_simple();
            cli::write_config(&cli.config)?;
        }
    }

    Ok(())
}
