mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "code_injector=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Instrument(args) => {
            cli::instrument(&args).await?;
        }
        Commands::Classpath {
            project,
            pom,
            maven_repo,
            classpath,
            format,
        } => {
            cli::show_classpath(&project, pom, maven_repo, &classpath, &format)?;
        }
        Commands::Detectors => {
            cli::list_detectors();
        }
    }

    Ok(())
}
