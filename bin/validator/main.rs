use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use condense_validator::{ValidatorConfig, ValidatorCore};

#[derive(Parser)]
#[command(name = "condense-validator", about = "Compression subnet validator")]
struct Cli {
    #[arg(long, env = "CONDENSE_REGISTRY_URL")]
    registry_url: Option<String>,

    #[arg(long, env = "CONDENSE_SYNTHESIS_URL")]
    synthesis_url: Option<String>,

    #[arg(long, env = "CONDENSE_SCORING_URL")]
    scoring_url: Option<String>,

    #[arg(long, env = "CONDENSE_CHAIN_URL")]
    chain_url: Option<String>,

    /// Seconds between rounds once a round completes
    #[arg(long, env = "CONDENSE_FORWARD_SLEEP_SECS")]
    forward_sleep_secs: Option<u64>,

    /// Minimum seconds between weight commits
    #[arg(long, env = "CONDENSE_COMMIT_MIN_INTERVAL_SECS")]
    commit_min_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ValidatorConfig::from_env();
    if let Some(url) = cli.registry_url {
        config.services.registry_url = url;
    }
    if let Some(url) = cli.synthesis_url {
        config.services.synthesis_url = url;
    }
    if let Some(url) = cli.scoring_url {
        config.services.scoring_url = url;
    }
    if let Some(url) = cli.chain_url {
        config.services.chain_url = url;
    }
    if let Some(secs) = cli.forward_sleep_secs {
        config.round.forward_sleep_secs = secs;
    }
    if let Some(secs) = cli.commit_min_interval_secs {
        config.commit.min_interval_secs = secs;
    }

    info!(
        registry = %config.services.registry_url,
        synthesis = %config.services.synthesis_url,
        scoring = %config.services.scoring_url,
        chain = %config.services.chain_url,
        "starting validator"
    );

    let mut core = ValidatorCore::from_config(config)?;

    tokio::select! {
        _ = core.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
