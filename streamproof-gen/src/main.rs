//! streamproof-gen - one-shot proof-of-contribution job
//!
//! Runs inside the TEE: collects the account's listening history, scores
//! it, publishes the encrypted raw data, records the reward in the ledger,
//! and writes the proof document to the output directory.

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use streamproof_common::config::Settings;
use streamproof_gen::pipeline::ProofPipeline;
use streamproof_gen::services::{HttpBlobStore, StreamingClient};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("starting streamproof-gen");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load().context("failed to resolve settings")?;
    info!(config = ?settings.redacted(), "configuration resolved");

    let pool = streamproof_gen::db::init_pool(&settings.database_url)
        .await
        .context("failed to initialize ledger database")?;

    let api = StreamingClient::new(&settings.api_token, settings.api_base_url.clone())
        .context("failed to build upstream API client")?;
    let blob = HttpBlobStore::new().context("failed to build blob store client")?;

    let pipeline = ProofPipeline::new(&settings, &api, &blob, &pool);

    match pipeline.run().await {
        Ok(response) => {
            std::fs::create_dir_all(&settings.output_dir)?;
            let output_path = settings.output_dir.join("results.json");
            std::fs::write(&output_path, serde_json::to_vec_pretty(&response)?)?;
            info!(
                path = %output_path.display(),
                score = response.score,
                "proof run complete"
            );
            pool.close().await;
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "proof run failed");
            pool.close().await;
            std::process::exit(1);
        }
    }
}
