use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use choices_client::api::JobClient;
use choices_client::channel::ProgressChannel;
use choices_client::config::ClientConfig;
use choices_client::controller::{JobController, JobState};
use choices_core::ranking::Ranking;
use choices_core::store::FileRankingStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "choices_runner=debug,choices_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env();
    let runs: u32 = std::env::var("RUNS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);

    let client = JobClient::new(config.api_url.clone());
    let catalog = match client.fetch_options().await {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch the option catalog");
            std::process::exit(1);
        }
    };

    let store = FileRankingStore::new(&config.ranking_store_path);
    let ranking = Ranking::load(catalog.clone(), &store);
    tracing::info!(options = ranking.len(), runs, "Running allocation simulation");

    let channel = ProgressChannel::new(config.ws_url.clone());
    let controller = JobController::new(Arc::new(client), Arc::new(channel.clone()), catalog);

    match controller.run(&ranking.ids(), runs).await {
        JobState::Done(results) => {
            for result in &results {
                tracing::info!(
                    id = result.id,
                    name = %result.name,
                    chance = result.chance,
                    "Result",
                );
            }
        }
        JobState::Failed(message) => {
            tracing::error!(%message, "Simulation failed");
            channel.shutdown();
            std::process::exit(1);
        }
        other => tracing::warn!(?other, "Simulation ended without a terminal state"),
    }

    channel.shutdown();
}
