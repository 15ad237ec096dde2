mod injector;
mod notify;
mod router;
mod signature;
mod telemetry;
mod webhook;

use std::net::SocketAddr;

use tracing::info;

use seat_bridge_revel::RevelClient;
use seat_bridge_storage::Database;
use seat_bridge_supply::SupplyClient;
use seat_bridge_tripleseat::TripleseatClient;
use seat_bridge_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let storage = Database::connect(&config.database_url).await?;
    storage.run_migrations().await?;

    let http = reqwest::Client::builder()
        .timeout(config.outbound_timeout)
        .build()?;
    let tripleseat = TripleseatClient::new(
        config.tripleseat.api_token.clone(),
        config.tripleseat.base_url.clone(),
        http.clone(),
    );
    let revel = RevelClient::new(
        config.revel.api_key.clone(),
        config.revel.api_secret.clone(),
        config.revel.base_url.clone(),
        http.clone(),
    );
    let supply = config.supply.as_ref().map(|supply| {
        SupplyClient::new(
            supply.api_token.clone(),
            supply.base_url.clone(),
            http.clone(),
        )
    });
    let notifier = notify::Notifier::new(config.notify_url.clone(), http);

    let settings = router::BridgeSettings::from_config(&config);
    let state = router::AppState::new(
        metrics, storage, tripleseat, revel, supply, notifier, settings,
    );

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
