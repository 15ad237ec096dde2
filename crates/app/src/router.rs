use std::{collections::HashSet, sync::Arc};

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;

use seat_bridge_core::IdempotencyGuard;
use seat_bridge_revel::RevelClient;
use seat_bridge_storage::Database;
use seat_bridge_supply::SupplyClient;
use seat_bridge_tripleseat::TripleseatClient;
use seat_bridge_util::AppConfig;

use crate::notify::Notifier;
use crate::{telemetry, webhook};

/// Pipeline settings derived once from configuration at startup.
#[derive(Clone)]
pub struct BridgeSettings {
    pub webhook_secret: Option<String>,
    pub skip_signature_verification: bool,
    pub skip_event_validation: bool,
    pub enabled: bool,
    pub dry_run: bool,
    pub allowed_locations: HashSet<i64>,
    pub establishment_override: Option<i64>,
    pub created_by: i64,
    pub dining_option: i64,
    pub discount_id: Option<i64>,
    pub payment_type_id: Option<i64>,
    pub payment_type_label: String,
}

impl BridgeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            webhook_secret: config.tripleseat.webhook_secret.clone(),
            skip_signature_verification: config.tripleseat.skip_signature_verification,
            skip_event_validation: config.tripleseat.skip_event_validation,
            enabled: config.bridge.enabled,
            dry_run: config.bridge.dry_run,
            allowed_locations: config.bridge.allowed_locations.clone(),
            establishment_override: config.bridge.establishment_override,
            created_by: config.revel.created_by,
            dining_option: config.revel.dining_option,
            discount_id: config.revel.discount_id,
            payment_type_id: config.revel.payment_type_id,
            payment_type_label: config.revel.payment_type_label.clone(),
        }
    }

    /// An empty allowlist admits every site.
    pub fn location_allowed(&self, site_id: i64) -> bool {
        self.allowed_locations.is_empty() || self.allowed_locations.contains(&site_id)
    }
}

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    tripleseat: TripleseatClient,
    revel: RevelClient,
    supply: Option<SupplyClient>,
    notifier: Notifier,
    settings: Arc<BridgeSettings>,
    idempotency: Arc<IdempotencyGuard>,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        tripleseat: TripleseatClient,
        revel: RevelClient,
        supply: Option<SupplyClient>,
        notifier: Notifier,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            metrics,
            storage,
            tripleseat,
            revel,
            supply,
            notifier,
            settings: Arc::new(settings),
            idempotency: Arc::new(IdempotencyGuard::new()),
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn tripleseat(&self) -> &TripleseatClient {
        &self.tripleseat
    }

    pub fn revel(&self) -> &RevelClient {
        &self.revel
    }

    pub fn supply(&self) -> Option<&SupplyClient> {
        self.supply.as_ref()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn idempotency(&self) -> &IdempotencyGuard {
        &self.idempotency
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/webhooks/tripleseat", post(webhook::handle))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .unwrap()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use reqwest::Client;
    use tower::ServiceExt;
    use url::Url;

    pub(crate) fn test_settings() -> BridgeSettings {
        BridgeSettings {
            webhook_secret: Some(String::from("test-secret")),
            skip_signature_verification: false,
            skip_event_validation: false,
            enabled: true,
            dry_run: false,
            allowed_locations: HashSet::new(),
            establishment_override: None,
            created_by: 12,
            dining_option: 4,
            discount_id: Some(77),
            payment_type_id: Some(88),
            payment_type_label: String::from("Tripleseat"),
        }
    }

    async fn setup_state() -> AppState {
        let metrics = telemetry::init_metrics().expect("metrics init");
        let database = Database::connect("sqlite::memory:?cache=shared")
            .await
            .expect("connect");
        database.run_migrations().await.expect("migrations");

        let http = Client::new();
        let base = Url::parse("http://127.0.0.1:9/").expect("url");
        let tripleseat = TripleseatClient::new("token", base.clone(), http.clone());
        let revel = RevelClient::new("key", "secret", base, http.clone());
        let notifier = Notifier::new(None, http);

        AppState::new(
            metrics,
            database,
            tripleseat,
            revel,
            None,
            notifier,
            test_settings(),
        )
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let app = app_router(setup_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_exports_build_info() {
        let app = app_router(setup_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let collected = response
            .into_body()
            .collect()
            .await
            .expect("body should read");
        let body = String::from_utf8(collected.to_bytes().to_vec()).expect("utf-8");
        assert!(body.contains("app_build_info"));
        assert!(body.contains("app_uptime_seconds"));
    }

    #[test]
    fn empty_allowlist_admits_every_site() {
        let mut settings = test_settings();
        assert!(settings.location_allowed(31));

        settings.allowed_locations.insert(99);
        assert!(settings.location_allowed(99));
        assert!(!settings.location_allowed(31));
    }
}
