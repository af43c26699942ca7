//! Application startup and lifecycle management.

use crate::config::BookkeepingConfig;
use crate::handlers::{analytics, health, invoices, labels, receivers};
use crate::services::{
    init_metrics, AggregationEngine, CurrencyNormalizer, Database, HttpRateProvider,
    InvoiceService, LineItemAmountEngine, RateCache, RateProvider, ReceiverMergeCoordinator,
};
use axum::{
    middleware,
    routing::{get, patch, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: BookkeepingConfig,
    pub db: Database,
    pub analytics: AggregationEngine,
    pub merges: ReceiverMergeCoordinator,
    pub invoices: InvoiceService,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration, fetching rates
    /// from the configured HTTP provider.
    pub async fn build(config: BookkeepingConfig) -> Result<Self, AppError> {
        let provider = HttpRateProvider::new(config.fx.api_url.clone(), config.fx.timeout)?;
        Self::build_with_provider(config, Arc::new(provider)).await
    }

    /// Build the application around an explicit rate provider.
    pub async fn build_with_provider(
        config: BookkeepingConfig,
        provider: Arc<dyn RateProvider>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        db.run_migrations().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            e
        })?;

        let cache = Arc::new(RateCache::new(config.fx.cache_ttl));
        let normalizer = Arc::new(CurrencyNormalizer::new(
            cache,
            provider,
            config.fx.timeout,
        ));
        let engine = LineItemAmountEngine::new(normalizer);

        let state = AppState {
            analytics: AggregationEngine::new(db.clone()),
            merges: ReceiverMergeCoordinator::new(db.clone()),
            invoices: InvoiceService::new(
                db.clone(),
                engine,
                config.fx.reporting_currency.clone(),
            ),
            db,
            config: config.clone(),
        };

        let addr = config.common.socket_addr();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Bookkeeping service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = router(self.state);

        tracing::info!(
            service = "bookkeeping-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}

fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/analytics/summary", get(analytics::summary))
        .route("/analytics/by-category", get(analytics::by_category))
        .route("/analytics/by-company", get(analytics::by_company))
        .route("/analytics/by-receiver", get(analytics::by_receiver))
        .route("/analytics/by-tag", get(analytics::by_tag))
        .route("/analytics/trend", get(analytics::trend))
        .route(
            "/receivers",
            post(receivers::create_receiver).get(receivers::list_receivers),
        )
        .route("/receivers/merge", post(receivers::merge_receivers))
        .route(
            "/receivers/:id",
            get(receivers::get_receiver).delete(receivers::delete_receiver),
        )
        .route("/categories", post(labels::create_category))
        .route("/companies", post(labels::create_company))
        .route("/tags", post(labels::create_tag))
        .route("/invoices", post(invoices::create_invoice))
        .route(
            "/invoices/:id",
            get(invoices::get_invoice).delete(invoices::delete_invoice),
        )
        .route("/invoices/:id/status", patch(invoices::update_status))
        .route("/invoices/:id/items", post(invoices::add_item))
        .route("/invoices/:id/items/:item_id", put(invoices::update_item))
        .route("/invoices/:id/recalculate", post(invoices::recalculate));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
