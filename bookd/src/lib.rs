//! # bookd: booking lifecycle service
//!
//! `bookd` owns the lifecycle of service bookings between requesters and providers:
//! which status changes are legal, who may make them, how many jobs a provider may
//! accept in a subscription period, and which counterparty hears about each change.
//!
//! ## Architecture
//!
//! ```text
//!            HTTP (axum)                         background tasks
//!  ┌──────────────────────────────┐     ┌─────────────────────────────┐
//!  │ api::handlers  + CurrentActor│     │ retry worker  expiry sweeper│
//!  └──────────────┬───────────────┘     └──────┬───────────────┬──────┘
//!                 ↓                            │               │
//!  ┌──────────────────────────────┐            │               │
//!  │ lifecycle::engine            │            │               │
//!  │   transitions · QuotaLedger  │            │               │
//!  │   NotificationDispatcher ────┼── retry ──→┘               │
//!  └──────────────┬───────────────┘                            │
//!                 ↓                                            ↓
//!  ┌────────────────────────────────────────────────────────────────────┐
//!  │ db::Stores  (InMemoryStore | PostgresStore)                        │
//!  └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! 1. [`Application::new`] picks the storage backend from [`Config::database`], runs
//!    migrations for Postgres, and spawns the background tasks
//! 2. [`Application::serve`] binds the listener and serves until the shutdown future
//!    resolves
//! 3. Live notification streams are closed, background tasks are cancelled and joined
//!
//! Identity comes from a trusted header set by the authenticating proxy; see [`auth`].

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod lifecycle;
pub mod notifications;
pub mod openapi;
pub mod quota;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test;

use std::sync::OnceLock;

use anyhow::Context;
use axum::{
    Json, Router,
    routing::{delete, get, patch, post, put},
};
use bon::Builder;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info, warn};
use utoipa::OpenApi;

pub use config::Config;
use config::DatabaseConfig;
use db::Stores;
use lifecycle::BookingLifecycleEngine;
use notifications::{ConnectionRegistry, NotificationDispatcher};
use openapi::ApiDoc;
use quota::QuotaLedger;

/// Shared state handed to every request handler.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .stores(stores)
///     .engine(engine)
///     .registry(registry)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub stores: Stores,
    pub engine: BookingLifecycleEngine,
    /// Live notification channels, also reachable through the engine's dispatcher
    pub registry: ConnectionRegistry,
    pub metrics_handle: Option<PrometheusHandle>,
}

/// Get the bookd database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder on first use and return its handle.
///
/// Only one recorder can exist per process, so every `Application` (tests build
/// many) shares it.
pub fn get_or_install_prometheus_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if let Err(e) = metrics::set_global_recorder(recorder) {
                warn!(error = %e, "A metrics recorder was already installed; /internal/metrics will be empty");
            }
            handle
        })
        .clone()
}

/// Build the HTTP router: the `/api/v1` surface plus health, docs and metrics.
pub fn build_router(state: &AppState) -> Router {
    use api::handlers::{bookings, notifications, providers};

    let api_routes = Router::new()
        .route("/bookings", post(bookings::create_booking).get(bookings::list_bookings))
        .route("/bookings/{id}", get(bookings::get_booking).delete(bookings::delete_booking))
        .route("/bookings/{id}/status", patch(bookings::update_booking_status))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_notifications_read))
        .route("/notifications/stream", get(notifications::stream_notifications))
        .route("/notifications/{id}", delete(notifications::delete_notification))
        .route("/notifications/{id}/read", patch(notifications::mark_notification_read))
        .route("/providers/{id}/subscription", put(providers::update_subscription))
        .route("/providers/{id}/quota", get(providers::get_quota))
        .with_state(state.clone());

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api/v1", api_routes);

    if let Some(handle) = state.metrics_handle.clone() {
        router = router.route("/internal/metrics", get(move || async move { handle.render() }));
    }

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

/// Background tasks that run alongside the HTTP server:
/// - the notification retry worker
/// - the notification expiry sweeper (unless disabled)
///
/// Dropping this cancels the shared token through `drop_guard`;
/// [`shutdown`](BackgroundServices::shutdown) also waits for the tasks to finish.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

fn setup_background_services(
    config: &Config,
    stores: &Stores,
    registry: ConnectionRegistry,
    retry_queue: tokio::sync::mpsc::Receiver<db::models::notifications::Notification>,
    shutdown_token: CancellationToken,
) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();

    background_tasks.push(tokio::spawn(notifications::retry::run_retry_worker(
        retry_queue,
        stores.notifications.clone(),
        registry,
        config.notifications.retry_schedule(),
        shutdown_token.clone(),
    )));

    if config.notifications.sweep_enabled {
        background_tasks.push(tokio::spawn(notifications::sweeper::run_expiry_sweeper(
            stores.notifications.clone(),
            config.notifications.sweep_interval,
            shutdown_token.clone(),
        )));
    } else {
        info!("Notification expiry sweeper disabled");
    }

    BackgroundServices {
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

/// Connect to the configured backend. Postgres pools are migrated before use.
async fn setup_database(config: &Config) -> anyhow::Result<(Stores, Option<PgPool>)> {
    match &config.database {
        DatabaseConfig::InMemory => {
            info!("Using in-memory storage; state will not survive a restart");
            Ok((Stores::in_memory(), None))
        }
        DatabaseConfig::Postgres { url, max_connections } => {
            let pool = PgPoolOptions::new()
                .max_connections(*max_connections)
                .connect(url)
                .await
                .context("Failed to connect to Postgres")?;
            migrator().run(&pool).await.context("Failed to run database migrations")?;
            info!(max_connections, "Connected to Postgres and applied migrations");
            Ok((Stores::postgres(pool.clone()), Some(pool)))
        }
    }
}

/// Register the configured actors that the directory does not know yet. Existing
/// entries keep their role, quota and verification state.
async fn seed_actors(config: &Config, stores: &Stores) -> anyhow::Result<()> {
    let mut seeded = 0;
    for seed in &config.actors {
        if stores.actors.get_actor(seed.id).await?.is_some() {
            debug!(actor_id = %types::abbrev_uuid(&seed.id), "Actor already registered, skipping seed");
            continue;
        }
        stores
            .actors
            .upsert_actor(&seed.to_actor(&config.quota))
            .await
            .with_context(|| format!("Failed to seed actor {}", seed.id))?;
        stores.verification.set_approved(seed.id, seed.kyc_approved).await?;
        seeded += 1;
    }
    if !config.actors.is_empty() {
        info!(seeded, configured = config.actors.len(), "Seeded actor directory");
    }
    Ok(())
}

/// Owns the router, the storage handles and the background tasks.
pub struct Application {
    router: Router,
    app_state: AppState,
    config: Config,
    pool: Option<PgPool>,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting bookd with configuration: {:#?}", config);
        let (stores, pool) = setup_database(&config).await?;
        seed_actors(&config, &stores).await?;
        Ok(Self::with_stores(config, stores, pool))
    }

    /// Assemble the application over already-built stores. Must run inside a Tokio runtime.
    pub fn with_stores(config: Config, stores: Stores, pool: Option<PgPool>) -> Self {
        let registry = ConnectionRegistry::new(config.notifications.channel_capacity);
        let (dispatcher, retry_queue) = NotificationDispatcher::new(
            stores.notifications.clone(),
            registry.clone(),
            config.notifications.retention,
            config.notifications.retry_queue_capacity,
        );
        let ledger = QuotaLedger::new(stores.quotas.clone(), config.quota);
        let engine = BookingLifecycleEngine::new(&stores, ledger, dispatcher);

        let bg_services = setup_background_services(&config, &stores, registry.clone(), retry_queue, CancellationToken::new());

        let metrics_handle = config.enable_metrics.then(get_or_install_prometheus_handle);
        let app_state = AppState::builder()
            .config(config.clone())
            .stores(stores)
            .engine(engine)
            .registry(registry)
            .maybe_metrics_handle(metrics_handle)
            .build();
        let router = build_router(&app_state);

        Self {
            router,
            app_state,
            config,
            pool,
            bg_services,
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.app_state.stores
    }

    pub fn state(&self) -> &AppState {
        &self.app_state
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("bookd listening on http://{}, available at http://localhost:{}", bind_addr, self.config.port);

        // Open SSE responses never finish on their own, so they are closed as soon as the
        // shutdown signal fires rather than after the server drains.
        let registry = self.app_state.registry.clone();
        let shutdown = async move {
            shutdown.await;
            info!(open_streams = registry.total_connections(), "Closing live notification streams");
            registry.close_all();
        };

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Shutdown background services and wait for tasks to complete
        self.bg_services.shutdown().await;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        Ok(())
    }
}
