//! Student interest survey backend.
//!
//! A public form posts one response per visitor; two admin dashboards (a table
//! and a set of charts) read the stored responses back.
//!
//!
//!
//! # Endpoints
//!
//! | Route | Method | Success |
//! |---|---|---|
//! | `/api/submit` | POST | 201 `{success, id}` |
//! | `/api/records` | GET | 200 `{success, data: [..]}` newest first |
//! | `/api/delete-record` | POST `{id}` | 200 `{success, id}` |
//! | `/api/reset-ip` | POST `{id}` | 200 `{success, id}` |
//! | `/api/summary` | GET | 200 `{success, data: {total, ..counts}}` |
//!
//! Failures answer `{error: "..."}` with 400, 403, 404, 405 or 500.
//!
//!
//!
//! # Duplicate-IP Guard
//!
//! - Caller address comes from `x-real-ip`, then `x-forwarded-for`, then the
//!   socket peer; first comma-separated token, trimmed
//! - A submission is rejected with 403 when a stored response already carries
//!   that address
//! - Submissions without a resolvable address are accepted and logged
//! - `reset-ip` clears the stored address so the visitor can submit again
//! - The check is a lookup followed by an insert. Two concurrent submissions
//!   from one address can both be stored. Set `STRICT_IP_UNIQUENESS=true` to
//!   back the check with a unique index.
//!
//!
//!
//! # Setup
//!
//! Required.
//! ```sh
//! export MONGODB_URI="mongodb://localhost:27017/survey"
//! ```
//!
//! Optional: `RUST_PORT` (1111), `RESPONSES_COLLECTION` (responses),
//! `STRICT_IP_UNIQUENESS` (false), `CORS_MAX_AGE_SECS` (3600),
//! `RUST_LOG` for log filtering.
//!
//! Run.
//! ```sh
//! RUST_LOG=info cargo run -p xampus
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};

use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod database;
pub mod error;
pub mod memory;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;

use config::Config;
use error::StartupError;
use routes::{
    delete_record_handler, method_not_allowed, records_handler, reset_ip_handler,
    submit_handler, summary_handler,
};
use state::State;

pub async fn start_server() -> Result<(), StartupError> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load().inspect_err(|e| error!("{e}"))?;

    info!("Initializing state...");
    let state = State::new(config);

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    let app = app(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutting down...");

    Ok(())
}

pub fn app(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(state.config.cors_max_age_secs));

    Router::new()
        .route("/api/submit", post(submit_handler).fallback(method_not_allowed))
        .route("/api/records", get(records_handler).fallback(method_not_allowed))
        .route(
            "/api/delete-record",
            post(delete_record_handler).fallback(method_not_allowed),
        )
        .route(
            "/api/reset-ip",
            post(reset_ip_handler).fallback(method_not_allowed),
        )
        .route("/api/summary", get(summary_handler).fallback(method_not_allowed))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            return std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
