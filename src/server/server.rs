use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::{header, HeaderValue, Method, StatusCode};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::accounts::manager::TokenManager;
use crate::observability::metrics::get_metrics;
use crate::observability::routes::MetricsState;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<TokenManager>,
    pub metrics_state: MetricsState,
}

#[derive(Serialize)]
struct TokenBody {
    token: String,
}

/// Build the read-only router: token lookup, metrics, CORS on everything.
pub async fn router(manager: Arc<TokenManager>) -> Router {
    let metrics = get_metrics().await;
    let state = AppState {
        manager,
        metrics_state: MetricsState::new(metrics.registry.clone()),
    };

    Router::new()
        .route("/token/{account_id}", get(get_token))
        .merge(state.metrics_state.router())
        .fallback(fallback)
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Start the server. Resolves once the shutdown token fires and open
/// connections have drained; the caller enforces the overall deadline.
pub async fn start(
    manager: Arc<TokenManager>,
    port: String,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router(manager).await;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!(port = %port, "Starting server");
    get_metrics().await.up.set(1);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

/// The read path only takes the map read lock and the record read lock; it
/// never waits on a refresh in flight.
async fn get_token(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Response {
    match state.manager.lookup_token(&account_id).await {
        Ok(token) => Json(TokenBody { token }).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "Account not found").into_response(),
    }
}

/// Browser-facing contract: every response carries the CORS allowance set,
/// and a bare OPTIONS anywhere gets an empty 200.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

async fn fallback(request: Request) -> Response {
    if request.method() == Method::GET {
        (StatusCode::NOT_FOUND, "Not found").into_response()
    } else {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response()
    }
}
