use std::{future::Future, sync::Arc};

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    clients::health::HealthChecker,
    models::{health::HealthStatus, response::ApiResponse},
    services::messages::{MessageFinder, MessageRecord},
};

pub struct AppState {
    pub health_checker: HealthChecker,
    pub messages: MessageFinder,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/messages/{id}", get(get_message))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(
    state: Arc<AppState>,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Error> {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Ops API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn get_message(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let Ok(notification_id) = Uuid::parse_str(&id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<MessageRecord>::error(
                format!("{id:?} is not a valid notification id"),
                "Invalid notification id".to_string(),
            )),
        )
            .into_response();
    };

    match state.messages.find(notification_id).await {
        Ok(Some(record)) => (
            StatusCode::OK,
            Json(ApiResponse::success(record, "Message found".to_string())),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<MessageRecord>::error(
                format!("Notification {notification_id} not found"),
                "Message not found".to_string(),
            )),
        )
            .into_response(),
        Err(e) => {
            error!(notification_id = %notification_id, error = %e, "Message lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<MessageRecord>::error(
                    e.to_string(),
                    "Message lookup failed".to_string(),
                )),
            )
                .into_response()
        }
    }
}
