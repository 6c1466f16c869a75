use crate::dashboard::{DashboardService, EXPORT_ROUTE};
use crate::errors::{AppError, AppResult};
use crate::models::{DashboardView, ErrorBody, HealthResponse};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Clone)]
pub struct ServerState {
    service: Arc<DashboardService>,
    deadline: Duration,
}

impl ServerState {
    pub fn new(service: Arc<DashboardService>, deadline: Duration) -> Self {
        Self { service, deadline }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<String>,
}

#[derive(Debug)]
pub struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Connection(_) | AppError::Query(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            code: self.0.code().to_string(),
            message: self.0.message().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .route(EXPORT_ROUTE, get(export_handler))
        .route("/api/health", get(health_handler))
        .with_state(state)
}

pub async fn serve(state: ServerState, addr: SocketAddr) -> AppResult<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, variant = state.service.variant().as_str(), "dashboard listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("dashboard stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn dashboard_handler(
    State(state): State<ServerState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<DashboardView>, ApiError> {
    let view = run_pipeline(&state, move |service| service.render(query.limit.as_deref())).await?;
    Ok(Json(view))
}

pub async fn export_handler(
    State(state): State<ServerState>,
    Query(query): Query<LimitQuery>,
) -> Result<Response, ApiError> {
    let file = run_pipeline(&state, move |service| service.export(query.limit.as_deref())).await?;
    let disposition = format!("attachment; filename=\"{}\"", file.file_name.replace('"', ""));
    Ok((
        [
            (header::CONTENT_TYPE, file.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.content,
    )
        .into_response())
}

pub async fn health_handler(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        variant: state.service.variant(),
        endpoint: state.service.endpoint(),
    })
}

async fn run_pipeline<T, F>(state: &ServerState, job: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(&DashboardService) -> AppResult<T> + Send + 'static,
{
    let service = state.service.clone();
    let handle = tokio::task::spawn_blocking(move || job(&service));
    match tokio::time::timeout(state.deadline, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(AppError::Internal(format!("dashboard task failed: {}", join_error))),
        Err(_) => {
            tracing::error!(deadline_secs = state.deadline.as_secs(), "dashboard request timed out");
            Err(AppError::Timeout(format!(
                "dashboard request exceeded {}s",
                state.deadline.as_secs()
            )))
        }
    }
}
