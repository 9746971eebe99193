use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use thermal_bench::PoolError;
use thermal_core::api::{
    AmbientRequest, AmbientResponse, BenchmarkStartRequest, BenchmarkStartResponse, OkResponse,
    RecordRequest, StatusResponse,
};
use tower_http::trace::TraceLayer;

use crate::service::ProfilerService;

#[derive(Clone)]
pub struct AppState {
    svc: Arc<ProfilerService>,
}

pub fn router(svc: Arc<ProfilerService>) -> Router {
    let state = AppState { svc };
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/status", get(status))
        .route("/v1/record", post(record))
        .route("/v1/benchmark/start", post(benchmark_start))
        .route("/v1/benchmark/stop", post(benchmark_stop))
        .route("/v1/ambient", post(set_ambient))
        .route("/v1/cores/check", post(check_cores))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn status(State(st): State<AppState>) -> Json<StatusResponse> {
    Json(st.svc.status())
}

async fn record(State(st): State<AppState>, Json(req): Json<RecordRequest>) -> Json<OkResponse> {
    st.svc.set_record_state(req.active);
    Json(OkResponse {
        ok: true,
        message: None,
    })
}

async fn benchmark_start(
    State(st): State<AppState>,
    Json(req): Json<BenchmarkStartRequest>,
) -> Result<Json<BenchmarkStartResponse>, AppError> {
    let workers = st.svc.start_benchmark(req.threads).map_err(|e| match e {
        PoolError::AlreadyRunning => AppError::new(StatusCode::CONFLICT, e),
    })?;
    Ok(Json(BenchmarkStartResponse { workers }))
}

async fn benchmark_stop(State(st): State<AppState>) -> Json<OkResponse> {
    st.svc.stop_benchmark();
    let remaining = st.svc.pool().active_workers();
    Json(OkResponse {
        ok: true,
        message: (remaining > 0).then(|| format!("{remaining} worker(s) still finishing")),
    })
}

async fn set_ambient(
    State(st): State<AppState>,
    Json(req): Json<AmbientRequest>,
) -> Result<Json<AmbientResponse>, AppError> {
    let celsius = match req {
        AmbientRequest::Set { celsius } => st.svc.set_ambient(celsius)?,
        AmbientRequest::Step { step } => st.svc.step_ambient(step)?,
    };
    Ok(Json(AmbientResponse { celsius }))
}

async fn check_cores(State(st): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let svc = Arc::clone(&st.svc);
    tokio::task::spawn_blocking(move || svc.check_cores()).await?;
    Ok(Json(st.svc.status()))
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    err: anyhow::Error,
}

impl AppError {
    fn new(status: StatusCode, err: impl Into<anyhow::Error>) -> Self {
        Self {
            status,
            err: err.into(),
        }
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(value: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.err, status = %self.status, "request failed");
        let body = Json(serde_json::json!({
            "error": self.err.to_string()
        }));
        (self.status, body).into_response()
    }
}
