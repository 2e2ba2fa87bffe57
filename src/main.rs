use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use eventrec::utils::validation;
use eventrec::{init_tracing, AppState, Config, RecError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const CONFIG_PATH_ENV: &str = "EVENTREC_CONFIG";

#[derive(Debug, Deserialize)]
struct RecommendationQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: "Success".to_string(),
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message,
        }
    }
}

struct ApiError(RecError);

impl From<RecError> for ApiError {
    fn from(err: RecError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RecError::Unauthenticated => StatusCode::UNAUTHORIZED,
            RecError::NotFound(_) => StatusCode::NOT_FOUND,
            RecError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RecError::Malformed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RecError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };

        (status, Json(ApiResponse::<()>::error(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn invalid(err: anyhow::Error) -> ApiError {
    ApiError(RecError::InvalidRequest(err.to_string()))
}

async fn health_check() -> Json<ApiResponse<HashMap<String, String>>> {
    let mut status = HashMap::new();
    status.insert("status".to_string(), "healthy".to_string());
    status.insert("service".to_string(), "eventrec".to_string());
    status.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());

    Json(ApiResponse::success(status))
}

async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<RecommendationQuery>,
) -> ApiResult<eventrec::RecommendationResponse> {
    if let Some(limit) = params.limit {
        validation::validate_limit(limit).map_err(invalid)?;
    }

    let response = state
        .recommendation_service
        .get_recommendations(Some(user_id.as_str()), params.limit)
        .await?;

    Ok(Json(ApiResponse::success(response)))
}

async fn record_action(
    State(state): State<AppState>,
    Json(request): Json<eventrec::RecordActionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<String>>), ApiError> {
    validation::validate_record_request(&request).map_err(invalid)?;

    // The profile update is detached; the handle is dropped on purpose.
    let _ = state.recorder.record(
        request.user_id.as_deref(),
        &request.event_id,
        request.action,
        request.snapshot,
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success("Action accepted".to_string())),
    ))
}

async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<eventrec::PreferenceProfile> {
    let profile = state.recommendation_service.load_profile(&user_id).await?;
    Ok(Json(ApiResponse::success(profile)))
}

async fn set_price_range(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(range): Json<Option<eventrec::PriceRange>>,
) -> ApiResult<eventrec::PreferenceProfile> {
    if let Some(ref range) = range {
        validation::validate_price_range(range).map_err(invalid)?;
    }

    match state.aggregator.set_price_range(&user_id, range).await {
        Ok(profile) => Ok(Json(ApiResponse::success(profile))),
        Err(e) => {
            error!("Failed to set price range for user {}: {}", user_id, e);
            Err(ApiError(RecError::upstream("profile store", e)))
        }
    }
}

async fn upsert_event(
    State(state): State<AppState>,
    Json(document): Json<eventrec::EventDocument>,
) -> ApiResult<eventrec::CandidateEvent> {
    let event = eventrec::CandidateEvent::from(document);
    validation::validate_candidate_event(&event).map_err(invalid)?;

    if event.starts_at.is_none() {
        warn!("Event {} has no usable start date", event.id);
    }

    match state.catalog.upsert(event.clone()).await {
        Ok(()) => Ok(Json(ApiResponse::success(event))),
        Err(e) => {
            error!("Failed to upsert event {}: {}", event.id, e);
            Err(ApiError(RecError::upstream("event catalog", e)))
        }
    }
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/recommendations/:user_id", get(get_recommendations))
        .route("/actions", post(record_action))
        .route("/users/:user_id/profile", get(get_profile))
        .route("/users/:user_id/price-range", put(set_price_range))
        .route("/events", post(upsert_event))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.server.socket_addr()?;
    let state = AppState::new(config).await?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config/default".to_string());
    let config = Config::load(&config_path)?;
    info!("Starting eventrec server with config: {:?}", config.server);

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()?
        .block_on(serve(config))
}
