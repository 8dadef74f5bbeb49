use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::{de, Deserialize, Deserializer, Serialize};
use shoprec::services::serving::PopularItem;
use shoprec::config::ServerConfig;
use shoprec::{init_tracing, AppState, Config, RecommendError};
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,
}

#[derive(Debug, Deserialize)]
struct ProductQuery {
    category: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RecommendationQuery {
    limit: Option<usize>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    refresh: bool,
}

/// Query-string boolean that also takes `1`/`0`, `yes`/`no` and `on`/`off`.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(de::Error::invalid_value(
            de::Unexpected::Str(other),
            &"a flag such as true, false, 1 or 0",
        )),
    }
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateRequest {
    count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    name: String,
    email: String,
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

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

fn failure(context: &str, err: RecommendError) -> (StatusCode, Json<ApiResponse<()>>) {
    let status = match err {
        RecommendError::NotFound(_) => StatusCode::NOT_FOUND,
        RecommendError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => {
            error!("{}: {}", context, err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ApiResponse::error(err.to_string())))
}

async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HashMap<String, serde_json::Value>>> {
    let mut health = state.serving.health_check().await;
    health.insert(
        "service".to_string(),
        serde_json::Value::String("shoprec-recommendation".to_string()),
    );
    Json(ApiResponse::success(health))
}

async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductQuery>,
) -> ApiResult<Vec<shoprec::Product>> {
    state
        .serving
        .list_products(params.category.as_deref(), params.limit, params.offset)
        .await
        .map(|products| Json(ApiResponse::success(products)))
        .map_err(|e| failure("Failed to list products", e))
}

async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    state
        .serving
        .categories()
        .await
        .map(|categories| Json(ApiResponse::success(categories)))
        .map_err(|e| failure("Failed to list categories", e))
}

async fn get_product(State(state): State<AppState>, Path(product_id): Path<i64>) -> ApiResult<shoprec::Product> {
    state
        .serving
        .product(product_id)
        .await
        .map(|product| Json(ApiResponse::success(product)))
        .map_err(|e| failure("Failed to get product", e))
}

async fn list_users(State(state): State<AppState>) -> ApiResult<Vec<shoprec::User>> {
    state
        .serving
        .list_users()
        .await
        .map(|users| Json(ApiResponse::success(users)))
        .map_err(|e| failure("Failed to list users", e))
}

async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<shoprec::User>>), (StatusCode, Json<ApiResponse<()>>)> {
    state
        .serving
        .create_user(&request.name, &request.email)
        .await
        .map(|user| (StatusCode::CREATED, Json(ApiResponse::success(user))))
        .map_err(|e| failure("Failed to create user", e))
}

async fn get_user_stats(State(state): State<AppState>, Path(user_id): Path<i64>) -> ApiResult<shoprec::UserStats> {
    state
        .serving
        .user_stats(user_id)
        .await
        .map(|stats| Json(ApiResponse::success(stats)))
        .map_err(|e| failure("Failed to get user stats", e))
}

async fn record_interaction(
    State(state): State<AppState>,
    Json(interaction): Json<shoprec::NewInteraction>,
) -> Result<(StatusCode, Json<ApiResponse<shoprec::Interaction>>), (StatusCode, Json<ApiResponse<()>>)> {
    state
        .serving
        .record_interaction(interaction)
        .await
        .map(|stored| (StatusCode::CREATED, Json(ApiResponse::success(stored))))
        .map_err(|e| failure("Failed to record interaction", e))
}

async fn get_popular(State(state): State<AppState>, Query(params): Query<LimitQuery>) -> ApiResult<Vec<PopularItem>> {
    state
        .serving
        .popular(params.limit)
        .await
        .map(|items| Json(ApiResponse::success(items)))
        .map_err(|e| failure("Failed to get popular products", e))
}

async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(params): Query<RecommendationQuery>,
) -> ApiResult<Vec<shoprec::RecommendationView>> {
    state
        .serving
        .recommendations_for(user_id, params.limit, params.refresh)
        .await
        .map(|views| Json(ApiResponse::success(views)))
        .map_err(|e| failure("Failed to get recommendations", e))
}

async fn generate_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    request: Option<Json<GenerateRequest>>,
) -> ApiResult<Vec<shoprec::RecommendationView>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let count = request.count.unwrap_or_else(|| state.serving.default_count());

    match state.serving.generate_and_persist(user_id, count).await {
        Ok(views) if views.is_empty() => Ok(Json(ApiResponse {
            success: true,
            data: Some(views),
            message: "No recommendations could be generated for this user".to_string(),
        })),
        Ok(views) => Ok(Json(ApiResponse::success(views))),
        Err(e) => Err(failure("Failed to generate recommendations", e)),
    }
}

async fn get_stats(State(state): State<AppState>) -> Json<ApiResponse<HashMap<String, u64>>> {
    Json(ApiResponse::success(state.serving.get_serving_stats()))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/products", get(list_products))
        .route("/products/categories", get(list_categories))
        .route("/products/:product_id", get(get_product))
        .route("/users", get(list_users).post(create_user))
        .route("/users/:user_id/stats", get(get_user_stats))
        .route("/interactions", post(record_interaction))
        .route("/recommendations/popular", get(get_popular))
        .route("/recommendations/:user_id", get(get_recommendations))
        .route("/recommendations/:user_id/generate", post(generate_recommendations))
        .route("/stats", get(get_stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn build_runtime(server: &ServerConfig) -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(server.worker_threads())
        .enable_all()
        .build()
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.server.socket_addr();
    let state = AppState::new(config).await?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = Config::load(&args.config)?;
    info!("Starting shoprec recommendation server with config: {:?}", config.server);

    let runtime = build_runtime(&config.server)?;
    runtime.block_on(serve(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Uri;

    fn recommendation_query(uri: &str) -> Option<RecommendationQuery> {
        let uri: Uri = uri.parse().unwrap();
        Query::<RecommendationQuery>::try_from_uri(&uri).ok().map(|Query(q)| q)
    }

    #[test]
    fn test_refresh_flag_accepts_common_spellings() {
        for truthy in ["1", "true", "TRUE", "yes", "on"] {
            let query = recommendation_query(&format!("/recommendations/1?refresh={}", truthy)).unwrap();
            assert!(query.refresh, "{} should enable refresh", truthy);
        }
        for falsy in ["0", "false", "no", "off", ""] {
            let query = recommendation_query(&format!("/recommendations/1?refresh={}", falsy)).unwrap();
            assert!(!query.refresh, "{} should not enable refresh", falsy);
        }

        let query = recommendation_query("/recommendations/1?limit=3").unwrap();
        assert!(!query.refresh);
        assert_eq!(query.limit, Some(3));

        assert!(recommendation_query("/recommendations/1?refresh=maybe").is_none());
    }

    #[test]
    fn test_runtime_uses_configured_workers() {
        let mut server = Config::default().server;
        server.workers = 0;
        let runtime = build_runtime(&server).unwrap();
        assert_eq!(runtime.block_on(async { 2 + 2 }), 4);
    }
}
