mod coupons;
mod scrape;
mod status;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use promokita_scraper::Orchestrator;

use crate::middleware::{request_id, require_bearer_auth, AuthState};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub orchestrator: Arc<Orchestrator>,
}

/// Success envelope: `{success: true, data, pagination?, timestamp}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            pagination: None,
            timestamp: Utc::now(),
        }
    }

    pub fn paginated(data: T, pagination: Pagination) -> Self {
        Self {
            success: true,
            data,
            pagination: Some(pagination),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

impl Pagination {
    #[must_use]
    pub fn new(total: i64, limit: i64, offset: i64) -> Self {
        Self {
            total,
            limit,
            offset,
            has_more: offset + limit < total,
        }
    }
}

/// Error envelope: `{success: false, error, message?}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: None,
        }
    }

    pub fn with_message(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: Some(message.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

/// Default page size 20, hard cap 100.
pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(20).clamp(1, 100)
}

pub(super) fn map_db_error(error: &promokita_db::DbError) -> ApiError {
    tracing::error!(error = %error, "database query failed");
    ApiError::with_message("internal_error", "database query failed")
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState) -> Router<AppState> {
    Router::new()
        .route("/scrape/trigger", post(scrape::trigger_scrape))
        .layer(axum::middleware::from_fn_with_state(
            auth,
            require_bearer_auth,
        ))
}

pub fn build_app(state: AppState, auth: AuthState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/coupons", get(coupons::list_coupons))
        .route("/status", get(status::get_status));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match promokita_db::ping(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::new(HealthData {
                status: "ok",
                database: "ok",
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::new(HealthData {
                    status: "degraded",
                    database: "unavailable",
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_limit_applies_defaults_and_bounds() {
        assert_eq!(normalize_limit(None), 20);
        assert_eq!(normalize_limit(Some(0)), 1);
        assert_eq!(normalize_limit(Some(1_000)), 100);
        assert_eq!(normalize_limit(Some(25)), 25);
    }

    #[test]
    fn pagination_has_more_flags_remaining_rows() {
        assert!(Pagination::new(100, 20, 0).has_more);
        assert!(Pagination::new(100, 20, 79).has_more);
        assert!(!Pagination::new(100, 20, 80).has_more);
        assert!(!Pagination::new(5, 20, 0).has_more);
    }

    #[test]
    fn pagination_serializes_camel_case() {
        let json = serde_json::to_string(&Pagination::new(3, 20, 0)).expect("serialize");
        assert!(json.contains("\"hasMore\":false"));
        assert!(json.contains("\"total\":3"));
    }

    #[test]
    fn api_error_not_found_maps_to_404() {
        let response = ApiError::new("not_found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn api_error_validation_error_maps_to_bad_request() {
        let response =
            ApiError::with_message("validation_error", "invalid input").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn api_error_omits_null_message() {
        let json = serde_json::to_string(&ApiError::new("not_found")).expect("serialize");
        assert!(!json.contains("message"));
        assert!(json.contains("\"success\":false"));
    }

    // ---------------------------------------------------------------------
    // Route integration tests (with DB)
    // ---------------------------------------------------------------------

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use promokita_core::MemoryGateway;
    use promokita_scraper::{Orchestrator, OrchestratorSettings};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state(pool: sqlx::PgPool) -> AppState {
        let orchestrator = Orchestrator::new(
            Vec::new(),
            Arc::new(MemoryGateway::new()),
            OrchestratorSettings {
                max_concurrent: 1,
                platform_timeout: Duration::from_secs(30),
                inter_batch_delay: Duration::ZERO,
            },
        );
        AppState {
            pool,
            orchestrator: Arc::new(orchestrator),
        }
    }

    async fn seed_coupon(pool: &sqlx::PgPool, title: &str, platform_slug: &str) {
        let platform_id: i64 =
            sqlx::query_scalar("SELECT id FROM platforms WHERE slug = $1")
                .bind(platform_slug)
                .fetch_one(pool)
                .await
                .expect("seeded platform");

        sqlx::query(
            "INSERT INTO coupons \
             (title, description, discount_type, discount_value, platform_id, \
              source_url, status, is_featured, valid_until, scraped_at) \
             VALUES ($1, 'test', 'percentage', 25, $2, 'https://example.test', \
                     'active', false, NOW() + INTERVAL '7 days', NOW())",
        )
        .bind(title)
        .bind(platform_id)
        .execute(pool)
        .await
        .expect("insert coupon");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn health_returns_ok(pool: sqlx::PgPool) {
        let auth = AuthState::from_config(&[], true);
        let app = build_app(test_state(pool), auth);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json parse");
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["database"], "ok");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn list_coupons_filters_by_platform(pool: sqlx::PgPool) {
        seed_coupon(&pool, "Diskon Gadget", "tokopedia").await;
        seed_coupon(&pool, "Diskon Fashion", "shopee").await;

        let auth = AuthState::from_config(&[], true);
        let app = build_app(test_state(pool), auth);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/coupons?platform=tokopedia")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json parse");
        let data = json["data"].as_array().expect("data array");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["title"], "Diskon Gadget");
        assert_eq!(json["pagination"]["total"], 1);
        assert_eq!(json["pagination"]["hasMore"], false);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn list_coupons_rejects_bad_order(pool: sqlx::PgPool) {
        let auth = AuthState::from_config(&[], true);
        let app = build_app(test_state(pool), auth);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/coupons?order=sideways")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn status_reports_idle_orchestrator(pool: sqlx::PgPool) {
        let auth = AuthState::from_config(&[], true);
        let app = build_app(test_state(pool), auth);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json parse");
        assert_eq!(json["data"]["orchestrator"]["running"], false);
        assert!(json["data"]["sessions"].as_array().expect("sessions").is_empty());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn trigger_requires_token_when_configured(pool: sqlx::PgPool) {
        let auth = AuthState::from_config(&["secret".to_string()], false);
        let app = build_app(test_state(pool), auth);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/scrape/trigger")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn trigger_rejects_unknown_platform(pool: sqlx::PgPool) {
        let auth = AuthState::from_config(&[], true);
        let app = build_app(test_state(pool), auth);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/scrape/trigger")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"platform":"ghost"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
