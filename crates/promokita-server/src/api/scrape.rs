use axum::{extract::State, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct TriggerBody {
    platform: Option<String>,
}

/// Trigger acknowledgement: `{success, message, data, timestamp}`.
#[derive(Debug, Serialize)]
pub(super) struct TriggerResponse {
    pub success: bool,
    pub message: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl TriggerResponse {
    fn new(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Kicks a scrape in the background and returns immediately. A trigger while
/// a cycle is in flight is acknowledged as a no-op rather than rejected.
pub(super) async fn trigger_scrape(
    State(state): State<AppState>,
    body: Option<Json<TriggerBody>>,
) -> Result<impl IntoResponse, ApiError> {
    let platform = body.and_then(|Json(b)| b.platform);

    if state.orchestrator.is_running() {
        return Ok(Json(TriggerResponse::new(
            "a scrape cycle is already in flight; trigger ignored",
            json!({ "running": true }),
        )));
    }

    match platform {
        Some(slug) => {
            if !state.orchestrator.platform_slugs().contains(&slug) {
                return Err(ApiError::with_message(
                    "validation_error",
                    format!("unknown or disabled platform '{slug}'"),
                ));
            }

            let orchestrator = state.orchestrator.clone();
            let platform = slug.clone();
            tokio::spawn(async move {
                if let Err(err) = orchestrator.run_platform(&platform).await {
                    tracing::error!(platform = platform.as_str(), error = %err, "triggered scrape failed");
                }
            });

            Ok(Json(TriggerResponse::new(
                format!("scrape started for platform '{slug}'"),
                json!({ "platform": slug }),
            )))
        }
        None => {
            let platforms = state.orchestrator.platform_slugs();
            let orchestrator = state.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator.run_cycle().await;
            });

            Ok(Json(TriggerResponse::new(
                "scrape cycle started",
                json!({ "platforms": platforms }),
            )))
        }
    }
}
