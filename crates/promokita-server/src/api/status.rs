use std::collections::HashMap;

use axum::{extract::State, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use promokita_db::{latest_sessions, list_platforms, stats_by_status, SessionRow};
use promokita_scraper::OrchestratorStatus;

use super::{map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct StatusData {
    pub orchestrator: OrchestratorStatus,
    /// Coupon counts keyed by status (`active`, `expired`, ...).
    pub coupons: HashMap<String, i64>,
    /// Most recent scrape session per platform.
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize)]
pub(super) struct SessionSummary {
    pub session_id: Uuid,
    pub platform: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub items_found: i32,
    pub items_saved: i32,
    pub items_updated: i32,
    pub items_failed: i32,
}

fn summarize(row: SessionRow, platform: String) -> SessionSummary {
    SessionSummary {
        session_id: row.public_id,
        platform,
        status: row.status,
        started_at: row.started_at,
        completed_at: row.completed_at,
        duration_ms: row.duration_ms,
        items_found: row.items_found,
        items_saved: row.items_saved,
        items_updated: row.items_updated,
        items_failed: row.items_failed,
    }
}

pub(super) async fn get_status(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let orchestrator = state.orchestrator.status().await;

    let coupons: HashMap<String, i64> = stats_by_status(&state.pool)
        .await
        .map_err(|e| map_db_error(&e))?
        .into_iter()
        .collect();

    let platform_names: HashMap<i64, String> = list_platforms(&state.pool)
        .await
        .map_err(|e| map_db_error(&e))?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();

    let sessions = latest_sessions(&state.pool)
        .await
        .map_err(|e| map_db_error(&e))?
        .into_iter()
        .map(|row| {
            let platform = platform_names
                .get(&row.platform_id)
                .cloned()
                .unwrap_or_else(|| format!("platform #{}", row.platform_id));
            summarize(row, platform)
        })
        .collect();

    Ok(Json(ApiResponse::new(StatusData {
        orchestrator,
        coupons,
        sessions,
    })))
}
