//! Database operations for `scrape_sessions`.

use chrono::{DateTime, Utc};
use promokita_core::{NewSession, SessionPatch};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `scrape_sessions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: i64,
    pub public_id: Uuid,
    pub platform_id: i64,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub items_found: i32,
    pub items_saved: i32,
    pub items_updated: i32,
    pub items_failed: i32,
    pub error_details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Create a session in `running` status; returns the new row id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_session(pool: &PgPool, session: &NewSession) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO scrape_sessions (public_id, platform_id, status, started_at) \
         VALUES ($1, $2, 'running', $3) RETURNING id",
    )
    .bind(session.public_id)
    .bind(session.platform_id)
    .bind(session.started_at)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Apply the terminal patch to a running session.
///
/// The `status = 'running'` guard makes finalization single-shot: a second
/// patch matches zero rows and reports [`DbError::NotFound`].
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the session does not exist or was already
/// finalized, [`DbError::Sqlx`] on statement failure.
pub async fn update_session(
    pool: &PgPool,
    session_id: i64,
    patch: &SessionPatch,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE scrape_sessions SET \
            status = $2, completed_at = $3, duration_ms = $4, \
            items_found = $5, items_saved = $6, items_updated = $7, \
            items_failed = $8, error_details = $9 \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(session_id)
    .bind(patch.status.as_str())
    .bind(patch.completed_at)
    .bind(patch.duration_ms)
    .bind(patch.items_found)
    .bind(patch.items_saved)
    .bind(patch.items_updated)
    .bind(patch.items_failed)
    .bind(&patch.error_details)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// The most recent session per platform, for health reporting.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_sessions(pool: &PgPool) -> Result<Vec<SessionRow>, DbError> {
    let rows = sqlx::query_as::<_, SessionRow>(
        "SELECT DISTINCT ON (platform_id) \
            id, public_id, platform_id, status, started_at, completed_at, \
            duration_ms, items_found, items_saved, items_updated, items_failed, \
            error_details, created_at \
         FROM scrape_sessions \
         ORDER BY platform_id, started_at DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
