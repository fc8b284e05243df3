//! Lookups over the `platforms` and `merchants` reference tables.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `platforms` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlatformRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub base_url: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fetch all platforms ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_platforms(pool: &PgPool) -> Result<Vec<PlatformRow>, DbError> {
    let rows = sqlx::query_as::<_, PlatformRow>(
        "SELECT id, name, slug, base_url, is_active, created_at, updated_at \
         FROM platforms ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Resolve a platform id by slug.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for unknown slugs, [`DbError::Sqlx`] on
/// query failure.
pub async fn platform_id_by_slug(pool: &PgPool, slug: &str) -> Result<i64, DbError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM platforms WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Resolve a merchant id by slug. Unknown slugs are `None`, not an error:
/// most scraped coupons are platform-wide and carry no merchant.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn merchant_id_by_slug(pool: &PgPool, slug: &str) -> Result<Option<i64>, DbError> {
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM merchants WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}
