//! Coupon upserts, expiry cleanup, and filtered read queries.

use chrono::{DateTime, Utc};
use promokita_core::NewCoupon;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::DbError;

/// A coupon row joined with its platform (and optional merchant) identity,
/// as served by the read API and the CLI.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CouponRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub discount_type: String,
    pub discount_value: i64,
    pub coupon_code: Option<String>,
    pub platform_id: i64,
    pub platform_name: String,
    pub platform_slug: String,
    pub merchant_id: Option<i64>,
    pub merchant_name: Option<String>,
    pub source_url: String,
    pub image_url: Option<String>,
    pub status: String,
    pub is_featured: bool,
    pub valid_until: DateTime<Utc>,
    pub scraped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether an upsert inserted a fresh row or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertResult {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filters for [`query_coupons`] / [`count_coupons`].
#[derive(Debug, Clone, Default)]
pub struct CouponFilters<'a> {
    pub platform_slug: Option<&'a str>,
    pub merchant_slug: Option<&'a str>,
    pub status: Option<&'a str>,
    pub featured: Option<bool>,
    pub discount_type: Option<&'a str>,
    pub limit: i64,
    pub offset: i64,
    pub sort: Option<&'a str>,
    pub order: SortOrder,
}

/// Columns callers may sort by. Anything else falls back to `scraped_at`,
/// never into the SQL string.
const SORTABLE: &[&str] = &[
    "scraped_at",
    "valid_until",
    "created_at",
    "updated_at",
    "discount_value",
    "title",
];

fn sort_column(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|s| SORTABLE.iter().find(|col| **col == s))
        .copied()
        .unwrap_or("scraped_at")
}

/// Upsert a single coupon on the `(title, platform_id, merchant_id)` natural
/// key. A conflict refreshes the mutable columns and bumps `updated_at`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn upsert_coupon(pool: &PgPool, coupon: &NewCoupon) -> Result<UpsertResult, DbError> {
    // xmax = 0 only holds for freshly inserted tuples, distinguishing
    // insert from conflict-update in a single round trip.
    let row = sqlx::query(
        "INSERT INTO coupons \
            (title, description, discount_type, discount_value, coupon_code, \
             platform_id, merchant_id, source_url, image_url, status, \
             is_featured, valid_until, scraped_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         ON CONFLICT (title, platform_id, merchant_id) DO UPDATE SET \
            description = EXCLUDED.description, \
            discount_type = EXCLUDED.discount_type, \
            discount_value = EXCLUDED.discount_value, \
            coupon_code = EXCLUDED.coupon_code, \
            source_url = EXCLUDED.source_url, \
            image_url = EXCLUDED.image_url, \
            status = EXCLUDED.status, \
            is_featured = EXCLUDED.is_featured, \
            valid_until = EXCLUDED.valid_until, \
            scraped_at = EXCLUDED.scraped_at, \
            updated_at = NOW() \
         RETURNING (xmax = 0) AS inserted",
    )
    .bind(&coupon.title)
    .bind(&coupon.description)
    .bind(coupon.discount_type.as_str())
    .bind(coupon.discount_value)
    .bind(&coupon.coupon_code)
    .bind(coupon.platform_id)
    .bind(coupon.merchant_id)
    .bind(&coupon.source_url)
    .bind(&coupon.image_url)
    .bind(coupon.status.as_str())
    .bind(coupon.is_featured)
    .bind(coupon.valid_until)
    .bind(coupon.scraped_at)
    .fetch_one(pool)
    .await?;

    let inserted: bool = row.try_get("inserted")?;
    Ok(if inserted {
        UpsertResult::Inserted
    } else {
        UpsertResult::Updated
    })
}

/// Flip `active` rows whose `valid_until` has passed to `expired`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn expire_stale(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE coupons SET status = 'expired', updated_at = NOW() \
         WHERE status = 'active' AND valid_until < $1",
    )
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, filters: &CouponFilters<'a>) {
    if let Some(slug) = filters.platform_slug {
        builder.push(" AND p.slug = ").push_bind(slug);
    }
    if let Some(slug) = filters.merchant_slug {
        builder.push(" AND m.slug = ").push_bind(slug);
    }
    if let Some(status) = filters.status {
        builder.push(" AND c.status = ").push_bind(status);
    }
    if let Some(featured) = filters.featured {
        builder.push(" AND c.is_featured = ").push_bind(featured);
    }
    if let Some(ty) = filters.discount_type {
        builder.push(" AND c.discount_type = ").push_bind(ty);
    }
}

/// Filtered, paginated coupon listing.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn query_coupons<'a>(
    pool: &PgPool,
    filters: &CouponFilters<'a>,
) -> Result<Vec<CouponRow>, DbError> {
    let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
        "SELECT c.id, c.title, c.description, c.discount_type, c.discount_value, \
                c.coupon_code, c.platform_id, p.name AS platform_name, \
                p.slug AS platform_slug, c.merchant_id, m.name AS merchant_name, \
                c.source_url, c.image_url, c.status, c.is_featured, \
                c.valid_until, c.scraped_at, c.created_at, c.updated_at \
         FROM coupons c \
         JOIN platforms p ON p.id = c.platform_id \
         LEFT JOIN merchants m ON m.id = c.merchant_id \
         WHERE TRUE",
    );

    push_filters(&mut builder, filters);

    builder.push(" ORDER BY c.");
    builder.push(sort_column(filters.sort));
    builder.push(" ");
    builder.push(filters.order.as_sql());
    builder.push(" LIMIT ").push_bind(filters.limit);
    builder.push(" OFFSET ").push_bind(filters.offset);

    let rows = builder.build_query_as::<CouponRow>().fetch_all(pool).await?;
    Ok(rows)
}

/// Total row count for the same filter set, for pagination metadata.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_coupons<'a>(
    pool: &PgPool,
    filters: &CouponFilters<'a>,
) -> Result<i64, DbError> {
    let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
        "SELECT COUNT(*) FROM coupons c \
         JOIN platforms p ON p.id = c.platform_id \
         LEFT JOIN merchants m ON m.id = c.merchant_id \
         WHERE TRUE",
    );
    push_filters(&mut builder, filters);

    let count: i64 = builder.build_query_scalar().fetch_one(pool).await?;
    Ok(count)
}

const COUPON_SELECT: &str =
    "SELECT c.id, c.title, c.description, c.discount_type, c.discount_value, \
            c.coupon_code, c.platform_id, p.name AS platform_name, \
            p.slug AS platform_slug, c.merchant_id, m.name AS merchant_name, \
            c.source_url, c.image_url, c.status, c.is_featured, \
            c.valid_until, c.scraped_at, c.created_at, c.updated_at \
     FROM coupons c \
     JOIN platforms p ON p.id = c.platform_id \
     LEFT JOIN merchants m ON m.id = c.merchant_id";

/// Fetch a single coupon by primary key.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_coupon(pool: &PgPool, id: i64) -> Result<Option<CouponRow>, DbError> {
    let row = sqlx::query_as::<_, CouponRow>(&format!("{COUPON_SELECT} WHERE c.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Fetch the most recently scraped active coupon carrying `code`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_coupon_by_code(pool: &PgPool, code: &str) -> Result<Option<CouponRow>, DbError> {
    let row = sqlx::query_as::<_, CouponRow>(&format!(
        "{COUPON_SELECT} WHERE c.coupon_code = $1 AND c.status = 'active' \
         ORDER BY c.scraped_at DESC LIMIT 1"
    ))
    .bind(code)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Active coupons that carry a code, ordered for per-platform grouping.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn coupons_with_codes(pool: &PgPool, limit: i64) -> Result<Vec<CouponRow>, DbError> {
    let rows = sqlx::query_as::<_, CouponRow>(&format!(
        "{COUPON_SELECT} WHERE c.coupon_code IS NOT NULL AND c.status = 'active' \
         ORDER BY p.name, c.scraped_at DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// `(status, count)` pairs over all coupons.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn stats_by_status(pool: &PgPool) -> Result<Vec<(String, i64)>, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM coupons GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// `(platform_name, count)` pairs over active coupons.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn stats_by_platform(pool: &PgPool) -> Result<Vec<(String, i64)>, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT p.name, COUNT(*) FROM coupons c \
         JOIN platforms p ON p.id = c.platform_id \
         WHERE c.status = 'active' \
         GROUP BY p.name ORDER BY COUNT(*) DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// `(discount_type, count)` pairs over active coupons.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn stats_by_discount_type(pool: &PgPool) -> Result<Vec<(String, i64)>, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT discount_type, COUNT(*) FROM coupons \
         WHERE status = 'active' \
         GROUP BY discount_type ORDER BY COUNT(*) DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_column_allows_whitelisted_names() {
        assert_eq!(sort_column(Some("valid_until")), "valid_until");
        assert_eq!(sort_column(Some("discount_value")), "discount_value");
    }

    #[test]
    fn sort_column_rejects_unknown_names() {
        // Arbitrary input must never reach the SQL string.
        assert_eq!(sort_column(Some("title; DROP TABLE coupons")), "scraped_at");
        assert_eq!(sort_column(None), "scraped_at");
    }

    #[test]
    fn sort_order_sql_fragments() {
        assert_eq!(SortOrder::Asc.as_sql(), "ASC");
        assert_eq!(SortOrder::Desc.as_sql(), "DESC");
        assert_eq!(SortOrder::default(), SortOrder::Desc);
    }
}
