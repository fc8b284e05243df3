use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use promokita_db::{count_coupons, query_coupons, CouponFilters, CouponRow, SortOrder};

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, Pagination};

#[derive(Debug, Deserialize)]
pub(super) struct ListCouponsParams {
    platform: Option<String>,
    merchant: Option<String>,
    status: Option<String>,
    featured: Option<bool>,
    discount_type: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
    sort: Option<String>,
    order: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct CouponItem {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub discount_type: String,
    pub discount_value: i64,
    pub coupon_code: Option<String>,
    pub platform: String,
    pub platform_slug: String,
    pub merchant: Option<String>,
    pub source_url: String,
    pub image_url: Option<String>,
    pub status: String,
    pub is_featured: bool,
    pub valid_until: DateTime<Utc>,
    pub scraped_at: DateTime<Utc>,
}

impl From<CouponRow> for CouponItem {
    fn from(row: CouponRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            discount_type: row.discount_type,
            discount_value: row.discount_value,
            coupon_code: row.coupon_code,
            platform: row.platform_name,
            platform_slug: row.platform_slug,
            merchant: row.merchant_name,
            source_url: row.source_url,
            image_url: row.image_url,
            status: row.status,
            is_featured: row.is_featured,
            valid_until: row.valid_until,
            scraped_at: row.scraped_at,
        }
    }
}

fn parse_order(order: Option<&str>) -> Result<SortOrder, ApiError> {
    match order {
        None => Ok(SortOrder::default()),
        Some("asc") => Ok(SortOrder::Asc),
        Some("desc") => Ok(SortOrder::Desc),
        Some(other) => Err(ApiError::with_message(
            "validation_error",
            format!("order must be 'asc' or 'desc', got '{other}'"),
        )),
    }
}

pub(super) async fn list_coupons(
    State(state): State<AppState>,
    Query(params): Query<ListCouponsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let order = parse_order(params.order.as_deref())?;
    let limit = normalize_limit(params.limit);
    let offset = params.offset.unwrap_or(0).max(0);

    let filters = CouponFilters {
        platform_slug: params.platform.as_deref(),
        merchant_slug: params.merchant.as_deref(),
        status: params.status.as_deref(),
        featured: params.featured,
        discount_type: params.discount_type.as_deref(),
        limit,
        offset,
        sort: params.sort.as_deref(),
        order,
    };

    let rows = query_coupons(&state.pool, &filters)
        .await
        .map_err(|e| map_db_error(&e))?;
    let total = count_coupons(&state.pool, &filters)
        .await
        .map_err(|e| map_db_error(&e))?;

    let items: Vec<CouponItem> = rows.into_iter().map(CouponItem::from).collect();
    Ok(Json(ApiResponse::paginated(
        items,
        Pagination::new(total, limit, offset),
    )))
}
