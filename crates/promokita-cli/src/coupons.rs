//! Read-only coupon commands: listing, detail, code lookup, and stats.

use sqlx::PgPool;

use promokita_db::{CouponFilters, CouponRow, SortOrder};

fn format_discount(row: &CouponRow) -> String {
    match row.discount_type.as_str() {
        "percentage" => format!("{}%", row.discount_value),
        "fixed" => format!("Rp {}", row.discount_value),
        "cashback" => format!("cashback {}%", row.discount_value),
        "shipping" => "free shipping".to_string(),
        "bogo" => "buy one get one".to_string(),
        other => format!("{other} {}", row.discount_value),
    }
}

/// # Errors
///
/// Returns an error if the query fails.
pub(crate) async fn list(pool: &PgPool, platform: Option<&str>, limit: i64) -> anyhow::Result<()> {
    let filters = CouponFilters {
        platform_slug: platform,
        limit: limit.clamp(1, 100),
        sort: Some("scraped_at"),
        order: SortOrder::Desc,
        ..CouponFilters::default()
    };

    let rows = promokita_db::query_coupons(pool, &filters).await?;
    if rows.is_empty() {
        println!("no coupons matched");
        return Ok(());
    }

    for row in &rows {
        let code = row.coupon_code.as_deref().unwrap_or("-");
        println!(
            "#{:<6} [{}] {} | {} | code {} | valid until {}",
            row.id,
            row.platform_slug,
            row.title,
            format_discount(row),
            code,
            row.valid_until.format("%Y-%m-%d"),
        );
    }

    Ok(())
}

/// # Errors
///
/// Returns an error if the query fails or the coupon does not exist.
pub(crate) async fn show(pool: &PgPool, id: i64) -> anyhow::Result<()> {
    let row = promokita_db::get_coupon(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("coupon #{id} not found"))?;

    println!("#{} {}", row.id, row.title);
    println!("  platform:  {} ({})", row.platform_name, row.platform_slug);
    if let Some(merchant) = &row.merchant_name {
        println!("  merchant:  {merchant}");
    }
    println!("  discount:  {}", format_discount(&row));
    println!("  code:      {}", row.coupon_code.as_deref().unwrap_or("-"));
    println!("  status:    {}{}", row.status, if row.is_featured { " (featured)" } else { "" });
    println!("  valid:     until {}", row.valid_until.format("%Y-%m-%d %H:%M UTC"));
    println!("  scraped:   {}", row.scraped_at.format("%Y-%m-%d %H:%M UTC"));
    println!("  source:    {}", row.source_url);
    println!();
    println!("  {}", row.description);

    Ok(())
}

/// # Errors
///
/// Returns an error if the query fails.
pub(crate) async fn all(pool: &PgPool, limit: i64) -> anyhow::Result<()> {
    let rows = promokita_db::coupons_with_codes(pool, limit.clamp(1, 500)).await?;
    if rows.is_empty() {
        println!("no active coupons with codes");
        return Ok(());
    }

    let mut current_platform: Option<&str> = None;
    for row in &rows {
        if current_platform != Some(row.platform_name.as_str()) {
            println!("{}", row.platform_name);
            current_platform = Some(row.platform_name.as_str());
        }
        // rows are ordered by platform name, so grouping is a single pass
        let code = row.coupon_code.as_deref().unwrap_or("-");
        println!("  {code:<14} {} ({})", row.title, format_discount(row));
    }

    Ok(())
}

/// # Errors
///
/// Returns an error if the query fails or no active coupon carries the code.
pub(crate) async fn use_code(pool: &PgPool, code: &str) -> anyhow::Result<()> {
    let row = promokita_db::get_coupon_by_code(pool, code)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no active coupon with code '{code}'"))?;

    println!("{} | {}", row.title, format_discount(&row));
    println!();
    println!("How to use this code:");
    println!("  1. Open {} in your browser", row.source_url);
    println!("  2. Add items to your cart on {}", row.platform_name);
    println!("  3. At checkout, enter the code: {code}");
    println!("  4. Valid until {}", row.valid_until.format("%Y-%m-%d"));

    Ok(())
}

/// # Errors
///
/// Returns an error if a query fails.
pub(crate) async fn stats(pool: &PgPool) -> anyhow::Result<()> {
    let by_status = promokita_db::stats_by_status(pool).await?;
    let by_platform = promokita_db::stats_by_platform(pool).await?;
    let by_type = promokita_db::stats_by_discount_type(pool).await?;

    println!("by status:");
    for (status, count) in &by_status {
        println!("  {status:<14} {count}");
    }

    println!("active by platform:");
    for (platform, count) in &by_platform {
        println!("  {platform:<14} {count}");
    }

    println!("active by discount type:");
    for (discount_type, count) in &by_type {
        println!("  {discount_type:<14} {count}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use promokita_core::DiscountType;

    fn row(discount_type: DiscountType, discount_value: i64) -> CouponRow {
        CouponRow {
            id: 1,
            title: "Promo".to_string(),
            description: "test".to_string(),
            discount_type: discount_type.as_str().to_string(),
            discount_value,
            coupon_code: None,
            platform_id: 1,
            platform_name: "Shopee".to_string(),
            platform_slug: "shopee".to_string(),
            merchant_id: None,
            merchant_name: None,
            source_url: "https://example.test".to_string(),
            image_url: None,
            status: "active".to_string(),
            is_featured: false,
            valid_until: Utc::now(),
            scraped_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn format_discount_covers_every_stored_type() {
        // The match arms must use the exact strings DiscountType::as_str
        // persists, or rows silently fall through to the catch-all.
        assert_eq!(format_discount(&row(DiscountType::Percentage, 50)), "50%");
        assert_eq!(format_discount(&row(DiscountType::Fixed, 100_000)), "Rp 100000");
        assert_eq!(format_discount(&row(DiscountType::Cashback, 20)), "cashback 20%");
        assert_eq!(format_discount(&row(DiscountType::Shipping, 0)), "free shipping");
        assert_eq!(format_discount(&row(DiscountType::Bogo, 50)), "buy one get one");
    }
}
