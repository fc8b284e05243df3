//! Canonical coupon types shared by the scraper pipeline, the persistence
//! layer, and the read API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid {what}: \"{value}\"")]
pub struct InvalidValue {
    pub what: &'static str,
    pub value: String,
}

/// How a coupon's `discount_value` is interpreted.
///
/// `Percentage` and `Cashback` values are whole percents; `Fixed` values are
/// rupiah amounts; `Shipping` carries value 0; `Bogo` carries an assumed
/// effective-percent value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
    Shipping,
    Cashback,
    Bogo,
}

impl DiscountType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
            DiscountType::Shipping => "shipping",
            DiscountType::Cashback => "cashback",
            DiscountType::Bogo => "bogo",
        }
    }
}

impl std::fmt::Display for DiscountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DiscountType {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountType::Percentage),
            "fixed" => Ok(DiscountType::Fixed),
            "shipping" => Ok(DiscountType::Shipping),
            "cashback" => Ok(DiscountType::Cashback),
            "bogo" => Ok(DiscountType::Bogo),
            other => Err(InvalidValue {
                what: "discount type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponStatus {
    Active,
    Expired,
    Disabled,
    Pending,
}

impl CouponStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CouponStatus::Active => "active",
            CouponStatus::Expired => "expired",
            CouponStatus::Disabled => "disabled",
            CouponStatus::Pending => "pending",
        }
    }
}

impl std::fmt::Display for CouponStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CouponStatus {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CouponStatus::Active),
            "expired" => Ok(CouponStatus::Expired),
            "disabled" => Ok(CouponStatus::Disabled),
            "pending" => Ok(CouponStatus::Pending),
            other => Err(InvalidValue {
                what: "coupon status",
                value: other.to_string(),
            }),
        }
    }
}

/// A fully normalized coupon ready for persistence.
///
/// The natural key is `(title, platform_id, merchant_id)`; re-upserting the
/// same key refreshes the mutable columns rather than creating a new row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCoupon {
    pub title: String,
    pub description: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub coupon_code: Option<String>,
    pub platform_id: i64,
    pub merchant_id: Option<i64>,
    pub source_url: String,
    pub image_url: Option<String>,
    pub status: CouponStatus,
    pub is_featured: bool,
    pub valid_until: DateTime<Utc>,
    pub scraped_at: DateTime<Utc>,
}

impl NewCoupon {
    /// The upsert conflict key for this record.
    #[must_use]
    pub fn natural_key(&self) -> (String, i64, Option<i64>) {
        (self.title.clone(), self.platform_id, self.merchant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn discount_type_round_trips_through_str() {
        for ty in [
            DiscountType::Percentage,
            DiscountType::Fixed,
            DiscountType::Shipping,
            DiscountType::Cashback,
            DiscountType::Bogo,
        ] {
            assert_eq!(DiscountType::from_str(ty.as_str()).unwrap(), ty);
        }
    }

    #[test]
    fn unknown_discount_type_is_rejected() {
        let err = DiscountType::from_str("loyalty").unwrap_err();
        assert_eq!(err.value, "loyalty");
    }

    #[test]
    fn coupon_status_serializes_lowercase() {
        let json = serde_json::to_string(&CouponStatus::Expired).unwrap();
        assert_eq!(json, "\"expired\"");
    }
}
