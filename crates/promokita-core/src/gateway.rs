//! The persistence seam between the scrape pipeline and storage.
//!
//! The pipeline only ever talks to [`PersistenceGateway`]; the backend is
//! chosen at construction time (Postgres in production, [`MemoryGateway`]
//! in tests and local demos). No runtime environment sniffing happens inside
//! business logic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::coupon::{CouponStatus, NewCoupon};
use crate::session::{NewSession, SessionPatch, SessionStatus};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("persistence backend error: {0}")]
    Backend(String),
}

/// Outcome of one batch upsert: how many rows were inserted, refreshed, and
/// rejected. Rejections never abort the remaining records in the batch.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct BatchOutcome {
    pub saved: u32,
    pub updated: u32,
    pub errors: u32,
}

/// Uniform data-access interface over the canonical coupon schema.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Resolve a platform's storage id by slug.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotFound`] when the platform is not seeded.
    async fn platform_id_by_slug(&self, slug: &str) -> Result<i64, GatewayError>;

    /// Resolve a merchant's storage id by slug. Merchants are optional;
    /// an unknown slug resolves to `None` rather than an error.
    async fn merchant_id_by_slug(&self, slug: &str) -> Result<Option<i64>, GatewayError>;

    /// Upsert a batch of coupons keyed on `(title, platform_id, merchant_id)`.
    async fn upsert_batch(&self, coupons: &[NewCoupon]) -> Result<BatchOutcome, GatewayError>;

    /// Flip `active` coupons whose `valid_until` has passed to `expired`.
    /// Returns the number of rows changed.
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, GatewayError>;

    /// Create a scrape session in `running` status; returns its id.
    async fn create_session(&self, session: NewSession) -> Result<i64, GatewayError>;

    /// Apply the terminal patch to a session.
    async fn update_session(&self, session_id: i64, patch: SessionPatch)
        -> Result<(), GatewayError>;
}

/// A stored coupon inside [`MemoryGateway`].
#[derive(Debug, Clone)]
pub struct StoredCoupon {
    pub record: NewCoupon,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored session inside [`MemoryGateway`].
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub id: i64,
    pub platform_id: i64,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub patch: Option<SessionPatch>,
}

#[derive(Debug, Default)]
struct MemoryState {
    platforms: HashMap<String, i64>,
    merchants: HashMap<String, i64>,
    coupons: HashMap<(String, i64, Option<i64>), StoredCoupon>,
    sessions: Vec<StoredSession>,
    next_session_id: i64,
}

/// In-memory reference implementation of [`PersistenceGateway`].
///
/// Mirrors the relational backend's upsert and cleanup semantics so pipeline
/// tests exercise the real contract without a database.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a platform slug -> id mapping.
    pub async fn seed_platform(&self, slug: &str, id: i64) {
        self.state
            .lock()
            .await
            .platforms
            .insert(slug.to_string(), id);
    }

    /// Seed a merchant slug -> id mapping.
    pub async fn seed_merchant(&self, slug: &str, id: i64) {
        self.state
            .lock()
            .await
            .merchants
            .insert(slug.to_string(), id);
    }

    /// Insert a coupon directly, bypassing upsert accounting. Test setup only.
    pub async fn seed_coupon(&self, coupon: NewCoupon) {
        let mut state = self.state.lock().await;
        let key = coupon.natural_key();
        let now = Utc::now();
        state.coupons.insert(
            key,
            StoredCoupon {
                record: coupon,
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub async fn coupon_count(&self) -> usize {
        self.state.lock().await.coupons.len()
    }

    pub async fn coupons(&self) -> Vec<StoredCoupon> {
        self.state.lock().await.coupons.values().cloned().collect()
    }

    pub async fn sessions(&self) -> Vec<StoredSession> {
        self.state.lock().await.sessions.clone()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn platform_id_by_slug(&self, slug: &str) -> Result<i64, GatewayError> {
        self.state
            .lock()
            .await
            .platforms
            .get(slug)
            .copied()
            .ok_or_else(|| GatewayError::NotFound {
                entity: "platform",
                key: slug.to_string(),
            })
    }

    async fn merchant_id_by_slug(&self, slug: &str) -> Result<Option<i64>, GatewayError> {
        Ok(self.state.lock().await.merchants.get(slug).copied())
    }

    async fn upsert_batch(&self, coupons: &[NewCoupon]) -> Result<BatchOutcome, GatewayError> {
        let mut state = self.state.lock().await;
        let mut outcome = BatchOutcome::default();
        let now = Utc::now();

        for coupon in coupons {
            if coupon.title.is_empty() {
                outcome.errors += 1;
                continue;
            }
            let key = coupon.natural_key();
            match state.coupons.get_mut(&key) {
                Some(existing) => {
                    existing.record = coupon.clone();
                    existing.updated_at = now;
                    outcome.updated += 1;
                }
                None => {
                    state.coupons.insert(
                        key,
                        StoredCoupon {
                            record: coupon.clone(),
                            created_at: now,
                            updated_at: now,
                        },
                    );
                    outcome.saved += 1;
                }
            }
        }

        Ok(outcome)
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, GatewayError> {
        let mut state = self.state.lock().await;
        let mut expired = 0u64;
        for stored in state.coupons.values_mut() {
            if stored.record.status == CouponStatus::Active && stored.record.valid_until < now {
                stored.record.status = CouponStatus::Expired;
                stored.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn create_session(&self, session: NewSession) -> Result<i64, GatewayError> {
        let mut state = self.state.lock().await;
        state.next_session_id += 1;
        let id = state.next_session_id;
        state.sessions.push(StoredSession {
            id,
            platform_id: session.platform_id,
            status: SessionStatus::Running,
            started_at: session.started_at,
            patch: None,
        });
        Ok(id)
    }

    async fn update_session(
        &self,
        session_id: i64,
        patch: SessionPatch,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| GatewayError::NotFound {
                entity: "scrape session",
                key: session_id.to_string(),
            })?;

        // Sessions are finalized exactly once; a second terminal patch is a
        // caller bug surfaced as a backend error rather than silent mutation.
        if session.status.is_terminal() {
            return Err(GatewayError::Backend(format!(
                "session {session_id} already finalized as {}",
                session.status
            )));
        }

        session.status = patch.status;
        session.patch = Some(patch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupon::DiscountType;
    use chrono::Duration;
    use uuid::Uuid;

    fn coupon(title: &str, platform_id: i64, valid_until: DateTime<Utc>) -> NewCoupon {
        NewCoupon {
            title: title.to_string(),
            description: format!("{title} - test"),
            discount_type: DiscountType::Percentage,
            discount_value: 25,
            coupon_code: None,
            platform_id,
            merchant_id: None,
            source_url: "https://example.test/promo".to_string(),
            image_url: None,
            status: CouponStatus::Active,
            is_featured: false,
            valid_until,
            scraped_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_batch_is_idempotent_on_natural_key() {
        let gateway = MemoryGateway::new();
        let batch = vec![
            coupon("50% OFF Widget", 1, Utc::now() + Duration::days(7)),
            coupon("Gratis Ongkir", 1, Utc::now() + Duration::days(7)),
        ];

        let first = gateway.upsert_batch(&batch).await.unwrap();
        assert_eq!(first.saved, 2);
        assert_eq!(first.updated, 0);

        let second = gateway.upsert_batch(&batch).await.unwrap();
        assert_eq!(second.saved, 0);
        assert_eq!(second.updated, 2);
        assert_eq!(gateway.coupon_count().await, 2);
    }

    #[tokio::test]
    async fn same_title_different_platform_is_a_distinct_row() {
        let gateway = MemoryGateway::new();
        let batch = vec![
            coupon("Mega Sale", 1, Utc::now() + Duration::days(7)),
            coupon("Mega Sale", 2, Utc::now() + Duration::days(7)),
        ];
        let outcome = gateway.upsert_batch(&batch).await.unwrap();
        assert_eq!(outcome.saved, 2);
    }

    #[tokio::test]
    async fn expire_stale_flips_only_past_active_rows() {
        let gateway = MemoryGateway::new();
        let now = Utc::now();
        gateway
            .seed_coupon(coupon("Old Deal", 1, now - Duration::days(1)))
            .await;
        gateway
            .seed_coupon(coupon("Fresh Deal", 1, now + Duration::days(1)))
            .await;

        let expired = gateway.expire_stale(now).await.unwrap();
        assert_eq!(expired, 1);

        let coupons = gateway.coupons().await;
        let old = coupons
            .iter()
            .find(|c| c.record.title == "Old Deal")
            .unwrap();
        let fresh = coupons
            .iter()
            .find(|c| c.record.title == "Fresh Deal")
            .unwrap();
        assert_eq!(old.record.status, CouponStatus::Expired);
        assert_eq!(fresh.record.status, CouponStatus::Active);
    }

    #[tokio::test]
    async fn expire_stale_is_a_noop_second_time() {
        let gateway = MemoryGateway::new();
        let now = Utc::now();
        gateway
            .seed_coupon(coupon("Old Deal", 1, now - Duration::days(1)))
            .await;
        assert_eq!(gateway.expire_stale(now).await.unwrap(), 1);
        assert_eq!(gateway.expire_stale(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn session_finalizes_exactly_once() {
        let gateway = MemoryGateway::new();
        let id = gateway
            .create_session(NewSession {
                public_id: Uuid::new_v4(),
                platform_id: 1,
                started_at: Utc::now(),
            })
            .await
            .unwrap();

        let patch = SessionPatch {
            status: SessionStatus::Completed,
            completed_at: Utc::now(),
            duration_ms: 1200,
            items_found: 5,
            items_saved: 4,
            items_updated: 1,
            items_failed: 0,
            error_details: None,
        };

        gateway.update_session(id, patch.clone()).await.unwrap();
        let err = gateway.update_session(id, patch).await.unwrap_err();
        assert!(matches!(err, GatewayError::Backend(_)));
    }

    #[tokio::test]
    async fn unknown_platform_slug_is_not_found() {
        let gateway = MemoryGateway::new();
        let err = gateway.platform_id_by_slug("nope").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { entity: "platform", .. }));
    }
}
