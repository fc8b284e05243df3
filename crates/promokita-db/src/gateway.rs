//! Postgres-backed implementation of the persistence seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use promokita_core::{
    BatchOutcome, GatewayError, NewCoupon, NewSession, PersistenceGateway, SessionPatch,
};
use sqlx::PgPool;

use crate::coupons::{self, UpsertResult};
use crate::platforms;
use crate::sessions;
use crate::DbError;

/// [`PersistenceGateway`] over a live Postgres pool.
#[derive(Debug, Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn backend_error(err: DbError) -> GatewayError {
    GatewayError::Backend(err.to_string())
}

#[async_trait]
impl PersistenceGateway for PgGateway {
    async fn platform_id_by_slug(&self, slug: &str) -> Result<i64, GatewayError> {
        match platforms::platform_id_by_slug(&self.pool, slug).await {
            Ok(id) => Ok(id),
            Err(DbError::NotFound) => Err(GatewayError::NotFound {
                entity: "platform",
                key: slug.to_string(),
            }),
            Err(err) => Err(backend_error(err)),
        }
    }

    async fn merchant_id_by_slug(&self, slug: &str) -> Result<Option<i64>, GatewayError> {
        platforms::merchant_id_by_slug(&self.pool, slug)
            .await
            .map_err(backend_error)
    }

    async fn upsert_batch(&self, batch: &[NewCoupon]) -> Result<BatchOutcome, GatewayError> {
        let mut outcome = BatchOutcome::default();
        for coupon in batch {
            match coupons::upsert_coupon(&self.pool, coupon).await {
                Ok(UpsertResult::Inserted) => outcome.saved += 1,
                Ok(UpsertResult::Updated) => outcome.updated += 1,
                Err(err) => {
                    // One bad row must not sink the rest of the batch.
                    tracing::warn!(title = %coupon.title, error = %err, "coupon upsert failed");
                    outcome.errors += 1;
                }
            }
        }
        Ok(outcome)
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, GatewayError> {
        coupons::expire_stale(&self.pool, now)
            .await
            .map_err(backend_error)
    }

    async fn create_session(&self, session: NewSession) -> Result<i64, GatewayError> {
        sessions::create_session(&self.pool, &session)
            .await
            .map_err(backend_error)
    }

    async fn update_session(
        &self,
        session_id: i64,
        patch: SessionPatch,
    ) -> Result<(), GatewayError> {
        match sessions::update_session(&self.pool, session_id, &patch).await {
            Ok(()) => Ok(()),
            Err(DbError::NotFound) => Err(GatewayError::Backend(format!(
                "session {session_id} missing or already finalized"
            ))),
            Err(err) => Err(backend_error(err)),
        }
    }
}
