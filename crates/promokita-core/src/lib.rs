pub mod app_config;
pub mod config;
pub mod coupon;
pub mod gateway;
pub mod platforms;
pub mod session;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, FetchMode};
pub use config::{load_app_config, load_app_config_from_env};
pub use coupon::{CouponStatus, DiscountType, NewCoupon};
pub use gateway::{BatchOutcome, GatewayError, MemoryGateway, PersistenceGateway};
pub use platforms::{
    load_platform_catalog, EndpointConfig, PlatformCatalog, PlatformConfig, RateLimitConfig,
    SelectorSet,
};
pub use session::{NewSession, SessionPatch, SessionStatus};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read platform catalog at {path}: {source}")]
    CatalogIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse platform catalog: {0}")]
    CatalogParse(#[from] serde_yaml::Error),

    #[error("platform catalog validation failed: {0}")]
    Validation(String),
}
