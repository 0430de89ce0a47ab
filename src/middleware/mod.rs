pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::{ApiKey, ApiKeyAuth};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use request_id::{RequestId, RequestIdValue};
