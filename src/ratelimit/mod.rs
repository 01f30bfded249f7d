//! Rate limiting logic and data model.

mod evaluator;
mod key;
mod record;
mod rules;

pub use evaluator::RateLimitEvaluator;
pub use key::{client_identifier, QuotaKey};
pub use record::{CounterRecord, Decision};
pub use rules::{RouteQuota, RouteRule, RouteRules};
