//! HTTP request gate, implemented as axum middleware.

mod gate;

pub use gate::{rate_limit, RateLimitGate};
