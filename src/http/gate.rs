//! Request gate: resolves route rules, consults the evaluator, and turns
//! decisions into responses.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crate::config::FloodgateConfig;
use crate::ratelimit::{client_identifier, RateLimitEvaluator, RouteRules};
use crate::store::KeyValueStore;

/// Placeholder in the status message replaced with seconds-until-reset.
const RESET_PLACEHOLDER: &str = ":value:";

const HEADER_CURRENT: &str = "x-ratelimit-current";
const HEADER_LIMIT: &str = "x-ratelimit-limit";
const HEADER_RESET: &str = "x-ratelimit-reset";

struct GateInner {
    enabled: bool,
    headers: bool,
    status_message: String,
    fail_open: bool,
    rules: RouteRules,
    evaluator: RateLimitEvaluator,
}

/// The request gate shared across all in-flight requests.
///
/// Holds the immutable configuration surface, the route rules, and the
/// evaluator. Cheap to clone; install it with
/// `axum::middleware::from_fn_with_state(gate, rate_limit)`.
#[derive(Clone)]
pub struct RateLimitGate {
    inner: Arc<GateInner>,
}

impl RateLimitGate {
    /// Build a gate from configuration and a store backend.
    pub fn new(config: &FloodgateConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: Arc::new(GateInner {
                enabled: config.enabled,
                headers: config.headers,
                status_message: config.status_message.clone(),
                fail_open: config.fail_open,
                rules: RouteRules::new(config.routes.clone()),
                evaluator: RateLimitEvaluator::with_minimum_ttl(
                    store,
                    config.minimum_ttl_seconds,
                ),
            }),
        }
    }

    /// Gate one request.
    pub async fn handle(&self, request: Request, next: Next) -> Response {
        if !self.inner.enabled {
            return next.run(request).await;
        }

        // No matching rule means the request is not rate limited at all.
        let Some(quota) = self.inner.rules.resolve(request.uri().path()) else {
            return next.run(request).await;
        };

        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok());
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.to_string());
        let client = client_identifier(forwarded, peer.as_deref());

        let decision = match self.inner.evaluator.evaluate(&client, &quota).await {
            Ok(decision) => decision,
            Err(e) if self.inner.fail_open => {
                warn!(error = %e, path = %request.uri().path(), "Store unavailable, admitting request");
                return next.run(request).await;
            }
            Err(e) => {
                error!(error = %e, path = %request.uri().path(), "Store unavailable, rejecting request");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        };

        let mut response = if decision.limited {
            let message = self
                .inner
                .status_message
                .replace(RESET_PLACEHOLDER, &decision.seconds_until_reset.to_string());
            (StatusCode::TOO_MANY_REQUESTS, message).into_response()
        } else {
            next.run(request).await
        };

        // Observability headers reflect the decision on every gated
        // response, allowed or rejected.
        if self.inner.headers {
            let headers = response.headers_mut();
            headers.insert(HEADER_CURRENT, HeaderValue::from(decision.current));
            headers.insert(HEADER_LIMIT, HeaderValue::from(decision.limit));
            headers.insert(HEADER_RESET, HeaderValue::from(decision.seconds_until_reset));
        }

        response
    }
}

/// Middleware entry point for `axum::middleware::from_fn_with_state`.
pub async fn rate_limit(
    State(gate): State<RateLimitGate>,
    request: Request,
    next: Next,
) -> Response {
    gate.handle(request, next).await
}
