//! Client identifier derivation and store key construction.

/// Namespace prefix for every floodgate key in the store.
const KEY_PREFIX: &str = "ratelimit";

/// Derive the client identifier used to bucket requests.
///
/// Takes the first comma-separated token of the forwarded-for header value
/// (trimmed) when one is present, otherwise the transport-level peer
/// address, then strips any trailing port segment. Clients with no address
/// at all collapse into a single empty-string bucket; that is accepted
/// behavior, not an error.
pub fn client_identifier(forwarded_for: Option<&str>, peer_addr: Option<&str>) -> String {
    let address = forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .or(peer_addr)
        .unwrap_or("");

    // Drop everything from the first colon on (port, or zone for IPv6).
    address.split(':').next().unwrap_or("").to_string()
}

/// A key that uniquely identifies one (client, route) counter in the store.
///
/// The client part never contains a colon after port stripping, so the
/// rendered form parses unambiguously and distinct pairs never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuotaKey {
    /// The derived client identifier (may be empty)
    pub client: String,
    /// The matched route pattern
    pub route: String,
}

impl QuotaKey {
    /// Create a new quota key for a client and matched route.
    pub fn new(client: &str, route: &str) -> Self {
        Self {
            client: client.to_string(),
            route: route.to_string(),
        }
    }
}

impl std::fmt::Display for QuotaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", KEY_PREFIX, self.client, self.route)
    }
}
