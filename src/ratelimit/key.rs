//! Classification keys for budget lookup.

/// Identifies which budget an admission attempt draws from.
///
/// The gateway classifies by route path, so all clients share one budget
/// per route. The optional client discriminator is the hook for finer
/// keying (for example per client address) without changing the store or
/// the limiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThrottleKey {
    /// Frontend path of the route being throttled
    path: String,
    /// Optional per-client discriminator
    client: Option<String>,
}

impl ThrottleKey {
    /// Key covering every client of a route.
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            client: None,
        }
    }

    /// Key scoped to a single client of a route.
    pub fn per_client(path: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            client: Some(client.into()),
        }
    }

    /// The route path this key belongs to.
    pub fn route_path(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Display for ThrottleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.client {
            Some(client) => write!(f, "{}@{}", self.path, client),
            None => write!(f, "{}", self.path),
        }
    }
}
