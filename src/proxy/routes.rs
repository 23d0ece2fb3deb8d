//! Route table construction and resolution.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::{GatewayConfig, RouteConfig};
use crate::error::Result;
use crate::metrics::{MetricsRegistry, Recorder};
use crate::ratelimit::{Quota, RateBudgetStore, RouteLimiter};

/// Everything the forwarding pipeline needs for one declared route.
pub struct RouteEntry {
    /// The declaration this entry was compiled from
    pub route: RouteConfig,
    /// Admission gate for this route
    pub limiter: RouteLimiter,
    /// Metric instruments for this route
    pub recorder: Recorder,
}

/// Immutable mapping from frontend path to its compiled route entry.
///
/// Built once at startup and never mutated, so resolution needs no
/// locking. The table is the single authority mapping inbound paths to
/// a (route, limiter, recorder) triple.
pub struct RouteTable {
    entries: HashMap<String, Arc<RouteEntry>>,
}

impl RouteTable {
    /// Compile the declared routes.
    ///
    /// A duplicated frontend path keeps the last declaration. Invalid
    /// quotas and duplicate metric labels are fatal here.
    pub fn build(
        config: &GatewayConfig,
        store: Arc<RateBudgetStore>,
        metrics: Option<&MetricsRegistry>,
    ) -> Result<Self> {
        // Dedupe first so an overridden declaration never registers
        // instruments.
        let mut declared: HashMap<&str, &RouteConfig> = HashMap::new();
        for route in &config.routes {
            declared.insert(route.frontend.as_str(), route);
        }

        let mut entries = HashMap::with_capacity(declared.len());
        for (frontend, route) in declared {
            let quota = Quota::new(route.reqs_per_sec, route.burst)?;
            let recorder = match metrics {
                Some(registry) => registry.recorder_for(&route.label)?,
                None => Recorder::Disabled,
            };

            info!(
                frontend = %route.frontend,
                backend = %route.backend,
                rate = route.reqs_per_sec,
                burst = route.burst,
                "route loaded"
            );

            entries.insert(
                frontend.to_string(),
                Arc::new(RouteEntry {
                    route: route.clone(),
                    limiter: RouteLimiter::new(quota, Arc::clone(&store)),
                    recorder,
                }),
            );
        }

        Ok(Self { entries })
    }

    /// Resolve an inbound path to its route entry. Exact match only;
    /// unmatched paths are the listener's default not-found concern.
    pub fn resolve(&self, path: &str) -> Option<Arc<RouteEntry>> {
        self.entries.get(path).cloned()
    }

    /// The frontend paths this table serves.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of compiled routes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no routes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(frontend: &str, backend: &str, label: &str) -> RouteConfig {
        RouteConfig {
            frontend: frontend.to_string(),
            backend: backend.to_string(),
            reqs_per_sec: 5,
            burst: 2,
            label: label.to_string(),
        }
    }

    fn table(routes: Vec<RouteConfig>, metrics: Option<&MetricsRegistry>) -> Result<RouteTable> {
        let config = GatewayConfig {
            routes,
            ..GatewayConfig::default()
        };
        RouteTable::build(&config, Arc::new(RateBudgetStore::new(64)), metrics)
    }

    #[test]
    fn test_resolve_exact_path() {
        let table = table(vec![route("/a", "http://backend-a/", "a")], None).unwrap();

        let entry = table.resolve("/a").unwrap();
        assert_eq!(entry.route.backend, "http://backend-a/");
        assert!(table.resolve("/a/sub").is_none());
        assert!(table.resolve("/missing").is_none());
    }

    #[test]
    fn test_duplicate_frontend_keeps_last_declaration() {
        let table = table(
            vec![
                route("/a", "http://first/", "first"),
                route("/a", "http://second/", "second"),
            ],
            None,
        )
        .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve("/a").unwrap().route.backend, "http://second/");
    }

    #[test]
    fn test_duplicate_frontend_registers_instruments_once() {
        let registry = MetricsRegistry::new();
        let table = table(
            vec![
                route("/a", "http://first/", "a"),
                route("/a", "http://second/", "a"),
            ],
            Some(&registry),
        )
        .unwrap();

        assert_eq!(table.len(), 1);
        assert!(matches!(
            table.resolve("/a").unwrap().recorder,
            Recorder::Active(_)
        ));
    }

    #[test]
    fn test_duplicate_label_across_routes_is_fatal() {
        let registry = MetricsRegistry::new();
        let result = table(
            vec![
                route("/a", "http://first/", "shared"),
                route("/b", "http://second/", "shared"),
            ],
            Some(&registry),
        );

        assert!(result.is_err());
    }

    #[test]
    fn test_metrics_disabled_builds_disabled_recorders() {
        let table = table(vec![route("/a", "http://backend-a/", "a")], None).unwrap();

        assert!(matches!(
            table.resolve("/a").unwrap().recorder,
            Recorder::Disabled
        ));
    }
}
