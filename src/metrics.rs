//! Per-route Prometheus instruments.

use std::sync::Arc;
use std::time::Duration;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, Opts, Registry, TextEncoder};

use crate::error::Result;

/// Latency histogram buckets in milliseconds.
const DURATION_BUCKETS_MS: &[f64] = &[
    0.1, 5.0, 15.0, 50.0, 100.0, 200.0, 300.0, 400.0, 500.0, 1000.0,
];

/// Gateway-owned metrics registry.
///
/// Instruments live in a registry instance held by the gateway rather
/// than the process-global default registry, so several gateways can
/// coexist in one process without label collisions.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    registry: Registry,
}

impl MetricsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    /// Register the two instruments for a route labelled `label` and
    /// return an active recorder over them.
    ///
    /// Registering the same label twice is an error, surfaced at startup.
    pub fn recorder_for(&self, label: &str) -> Result<Recorder> {
        let requests_total = IntCounter::with_opts(Opts::new(
            format!("{label}_requests_total"),
            format!("The total number of requests received by the {label} endpoint."),
        ))?;

        let response_time = HistogramVec::new(
            HistogramOpts::new(
                format!("{label}_http_request_duration_ms"),
                format!("Duration of HTTP requests received by the {label} endpoint in ms"),
            )
            .buckets(DURATION_BUCKETS_MS.to_vec()),
            &["method", "route", "code"],
        )?;

        self.registry.register(Box::new(requests_total.clone()))?;
        self.registry.register(Box::new(response_time.clone()))?;

        Ok(Recorder::Active(Arc::new(RouteInstruments {
            requests_total,
            response_time,
        })))
    }

    /// Render every registered instrument in the text exposition format.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Instruments for one route.
pub struct RouteInstruments {
    requests_total: IntCounter,
    response_time: HistogramVec,
}

/// Records request outcomes for one route.
///
/// `Disabled` keeps the same call surface with no side effects, so the
/// forwarding pipeline stays identical whether metrics are on or off.
#[derive(Clone)]
pub enum Recorder {
    Active(Arc<RouteInstruments>),
    Disabled,
}

impl Recorder {
    /// Count one inbound request, before the admission decision.
    pub fn inc_requests(&self) {
        if let Recorder::Active(instruments) = self {
            instruments.requests_total.inc();
        }
    }

    /// Record one completed request.
    pub fn observe(&self, method: &str, route: &str, code: u16, elapsed: Duration) {
        if let Recorder::Active(instruments) = self {
            instruments
                .response_time
                .with_label_values(&[method, route, &code.to_string()])
                .observe(elapsed.as_secs_f64() * 1000.0);
        }
    }
}
