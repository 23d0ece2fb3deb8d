//! Per-route admission limiter.

use std::sync::Arc;

use tracing::trace;

use super::gcra::{Decision, Quota};
use super::key::ThrottleKey;
use super::store::RateBudgetStore;

/// Admission front for one route: a quota applied to cells held in a
/// shared [`RateBudgetStore`].
///
/// The store is an explicitly owned instance passed in at construction,
/// never process-wide state, so several gateways can run side by side in
/// one process. Routes of one gateway share the store but never a key,
/// so saturating one route cannot reject another.
#[derive(Clone)]
pub struct RouteLimiter {
    quota: Quota,
    store: Arc<RateBudgetStore>,
}

impl RouteLimiter {
    /// Create a limiter applying `quota` to keys in `store`.
    pub fn new(quota: Quota, store: Arc<RateBudgetStore>) -> Self {
        Self { quota, store }
    }

    /// Decide one admission attempt for `key`.
    ///
    /// Fast and free of I/O: a store lookup plus one locked update on the
    /// key's cell.
    pub fn check(&self, key: &ThrottleKey) -> Decision {
        let cell = self.store.get_or_create(key);
        let decision = cell.decide(&self.quota);

        trace!(
            key = %key,
            allowed = decision.allowed,
            remaining = decision.remaining,
            "admission decision"
        );

        decision
    }

    /// The quota this limiter enforces.
    pub fn quota(&self) -> &Quota {
        &self.quota
    }
}
