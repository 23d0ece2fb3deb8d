//! Generic Cell Rate Algorithm admission cells.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{GatewayError, Result};

/// Admission budget for one route, derived from a sustained rate and a
/// burst allowance.
#[derive(Debug, Clone, Copy)]
pub struct Quota {
    /// Average spacing between admitted requests
    emission_interval: Duration,
    /// How far the arrival schedule may run ahead of real time
    tolerance: Duration,
    /// Burst allowance the quota was built from
    burst: u64,
}

impl Quota {
    /// Build a quota from `reqs_per_sec` and `burst`.
    ///
    /// A zero rate is a configuration error: it would mean an emission
    /// interval of infinity, so the route must not start.
    pub fn new(reqs_per_sec: u32, burst: u32) -> Result<Self> {
        if reqs_per_sec == 0 {
            return Err(GatewayError::Config(
                "reqsPerSec must be greater than zero".to_string(),
            ));
        }

        let emission_interval = Duration::from_secs(1) / reqs_per_sec;
        Ok(Self {
            emission_interval,
            tolerance: emission_interval * burst,
            burst: u64::from(burst),
        })
    }

    /// Average spacing between admitted requests.
    pub fn emission_interval(&self) -> Duration {
        self.emission_interval
    }

    /// Schedule slack granted on top of the sustained rate.
    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Burst allowance this quota was built from.
    pub fn burst(&self) -> u64 {
        self.burst
    }
}

/// Outcome of a single admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// How long until the next slot opens; zero when allowed
    pub retry_after: Duration,
    /// Approximate budget left, for informational headers
    pub remaining: u64,
    /// Time until the schedule is fully caught up
    pub reset_after: Duration,
}

/// Admission state for one classification key.
///
/// Tracks the theoretical arrival time (TAT): the moment at which the
/// schedule would next be caught up absent further arrivals. The mutex
/// makes the compare-and-update atomic per key, so concurrent attempts on
/// the same key serialize and can never both consume one slot. Cells for
/// different keys share nothing.
pub struct GcraCell {
    /// Monotonic origin for this cell's timestamps
    anchor: Instant,
    /// TAT as elapsed time on the anchor; `None` until first use
    tat: Mutex<Option<Duration>>,
}

impl GcraCell {
    /// Create a cell with an empty schedule.
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
            tat: Mutex::new(None),
        }
    }

    /// Decide one admission attempt against `quota` at the current time.
    pub fn decide(&self, quota: &Quota) -> Decision {
        self.decide_at(quota, self.anchor.elapsed())
    }

    /// Decide one admission attempt at an explicit point in time.
    ///
    /// A rejected attempt leaves the stored TAT untouched, so failed
    /// attempts never consume budget.
    fn decide_at(&self, quota: &Quota, now: Duration) -> Decision {
        let emission = quota.emission_interval();
        let mut tat = self.tat.lock();

        let current = tat.unwrap_or(now);
        let new_tat = current.max(now) + emission;
        let allowed_at = new_tat.saturating_sub(quota.tolerance() + emission);

        if now < allowed_at {
            return Decision {
                allowed: false,
                retry_after: allowed_at - now,
                remaining: 0,
                reset_after: current.saturating_sub(now),
            };
        }

        *tat = Some(new_tat);

        let used = ceil_div(new_tat.saturating_sub(now).saturating_sub(emission), emission);
        Decision {
            allowed: true,
            retry_after: Duration::ZERO,
            remaining: quota.burst().saturating_sub(used),
            reset_after: new_tat - now,
        }
    }
}

impl Default for GcraCell {
    fn default() -> Self {
        Self::new()
    }
}

fn ceil_div(n: Duration, d: Duration) -> u64 {
    n.as_nanos().div_ceil(d.as_nanos()) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: Duration = Duration::ZERO;

    fn quota(rate: u32, burst: u32) -> Quota {
        Quota::new(rate, burst).unwrap()
    }

    #[test]
    fn test_zero_rate_is_a_config_error() {
        assert!(Quota::new(0, 5).is_err());
    }

    #[test]
    fn test_quota_derivation() {
        let q = quota(2, 3);

        assert_eq!(q.emission_interval(), Duration::from_millis(500));
        assert_eq!(q.tolerance(), Duration::from_millis(1500));
        assert_eq!(q.burst(), 3);
    }

    #[test]
    fn test_first_use_admits_burst_plus_one() {
        let q = quota(1, 2);
        let cell = GcraCell::new();

        for _ in 0..3 {
            assert!(cell.decide_at(&q, T0).allowed);
        }

        let denied = cell.decide_at(&q, T0);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Duration::from_secs(1));
    }

    #[test]
    fn test_rejection_leaves_schedule_untouched() {
        let q = quota(1, 0);
        let cell = GcraCell::new();

        assert!(cell.decide_at(&q, T0).allowed);

        // Retrying within the same instant keeps rejecting with the
        // original schedule; the denials do not push retry_after out.
        let first_denial = cell.decide_at(&q, T0);
        let second_denial = cell.decide_at(&q, T0);
        assert!(!first_denial.allowed);
        assert_eq!(first_denial, second_denial);

        // The slot promised by retry_after is honored.
        let reopened = cell.decide_at(&q, first_denial.retry_after);
        assert!(reopened.allowed);
    }

    #[test]
    fn test_slot_reopens_after_emission_interval() {
        let q = quota(2, 0);
        let cell = GcraCell::new();

        assert!(cell.decide_at(&q, T0).allowed);
        assert!(!cell.decide_at(&q, Duration::from_millis(499)).allowed);
        assert!(cell.decide_at(&q, Duration::from_millis(500)).allowed);
    }

    #[test]
    fn test_remaining_counts_down() {
        let q = quota(1, 2);
        let cell = GcraCell::new();

        assert_eq!(cell.decide_at(&q, T0).remaining, 2);
        assert_eq!(cell.decide_at(&q, T0).remaining, 1);
        assert_eq!(cell.decide_at(&q, T0).remaining, 0);
    }

    #[test]
    fn test_reset_after_tracks_schedule() {
        let q = quota(1, 2);
        let cell = GcraCell::new();

        assert_eq!(cell.decide_at(&q, T0).reset_after, Duration::from_secs(1));
        assert_eq!(cell.decide_at(&q, T0).reset_after, Duration::from_secs(2));
        assert_eq!(cell.decide_at(&q, T0).reset_after, Duration::from_secs(3));
    }

    #[test]
    fn test_two_per_second_with_burst_one_scenario() {
        let q = quota(2, 1);
        let cell = GcraCell::new();

        assert!(cell.decide_at(&q, T0).allowed);
        assert!(cell.decide_at(&q, T0).allowed);

        let third = cell.decide_at(&q, T0);
        assert!(!third.allowed);
        assert_eq!(third.retry_after, Duration::from_millis(500));
    }

    #[test]
    fn test_idle_time_restores_budget() {
        let q = quota(10, 4);
        let cell = GcraCell::new();

        for _ in 0..5 {
            assert!(cell.decide_at(&q, T0).allowed);
        }
        assert!(!cell.decide_at(&q, T0).allowed);

        // A full tolerance worth of idle time restores the whole burst.
        let later = Duration::from_secs(1);
        for _ in 0..5 {
            assert!(cell.decide_at(&q, later).allowed);
        }
        assert!(!cell.decide_at(&q, later).allowed);
    }
}
