//! Rate limiting: GCRA admission cells and their bounded store.

mod gcra;
mod key;
mod limiter;
mod store;

pub use gcra::{Decision, GcraCell, Quota};
pub use key::ThrottleKey;
pub use limiter::RouteLimiter;
pub use store::RateBudgetStore;
