//! Clock abstraction for testable time management
//!
//! Direct use of `Utc::now()` throughout the codebase makes tests
//! non-deterministic. By abstracting time behind a trait we can control
//! timestamps in tests (install-stats `updated_at`, duration bookkeeping)
//! without actual delays.

use chrono::{DateTime, Utc};

/// Clock trait for obtaining the current time
///
/// All time-stamping code should use this trait instead of calling
/// `Utc::now()` directly.
pub trait Clock: Send + Sync {
    /// Returns the current time in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// System clock implementation using real system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
