use crate::error::{Error, Result};
use crate::id::SNAPLINK_EPOCH;
use core::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

/// Supplies the current time in milliseconds since a configured epoch.
///
/// The allocator samples this on every call; implementations must be cheap
/// and safe to share across threads.
pub trait TimeSource: Send + Sync {
    fn current_millis(&self) -> u64;
}

/// Wall-clock time source, offset from a fixed epoch.
///
/// Deliberately *not* a monotonic timer: the allocator's contract is to
/// detect backward clock movement and refuse to allocate, which requires
/// observing the real system clock rather than papering over adjustments.
#[derive(Clone, Debug)]
pub struct SystemClock {
    epoch_ms: u64,
}

impl SystemClock {
    /// Constructs a clock anchored to the default [`SNAPLINK_EPOCH`].
    pub fn new() -> Result<Self> {
        Self::with_epoch(SNAPLINK_EPOCH)
    }

    /// Constructs a clock anchored to a custom epoch, given as a duration
    /// since 1970-01-01 UTC.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EpochInFuture`] if the system clock currently reads
    /// earlier than the requested epoch.
    pub fn with_epoch(epoch: Duration) -> Result<Self> {
        let epoch_ms = epoch.as_millis() as u64;
        let now_ms = unix_millis();
        if now_ms < epoch_ms {
            return Err(Error::EpochInFuture { epoch_ms });
        }
        Ok(Self { epoch_ms })
    }
}

impl TimeSource for SystemClock {
    fn current_millis(&self) -> u64 {
        // Saturates to zero if the system clock is stepped back past the
        // epoch; the allocator then reports the regression.
        unix_millis().saturating_sub(self.epoch_ms)
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
