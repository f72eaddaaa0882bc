use crate::id::MAX_MACHINE_ID;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants the core crate can emit.
///
/// Anything that threatens the zero-collision or monotonicity invariant is
/// surfaced here and is never retried internally.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The wall clock reads earlier than the timestamp of the last issued id.
    ///
    /// Allocating in this state could reissue an id, so the allocator refuses
    /// until the clock source is corrected. State is left untouched.
    #[error("clock regression: last issued at {last_ms}ms, clock reads {now_ms}ms")]
    ClockRegression { last_ms: u64, now_ms: u64 },

    /// The configured machine id does not fit the 10-bit field.
    #[error("machine id {machine_id} out of range 0..={MAX_MACHINE_ID}")]
    InvalidMachineId { machine_id: u64 },

    /// The configured epoch lies ahead of the current wall-clock time.
    #[error("epoch {epoch_ms}ms since unix epoch lies in the future")]
    EpochInFuture { epoch_ms: u64 },

    /// A short token contained a byte outside the base-62 alphabet, was
    /// empty, or decoded past `u64::MAX`.
    #[error("invalid short token: {token:?}")]
    InvalidToken { token: String },
}
