//! Core primitives for the snaplink URL-shortening system.
//!
//! This crate owns the two pieces of the system that must never be wrong:
//!
//! - [`IdAllocator`]: a lock-guarded, Snowflake-style allocator producing
//!   64-bit [`LinkId`]s that are strictly increasing per instance and unique
//!   across instances with distinct machine ids.
//! - [`base62`]: the bijective codec between a [`LinkId`]'s raw value and the
//!   short printable token handed out to callers.
//!
//! Both are pure and I/O-free; the only blocking point in the crate is the
//! allocator's bounded spin when a single millisecond's sequence space is
//! exhausted.

pub mod allocator;
pub mod base62;
mod clock;
mod error;
mod id;

pub use allocator::{AllocStatus, IdAllocator};
pub use clock::{SystemClock, TimeSource};
pub use error::{Error, Result};
pub use id::{
    LinkId, MACHINE_ID_BITS, MAX_MACHINE_ID, MAX_SEQUENCE, SEQUENCE_BITS, SNAPLINK_EPOCH,
    TIMESTAMP_BITS,
};
