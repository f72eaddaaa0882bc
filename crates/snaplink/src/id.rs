use core::fmt;
use core::time::Duration;
use serde::{Deserialize, Serialize};

/// Width of the millisecond timestamp field (high bits).
pub const TIMESTAMP_BITS: u32 = 41;
/// Width of the machine id field.
pub const MACHINE_ID_BITS: u32 = 10;
/// Width of the per-millisecond sequence field (low bits).
pub const SEQUENCE_BITS: u32 = 12;

/// Largest machine id representable in the layout (1023).
pub const MAX_MACHINE_ID: u64 = (1 << MACHINE_ID_BITS) - 1;
/// Largest sequence value within a single millisecond (4095).
pub const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

const MACHINE_ID_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + MACHINE_ID_BITS;

/// Zero-point for all timestamps embedded in a [`LinkId`]:
/// 2024-01-01T00:00:00Z, expressed as a duration since the unix epoch.
///
/// Changing this value for a deployment that has already issued ids silently
/// breaks ordering against the existing data. It is an operational invariant,
/// not something the code can enforce.
pub const SNAPLINK_EPOCH: Duration = Duration::from_millis(1_704_067_200_000);

/// A 64-bit time-ordered link identifier.
///
/// Packed high-to-low: 41-bit millisecond timestamp delta, 10-bit machine id,
/// 12-bit sequence. Ids compare as their raw `u64`, so later ids from the
/// same allocator always sort after earlier ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(u64);

impl LinkId {
    /// Composes an id from its three fields.
    ///
    /// Fields are masked to their widths; callers are expected to pass values
    /// already in range.
    pub const fn from_parts(timestamp: u64, machine_id: u64, sequence: u64) -> Self {
        Self(
            (timestamp << TIMESTAMP_SHIFT)
                | ((machine_id & MAX_MACHINE_ID) << MACHINE_ID_SHIFT)
                | (sequence & MAX_SEQUENCE),
        )
    }

    /// Reinterprets a raw `u64` (e.g. a decoded short token) as an id.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw `u64` backing this id.
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Milliseconds since [`SNAPLINK_EPOCH`] at which this id was issued.
    pub const fn timestamp(self) -> u64 {
        self.0 >> TIMESTAMP_SHIFT
    }

    /// The allocator instance that issued this id.
    pub const fn machine_id(self) -> u64 {
        (self.0 >> MACHINE_ID_SHIFT) & MAX_MACHINE_ID
    }

    /// Position of this id within its issuing millisecond.
    pub const fn sequence(self) -> u64 {
        self.0 & MAX_SEQUENCE
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<LinkId> for u64 {
    fn from(id: LinkId) -> Self {
        id.to_raw()
    }
}
