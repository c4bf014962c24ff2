//! Time handling
//!
//! Two types live here:
//! - [`Timestamp`]: microseconds since Unix epoch, the canonical point-in-time
//!   representation (field values, write timestamps, shard resolution).
//! - [`TimeId`]: a time-ordered unique identifier (UUID version 7). Object
//!   primary keys default to it, reconciliation-log entries are keyed by it,
//!   and time-bucketed sharding reads the millisecond timestamp embedded in it.
//!
//! A version 7 UUID stores the Unix millisecond timestamp in its top 48 bits,
//! so byte order equals time order. [`TimeId::start_of`] and [`TimeId::end_of`]
//! build the smallest and largest ids for a given millisecond; they bound
//! clustering-column range predicates on wide tables.
//!
//! ```
//! use stratamap_core::{TimeId, Timestamp};
//!
//! let at = Timestamp::from_millis(1_365_000_000_000);
//! let id = TimeId::at(at);
//! assert_eq!(id.millis(), 1_365_000_000_000);
//! assert!(TimeId::start_of(at) <= id && id <= TimeId::end_of(at));
//! ```

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Microsecond-precision timestamp
///
/// Represents a point in time as microseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Unix epoch (1970-01-01 00:00:00 UTC)
    pub const EPOCH: Timestamp = Timestamp(0);

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a timestamp for the current moment
    ///
    /// Returns epoch if the system clock is before Unix epoch.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as u64)
    }

    /// Create a timestamp from microseconds since epoch
    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// Create a timestamp from milliseconds since epoch
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis.saturating_mul(1_000))
    }

    /// Create a timestamp from seconds since epoch
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get microseconds since Unix epoch
    #[inline]
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Get milliseconds since Unix epoch (truncates)
    #[inline]
    pub const fn as_millis(&self) -> u64 {
        self.0 / 1_000
    }

    /// Get seconds since Unix epoch (truncates)
    #[inline]
    pub const fn as_secs(&self) -> u64 {
        self.0 / 1_000_000
    }

    // =========================================================================
    // Duration Operations
    // =========================================================================

    /// Add a duration, saturating on overflow
    pub fn saturating_add(&self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.as_micros() as u64))
    }

    /// Subtract a duration, saturating at epoch
    pub fn saturating_sub(&self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_sub(duration.as_micros() as u64))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::EPOCH
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self.0 / 1_000_000;
        let micros = self.0 % 1_000_000;
        write!(f, "{}.{:06}", secs, micros)
    }
}

impl From<Duration> for Timestamp {
    /// Create from duration since epoch
    fn from(duration: Duration) -> Self {
        Timestamp::from_micros(duration.as_micros() as u64)
    }
}

// ============================================================================
// TimeId
// ============================================================================

const VERSION_BITS: u128 = 0x7 << 76;
const VARIANT_BITS: u128 = 0b10 << 62;
const RAND_A_MASK: u128 = 0xFFF << 64;
const RAND_B_MASK: u128 = (1 << 62) - 1;

/// Time-ordered unique identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeId(Uuid);

impl TimeId {
    /// New id for the current moment
    pub fn now() -> Self {
        TimeId(Uuid::now_v7())
    }

    /// New id whose embedded time is `at` (millisecond precision)
    pub fn at(at: Timestamp) -> Self {
        let micros = at.as_micros();
        let ts = uuid::Timestamp::from_unix(
            uuid::NoContext,
            micros / 1_000_000,
            ((micros % 1_000_000) as u32) * 1_000,
        );
        TimeId(Uuid::new_v7(ts))
    }

    /// Smallest id carrying the millisecond of `at`
    pub fn start_of(at: Timestamp) -> Self {
        let millis = (at.as_millis() as u128) & 0xFFFF_FFFF_FFFF;
        TimeId(Uuid::from_u128((millis << 80) | VERSION_BITS | VARIANT_BITS))
    }

    /// Largest id carrying the millisecond of `at`
    pub fn end_of(at: Timestamp) -> Self {
        let millis = (at.as_millis() as u128) & 0xFFFF_FFFF_FFFF;
        TimeId(Uuid::from_u128(
            (millis << 80) | VERSION_BITS | RAND_A_MASK | VARIANT_BITS | RAND_B_MASK,
        ))
    }

    /// Wrap a UUID if it is time-ordered (version 7)
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        if uuid.get_version_num() == 7 {
            Some(TimeId(uuid))
        } else {
            None
        }
    }

    /// Embedded Unix milliseconds
    pub fn millis(&self) -> u64 {
        (self.0.as_u128() >> 80) as u64
    }

    /// Embedded time
    pub fn timestamp(&self) -> Timestamp {
        Timestamp::from_millis(self.millis())
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for TimeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<TimeId> for Uuid {
    fn from(id: TimeId) -> Self {
        id.0
    }
}
