//! Sharding strategies
//!
//! A strategy maps a time-ordered key to the integer shard id baked into
//! wide-table partition keys, and maps a time window to the contiguous range
//! of shard ids it spans. Shard ids must never change for a stored key, so
//! every calculation here is a pure function of the key's embedded time.
//!
//! Calendar buckets are counted in UTC from the year 2000:
//!
//! | Width   | Shard id                              |
//! |---------|---------------------------------------|
//! | hourly  | `((year-2000)*366 + ordinal)*24 + hour` |
//! | daily   | `(year-2000)*366 + ordinal`           |
//! | weekly  | `(iso_year-2000)*53 + iso_week`       |
//! | monthly | `(year-2000)*12 + month`              |
//! | yearly  | `year-2000`                           |
//! | millis  | `floor(epoch_ms / width)`             |
//!
//! Daily and hourly ids skip the unused 366th day of common years; range
//! resolution still yields every integer between the endpoints.

use crate::criteria::SortOrder;
use crate::error::{Error, Result};
use crate::time::{TimeId, Timestamp};
use crate::value::Value;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Shard id used by the `None` strategy
pub const NONE_SHARD_ID: i64 = 1;

const BASE_YEAR: i64 = 2000;

/// Width of a time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketWidth {
    /// One shard per UTC hour
    Hourly,
    /// One shard per UTC day
    Daily,
    /// One shard per ISO week
    Weekly,
    /// One shard per calendar month
    Monthly,
    /// One shard per calendar year
    Yearly,
    /// Fixed-width buckets of this many milliseconds
    Millis(u64),
}

/// Per-index sharding strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShardingStrategy {
    /// Single logical shard with a constant id
    #[default]
    None,
    /// Shard by the time embedded in the key
    TimeBucketed {
        /// Bucket width
        width: BucketWidth,
    },
}

impl ShardingStrategy {
    /// Monthly buckets, the common choice for event-like objects
    pub const fn monthly() -> Self {
        ShardingStrategy::TimeBucketed {
            width: BucketWidth::Monthly,
        }
    }

    /// Whether shard ids depend on time
    pub fn is_time_bucketed(&self) -> bool {
        matches!(self, ShardingStrategy::TimeBucketed { .. })
    }

    /// Shard id for a primary key.
    ///
    /// Time-bucketed strategies accept time-ordered ids and timestamps only.
    pub fn shard_key_for(&self, key: &Value) -> Result<i64> {
        match self {
            ShardingStrategy::None => Ok(NONE_SHARD_ID),
            ShardingStrategy::TimeBucketed { .. } => match key {
                Value::Uuid(uuid) => {
                    let id = TimeId::from_uuid(*uuid).ok_or_else(|| Error::InvalidShardKey {
                        reason: format!("{} is not a time-ordered id", uuid),
                    })?;
                    self.shard_for_time(id.timestamp())
                }
                Value::Timestamp(ts) => self.shard_for_time(*ts),
                other => Err(Error::InvalidShardKey {
                    reason: format!("{} key carries no time", other.type_name()),
                }),
            },
        }
    }

    /// Shard id for a point in time
    pub fn shard_for_time(&self, at: Timestamp) -> Result<i64> {
        let width = match self {
            ShardingStrategy::None => return Ok(NONE_SHARD_ID),
            ShardingStrategy::TimeBucketed { width } => *width,
        };
        let millis = at.as_millis() as i64;
        if let BucketWidth::Millis(w) = width {
            return Ok(millis / w.max(1) as i64);
        }
        let dt: DateTime<Utc> = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| Error::InvalidShardKey {
                reason: format!("timestamp {} out of range", millis),
            })?;
        let years = dt.year() as i64 - BASE_YEAR;
        let shard = match width {
            BucketWidth::Hourly => (years * 366 + dt.ordinal() as i64) * 24 + dt.hour() as i64,
            BucketWidth::Daily => years * 366 + dt.ordinal() as i64,
            BucketWidth::Weekly => {
                let week = dt.iso_week();
                (week.year() as i64 - BASE_YEAR) * 53 + week.week() as i64
            }
            BucketWidth::Monthly => years * 12 + dt.month() as i64,
            BucketWidth::Yearly => years,
            BucketWidth::Millis(w) => millis / w.max(1) as i64,
        };
        Ok(shard)
    }

    /// Shard ids spanned by `[start, end]`
    pub fn shard_range(&self, start: Timestamp, end: Timestamp) -> Result<ShardRange> {
        if start > end {
            return Err(Error::InvalidShardRange {
                start_millis: start.as_millis() as i64,
                end_millis: end.as_millis() as i64,
            });
        }
        Ok(ShardRange::new(
            self.shard_for_time(start)?,
            self.shard_for_time(end)?,
        ))
    }
}

/// Inclusive, contiguous range of shard ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRange {
    /// Lowest shard id
    pub first: i64,
    /// Highest shard id
    pub last: i64,
}

impl ShardRange {
    /// Range `first..=last`; endpoints are swapped if given reversed
    pub fn new(first: i64, last: i64) -> Self {
        ShardRange {
            first: first.min(last),
            last: first.max(last),
        }
    }

    /// Single shard
    pub fn single(id: i64) -> Self {
        ShardRange { first: id, last: id }
    }

    /// Number of shards
    pub fn len(&self) -> usize {
        (self.last - self.first + 1) as usize
    }

    /// Never true; a range holds at least one shard
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `id` falls in the range
    pub fn contains(&self, id: i64) -> bool {
        self.first <= id && id <= self.last
    }

    /// Shard id at `position` in traversal order
    pub fn nth(&self, position: usize, order: SortOrder) -> Option<i64> {
        if position >= self.len() {
            return None;
        }
        Some(match order {
            SortOrder::Ascending => self.first + position as i64,
            SortOrder::Descending => self.last - position as i64,
        })
    }

    /// All ids in traversal order: lowest first when ascending
    pub fn ids(&self, order: SortOrder) -> Vec<i64> {
        (0..self.len()).filter_map(|p| self.nth(p, order)).collect()
    }
}
