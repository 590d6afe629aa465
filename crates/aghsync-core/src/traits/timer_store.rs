// # Timer Store Trait
//
// Durable record of a single pending "re-enable at time T" deadline.
//
// The record is one small text value: `0` for "no pending timer", or an
// absolute epoch-millisecond deadline. It is written whenever a timer is
// armed or disarmed and read once at startup.

use async_trait::async_trait;
use std::time::Duration;

/// Encoded value for "no pending timer"
pub const IDLE_RECORD: &str = "0";

/// Decoded timer record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRecord {
    /// No pending timer
    Idle,
    /// Re-enable protection at this epoch-millisecond deadline
    Pending {
        /// Absolute deadline in milliseconds since the Unix epoch
        deadline_ms: i64,
    },
}

impl TimerRecord {
    /// Record for a deadline `delay` after `now_ms`
    pub fn after(now_ms: i64, delay: Duration) -> Self {
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        Self::Pending {
            deadline_ms: now_ms.saturating_add(delay_ms),
        }
    }

    /// Parse a stored value
    ///
    /// Returns `None` for anything that is not an integer. Zero and negative
    /// values decode as [`TimerRecord::Idle`].
    pub fn parse(raw: &str) -> Option<Self> {
        let value: i64 = raw.trim().parse().ok()?;
        if value <= 0 {
            Some(Self::Idle)
        } else {
            Some(Self::Pending { deadline_ms: value })
        }
    }

    /// Encode for storage
    pub fn encode(&self) -> String {
        match self {
            Self::Idle => IDLE_RECORD.to_string(),
            Self::Pending { deadline_ms } => deadline_ms.to_string(),
        }
    }

    /// Time left until the deadline, clamped to `[0, max]`
    ///
    /// `None` for [`TimerRecord::Idle`].
    pub fn remaining(&self, now_ms: i64, max: Duration) -> Option<Duration> {
        match self {
            Self::Idle => None,
            Self::Pending { deadline_ms } => {
                let left_ms = deadline_ms.saturating_sub(now_ms).max(0) as u64;
                Some(Duration::from_millis(left_ms).min(max))
            }
        }
    }
}

/// Trait for timer record persistence
///
/// Storage errors are returned to the caller. The scheduler logs and ignores
/// them since a lost record only weakens crash recovery.
#[async_trait]
pub trait TimerStore: Send + Sync {
    /// Ensure the record exists, initializing it to `0` if absent
    async fn check_or_init(&self) -> Result<(), crate::Error>;

    /// Read the raw stored value
    async fn read(&self) -> Result<String, crate::Error>;

    /// Replace the stored value
    async fn write(&self, value: &str) -> Result<(), crate::Error>;

    /// Read and decode the record
    ///
    /// `Ok(None)` means the stored value is corrupt.
    async fn load(&self) -> Result<Option<TimerRecord>, crate::Error> {
        let raw = self.read().await?;
        Ok(TimerRecord::parse(&raw))
    }

    /// Encode and write the record
    async fn save(&self, record: TimerRecord) -> Result<(), crate::Error> {
        self.write(&record.encode()).await
    }
}
