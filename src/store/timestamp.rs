//! Store-native timestamp type
//!
//! Documents carry time as seconds plus nanoseconds since the Unix epoch.
//! On the REST wire the value is an RFC 3339 string; the application layer
//! works with `chrono::DateTime<Utc>` and converts at the mapping boundary.

use crate::error::EatsError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Store timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    /// Seconds since Unix epoch
    pub seconds: i64,

    /// Nanoseconds component (0-999,999,999)
    pub nanoseconds: i32,
}

impl Timestamp {
    /// Create a new timestamp
    pub fn new(seconds: i64, nanoseconds: i32) -> Result<Self, EatsError> {
        if !(0..1_000_000_000).contains(&nanoseconds) {
            return Err(EatsError::InvalidArgument(format!(
                "nanoseconds must be in range [0, 999999999], got {}",
                nanoseconds
            )));
        }

        Ok(Self {
            seconds,
            nanoseconds,
        })
    }

    /// Get current timestamp
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Convert from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            seconds: dt.timestamp(),
            nanoseconds: dt.timestamp_subsec_nanos() as i32,
        }
    }

    /// Convert to DateTime
    ///
    /// Returns `None` when the seconds value is outside chrono's range.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds, self.nanoseconds as u32)
    }

    /// Parse an RFC 3339 string such as `2024-05-01T12:00:00.123456Z`
    pub fn parse_rfc3339(s: &str) -> Result<Self, EatsError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| EatsError::InvalidArgument(format!("invalid timestamp {:?}: {}", s, e)))?;
        Ok(Self::from_datetime(dt.with_timezone(&Utc)))
    }

    /// Format as RFC 3339 with nanosecond precision
    pub fn to_rfc3339(&self) -> Option<String> {
        self.to_datetime()
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let Some(text) = self.to_rfc3339() else {
            return Err(serde::ser::Error::custom("timestamp out of range"));
        };
        serializer.serialize_str(&text)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse_rfc3339(&text).map_err(serde::de::Error::custom)
    }
}
