//! Server timestamp handling.
//!
//! The trading API emits ISO-8601 timestamps without an offset, which are
//! UTC. RFC 3339 values carrying an explicit offset are accepted too.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Parse a server timestamp (naive UTC or RFC 3339).
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    trimmed
        .parse::<NaiveDateTime>()
        .ok()
        .map(|naive| naive.and_utc())
}

fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Serde adapter for required timestamps.
pub mod utc {
    use super::{DateTime, Deserialize, Deserializer, Serializer, Utc};

    /// Serialize as RFC 3339.
    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(value))
    }

    /// Deserialize from naive UTC or RFC 3339.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

/// Serde adapter for optional timestamps.
pub mod utc_option {
    use super::{DateTime, Deserialize, Deserializer, Serializer, Utc};

    /// Serialize as RFC 3339 or null.
    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&super::format_timestamp(dt)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize from naive UTC, RFC 3339 or null.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|value| {
            super::parse_timestamp(&value)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {value}")))
        })
        .transpose()
    }
}
