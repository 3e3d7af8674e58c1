// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{TimestampParseError, TimestampParseReason};
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, num::ParseIntError, str::FromStr};

/// The aggregate, run-level summary of one test execution.
///
/// The counters are not required to be consistent with each other: producers
/// are known to emit `total_tests < passed + failed + skipped` (for example
/// when retries are counted separately), and consumers must tolerate that.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// An opaque identifier for the run.
    ///
    /// Empty when the producer did not supply one.
    #[serde(default)]
    pub id: String,

    /// The point in time the run started.
    ///
    /// This is the sole ordering and retention key for history. It is optional
    /// here because producers may omit it; archiving a run without a resolvable
    /// timestamp is an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<RunTimestamp>,

    /// The number of tests in the run.
    pub total_tests: u64,

    /// The number of tests that passed.
    pub passed: u64,

    /// The number of tests that failed.
    pub failed: u64,

    /// The number of tests that were skipped.
    pub skipped: u64,

    /// Total elapsed time, in milliseconds.
    #[serde(default, deserialize_with = "deserialize_millis")]
    pub duration: u64,

    /// Environment metadata (host, OS and so on), carried through unmodified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<serde_json::Value>,
}

impl RunRecord {
    /// Resolves this run's timestamp, if present.
    pub fn resolve_timestamp(&self) -> Option<Result<DateTime<FixedOffset>, TimestampParseError>> {
        self.timestamp.as_ref().map(RunTimestamp::resolve)
    }
}

/// A run timestamp as written by a producer.
///
/// Producers write either epoch milliseconds or RFC 3339 text. The raw form is
/// kept so that round-tripping an artifact does not rewrite it; use
/// [`Self::resolve`] to get a point in time.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RunTimestamp {
    /// Milliseconds since the Unix epoch.
    EpochMillis(i64),

    /// Text, expected to be RFC 3339.
    Text(String),
}

impl RunTimestamp {
    /// Creates a canonical text timestamp from a point in time.
    pub fn from_datetime<Tz: chrono::TimeZone>(datetime: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self::Text(datetime.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Resolves this timestamp into a point in time.
    pub fn resolve(&self) -> Result<DateTime<FixedOffset>, TimestampParseError> {
        match self {
            Self::EpochMillis(millis) => DateTime::<Utc>::from_timestamp_millis(*millis)
                .map(|datetime| datetime.fixed_offset())
                .ok_or_else(|| {
                    TimestampParseError::new(millis.to_string(), TimestampParseReason::OutOfRange)
                }),
            Self::Text(text) => DateTime::parse_from_rfc3339(text.trim()).map_err(|error| {
                TimestampParseError::new(text.as_str(), TimestampParseReason::Rfc3339(error))
            }),
        }
    }
}

impl fmt::Display for RunTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EpochMillis(millis) => write!(f, "{millis}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// The key identifying one run in history.
///
/// This is the run's start time truncated to whole seconds since the Unix
/// epoch. It is both the sort key and the external name of a history entry
/// (file name or sheet name). Two runs started within the same second share
/// a key, and the later one replaces the earlier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RunKey(i64);

impl RunKey {
    /// Creates a new `RunKey` from a number of seconds since the epoch.
    pub const fn new(secs: i64) -> Self {
        Self(secs)
    }

    /// Derives the key for a point in time.
    pub fn from_datetime<Tz: chrono::TimeZone>(datetime: &DateTime<Tz>) -> Self {
        Self(datetime.timestamp())
    }

    /// Returns the number of seconds since the epoch.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunKey {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Deserializes a non-negative millisecond count.
///
/// Producers written in dynamically typed languages emit fractional and, on
/// clock adjustments, negative durations. Both are normalized rather than
/// rejected.
pub(crate) fn deserialize_millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Unsigned(u64),
        Signed(i64),
        Float(f64),
    }

    Ok(match Millis::deserialize(deserializer)? {
        Millis::Unsigned(millis) => millis,
        Millis::Signed(_) => 0,
        Millis::Float(millis) if millis.is_finite() && millis > 0.0 => millis.round() as u64,
        Millis::Float(_) => 0,
    })
}
