// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

/// An error that occurred while resolving a [`RunTimestamp`](crate::RunTimestamp)
/// into a point in time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimestampParseError {
    input: String,
    reason: TimestampParseReason,
}

impl TimestampParseError {
    pub(crate) fn new(input: impl Into<String>, reason: TimestampParseReason) -> Self {
        Self {
            input: input.into(),
            reason,
        }
    }

    /// Returns the input that failed to resolve.
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for TimestampParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            TimestampParseReason::Rfc3339(error) => {
                write!(f, "timestamp `{}` is not valid RFC 3339: {error}", self.input)
            }
            TimestampParseReason::OutOfRange => {
                write!(f, "epoch milliseconds `{}` are out of range", self.input)
            }
        }
    }
}

impl std::error::Error for TimestampParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.reason {
            TimestampParseReason::Rfc3339(error) => Some(error),
            TimestampParseReason::OutOfRange => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum TimestampParseReason {
    Rfc3339(chrono::ParseError),
    OutOfRange,
}
