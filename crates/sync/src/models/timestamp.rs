use serde::{Deserialize, Serialize};
use std::fmt;
use time::UtcDateTime;

/// Milliseconds since the Unix epoch.
///
/// Clients stamp their edits with `Date.now()`-style integers, so that's what
/// goes over the wire and into the state document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);
impl Timestamp {
    pub const EPOCH: Self = Self(0);

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(self) -> i64 {
        self.0
    }

    pub fn now() -> Self {
        UtcDateTime::now().into()
    }
}
impl From<UtcDateTime> for Timestamp {
    fn from(value: UtcDateTime) -> Self {
        // Saturate rather than wrap; nothing legitimate is 292 million years out.
        let millis = value.unix_timestamp_nanos() / 1_000_000;
        Self(i64::try_from(millis).unwrap_or(if millis < 0 { i64::MIN } else { i64::MAX }))
    }
}
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
