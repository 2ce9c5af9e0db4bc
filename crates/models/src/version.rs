//! Revision timestamps and the version identifiers derived from them.

use chrono::{DateTime, TimeZone, Utc};
use failure::Fail;
use newsdesk_error::ApiError;
use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicI64, Ordering},
};

const NANOS_PER_SEC: i64 = 1_000_000_000;

static CLOCK: Clock = Clock::new();

/// Wall clock which never returns the same instant twice.
///
/// Version identifiers are derived from revision instants, so two revisions
/// made within one process must never share a nanosecond.
#[derive(Debug)]
pub struct Clock {
    last: AtomicI64,
}

impl Clock {
    pub const fn new() -> Clock {
        Clock { last: AtomicI64::new(std::i64::MIN) }
    }

    /// Current time, strictly later than any instant previously returned by
    /// this clock.
    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_nanos();
        let mut last = self.last.load(Ordering::SeqCst);

        loop {
            let next = wall.max(last.saturating_add(1));

            match self.last.compare_exchange(
                last, next, Ordering::SeqCst, Ordering::SeqCst,
            ) {
                Ok(_) => return from_nanos(next),
                Err(current) => last = current,
            }
        }
    }
}

/// Current revision instant, taken from the process-wide [`Clock`].
pub fn now() -> DateTime<Utc> {
    CLOCK.now()
}

/// Convert nanoseconds since the Unix epoch into an instant.
pub fn from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp(
        nanos.div_euclid(NANOS_PER_SEC),
        nanos.rem_euclid(NANOS_PER_SEC) as u32,
    )
}

/// Identifier of an immutable article version: `guid:nanos`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct VersionId {
    pub guid: String,
    pub version: i64,
}

impl VersionId {
    /// Identifier of the version created from a draft last revised at
    /// `revised_at`.
    pub fn for_revision(guid: &str, revised_at: &DateTime<Utc>) -> VersionId {
        VersionId {
            guid: guid.to_string(),
            version: revised_at.timestamp_nanos(),
        }
    }

    /// Instant this version was revised at.
    pub fn revised_at(&self) -> DateTime<Utc> {
        from_nanos(self.version)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.guid, self.version)
    }
}

impl FromStr for VersionId {
    type Err = ParseVersionIdError;

    fn from_str(v: &str) -> Result<VersionId, ParseVersionIdError> {
        let inx = v.rfind(':')
            .ok_or_else(|| ParseVersionIdError(v.to_string()))?;
        let (guid, version) = (&v[..inx], &v[inx + 1..]);

        if guid.is_empty() {
            return Err(ParseVersionIdError(v.to_string()));
        }

        let version = version.parse::<i64>()
            .ok()
            .filter(|version| *version > 0)
            .ok_or_else(|| ParseVersionIdError(v.to_string()))?;

        Ok(VersionId {
            guid: guid.to_string(),
            version,
        })
    }
}

#[derive(ApiError, Debug, Fail)]
#[api(code = "article:version:bad-id", status = "BAD_REQUEST")]
#[fail(display = "malformed article version id {:?}", _0)]
pub struct ParseVersionIdError(pub String);
