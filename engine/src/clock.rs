//! Operation id issuance.
//!
//! Queue order is defined by operation ids, so ids must sort in the order they
//! were issued. Wall clocks stand still within a millisecond and occasionally
//! jump backwards, so the clock pairs the millisecond with a sequence number
//! and never moves behind the last id it issued or observed.

use crate::{error::Result, Error, OperationId, Timestamp};
use std::cmp::Ordering;

/// Width of the zero-padded millisecond component.
const MILLIS_WIDTH: usize = 13;
/// Width of the zero-padded sequence component.
const SEQ_WIDTH: usize = 6;
const MAX_SEQ: u32 = 999_999;

/// A hybrid millisecond/sequence clock that issues monotonically increasing ids.
///
/// Ordering rules:
/// 1. Higher millisecond wins
/// 2. If milliseconds are equal, higher sequence wins
///
/// Ids render as `"{millis:013}-{seq:06}"`, so string order equals issue order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpClock {
    last: Option<Stamp>,
}

/// The (millisecond, sequence) pair behind an operation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub millis: Timestamp,
    pub seq: u32,
}

impl Stamp {
    /// Parse a stamp back out of an operation id.
    pub fn parse(id: &str) -> Result<Self> {
        let invalid = || Error::InvalidOperationId(id.to_string());
        let (millis, seq) = id.split_once('-').ok_or_else(invalid)?;
        if millis.len() != MILLIS_WIDTH || seq.len() != SEQ_WIDTH {
            return Err(invalid());
        }
        Ok(Self {
            millis: millis.parse().map_err(|_| invalid())?,
            seq: seq.parse().map_err(|_| invalid())?,
        })
    }

    /// Render as an operation id.
    pub fn to_id(self) -> OperationId {
        format!(
            "{:0mw$}-{:0sw$}",
            self.millis,
            self.seq,
            mw = MILLIS_WIDTH,
            sw = SEQ_WIDTH
        )
    }
}

impl Ord for Stamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.millis.cmp(&other.millis) {
            Ordering::Equal => self.seq.cmp(&other.seq),
            other => other,
        }
    }
}

impl PartialOrd for Stamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl OpClock {
    /// Create a clock that has issued nothing yet.
    pub fn new() -> Self {
        Self { last: None }
    }

    /// The last stamp issued or observed.
    pub fn last(&self) -> Option<Stamp> {
        self.last
    }

    /// Issue the next id given the current wall-clock time.
    pub fn next_id(&mut self, now: Timestamp) -> OperationId {
        let stamp = match self.last {
            Some(last) if now <= last.millis => {
                if last.seq >= MAX_SEQ {
                    Stamp {
                        millis: last.millis + 1,
                        seq: 0,
                    }
                } else {
                    Stamp {
                        millis: last.millis,
                        seq: last.seq + 1,
                    }
                }
            }
            _ => Stamp {
                millis: now,
                seq: 0,
            },
        };
        self.last = Some(stamp);
        stamp.to_id()
    }

    /// Advance the clock past an id issued elsewhere (e.g. loaded from storage).
    ///
    /// Ids that do not parse are ignored and reported as an error.
    pub fn observe(&mut self, id: &str) -> Result<()> {
        let stamp = Stamp::parse(id)?;
        if self.last.map_or(true, |last| stamp > last) {
            self.last = Some(stamp);
        }
        Ok(())
    }
}
