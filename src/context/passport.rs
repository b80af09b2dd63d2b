//! Per-request event trace.
//!
//! The passport is append-only. Offsets are taken from a monotonic clock, so
//! events are always recorded in non-decreasing time order.

use std::time::{Duration, Instant};

use serde::Serialize;

/// A point in the life of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PassportState {
    InRequestReceived,
    InRequestBodyReceived,
    FiltersInboundStart,
    FiltersInboundEnd,
    EndpointStart,
    EndpointEnd,
    ErrorDivertStart,
    ErrorDivertEnd,
    FiltersOutboundStart,
    FiltersOutboundEnd,
    OriginConcurrencyRejected,
    OriginConnAcquireStart,
    OriginConnAcquireEnd,
    OriginConnAcquireFailed,
    OriginRequestSent,
    OriginResponseReceived,
    OriginRetryStart,
    ChainComplete,
    ClientCancelled,
    RequestTimeout,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PassportEvent {
    pub state: PassportState,
    /// Offset from the passport's creation.
    #[serde(rename = "offset_us", serialize_with = "serialize_micros")]
    pub offset: Duration,
}

fn serialize_micros<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_micros() as u64)
}

#[derive(Debug, Clone)]
pub struct Passport {
    start: Instant,
    events: Vec<PassportEvent>,
}

impl Passport {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            events: Vec::with_capacity(16),
        }
    }

    pub fn add(&mut self, state: PassportState) {
        let offset = self.start.elapsed();
        tracing::trace!(state = ?state, offset_us = offset.as_micros() as u64, "Passport");
        self.events.push(PassportEvent { state, offset });
    }

    pub fn events(&self) -> &[PassportEvent] {
        &self.events
    }

    pub fn contains(&self, state: PassportState) -> bool {
        self.events.iter().any(|e| e.state == state)
    }

    pub fn count(&self, state: PassportState) -> usize {
        self.events.iter().filter(|e| e.state == state).count()
    }

    /// First occurrence of `state`.
    pub fn find(&self, state: PassportState) -> Option<&PassportEvent> {
        self.events.iter().find(|e| e.state == state)
    }

    /// Time between the first `from` and the first `to` that follows it.
    pub fn duration_between(&self, from: PassportState, to: PassportState) -> Option<Duration> {
        let start = self.find(from)?;
        self.events
            .iter()
            .find(|e| e.state == to && e.offset >= start.offset)
            .map(|end| end.offset - start.offset)
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Passport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Passport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, event) in self.events.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{:?}@{}us", event.state, event.offset.as_micros())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_monotonic() {
        let mut passport = Passport::new();
        passport.add(PassportState::InRequestReceived);
        passport.add(PassportState::FiltersInboundStart);
        passport.add(PassportState::FiltersInboundEnd);
        let offsets: Vec<_> = passport.events().iter().map(|e| e.offset).collect();
        assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
        assert!(passport
            .duration_between(PassportState::InRequestReceived, PassportState::FiltersInboundEnd)
            .is_some());
        assert!(passport.to_string().starts_with("InRequestReceived@"));
    }

    #[test]
    fn test_count() {
        let mut passport = Passport::new();
        passport.add(PassportState::OriginRetryStart);
        passport.add(PassportState::OriginRetryStart);
        assert_eq!(passport.count(PassportState::OriginRetryStart), 2);
        assert!(!passport.contains(PassportState::ChainComplete));
    }
}
