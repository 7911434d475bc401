//! Surgery reconstruction
//!
//! [`SurgeryAnalyzer`] folds a time-ordered event stream into surgery
//! records. Each event is offered to every handler in a fixed order:
//!
//! 1. network (remote link, latency)
//! 2. fault opening
//! 3. power-on
//! 4. power-off
//! 5. controller state transition
//! 6. arm state (attach / detach)
//! 7. instrument type
//! 8. surgery start
//! 9. surgery end
//! 10. UDI
//! 11. instrument life, cumulative usage, over-count revert
//! 12. pedals, clutches, energy
//!
//! Handlers are independent: one event may trigger several of them.
//! Surgeries leave the analyzer when they are released (power-off, a
//! consecutive surgery, abnormal shutdown, or end of input), in discovery
//! order.

pub mod codes;
mod faults;
mod instruments;
mod lifecycle;
mod pedals;
mod power;
pub mod state;
pub mod udi;

pub use pedals::{Edge, EdgeDetector, EnergyEdge, EnergyTracker, PedalTracker};

use crate::models::{DecodedEvent, Surgery};
use codes::{ARM_STATE, INSTRUMENT_TYPE, STATE_CHANGE_SUFFIX};
use state::AnalyzerState;
use std::borrow::Cow;
use tracing::{debug, info};

/// Analyzer output tag carried into projected rows
pub const ANALYZER_VERSION: &str = concat!("surglog-", env!("CARGO_PKG_VERSION"));

/// Stateful event-stream reducer
#[derive(Debug)]
pub struct SurgeryAnalyzer {
    state: AnalyzerState,
    completed: Vec<Surgery>,
}

impl Default for SurgeryAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SurgeryAnalyzer {
    pub fn new() -> Self {
        Self {
            state: AnalyzerState::new(),
            completed: Vec::new(),
        }
    }

    /// Drop all state from a previous stream
    pub fn reset(&mut self) {
        self.state = AnalyzerState::new();
        self.completed.clear();
    }

    /// Reconstruct surgeries from `events`.
    ///
    /// Resets first. Events are stable-sorted by timestamp unless already
    /// ordered. Never fails: events that do not fit the expected sequence are
    /// ignored.
    pub fn analyze(&mut self, events: &[DecodedEvent]) -> Vec<Surgery> {
        self.reset();

        let ordered: Cow<'_, [DecodedEvent]> = if is_time_ordered(events) {
            Cow::Borrowed(events)
        } else {
            debug!("Sorting {} events by timestamp", events.len());
            let mut sorted = events.to_vec();
            sorted.sort_by_key(|e| e.timestamp);
            Cow::Owned(sorted)
        };

        for idx in 0..ordered.len() {
            self.process(&ordered, idx);
        }
        if let Some(last) = ordered.last() {
            self.finish(last.timestamp);
        }

        info!(
            "Analyzed {} events: {} surgeries",
            ordered.len(),
            self.completed.len()
        );
        std::mem::take(&mut self.completed)
    }

    fn process(&mut self, events: &[DecodedEvent], idx: usize) {
        let event = &events[idx];
        self.state.expire_pending(event.timestamp);

        self.handle_network(event);
        self.handle_fault(event);

        if event.is_power_on_candidate() {
            self.handle_power_on(events, idx);
        }
        if self.is_qualifying_power_off(events, idx) {
            self.handle_power_off(event.timestamp);
        }

        if event.has_suffix(STATE_CHANGE_SUFFIX) {
            self.handle_state_change(event);
        }
        if event.has_suffix(ARM_STATE) {
            self.handle_arm_state(event);
        }
        if event.has_suffix(INSTRUMENT_TYPE) {
            self.handle_instrument_type(event);
        }

        self.check_surgery_start(event.timestamp);
        if event.has_suffix(ARM_STATE) {
            self.check_surgery_end(event);
        }

        if udi::is_udi_event(event) {
            self.handle_udi(event);
        }
        self.handle_instrument_life(event);
        self.handle_cumulative_usage(event);
        self.handle_revert(event);

        self.handle_pedal(event);
        self.handle_energy(event);
    }

    /// Id the next created surgery receives
    fn next_surgery_id(&self) -> String {
        format!("Surgery-{:02}", self.completed.len() + 1)
    }
}

fn is_time_ordered(events: &[DecodedEvent]) -> bool {
    events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp)
}

/// Arm addressed by a `500e`/`501e` parameter
fn arm_from_param(value: i32) -> Option<usize> {
    usize::try_from(value)
        .ok()
        .filter(|a| *a < crate::models::ARM_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, m, s)
            .unwrap()
    }

    fn ev(ts: NaiveDateTime, code: &str, params: [i32; 4]) -> DecodedEvent {
        DecodedEvent::new(ts, code, params)
    }

    fn basic_surgery() -> Vec<DecodedEvent> {
        vec![
            ev(at(0, 0), "a01e", [0; 4]),
            ev(at(1, 0), "100310e", [10, 20, 0, 0]),
            ev(at(1, 5), "1000501e", [0, 0, 5, 0]),
            ev(at(1, 10), "1000500e", [0, 0, 4, 0]),
            ev(at(20, 0), "100310e", [20, 10, 0, 0]),
            ev(at(21, 0), "1000500e", [0, 4, 0, 0]),
            ev(at(25, 0), "a02e", [0; 4]),
        ]
    }

    #[test]
    fn test_arm_from_param() {
        assert_eq!(arm_from_param(0), Some(0));
        assert_eq!(arm_from_param(3), Some(3));
        assert_eq!(arm_from_param(4), None);
        assert_eq!(arm_from_param(-1), None);
    }

    #[test]
    fn test_empty_stream() {
        let mut analyzer = SurgeryAnalyzer::new();
        assert!(analyzer.analyze(&[]).is_empty());
    }

    #[test]
    fn test_basic_surgery() {
        let mut analyzer = SurgeryAnalyzer::new();
        let surgeries = analyzer.analyze(&basic_surgery());

        assert_eq!(surgeries.len(), 1);
        let s = &surgeries[0];
        assert_eq!(s.surgery_id, "Surgery-01");
        assert_eq!(s.start_time, Some(at(1, 0)));
        assert_eq!(s.end_time, Some(at(21, 0)));
        assert_eq!(s.arm_usage[0].len(), 1);
        assert_eq!(s.arm_usage[0][0].instrument_type, 5);
        assert_eq!(s.shutdown_times, vec![at(25, 0)]);
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let mut events = basic_surgery();
        events.reverse();
        let mut analyzer = SurgeryAnalyzer::new();
        let surgeries = analyzer.analyze(&events);
        assert_eq!(surgeries.len(), 1);
        assert_eq!(surgeries[0].start_time, Some(at(1, 0)));
    }

    #[test]
    fn test_analyze_resets_between_streams() {
        let mut analyzer = SurgeryAnalyzer::new();
        let first = analyzer.analyze(&basic_surgery());
        let second = analyzer.analyze(&basic_surgery());
        assert_eq!(first, second);
    }
}
