//! Power cycle handling and abnormal-shutdown detection
//!
//! A power-on while the controller is believed to be on means the previous
//! power-off was never logged. If the log went quiet before the new power-on
//! (nothing between 30 and 1 minutes earlier) the open surgery is treated as
//! abnormally terminated; otherwise it was a benign reboot.
//!
//! A surgery that started but never ended survives short power cycles. Once
//! the controller stays off for [`POWER_GAP_CLEAR_MINS`] or longer, the
//! surgery is closed at the power-off that interrupted it.

use super::codes::{STATE_CHANGE_SUFFIX, STATE_SHUTDOWN};
use super::SurgeryAnalyzer;
use crate::models::DecodedEvent;
use chrono::{Duration, NaiveDateTime};
use tracing::{debug, info, warn};

/// Look-back bound of the activity check
const ACTIVITY_LOOKBACK_MINS: i64 = 30;
/// Events this close to the power-on do not count as activity
const ACTIVITY_QUIET_MINS: i64 = 1;
/// A `310e` shutdown rescinded within this window is not a power-off
const SHUTDOWN_RESCIND_SECS: i64 = 30;
/// Power-off gap after which an interrupted surgery is not resumed
pub const POWER_GAP_CLEAR_MINS: i64 = 30;

impl SurgeryAnalyzer {
    pub(super) fn handle_power_on(&mut self, events: &[DecodedEvent], idx: usize) {
        let now = events[idx].timestamp;

        if self.state.is_power_on {
            let open = self.state.open_surgery_mut().is_some();
            if open && !has_activity_before(events, idx) {
                let end = last_event_before_lookback(events, idx).unwrap_or(now);
                self.abnormal_shutdown(end);
            } else {
                debug!("Power-on at {} while already on: reboot", now);
            }
        } else {
            self.close_interrupted_surgery(now);
        }

        info!("Power on at {}", now);
        self.state.is_power_on = true;
        self.state.err_flag = false;
        self.state.reset_arms();
        self.state.energy.clear();

        self.state.power_on_times.push(now);
        if let Some(surgery) = self.state.current.as_mut() {
            surgery.power_on_times.push(now);
        }
    }

    /// Power-off codes, except a `310e` shutdown that is rescinded shortly after
    pub(super) fn is_qualifying_power_off(&self, events: &[DecodedEvent], idx: usize) -> bool {
        let event = &events[idx];
        if !event.is_power_off_candidate() {
            return false;
        }
        if !event.has_suffix(STATE_CHANGE_SUFFIX) {
            return true;
        }

        let deadline = event.timestamp + Duration::seconds(SHUTDOWN_RESCIND_SECS);
        let rescinded = events[idx + 1..]
            .iter()
            .take_while(|e| e.timestamp <= deadline)
            .any(|e| {
                e.has_suffix(STATE_CHANGE_SUFFIX)
                    && e.param1 == STATE_SHUTDOWN
                    && e.param2 != STATE_SHUTDOWN
            });
        if rescinded {
            debug!("Shutdown at {} rescinded", event.timestamp);
        }
        !rescinded
    }

    pub(super) fn handle_power_off(&mut self, now: NaiveDateTime) {
        info!("Power off at {}", now);
        self.state.is_power_on = false;
        self.state.err_flag = false;
        self.state.shutdown_times.push(now);
        for arm in self.state.arms.iter_mut() {
            arm.pending = None;
        }
        self.state.energy.clear();

        let Some(surgery) = self.state.current.as_mut() else {
            self.clear_power_history();
            return;
        };

        surgery.shutdown_times.push(now);
        surgery.close_all_sessions(now);

        if surgery.is_ended() {
            self.release_current();
            self.clear_power_history();
        } else if !self.state.surgery_started {
            debug!("Discarding {}: never started", surgery.surgery_id);
            self.state.current = None;
            self.clear_power_history();
        }
    }

    /// Terminate the open surgery at `end` and start from a clean slate
    fn abnormal_shutdown(&mut self, end: NaiveDateTime) {
        if let Some(surgery) = self.state.current.as_mut() {
            warn!(
                "Abnormal shutdown: {} closed at {}",
                surgery.surgery_id, end
            );
            surgery.end_time = Some(end);
            surgery.stage_event_times.surgery_end = Some(end);
            surgery.is_abnormal_shutdown = true;
            surgery.close_all_sessions(end);
        }
        self.release_current();

        self.state.surgery_started = false;
        self.state.current_state = -1;
        self.clear_power_history();
    }

    /// End a started, unended surgery at its last power-off when the
    /// controller stayed off for a long time and instruments were in use
    fn close_interrupted_surgery(&mut self, now: NaiveDateTime) {
        if !self.state.surgery_started {
            return;
        }
        let Some(surgery) = self.state.open_surgery_mut() else {
            return;
        };
        if surgery.is_pre_surgery || surgery.session_count() == 0 {
            return;
        }
        let Some(off) = surgery.shutdown_times.last().copied() else {
            return;
        };
        if now - off < Duration::minutes(POWER_GAP_CLEAR_MINS) {
            return;
        }

        info!(
            "{} interrupted by power-off at {}, not resumed at {}: closing",
            surgery.surgery_id, off, now
        );
        surgery.end_time = Some(off);
        surgery.stage_event_times.surgery_end = Some(off);
        surgery.close_all_sessions(off);
        self.release_current();

        self.state.surgery_started = false;
        self.state.current_state = -1;
        self.clear_power_history();
    }

    /// Forget everything tied to the power cycle that just ended
    fn clear_power_history(&mut self) {
        self.state.power_on_times.clear();
        self.state.shutdown_times.clear();
        self.state.previous_surgery_end_time = None;
        self.state.milestones = Default::default();
        self.state.is_remote = false;
    }
}

/// Any event in `[now - 30min, now - 1min)` before `idx`
fn has_activity_before(events: &[DecodedEvent], idx: usize) -> bool {
    let now = events[idx].timestamp;
    let lookback = now - Duration::minutes(ACTIVITY_LOOKBACK_MINS);
    let quiet = now - Duration::minutes(ACTIVITY_QUIET_MINS);

    events[..idx]
        .iter()
        .rev()
        .filter(|e| e.timestamp < quiet)
        .take_while(|e| e.timestamp >= lookback)
        .next()
        .is_some()
}

/// Latest event older than the look-back bound
fn last_event_before_lookback(events: &[DecodedEvent], idx: usize) -> Option<NaiveDateTime> {
    let lookback = events[idx].timestamp - Duration::minutes(ACTIVITY_LOOKBACK_MINS);
    events[..idx]
        .iter()
        .rev()
        .map(|e| e.timestamp)
        .find(|ts| *ts < lookback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn ev(ts: NaiveDateTime, code: &str, params: [i32; 4]) -> DecodedEvent {
        DecodedEvent::new(ts, code, params)
    }

    #[test]
    fn test_activity_window() {
        let events = vec![
            ev(at(8, 0), "1000520e", [0; 4]),
            ev(at(9, 59), "1000520e", [0; 4]),
            ev(at(10, 0), "a01e", [0; 4]),
        ];
        // Only 08:00 (too old) and 09:59 (too recent)
        assert!(!has_activity_before(&events, 2));
        assert_eq!(last_event_before_lookback(&events, 2), Some(at(8, 0)));

        let busy = vec![
            ev(at(9, 45), "1000520e", [0; 4]),
            ev(at(10, 0), "a01e", [0; 4]),
        ];
        assert!(has_activity_before(&busy, 1));
        assert_eq!(last_event_before_lookback(&busy, 1), None);
    }

    #[test]
    fn test_rescinded_shutdown_is_not_power_off() {
        let analyzer = SurgeryAnalyzer::new();
        let base = at(10, 0);
        let events = vec![
            ev(base, "100310e", [20, 31, 0, 0]),
            ev(base + Duration::seconds(10), "100310e", [31, 10, 0, 0]),
        ];
        assert!(!analyzer.is_qualifying_power_off(&events, 0));

        let late = vec![
            ev(base, "100310e", [20, 31, 0, 0]),
            ev(base + Duration::seconds(45), "100310e", [31, 10, 0, 0]),
        ];
        assert!(analyzer.is_qualifying_power_off(&late, 0));

        let dedicated = vec![ev(base, "a02e", [0; 4])];
        assert!(analyzer.is_qualifying_power_off(&dedicated, 0));
    }
}
