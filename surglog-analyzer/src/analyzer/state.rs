//! Analyzer state carried between events

use super::codes::ARM_UNKNOWN;
use super::pedals::{EnergyTracker, PedalTracker};
use crate::models::{FaultAlarm, LatencySample, StateChange, Surgery, ARM_COUNT};
use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;

/// How long after an attach the type and UDI may still arrive
pub const INSTALL_WINDOW_SECS: i64 = 2;

/// Attach awaiting its type and UDI reports
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInstall {
    pub opened_at: NaiveDateTime,
    pub instrument_type: Option<i32>,
    pub udi: Option<String>,
}

impl PendingInstall {
    pub fn new(opened_at: NaiveDateTime) -> Self {
        Self {
            opened_at,
            instrument_type: None,
            udi: None,
        }
    }

    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        now - self.opened_at > Duration::seconds(INSTALL_WINDOW_SECS)
    }

    /// Type and UDI both known
    pub fn is_complete(&self) -> bool {
        self.instrument_type.is_some_and(|t| t > 0) && self.udi.is_some()
    }
}

/// Per-arm instrument tracking
#[derive(Debug, Clone, PartialEq)]
pub struct ArmTracker {
    pub state: i32,
    pub instrument_type: i32,
    pub udi: Option<String>,
    pub instrument_life: Option<i32>,
    /// A durable `502e` life report was seen for the current attach
    pub life_reported: bool,
    pub pending: Option<PendingInstall>,
}

impl Default for ArmTracker {
    fn default() -> Self {
        Self {
            state: ARM_UNKNOWN,
            instrument_type: 0,
            udi: None,
            instrument_life: None,
            life_reported: false,
            pending: None,
        }
    }
}

/// Installation milestones awaiting a surgery
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Milestones {
    pub isolation_installed: Option<NaiveDateTime>,
    pub instrument_installed: Option<NaiveDateTime>,
}

/// Everything the analyzer remembers between events
#[derive(Debug, Default)]
pub struct AnalyzerState {
    pub is_power_on: bool,
    pub current_state: i32,
    pub err_flag: bool,
    pub arms: [ArmTracker; ARM_COUNT],

    /// Fault history of the current surgery
    pub alarm_history: Vec<FaultAlarm>,
    /// Active alarm per code (index into `alarm_history`)
    pub active_alarms: HashMap<String, usize>,

    pub state_changes: Vec<StateChange>,
    pub latency_samples: Vec<LatencySample>,
    pub is_remote: bool,

    /// Power-on/shutdown times not yet bound to a surgery
    pub power_on_times: Vec<NaiveDateTime>,
    pub shutdown_times: Vec<NaiveDateTime>,

    pub previous_surgery_end_time: Option<NaiveDateTime>,
    pub surgery_started: bool,
    pub current: Option<Surgery>,
    /// Milestones seen while no surgery was open
    pub milestones: Milestones,

    pub pedals: PedalTracker,
    pub energy: EnergyTracker,
}

impl AnalyzerState {
    pub fn new() -> Self {
        Self {
            current_state: -1,
            ..Default::default()
        }
    }

    /// Forget per-arm instrument tracking (power-on)
    pub fn reset_arms(&mut self) {
        self.arms = Default::default();
    }

    /// Forget fault history and active alarms (new surgery)
    pub fn reset_faults(&mut self) {
        self.alarm_history.clear();
        self.active_alarms.clear();
        self.err_flag = false;
    }

    /// Drop install windows older than the window length
    pub fn expire_pending(&mut self, now: NaiveDateTime) {
        for arm in self.arms.iter_mut() {
            if arm.pending.as_ref().is_some_and(|p| p.is_expired(now)) {
                arm.pending = None;
            }
        }
    }

    /// Surgery that is open and not yet ended
    pub fn open_surgery_mut(&mut self) -> Option<&mut Surgery> {
        self.current.as_mut().filter(|s| !s.is_ended())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, s)
            .unwrap()
    }

    #[test]
    fn test_new_state_is_unknown() {
        let state = AnalyzerState::new();
        assert_eq!(state.current_state, -1);
        assert!(!state.is_power_on);
        assert!(state.arms.iter().all(|a| a.state == ARM_UNKNOWN));
    }

    #[test]
    fn test_pending_window_expiry() {
        let mut state = AnalyzerState::new();
        state.arms[1].pending = Some(PendingInstall::new(at(0)));

        state.expire_pending(at(2));
        assert!(state.arms[1].pending.is_some());

        state.expire_pending(at(3));
        assert!(state.arms[1].pending.is_none());
    }

    #[test]
    fn test_pending_completion_needs_positive_type() {
        let mut p = PendingInstall::new(at(0));
        p.udi = Some("IN1A-1001".to_string());
        assert!(!p.is_complete());
        p.instrument_type = Some(0);
        assert!(!p.is_complete());
        p.instrument_type = Some(3);
        assert!(p.is_complete());
    }

    #[test]
    fn test_open_surgery_excludes_ended() {
        let mut state = AnalyzerState::new();
        assert!(state.open_surgery_mut().is_none());

        state.current = Some(Surgery::new("Surgery-01"));
        assert!(state.open_surgery_mut().is_some());

        if let Some(s) = state.current.as_mut() {
            s.end_time = Some(at(5));
        }
        assert!(state.open_surgery_mut().is_none());
    }
}
