//! Instrument attach/detach, identification and life tracking
//!
//! An attach opens a usage session immediately; the instrument's type and
//! UDI usually follow within two seconds and are back-filled onto that
//! session when both have arrived.

use super::codes::{
    energy_type_for, PedalKind, ARM_INSTRUMENT_ATTACHED, ARM_INSTRUMENT_READY,
    ARM_INSTRUMENT_REMOVED, ARM_ISOLATION_INSTALLED, CUMULATIVE_USAGE, INSTRUMENT_LIFE,
    REVERT_OVERCOUNT,
};
use super::pedals::{bump, EnergyEdge};
use super::state::PendingInstall;
use super::udi::{build_udi, udi_arm};
use super::{arm_from_param, SurgeryAnalyzer};
use crate::explain::mappings::instrument_display_name;
use crate::models::{
    CumulativeUsage, DecodedEvent, EnergyActivationEvent, InstrumentUsageSession,
};
use chrono::NaiveDateTime;
use tracing::{debug, info};

/// Arm states in which a life report refers to a seated instrument
const LIFE_REPORT_STATES: std::ops::RangeInclusive<i32> = 3..=6;

impl SurgeryAnalyzer {
    /// `500e`: `p1` = arm, `p2` = previous state, `p3` = new state
    pub(super) fn handle_arm_state(&mut self, event: &DecodedEvent) {
        let Some(arm) = arm_from_param(event.param1) else {
            return;
        };
        let (previous, new) = (event.param2, event.param3);
        let now = event.timestamp;
        self.state.arms[arm].state = new;

        if new == ARM_ISOLATION_INSTALLED {
            self.record_milestone(now, true);
        } else if new == ARM_INSTRUMENT_READY {
            self.record_milestone(now, false);
        }

        if previous != ARM_INSTRUMENT_ATTACHED && new == ARM_INSTRUMENT_ATTACHED {
            self.attach(arm, now);
        } else if previous != ARM_INSTRUMENT_REMOVED && new == ARM_INSTRUMENT_REMOVED {
            self.detach(arm, now);
        }
    }

    /// First isolation / instrument milestone, onto the open surgery if any
    fn record_milestone(&mut self, now: NaiveDateTime, isolation: bool) {
        let state = &mut self.state;
        let slot = match state.current.as_mut().filter(|s| !s.is_ended()) {
            Some(surgery) if isolation => &mut surgery.stage_event_times.isolation_installed,
            Some(surgery) => &mut surgery.stage_event_times.instrument_installed,
            None if isolation => &mut state.milestones.isolation_installed,
            None => &mut state.milestones.instrument_installed,
        };
        if slot.is_none() {
            *slot = Some(now);
        }
    }

    fn attach(&mut self, arm: usize, now: NaiveDateTime) {
        self.ensure_surgery(now);

        let state = &mut self.state;
        let Some(surgery) = state.current.as_mut() else {
            return;
        };
        let tracker = &mut state.arms[arm];

        if let Some(previous) = surgery.open_session_mut(arm) {
            debug!("Arm {} re-attached, closing previous session", arm + 1);
            previous.force_close(now);
        }

        let instrument_type = tracker.instrument_type;
        let instrument_name = if instrument_type > 0 {
            instrument_display_name(instrument_type)
        } else {
            String::new()
        };
        info!(
            "Arm {} instrument attached at {} ({})",
            arm + 1,
            now,
            if instrument_name.is_empty() { "type pending" } else { instrument_name.as_str() }
        );

        let is_pre_surgery = surgery.is_pre_surgery;
        surgery.arm_usage[arm].push(InstrumentUsageSession {
            arm_index: arm,
            instrument_type,
            instrument_name,
            udi: None,
            instrument_life: None,
            cumulative_usage: None,
            start_time: now,
            end_time: None,
            duration_seconds: None,
            energy_activations: Vec::new(),
            is_pre_surgery,
        });

        let span = &mut surgery.arm_total_activation[arm];
        if span.start_time.is_none() {
            span.start_time = Some(now);
        }
        span.end_time = None;

        tracker.udi = None;
        tracker.instrument_life = None;
        tracker.life_reported = false;
        tracker.pending = Some(PendingInstall::new(now));
    }

    fn detach(&mut self, arm: usize, now: NaiveDateTime) {
        let tracker = &mut self.state.arms[arm];
        tracker.pending = None;
        // The next attach reports its own type
        tracker.instrument_type = 0;

        let Some(surgery) = self.state.current.as_mut() else {
            return;
        };
        let Some(session) = surgery.open_session_mut(arm) else {
            return;
        };
        session.close(now);
        info!(
            "Arm {} instrument removed at {} after {}s",
            arm + 1,
            now,
            session.duration_seconds.unwrap_or(0)
        );
        surgery.arm_total_activation[arm].end_time = Some(now);
    }

    /// `501e`: `p1` = arm, `p3` = instrument type
    pub(super) fn handle_instrument_type(&mut self, event: &DecodedEvent) {
        let Some(arm) = arm_from_param(event.param1) else {
            return;
        };
        let instrument_type = event.param3;
        self.state.arms[arm].instrument_type = instrument_type;

        if instrument_type > 0 {
            if let Some(session) = self
                .state
                .current
                .as_mut()
                .and_then(|s| s.open_session_mut(arm))
            {
                session.instrument_type = instrument_type;
                session.instrument_name = instrument_display_name(instrument_type);
            }
            if let Some(pending) = self.state.arms[arm].pending.as_mut() {
                pending.instrument_type = Some(instrument_type);
            }
        }
        self.complete_install(arm);
    }

    /// `510e` / `581e` / `584e`
    pub(super) fn handle_udi(&mut self, event: &DecodedEvent) {
        let Some(arm) = udi_arm(event) else {
            debug!("UDI report {} without arm", event.error_code);
            return;
        };
        let udi = build_udi(event.params(), self.state.arms[arm].instrument_type);
        debug!("Arm {} UDI {}", arm + 1, udi);

        if let Some(session) = self
            .state
            .current
            .as_mut()
            .and_then(|s| s.open_session_mut(arm))
        {
            if session.udi.is_none() {
                session.udi = Some(udi.clone());
            }
        }

        let tracker = &mut self.state.arms[arm];
        if let Some(pending) = tracker.pending.as_mut() {
            pending.udi = Some(udi.clone());
        }
        tracker.udi = Some(udi);
        self.complete_install(arm);
    }

    /// Back-fill the open session once the install window has type and UDI
    fn complete_install(&mut self, arm: usize) {
        let state = &mut self.state;
        let tracker = &mut state.arms[arm];
        if !tracker.pending.as_ref().is_some_and(PendingInstall::is_complete) {
            return;
        }
        let Some(pending) = tracker.pending.take() else {
            return;
        };
        let Some(session) = state.current.as_mut().and_then(|s| s.open_session_mut(arm)) else {
            return;
        };

        if let Some(instrument_type) = pending.instrument_type {
            session.instrument_type = instrument_type;
            session.instrument_name = instrument_display_name(instrument_type);
        }
        session.udi = pending.udi;
        if tracker.instrument_life.is_some() {
            session.instrument_life = tracker.instrument_life;
        }
        debug!(
            "Arm {} install complete: {} {:?}",
            arm + 1,
            session.instrument_name,
            session.udi
        );
    }

    /// `502e`: `p1` = previous life, `p2` = current life
    pub(super) fn handle_instrument_life(&mut self, event: &DecodedEvent) {
        if !event.has_suffix(INSTRUMENT_LIFE) {
            return;
        }
        let Some(arm) = event.code_arm_index() else {
            return;
        };
        let state = &mut self.state;
        let tracker = &mut state.arms[arm];
        if !LIFE_REPORT_STATES.contains(&tracker.state) {
            return;
        }

        let (previous, current) = (event.param1, event.param2);
        tracker.instrument_life = Some(current);

        // A decrement by one is a consumed use; anything else is a status read
        if previous > 0 && current == previous - 1 {
            tracker.life_reported = true;
            if let Some(session) = state.current.as_mut().and_then(|s| s.open_session_mut(arm)) {
                session.instrument_life = Some(current);
            }
        }
    }

    /// `50ee`: `p1` = hours, `p2` = minutes, `p3` = remaining life
    pub(super) fn handle_cumulative_usage(&mut self, event: &DecodedEvent) {
        if !event.has_suffix(CUMULATIVE_USAGE) {
            return;
        }
        let Some(arm) = event.code_arm_index() else {
            return;
        };
        let state = &mut self.state;
        let tracker = &mut state.arms[arm];
        let Some(session) = state.current.as_mut().and_then(|s| s.open_session_mut(arm)) else {
            return;
        };

        session.cumulative_usage = Some(CumulativeUsage {
            hours: event.param1,
            minutes: event.param2,
        });
        if !tracker.life_reported {
            session.instrument_life = Some(event.param3);
            tracker.instrument_life = Some(event.param3);
        }
    }

    /// `2c2d`: the last attach on the arm did not count
    pub(super) fn handle_revert(&mut self, event: &DecodedEvent) {
        if !event.has_suffix(REVERT_OVERCOUNT) {
            return;
        }
        let Some(arm) = event.code_arm_index() else {
            return;
        };

        let tracker = &mut self.state.arms[arm];
        tracker.instrument_type = 0;
        tracker.instrument_life = None;
        tracker.life_reported = false;
        tracker.pending = None;

        if let Some(surgery) = self.state.current.as_mut() {
            if surgery.arm_usage[arm].pop().is_some() {
                info!("Arm {} last instrument session reverted at {}", arm + 1, event.timestamp);
            }
        }
    }

    /// Completed pedal and clutch presses count toward the open surgery
    pub(super) fn handle_pedal(&mut self, event: &DecodedEvent) {
        let Some((kind, is_primary)) = PedalKind::match_suffix(event.suffix()) else {
            return;
        };
        let Some(done) = self
            .state
            .pedals
            .observe(kind, is_primary, event.param1, event.timestamp)
        else {
            return;
        };
        if let Some(surgery) = self.state.open_surgery_mut() {
            bump(&mut surgery.pedal_counters, done);
        }
    }

    /// Energy output intervals on the arm's session
    pub(super) fn handle_energy(&mut self, event: &DecodedEvent) {
        let Some(energy_type) = energy_type_for(event.suffix()) else {
            return;
        };
        let Some(arm) = event.code_arm_index() else {
            return;
        };
        let now = event.timestamp;
        let edges = self.state.energy.observe(arm, energy_type, event.params());

        for edge in edges {
            let Some(surgery) = self.state.current.as_mut() else {
                return;
            };
            match edge {
                EnergyEdge::Start => {
                    let Some(session) = surgery.open_session_mut(arm) else {
                        debug!("Energy {} on arm {} without instrument", energy_type.as_str(), arm + 1);
                        continue;
                    };
                    session.energy_activations.push(EnergyActivationEvent {
                        arm_index: arm,
                        energy_type,
                        start: now,
                        end: None,
                        active_time: None,
                        grips_active_time: None,
                    });
                }
                EnergyEdge::Stop {
                    active_time,
                    grips_active_time,
                } => {
                    // Latest unreported interval; it may already be force-closed
                    // with its session
                    let activation = surgery.latest_session_mut(arm).and_then(|s| {
                        s.energy_activations
                            .iter_mut()
                            .rev()
                            .find(|a| a.energy_type == energy_type && a.active_time.is_none())
                    });
                    if let Some(activation) = activation {
                        if activation.is_open() {
                            activation.end = Some(now.max(activation.start));
                        }
                        activation.active_time = Some(active_time);
                        activation.grips_active_time = Some(grips_active_time);
                    }
                }
            }
        }
    }
}
