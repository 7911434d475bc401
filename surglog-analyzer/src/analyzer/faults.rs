//! Fault, network and controller-state handling

use super::codes::{NETWORK_LATENCY, REMOTE_SESSION, STATE_ENABLED, STATE_MASTER_SLAVE};
use super::SurgeryAnalyzer;
use crate::explain::mappings::state_name;
use crate::models::{AlarmStatus, AlarmType, DecodedEvent, FaultAlarm, LatencySample, StateChange};
use tracing::{debug, info};

impl SurgeryAnalyzer {
    pub(super) fn handle_network(&mut self, event: &DecodedEvent) {
        if event.has_suffix(REMOTE_SESSION) {
            if !self.state.is_remote {
                info!("Remote surgery link at {}", event.timestamp);
            }
            self.state.is_remote = true;
            if let Some(surgery) = self.state.current.as_mut() {
                surgery.is_remote_surgery = true;
            }
        } else if event.has_suffix(NETWORK_LATENCY) && event.param3 > 0 {
            self.state.latency_samples.push(LatencySample {
                timestamp: event.timestamp,
                latency_ms: event.param3,
            });
        }
    }

    /// Open an alarm for `...a`/`...b` codes unless one is already active
    pub(super) fn handle_fault(&mut self, event: &DecodedEvent) {
        let alarm_type = AlarmType::from_code(&event.error_code);
        if alarm_type == AlarmType::Info {
            return;
        }

        self.state.err_flag = true;
        if let Some(surgery) = self.state.open_surgery_mut() {
            surgery.has_fault = true;
        }

        if self.state.active_alarms.contains_key(&event.error_code) {
            return;
        }

        debug!(
            "{} {} opened at {}",
            alarm_type.as_str(),
            event.error_code,
            event.timestamp
        );
        self.state.alarm_history.push(FaultAlarm {
            code: event.error_code.clone(),
            alarm_type,
            opened_at: event.timestamp,
            recovered_at: None,
            status: AlarmStatus::Unresolved,
            param1: event.param1,
            param2: event.param2,
            param3: event.param3,
            param4: event.param4,
            message: event.explanation.clone(),
        });
        let index = self.state.alarm_history.len() - 1;
        self.state
            .active_alarms
            .insert(event.error_code.clone(), index);
    }

    /// `310e`: `p1` = previous state, `p2` = new state
    pub(super) fn handle_state_change(&mut self, event: &DecodedEvent) {
        let (from, to) = (event.param1, event.param2);
        let now = event.timestamp;

        self.state.current_state = to;
        self.state.state_changes.push(StateChange {
            time: now,
            state: to,
            state_name: state_name(to).unwrap_or("Unknown").to_string(),
        });

        // Re-enable after an error clears the active alarm set
        if from == 0 && to == STATE_ENABLED {
            if self.state.err_flag {
                let resolved = self.state.active_alarms.len();
                for &index in self.state.active_alarms.values() {
                    if let Some(alarm) = self.state.alarm_history.get_mut(index) {
                        alarm.resolve(now);
                    }
                }
                if resolved > 0 {
                    info!("{} active alarms resolved at {}", resolved, now);
                }
            }
            self.state.active_alarms.clear();
            self.state.err_flag = false;
        }

        if to == STATE_MASTER_SLAVE && from != STATE_MASTER_SLAVE {
            if let Some(surgery) = self.state.open_surgery_mut() {
                surgery.stage_event_times.last_master_slave = Some(now);
            }
        }
    }
}
