//! Surgery creation, start, end, finalization and release

use super::codes::{ARM_IDLE, ARM_UNKNOWN, STATE_MASTER_SLAVE, SURGERY_END_STATES};
use super::SurgeryAnalyzer;
use crate::models::{DecodedEvent, NetworkStats, Surgery};
use chrono::NaiveDateTime;
use tracing::{debug, info};

impl SurgeryAnalyzer {
    /// Make sure an unended surgery exists to attach instruments to.
    ///
    /// Creates a pre-surgery holder when there is none, releasing an ended
    /// surgery first.
    pub(super) fn ensure_surgery(&mut self, now: NaiveDateTime) {
        if self.state.open_surgery_mut().is_some() {
            return;
        }
        self.release_current();

        let mut holder = self.new_surgery();
        holder.is_pre_surgery = true;
        debug!("Pre-surgery holder {} created at {}", holder.surgery_id, now);
        self.state.current = Some(holder);
    }

    /// A surgery starts on the first entry into master-slave control
    pub(super) fn check_surgery_start(&mut self, now: NaiveDateTime) {
        if self.state.current_state != STATE_MASTER_SLAVE || self.state.surgery_started {
            return;
        }
        self.state.surgery_started = true;

        let promote = self
            .state
            .open_surgery_mut()
            .is_some_and(|s| s.is_pre_surgery);

        // Release before the fault history is reset for the new surgery
        if !promote {
            self.release_current();
        }
        self.state.reset_faults();
        if !promote {
            let surgery = self.new_surgery();
            self.state.current = Some(surgery);
        }

        let Some(surgery) = self.state.current.as_mut() else {
            return;
        };
        surgery.is_pre_surgery = false;
        surgery.has_fault = false;
        surgery.start_time = Some(now);
        surgery.stage_event_times.surgery_start = Some(now);

        if surgery.is_consecutive_surgery {
            info!(
                "Surgery {} started at {} (consecutive, previous ended {:?})",
                surgery.surgery_id, now, surgery.previous_surgery_end_time
            );
        } else {
            info!("Surgery {} started at {}", surgery.surgery_id, now);
        }
    }

    /// `500e` returning an arm to idle with every arm idle, in a resting
    /// controller state, ends the running surgery
    pub(super) fn check_surgery_end(&mut self, event: &DecodedEvent) {
        if !(event.param2 != ARM_IDLE && event.param3 == ARM_IDLE) {
            return;
        }
        if !self.state.surgery_started {
            return;
        }
        let all_idle = self
            .state
            .arms
            .iter()
            .all(|a| a.state == ARM_IDLE || a.state == ARM_UNKNOWN);
        if !all_idle || !SURGERY_END_STATES.contains(&self.state.current_state) {
            return;
        }

        let now = event.timestamp;
        self.state.surgery_started = false;
        let Some(surgery) = self.state.current.as_mut() else {
            return;
        };
        surgery.end_time = Some(now);
        surgery.stage_event_times.surgery_end = Some(now);

        if surgery.is_pre_surgery {
            debug!("Pre-surgery holder {} marked ended at {}", surgery.surgery_id, now);
            return;
        }

        surgery.close_all_sessions(now);
        self.state.previous_surgery_end_time = Some(now);
        info!(
            "Surgery {} ended at {} ({} instrument sessions)",
            surgery.surgery_id,
            now,
            surgery.session_count()
        );
    }

    /// Close whatever is still open at the end of the stream
    pub(super) fn finish(&mut self, last: NaiveDateTime) {
        if let Some(surgery) = self.state.current.as_mut() {
            if surgery.is_durable() && !surgery.is_ended() {
                info!("Surgery {} still open at end of data, closing at {}", surgery.surgery_id, last);
                surgery.end_time = Some(last);
                surgery.stage_event_times.surgery_end = Some(last);
            }
            surgery.close_all_sessions(surgery.end_time.unwrap_or(last));
        }
        self.release_current();
    }

    /// Emit the current surgery if durable, otherwise drop it
    pub(super) fn release_current(&mut self) {
        let Some(mut surgery) = self.state.current.take() else {
            return;
        };
        if !surgery.is_durable() {
            debug!("Discarding {}: never started", surgery.surgery_id);
            return;
        }

        self.finalize(&mut surgery);
        info!(
            "Surgery {} complete: {} sessions, {} alarms, {} min",
            surgery.surgery_id,
            surgery.session_count(),
            surgery.alarm_details.len(),
            surgery.total_duration_minutes.unwrap_or(0)
        );
        self.completed.push(surgery);
    }

    /// Fresh surgery seeded with power history, the consecutive link, and
    /// any milestones recorded while no surgery was open
    fn new_surgery(&mut self) -> Surgery {
        let mut surgery = Surgery::new(self.next_surgery_id());
        surgery.is_remote_surgery = self.state.is_remote;

        match self.state.previous_surgery_end_time {
            Some(previous_end) => {
                surgery.is_consecutive_surgery = true;
                surgery.previous_surgery_end_time = Some(previous_end);
                surgery.power_on_times = vec![previous_end];
            }
            None => {
                surgery.power_on_times = self.state.power_on_times.clone();
                surgery.shutdown_times = self.state.shutdown_times.clone();
            }
        }

        let milestones = std::mem::take(&mut self.state.milestones);
        surgery.stage_event_times.isolation_installed = milestones.isolation_installed;
        surgery.stage_event_times.instrument_installed = milestones.instrument_installed;
        surgery
    }

    /// Copy per-surgery history in and compute derived fields
    fn finalize(&self, surgery: &mut Surgery) {
        if let Some(end) = surgery.end_time {
            surgery.close_all_sessions(end);
        }

        if let Some((from, to)) = surgery.time_range() {
            let in_range = |ts: &NaiveDateTime| *ts >= from && *ts <= to;
            surgery.alarm_details = self
                .state
                .alarm_history
                .iter()
                .filter(|a| in_range(&a.opened_at))
                .cloned()
                .collect();
            surgery.state_machine_changes = self
                .state
                .state_changes
                .iter()
                .filter(|c| in_range(&c.time))
                .cloned()
                .collect();
            surgery.network_latency_samples = self
                .state
                .latency_samples
                .iter()
                .filter(|s| in_range(&s.timestamp))
                .copied()
                .collect();
        }
        surgery.network_stats = NetworkStats::from_samples(&surgery.network_latency_samples);
        surgery.has_fault |= !surgery.alarm_details.is_empty();

        if let (Some(start), Some(end)) = (surgery.start_time, surgery.end_time) {
            surgery.total_duration_minutes = Some((end - start).num_minutes());
        }

        let stages = &mut surgery.stage_event_times;
        stages.power_on = surgery.power_on_times.first().copied();
        stages.surgery_start = surgery.start_time;
        stages.surgery_end = surgery.end_time;
        stages.power_off = surgery.end_time.and_then(|end| {
            surgery
                .shutdown_times
                .iter()
                .filter(|t| **t >= end)
                .min()
                .copied()
        });
        surgery.stage_durations = stages.durations();
    }
}
