//! Surgery aggregate and its owned entities
//!
//! Everything here is produced by one analyzer pass. A `Surgery` only leaves
//! the analyzer once it has a start time and is no longer a pre-surgery
//! holder.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use surglog_common::time::seconds_between;

/// Number of robot arms tracked per device
pub const ARM_COUNT: usize = 4;

/// Severity of a fault, taken from the last character of its code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmType {
    Error,
    Warning,
    Info,
}

impl AlarmType {
    /// `...a` codes are errors, `...b` codes are warnings
    pub fn from_code(code: &str) -> Self {
        match code.chars().last().map(|c| c.to_ascii_lowercase()) {
            Some('a') => AlarmType::Error,
            Some('b') => AlarmType::Warning,
            _ => AlarmType::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmType::Error => "error",
            AlarmType::Warning => "warning",
            AlarmType::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmStatus {
    Unresolved,
    Resolved,
}

impl AlarmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmStatus::Unresolved => "unresolved",
            AlarmStatus::Resolved => "resolved",
        }
    }
}

/// One fault occurrence. At most one is active per code at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultAlarm {
    pub code: String,
    #[serde(rename = "type")]
    pub alarm_type: AlarmType,
    pub opened_at: NaiveDateTime,
    pub recovered_at: Option<NaiveDateTime>,
    pub status: AlarmStatus,
    pub param1: i32,
    pub param2: i32,
    pub param3: i32,
    pub param4: i32,
    /// Explanation text of the opening event
    pub message: String,
}

impl FaultAlarm {
    pub fn resolve(&mut self, at: NaiveDateTime) {
        self.status = AlarmStatus::Resolved;
        self.recovered_at = Some(at);
    }
}

/// Accumulated usage reported by the instrument (`50ee`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeUsage {
    pub hours: i32,
    pub minutes: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnergyType {
    Cut,
    Coag,
    Bipolar,
    Ultrasonic,
    UltrasonicMax,
}

impl EnergyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnergyType::Cut => "cut",
            EnergyType::Coag => "coag",
            EnergyType::Bipolar => "bipolar",
            EnergyType::Ultrasonic => "ultrasonic",
            EnergyType::UltrasonicMax => "ultrasonicMax",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyActivationEvent {
    pub arm_index: usize,
    pub energy_type: EnergyType,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    /// Reported active time at release
    pub active_time: Option<i32>,
    /// Reported grip-active time at release
    pub grips_active_time: Option<i32>,
}

impl EnergyActivationEvent {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Close at `at`, never earlier than the start
    pub fn force_close(&mut self, at: NaiveDateTime) {
        if self.end.is_none() {
            self.end = Some(at.max(self.start));
        }
    }
}

/// One instrument seated on one arm, from attach to removal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentUsageSession {
    pub arm_index: usize,
    pub instrument_type: i32,
    pub instrument_name: String,
    pub udi: Option<String>,
    pub instrument_life: Option<i32>,
    pub cumulative_usage: Option<CumulativeUsage>,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub duration_seconds: Option<i64>,
    pub energy_activations: Vec<EnergyActivationEvent>,
    /// Attached before the owning surgery started
    pub is_pre_surgery: bool,
}

impl InstrumentUsageSession {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Close on an explicit removal event
    pub fn close(&mut self, at: NaiveDateTime) {
        let end = at.max(self.start_time);
        self.end_time = Some(end);
        self.duration_seconds = Some(seconds_between(&self.start_time, &end));
        self.close_energy(end);
    }

    /// Close at a boundary; a forced close lasts at least one second
    pub fn force_close(&mut self, at: NaiveDateTime) {
        if !self.is_open() {
            return;
        }
        let end = at.max(self.start_time + Duration::seconds(1));
        self.end_time = Some(end);
        self.duration_seconds = Some(seconds_between(&self.start_time, &end));
        self.close_energy(end);
    }

    fn close_energy(&mut self, at: NaiveDateTime) {
        for activation in self.energy_activations.iter_mut() {
            activation.force_close(at);
        }
    }
}

/// First attach to last removal on one arm
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivationSpan {
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub time: NaiveDateTime,
    pub state: i32,
    pub state_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySample {
    pub timestamp: NaiveDateTime,
    pub latency_ms: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub count: usize,
    pub min: i32,
    pub max: i32,
    pub avg: f64,
}

impl NetworkStats {
    /// `None` when there are no samples
    pub fn from_samples(samples: &[LatencySample]) -> Option<Self> {
        let count = samples.len();
        let min = samples.iter().map(|s| s.latency_ms).min()?;
        let max = samples.iter().map(|s| s.latency_ms).max()?;
        let total: i64 = samples.iter().map(|s| s.latency_ms as i64).sum();
        Some(Self {
            count,
            min,
            max,
            avg: total as f64 / count as f64,
        })
    }
}

/// Completed pedal and clutch press cycles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PedalCounters {
    pub foot_clutch: u32,
    pub endoscope_pedal: u32,
    pub energy_pedal: u32,
    pub left_hand_clutch: u32,
    pub right_hand_clutch: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerCycle {
    pub on_time: Option<NaiveDateTime>,
    pub off_time: Option<NaiveDateTime>,
}

/// Stage marker timestamps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageEventTimes {
    pub power_on: Option<NaiveDateTime>,
    pub isolation_installed: Option<NaiveDateTime>,
    pub instrument_installed: Option<NaiveDateTime>,
    pub surgery_start: Option<NaiveDateTime>,
    pub last_master_slave: Option<NaiveDateTime>,
    pub surgery_end: Option<NaiveDateTime>,
    pub power_off: Option<NaiveDateTime>,
}

/// Stage durations in seconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDurations {
    pub power_on: Option<i64>,
    pub positioning: Option<i64>,
    pub instrument_installation: Option<i64>,
    pub operation: Option<i64>,
    pub withdrawal: Option<i64>,
    pub power_off: Option<i64>,
}

impl StageEventTimes {
    /// Durations between consecutive markers; a missing or reversed pair
    /// yields `None`
    pub fn durations(&self) -> StageDurations {
        StageDurations {
            power_on: span(self.power_on, self.isolation_installed),
            positioning: span(self.isolation_installed, self.instrument_installed),
            instrument_installation: span(self.instrument_installed, self.surgery_start),
            operation: span(self.surgery_start, self.last_master_slave),
            withdrawal: span(self.last_master_slave, self.surgery_end),
            power_off: span(self.surgery_end, self.power_off),
        }
    }
}

fn span(from: Option<NaiveDateTime>, to: Option<NaiveDateTime>) -> Option<i64> {
    let secs = seconds_between(&from?, &to?);
    (secs >= 0).then_some(secs)
}

/// One reconstructed procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surgery {
    pub surgery_id: String,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub power_on_times: Vec<NaiveDateTime>,
    pub shutdown_times: Vec<NaiveDateTime>,
    pub arm_usage: [Vec<InstrumentUsageSession>; ARM_COUNT],
    pub arm_total_activation: [ActivationSpan; ARM_COUNT],
    pub alarm_details: Vec<FaultAlarm>,
    pub state_machine_changes: Vec<StateChange>,
    pub stage_event_times: StageEventTimes,
    pub stage_durations: StageDurations,
    pub is_pre_surgery: bool,
    pub is_consecutive_surgery: bool,
    pub previous_surgery_end_time: Option<NaiveDateTime>,
    pub is_remote_surgery: bool,
    pub has_fault: bool,
    pub is_abnormal_shutdown: bool,
    pub pedal_counters: PedalCounters,
    pub network_latency_samples: Vec<LatencySample>,
    pub network_stats: Option<NetworkStats>,
    pub total_duration_minutes: Option<i64>,
}

impl Surgery {
    /// Empty surgery record with the given id
    pub fn new(surgery_id: impl Into<String>) -> Self {
        Self {
            surgery_id: surgery_id.into(),
            start_time: None,
            end_time: None,
            power_on_times: Vec::new(),
            shutdown_times: Vec::new(),
            arm_usage: Default::default(),
            arm_total_activation: Default::default(),
            alarm_details: Vec::new(),
            state_machine_changes: Vec::new(),
            stage_event_times: StageEventTimes::default(),
            stage_durations: StageDurations::default(),
            is_pre_surgery: false,
            is_consecutive_surgery: false,
            previous_surgery_end_time: None,
            is_remote_surgery: false,
            has_fault: false,
            is_abnormal_shutdown: false,
            pedal_counters: PedalCounters::default(),
            network_latency_samples: Vec::new(),
            network_stats: None,
            total_duration_minutes: None,
        }
    }

    /// Has a start time and is not a pre-surgery holder
    pub fn is_durable(&self) -> bool {
        self.start_time.is_some() && !self.is_pre_surgery
    }

    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }

    /// The arm's session if it is still open
    pub fn open_session_mut(&mut self, arm: usize) -> Option<&mut InstrumentUsageSession> {
        self.arm_usage
            .get_mut(arm)?
            .last_mut()
            .filter(|s| s.is_open())
    }

    /// Open session, else the most recent closed one
    pub fn latest_session_mut(&mut self, arm: usize) -> Option<&mut InstrumentUsageSession> {
        self.arm_usage.get_mut(arm)?.last_mut()
    }

    /// Force-close every open session (and its energy intervals) at `at`,
    /// extending the arm's total activation span.
    pub fn close_all_sessions(&mut self, at: NaiveDateTime) {
        for arm in 0..ARM_COUNT {
            let Some(session) = self.open_session_mut(arm) else {
                continue;
            };
            session.force_close(at);
            let end = session.end_time;
            self.arm_total_activation[arm].end_time = end;
        }
    }

    /// Earliest and latest of start, end, power-on and shutdown times
    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let all = self
            .start_time
            .iter()
            .chain(self.end_time.iter())
            .chain(self.power_on_times.iter())
            .chain(self.shutdown_times.iter());
        let min = all.clone().min()?;
        let max = all.max()?;
        Some((*min, *max))
    }

    /// Total sessions across all arms
    pub fn session_count(&self) -> usize {
        self.arm_usage.iter().map(Vec::len).sum()
    }
}
