//! Storage projection
//!
//! Flattens a [`Surgery`] into the `surgeries` table row: a handful of
//! scalar columns plus one JSON document (`structured_data`) holding power
//! cycles, per-arm instrument usage, statistics, stages and analyzer
//! metadata. All timestamps are rendered in the storage format
//! (`YYYY-MM-DD HH:MM:SS`).

use crate::analyzer::ANALYZER_VERSION;
use crate::models::{
    EnergyActivationEvent, InstrumentUsageSession, PowerCycle, StageDurations, Surgery,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use surglog_common::time::{format_id_time, format_storage_time};

/// Device identifier used when none is configured
pub const UNKNOWN_DEVICE: &str = "UNKNOWN";

/// Identifier time component when the surgery has no start
const NO_START_ID_TIME: &str = "000000000000";

// ========================================
// Row Types
// ========================================

/// One `surgeries` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurgeryRow {
    /// `<device>-<YYYYMMDDHHMM of start>`
    pub surgery_id: String,
    pub device_id: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub has_fault: bool,
    pub is_remote: bool,
    pub success: bool,
    pub structured_data: StructuredData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredData {
    pub power_cycles: Vec<PowerCycleRow>,
    pub arms: Vec<ArmRow>,
    pub surgery_stats: SurgeryStats,
    pub stages: StagesRow,
    pub meta: MetaRow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerCycleRow {
    pub on_time: Option<String>,
    pub off_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmRow {
    /// 1-based
    pub arm_id: usize,
    pub instrument_usage: Vec<InstrumentUsageRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentUsageRow {
    pub tool_type: String,
    pub instrument_type: i32,
    pub udi: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
    pub instrument_life: Option<i32>,
    pub energy_activation: Vec<EnergyActivationRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyActivationRow {
    pub energy_type: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub active_time: Option<i32>,
    pub grips_active_time: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurgeryStats {
    pub success: bool,
    pub has_fault: bool,
    pub faults: Vec<FaultRow>,
    pub state_machine: Vec<StateMachineRow>,
    pub network_latency_ms: Vec<LatencyRow>,
    pub left_hand_clutch: u32,
    pub right_hand_clutch: u32,
    pub foot_clutch: u32,
    pub endoscope_pedal: u32,
    pub energy_pedal: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultRow {
    pub timestamp: String,
    pub recovered_at: Option<String>,
    pub error_code: String,
    #[serde(rename = "type")]
    pub alarm_type: String,
    pub status: String,
    pub param1: i32,
    pub param2: i32,
    pub param3: i32,
    pub param4: i32,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMachineRow {
    pub time: String,
    pub state: i32,
    pub state_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyRow {
    pub time: String,
    pub latency: i32,
}

/// Stage markers and the durations between them (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagesRow {
    pub power_on: Option<String>,
    pub isolation_installed: Option<String>,
    pub instrument_installed: Option<String>,
    pub surgery_start: Option<String>,
    pub last_master_slave: Option<String>,
    pub surgery_end: Option<String>,
    pub power_off: Option<String>,
    pub durations: StageDurations,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRow {
    pub analyzer_version: String,
    pub is_consecutive_surgery: bool,
    pub is_abnormal_shutdown: bool,
}

// ========================================
// Projection
// ========================================

/// Builds storage rows for one device
#[derive(Debug, Clone)]
pub struct PostgresProjector {
    device_id: String,
}

impl Default for PostgresProjector {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PostgresProjector {
    /// `None` or a blank id projects under [`UNKNOWN_DEVICE`]
    pub fn new(device_id: Option<&str>) -> Self {
        let device_id = device_id
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(UNKNOWN_DEVICE)
            .to_string();
        Self { device_id }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn project(&self, surgery: &Surgery) -> SurgeryRow {
        let id_time = surgery
            .start_time
            .as_ref()
            .map(format_id_time)
            .unwrap_or_else(|| NO_START_ID_TIME.to_string());

        let has_fault = surgery.has_fault;
        SurgeryRow {
            surgery_id: format!("{}-{}", self.device_id, id_time),
            device_id: self.device_id.clone(),
            start_time: fmt_opt(surgery.start_time),
            end_time: fmt_opt(surgery.end_time),
            has_fault,
            is_remote: surgery.is_remote_surgery,
            success: !has_fault,
            structured_data: structured_data(surgery),
        }
    }

    pub fn project_all(&self, surgeries: &[Surgery]) -> Vec<SurgeryRow> {
        surgeries.iter().map(|s| self.project(s)).collect()
    }
}

fn structured_data(surgery: &Surgery) -> StructuredData {
    let power_cycles = pair_power_cycles(&surgery.power_on_times, &surgery.shutdown_times)
        .into_iter()
        .map(|c| PowerCycleRow {
            on_time: fmt_opt(c.on_time),
            off_time: fmt_opt(c.off_time),
        })
        .collect();

    let arms = surgery
        .arm_usage
        .iter()
        .enumerate()
        .map(|(i, sessions)| ArmRow {
            arm_id: i + 1,
            instrument_usage: sessions.iter().map(usage_row).collect(),
        })
        .collect();

    let pedals = &surgery.pedal_counters;
    let surgery_stats = SurgeryStats {
        success: !surgery.has_fault,
        has_fault: surgery.has_fault,
        faults: surgery
            .alarm_details
            .iter()
            .map(|a| FaultRow {
                timestamp: format_storage_time(&a.opened_at),
                recovered_at: fmt_opt(a.recovered_at),
                error_code: a.code.clone(),
                alarm_type: a.alarm_type.as_str().to_string(),
                status: a.status.as_str().to_string(),
                param1: a.param1,
                param2: a.param2,
                param3: a.param3,
                param4: a.param4,
                explanation: a.message.clone(),
            })
            .collect(),
        state_machine: surgery
            .state_machine_changes
            .iter()
            .map(|c| StateMachineRow {
                time: format_storage_time(&c.time),
                state: c.state,
                state_name: c.state_name.clone(),
            })
            .collect(),
        network_latency_ms: surgery
            .network_latency_samples
            .iter()
            .map(|s| LatencyRow {
                time: format_storage_time(&s.timestamp),
                latency: s.latency_ms,
            })
            .collect(),
        left_hand_clutch: pedals.left_hand_clutch,
        right_hand_clutch: pedals.right_hand_clutch,
        foot_clutch: pedals.foot_clutch,
        endoscope_pedal: pedals.endoscope_pedal,
        energy_pedal: pedals.energy_pedal,
    };

    let marks = &surgery.stage_event_times;
    let stages = StagesRow {
        power_on: fmt_opt(marks.power_on),
        isolation_installed: fmt_opt(marks.isolation_installed),
        instrument_installed: fmt_opt(marks.instrument_installed),
        surgery_start: fmt_opt(marks.surgery_start),
        last_master_slave: fmt_opt(marks.last_master_slave),
        surgery_end: fmt_opt(marks.surgery_end),
        power_off: fmt_opt(marks.power_off),
        durations: surgery.stage_durations.clone(),
    };

    StructuredData {
        power_cycles,
        arms,
        surgery_stats,
        stages,
        meta: MetaRow {
            analyzer_version: ANALYZER_VERSION.to_string(),
            is_consecutive_surgery: surgery.is_consecutive_surgery,
            is_abnormal_shutdown: surgery.is_abnormal_shutdown,
        },
    }
}

fn usage_row(session: &InstrumentUsageSession) -> InstrumentUsageRow {
    InstrumentUsageRow {
        tool_type: session.instrument_name.clone(),
        instrument_type: session.instrument_type,
        udi: session.udi.clone(),
        start_time: format_storage_time(&session.start_time),
        end_time: fmt_opt(session.end_time),
        instrument_life: session.instrument_life,
        energy_activation: session.energy_activations.iter().map(energy_row).collect(),
    }
}

fn energy_row(activation: &EnergyActivationEvent) -> EnergyActivationRow {
    EnergyActivationRow {
        energy_type: activation.energy_type.as_str().to_string(),
        start_time: format_storage_time(&activation.start),
        end_time: fmt_opt(activation.end),
        active_time: activation.active_time,
        grips_active_time: activation.grips_active_time,
    }
}

/// Pair power-on and shutdown times into cycles.
///
/// Shutdowns earlier than the next power-on become `{on: None, off}`; each
/// power-on takes the next shutdown at or after it, or none. Shutdowns left
/// over at the end are emitted unpaired. Every input time appears exactly
/// once.
pub fn pair_power_cycles(on_times: &[NaiveDateTime], off_times: &[NaiveDateTime]) -> Vec<PowerCycle> {
    let mut cycles = Vec::with_capacity(on_times.len().max(off_times.len()));
    let mut offs = off_times.iter().copied().peekable();

    for &on in on_times {
        while let Some(off) = offs.next_if(|off| *off < on) {
            cycles.push(PowerCycle {
                on_time: None,
                off_time: Some(off),
            });
        }
        cycles.push(PowerCycle {
            on_time: Some(on),
            off_time: offs.next(),
        });
    }
    cycles.extend(offs.map(|off| PowerCycle {
        on_time: None,
        off_time: Some(off),
    }));
    cycles
}

fn fmt_opt(ts: Option<NaiveDateTime>) -> Option<String> {
    ts.as_ref().map(format_storage_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlarmStatus, AlarmType, FaultAlarm};
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_pairing_simple() {
        let cycles = pair_power_cycles(&[at(8, 0)], &[at(12, 0)]);
        assert_eq!(
            cycles,
            vec![PowerCycle {
                on_time: Some(at(8, 0)),
                off_time: Some(at(12, 0)),
            }]
        );
    }

    #[test]
    fn test_pairing_early_shutdown_unpaired() {
        // 07:00 shutdown precedes the first power-on
        let cycles = pair_power_cycles(&[at(8, 0), at(13, 0)], &[at(7, 0), at(12, 0)]);
        assert_eq!(cycles.len(), 3);
        assert_eq!(cycles[0].on_time, None);
        assert_eq!(cycles[0].off_time, Some(at(7, 0)));
        assert_eq!(cycles[1].off_time, Some(at(12, 0)));
        assert_eq!(cycles[2].on_time, Some(at(13, 0)));
        assert_eq!(cycles[2].off_time, None);
    }

    #[test]
    fn test_pairing_trailing_shutdowns() {
        let cycles = pair_power_cycles(&[], &[at(9, 0), at(10, 0)]);
        assert_eq!(cycles.len(), 2);
        assert!(cycles.iter().all(|c| c.on_time.is_none()));

        let cycles = pair_power_cycles(&[at(8, 0)], &[at(9, 0), at(10, 0)]);
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[1].off_time, Some(at(10, 0)));
    }

    #[test]
    fn test_projector_device_defaults() {
        assert_eq!(PostgresProjector::new(None).device_id(), UNKNOWN_DEVICE);
        assert_eq!(PostgresProjector::new(Some("  ")).device_id(), UNKNOWN_DEVICE);
        assert_eq!(PostgresProjector::new(Some("RB-07")).device_id(), "RB-07");
    }

    #[test]
    fn test_project_row() {
        let mut surgery = Surgery::new("Surgery-01");
        surgery.start_time = Some(at(9, 5));
        surgery.end_time = Some(at(10, 30));
        surgery.power_on_times = vec![at(9, 0)];
        surgery.shutdown_times = vec![at(11, 0)];
        surgery.has_fault = true;
        surgery.alarm_details.push(FaultAlarm {
            code: "1234a".to_string(),
            alarm_type: AlarmType::Error,
            opened_at: at(9, 30),
            recovered_at: Some(at(9, 40)),
            status: AlarmStatus::Resolved,
            param1: 1,
            param2: 2,
            param3: 3,
            param4: 4,
            message: "joint limit".to_string(),
        });

        let row = PostgresProjector::new(Some("RB-07")).project(&surgery);
        assert_eq!(row.surgery_id, "RB-07-202403010905");
        assert_eq!(row.start_time.as_deref(), Some("2024-03-01 09:05:00"));
        assert!(row.has_fault);
        assert!(!row.success);

        let data = &row.structured_data;
        assert_eq!(data.arms.len(), 4);
        assert_eq!(data.arms[3].arm_id, 4);
        assert_eq!(data.power_cycles[0].off_time.as_deref(), Some("2024-03-01 11:00:00"));
        assert_eq!(data.surgery_stats.faults[0].status, "resolved");
        assert_eq!(data.surgery_stats.faults[0].alarm_type, "error");
        assert_eq!(data.meta.analyzer_version, ANALYZER_VERSION);

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["structured_data"]["surgery_stats"]["faults"][0]["type"], "error");
    }

    #[test]
    fn test_project_without_start() {
        let row = PostgresProjector::default().project(&Surgery::new("Surgery-01"));
        assert_eq!(row.surgery_id, "UNKNOWN-000000000000");
        assert!(row.success);
    }
}
