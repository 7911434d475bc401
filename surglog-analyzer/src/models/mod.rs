//! Domain types shared by the decoder, analyzer and projector

pub mod event;
pub mod surgery;

pub use event::DecodedEvent;
pub use surgery::{
    ActivationSpan, AlarmStatus, AlarmType, CumulativeUsage, EnergyActivationEvent, EnergyType,
    FaultAlarm, InstrumentUsageSession, LatencySample, NetworkStats, PedalCounters, PowerCycle,
    StageDurations, StageEventTimes, StateChange, Surgery, ARM_COUNT,
};
