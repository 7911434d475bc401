//! Event code suffixes and controller constants the analyzer reacts to

use crate::models::EnergyType;

pub use crate::models::event::{
    POWER_OFF_SUFFIX, POWER_ON_ALT_SUFFIX, POWER_ON_SUFFIX, STATE_CHANGE_SUFFIX, STATE_SHUTDOWN,
};

/// Remote-surgery link established
pub const REMOTE_SESSION: &str = "416d";
/// Network latency report (`p3` = latency ms)
pub const NETWORK_LATENCY: &str = "405e";

/// Arm state change (`p1` = arm, `p2` = previous, `p3` = new)
pub const ARM_STATE: &str = "500e";
/// Arm instrument type (`p1` = arm, `p3` = type)
pub const INSTRUMENT_TYPE: &str = "501e";
/// Instrument remaining life (`p1` = previous, `p2` = current)
pub const INSTRUMENT_LIFE: &str = "502e";
/// Instrument cumulative usage (`p1` = hours, `p2` = minutes, `p3` = life)
pub const CUMULATIVE_USAGE: &str = "50ee";
/// Instrument life over-count; the last attach is reverted
pub const REVERT_OVERCOUNT: &str = "2c2d";

/// UDI reports
pub const UDI_SUFFIXES: [&str; 3] = ["510e", "581e", "584e"];

// Controller states
pub const STATE_ENABLED: i32 = 1;
pub const STATE_MASTER_SLAVE: i32 = 20;
/// States in which an idle arm set ends a surgery
pub const SURGERY_END_STATES: [i32; 4] = [1, 10, 12, 13];

// Arm states
pub const ARM_IDLE: i32 = 0;
pub const ARM_UNKNOWN: i32 = -1;
pub const ARM_ISOLATION_INSTALLED: i32 = 1;
pub const ARM_INSTRUMENT_ATTACHED: i32 = 4;
pub const ARM_INSTRUMENT_READY: i32 = 5;
pub const ARM_INSTRUMENT_REMOVED: i32 = 7;

/// Counter a pedal or clutch code feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PedalKind {
    FootClutch,
    EndoscopePedal,
    EnergyPedal,
    LeftHandClutch,
    RightHandClutch,
}

impl PedalKind {
    pub const ALL: [PedalKind; 5] = [
        PedalKind::FootClutch,
        PedalKind::EndoscopePedal,
        PedalKind::EnergyPedal,
        PedalKind::LeftHandClutch,
        PedalKind::RightHandClutch,
    ];

    /// Primary and (optional) secondary suffix
    pub fn suffixes(self) -> (&'static str, Option<&'static str>) {
        match self {
            PedalKind::FootClutch => ("530e", Some("531e")),
            PedalKind::EndoscopePedal => ("532e", Some("533e")),
            PedalKind::EnergyPedal => ("534e", Some("535e")),
            PedalKind::LeftHandClutch => ("541e", None),
            PedalKind::RightHandClutch => ("542e", None),
        }
    }

    /// Which of this pedal's suffixes `suffix` is, if any
    pub fn match_suffix(suffix: &str) -> Option<(PedalKind, bool)> {
        PedalKind::ALL.iter().find_map(|&kind| {
            let (primary, secondary) = kind.suffixes();
            if suffix.eq_ignore_ascii_case(primary) {
                Some((kind, true))
            } else if secondary.is_some_and(|s| suffix.eq_ignore_ascii_case(s)) {
                Some((kind, false))
            } else {
                None
            }
        })
    }
}

/// Energy type reported by an energy-activation suffix
pub fn energy_type_for(suffix: &str) -> Option<EnergyType> {
    match suffix.to_ascii_lowercase().as_str() {
        "560e" => Some(EnergyType::Cut),
        "561e" => Some(EnergyType::Coag),
        "562e" => Some(EnergyType::Bipolar),
        "563e" => Some(EnergyType::Ultrasonic),
        "564e" => Some(EnergyType::UltrasonicMax),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pedal_suffix_lookup() {
        assert_eq!(PedalKind::match_suffix("530e"), Some((PedalKind::FootClutch, true)));
        assert_eq!(PedalKind::match_suffix("531E"), Some((PedalKind::FootClutch, false)));
        assert_eq!(PedalKind::match_suffix("542e"), Some((PedalKind::RightHandClutch, true)));
        assert_eq!(PedalKind::match_suffix("543e"), None);
    }

    #[test]
    fn test_energy_suffix_lookup() {
        assert_eq!(energy_type_for("560e"), Some(EnergyType::Cut));
        assert_eq!(energy_type_for("564E"), Some(EnergyType::UltrasonicMax));
        assert_eq!(energy_type_for("565e"), None);
    }
}
