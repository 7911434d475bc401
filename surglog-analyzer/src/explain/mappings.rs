//! Value → name tables used by explanations and the analyzer

/// Mapping-table index for controller state names
pub const STATE_TABLE: i32 = 1;
/// Mapping-table index for instrument type names
pub const INSTRUMENT_TABLE: i32 = 3;

/// Controller state-machine state name
pub fn state_name(state: i32) -> Option<&'static str> {
    let name = match state {
        0 => "Init",
        1 => "Enabled",
        2 => "Self-check",
        10 => "Standby",
        12 => "Slave adjust",
        13 => "Master follow",
        14 => "Master/slave disconnected (clutch)",
        15 => "Init",
        20 => "Master-slave control",
        21 => "Endoscope control",
        30 => "Error",
        31 => "Shutdown",
        _ => return None,
    };
    Some(name)
}

/// Instrument type name
pub fn instrument_name(instrument_type: i32) -> Option<&'static str> {
    let name = match instrument_type {
        0 => "none",
        1 => "needle holder",
        2 => "electric hook",
        3 => "bipolar duckbill forceps",
        4 => "straight scissors",
        5 => "monopolar curved scissors",
        6 => "bipolar curved forceps",
        7 => "Potts scissors",
        8 => "atraumatic forceps",
        9 => "-30° endoscope",
        10 => "0° endoscope",
        11 => "30° endoscope",
        12 => "large needle holder",
        13 => "duckbill grasper",
        14 => "rat-tooth grasper",
        15 => "electric spatula",
        16 => "strong duckbill grasper",
        17 => "ultrasonic scalpel",
        18 => "hook holder",
        19 => "medium clip applier",
        20 => "large clip applier",
        21 => "small scissor needle holder",
        22 => "large scissor needle holder",
        23 => "30° thoracoscope",
        24 => "-30° thoracoscope",
        25 => "small monopolar hook",
        26 => "curved scissors",
        27 => "small grasper",
        28 => "large Maryland forceps",
        29 => "atraumatic bowel grasper",
        30 => "co-injection bipolar duckbill forceps",
        31 => "co-injection bipolar curved forceps",
        32 => "undefined",
        33 => "new needle holder",
        _ => return None,
    };
    Some(name)
}

/// Instrument name, or `type N` for unknown codes
pub fn instrument_display_name(instrument_type: i32) -> String {
    instrument_name(instrument_type)
        .map(str::to_string)
        .unwrap_or_else(|| format!("type {}", instrument_type))
}

/// Endoscopes carry a different UDI layout
pub fn is_endoscope(instrument_type: i32) -> bool {
    matches!(instrument_type, 9..=11)
}

/// Look up `value` in mapping table `table`; `None` for raw tables or
/// unknown values.
pub fn lookup(table: i32, value: i32) -> Option<&'static str> {
    match table {
        STATE_TABLE => state_name(value),
        INSTRUMENT_TABLE => instrument_name(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(state_name(20), Some("Master-slave control"));
        assert_eq!(state_name(31), Some("Shutdown"));
        assert_eq!(state_name(99), None);
    }

    #[test]
    fn test_instrument_names() {
        assert_eq!(instrument_name(5), Some("monopolar curved scissors"));
        assert_eq!(instrument_display_name(77), "type 77");
        assert!(is_endoscope(10));
        assert!(!is_endoscope(17));
    }

    #[test]
    fn test_lookup_tables() {
        assert_eq!(lookup(1, 10), Some("Standby"));
        assert_eq!(lookup(3, 1), Some("needle holder"));
        assert_eq!(lookup(0, 1), None);
        assert_eq!(lookup(-1, 1), None);
    }
}
