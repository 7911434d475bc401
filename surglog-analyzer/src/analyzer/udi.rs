//! Instrument UDI reconstruction
//!
//! A UDI report packs the identifier into four parameters. Instruments with
//! a printable `F`/`D` lead byte in `p1` use the hex layout; everything else
//! is laid out by instrument type.

use super::codes::UDI_SUFFIXES;
use crate::explain::mappings::is_endoscope;
use crate::models::DecodedEvent;

const ULTRASONIC_SCALPEL: i32 = 17;

/// Arm a UDI report belongs to.
///
/// Uses the code's arm digit; `58Ne` reports without one map to arm `N-1`.
pub fn udi_arm(event: &DecodedEvent) -> Option<usize> {
    event.code_arm_index().or_else(|| {
        let suffix = event.suffix();
        let digit = suffix.strip_prefix("58")?.chars().next()?.to_digit(10)? as usize;
        (1..=4).contains(&digit).then(|| digit - 1)
    })
}

pub fn is_udi_event(event: &DecodedEvent) -> bool {
    UDI_SUFFIXES.iter().any(|s| event.has_suffix(s))
}

/// Build the UDI string for a report on an arm currently holding
/// `instrument_type`.
pub fn build_udi(params: [i32; 4], instrument_type: i32) -> String {
    let [p1, p2, p3, p4] = params;
    let lead = ((p1 >> 8) & 0xFF) as u8;

    if lead == b'F' || lead == b'D' {
        return format!(
            "{}{:02X}{:02X}{:02X}{}{}",
            lead as char,
            p1 & 0xFF,
            (p2 >> 8) & 0xFF,
            p2 & 0xFF,
            p3,
            p4
        );
    }

    let p2_padded = format!("{:0>3}", p2);
    if is_endoscope(instrument_type) {
        format!("ECO{}{}-{}{}", p3, char_code(p4), p1, p2_padded)
    } else if instrument_type == ULTRASONIC_SCALPEL {
        format!("F{}{}{:0>3}{:0>3}", p1, p2, p3, p4)
    } else {
        format!("IN{}{}-{}{}", p3, char_code(p4), p1, p2_padded)
    }
}

/// Parameter as a UTF-16 code unit
fn char_code(value: i32) -> char {
    char::from_u32((value as u32) & 0xFFFF).unwrap_or(char::REPLACEMENT_CHARACTER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn event(code: &str) -> DecodedEvent {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        DecodedEvent::new(ts, code, [0; 4])
    }

    #[test]
    fn test_hex_layout_for_f_and_d_lead() {
        assert_eq!(build_udi([0x4631, 0x0203, 45, 6], 1), "F310203456");
        assert_eq!(build_udi([0x440A, 0xBEEF, 1, 2], 5), "D0ABEEF12");
    }

    #[test]
    fn test_endoscope_layout() {
        assert_eq!(build_udi([12, 7, 3, 'A' as i32], 10), "ECO3A-12007");
    }

    #[test]
    fn test_ultrasonic_layout() {
        assert_eq!(build_udi([12, 7, 3, 45], 17), "F127003045");
    }

    #[test]
    fn test_default_layout() {
        assert_eq!(build_udi([2301, 56, 24, 'B' as i32], 1), "IN24B-2301056");
        assert_eq!(build_udi([2301, 1234, 24, 'B' as i32], 0), "IN24B-23011234");
    }

    #[test]
    fn test_udi_arm_resolution() {
        assert_eq!(udi_arm(&event("1300510e")), Some(0));
        assert_eq!(udi_arm(&event("1500581e")), Some(2));
        assert_eq!(udi_arm(&event("1000581e")), Some(0));
        assert_eq!(udi_arm(&event("1000584e")), Some(3));
        assert_eq!(udi_arm(&event("1000510e")), None);
    }

    #[test]
    fn test_udi_suffixes() {
        assert!(is_udi_event(&event("1300510e")));
        assert!(is_udi_event(&event("1300584E")));
        assert!(!is_udi_event(&event("1300511e")));
    }
}
