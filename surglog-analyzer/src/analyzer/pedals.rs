//! Pedal, clutch and energy edge detection
//!
//! Pedals report their level in `p1`. A completed press is a `0 → 1 → 0`
//! cycle. Pedals with two sensors report on a primary and a secondary code;
//! a secondary press starting within two seconds of a primary press is the
//! same physical press and is not counted again.

use super::codes::PedalKind;
use crate::models::{EnergyType, PedalCounters};
use chrono::NaiveDateTime;
use std::collections::HashMap;

/// Window in which a secondary press duplicates a primary press
pub const DUPLICATE_PRESS_WINDOW_SECS: i64 = 2;

/// Rising/falling edge tracker for one level signal
#[derive(Debug, Clone, Default)]
pub struct EdgeDetector {
    level: i32,
    pressed_at: Option<NaiveDateTime>,
}

/// What a new level sample did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    /// Release completing a press that began at the given time
    Released(NaiveDateTime),
    None,
}

impl EdgeDetector {
    pub fn observe(&mut self, level: i32, at: NaiveDateTime) -> Edge {
        let previous = std::mem::replace(&mut self.level, level);
        match (previous, level) {
            (0, 1) => {
                self.pressed_at = Some(at);
                Edge::Pressed
            }
            (1, 0) => match self.pressed_at.take() {
                Some(start) => Edge::Released(start),
                None => Edge::None,
            },
            _ => Edge::None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct PedalChannel {
    primary: EdgeDetector,
    secondary: EdgeDetector,
    last_primary_press: Option<NaiveDateTime>,
}

impl PedalChannel {
    /// Returns true when a countable press completed
    fn observe(&mut self, is_primary: bool, level: i32, at: NaiveDateTime) -> bool {
        if is_primary {
            match self.primary.observe(level, at) {
                Edge::Pressed => {
                    self.last_primary_press = Some(at);
                    false
                }
                Edge::Released(_) => true,
                Edge::None => false,
            }
        } else {
            match self.secondary.observe(level, at) {
                Edge::Released(start) => !self.duplicates_primary(start),
                _ => false,
            }
        }
    }

    fn duplicates_primary(&self, press: NaiveDateTime) -> bool {
        self.last_primary_press
            .map(|p| (press - p).num_seconds().abs() <= DUPLICATE_PRESS_WINDOW_SECS)
            .unwrap_or(false)
    }
}

/// Press counters for every pedal and clutch
#[derive(Debug, Clone, Default)]
pub struct PedalTracker {
    channels: HashMap<PedalKind, PedalChannel>,
}

impl PedalTracker {
    /// Feed one pedal sample; returns the pedal whose press just completed
    pub fn observe(
        &mut self,
        kind: PedalKind,
        is_primary: bool,
        level: i32,
        at: NaiveDateTime,
    ) -> Option<PedalKind> {
        let channel = self.channels.entry(kind).or_default();
        channel.observe(is_primary, level, at).then_some(kind)
    }
}

/// Add one completed press to the matching counter
pub fn bump(counters: &mut PedalCounters, kind: PedalKind) {
    let slot = match kind {
        PedalKind::FootClutch => &mut counters.foot_clutch,
        PedalKind::EndoscopePedal => &mut counters.endoscope_pedal,
        PedalKind::EnergyPedal => &mut counters.energy_pedal,
        PedalKind::LeftHandClutch => &mut counters.left_hand_clutch,
        PedalKind::RightHandClutch => &mut counters.right_hand_clutch,
    };
    *slot += 1;
}

/// Energy output transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyEdge {
    Start,
    Stop { active_time: i32, grips_active_time: i32 },
}

#[derive(Debug, Clone, Copy, Default)]
struct EnergyLevels {
    start_flag: i32,
    stop_flag: i32,
}

/// Energy activation edges per (arm, energy type).
///
/// `p2` rising to 1 starts output; `p1` rising to 1 stops it and carries
/// the reported active times in `p3`/`p4`.
#[derive(Debug, Clone, Default)]
pub struct EnergyTracker {
    levels: HashMap<(usize, EnergyType), EnergyLevels>,
}

impl EnergyTracker {
    pub fn observe(&mut self, arm: usize, energy_type: EnergyType, params: [i32; 4]) -> Vec<EnergyEdge> {
        let [p1, p2, p3, p4] = params;
        let levels = self.levels.entry((arm, energy_type)).or_default();
        let mut edges = Vec::new();

        if levels.start_flag != 1 && p2 == 1 {
            edges.push(EnergyEdge::Start);
        }
        if levels.stop_flag != 1 && p1 == 1 {
            edges.push(EnergyEdge::Stop {
                active_time: p3,
                grips_active_time: p4,
            });
        }
        levels.start_flag = p2;
        levels.stop_flag = p1;
        edges
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }
}
