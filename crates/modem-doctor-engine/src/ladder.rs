//! Escalation ladder.
//!
//! The disconnect policy as an explicit transition table over
//! `(rung, probe outcome)`:
//!
//! | Rung              | Outcome | Next rung         | Action            |
//! |-------------------|---------|-------------------|-------------------|
//! | Healthy           | up      | Healthy           | none              |
//! | Healthy           | down    | InterfaceRestart  | interface restart |
//! | InterfaceRestart  | down    | AirplaneToggle    | airplane toggle   |
//! | AirplaneToggle    | down    | HardReset         | hard reset        |
//! | HardReset         | down    | HardReset         | hard reset        |
//! | any but Healthy   | up      | Healthy           | none, recovered   |
//!
//! Hard reset is the top rung; a link that stays down keeps getting hard
//! resets (subject to the configured cap, enforced by the controller).

use crate::modem::RemedialAction;

/// Position on the ladder. The discriminant is the published escalation
/// level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rung {
    #[default]
    Healthy = 0,
    InterfaceRestart = 1,
    AirplaneToggle = 2,
    HardReset = 3,
}

impl Rung {
    pub fn level(self) -> u8 {
        self as u8
    }

    /// Clamped: anything above the top rung is the top rung.
    pub fn from_level(level: u8) -> Rung {
        match level {
            0 => Rung::Healthy,
            1 => Rung::InterfaceRestart,
            2 => Rung::AirplaneToggle,
            _ => Rung::HardReset,
        }
    }

    /// The remediation performed on entering this rung.
    pub fn action(self) -> Option<RemedialAction> {
        match self {
            Rung::Healthy => None,
            Rung::InterfaceRestart => Some(RemedialAction::InterfaceRestart),
            Rung::AirplaneToggle => Some(RemedialAction::AirplaneToggle),
            Rung::HardReset => Some(RemedialAction::HardReset),
        }
    }

    pub fn is_top(self) -> bool {
        self == Rung::HardReset
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: Rung,
    pub action: Option<RemedialAction>,
    /// The link came back while an escalation was in progress.
    pub recovered: bool,
}

/// One step of the table.
pub fn step(current: Rung, outcome: Outcome) -> Transition {
    match (current, outcome) {
        (Rung::Healthy, Outcome::Up) => Transition {
            next: Rung::Healthy,
            action: None,
            recovered: false,
        },
        (_, Outcome::Up) => Transition {
            next: Rung::Healthy,
            action: None,
            recovered: true,
        },
        (rung, Outcome::Down) => {
            let next = Rung::from_level(rung.level().saturating_add(1));
            Transition {
                next,
                action: next.action(),
                recovered: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn down_climbs_one_rung_at_a_time() {
        let mut rung = Rung::Healthy;
        let mut actions = Vec::new();
        for expected in 1..=3u8 {
            let t = step(rung, Outcome::Down);
            assert_eq!(t.next.level(), rung.level() + 1);
            assert_eq!(t.next.level(), expected);
            actions.push(t.action.unwrap());
            rung = t.next;
        }
        assert_eq!(
            actions,
            vec![
                RemedialAction::InterfaceRestart,
                RemedialAction::AirplaneToggle,
                RemedialAction::HardReset,
            ]
        );
    }

    #[test]
    fn top_rung_repeats_hard_reset() {
        let t = step(Rung::HardReset, Outcome::Down);
        assert_eq!(t.next, Rung::HardReset);
        assert_eq!(t.action, Some(RemedialAction::HardReset));
        assert!(!t.recovered);
    }

    #[test]
    fn up_always_returns_to_healthy() {
        for rung in [
            Rung::InterfaceRestart,
            Rung::AirplaneToggle,
            Rung::HardReset,
        ] {
            let t = step(rung, Outcome::Up);
            assert_eq!(t.next, Rung::Healthy);
            assert_eq!(t.action, None);
            assert!(t.recovered);
        }
    }

    #[test]
    fn healthy_and_up_is_a_no_op() {
        let t = step(Rung::Healthy, Outcome::Up);
        assert_eq!(t.next, Rung::Healthy);
        assert!(!t.recovered);
        assert!(t.action.is_none());
    }

    #[test]
    fn level_round_trips_and_clamps() {
        for level in 0..=3 {
            assert_eq!(Rung::from_level(level).level(), level);
        }
        assert_eq!(Rung::from_level(9), Rung::HardReset);
        assert!(Rung::from_level(200).is_top());
    }
}
