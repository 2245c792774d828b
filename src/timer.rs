//! Per-lobby timers
//!
//! The core never sleeps. When a lobby wants something to happen later it
//! hands the host an [`AlarmMessage`] and a delay through its
//! `schedule_alarm` callback, and the host feeds the alarm back once the
//! delay elapses. Each armed timer carries a generation number; re-arming
//! or disarming a kind invalidates every earlier alarm of that kind, so a
//! late alarm is recognized as stale and ignored.

use enum_map::{Enum, EnumMap};
use serde::{Deserialize, Serialize};

use crate::lobby_code::LobbyCode;

/// The kinds of timer a lobby can have armed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
pub enum TimerKind {
    /// The current turn holder's time to submit a guess
    Turn,
    /// The voting phase
    Voting,
    /// The results display before returning to the waiting room
    Results,
}

/// A scheduled event to be delivered back to a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmMessage {
    /// The lobby the alarm belongs to
    pub code: LobbyCode,
    /// Which timer fired
    pub kind: TimerKind,
    /// The generation the timer had when it was armed
    pub generation: u64,
}

/// The armed timers of a single lobby, at most one per kind
#[derive(Debug, Default)]
pub struct Timers {
    armed: EnumMap<TimerKind, Option<u64>>,
    generation: u64,
}

impl Timers {
    /// Arms a timer of the given kind, cancelling any earlier one of that kind
    ///
    /// # Returns
    ///
    /// The generation to embed in the scheduled alarm
    pub fn arm(&mut self, kind: TimerKind) -> u64 {
        self.generation += 1;
        self.armed[kind] = Some(self.generation);
        self.generation
    }

    /// Cancels the armed timer of the given kind, if any
    pub fn disarm(&mut self, kind: TimerKind) {
        self.armed[kind] = None;
    }

    /// Cancels every armed timer
    pub fn disarm_all(&mut self) {
        self.armed = EnumMap::default();
    }

    /// Whether a timer of the given kind is currently armed
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed[kind].is_some()
    }

    /// Consumes a fired alarm
    ///
    /// # Returns
    ///
    /// `true` if the alarm belongs to the currently armed timer of its kind,
    /// which is then disarmed; `false` if the alarm is stale
    pub fn take(&mut self, kind: TimerKind, generation: u64) -> bool {
        if self.armed[kind] == Some(generation) {
            self.armed[kind] = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_timers_are_disarmed() {
        let timers = Timers::default();
        assert!(!timers.is_armed(TimerKind::Turn));
        assert!(!timers.is_armed(TimerKind::Voting));
        assert!(!timers.is_armed(TimerKind::Results));
    }

    #[test]
    fn test_take_fires_once() {
        let mut timers = Timers::default();
        let generation = timers.arm(TimerKind::Turn);

        assert!(timers.take(TimerKind::Turn, generation));
        assert!(!timers.take(TimerKind::Turn, generation));
        assert!(!timers.is_armed(TimerKind::Turn));
    }

    #[test]
    fn test_rearm_supersedes_previous_alarm() {
        let mut timers = Timers::default();
        let first = timers.arm(TimerKind::Turn);
        let second = timers.arm(TimerKind::Turn);

        assert_ne!(first, second);
        assert!(!timers.take(TimerKind::Turn, first));
        assert!(timers.take(TimerKind::Turn, second));
    }

    #[test]
    fn test_disarm_makes_alarm_stale() {
        let mut timers = Timers::default();
        let generation = timers.arm(TimerKind::Voting);
        timers.disarm(TimerKind::Voting);

        assert!(!timers.take(TimerKind::Voting, generation));
    }

    #[test]
    fn test_kinds_are_independent() {
        let mut timers = Timers::default();
        let turn = timers.arm(TimerKind::Turn);
        let voting = timers.arm(TimerKind::Voting);

        assert!(!timers.take(TimerKind::Voting, turn));
        assert!(timers.take(TimerKind::Turn, turn));
        assert!(timers.take(TimerKind::Voting, voting));
    }

    #[test]
    fn test_disarm_all() {
        let mut timers = Timers::default();
        let turn = timers.arm(TimerKind::Turn);
        let results = timers.arm(TimerKind::Results);
        timers.disarm_all();

        assert!(!timers.take(TimerKind::Turn, turn));
        assert!(!timers.take(TimerKind::Results, results));
    }

    #[test]
    fn test_disarmed_generation_not_reused() {
        let mut timers = Timers::default();
        let first = timers.arm(TimerKind::Results);
        timers.disarm(TimerKind::Results);
        let second = timers.arm(TimerKind::Results);

        assert!(!timers.take(TimerKind::Results, first));
        assert!(timers.take(TimerKind::Results, second));
    }
}
