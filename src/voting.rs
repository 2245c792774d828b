//! Votes, vote conclusion and scoring
//!
//! This module collects the ballots of a voting phase, produces the live
//! tally shown to players, picks who is voted out and awards points once
//! the imposter is caught, survives or walks away.

use std::{cmp::Reverse, collections::HashMap};

use itertools::Itertools;
use serde::Serialize;

use crate::{
    connection::Id,
    constants::game::{CAUGHT_POINTS, SURVIVED_POINTS},
    player::{Player, Roster},
};

/// The ballots cast during one voting phase, in casting order
#[derive(Debug, Default, Clone)]
pub struct Votes {
    ballots: Vec<(Id, Id)>,
}

impl Votes {
    /// Records a vote, replacing any earlier vote by the same voter
    pub fn cast(&mut self, voter: Id, target: Id) {
        match self.ballots.iter_mut().find(|(v, _)| *v == voter) {
            Some(ballot) => ballot.1 = target,
            None => self.ballots.push((voter, target)),
        }
    }

    /// Withdraws the voter's ballot, if any
    pub fn retract(&mut self, voter: Id) {
        self.ballots.retain(|(v, _)| *v != voter);
    }

    /// Number of ballots cast
    pub fn ballot_count(&self) -> usize {
        self.ballots.len()
    }

    /// Number of votes received per target
    pub fn tally(&self) -> HashMap<Id, usize> {
        self.ballots.iter().map(|(_, target)| *target).counts()
    }

    /// Everyone who has voted, in casting order
    pub fn voters(&self) -> Vec<Id> {
        self.ballots.iter().map(|(voter, _)| *voter).collect_vec()
    }

    /// Picks the candidate who is voted out
    ///
    /// The candidate with the most votes is voted out. Ties for the most
    /// votes, including the case where nobody voted at all, are broken
    /// uniformly at random among the tied candidates. Votes for anyone
    /// outside `candidates` are ignored.
    ///
    /// # Returns
    ///
    /// `None` only when there are no candidates
    pub fn conclude(&self, candidates: &[Id]) -> Option<Id> {
        let tally = self.tally();
        let count = |id: &Id| tally.get(id).copied().unwrap_or_default();
        let max = candidates.iter().map(count).max()?;
        let tied = candidates
            .iter()
            .copied()
            .filter(|id| count(id) == max)
            .collect_vec();

        tied.get(fastrand::usize(..tied.len())).copied()
    }
}

/// How a game ended for the imposter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Verdict {
    /// The imposter was voted out
    Caught,
    /// Someone else was voted out
    Survived,
    /// The imposter disconnected before the vote concluded
    Abandoned,
}

impl Verdict {
    /// Whether the imposter won the game
    pub fn imposter_won(self) -> bool {
        matches!(self, Self::Survived)
    }
}

/// Awards points for a finished game
///
/// When the imposter is caught or abandons the game, every active
/// non-imposter gains [`CAUGHT_POINTS`]. When the imposter survives, only
/// the imposter gains [`SURVIVED_POINTS`].
pub fn award(roster: &mut Roster, verdict: Verdict) {
    for player in roster.iter_mut() {
        match verdict {
            Verdict::Caught | Verdict::Abandoned if player.is_active() && !player.is_imposter => {
                player.score += CAUGHT_POINTS;
            }
            Verdict::Survived if player.is_imposter => {
                player.score += SURVIVED_POINTS;
            }
            _ => {}
        }
    }
}

/// A player's line in the final results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    /// Connection id
    pub id: Id,
    /// Display name
    pub username: String,
    /// Whether the player hosts the lobby
    pub is_host: bool,
    /// Score after this game
    pub score: u64,
    /// Whether the player was the imposter
    pub was_imposter: bool,
    /// Whether the player left during the game
    pub has_left: bool,
}

/// Every player's standing, highest score first
///
/// Players with equal scores keep their join order.
pub fn standings<'a>(players: impl Iterator<Item = &'a Player>) -> Vec<Standing> {
    players
        .map(|p| Standing {
            id: p.id(),
            username: p.username().to_owned(),
            is_host: p.is_host(),
            score: p.score(),
            was_imposter: p.is_imposter(),
            has_left: p.has_left(),
        })
        .sorted_by_key(|s| Reverse(s.score))
        .collect_vec()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn ids(count: usize) -> Vec<Id> {
        (0..count).map(|_| Id::new()).collect_vec()
    }

    fn roster_with_imposter(count: usize, imposter: usize) -> (Roster, Vec<Id>) {
        let ids = ids(count);
        let mut roster = Roster::default();
        for (i, id) in ids.iter().enumerate() {
            roster.push(Player::new(*id, format!("P{i}"), false));
        }
        roster.assign_imposter(imposter);
        (roster, ids)
    }

    fn scores(roster: &Roster) -> Vec<u64> {
        roster.iter().map(Player::score).collect_vec()
    }

    #[test]
    fn test_tally_and_voters() {
        let p = ids(3);
        let mut votes = Votes::default();
        votes.cast(p[0], p[2]);
        votes.cast(p[1], p[2]);

        assert_eq!(votes.tally().get(&p[2]), Some(&2));
        assert_eq!(votes.voters(), vec![p[0], p[1]]);
    }

    #[test]
    fn test_retract_drops_ballot() {
        let p = ids(3);
        let mut votes = Votes::default();
        votes.cast(p[0], p[2]);
        votes.cast(p[1], p[0]);
        votes.retract(p[1]);
        votes.retract(p[2]);

        assert_eq!(votes.voters(), vec![p[0]]);
        assert_eq!(votes.tally().get(&p[0]), None);
        assert_eq!(votes.conclude(&[p[0], p[2]]), Some(p[2]));
    }

    #[test]
    fn test_cast_replaces_previous_vote() {
        let p = ids(3);
        let mut votes = Votes::default();
        votes.cast(p[0], p[1]);
        votes.cast(p[0], p[2]);

        assert_eq!(votes.ballot_count(), 1);
        assert_eq!(votes.tally().get(&p[2]), Some(&1));
        assert_eq!(votes.tally().get(&p[1]), None);
    }

    #[test]
    fn test_conclude_strict_majority_is_deterministic() {
        let p = ids(3);
        let mut votes = Votes::default();
        votes.cast(p[0], p[2]);
        votes.cast(p[1], p[2]);

        for _ in 0..20 {
            assert_eq!(votes.conclude(&p), Some(p[2]));
        }
    }

    #[test]
    fn test_conclude_tie_picks_among_tied() {
        let p = ids(4);
        let mut votes = Votes::default();
        votes.cast(p[0], p[1]);
        votes.cast(p[1], p[0]);

        for _ in 0..50 {
            let out = votes.conclude(&p).unwrap();
            assert!(out == p[0] || out == p[1]);
        }
    }

    #[test]
    fn test_conclude_without_votes_picks_any_candidate() {
        let p = ids(3);
        let votes = Votes::default();

        for _ in 0..50 {
            assert!(p.contains(&votes.conclude(&p).unwrap()));
        }
    }

    #[test]
    fn test_conclude_ignores_votes_for_non_candidates() {
        let p = ids(3);
        let outsider = Id::new();
        let mut votes = Votes::default();
        votes.cast(p[0], outsider);
        votes.cast(p[1], outsider);
        votes.cast(p[2], p[1]);

        assert_eq!(votes.conclude(&p), Some(p[1]));
    }

    #[test]
    fn test_conclude_no_candidates() {
        assert_eq!(Votes::default().conclude(&[]), None);
    }

    #[test]
    fn test_award_caught() {
        let (mut roster, _) = roster_with_imposter(4, 2);
        award(&mut roster, Verdict::Caught);
        assert_eq!(scores(&roster), vec![1, 1, 0, 1]);
    }

    #[test]
    fn test_award_survived() {
        let (mut roster, _) = roster_with_imposter(4, 2);
        award(&mut roster, Verdict::Survived);
        assert_eq!(scores(&roster), vec![0, 0, 3, 0]);
    }

    #[test]
    fn test_award_abandoned_skips_departed_and_spectators() {
        let (mut roster, ids) = roster_with_imposter(4, 0);
        roster.mark_left(ids[0]);
        roster.mark_left(ids[1]);
        roster.push(Player::new(Id::new(), "Late".to_owned(), true));

        award(&mut roster, Verdict::Abandoned);
        assert_eq!(scores(&roster), vec![0, 0, 1, 1, 0]);
    }

    #[test]
    fn test_verdict_imposter_won() {
        assert!(Verdict::Survived.imposter_won());
        assert!(!Verdict::Caught.imposter_won());
        assert!(!Verdict::Abandoned.imposter_won());
    }

    #[test]
    fn test_standings_sorted_descending_and_stable() {
        let (mut roster, ids) = roster_with_imposter(3, 1);
        award(&mut roster, Verdict::Survived);

        let standings = standings(roster.iter());
        assert_eq!(standings[0].id, ids[1]);
        assert!(standings[0].was_imposter);
        assert_eq!(standings[0].score, 3);
        assert_eq!(standings[1].id, ids[0]);
        assert_eq!(standings[2].id, ids[2]);
    }
}
