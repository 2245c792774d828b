//! Runtime configuration for lobbies and their timers
//!
//! Limits that never change at runtime live in [`crate::constants`]; the
//! values here are chosen per registry (timers) or per lobby (options) and
//! are validated with `garde` before use.

use std::time::Duration;

use garde::Validate;
use heck::ToTitleCase;
use serde::{Deserialize, Serialize};

use crate::constants;

type ValidationResult = garde::Result;

/// Validates that a duration falls within specified bounds
///
/// # Errors
///
/// Returns a `garde::Error` naming the field if the duration is outside
/// the inclusive range `[MIN_SECONDS, MAX_SECONDS]`.
fn validate_duration<const MIN_SECONDS: u64, const MAX_SECONDS: u64>(
    field: &'static str,
    val: &Duration,
) -> ValidationResult {
    if (MIN_SECONDS..=MAX_SECONDS).contains(&val.as_secs()) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "{field} is outside of the bounds [{MIN_SECONDS},{MAX_SECONDS}]",
        )))
    }
}

fn validate_turn(val: &Duration) -> ValidationResult {
    validate_duration::<{ constants::timer::MIN_TURN }, { constants::timer::MAX_TURN }>("turn", val)
}

fn validate_voting(val: &Duration) -> ValidationResult {
    validate_duration::<{ constants::timer::MIN_VOTING }, { constants::timer::MAX_VOTING }>(
        "voting", val,
    )
}

fn validate_results(val: &Duration) -> ValidationResult {
    validate_duration::<{ constants::timer::MIN_RESULTS }, { constants::timer::MAX_RESULTS }>(
        "results", val,
    )
}

/// Durations of the timed phases of a game
///
/// Serialized as milliseconds so hosts can load them from JSON.
#[serde_with::serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
    /// Time a player has to submit a guess before it is recorded as a time out
    #[garde(custom(|v, _| validate_turn(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub turn: Duration,
    /// Length of the voting phase
    #[garde(custom(|v, _| validate_voting(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub voting: Duration,
    /// Time the results stay visible before the lobby returns to waiting
    #[garde(custom(|v, _| validate_results(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub results: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            turn: Duration::from_secs(constants::timer::DEFAULT_TURN),
            voting: Duration::from_secs(constants::timer::DEFAULT_VOTING),
            results: Duration::from_secs(constants::timer::DEFAULT_RESULTS),
        }
    }
}

fn default_max_players() -> usize {
    constants::lobby::DEFAULT_MAX_PLAYERS
}

/// Settings chosen by the creator of a lobby
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LobbyOptions {
    /// Display name of the lobby (a blank name is replaced by a generated one)
    #[serde(default)]
    #[garde(length(chars, max = constants::lobby::MAX_NAME_LENGTH))]
    pub name: String,
    /// Shared secret required to join, `None` for a public lobby
    #[serde(default)]
    #[garde(length(chars, max = constants::lobby::MAX_PASSWORD_LENGTH))]
    pub password: Option<String>,
    /// Maximum number of connected players
    #[serde(default = "default_max_players")]
    #[garde(range(min = constants::lobby::MIN_PLAYERS, max = constants::lobby::MAX_PLAYER_CAP))]
    pub max_players: usize,
}

impl Default for LobbyOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            password: None,
            max_players: default_max_players(),
        }
    }
}

impl LobbyOptions {
    /// Trims the name and password, dropping a blank password and
    /// generating a name when none was given
    #[must_use]
    pub fn normalized(self) -> Self {
        let name = self.name.trim();
        let name = if name.is_empty() {
            generated_name()
        } else {
            name.to_owned()
        };
        let password = self
            .password
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty());

        Self {
            name,
            password,
            max_players: self.max_players,
        }
    }
}

/// Generates a lobby name such as "Brave Otter Lobby"
fn generated_name() -> String {
    std::iter::repeat_with(|| petname::petname(2, " "))
        .take(8)
        .flatten()
        .map(|pet| format!("{pet} lobby").to_title_case())
        .find(|name| name.chars().count() <= constants::lobby::MAX_NAME_LENGTH)
        .unwrap_or_else(|| "Secret Lobby".to_owned())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings_are_valid() {
        let timings = Timings::default();
        assert!(timings.validate().is_ok());
        assert_eq!(timings.turn, Duration::from_secs(10));
        assert_eq!(timings.voting, Duration::from_secs(20));
        assert_eq!(timings.results, Duration::from_secs(8));
    }

    #[test]
    fn test_turn_too_short() {
        let timings = Timings {
            turn: Duration::from_secs(1),
            ..Timings::default()
        };
        assert!(timings.validate().is_err());
    }

    #[test]
    fn test_voting_too_long() {
        let timings = Timings {
            voting: Duration::from_secs(600),
            ..Timings::default()
        };
        assert!(timings.validate().is_err());
    }

    #[test]
    fn test_timings_deserialize_milliseconds() {
        let timings: Timings =
            serde_json::from_str(r#"{"turn":15000,"voting":20000,"results":8000}"#).unwrap();
        assert_eq!(timings.turn, Duration::from_secs(15));
        assert!(timings.validate().is_ok());
    }

    #[test]
    fn test_lobby_options_defaults() {
        let options: LobbyOptions = serde_json::from_str(r#"{"name":"Friday"}"#).unwrap();
        assert_eq!(options.max_players, 5);
        assert_eq!(options.password, None);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_lobby_options_player_bounds() {
        let too_small = LobbyOptions {
            max_players: 2,
            ..LobbyOptions::default()
        };
        assert!(too_small.validate().is_err());

        let too_large = LobbyOptions {
            max_players: 13,
            ..LobbyOptions::default()
        };
        assert!(too_large.validate().is_err());
    }

    #[test]
    fn test_lobby_options_name_too_long() {
        let options = LobbyOptions {
            name: "x".repeat(31),
            ..LobbyOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_normalized_trims_and_drops_blank_password() {
        let options = LobbyOptions {
            name: "  Friday  ".to_owned(),
            password: Some("   ".to_owned()),
            max_players: 4,
        }
        .normalized();

        assert_eq!(options.name, "Friday");
        assert_eq!(options.password, None);
        assert_eq!(options.max_players, 4);
    }

    #[test]
    fn test_normalized_generates_name() {
        let options = LobbyOptions::default().normalized();
        assert!(!options.name.is_empty());
        assert!(options.name.ends_with("Lobby"));
    }
}
