//! Configuration constants for the imposter game system
//!
//! This module contains all the limits and fixed values used throughout
//! the lobby and game logic so that validation and gameplay share one
//! source of truth.

/// Lobby configuration constants
pub mod lobby {
    /// Minimum number of players needed to start a game
    pub const MIN_PLAYERS: usize = 3;
    /// Largest `max_players` value a lobby may be created with
    pub const MAX_PLAYER_CAP: usize = 12;
    /// `max_players` used when the creator does not choose one
    pub const DEFAULT_MAX_PLAYERS: usize = 5;
    /// Maximum length of a lobby name in characters
    pub const MAX_NAME_LENGTH: usize = 30;
    /// Maximum length of a lobby password in characters
    pub const MAX_PASSWORD_LENGTH: usize = 50;
    /// Maximum number of lobbies sent in a single lobby list
    pub const LIST_LIMIT: usize = 100;
}

/// Lobby code configuration constants
pub mod code {
    /// Number of characters in a lobby code
    pub const LENGTH: usize = 6;
    /// Characters a lobby code is made of
    pub const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    /// Number of random codes tried before lobby creation gives up
    pub const MAX_ATTEMPTS: usize = 32;
}

/// Player name configuration constants
pub mod names {
    /// Maximum length of a username in characters
    pub const MAX_LENGTH: usize = 20;
}

/// Turn and round configuration constants
pub mod game {
    /// Rounds played when exactly [`crate::constants::lobby::MIN_PLAYERS`] players start
    pub const SMALL_GAME_ROUNDS: u8 = 3;
    /// Rounds played when more players start
    pub const LARGE_GAME_ROUNDS: u8 = 2;
    /// Maximum length of a guess in characters
    pub const MAX_MESSAGE_LENGTH: usize = 20;
    /// Text recorded when the turn holder runs out of time
    pub const TIMEOUT_TEXT: &str = "(Time out)";
    /// Text recorded when the turn holder leaves mid-turn
    pub const LEFT_TEXT: &str = "(Player left)";
    /// Points for every active non-imposter when the imposter is caught or leaves
    pub const CAUGHT_POINTS: u64 = 1;
    /// Points for the imposter when they survive the vote
    pub const SURVIVED_POINTS: u64 = 3;
}

/// Free-form chat configuration constants
pub mod chat {
    /// Maximum length of a chat message in characters
    pub const MAX_LENGTH: usize = 100;
    /// Number of chat messages retained per lobby
    pub const HISTORY: usize = 50;
}

/// Timer configuration constants, all in seconds
pub mod timer {
    /// Default time a player has to submit a guess
    pub const DEFAULT_TURN: u64 = 10;
    /// Minimum configurable turn time
    pub const MIN_TURN: u64 = 5;
    /// Maximum configurable turn time
    pub const MAX_TURN: u64 = 60;
    /// Default length of the voting phase
    pub const DEFAULT_VOTING: u64 = 20;
    /// Minimum configurable voting time
    pub const MIN_VOTING: u64 = 5;
    /// Maximum configurable voting time
    pub const MAX_VOTING: u64 = 120;
    /// Default time results stay visible before the lobby resets
    pub const DEFAULT_RESULTS: u64 = 8;
    /// Minimum configurable results time
    pub const MIN_RESULTS: u64 = 1;
    /// Maximum configurable results time
    pub const MAX_RESULTS: u64 = 30;
}
