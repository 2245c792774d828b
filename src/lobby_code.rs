//! Lobby code generation and parsing
//!
//! Lobby codes are short strings players read out to each other, such as
//! `X1Y2Z3`. They are made of uppercase letters and digits, and parsing is
//! case-insensitive so a code typed in lowercase still finds its lobby.

use std::{fmt::Display, str::FromStr};

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use crate::constants::code::{ALPHABET, LENGTH};

/// The short identifier of a lobby
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr,
)]
pub struct LobbyCode([u8; LENGTH]);

/// Errors that can occur when parsing a lobby code
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The code does not have exactly the right number of characters
    #[error("lobby code must be {LENGTH} characters long")]
    Length,
    /// The code contains something other than letters and digits
    #[error("lobby code may only contain letters and digits")]
    Character,
}

impl LobbyCode {
    /// Creates a new random lobby code
    ///
    /// Uniqueness is not guaranteed here; the registry retries on collision.
    pub fn new() -> Self {
        Self(std::array::from_fn(|_| {
            ALPHABET[fastrand::usize(..ALPHABET.len())]
        }))
    }
}

impl Default for LobbyCode {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for LobbyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.iter().try_for_each(|b| write!(f, "{}", char::from(*b)))
    }
}

impl FromStr for LobbyCode {
    type Err = Error;

    /// Parses a lobby code, ignoring surrounding whitespace and case
    ///
    /// # Errors
    ///
    /// Returns [`Error::Length`] for a code of the wrong length and
    /// [`Error::Character`] for a code with non-alphanumeric characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.trim().as_bytes();
        let bytes: [u8; LENGTH] = bytes.try_into().map_err(|_| Error::Length)?;
        if !bytes.iter().all(u8::is_ascii_alphanumeric) {
            return Err(Error::Character);
        }
        Ok(Self(bytes.map(|b| b.to_ascii_uppercase())))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_lobby_code_new_uses_alphabet() {
        for _ in 0..100 {
            let code = LobbyCode::new().to_string();
            assert_eq!(code.len(), LENGTH);
            assert!(code.bytes().all(|b| ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_lobby_code_from_str() {
        let code = LobbyCode::from_str("X1Y2Z3").unwrap();
        assert_eq!(code.to_string(), "X1Y2Z3");
    }

    #[test]
    fn test_lobby_code_from_str_is_case_insensitive() {
        let lower = LobbyCode::from_str(" x1y2z3 ").unwrap();
        let upper = LobbyCode::from_str("X1Y2Z3").unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn test_lobby_code_from_str_invalid() {
        assert_eq!(LobbyCode::from_str(""), Err(Error::Length));
        assert_eq!(LobbyCode::from_str("ABCDEFG"), Err(Error::Length));
        assert_eq!(LobbyCode::from_str("AB-DEF"), Err(Error::Character));
        assert_eq!(LobbyCode::from_str("ÄBCDE"), Err(Error::Character));
    }

    #[test]
    fn test_lobby_code_serialization() {
        let code = LobbyCode::from_str("ABC123").unwrap();
        let serialized = serde_json::to_string(&code).unwrap();
        assert_eq!(serialized, "\"ABC123\"");

        let deserialized: LobbyCode = serde_json::from_str("\"abc123\"").unwrap();
        assert_eq!(deserialized, code);
    }

    #[test]
    fn test_lobby_code_deserialization_error() {
        assert!(serde_json::from_str::<LobbyCode>("123").is_err());
        assert!(serde_json::from_str::<LobbyCode>("\"12\"").is_err());
    }
}
