//! Player name validation
//!
//! Usernames are display-only and need not be unique within a lobby, but
//! they must be non-empty, short and appropriate.

use rustrict::CensorStr;
use serde::Serialize;
use thiserror::Error;

use crate::constants::names::MAX_LENGTH;

/// Errors that can occur during username validation
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The name is empty or contains only whitespace
    #[error("Username cannot be empty")]
    Empty,
    /// The name contains inappropriate content
    #[error("Username is inappropriate")]
    Sinful,
    /// The name exceeds the maximum allowed length
    #[error("Username is too long")]
    TooLong,
}

/// Validates a requested username and returns its cleaned form
///
/// # Errors
///
/// * `Error::Empty` - Name is empty after trimming whitespace
/// * `Error::TooLong` - Name exceeds [`MAX_LENGTH`] characters
/// * `Error::Sinful` - Name contains inappropriate content
pub fn validate(name: &str) -> Result<String, Error> {
    let name = rustrict::trim_whitespace(name);
    if name.is_empty() {
        return Err(Error::Empty);
    }
    if name.chars().count() > MAX_LENGTH {
        return Err(Error::TooLong);
    }
    if name.is_inappropriate() {
        return Err(Error::Sinful);
    }
    Ok(name.to_owned())
}
