//! # Imposter Game Library
//!
//! This library provides the core logic for a real-time imposter party game.
//! Players gather in code-identified lobbies, one of them is secretly made
//! the imposter, everyone takes turns hinting at a hidden card, and the
//! lobby votes on who it thinks the imposter is.
//!
//! The core is transport agnostic. Events leave through the [`Tunnel`]
//! trait, delays are requested through a `schedule_alarm` callback and fired
//! alarms come back in through [`Registry::receive_alarm`].

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
use derive_where::derive_where;
use itertools::Itertools;
use serde::Serialize;

pub mod card;
pub mod config;
pub mod connection;
pub mod constants;
pub mod lobby;
pub mod lobby_code;
pub mod names;
pub mod player;
pub mod registry;
pub mod session;
pub mod timer;
pub mod voting;

pub use connection::Id;
pub use lobby::UpdateMessage;
pub use lobby_code::LobbyCode;
pub use registry::{IncomingMessage, Registry};
pub use session::Tunnel;
pub use timer::AlarmMessage;

/// A truncated vector that maintains the exact count while limiting displayed items
///
/// Used for the public lobby list, which shows at most a fixed number of
/// lobbies while still reporting how many are open.
#[derive(Debug, Clone, Serialize)]
#[derive_where(Default)]
#[serde(rename_all = "camelCase")]
pub struct TruncatedVec<T> {
    /// The exact total count of items
    exact_count: usize,
    /// The truncated list of items (up to the limit)
    items: Vec<T>,
}

impl<T> TruncatedVec<T> {
    /// Creates a new truncated vector from an iterator
    ///
    /// # Arguments
    ///
    /// * `list` - An iterator over items to include
    /// * `limit` - Maximum number of items to include in the truncated vector
    /// * `exact_count` - The exact total count of items (may be larger than limit)
    pub fn new<I: Iterator<Item = T>>(list: I, limit: usize, exact_count: usize) -> Self {
        let items = list.take(limit).collect_vec();
        Self { exact_count, items }
    }

    /// Returns the exact count of items
    pub fn exact_count(&self) -> usize {
        self.exact_count
    }

    /// Returns the truncated items
    pub fn items(&self) -> &[T] {
        &self.items
    }
}
