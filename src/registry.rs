//! Lobby registry and message routing
//!
//! The registry is the shared entry point the transport talks to. It maps
//! lobby codes to lobbies and connection ids to their lobby membership,
//! routes every inbound action and alarm to the right lobby, and pushes the
//! public lobby list to every online connection whenever it changes.
//!
//! Each lobby sits behind its own mutex, so actions on one lobby are
//! serialized while different lobbies proceed in parallel. Map guards are
//! never held while a lobby is locked, and the lobby list is only published
//! once the lobby lock is released.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use garde::Validate;
use itertools::Itertools;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    TruncatedVec,
    card::CardCatalog,
    config::{LobbyOptions, Timings},
    connection::Id,
    constants,
    lobby::{self, Lobby, LobbySummary, UpdateMessage},
    lobby_code::LobbyCode,
    names,
    session::Tunnel,
    timer::AlarmMessage,
};

/// Actions sent from clients to the server
#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "action",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum IncomingMessage {
    /// Create a lobby and become its host
    CreateLobby {
        /// Lobby name, generated when blank
        #[serde(default)]
        name: String,
        /// The creator's display name
        username: String,
        /// Optional password
        password: Option<String>,
        /// Maximum number of connected players
        max_players: Option<usize>,
    },
    /// Join an existing lobby
    JoinLobby {
        /// Code of the lobby to join
        code: String,
        /// The joiner's display name
        username: String,
        /// Password, if the lobby has one
        password: Option<String>,
    },
    /// Leave the current lobby
    LeaveLobby,
    /// Remove a player from the lobby, host only
    KickPlayer {
        /// The player to remove
        target_id: Id,
    },
    /// Start a game, host only
    StartGame,
    /// Submit a guess on the sender's turn
    SubmitMessage {
        /// The guess
        text: String,
    },
    /// Post a chat message
    SubmitAllChat {
        /// The message
        text: String,
    },
    /// Vote someone out
    SubmitVote {
        /// The player voted for
        target_id: Id,
    },
}

/// The lobby a connection belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    /// Code of the lobby
    pub code: LobbyCode,
    /// Display name used in that lobby
    pub username: String,
}

/// Answer to a lobby lookup by code
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyCheck {
    /// Whether a lobby with the code exists
    pub exists: bool,
    /// Whether joining requires a password
    pub requires_password: bool,
    /// The lobby's name, if it exists
    pub name: Option<String>,
}

/// Errors that can occur when routing an action
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The lobby rejected the action
    #[error(transparent)]
    Lobby(#[from] lobby::Error),
    /// No lobby has the given code
    #[error("Lobby not found")]
    NotFound,
    /// The connection is not in a lobby
    #[error("You are not in a lobby")]
    NotInLobby,
    /// The requested lobby settings are out of bounds
    #[error("Invalid lobby settings")]
    InvalidOptions,
    /// No free lobby code could be found
    #[error("Could not create lobby, please try again")]
    CodeSpaceExhausted,
}

impl Error {
    /// Whether the sender is told about this error
    pub fn is_reported(&self) -> bool {
        match self {
            Self::Lobby(error) => error.is_reported(),
            Self::NotFound | Self::InvalidOptions | Self::CodeSpaceExhausted => true,
            Self::NotInLobby => false,
        }
    }
}

impl From<names::Error> for Error {
    fn from(error: names::Error) -> Self {
        Self::Lobby(error.into())
    }
}

/// Every live lobby and every online connection
#[derive(Debug)]
pub struct Registry {
    lobbies: DashMap<LobbyCode, Arc<Mutex<Lobby>>>,
    connections: DashMap<Id, Option<Membership>>,
    timings: Timings,
    catalog: CardCatalog,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry with the default timings and built-in cards
    pub fn new() -> Self {
        Self {
            lobbies: DashMap::new(),
            connections: DashMap::new(),
            timings: Timings::default(),
            catalog: CardCatalog::default(),
        }
    }

    /// Creates an empty registry with custom timings and cards
    ///
    /// # Errors
    ///
    /// Returns the validation report if a duration is out of bounds.
    pub fn with_config(timings: Timings, catalog: CardCatalog) -> Result<Self, garde::Report> {
        if let Err(report) = timings.validate() {
            warn!(%report, "rejected timings");
            return Err(report);
        }
        Ok(Self {
            timings,
            catalog,
            ..Self::new()
        })
    }

    /// The configured timings
    pub fn timings(&self) -> Timings {
        self.timings
    }

    /// Number of live lobbies
    pub fn lobby_count(&self) -> usize {
        self.lobbies.len()
    }

    /// Whether a connection is registered as online
    pub fn is_online(&self, id: Id) -> bool {
        self.connections.contains_key(&id)
    }

    /// The lobby a connection is in, if any
    pub fn membership(&self, id: Id) -> Option<Membership> {
        self.connections.get(&id).and_then(|entry| entry.value().clone())
    }

    fn set_membership(&self, id: Id, membership: Option<Membership>) {
        self.connections.insert(id, membership);
    }

    /// Clears a connection's membership only while it still names `code`
    ///
    /// The connection may have moved to another lobby on its own thread
    /// since `code` was read; that newer membership is left alone.
    fn clear_membership(&self, id: Id, code: LobbyCode) {
        if let Some(mut entry) = self.connections.get_mut(&id) {
            if entry.as_ref().is_some_and(|m| m.code == code) {
                *entry = None;
            }
        }
    }

    fn lobby(&self, code: LobbyCode) -> Option<Arc<Mutex<Lobby>>> {
        self.lobbies.get(&code).map(|entry| Arc::clone(entry.value()))
    }

    /// Runs `f` against a lobby without changing it
    ///
    /// # Returns
    ///
    /// `None` if no live lobby has the code
    pub fn inspect<R>(&self, code: LobbyCode, f: impl FnOnce(&Lobby) -> R) -> Option<R> {
        let lobby = self.lobby(code)?;
        let guard = lobby.lock();
        if guard.is_closed() {
            return None;
        }
        Some(f(&*guard))
    }

    /// Runs an operation on a lobby under its lock
    ///
    /// Afterwards an emptied lobby is removed, and the lobby list is
    /// published if the lobby's entry in it changed.
    fn update_lobby<R, T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        code: LobbyCode,
        tunnel_finder: &F,
        op: impl FnOnce(&mut Lobby) -> R,
    ) -> Option<R> {
        let lobby = self.lobby(code)?;
        let mut guard = lobby.lock();
        if guard.is_closed() {
            return None;
        }

        let before = guard.summary();
        let result = op(&mut *guard);
        let emptied = guard.is_empty();
        let after = if emptied {
            guard.close();
            None
        } else {
            guard.summary()
        };
        drop(guard);

        if emptied {
            self.remove_lobby(code, &lobby);
        }
        if before != after {
            self.publish_lobby_list(tunnel_finder);
        }

        Some(result)
    }

    fn remove_lobby(&self, code: LobbyCode, lobby: &Arc<Mutex<Lobby>>) {
        if self
            .lobbies
            .remove_if(&code, |_, live| Arc::ptr_eq(live, lobby))
            .is_some()
        {
            info!(%code, "lobby destroyed");
        }
    }

    /// Public lobbies that are waiting for players, sorted by name then code
    pub fn list_public_lobbies(&self) -> TruncatedVec<LobbySummary> {
        let lobbies = self
            .lobbies
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect_vec();

        let summaries = lobbies
            .iter()
            .filter_map(|lobby| {
                let lobby = lobby.lock();
                if lobby.is_closed() {
                    None
                } else {
                    lobby.summary()
                }
            })
            .sorted_by(|a, b| a.name.cmp(&b.name).then(a.code.cmp(&b.code)))
            .collect_vec();

        let count = summaries.len();
        TruncatedVec::new(summaries.into_iter(), constants::lobby::LIST_LIMIT, count)
    }

    /// Sends the lobby list to every online connection
    fn publish_lobby_list<T: Tunnel, F: Fn(Id) -> Option<T>>(&self, tunnel_finder: &F) {
        let message = UpdateMessage::LobbyList(self.list_public_lobbies());
        let online = self.connections.iter().map(|entry| *entry.key()).collect_vec();

        for id in online {
            if let Some(tunnel) = tunnel_finder(id) {
                tunnel.send_message(&message);
            }
        }
    }

    fn send_lobby_list<T: Tunnel, F: Fn(Id) -> Option<T>>(&self, id: Id, tunnel_finder: &F) {
        if let Some(tunnel) = tunnel_finder(id) {
            tunnel.send_message(&UpdateMessage::LobbyList(self.list_public_lobbies()));
        }
    }

    /// Looks up a lobby by code
    pub fn check_lobby(&self, code: &str) -> LobbyCheck {
        code.parse::<LobbyCode>()
            .ok()
            .and_then(|code| {
                self.inspect(code, |lobby| LobbyCheck {
                    exists: true,
                    requires_password: lobby.requires_password(),
                    name: Some(lobby.name().to_owned()),
                })
            })
            .unwrap_or(LobbyCheck {
                exists: false,
                requires_password: false,
                name: None,
            })
    }

    /// Registers a new connection and sends it the lobby list
    pub fn connect<T: Tunnel, F: Fn(Id) -> Option<T>>(&self, id: Id, tunnel_finder: F) {
        self.connections.entry(id).or_insert(None);
        self.send_lobby_list(id, &tunnel_finder);
    }

    /// Forgets a connection, leaving its lobby first
    pub fn disconnect<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, web_time::Duration),
    >(
        &self,
        id: Id,
        schedule_alarm: S,
        tunnel_finder: F,
    ) {
        if let Err(error) = self.remove_connection(id, schedule_alarm, &tunnel_finder) {
            debug!(%id, %error, "disconnected outside a lobby");
        }
        self.connections.remove(&id);
    }

    /// Takes a connection out of its lobby
    ///
    /// Shared by voluntary leaving, kicking and disconnecting. The lobby is
    /// destroyed if nobody is left connected.
    ///
    /// # Errors
    ///
    /// * `Error::NotInLobby` - The connection is not in a lobby
    /// * `Error::NotFound` - The lobby no longer exists
    pub fn remove_connection<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, web_time::Duration),
    >(
        &self,
        id: Id,
        schedule_alarm: S,
        tunnel_finder: F,
    ) -> Result<(), Error> {
        let Some(membership) = self.membership(id) else {
            return Err(Error::NotInLobby);
        };
        self.clear_membership(id, membership.code);

        self.update_lobby(membership.code, &tunnel_finder, |lobby| {
            lobby.leave(id, schedule_alarm, &tunnel_finder)
        })
        .ok_or(Error::NotFound)??;

        Ok(())
    }

    /// Leaves the current lobby and returns to the lobby list
    ///
    /// # Errors
    ///
    /// Same as [`Registry::remove_connection`].
    pub fn leave_lobby<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, web_time::Duration),
    >(
        &self,
        id: Id,
        schedule_alarm: S,
        tunnel_finder: F,
    ) -> Result<(), Error> {
        self.remove_connection(id, schedule_alarm, &tunnel_finder)?;
        self.send_lobby_list(id, &tunnel_finder);
        Ok(())
    }

    /// Creates a lobby hosted by the connection
    ///
    /// A connection already in a lobby leaves it first. The creator receives
    /// the new lobby.
    ///
    /// # Errors
    ///
    /// * `Error::Lobby` - The username was rejected
    /// * `Error::InvalidOptions` - The lobby settings are out of bounds
    /// * `Error::CodeSpaceExhausted` - No free code was found
    pub fn create_lobby<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, web_time::Duration),
    >(
        &self,
        id: Id,
        options: LobbyOptions,
        username: &str,
        schedule_alarm: S,
        tunnel_finder: F,
    ) -> Result<LobbyCode, Error> {
        let username = names::validate(username)?;
        let options = options.normalized();
        if let Err(report) = options.validate() {
            debug!(%id, %report, "rejected lobby options");
            return Err(Error::InvalidOptions);
        }

        if self.membership(id).is_some() {
            self.remove_connection(id, schedule_alarm, &tunnel_finder)?;
        }

        let mut created = None;
        for _ in 0..constants::code::MAX_ATTEMPTS {
            let code = LobbyCode::new();
            if let Entry::Vacant(entry) = self.lobbies.entry(code) {
                entry.insert(Arc::new(Mutex::new(Lobby::new(
                    code,
                    options,
                    id,
                    username.clone(),
                    self.timings,
                ))));
                created = Some(code);
                break;
            }
        }
        let Some(code) = created else {
            error!(lobbies = self.lobbies.len(), "ran out of lobby codes");
            return Err(Error::CodeSpaceExhausted);
        };

        self.set_membership(id, Some(Membership { code, username }));

        let listed = self
            .inspect(code, |lobby| {
                info!(%code, name = lobby.name(), "lobby created");
                if let Some(tunnel) = tunnel_finder(id) {
                    tunnel.send_message(&UpdateMessage::LobbyCreated {
                        code,
                        lobby: lobby.view(),
                    });
                }
                lobby.summary().is_some()
            })
            .ok_or(Error::NotFound)?;

        if listed {
            self.publish_lobby_list(&tunnel_finder);
        }

        Ok(code)
    }

    /// Joins a lobby by code
    ///
    /// Joining a running game admits the connection as a spectator. A
    /// connection in another lobby leaves it once the join succeeds.
    ///
    /// # Errors
    ///
    /// * `Error::NotFound` - No lobby has the code
    /// * `Error::Lobby` - The username was rejected, or the lobby refused the join
    pub fn join_lobby<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, web_time::Duration),
    >(
        &self,
        id: Id,
        code: &str,
        username: &str,
        password: Option<&str>,
        schedule_alarm: S,
        tunnel_finder: F,
    ) -> Result<(), Error> {
        let code = code.parse::<LobbyCode>().map_err(|_| Error::NotFound)?;
        let username = names::validate(username)?;

        let previous = self.membership(id);
        if previous.as_ref().is_some_and(|m| m.code == code) {
            return Err(lobby::Error::AlreadyJoined.into());
        }

        let joined_name = username.clone();
        self.update_lobby(code, &tunnel_finder, |lobby| {
            lobby.join(id, joined_name, password, &tunnel_finder)
        })
        .ok_or(Error::NotFound)??;

        if previous.is_some() {
            if let Err(error) = self.remove_connection(id, schedule_alarm, &tunnel_finder) {
                debug!(%id, %error, "previous lobby already gone");
            }
        }
        self.set_membership(id, Some(Membership { code, username }));

        Ok(())
    }

    /// Removes a player from the caller's lobby, host only
    ///
    /// # Errors
    ///
    /// * `Error::NotInLobby` - The caller is not in a lobby
    /// * `Error::Lobby` - The caller is not the host or the target is invalid
    pub fn kick_player<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, web_time::Duration),
    >(
        &self,
        id: Id,
        target: Id,
        schedule_alarm: S,
        tunnel_finder: F,
    ) -> Result<(), Error> {
        let code = self.membership(id).ok_or(Error::NotInLobby)?.code;

        self.update_lobby(code, &tunnel_finder, |lobby| {
            lobby.kick(id, target, schedule_alarm, &tunnel_finder)
        })
        .ok_or(Error::NotFound)??;

        if self.is_online(target) {
            self.clear_membership(target, code);
            self.send_lobby_list(target, &tunnel_finder);
        }
        Ok(())
    }

    /// Runs a lobby operation on behalf of a connection in that lobby
    fn act<R, T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        id: Id,
        tunnel_finder: &F,
        op: impl FnOnce(&mut Lobby) -> Result<R, lobby::Error>,
    ) -> Result<R, Error> {
        let code = self.membership(id).ok_or(Error::NotInLobby)?.code;
        Ok(self
            .update_lobby(code, tunnel_finder, op)
            .ok_or(Error::NotFound)??)
    }

    /// Handles an action from a connection
    ///
    /// Rejections that the sender should know about come back as an
    /// `error` event; everything else is logged and dropped.
    pub fn receive_message<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, web_time::Duration),
    >(
        &self,
        id: Id,
        message: IncomingMessage,
        schedule_alarm: S,
        tunnel_finder: F,
    ) {
        let result = match message {
            IncomingMessage::CreateLobby {
                name,
                username,
                password,
                max_players,
            } => {
                let options = LobbyOptions {
                    name,
                    password,
                    max_players: max_players.unwrap_or(constants::lobby::DEFAULT_MAX_PLAYERS),
                };
                self.create_lobby(id, options, &username, schedule_alarm, &tunnel_finder)
                    .map(|_| ())
            }
            IncomingMessage::JoinLobby {
                code,
                username,
                password,
            } => self.join_lobby(
                id,
                &code,
                &username,
                password.as_deref(),
                schedule_alarm,
                &tunnel_finder,
            ),
            IncomingMessage::LeaveLobby => self.leave_lobby(id, schedule_alarm, &tunnel_finder),
            IncomingMessage::KickPlayer { target_id } => {
                self.kick_player(id, target_id, schedule_alarm, &tunnel_finder)
            }
            IncomingMessage::StartGame => self.act(id, &tunnel_finder, |lobby| {
                lobby.start_game(id, &self.catalog, schedule_alarm, &tunnel_finder)
            }),
            IncomingMessage::SubmitMessage { text } => self.act(id, &tunnel_finder, |lobby| {
                lobby.submit_message(id, &text, schedule_alarm, &tunnel_finder)
            }),
            IncomingMessage::SubmitAllChat { text } => self.act(id, &tunnel_finder, |lobby| {
                lobby.submit_chat(id, &text, &tunnel_finder)
            }),
            IncomingMessage::SubmitVote { target_id } => self.act(id, &tunnel_finder, |lobby| {
                lobby.submit_vote(id, target_id, schedule_alarm, &tunnel_finder)
            }),
        };

        match result {
            Ok(()) => {}
            Err(error) if error.is_reported() => {
                if let Some(tunnel) = tunnel_finder(id) {
                    tunnel.send_message(&UpdateMessage::Error {
                        message: error.to_string(),
                    });
                }
            }
            Err(error) => debug!(%id, %error, "dropped action"),
        }
    }

    /// Delivers a fired alarm to its lobby
    ///
    /// Alarms for lobbies that no longer exist are ignored.
    pub fn receive_alarm<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, web_time::Duration),
    >(
        &self,
        alarm: AlarmMessage,
        schedule_alarm: S,
        tunnel_finder: F,
    ) {
        if self
            .update_lobby(alarm.code, &tunnel_finder, |lobby| {
                lobby.receive_alarm(alarm, schedule_alarm, &tunnel_finder);
            })
            .is_none()
        {
            debug!(?alarm, "alarm for a lobby that no longer exists");
        }
    }
}
