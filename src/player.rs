//! Players and the ordered roster of a lobby
//!
//! The roster keeps players in join order, which doubles as the turn order
//! for a game. It owns the host invariant (exactly one connected host while
//! anyone is connected) and the turn-order skip algorithm, and it knows how
//! to reach every member through a [`Tunnel`].

use itertools::Itertools;
use serde::Serialize;

use crate::{connection::Id, lobby::UpdateMessage, session::Tunnel};

/// A member of a lobby
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub(crate) id: Id,
    pub(crate) username: String,
    pub(crate) is_host: bool,
    pub(crate) is_imposter: bool,
    pub(crate) is_spectator: bool,
    pub(crate) has_left: bool,
    pub(crate) score: u64,
    pub(crate) has_voted: bool,
}

impl Player {
    /// Creates a fresh player with no score
    pub fn new(id: Id, username: String, is_spectator: bool) -> Self {
        Self {
            id,
            username,
            is_host: false,
            is_imposter: false,
            is_spectator,
            has_left: false,
            score: 0,
            has_voted: false,
        }
    }

    /// The player's connection id
    pub fn id(&self) -> Id {
        self.id
    }

    /// The player's display name
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Whether the player hosts the lobby
    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// Whether the player is the imposter of the current game
    pub fn is_imposter(&self) -> bool {
        self.is_imposter
    }

    /// Whether the player joined while a game was in progress
    pub fn is_spectator(&self) -> bool {
        self.is_spectator
    }

    /// Whether the player disconnected during the current game
    pub fn has_left(&self) -> bool {
        self.has_left
    }

    /// The player's score across all games in this lobby
    pub fn score(&self) -> u64 {
        self.score
    }

    /// Whether the player has voted in the current game
    pub fn has_voted(&self) -> bool {
        self.has_voted
    }

    /// Whether the player takes part in the current game
    ///
    /// Active players take turns, count toward round completion, vote,
    /// can be voted out and score.
    pub fn is_active(&self) -> bool {
        !self.has_left && !self.is_spectator
    }

    /// The public view of this player
    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            username: self.username.clone(),
            is_host: self.is_host,
            score: self.score,
            is_spectator: self.is_spectator,
            has_left: self.has_left,
        }
    }

    /// A reference to this player by id and name
    pub fn reference(&self) -> PlayerRef {
        PlayerRef {
            id: self.id,
            username: self.username.clone(),
        }
    }
}

/// What every client may know about a player
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    /// Connection id
    pub id: Id,
    /// Display name
    pub username: String,
    /// Whether the player hosts the lobby
    pub is_host: bool,
    /// Score across all games in the lobby
    pub score: u64,
    /// Whether the player is watching the current game
    pub is_spectator: bool,
    /// Whether the player left during the current game
    pub has_left: bool,
}

/// A player named by id and display name, used for vote targets and results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRef {
    /// Connection id
    pub id: Id,
    /// Display name
    pub username: String,
}

/// The ordered players of a lobby
#[derive(Debug, Default)]
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    /// Creates a roster whose only member is the host
    pub fn with_host(id: Id, username: String) -> Self {
        let mut roster = Self::default();
        roster.push(Player::new(id, username, false));
        roster
    }

    /// Number of players, including those who left mid-game
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether the roster has no players at all
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Iterates over every player in join order
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.iter_mut()
    }

    /// Looks up a player by connection id
    pub fn get(&self, id: Id) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: Id) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// The player at a position in turn order
    pub fn at(&self, index: usize) -> Option<&Player> {
        self.players.get(index)
    }

    /// The current host, if anyone is connected
    pub fn host(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_host)
    }

    /// The imposter of the current game, whether or not they are still connected
    pub fn imposter(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_imposter)
    }

    /// Players still connected to the lobby
    pub fn connected(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| !p.has_left)
    }

    /// Number of players still connected to the lobby
    pub fn connected_count(&self) -> usize {
        self.connected().count()
    }

    /// Players taking part in the current game
    pub fn active(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_active())
    }

    /// Number of players taking part in the current game
    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Appends a player; the first player of an empty roster becomes host
    pub fn push(&mut self, player: Player) {
        self.players.push(player);
        self.ensure_host();
    }

    /// Removes a player outright, handing the host role on if needed
    ///
    /// Only safe outside a game, since it shifts turn-order indices.
    pub fn remove(&mut self, id: Id) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == id)?;
        let removed = self.players.remove(index);
        self.ensure_host();
        Some(removed)
    }

    /// Marks a player as departed while keeping their place in turn order
    ///
    /// # Returns
    ///
    /// `false` if there is no such connected player
    pub fn mark_left(&mut self, id: Id) -> bool {
        let Some(player) = self.get_mut(id).filter(|p| !p.has_left) else {
            return false;
        };
        player.has_left = true;
        player.is_host = false;
        self.ensure_host();
        true
    }

    /// Brings a departed player back in their old place
    ///
    /// The entry keeps its turn-order position and score and takes the new
    /// username. The host role only returns if nobody else is connected.
    ///
    /// # Returns
    ///
    /// `false` if there is no such departed player
    pub fn rejoin(&mut self, id: Id, username: String, is_spectator: bool) -> bool {
        let Some(player) = self.get_mut(id).filter(|p| p.has_left) else {
            return false;
        };
        player.has_left = false;
        player.username = username;
        player.is_spectator = is_spectator;
        player.has_voted = false;
        self.ensure_host();
        true
    }

    /// Drops every departed player
    ///
    /// # Returns
    ///
    /// The ids of the dropped players
    pub fn drop_departed(&mut self) -> Vec<Id> {
        let (departed, remaining): (Vec<_>, Vec<_>) =
            self.players.drain(..).partition(|p| p.has_left);
        self.players = remaining;
        self.ensure_host();
        departed.into_iter().map(|p| p.id).collect_vec()
    }

    /// Makes the player at `index` the only imposter
    pub fn assign_imposter(&mut self, index: usize) {
        for (i, player) in self.players.iter_mut().enumerate() {
            player.is_imposter = i == index;
        }
    }

    /// Clears per-game flags when the lobby returns to waiting
    ///
    /// Spectators become regular players; scores, names and host survive.
    pub fn reset_for_lobby(&mut self) {
        for player in &mut self.players {
            player.is_imposter = false;
            player.has_voted = false;
            player.is_spectator = false;
        }
    }

    /// The first active player in turn order
    pub fn first_active(&self) -> Option<usize> {
        self.players.iter().position(Player::is_active)
    }

    /// The next active player after `index`, wrapping around the full roster
    ///
    /// The search visits each position at most once, so it terminates even
    /// when nobody is active.
    pub fn next_active_after(&self, index: usize) -> Option<usize> {
        let len = self.players.len();
        (1..=len)
            .map(|step| (index + step) % len)
            .find(|&i| self.players[i].is_active())
    }

    /// Public views of every player in join order
    pub fn views(&self) -> Vec<PlayerView> {
        self.players.iter().map(Player::view).collect_vec()
    }

    /// References to the active players, used as vote targets
    pub fn active_refs(&self) -> Vec<PlayerRef> {
        self.active().map(Player::reference).collect_vec()
    }

    /// Keeps exactly one connected host whenever anyone is connected
    fn ensure_host(&mut self) {
        if self.players.iter().any(|p| p.is_host && !p.has_left) {
            return;
        }
        for player in &mut self.players {
            player.is_host = false;
        }
        if let Some(player) = self.players.iter_mut().find(|p| !p.has_left) {
            player.is_host = true;
        }
    }

    /// Sends an update message to a specific player
    pub fn send_message<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        message: &UpdateMessage,
        id: Id,
        tunnel_finder: F,
    ) {
        let Some(session) = tunnel_finder(id) else {
            return;
        };

        session.send_message(message);
    }

    /// Sends personalized messages to every connected player
    ///
    /// The sender function is called for each connected player and can
    /// return a different message per player, or `None` to skip them.
    pub fn announce_with<S, T: Tunnel, F: Fn(Id) -> Option<T>>(&self, sender: S, tunnel_finder: F)
    where
        S: Fn(&Player) -> Option<UpdateMessage>,
    {
        for player in self.connected() {
            let Some(message) = sender(player) else {
                continue;
            };
            self.send_message(&message, player.id, &tunnel_finder);
        }
    }

    /// Broadcasts an update message to every connected player
    pub fn announce<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        message: &UpdateMessage,
        tunnel_finder: F,
    ) {
        self.announce_with(|_| Some(message.clone()), tunnel_finder);
    }
}
