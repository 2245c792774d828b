//! Lobby lifecycle and game state machine
//!
//! A [`Lobby`] owns everything about one lobby: its members, the running
//! game, the vote and the timers that move the game along when players do
//! not act in time. It never talks to sockets or clocks directly. Events go
//! out through a `tunnel_finder` and delays are requested through a
//! `schedule_alarm` callback, mirroring how the transport and scheduler are
//! owned by the host.
//!
//! Every operation validates its preconditions first and returns an
//! [`Error`] without touching state when they do not hold, so stale or
//! duplicate client messages cannot corrupt a game.

use std::collections::{HashMap, HashSet, VecDeque};

use itertools::Itertools;
use rustrict::CensorStr;
use serde::Serialize;
use serde_with::skip_serializing_none;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    TruncatedVec,
    card::{Card, CardCatalog},
    config::{LobbyOptions, Timings},
    connection::Id,
    constants,
    lobby_code::LobbyCode,
    names,
    player::{Player, PlayerRef, PlayerView, Roster},
    session::Tunnel,
    timer::{AlarmMessage, TimerKind, Timers},
    voting::{self, Standing, Verdict, Votes},
};

/// The externally visible state of a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LobbyState {
    /// Gathering players between games
    Waiting,
    /// Players are taking turns
    Playing,
    /// Players are voting, or the results are on screen
    Voting,
}

/// A guess submitted during a game
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuessMessage {
    /// Who the guess is attributed to
    pub player_id: Id,
    /// Display name of the author
    pub username: String,
    /// The guess itself
    pub text: String,
    /// Round the guess belongs to
    pub round: u8,
}

/// A free-form chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Display name of the author
    pub username: String,
    /// The message text
    pub text: String,
}

/// A lobby as shown to its members
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyView {
    /// Lobby code
    pub code: LobbyCode,
    /// Lobby name
    pub name: String,
    /// Maximum number of connected players
    pub max_players: usize,
    /// Whether joining requires a password
    pub has_password: bool,
    /// Members in join order
    pub players: Vec<PlayerView>,
    /// Recent chat history, oldest first
    pub chat: Vec<ChatMessage>,
}

/// A running game as shown to someone joining mid-game
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    /// Current state of the lobby
    pub state: LobbyState,
    /// Current round, zero once the results are showing
    pub round: u8,
    /// Number of rounds in this game
    pub total_rounds: u8,
    /// Whose turn it is
    pub current_turn: Option<Id>,
    /// Guesses so far
    pub messages: Vec<GuessMessage>,
}

/// A public lobby as shown in the lobby list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySummary {
    /// Lobby code
    pub code: LobbyCode,
    /// Lobby name
    pub name: String,
    /// Number of players in the lobby
    pub players: usize,
    /// Maximum number of connected players
    pub max_players: usize,
    /// Name of the host
    pub host: String,
}

/// The results of a finished game
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOverMessage {
    /// Whether the imposter survived the vote
    pub imposter_won: bool,
    /// Whether the game ended because the imposter left
    pub imposter_left: bool,
    /// Who the imposter was
    pub imposter: Option<PlayerRef>,
    /// Who was voted out, if a vote took place
    pub voted_out: Option<PlayerRef>,
    /// The secret card
    pub card: Card,
    /// Every player, highest score first
    pub players: Vec<Standing>,
}

/// Events sent from the server to clients
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum UpdateMessage {
    /// Public lobbies open for joining
    LobbyList(TruncatedVec<LobbySummary>),
    /// Confirms a lobby was created, sent to its creator
    LobbyCreated {
        /// Lobby code
        code: LobbyCode,
        /// The new lobby
        lobby: LobbyView,
    },
    /// Confirms a join, sent to the joiner
    LobbyJoined {
        /// Lobby code
        code: LobbyCode,
        /// The joined lobby
        lobby: LobbyView,
        /// Whether the joiner watches the running game
        spectator: bool,
        /// The running game, if any
        game: Option<GameView>,
    },
    /// Someone joined the lobby
    PlayerJoined {
        /// Members in join order
        players: Vec<PlayerView>,
    },
    /// Someone left or was removed from the lobby
    PlayerLeft {
        /// Members in join order
        players: Vec<PlayerView>,
    },
    /// The recipient was kicked by the host
    Kicked,
    /// A game started, personalized per recipient
    GameStarted {
        /// Whether the recipient is the imposter
        is_imposter: bool,
        /// Whether the recipient only watches
        is_spectator: bool,
        /// The secret card, withheld from the imposter and spectators
        card: Option<Card>,
        /// Whose turn it is
        current_turn: Option<Id>,
        /// Current round
        round: u8,
        /// Number of rounds in this game
        total_rounds: u8,
        /// Members in join order
        players: Vec<PlayerView>,
    },
    /// A guess was recorded and the turn moved on
    MessageReceived {
        /// Guesses so far
        messages: Vec<GuessMessage>,
        /// Whose turn it is, `None` once the turns are over
        current_turn: Option<Id>,
        /// Current round
        round: u8,
    },
    /// Turns are over and voting has begun
    VotingPhase {
        /// Players who can be voted out
        players: Vec<PlayerRef>,
        /// Time available to vote
        seconds: u64,
    },
    /// The live tally changed
    VoteUpdate {
        /// Votes received per target
        votes: HashMap<Id, usize>,
        /// Everyone who has voted
        players_voted: Vec<Id>,
    },
    /// Confirms the recipient's vote while others are still voting
    VoteReceived,
    /// The game is over
    GameOver(GameOverMessage),
    /// The lobby is waiting for the next game
    BackToLobby {
        /// Members in join order
        players: Vec<PlayerView>,
    },
    /// A chat message was posted
    AllChatMessage(ChatMessage),
    /// A request was rejected
    Error {
        /// Human-readable reason
        message: String,
    },
}

impl UpdateMessage {
    /// Converts the update message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// Errors that can occur when acting on a lobby
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The password does not match
    #[error("Incorrect password")]
    BadPassword,
    /// The lobby has no room for another player
    #[error("Lobby is full")]
    Full,
    /// Too few players to start a game
    #[error("Need at least {} players to start", constants::lobby::MIN_PLAYERS)]
    NotEnoughPlayers,
    /// The submitted text is blank
    #[error("Message cannot be empty")]
    EmptyMessage,
    /// The username was rejected
    #[error(transparent)]
    Name(#[from] names::Error),
    /// The action is reserved for the host
    #[error("Only the host can do that")]
    NotHost,
    /// The action is reserved for the current turn holder
    #[error("It is not your turn")]
    NotYourTurn,
    /// The action does not apply in the lobby's current state
    #[error("That action is not available right now")]
    WrongState,
    /// The voter already voted
    #[error("You have already voted")]
    AlreadyVoted,
    /// The player is not a member, or not eligible for the action
    #[error("Player not found")]
    UnknownPlayer,
    /// The connection is already a connected member of the lobby
    #[error("You are already in this lobby")]
    AlreadyJoined,
}

impl Error {
    /// Whether the sender is told about this error
    ///
    /// Input problems and join or start refusals are reported. Everything
    /// else comes from a stale or duplicate message and is dropped.
    pub fn is_reported(&self) -> bool {
        matches!(
            self,
            Self::BadPassword
                | Self::Full
                | Self::NotEnoughPlayers
                | Self::EmptyMessage
                | Self::Name(_)
        )
    }
}

/// The game being played in a lobby
#[derive(Debug, Clone)]
struct Game {
    card: Card,
    round: u8,
    total_rounds: u8,
    turn_index: usize,
    messages: Vec<GuessMessage>,
}

/// Where a lobby is in its lifecycle
#[derive(Debug)]
enum Phase {
    Waiting,
    Playing(Game),
    Voting { game: Game, votes: Votes },
    /// The results are on screen; no game actions are accepted
    Revealing { card: Card },
}

/// Number of rounds for a game started with `players` players
pub fn total_rounds(players: usize) -> u8 {
    if players <= constants::lobby::MIN_PLAYERS {
        constants::game::SMALL_GAME_ROUNDS
    } else {
        constants::game::LARGE_GAME_ROUNDS
    }
}

/// Trims text and cuts it to at most `max` characters
fn clean_text(text: &str, max: usize) -> String {
    text.trim().chars().take(max).collect::<String>().trim_end().to_owned()
}

/// A single lobby and its game
#[derive(Debug)]
pub struct Lobby {
    code: LobbyCode,
    name: String,
    password: Option<String>,
    max_players: usize,
    players: Roster,
    phase: Phase,
    chat: VecDeque<ChatMessage>,
    timers: Timers,
    timings: Timings,
    closed: bool,
}

// Accessors
impl Lobby {
    /// The lobby's code
    pub fn code(&self) -> LobbyCode {
        self.code
    }

    /// The lobby's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether joining requires a password
    pub fn requires_password(&self) -> bool {
        self.password.is_some()
    }

    /// Maximum number of connected players
    pub fn max_players(&self) -> usize {
        self.max_players
    }

    /// The lobby's members in join order
    pub fn players(&self) -> &Roster {
        &self.players
    }

    /// The externally visible state
    pub fn state(&self) -> LobbyState {
        match self.phase {
            Phase::Waiting => LobbyState::Waiting,
            Phase::Playing(_) => LobbyState::Playing,
            Phase::Voting { .. } | Phase::Revealing { .. } => LobbyState::Voting,
        }
    }

    /// Whether the results of a finished game are currently on screen
    pub fn is_revealing(&self) -> bool {
        matches!(self.phase, Phase::Revealing { .. })
    }

    fn game(&self) -> Option<&Game> {
        match &self.phase {
            Phase::Playing(game) | Phase::Voting { game, .. } => Some(game),
            Phase::Waiting | Phase::Revealing { .. } => None,
        }
    }

    /// The secret card of the running game
    pub fn card(&self) -> Option<&Card> {
        match &self.phase {
            Phase::Playing(game) | Phase::Voting { game, .. } => Some(&game.card),
            Phase::Revealing { card } => Some(card),
            Phase::Waiting => None,
        }
    }

    /// The current round, zero outside a game
    pub fn round(&self) -> u8 {
        self.game().map_or(0, |g| g.round)
    }

    /// The number of rounds of the running game, zero outside a game
    pub fn total_rounds(&self) -> u8 {
        self.game().map_or(0, |g| g.total_rounds)
    }

    /// Whose turn it is, only while players are taking turns
    pub fn current_turn(&self) -> Option<Id> {
        match &self.phase {
            Phase::Playing(game) => self.players.at(game.turn_index).map(Player::id),
            _ => None,
        }
    }

    /// Guesses of the running game
    pub fn messages(&self) -> &[GuessMessage] {
        self.game().map_or(&[], |g| g.messages.as_slice())
    }

    /// Votes cast in the current voting phase
    pub fn votes(&self) -> Option<&Votes> {
        match &self.phase {
            Phase::Voting { votes, .. } => Some(votes),
            _ => None,
        }
    }

    /// Recent chat history, oldest first
    pub fn chat(&self) -> impl Iterator<Item = &ChatMessage> {
        self.chat.iter()
    }

    /// Whether a timer of the given kind is armed
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.timers.is_armed(kind)
    }

    /// Whether nobody is connected any more
    pub fn is_empty(&self) -> bool {
        self.players.connected_count() == 0
    }

    /// Whether the lobby has been removed from its registry
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The lobby as shown to its members
    pub fn view(&self) -> LobbyView {
        LobbyView {
            code: self.code,
            name: self.name.clone(),
            max_players: self.max_players,
            has_password: self.requires_password(),
            players: self.players.views(),
            chat: self.chat.iter().cloned().collect_vec(),
        }
    }

    /// The running game as shown to a newcomer
    fn game_view(&self) -> Option<GameView> {
        match self.phase {
            Phase::Waiting => None,
            _ => Some(GameView {
                state: self.state(),
                round: self.round(),
                total_rounds: self.total_rounds(),
                current_turn: self.current_turn(),
                messages: self.messages().to_vec(),
            }),
        }
    }

    /// The lobby list entry, only for public lobbies that are waiting
    pub fn summary(&self) -> Option<LobbySummary> {
        if self.password.is_some() || !matches!(self.phase, Phase::Waiting) {
            return None;
        }
        Some(LobbySummary {
            code: self.code,
            name: self.name.clone(),
            players: self.players.connected_count(),
            max_players: self.max_players,
            host: self
                .players
                .host()
                .map_or_else(|| "Unknown".to_owned(), |h| h.username().to_owned()),
        })
    }

    fn message_received(&self) -> UpdateMessage {
        UpdateMessage::MessageReceived {
            messages: self.messages().to_vec(),
            current_turn: self.current_turn(),
            round: self.round(),
        }
    }
}

impl Lobby {
    /// Creates a lobby whose only member is its host
    ///
    /// `options` are expected to be validated and normalized already.
    pub fn new(
        code: LobbyCode,
        options: LobbyOptions,
        host_id: Id,
        host_name: String,
        timings: Timings,
    ) -> Self {
        Self {
            code,
            name: options.name,
            password: options.password,
            max_players: options.max_players,
            players: Roster::with_host(host_id, host_name),
            phase: Phase::Waiting,
            chat: VecDeque::with_capacity(constants::chat::HISTORY),
            timers: Timers::default(),
            timings,
            closed: false,
        }
    }

    /// Marks the lobby as removed and cancels its timers
    pub fn close(&mut self) {
        self.closed = true;
        self.timers.disarm_all();
    }

    /// Arms a timer and asks the host to deliver its alarm later
    fn arm<S: FnMut(AlarmMessage, web_time::Duration)>(
        &mut self,
        kind: TimerKind,
        mut schedule_alarm: S,
    ) {
        let generation = self.timers.arm(kind);
        let delay = match kind {
            TimerKind::Turn => self.timings.turn,
            TimerKind::Voting => self.timings.voting,
            TimerKind::Results => self.timings.results,
        };
        schedule_alarm(
            AlarmMessage {
                code: self.code,
                kind,
                generation,
            },
            delay,
        );
    }

    /// Admits a player, as a spectator if a game is in progress
    ///
    /// The joiner receives the lobby (and the running game, without the
    /// card); everyone receives the updated roster. A connection that left
    /// during the game takes its old place back as a spectator.
    ///
    /// # Errors
    ///
    /// * `Error::BadPassword` - The lobby has a password and it does not match
    /// * `Error::Full` - The lobby already has `max_players` connected players
    /// * `Error::AlreadyJoined` - The connection is already a connected member
    pub fn join<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        id: Id,
        username: String,
        password: Option<&str>,
        tunnel_finder: F,
    ) -> Result<(), Error> {
        if let Some(expected) = &self.password {
            if password.map(str::trim) != Some(expected.as_str()) {
                return Err(Error::BadPassword);
            }
        }
        if self.players.connected_count() >= self.max_players {
            return Err(Error::Full);
        }
        let spectator = !matches!(self.phase, Phase::Waiting);
        match self.players.get(id).map(Player::has_left) {
            Some(false) => return Err(Error::AlreadyJoined),
            Some(true) => {
                debug!(code = %self.code, %id, "departed player rejoined");
                self.players.rejoin(id, username, spectator);
            }
            None => self.players.push(Player::new(id, username, spectator)),
        }

        self.players.send_message(
            &UpdateMessage::LobbyJoined {
                code: self.code,
                lobby: self.view(),
                spectator,
                game: self.game_view(),
            },
            id,
            &tunnel_finder,
        );
        self.players.announce(
            &UpdateMessage::PlayerJoined {
                players: self.players.views(),
            },
            &tunnel_finder,
        );

        Ok(())
    }

    /// Handles a player leaving, whether by disconnecting, leaving or being kicked
    ///
    /// Outside a game the player is removed outright. During a game the
    /// player is only marked as departed so turn order and round counts
    /// stay intact; if they held the turn a placeholder guess is recorded
    /// for them, and if they were the imposter the game ends at once.
    ///
    /// # Errors
    ///
    /// * `Error::UnknownPlayer` - No such connected member
    pub fn leave<T: Tunnel, F: Fn(Id) -> Option<T>, S: FnMut(AlarmMessage, web_time::Duration)>(
        &mut self,
        id: Id,
        mut schedule_alarm: S,
        tunnel_finder: F,
    ) -> Result<(), Error> {
        let Some(player) = self.players.get(id).filter(|p| !p.has_left()) else {
            return Err(Error::UnknownPlayer);
        };
        let was_imposter = player.is_imposter();
        let had_turn = self.current_turn() == Some(id);

        if matches!(self.phase, Phase::Waiting) {
            self.players.remove(id);
        } else {
            self.players.mark_left(id);
        }
        if let Phase::Voting { votes, .. } = &mut self.phase {
            votes.retract(id);
        }

        if self.is_empty() {
            self.timers.disarm_all();
            return Ok(());
        }

        self.players.announce(
            &UpdateMessage::PlayerLeft {
                players: self.players.views(),
            },
            &tunnel_finder,
        );

        if !matches!(self.phase, Phase::Playing(_) | Phase::Voting { .. }) {
            return Ok(());
        }

        if was_imposter {
            self.conclude(true, &mut schedule_alarm, &tunnel_finder);
        } else if self.players.active_count() == 0 {
            debug!(code = %self.code, "no active players left, abandoning game");
            self.reset(&tunnel_finder);
        } else if had_turn {
            self.take_turn(
                constants::game::LEFT_TEXT.to_owned(),
                &mut schedule_alarm,
                &tunnel_finder,
            );
        } else if self.votes().is_some() && self.players.active().all(Player::has_voted) {
            self.conclude(false, &mut schedule_alarm, &tunnel_finder);
        }

        Ok(())
    }

    /// Removes a player at the host's request
    ///
    /// The target is told they were kicked, then leaves like any other
    /// departing player.
    ///
    /// # Errors
    ///
    /// * `Error::NotHost` - The caller is not the host
    /// * `Error::UnknownPlayer` - The target is the host or not a connected member
    pub fn kick<T: Tunnel, F: Fn(Id) -> Option<T>, S: FnMut(AlarmMessage, web_time::Duration)>(
        &mut self,
        caller: Id,
        target: Id,
        schedule_alarm: S,
        tunnel_finder: F,
    ) -> Result<(), Error> {
        if !self.players.get(caller).is_some_and(Player::is_host) {
            return Err(Error::NotHost);
        }
        if caller == target || !self.players.get(target).is_some_and(|p| !p.has_left()) {
            return Err(Error::UnknownPlayer);
        }

        self.players
            .send_message(&UpdateMessage::Kicked, target, &tunnel_finder);
        self.leave(target, schedule_alarm, tunnel_finder)
    }

    /// Starts a game at the host's request
    ///
    /// Picks the number of rounds, the card, the imposter and the first
    /// turn, then tells each player their role. The imposter gets no card.
    ///
    /// # Errors
    ///
    /// * `Error::WrongState` - A game is already running
    /// * `Error::NotHost` - The caller is not the host
    /// * `Error::NotEnoughPlayers` - Fewer than three players
    pub fn start_game<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, web_time::Duration),
    >(
        &mut self,
        caller: Id,
        catalog: &CardCatalog,
        schedule_alarm: S,
        tunnel_finder: F,
    ) -> Result<(), Error> {
        if !matches!(self.phase, Phase::Waiting) {
            return Err(Error::WrongState);
        }
        if !self.players.get(caller).is_some_and(Player::is_host) {
            return Err(Error::NotHost);
        }
        let count = self.players.len();
        if count < constants::lobby::MIN_PLAYERS {
            return Err(Error::NotEnoughPlayers);
        }

        for player in self.players.iter_mut() {
            player.has_voted = false;
        }
        self.players.assign_imposter(fastrand::usize(..count));

        let game = Game {
            card: catalog.pick_random().clone(),
            round: 1,
            total_rounds: total_rounds(count),
            turn_index: fastrand::usize(..count),
            messages: Vec::new(),
        };
        info!(
            code = %self.code,
            players = count,
            rounds = game.total_rounds,
            "game started"
        );
        self.phase = Phase::Playing(game);
        self.timers.disarm_all();
        self.arm(TimerKind::Turn, schedule_alarm);

        let card = self.card().cloned();
        let current_turn = self.current_turn();
        let round = self.round();
        let total_rounds = self.total_rounds();
        let players = self.players.views();
        self.players.announce_with(
            |player| {
                let sees_card = !player.is_imposter() && !player.is_spectator();
                Some(UpdateMessage::GameStarted {
                    is_imposter: player.is_imposter(),
                    is_spectator: player.is_spectator(),
                    card: if sees_card { card.clone() } else { None },
                    current_turn,
                    round,
                    total_rounds,
                    players: players.clone(),
                })
            },
            tunnel_finder,
        );

        Ok(())
    }

    /// Records a guess from the current turn holder
    ///
    /// The text is trimmed and cut to twenty characters.
    ///
    /// # Errors
    ///
    /// * `Error::WrongState` - Players are not taking turns
    /// * `Error::NotYourTurn` - The sender does not hold the turn
    /// * `Error::EmptyMessage` - The text is blank
    pub fn submit_message<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, web_time::Duration),
    >(
        &mut self,
        id: Id,
        text: &str,
        schedule_alarm: S,
        tunnel_finder: F,
    ) -> Result<(), Error> {
        if !matches!(self.phase, Phase::Playing(_)) {
            return Err(Error::WrongState);
        }
        if self.current_turn() != Some(id) {
            return Err(Error::NotYourTurn);
        }
        let text = clean_text(text, constants::game::MAX_MESSAGE_LENGTH);
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }

        self.take_turn(text, schedule_alarm, tunnel_finder);
        Ok(())
    }

    /// Records `text` for the current turn holder and moves the game on
    ///
    /// Submissions, turn time outs and mid-turn departures all go through
    /// here. The round is complete once every active player has a guess in
    /// it; then either the next round starts with the first active player
    /// or, after the last round, voting begins.
    fn take_turn<T: Tunnel, F: Fn(Id) -> Option<T>, S: FnMut(AlarmMessage, web_time::Duration)>(
        &mut self,
        text: String,
        mut schedule_alarm: S,
        tunnel_finder: F,
    ) {
        let Phase::Playing(game) = &mut self.phase else {
            return;
        };
        let Some(holder) = self.players.at(game.turn_index) else {
            return;
        };
        self.timers.disarm(TimerKind::Turn);

        game.messages.push(GuessMessage {
            player_id: holder.id(),
            username: holder.username().to_owned(),
            text,
            round: game.round,
        });

        let spoken: HashSet<Id> = game
            .messages
            .iter()
            .filter(|m| m.round == game.round)
            .map(|m| m.player_id)
            .collect();
        let round_complete = self.players.active().all(|p| spoken.contains(&p.id()));

        let next = if !round_complete {
            self.players.next_active_after(game.turn_index)
        } else if game.round < game.total_rounds {
            game.round += 1;
            self.players.first_active()
        } else {
            None
        };

        match next {
            Some(index) => {
                game.turn_index = index;
                self.arm(TimerKind::Turn, &mut schedule_alarm);
                self.players
                    .announce(&self.message_received(), &tunnel_finder);
            }
            None => self.start_voting(schedule_alarm, tunnel_finder),
        }
    }

    /// Moves from turns to voting
    fn start_voting<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, web_time::Duration),
    >(
        &mut self,
        schedule_alarm: S,
        tunnel_finder: F,
    ) {
        let Phase::Playing(game) = std::mem::replace(&mut self.phase, Phase::Waiting) else {
            return;
        };
        self.timers.disarm(TimerKind::Turn);

        self.players.announce(
            &UpdateMessage::MessageReceived {
                messages: game.messages.clone(),
                current_turn: None,
                round: game.round,
            },
            &tunnel_finder,
        );

        self.phase = Phase::Voting {
            game,
            votes: Votes::default(),
        };
        self.arm(TimerKind::Voting, schedule_alarm);
        debug!(code = %self.code, "voting started");

        self.players.announce(
            &UpdateMessage::VotingPhase {
                players: self.players.active_refs(),
                seconds: self.timings.voting.as_secs(),
            },
            &tunnel_finder,
        );
    }

    /// Records a vote
    ///
    /// Everyone sees the live tally. Once every active player has voted the
    /// vote concludes early.
    ///
    /// # Errors
    ///
    /// * `Error::WrongState` - No vote is running
    /// * `Error::UnknownPlayer` - The voter or target is not an active player
    /// * `Error::AlreadyVoted` - The voter already voted
    pub fn submit_vote<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, web_time::Duration),
    >(
        &mut self,
        voter: Id,
        target: Id,
        schedule_alarm: S,
        tunnel_finder: F,
    ) -> Result<(), Error> {
        let Phase::Voting { votes, .. } = &mut self.phase else {
            return Err(Error::WrongState);
        };
        let Some(player) = self.players.get(voter).filter(|p| p.is_active()) else {
            return Err(Error::UnknownPlayer);
        };
        if player.has_voted() {
            return Err(Error::AlreadyVoted);
        }
        if !self.players.get(target).is_some_and(Player::is_active) {
            return Err(Error::UnknownPlayer);
        }

        votes.cast(voter, target);
        let update = UpdateMessage::VoteUpdate {
            votes: votes.tally(),
            players_voted: votes.voters(),
        };
        if let Some(player) = self.players.get_mut(voter) {
            player.has_voted = true;
        }

        self.players.announce(&update, &tunnel_finder);

        if self.players.active().all(Player::has_voted) {
            self.conclude(false, schedule_alarm, tunnel_finder);
        } else {
            self.players
                .send_message(&UpdateMessage::VoteReceived, voter, tunnel_finder);
        }

        Ok(())
    }

    /// Ends the game and shows the results
    ///
    /// Shared by the voting timer, the last vote arriving and the imposter
    /// leaving. The lobby returns to waiting once the results timer fires.
    fn conclude<T: Tunnel, F: Fn(Id) -> Option<T>, S: FnMut(AlarmMessage, web_time::Duration)>(
        &mut self,
        imposter_left: bool,
        schedule_alarm: S,
        tunnel_finder: F,
    ) {
        let (game, votes) = match std::mem::replace(&mut self.phase, Phase::Waiting) {
            Phase::Playing(game) => (game, Votes::default()),
            Phase::Voting { game, votes } => (game, votes),
            phase => {
                self.phase = phase;
                return;
            }
        };
        self.timers.disarm(TimerKind::Turn);
        self.timers.disarm(TimerKind::Voting);

        let imposter = self.players.imposter().map(Player::reference);
        let voted_out = if imposter_left {
            None
        } else {
            let candidates = self.players.active().map(Player::id).collect_vec();
            votes
                .conclude(&candidates)
                .and_then(|id| self.players.get(id))
                .map(Player::reference)
        };
        let verdict = match (&voted_out, &imposter) {
            _ if imposter_left => Verdict::Abandoned,
            (Some(out), Some(imposter)) if out.id == imposter.id => Verdict::Caught,
            _ => Verdict::Survived,
        };
        voting::award(&mut self.players, verdict);

        info!(code = %self.code, ?verdict, votes = votes.ballot_count(), "game concluded");

        let message = UpdateMessage::GameOver(GameOverMessage {
            imposter_won: verdict.imposter_won(),
            imposter_left,
            imposter,
            voted_out,
            card: game.card.clone(),
            players: voting::standings(self.players.iter()),
        });
        self.players.announce(&message, tunnel_finder);

        self.phase = Phase::Revealing { card: game.card };
        self.arm(TimerKind::Results, schedule_alarm);
    }

    /// Returns the lobby to waiting after a game
    ///
    /// Departed players are dropped, per-game flags are cleared and
    /// spectators become regular players. Scores, names and the host stay.
    fn reset<T: Tunnel, F: Fn(Id) -> Option<T>>(&mut self, tunnel_finder: F) {
        self.timers.disarm_all();
        self.phase = Phase::Waiting;
        let dropped = self.players.drop_departed();
        self.players.reset_for_lobby();

        info!(code = %self.code, dropped = dropped.len(), "back to lobby");

        if !self.players.is_empty() {
            self.players.announce(
                &UpdateMessage::BackToLobby {
                    players: self.players.views(),
                },
                tunnel_finder,
            );
        }
    }

    /// Posts a chat message, available in every state
    ///
    /// The text is trimmed, cut to a hundred characters and censored.
    ///
    /// # Errors
    ///
    /// * `Error::UnknownPlayer` - The sender is not a connected member
    /// * `Error::EmptyMessage` - The text is blank
    pub fn submit_chat<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        id: Id,
        text: &str,
        tunnel_finder: F,
    ) -> Result<(), Error> {
        let Some(player) = self.players.get(id).filter(|p| !p.has_left()) else {
            return Err(Error::UnknownPlayer);
        };
        let text = clean_text(text, constants::chat::MAX_LENGTH);
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }

        let message = ChatMessage {
            username: player.username().to_owned(),
            text: text.censor(),
        };
        if self.chat.len() == constants::chat::HISTORY {
            self.chat.pop_front();
        }
        self.chat.push_back(message.clone());

        self.players
            .announce(&UpdateMessage::AllChatMessage(message), tunnel_finder);
        Ok(())
    }

    /// Handles a fired timer
    ///
    /// Alarms from cancelled or superseded timers are ignored. A turn alarm
    /// records a time out for the turn holder, a voting alarm concludes the
    /// vote and a results alarm returns the lobby to waiting.
    pub fn receive_alarm<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, web_time::Duration),
    >(
        &mut self,
        alarm: AlarmMessage,
        schedule_alarm: S,
        tunnel_finder: F,
    ) {
        if alarm.code != self.code || !self.timers.take(alarm.kind, alarm.generation) {
            debug!(code = %self.code, ?alarm, "ignoring stale alarm");
            return;
        }

        match alarm.kind {
            TimerKind::Turn if matches!(self.phase, Phase::Playing(_)) => {
                self.take_turn(
                    constants::game::TIMEOUT_TEXT.to_owned(),
                    schedule_alarm,
                    tunnel_finder,
                );
            }
            TimerKind::Voting if matches!(self.phase, Phase::Voting { .. }) => {
                self.conclude(false, schedule_alarm, tunnel_finder);
            }
            TimerKind::Results if self.is_revealing() => self.reset(tunnel_finder),
            _ => debug!(code = %self.code, ?alarm, "alarm does not apply to current phase"),
        }
    }
}
