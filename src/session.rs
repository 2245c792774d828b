//! Communication session management
//!
//! This module defines the trait for tunneling messages from the game
//! engine to connected clients. The transport owns framing and delivery;
//! the core only ever asks for a tunnel by connection id and pushes
//! events into it.

use super::lobby::UpdateMessage;

/// Trait for sending messages through a communication tunnel
///
/// Implementations might wrap a WebSocket, a Server-Sent Events stream or
/// an in-memory channel. Broadcasts are expressed as one `send_message`
/// per recipient, so a lobby-wide event reaches every member's tunnel.
pub trait Tunnel {
    /// Sends an event to the client on the other end of the tunnel
    ///
    /// # Arguments
    ///
    /// * `message` - The event to send
    fn send_message(&self, message: &UpdateMessage);
}
