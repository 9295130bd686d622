//! The transport collaborator interface.

use async_trait::async_trait;
use thiserror::Error;

use crate::message::ClientRequest;

/// Errors surfaced by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No relay connection is available.
    #[error("not connected to any relay")]
    NotConnected,

    /// The transport has shut down.
    #[error("transport closed: {0}")]
    Closed(String),
}

/// Send side of the relay boundary.
///
/// The receive side is an `mpsc` stream of [`crate::RelayMessage`] handed to
/// the engine at construction; a transport implementation owns the sender
/// half and the engine owns the receiver. Requests may be issued from the
/// processing context at any time; ordering per subscription is the
/// transport's problem.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a subscribe or close request.
    async fn send(&self, request: ClientRequest) -> Result<(), TransportError>;

    /// Whether any relay connection is currently up. Backfill holds off
    /// while this is false instead of burning request timeouts.
    fn is_connected(&self) -> bool;
}
