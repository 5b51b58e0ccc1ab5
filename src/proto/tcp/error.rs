use thiserror::Error;

use super::conn::ConnectionId;

/// Errors surfaced to the application layer. Network anomalies never show up
/// here; they are absorbed by the protocol.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TcpError {
    #[error("no connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
    #[error("connection {0} is not established yet")]
    NotEstablished(ConnectionId),
}
