use crate::protocol::ResponseKind;
use thiserror::Error;

/// Result type for pianobar operations
pub type Result<T> = std::result::Result<T, PianobarError>;

/// Errors that can occur when interacting with a pianobar bridge
#[derive(Error, Debug)]
pub enum PianobarError {
    /// Could not establish the WebSocket session
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The session ended or failed while reading
    #[error(transparent)]
    Recv(#[from] RecvError),

    /// A command could not be written
    #[error(transparent)]
    Send(#[from] SendError),

    /// An inbound frame could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A command was built from invalid arguments
    #[error(transparent)]
    Command(#[from] CommandError),

    /// No reply event arrived in time for a query command
    #[error("Timed out waiting for {0} reply")]
    ResponseTimeout(ResponseKind),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Failure to establish a session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Handshake did not complete within the connect timeout
    #[error("Connection timeout")]
    Timeout,

    /// Transport-level rejection (DNS, TCP refusal, bad handshake)
    #[error("Connection refused: {0}")]
    Refused(String),
}

/// Failure while waiting for the next frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecvError {
    /// Peer closed the connection cleanly
    #[error("Connection closed")]
    Closed,

    /// Connection terminated abnormally
    #[error("Connection broken: {0}")]
    Broken(String),
}

/// Failure to write a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// No session is in the Connected state
    #[error("Not connected")]
    NotConnected,

    /// Outbound queue stayed full for the whole send timeout
    #[error("Send timeout")]
    Timeout,

    /// The command has no wire representation
    #[error("Command cannot be encoded: {0}")]
    EncodeFailure(String),
}

/// Failure to decode an inbound frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not valid JSON, or a known event missing required fields
    #[error("Malformed frame: {0}")]
    Malformed(String),
}

/// Rejected command arguments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// An argument was missing, empty or out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
