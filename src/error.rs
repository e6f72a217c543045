use thiserror::Error;

/// Rejections produced while applying a client intent to a room.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room {0} does not exist")]
    NotFound(String),
    #[error("Room {0} already exists")]
    AlreadyExists(String),
    #[error("The name {0} is already in use in this room")]
    NameTaken(String),
    #[error("You are not a member of room {0}")]
    NotMember(String),
    #[error("Only the host can change edit permissions")]
    NotHost,
    #[error("You do not have permission to edit the code")]
    EditDenied,
    #[error("{0} is not in this room")]
    UnknownUser(String),
    #[error("The host always keeps edit permission")]
    CannotRevokeHost,
    #[error("Invalid room id")]
    InvalidRoomId,
    #[error("Invalid name")]
    InvalidName,
    #[error("Invalid language")]
    InvalidLanguage,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Message exceeds {0} characters")]
    MessageTooLong(usize),
    #[error("Code exceeds {0} bytes")]
    CodeTooLarge(usize),
}

/// Failures decoding Engine.IO / Socket.IO frames and event payloads.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Empty packet")]
    Empty,
    #[error("Unknown packet type {0:?}")]
    UnknownPacketType(char),
    #[error("Namespace {0} is not served")]
    UnsupportedNamespace(String),
    #[error("Binary packets are not supported")]
    BinaryUnsupported,
    #[error("Invalid packet JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("Event packet does not start with an event name")]
    NotAnEvent,
    #[error("Unknown event {0}")]
    UnknownEvent(String),
    #[error("Bad payload for {event}: {source}")]
    BadPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("No certificate found in {0}")]
    NoCertificates(String),
    #[error("No private key found in {0}")]
    NoPrivateKey(String),
}
