use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec;
use crate::error::ProtocolError;
use crate::room::{ChatMessage, RoomInfo, RoomUser};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomPayload {
    room_id: String,
    host_username: String,
    language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRoomPayload {
    room_id: String,
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessagePayload {
    room_id: String,
    username: String,
    message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunCodePayload {
    code: String,
    room_id: String,
}

/// Intents a client emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    CreateRoom {
        room_id: String,
        host_username: String,
        language: String,
    },
    JoinRoom {
        room_id: String,
        name: String,
    },
    LeaveRoom {
        room_id: String,
    },
    SendMessage {
        room_id: String,
        username: String,
        message: String,
    },
    RunCode {
        code: String,
        room_id: String,
    },
    EditUser {
        acting: String,
        target: String,
        room_id: String,
    },
    RemoveUser {
        acting: String,
        target: String,
        room_id: String,
    },
}

impl ClientEvent {
    /// Builds an event from the argument list of a Socket.IO event packet,
    /// whose first element is the event name.
    pub fn from_args(mut args: Vec<Value>) -> Result<Self, ProtocolError> {
        if args.is_empty() {
            return Err(ProtocolError::NotAnEvent);
        }
        let Value::String(name) = args.remove(0) else {
            return Err(ProtocolError::NotAnEvent);
        };

        let event = match name.as_str() {
            "create-room" => {
                let p: CreateRoomPayload = first_arg(&name, args)?;
                ClientEvent::CreateRoom {
                    room_id: p.room_id,
                    host_username: p.host_username,
                    language: p.language,
                }
            }
            "join-room" => {
                let p: JoinRoomPayload = first_arg(&name, args)?;
                ClientEvent::JoinRoom {
                    room_id: p.room_id,
                    name: p.name,
                }
            }
            "leave-room" => ClientEvent::LeaveRoom {
                room_id: first_arg(&name, args)?,
            },
            "send-message" => {
                let p: SendMessagePayload = first_arg(&name, args)?;
                ClientEvent::SendMessage {
                    room_id: p.room_id,
                    username: p.username,
                    message: p.message,
                }
            }
            "run-code" => {
                let p: RunCodePayload = first_arg(&name, args)?;
                ClientEvent::RunCode {
                    code: p.code,
                    room_id: p.room_id,
                }
            }
            "edit-user" => {
                let (acting, target, room_id) = positional(&name, args)?;
                ClientEvent::EditUser { acting, target, room_id }
            }
            "remove-user" => {
                let (acting, target, room_id) = positional(&name, args)?;
                ClientEvent::RemoveUser { acting, target, room_id }
            }
            _ => return Err(ProtocolError::UnknownEvent(name)),
        };
        Ok(event)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::CreateRoom { .. } => "create-room",
            ClientEvent::JoinRoom { .. } => "join-room",
            ClientEvent::LeaveRoom { .. } => "leave-room",
            ClientEvent::SendMessage { .. } => "send-message",
            ClientEvent::RunCode { .. } => "run-code",
            ClientEvent::EditUser { .. } => "edit-user",
            ClientEvent::RemoveUser { .. } => "remove-user",
        }
    }
}

fn first_arg<T: DeserializeOwned>(event: &str, args: Vec<Value>) -> Result<T, ProtocolError> {
    let value = args.into_iter().next().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|source| ProtocolError::BadPayload {
        event: event.to_string(),
        source,
    })
}

// Trailing arguments beyond the three expected are ignored, as Socket.IO clients do.
fn positional(event: &str, args: Vec<Value>) -> Result<(String, String, String), ProtocolError> {
    let head: Vec<Value> = args.into_iter().take(3).collect();
    serde_json::from_value(Value::Array(head)).map_err(|source| ProtocolError::BadPayload {
        event: event.to_string(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreated {
    pub room_id: String,
    pub language: String,
}

/// Events the server emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    RoomCreated(RoomCreated),
    RoomInfo(RoomInfo),
    RoomUsers(Vec<RoomUser>),
    PreviousMessages(Vec<ChatMessage>),
    ReceiveMessage(ChatMessage),
    PreviousCode(String),
    DisplayCode(String),
    JoinError(String),
    CreateError(String),
    ActionError(String),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::RoomCreated(_) => "room-created",
            ServerEvent::RoomInfo(_) => "room-info",
            ServerEvent::RoomUsers(_) => "room-users",
            ServerEvent::PreviousMessages(_) => "previous-messages",
            ServerEvent::ReceiveMessage(_) => "receive-message",
            ServerEvent::PreviousCode(_) => "previous-code",
            ServerEvent::DisplayCode(_) => "display-code",
            ServerEvent::JoinError(_) => "join-error",
            ServerEvent::CreateError(_) => "create-error",
            ServerEvent::ActionError(_) => "action-error",
        }
    }

    /// Encodes the event as a Socket.IO text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        let name = self.name();
        match self {
            ServerEvent::RoomCreated(created) => codec::encode_event(name, created),
            ServerEvent::RoomInfo(info) => codec::encode_event(name, info),
            ServerEvent::RoomUsers(users) => codec::encode_event(name, users),
            ServerEvent::PreviousMessages(messages) => codec::encode_event(name, messages),
            ServerEvent::ReceiveMessage(message) => codec::encode_event(name, message),
            ServerEvent::PreviousCode(text)
            | ServerEvent::DisplayCode(text)
            | ServerEvent::JoinError(text)
            | ServerEvent::CreateError(text)
            | ServerEvent::ActionError(text) => codec::encode_event(name, text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(args: Value) -> Result<ClientEvent, ProtocolError> {
        let Value::Array(args) = args else {
            panic!("test args must be an array");
        };
        ClientEvent::from_args(args)
    }

    #[test]
    fn parses_object_payload_events() {
        assert_eq!(
            parse(json!(["create-room", {"roomId": "ABC123", "hostUsername": "Alice", "language": "python"}])).unwrap(),
            ClientEvent::CreateRoom {
                room_id: "ABC123".into(),
                host_username: "Alice".into(),
                language: "python".into(),
            }
        );
        assert_eq!(
            parse(json!(["join-room", {"roomId": "ABC123", "name": "Bob"}])).unwrap(),
            ClientEvent::JoinRoom {
                room_id: "ABC123".into(),
                name: "Bob".into(),
            }
        );
        assert_eq!(
            parse(json!(["send-message", {"roomId": "ABC123", "username": "Bob", "message": "hi"}])).unwrap(),
            ClientEvent::SendMessage {
                room_id: "ABC123".into(),
                username: "Bob".into(),
                message: "hi".into(),
            }
        );
        assert_eq!(
            parse(json!(["run-code", {"code": "x = 1", "roomId": "ABC123"}])).unwrap(),
            ClientEvent::RunCode {
                code: "x = 1".into(),
                room_id: "ABC123".into(),
            }
        );
    }

    #[test]
    fn parses_positional_events() {
        assert_eq!(
            parse(json!(["edit-user", "Alice", "Bob", "ABC123"])).unwrap(),
            ClientEvent::EditUser {
                acting: "Alice".into(),
                target: "Bob".into(),
                room_id: "ABC123".into(),
            }
        );
        assert_eq!(
            parse(json!(["remove-user", "Alice", "Bob", "ABC123"])).unwrap().name(),
            "remove-user"
        );
        assert_eq!(
            parse(json!(["leave-room", "ABC123"])).unwrap(),
            ClientEvent::LeaveRoom { room_id: "ABC123".into() }
        );
    }

    #[test]
    fn rejects_unknown_events_and_bad_payloads() {
        assert!(matches!(parse(json!(["disconnecting"])), Err(ProtocolError::UnknownEvent(e)) if e == "disconnecting"));
        assert!(matches!(
            parse(json!(["join-room", {"roomId": "ABC123"}])),
            Err(ProtocolError::BadPayload { event, .. }) if event == "join-room"
        ));
        assert!(matches!(parse(json!(["edit-user", "Alice"])), Err(ProtocolError::BadPayload { .. })));
        assert!(matches!(parse(json!(["leave-room"])), Err(ProtocolError::BadPayload { .. })));
        assert!(matches!(parse(json!([])), Err(ProtocolError::NotAnEvent)));
    }

    #[test]
    fn server_events_use_client_field_names() {
        let frame = ServerEvent::RoomInfo(RoomInfo {
            host_username: "Alice".into(),
            editable_users: vec!["Alice".into()],
        })
        .to_frame()
        .unwrap();
        assert_eq!(frame, r#"42["room-info",{"hostUsername":"Alice","editableUsers":["Alice"]}]"#);

        let frame = ServerEvent::RoomUsers(vec![RoomUser {
            username: "Bob".into(),
            socket_id: "s1".into(),
        }])
        .to_frame()
        .unwrap();
        assert_eq!(frame, r#"42["room-users",[{"username":"Bob","socketId":"s1"}]]"#);

        let frame = ServerEvent::RoomCreated(RoomCreated {
            room_id: "ABC123".into(),
            language: "python".into(),
        })
        .to_frame()
        .unwrap();
        assert_eq!(frame, r#"42["room-created",{"roomId":"ABC123","language":"python"}]"#);

        let frame = ServerEvent::JoinError("Room X does not exist".into()).to_frame().unwrap();
        assert_eq!(frame, r#"42["join-error","Room X does not exist"]"#);
    }
}
