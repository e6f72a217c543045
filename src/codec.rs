//! Engine.IO v4 / Socket.IO v5 text framing over a websocket.
//!
//! An Engine.IO packet is a single type digit followed by its payload. The
//! `4` (message) packet carries a Socket.IO packet: a type digit, an optional
//! `/namespace,` prefix, an optional numeric ack id and a JSON body.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::error::ProtocolError;

pub const PING: &str = "2";
pub const PONG: &str = "3";

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Close,
    Ping,
    Pong,
    Noop,
    Connect,
    Disconnect,
    Event { ack: Option<u64>, args: Vec<Value> },
    Ack { id: u64 },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Handshake<'a> {
    sid: &'a str,
    upgrades: [&'a str; 0],
    ping_interval: u64,
    ping_timeout: u64,
    max_payload: usize,
}

#[derive(Serialize)]
struct ConnectAck<'a> {
    sid: &'a str,
}

#[derive(Serialize)]
struct ConnectError<'a> {
    message: &'a str,
}

pub fn decode(text: &str) -> Result<Packet, ProtocolError> {
    let mut chars = text.chars();
    match chars.next() {
        None => Err(ProtocolError::Empty),
        Some('1') => Ok(Packet::Close),
        Some('2') => Ok(Packet::Ping),
        Some('3') => Ok(Packet::Pong),
        // Upgrades only happen from polling, which is never offered.
        Some('5' | '6') => Ok(Packet::Noop),
        Some('4') => decode_socket_packet(chars.as_str()),
        Some(other) => Err(ProtocolError::UnknownPacketType(other)),
    }
}

fn decode_socket_packet(body: &str) -> Result<Packet, ProtocolError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(ProtocolError::Empty)?;
    let rest = chars.as_str();

    if matches!(kind, '5' | '6') {
        return Err(ProtocolError::BinaryUnsupported);
    }

    let rest = match rest.strip_prefix('/') {
        Some(after_slash) => {
            let (nsp, after) = after_slash.split_once(',').unwrap_or((after_slash, ""));
            if !nsp.is_empty() {
                return Err(ProtocolError::UnsupportedNamespace(format!("/{nsp}")));
            }
            after
        }
        None => rest,
    };

    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    let (id, json) = rest.split_at(digits);
    let ack = id.parse::<u64>().ok();

    match kind {
        '0' => Ok(Packet::Connect),
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let value: Value = serde_json::from_str(json).map_err(ProtocolError::InvalidJson)?;
            let Value::Array(args) = value else {
                return Err(ProtocolError::NotAnEvent);
            };
            if !matches!(args.first(), Some(Value::String(_))) {
                return Err(ProtocolError::NotAnEvent);
            }
            Ok(Packet::Event { ack, args })
        }
        '3' => ack.map(|id| Packet::Ack { id }).ok_or(ProtocolError::NotAnEvent),
        other => Err(ProtocolError::UnknownPacketType(other)),
    }
}

/// The Engine.IO open packet sent as soon as the websocket is accepted.
pub fn open_packet(sid: &str, ping_interval: Duration, ping_timeout: Duration, max_payload: usize) -> String {
    let handshake = Handshake {
        sid,
        upgrades: [],
        ping_interval: millis(ping_interval),
        ping_timeout: millis(ping_timeout),
        max_payload,
    };
    format!("0{}", json_or_empty(&handshake))
}

pub fn connect_ack(socket_id: &str) -> String {
    format!("40{}", json_or_empty(&ConnectAck { sid: socket_id }))
}

/// Refuses a namespace connect. Frames for any namespace but `/` carry it
/// as a prefix so the client can route the error.
pub fn connect_error(nsp: &str, message: &str) -> String {
    let body = json_or_empty(&ConnectError { message });
    if nsp.is_empty() || nsp == "/" {
        format!("44{body}")
    } else {
        format!("44{nsp},{body}")
    }
}

/// Frames a Socket.IO event carrying a single argument.
pub fn encode_event<T: Serialize>(name: &str, payload: &T) -> Result<String, serde_json::Error> {
    let body = serde_json::to_string(&(name, payload))?;
    Ok(format!("42{body}"))
}

pub fn encode_ack(id: u64) -> String {
    format!("43{id}[]")
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn json_or_empty<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}
