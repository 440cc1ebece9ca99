//! Push channel frame codec
//!
//! The backend publishes events through Socket.IO, which over a raw WebSocket
//! means Engine.IO v4 text frames: a one-digit engine packet type, optionally
//! followed by a one-digit socket packet type and a JSON payload. Plain JSON
//! frames of the form `{"event": "...", "data": {...}}` are accepted as well.

use serde::Deserialize;
use serde_json::Value;

use crate::api::StatusPayload;
use crate::error::ClientError;
use crate::model::{ScriptId, ScriptStatus};

/// Socket packet that joins the default namespace
pub const CONNECT_PACKET: &str = "40";
/// Engine packet answering a server ping
pub const PONG_FRAME: &str = "3";

/// Normalized server event
#[derive(Clone, Debug, PartialEq)]
pub enum PushEvent {
    Connected,
    Disconnected,
    StatusUpdate(Vec<ScriptStatus>),
    LogUpdate { script_id: ScriptId, message: String },
    /// Events we do not act on, kept for logging
    Other { name: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Engine handshake carrying session parameters
    Open(Value),
    Close,
    Ping,
    Pong,
    Event(PushEvent),
    /// Namespace join refused
    ConnectError(String),
    Noop,
}

#[derive(Deserialize)]
struct LogUpdatePayload {
    script_id: String,
    message: String,
}

#[derive(Deserialize)]
struct PlainFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Decode one text frame
pub fn decode_frame(text: &str) -> Result<Frame, ClientError> {
    let text = text.trim();
    if text.starts_with('{') {
        let frame: PlainFrame = serde_json::from_str(text)
            .map_err(|e| ClientError::push(format!("bad json frame: {}", e)))?;
        return decode_event(&frame.event, frame.data).map(Frame::Event);
    }

    let mut chars = text.chars();
    let engine = chars
        .next()
        .ok_or_else(|| ClientError::push("empty frame"))?;
    let rest = chars.as_str();

    match engine {
        '0' => {
            let value = serde_json::from_str(rest).unwrap_or(Value::Null);
            Ok(Frame::Open(value))
        }
        '1' => Ok(Frame::Close),
        '2' => Ok(Frame::Ping),
        '3' => Ok(Frame::Pong),
        '4' => decode_socket_packet(rest),
        '6' => Ok(Frame::Noop),
        other => Err(ClientError::push(format!("unknown engine packet '{}'", other))),
    }
}

fn decode_socket_packet(packet: &str) -> Result<Frame, ClientError> {
    let mut chars = packet.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ClientError::push("empty socket packet"))?;
    let body = skip_ack_id(skip_namespace(chars.as_str()));

    match kind {
        '0' => Ok(Frame::Event(PushEvent::Connected)),
        '1' => Ok(Frame::Event(PushEvent::Disconnected)),
        '2' => {
            let array: Vec<Value> = serde_json::from_str(body)
                .map_err(|e| ClientError::push(format!("bad event payload: {}", e)))?;
            let mut items = array.into_iter();
            let name = match items.next() {
                Some(Value::String(name)) => name,
                _ => return Err(ClientError::push("event without a name")),
            };
            let data = items.next().unwrap_or(Value::Null);
            decode_event(&name, data).map(Frame::Event)
        }
        '4' => {
            let message = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| body.to_string());
            Ok(Frame::ConnectError(message))
        }
        _ => Ok(Frame::Noop),
    }
}

fn skip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        match body.find(',') {
            Some(idx) => &body[idx + 1..],
            None => "",
        }
    } else {
        body
    }
}

fn skip_ack_id(body: &str) -> &str {
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

/// Map an event name and its data onto a [`PushEvent`]
pub fn decode_event(name: &str, data: Value) -> Result<PushEvent, ClientError> {
    match name {
        "connect" => Ok(PushEvent::Connected),
        "disconnect" => Ok(PushEvent::Disconnected),
        "status_update" => {
            let payload: StatusPayload = serde_json::from_value(data)
                .map_err(|e| ClientError::push(format!("bad status_update: {}", e)))?;
            Ok(PushEvent::StatusUpdate(payload.status))
        }
        "log_update" => {
            let payload: LogUpdatePayload = serde_json::from_value(data)
                .map_err(|e| ClientError::push(format!("bad log_update: {}", e)))?;
            Ok(PushEvent::LogUpdate {
                script_id: payload.script_id,
                message: payload.message,
            })
        }
        other => Ok(PushEvent::Other {
            name: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_handshake_and_ping() {
        let frame = decode_frame(r#"0{"sid":"abc","pingInterval":25000}"#).unwrap();
        assert!(matches!(frame, Frame::Open(v) if v["sid"] == "abc"));
        assert_eq!(decode_frame("2").unwrap(), Frame::Ping);
        assert_eq!(decode_frame("6").unwrap(), Frame::Noop);
    }

    #[test]
    fn test_namespace_connect_and_disconnect() {
        assert_eq!(
            decode_frame(r#"40{"sid":"x"}"#).unwrap(),
            Frame::Event(PushEvent::Connected)
        );
        assert_eq!(decode_frame("41").unwrap(), Frame::Event(PushEvent::Disconnected));
    }

    #[test]
    fn test_status_update_event() {
        let frame = decode_frame(
            r#"42["status_update",{"status":[{"id":"a","name":"A","status":"stopped"}]}]"#,
        )
        .unwrap();
        match frame {
            Frame::Event(PushEvent::StatusUpdate(entries)) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].id, "a");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_status_update_keeps_good_entries() {
        let frame = decode_frame(
            r#"42["status_update",{"status":[{"id":"a","status":"stopped"},{"id":"bad","status":"running"},{"id":"b","status":"running","pid":7,"start_time":1714557600}]}]"#,
        )
        .unwrap();
        match frame {
            Frame::Event(PushEvent::StatusUpdate(entries)) => {
                let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
                assert_eq!(ids, vec!["a", "b"]);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_log_update_with_namespace_and_ack() {
        let frame =
            decode_frame(r#"42/admin,7["log_update",{"script_id":"etl","message":"hi\n"}]"#)
                .unwrap();
        assert_eq!(
            frame,
            Frame::Event(PushEvent::LogUpdate {
                script_id: "etl".into(),
                message: "hi\n".into()
            })
        );
    }

    #[test]
    fn test_plain_json_frame() {
        let frame = decode_frame(r#"{"event":"log_update","data":{"script_id":"manager","message":"m"}}"#)
            .unwrap();
        assert!(matches!(
            frame,
            Frame::Event(PushEvent::LogUpdate { ref script_id, .. }) if script_id == "manager"
        ));
    }

    #[test]
    fn test_unknown_event_is_other() {
        let frame = decode_frame(r#"42["connected",{"message":"hello"}]"#).unwrap();
        assert_eq!(
            frame,
            Frame::Event(PushEvent::Other {
                name: "connected".into()
            })
        );
    }

    #[test]
    fn test_connect_error_message() {
        let frame = decode_frame(r#"44{"message":"Not authorized"}"#).unwrap();
        assert_eq!(frame, Frame::ConnectError("Not authorized".into()));
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(decode_frame("").is_err());
        assert!(decode_frame("9").is_err());
        assert!(decode_frame(r#"42["status_update",{"status":"nope"}]"#).is_err());
    }
}
