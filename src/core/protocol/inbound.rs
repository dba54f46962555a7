// src/core/protocol/inbound.rs

//! Parsing of client-to-server event frames.

use crate::core::RelayError;
use crate::core::state::ConnectionId;
use serde::Deserialize;
use serde_json::value::RawValue;
use std::str::FromStr;
use strum_macros::{AsRefStr, EnumString};

/// The raw envelope of an inbound frame. `data` is kept unparsed so payloads
/// can be relayed byte-for-byte.
#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Option<Box<RawValue>>,
}

/// Inbound event names, exactly as clients send them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "camelCase")]
enum InboundKind {
    FindPartner,
    FindTextChat,
    CallUser,
    AnswerCall,
    EndCall,
    SendMessage,
    Typing,
}

/// `callUser`: the caller names its target explicitly.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallUserPayload {
    pub user_to_call: ConnectionId,
    #[serde(default)]
    pub signal_data: Option<Box<RawValue>>,
    #[serde(default)]
    pub from: Option<Box<RawValue>>,
    #[serde(default)]
    pub name: Option<Box<RawValue>>,
}

/// `answerCall`: the callee answers the caller named in `to`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerCallPayload {
    pub to: ConnectionId,
    #[serde(default)]
    pub signal: Option<Box<RawValue>>,
}

/// A decoded client event.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    FindPartner,
    FindTextChat,
    CallUser(CallUserPayload),
    AnswerCall(AnswerCallPayload),
    EndCall,
    SendMessage(Box<RawValue>),
    Typing,
}

impl InboundEvent {
    /// Decodes one text frame.
    ///
    /// Unknown event names, malformed JSON and missing required payload fields
    /// are all reported as `RelayError::Protocol`.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let frame: RawFrame = serde_json::from_str(text)
            .map_err(|e| RelayError::Protocol(format!("malformed frame: {e}")))?;
        let kind = InboundKind::from_str(&frame.event)
            .map_err(|_| RelayError::Protocol(format!("unknown event '{}'", frame.event)))?;

        let event = match kind {
            InboundKind::FindPartner => InboundEvent::FindPartner,
            InboundKind::FindTextChat => InboundEvent::FindTextChat,
            InboundKind::EndCall => InboundEvent::EndCall,
            InboundKind::Typing => InboundEvent::Typing,
            InboundKind::CallUser => InboundEvent::CallUser(payload(kind, frame.data)?),
            InboundKind::AnswerCall => InboundEvent::AnswerCall(payload(kind, frame.data)?),
            InboundKind::SendMessage => match frame.data {
                Some(message) => InboundEvent::SendMessage(message),
                None => {
                    return Err(RelayError::Protocol(
                        "sendMessage requires a message".to_string(),
                    ));
                }
            },
        };
        Ok(event)
    }

    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::FindPartner => "findPartner",
            InboundEvent::FindTextChat => "findTextChat",
            InboundEvent::CallUser(_) => "callUser",
            InboundEvent::AnswerCall(_) => "answerCall",
            InboundEvent::EndCall => "endCall",
            InboundEvent::SendMessage(_) => "sendMessage",
            InboundEvent::Typing => "typing",
        }
    }
}

fn payload<T: for<'de> Deserialize<'de>>(
    kind: InboundKind,
    data: Option<Box<RawValue>>,
) -> Result<T, RelayError> {
    let data = data.ok_or_else(|| {
        RelayError::Protocol(format!("{} requires a payload", kind.as_ref()))
    })?;
    serde_json::from_str(data.get())
        .map_err(|e| RelayError::Protocol(format!("invalid {} payload: {e}", kind.as_ref())))
}
