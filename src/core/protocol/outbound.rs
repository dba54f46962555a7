// src/core/protocol/outbound.rs

//! Server-to-client events and their wire encoding.

use crate::core::RelayError;
use crate::core::state::ConnectionId;
use serde::Serialize;
use serde_json::value::RawValue;

/// A payload field that is either relayed verbatim from a client or produced
/// by the server.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum WireValue {
    Raw(Box<RawValue>),
    Text(String),
    Null,
}

impl From<Option<Box<RawValue>>> for WireValue {
    fn from(value: Option<Box<RawValue>>) -> Self {
        value.map_or(WireValue::Null, WireValue::Raw)
    }
}

impl WireValue {
    pub fn text(s: impl Into<String>) -> Self {
        WireValue::Text(s.into())
    }
}

/// An event the relay sends to a client.
#[derive(Debug, Clone)]
pub enum OutboundEvent {
    /// Tells a freshly upgraded socket its own connection id.
    Connected { id: ConnectionId },
    UpdateUserCount(usize),
    /// Sent to the designated caller of a new video pair.
    PartnerFound { partner_id: ConnectionId },
    CallUser {
        from: WireValue,
        signal: WireValue,
        name: WireValue,
    },
    CallAccepted(WireValue),
    CallEnded,
    ChatConnected,
    ChatDisconnected,
    ReceiveMessage(Box<RawValue>),
    Typing,
}

#[derive(Serialize)]
struct OutgoingFrame<'a, T> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
}

#[derive(Serialize)]
struct ConnectedData<'a> {
    id: &'a ConnectionId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PartnerFoundData<'a> {
    partner_id: &'a ConnectionId,
}

#[derive(Serialize)]
struct CallUserData<'a> {
    from: &'a WireValue,
    signal: &'a WireValue,
    name: &'a WireValue,
}

impl OutboundEvent {
    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::Connected { .. } => "connected",
            OutboundEvent::UpdateUserCount(_) => "updateUserCount",
            OutboundEvent::PartnerFound { .. } => "partnerFound",
            OutboundEvent::CallUser { .. } => "callUser",
            OutboundEvent::CallAccepted(_) => "callAccepted",
            OutboundEvent::CallEnded => "callEnded",
            OutboundEvent::ChatConnected => "chatConnected",
            OutboundEvent::ChatDisconnected => "chatDisconnected",
            OutboundEvent::ReceiveMessage(_) => "receiveMessage",
            OutboundEvent::Typing => "typing",
        }
    }

    /// Encodes the event as a JSON text frame.
    pub fn encode(&self) -> Result<String, RelayError> {
        let event = self.name();
        let json = match self {
            OutboundEvent::Connected { id } => frame(event, Some(&ConnectedData { id })),
            OutboundEvent::UpdateUserCount(count) => frame(event, Some(count)),
            OutboundEvent::PartnerFound { partner_id } => {
                frame(event, Some(&PartnerFoundData { partner_id }))
            }
            OutboundEvent::CallUser { from, signal, name } => {
                frame(event, Some(&CallUserData { from, signal, name }))
            }
            OutboundEvent::CallAccepted(signal) => frame(event, Some(signal)),
            OutboundEvent::ReceiveMessage(message) => frame(event, Some(message)),
            OutboundEvent::CallEnded
            | OutboundEvent::ChatConnected
            | OutboundEvent::ChatDisconnected
            | OutboundEvent::Typing => frame::<()>(event, None),
        }?;
        Ok(json)
    }
}

fn frame<T: Serialize>(event: &str, data: Option<&T>) -> Result<String, serde_json::Error> {
    serde_json::to_string(&OutgoingFrame { event, data })
}
