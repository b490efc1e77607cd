//! Signaling wire messages.
//!
//! Every message is a JSON object with a mandatory `type` field. Two SDP
//! encodings exist on the wire: the media-server uplink puts the SDP in a
//! flat `sdp` string, the peer-to-peer call nests a `{type, sdp}`
//! description under `offer`/`answer`. Both are accepted inbound.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client_id::ClientId;
use crate::error::{Result, SessionError};
use crate::ice::IceServerConfig;
use crate::peer::{IceCandidateInfo, SdpKind};

/// Nested session description (`{"type":"offer","sdp":"..."}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptionPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
}

/// How outbound offers/answers carry their SDP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpEncoding {
    /// `{"type":"offer","sdp":"v=0..."}`
    Flat,
    /// `{"type":"offer","offer":{"type":"offer","sdp":"v=0..."}}`
    Nested,
}

/// Message kinds, the dispatch key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Offer,
    Answer,
    IceCandidate,
    IceServers,
    ServerResponse,
    Error,
}

impl MessageKind {
    pub fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "offer" => Some(MessageKind::Offer),
            "answer" => Some(MessageKind::Answer),
            "ice-candidate" => Some(MessageKind::IceCandidate),
            "ice-servers" => Some(MessageKind::IceServers),
            "server-response" => Some(MessageKind::ServerResponse),
            "error" => Some(MessageKind::Error),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            MessageKind::Offer => "offer",
            MessageKind::Answer => "answer",
            MessageKind::IceCandidate => "ice-candidate",
            MessageKind::IceServers => "ice-servers",
            MessageKind::ServerResponse => "server-response",
            MessageKind::Error => "error",
        }
    }
}

/// Kind-specific payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessageBody {
    Offer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sdp: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offer: Option<SessionDescriptionPayload>,
    },
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sdp: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        answer: Option<SessionDescriptionPayload>,
    },
    IceCandidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        candidate: Option<IceCandidateInfo>,
    },
    IceServers {
        #[serde(default)]
        servers: Vec<IceServerConfig>,
    },
    ServerResponse {
        #[serde(default)]
        data: Value,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A kind this client does not know. Never sent.
    #[serde(skip)]
    Unknown(String),
}

/// One signaling message with its optional routing fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalingMessage {
    #[serde(flatten)]
    pub body: MessageBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<ClientId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ClientId>,
}

impl SignalingMessage {
    pub fn new(body: MessageBody) -> Self {
        Self {
            body,
            sender: None,
            target: None,
        }
    }

    /// Build an offer or answer carrying `sdp` in the given encoding
    pub fn description(kind: SdpKind, sdp: String, encoding: SdpEncoding) -> Self {
        let nested = |sdp: String| SessionDescriptionPayload {
            kind: kind.as_str().to_string(),
            sdp,
        };
        let body = match (kind, encoding) {
            (SdpKind::Offer, SdpEncoding::Flat) => MessageBody::Offer { sdp: Some(sdp), offer: None },
            (SdpKind::Offer, SdpEncoding::Nested) => MessageBody::Offer {
                sdp: None,
                offer: Some(nested(sdp)),
            },
            (SdpKind::Answer, SdpEncoding::Flat) => MessageBody::Answer { sdp: Some(sdp), answer: None },
            (SdpKind::Answer, SdpEncoding::Nested) => MessageBody::Answer {
                sdp: None,
                answer: Some(nested(sdp)),
            },
        };
        Self::new(body)
    }

    pub fn ice_candidate(candidate: IceCandidateInfo) -> Self {
        Self::new(MessageBody::IceCandidate {
            candidate: Some(candidate),
        })
    }

    /// Address the message: `sender` is this client, `target` the remote peer
    pub fn routed(mut self, sender: &ClientId, target: &ClientId) -> Self {
        self.sender = Some(sender.clone());
        self.target = Some(target.clone());
        self
    }

    /// The dispatch key, `None` for unknown kinds
    pub fn kind(&self) -> Option<MessageKind> {
        match &self.body {
            MessageBody::Offer { .. } => Some(MessageKind::Offer),
            MessageBody::Answer { .. } => Some(MessageKind::Answer),
            MessageBody::IceCandidate { .. } => Some(MessageKind::IceCandidate),
            MessageBody::IceServers { .. } => Some(MessageKind::IceServers),
            MessageBody::ServerResponse { .. } => Some(MessageKind::ServerResponse),
            MessageBody::Error { .. } => Some(MessageKind::Error),
            MessageBody::Unknown(_) => None,
        }
    }

    /// Wire name of the kind, including unknown ones
    pub fn kind_name(&self) -> &str {
        match &self.body {
            MessageBody::Unknown(kind) => kind,
            _ => self.kind().map(|k| k.as_wire()).unwrap_or_default(),
        }
    }

    /// SDP of an offer or answer, whichever encoding carried it
    pub fn sdp(&self) -> Option<&str> {
        let (flat, nested) = match &self.body {
            MessageBody::Offer { sdp, offer } => (sdp, offer),
            MessageBody::Answer { sdp, answer } => (sdp, answer),
            _ => return None,
        };
        flat.as_deref()
            .or_else(|| nested.as_ref().map(|d| d.sdp.as_str()))
            .filter(|s| !s.is_empty())
    }

    /// Serialize for the wire
    pub fn to_wire(&self) -> Result<String> {
        if let MessageBody::Unknown(kind) = &self.body {
            return Err(SessionError::Signaling(format!("cannot send unknown kind '{}'", kind)));
        }
        serde_json::to_string(self).map_err(|e| SessionError::Signaling(format!("encode failed: {}", e)))
    }

    /// Parse wire text. Malformed payloads are logged and yield `None`;
    /// well-formed messages of an unknown kind come back as
    /// [`MessageBody::Unknown`] so the router can log and drop them.
    pub fn parse(text: &str) -> Option<SignalingMessage> {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to parse signaling message: {}", e);
                return None;
            }
        };

        let kind = match value.get("type").and_then(Value::as_str) {
            Some(k) => k.to_string(),
            None => {
                warn!("Signaling message without 'type' field dropped");
                return None;
            }
        };

        if MessageKind::from_wire(&kind).is_none() {
            let routing = |field: &str| value.get(field).and_then(Value::as_str).map(ClientId::from);
            return Some(SignalingMessage {
                sender: routing("sender"),
                target: routing("target"),
                body: MessageBody::Unknown(kind),
            });
        }

        match serde_json::from_value::<SignalingMessage>(value) {
            Ok(msg) => Some(msg),
            Err(e) => {
                warn!("Malformed '{}' message dropped: {}", kind, e);
                None
            }
        }
    }
}
