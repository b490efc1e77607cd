//! Inbound message dispatch.
//!
//! The router is keyed by [`MessageKind`]. It handles the kinds that only
//! touch shared state itself (`ice-servers`) and forwards the rest to a
//! [`MessageHandler`], normally the session controller.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;

use super::message::{MessageBody, SignalingMessage};
use crate::client_id::ClientId;
use crate::ice::IceServerProvider;
use crate::peer::IceCandidateInfo;

/// Log line used when a `server-response` carries no message text
pub const DEFAULT_SERVER_RESPONSE: &str = "Audio processed";

/// Receives the routed messages.
#[async_trait]
pub trait MessageHandler: Send {
    /// Remote offer. `sender` is set in the call variant.
    async fn on_offer(&mut self, sdp: String, sender: Option<ClientId>);

    async fn on_answer(&mut self, sdp: String);

    async fn on_remote_candidate(&mut self, candidate: IceCandidateInfo);

    /// Text for the server message log
    async fn on_server_response(&mut self, text: String);

    async fn on_remote_error(&mut self, text: String);
}

/// Dispatch table for inbound signaling messages
#[derive(Clone)]
pub struct MessageRouter {
    client_id: ClientId,
    ice: Arc<IceServerProvider>,
}

impl MessageRouter {
    pub fn new(client_id: ClientId, ice: Arc<IceServerProvider>) -> Self {
        Self { client_id, ice }
    }

    /// Route one message. Never fails; anything unusable is logged and
    /// dropped.
    pub async fn dispatch<H: MessageHandler + ?Sized>(&self, handler: &mut H, message: SignalingMessage) {
        // Several clients can share one channel in the call variant
        if let Some(target) = &message.target {
            if *target != self.client_id {
                debug!("Ignoring '{}' addressed to {}", message.kind_name(), target);
                return;
            }
        }

        let sdp = message.sdp().map(str::to_string);
        let sender = message.sender;

        match message.body {
            MessageBody::Offer { .. } => match sdp {
                Some(sdp) => handler.on_offer(sdp, sender).await,
                None => warn!("Offer without SDP dropped"),
            },
            MessageBody::Answer { .. } => match sdp {
                Some(sdp) => handler.on_answer(sdp).await,
                None => warn!("Answer without SDP dropped"),
            },
            MessageBody::IceCandidate { candidate } => match candidate {
                Some(candidate) => handler.on_remote_candidate(candidate).await,
                None => debug!("End-of-candidates marker ignored"),
            },
            MessageBody::IceServers { servers } => {
                self.ice.apply_server_push(servers);
            }
            MessageBody::ServerResponse { data } => {
                handler.on_server_response(server_response_text(&data)).await;
            }
            MessageBody::Error { error } => {
                let text = error.unwrap_or_else(|| "unknown server error".to_string());
                handler.on_remote_error(text).await;
            }
            MessageBody::Unknown(kind) => {
                warn!("Unknown signaling message type '{}' dropped", kind);
            }
        }
    }
}

fn server_response_text(data: &Value) -> String {
    data.get("message")
        .and_then(Value::as_str)
        .or_else(|| data.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SERVER_RESPONSE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ice::{default_stun_server, IceServerConfig};
    use crate::session::testing::ScriptedCredentials;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn on_offer(&mut self, sdp: String, sender: Option<ClientId>) {
            self.calls.push(format!("offer {} from {:?}", sdp, sender.map(|s| s.to_string())));
        }
        async fn on_answer(&mut self, sdp: String) {
            self.calls.push(format!("answer {}", sdp));
        }
        async fn on_remote_candidate(&mut self, candidate: IceCandidateInfo) {
            self.calls.push(format!("candidate {}", candidate.candidate));
        }
        async fn on_server_response(&mut self, text: String) {
            self.calls.push(format!("response {}", text));
        }
        async fn on_remote_error(&mut self, text: String) {
            self.calls.push(format!("error {}", text));
        }
    }

    fn router() -> MessageRouter {
        let ice = IceServerProvider::new(Arc::new(ScriptedCredentials::failing()), Duration::from_secs(1));
        MessageRouter::new(ClientId::from("client-me"), Arc::new(ice))
    }

    async fn route(router: &MessageRouter, recorder: &mut Recorder, text: &str) {
        let msg = SignalingMessage::parse(text).unwrap();
        router.dispatch(recorder, msg).await;
    }

    #[tokio::test]
    async fn test_dispatch_by_kind() {
        let router = router();
        let mut rec = Recorder::default();
        route(&router, &mut rec, r#"{"type":"answer","sdp":"v=0 a"}"#).await;
        route(&router, &mut rec, r#"{"type":"offer","sender":"client-b","offer":{"type":"offer","sdp":"v=0 o"}}"#).await;
        route(&router, &mut rec, r#"{"type":"ice-candidate","candidate":{"candidate":"candidate:1"}}"#).await;
        route(&router, &mut rec, r#"{"type":"server-response","data":{"message":"ok"}}"#).await;
        route(&router, &mut rec, r#"{"type":"server-response","data":{}}"#).await;
        route(&router, &mut rec, r#"{"type":"error","error":"busy"}"#).await;

        assert_eq!(
            rec.calls,
            vec![
                "answer v=0 a",
                "offer v=0 o from Some(\"client-b\")",
                "candidate candidate:1",
                "response ok",
                "response Audio processed",
                "error busy",
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_and_empty_messages_are_dropped() {
        let router = router();
        let mut rec = Recorder::default();
        route(&router, &mut rec, r#"{"type":"room-stats","count":2}"#).await;
        route(&router, &mut rec, r#"{"type":"answer"}"#).await;
        route(&router, &mut rec, r#"{"type":"ice-candidate"}"#).await;
        assert!(rec.calls.is_empty());
    }

    #[tokio::test]
    async fn test_messages_for_other_clients_are_ignored() {
        let router = router();
        let mut rec = Recorder::default();
        route(&router, &mut rec, r#"{"type":"answer","sdp":"v=0","target":"client-other"}"#).await;
        route(&router, &mut rec, r#"{"type":"answer","sdp":"v=0","target":"client-me"}"#).await;
        assert_eq!(rec.calls, vec!["answer v=0"]);
    }

    #[tokio::test]
    async fn test_ice_servers_push_updates_provider() {
        let router = router();
        let mut rec = Recorder::default();
        route(
            &router,
            &mut rec,
            r#"{"type":"ice-servers","servers":[{"urls":["turn:example:3478"],"username":"u","credential":"c"}]}"#,
        )
        .await;
        assert_eq!(
            router.ice.current(),
            vec![default_stun_server(), IceServerConfig::turn("turn:example:3478", "u", "c")]
        );
        assert!(rec.calls.is_empty());
    }
}
