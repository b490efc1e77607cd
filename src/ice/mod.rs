//! ICE (Interactive Connectivity Establishment) configuration.
//!
//! Holds the STUN/TURN descriptors handed to every new peer connection and
//! the provider that keeps them fresh.

pub mod provider;

pub use provider::*;

use serde::{Deserialize, Deserializer, Serialize};
use webrtc::ice_transport::ice_server::RTCIceServer;

/// Public STUN server used when nothing better is known.
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// ICE server descriptor as exchanged on the wire
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    #[serde(deserialize_with = "one_or_many")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    /// Create a STUN-only server config
    pub fn stun(url: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: None,
            credential: None,
        }
    }

    /// Create a TURN server config with credentials
    pub fn turn(url: &str, username: &str, credential: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: Some(username.to_string()),
            credential: Some(credential.to_string()),
        }
    }

    /// Convert to webrtc-rs RTCIceServer
    pub fn to_rtc_ice_server(&self) -> RTCIceServer {
        RTCIceServer {
            urls: self.urls.clone(),
            username: self.username.clone().unwrap_or_default(),
            credential: self.credential.clone().unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// The public STUN fallback
pub fn default_stun_server() -> IceServerConfig {
    IceServerConfig::stun(DEFAULT_STUN_URL)
}

/// Prepend the default STUN entry unless the list already starts with it.
pub fn with_default_stun(servers: Vec<IceServerConfig>) -> Vec<IceServerConfig> {
    let default = default_stun_server();
    if servers.first() == Some(&default) {
        return servers;
    }
    let mut merged = Vec::with_capacity(servers.len() + 1);
    merged.push(default);
    merged.extend(servers);
    merged
}

// `urls` may be a bare string or an array of strings.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Urls {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Urls::deserialize(deserializer)? {
        Urls::One(url) => vec![url],
        Urls::Many(urls) => urls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_accepts_string_or_array() {
        let single: IceServerConfig =
            serde_json::from_str(r#"{"urls":"stun:a:3478"}"#).unwrap();
        assert_eq!(single.urls, vec!["stun:a:3478"]);

        let many: IceServerConfig = serde_json::from_str(
            r#"{"urls":["turn:a:3478","turns:a:5349"],"username":"u","credential":"c"}"#,
        )
        .unwrap();
        assert_eq!(many.urls.len(), 2);
        assert_eq!(many.username.as_deref(), Some("u"));
    }

    #[test]
    fn test_with_default_stun_prepends_once() {
        let turn = IceServerConfig::turn("turn:example:3478", "u", "c");
        let merged = with_default_stun(vec![turn.clone()]);
        assert_eq!(merged, vec![default_stun_server(), turn]);
        assert_eq!(with_default_stun(merged.clone()), merged);
        assert_eq!(with_default_stun(Vec::new()), vec![default_stun_server()]);
    }

    #[test]
    fn test_rtc_ice_server_conversion() {
        let rtc = IceServerConfig::stun(DEFAULT_STUN_URL).to_rtc_ice_server();
        assert_eq!(rtc.urls, vec![DEFAULT_STUN_URL.to_string()]);
        assert!(rtc.username.is_empty());
    }
}
