//! Payload formats accepted by the commands.
//!
//! HTTP and socket commands take either a bare URL or a JSON object:
//!
//! ```json
//! {
//!   "url": "https://example.com/api",
//!   "headers": {"Content-Type": "application/json", "X-Key": "abc"},
//!   "payload": "{\"hello\":\"world\"}"
//! }
//! ```
//!
//! Header order in the object is kept and applied in that order.
//! `[WIFI/SAVE]` takes `{"ssid": "...", "password": "...", "connect": true}`.

use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;

use flipper_bridge_core::{BodyMode, BridgeError, HttpMethod, RequestDescriptor, SocketTarget, WifiCredentials};

#[derive(Debug, Deserialize)]
struct RequestPayload {
    url: String,
    #[serde(default, deserialize_with = "ordered_headers")]
    headers: Vec<(String, String)>,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SocketPayload {
    url: String,
    #[serde(default, deserialize_with = "ordered_headers")]
    headers: Vec<(String, String)>,
}

/// Parsed `[WIFI/SAVE]` payload. Credentials are not yet validated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WifiSaveRequest {
    pub ssid: String,
    pub password: String,
    /// Connect right after persisting.
    #[serde(default = "connect_by_default")]
    pub connect: bool,
}

fn connect_by_default() -> bool {
    true
}

impl WifiSaveRequest {
    pub fn credentials(&self) -> WifiCredentials {
        WifiCredentials {
            ssid: self.ssid.clone(),
            password: self.password.clone(),
        }
    }
}

/// Parse the payload of an HTTP command.
pub fn parse_request(
    method: HttpMethod,
    mode: BodyMode,
    payload: &str,
) -> Result<RequestDescriptor, BridgeError> {
    let payload = payload.trim();
    let request = if payload.starts_with('{') {
        let parsed: RequestPayload = from_json(payload)?;
        RequestDescriptor {
            method,
            mode,
            url: parsed.url,
            payload: parsed.payload.and_then(body_text),
            headers: parsed.headers,
        }
    } else {
        RequestDescriptor::new(method, payload).with_mode(mode)
    };

    require_scheme(&request.url, &["http", "https"])?;
    Ok(request)
}

/// Parse the payload of `[SOCKET/START]`.
pub fn parse_socket_target(payload: &str) -> Result<SocketTarget, BridgeError> {
    let payload = payload.trim();
    let target = if payload.starts_with('{') {
        let parsed: SocketPayload = from_json(payload)?;
        SocketTarget {
            url: parsed.url,
            headers: parsed.headers,
        }
    } else {
        SocketTarget::new(payload)
    };

    require_scheme(&target.url, &["ws", "wss"])?;
    Ok(target)
}

/// Parse the payload of `[WIFI/SAVE]`.
pub fn parse_wifi_save(payload: &str) -> Result<WifiSaveRequest, BridgeError> {
    from_json(payload.trim())
}

pub(crate) fn from_json<'a, T: Deserialize<'a>>(payload: &'a str) -> Result<T, BridgeError> {
    serde_json::from_str(payload)
        .map_err(|e| BridgeError::Parse(format!("Failed to parse JSON payload: {}", e)))
}

fn body_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

fn require_scheme(url: &str, schemes: &[&str]) -> Result<(), BridgeError> {
    if url.is_empty() {
        return Err(BridgeError::Parse("Missing URL".to_string()));
    }
    match url.split_once("://") {
        Some((scheme, rest))
            if !rest.is_empty() && schemes.iter().any(|s| s.eq_ignore_ascii_case(scheme)) =>
        {
            Ok(())
        }
        _ => Err(BridgeError::Parse(format!(
            "Unsupported URL '{}' (expected {})",
            url,
            schemes.join(" or ")
        ))),
    }
}

/// Deserialize a JSON object into `(name, value)` pairs in document order.
///
/// Non-string values are written in their JSON form; `null` means no headers.
fn ordered_headers<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct HeaderVisitor;

    impl<'de> Visitor<'de> for HeaderVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object mapping header names to values")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut headers = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, value)) = map.next_entry::<String, Value>()? {
                let value = match value {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                headers.push((name, value));
            }
            Ok(headers)
        }
    }

    deserializer.deserialize_any(HeaderVisitor)
}
