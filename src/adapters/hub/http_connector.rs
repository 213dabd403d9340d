//! HTTP/WebSocket Hub Connector - negotiates sessions against the hub's
//! creation endpoint and opens the duplex channel.
//!
//! Session creation is a plain GET with browser-like headers. The response
//! body carries the conversation and client ids; the signature arrives
//! either in the body or, for the encrypted variant, in a response header.

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue as WsHeaderValue;

use super::websocket_channel::WebSocketChannel;
use crate::config::{parse_ipv4_range, HubConfig};
use crate::domain::hub::{SessionHandle, SessionSignature};
use crate::ports::{HubChannel, HubConnector, HubError};

const CREATE_PATH: &str = "/turing/conversation/create";
const ENCRYPTED_SIGNATURE_HEADER: &str = "x-sydney-encryptedconversationsignature";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36 Edg/113.0.1774.50";

/// Connection settings for the hub.
#[derive(Debug, Clone)]
pub struct HubConnectionConfig {
    /// Base URL for session creation.
    pub host: String,
    /// Duplex channel URL.
    pub websocket_url: String,
    /// Cookie header value.
    cookie: Option<Secret<String>>,
    /// Fixed IPv4 address or CIDR range for `x-forwarded-for`.
    pub x_forwarded_for: Option<String>,
    pub connect_timeout: Duration,
}

impl HubConnectionConfig {
    pub fn new(host: impl Into<String>, websocket_url: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            websocket_url: websocket_url.into(),
            cookie: None,
            x_forwarded_for: None,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the cookie header.
    pub fn with_cookie(mut self, cookie: Option<Secret<String>>) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_forwarded_for(mut self, value: Option<String>) -> Self {
        self.x_forwarded_for = value;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn create_url(&self) -> String {
        format!("{}{}", self.host.trim_end_matches('/'), CREATE_PATH)
    }
}

impl From<&HubConfig> for HubConnectionConfig {
    fn from(config: &HubConfig) -> Self {
        Self::new(config.host.clone(), config.websocket_url.clone())
            .with_cookie(config.cookie_header())
            .with_forwarded_for(config.x_forwarded_for.clone())
            .with_connect_timeout(config.connect_timeout())
    }
}

/// Hub connector over reqwest (session creation) and tokio-tungstenite
/// (duplex channel).
pub struct HttpHubConnector {
    config: HubConnectionConfig,
    client: Client,
    forwarded_for: Option<String>,
}

impl HttpHubConnector {
    /// Creates a connector.
    ///
    /// The `x-forwarded-for` address is resolved once here; a CIDR range
    /// yields one random address inside it.
    pub fn new(config: HubConnectionConfig) -> Result<Self, HubError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| HubError::transport(format!("failed to build HTTP client: {}", e)))?;

        let forwarded_for = config.x_forwarded_for.as_deref().and_then(|value| {
            let resolved = resolve_forwarded_for(value);
            if resolved.is_none() {
                tracing::warn!(value = %value, "ignoring invalid x-forwarded-for");
            }
            resolved
        });

        Ok(Self {
            config,
            client,
            forwarded_for,
        })
    }

    /// Headers sent on session creation and on the channel upgrade.
    fn session_headers(&self) -> Result<HeaderMap, HubError> {
        let mut headers = HeaderMap::new();
        let fixed: [(&str, &str); 18] = [
            ("accept", "application/json"),
            ("accept-language", "en-US,en;q=0.9"),
            ("content-type", "application/json"),
            ("sec-ch-ua", "\"Microsoft Edge\";v=\"113\", \"Chromium\";v=\"113\", \"Not-A.Brand\";v=\"24\""),
            ("sec-ch-ua-arch", "\"x86\""),
            ("sec-ch-ua-bitness", "\"64\""),
            ("sec-ch-ua-full-version", "\"113.0.1774.50\""),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-model", "\"\""),
            ("sec-ch-ua-platform", "\"Windows\""),
            ("sec-ch-ua-platform-version", "\"15.0.0\""),
            ("sec-fetch-dest", "empty"),
            ("sec-fetch-mode", "cors"),
            ("sec-fetch-site", "same-origin"),
            ("sec-ms-gec-version", "1-115.0.1866.1"),
            ("x-ms-useragent", "azsdk-js-api-client-factory/1.0.0-beta.1 core-rest-pipeline/1.10.0 OS/Win32"),
            ("referer", "https://www.bing.com/search?q=Bing+AI&showconv=1"),
            ("referrer-policy", "origin-when-cross-origin"),
        ];
        for (name, value) in fixed {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        headers.insert(
            HeaderName::from_static("user-agent"),
            HeaderValue::from_static(USER_AGENT),
        );
        headers.insert(
            HeaderName::from_static("sec-ms-gec"),
            header_value(&random_gec_token())?,
        );
        headers.insert(
            HeaderName::from_static("x-ms-client-request-id"),
            header_value(&uuid::Uuid::new_v4().to_string())?,
        );
        if let Some(cookie) = &self.config.cookie {
            headers.insert(reqwest::header::COOKIE, header_value(cookie.expose_secret())?);
        }
        if let Some(ip) = &self.forwarded_for {
            headers.insert(HeaderName::from_static("x-forwarded-for"), header_value(ip)?);
        }
        Ok(headers)
    }

    fn channel_url(&self, session: &SessionHandle) -> String {
        match session.access_token() {
            Some(token) => format!(
                "{}?sec_access_token={}",
                self.config.websocket_url,
                urlencoding::encode(token)
            ),
            None => self.config.websocket_url.clone(),
        }
    }
}

#[async_trait]
impl HubConnector for HttpHubConnector {
    async fn create_session(&self) -> Result<SessionHandle, HubError> {
        let response = self
            .client
            .get(self.config.create_url())
            .headers(self.session_headers()?)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    HubError::transport(format!("Connection failed: {}", e))
                } else {
                    HubError::transport(e.to_string())
                }
            })?;

        let encrypted = response
            .headers()
            .get(ENCRYPTED_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let body = response
            .text()
            .await
            .map_err(|e| HubError::transport(format!("failed to read response body: {}", e)))?;

        tracing::debug!(encrypted = encrypted.is_some(), "session creation response received");
        parse_create_response(&body, encrypted)
    }

    async fn connect(&self, session: &SessionHandle) -> Result<Box<dyn HubChannel>, HubError> {
        let url = self.channel_url(session);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| HubError::transport(format!("invalid channel request: {}", e)))?;

        let headers = request.headers_mut();
        headers.insert("user-agent", WsHeaderValue::from_static(USER_AGENT));
        headers.insert("accept-language", WsHeaderValue::from_static("en-US,en;q=0.9"));
        if let Some(cookie) = &self.config.cookie {
            headers.insert("cookie", ws_header_value(cookie.expose_secret())?);
        }
        if let Some(ip) = &self.forwarded_for {
            headers.insert("x-forwarded-for", ws_header_value(ip)?);
        }

        let connect = connect_async(request);
        let (socket, _response) = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| HubError::transport("timed out opening channel"))?
            .map_err(|e| HubError::transport(format!("channel connection failed: {}", e)))?;

        tracing::debug!("channel opened");
        Ok(Box::new(WebSocketChannel::new(socket)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    conversation_id: Option<String>,
    client_id: Option<String>,
    conversation_signature: Option<String>,
    result: Option<CreateResult>,
}

#[derive(Debug, Deserialize)]
struct CreateResult {
    value: Option<String>,
    message: Option<String>,
}

/// Interprets the creation endpoint's body.
///
/// An encrypted signature from the response header takes the place of the
/// body signature.
fn parse_create_response(body: &str, encrypted: Option<String>) -> Result<SessionHandle, HubError> {
    let parsed: CreateResponse = serde_json::from_str(body).map_err(|_| {
        HubError::session_creation(
            "InvalidResponse",
            format!("{}: failed to parse response body.", CREATE_PATH),
        )
    })?;

    let signature = match encrypted {
        Some(token) => Some(SessionSignature::Encrypted(token)),
        None => parsed
            .conversation_signature
            .clone()
            .map(SessionSignature::Plain),
    };

    if let Some(handle) = SessionHandle::from_parts(
        parsed.conversation_id.as_deref(),
        parsed.client_id.as_deref(),
        signature,
    ) {
        return Ok(handle);
    }

    match parsed.result {
        Some(CreateResult {
            value: Some(code),
            message,
        }) if !code.is_empty() => Err(HubError::session_creation(code, message.unwrap_or_default())),
        _ => Err(HubError::session_creation(
            "UnexpectedResponse",
            format!("Unexpected response:\n{}", body),
        )),
    }
}

/// 64 random uppercase hex digits.
fn random_gec_token() -> String {
    let mut rng = rand::thread_rng();
    (0..64)
        .map(|_| {
            let digit: u32 = rng.gen_range(0..16);
            std::char::from_digit(digit, 16).unwrap_or('0').to_ascii_uppercase()
        })
        .collect()
}

/// Resolves a fixed address or picks a random address inside a CIDR range.
fn resolve_forwarded_for(value: &str) -> Option<String> {
    let (base, mask) = parse_ipv4_range(value)?;
    let Some(mask) = mask else {
        return Some(base.to_string());
    };
    let span = (1u64 << (32 - u32::from(mask))) - 1;
    let offset = if span == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..span)
    };
    let addr = u32::from(base).wrapping_add(offset as u32);
    Some(Ipv4Addr::from(addr).to_string())
}

fn header_value(value: &str) -> Result<HeaderValue, HubError> {
    HeaderValue::from_str(value).map_err(|e| HubError::transport(format!("invalid header value: {}", e)))
}

// The channel handshake uses tungstenite's own http types.
fn ws_header_value(value: &str) -> Result<WsHeaderValue, HubError> {
    WsHeaderValue::from_str(value).map_err(|e| HubError::transport(format!("invalid header value: {}", e)))
}
