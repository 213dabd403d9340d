//! Hub (ChatHub service) configuration

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::hub::{AccountTier, DialectSettings, Persona, PluginSet, ToneStyle};

/// Hub client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Base URL for session creation and image upload
    #[serde(default = "default_host")]
    pub host: String,

    /// Duplex channel endpoint
    #[serde(default = "default_websocket_url")]
    pub websocket_url: String,

    /// Value of the `_U` cookie
    #[serde(default)]
    pub user_token: Option<Secret<String>>,

    /// Full cookie header; takes precedence over `user_token`
    #[serde(default)]
    pub cookies: Option<Secret<String>>,

    /// IPv4 address or CIDR range sent as `x-forwarded-for`
    #[serde(default)]
    pub x_forwarded_for: Option<String>,

    #[serde(default)]
    pub tone: Option<String>,

    #[serde(default)]
    pub persona: Option<String>,

    #[serde(default)]
    pub tier: Option<String>,

    /// Plugin toggles by name
    #[serde(default)]
    pub plugins: HashMap<String, bool>,

    /// System instructions used at the start of a continuation transcript
    #[serde(default)]
    pub system_message: Option<String>,

    /// Text prepended to the continuation transcript
    #[serde(default)]
    pub context: Option<String>,

    /// Locale sent with each turn, e.g. `en-US`
    #[serde(default)]
    pub locale: Option<String>,

    #[serde(default)]
    pub features: HubFeatures,

    /// Wall-clock deadline for one turn
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_secs: u64,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Maximum silence between inbound frames; 0 disables the check
    #[serde(default)]
    pub liveness_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Optional hub features
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubFeatures {
    /// Render image placeholders through the image generator
    #[serde(default)]
    pub gen_image: bool,
}

impl HubConfig {
    /// Cookie header for authenticated requests.
    ///
    /// The full cookie string wins over the bare user token.
    pub fn cookie_header(&self) -> Option<Secret<String>> {
        if let Some(cookies) = self.cookies.as_ref().filter(|c| !c.expose_secret().is_empty()) {
            return Some(cookies.clone());
        }
        self.user_token
            .as_ref()
            .filter(|t| !t.expose_secret().is_empty())
            .map(|t| Secret::new(format!("_U={}", t.expose_secret())))
    }

    /// Dialect settings derived from the configured names.
    pub fn dialect(&self) -> DialectSettings {
        DialectSettings {
            tone: self.tone.as_deref().map(ToneStyle::parse_or_default).unwrap_or_default(),
            persona: self.persona.as_deref().map(Persona::parse_or_default).unwrap_or_default(),
            tier: self.tier.as_deref().map(AccountTier::parse_or_default).unwrap_or_default(),
            plugins: PluginSet::from_map(&self.plugins),
            gen_image: self.features.gen_image,
        }
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Inbound silence limit, `None` when disabled.
    pub fn liveness_timeout(&self) -> Option<Duration> {
        (self.liveness_timeout_secs > 0).then(|| Duration::from_secs(self.liveness_timeout_secs))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Validate hub configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.host.starts_with("http://") && !self.host.starts_with("https://") {
            return Err(ValidationError::InvalidUrl {
                field: "hub.host",
                value: self.host.clone(),
            });
        }
        if !self.websocket_url.starts_with("ws://") && !self.websocket_url.starts_with("wss://") {
            return Err(ValidationError::InvalidUrl {
                field: "hub.websocket_url",
                value: self.websocket_url.clone(),
            });
        }
        if self.turn_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("hub.turn_timeout_secs"));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ValidationError::InvalidTimeout("hub.heartbeat_interval_secs"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("hub.connect_timeout_secs"));
        }
        if let Some(ip) = self.x_forwarded_for.as_deref() {
            if parse_ipv4_range(ip).is_none() {
                return Err(ValidationError::InvalidForwardedFor(ip.to_string()));
            }
        }
        Ok(())
    }
}

/// Parses `a.b.c.d` or `a.b.c.d/n` into a base address and optional prefix
/// length.
pub fn parse_ipv4_range(value: &str) -> Option<(Ipv4Addr, Option<u8>)> {
    let (addr, mask) = match value.split_once('/') {
        Some((addr, mask)) => {
            let mask: u8 = mask.parse().ok()?;
            if mask > 32 {
                return None;
            }
            (addr, Some(mask))
        }
        None => (value, None),
    };
    let addr: Ipv4Addr = addr.parse().ok()?;
    Some((addr, mask))
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            websocket_url: default_websocket_url(),
            user_token: None,
            cookies: None,
            x_forwarded_for: None,
            tone: None,
            persona: None,
            tier: None,
            plugins: HashMap::new(),
            system_message: None,
            context: None,
            locale: None,
            features: HubFeatures::default(),
            turn_timeout_secs: default_turn_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            liveness_timeout_secs: 0,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_host() -> String {
    "https://www.bing.com".to_string()
}

fn default_websocket_url() -> String {
    "wss://sydney.bing.com/sydney/ChatHub".to_string()
}

fn default_turn_timeout() -> u64 {
    300
}

fn default_heartbeat_interval() -> u64 {
    15
}

fn default_connect_timeout() -> u64 {
    30
}
