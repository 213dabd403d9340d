//! Local completion server configuration

use serde::Deserialize;
use std::collections::HashMap;

use super::error::ValidationError;

/// Local chat-completion server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LocalLlmConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Port; empty means the scheme default
    #[serde(default = "default_port")]
    pub port: String,

    #[serde(default = "default_system_message")]
    pub system_message: String,

    /// Stream tokens when a progress listener is supplied
    #[serde(default = "default_stream")]
    pub stream: bool,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default)]
    pub top_p: Option<f32>,

    #[serde(default = "default_presence_penalty")]
    pub presence_penalty: f32,

    #[serde(default)]
    pub frequency_penalty: Option<f32>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_stop")]
    pub stop: Vec<String>,

    /// Extra request headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl LocalLlmConfig {
    /// Completion endpoint URL.
    pub fn completions_url(&self) -> String {
        if self.port.is_empty() {
            format!("http://{}/v1/chat/completions", self.host)
        } else {
            format!("http://{}:{}/v1/chat/completions", self.host, self.port)
        }
    }

    /// Validate local server configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingRequired("LOCAL_HOST"));
        }
        if !self.port.is_empty() && self.port.parse::<u16>().map_or(true, |p| p == 0) {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

impl Default for LocalLlmConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            system_message: default_system_message(),
            stream: default_stream(),
            temperature: default_temperature(),
            top_p: None,
            presence_penalty: default_presence_penalty(),
            frequency_penalty: None,
            max_tokens: default_max_tokens(),
            stop: default_stop(),
            headers: HashMap::new(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> String {
    "3002".to_string()
}

fn default_system_message() -> String {
    "You are an AI assistant. Write the AI's next reply in a chat between the user and the AI. Write a single reply only."
        .to_string()
}

fn default_stream() -> bool {
    true
}

fn default_temperature() -> f32 {
    0.8
}

fn default_presence_penalty() -> f32 {
    1.18
}

fn default_max_tokens() -> u32 {
    500
}

fn default_stop() -> Vec<String> {
    vec!["### Instruction: ".to_string()]
}
