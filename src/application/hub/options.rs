//! Per-turn options and their resolution against the client configuration.
//!
//! `HubConfig` is never mutated by a turn. Each call carries a `TurnOptions`
//! overlay that is merged into a fresh `EffectiveOptions` value.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::domain::foundation::{ConversationKey, MessageId};
use crate::domain::hub::{
    AccountTier, DialectSettings, Persona, PluginSet, SessionHandle, SessionSignature, ToneStyle,
};
use crate::ports::{NoopProgress, ProgressListener};

/// How a turn relates to locally threaded conversations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Continuation {
    /// Plain service-side conversation; the session handle is reused.
    #[default]
    Off,
    /// Start a locally threaded conversation under a fresh key.
    Start,
    /// Continue the locally threaded conversation stored under this key.
    Resume(ConversationKey),
}

impl Continuation {
    /// Locally threaded turns always negotiate a fresh session.
    pub fn is_active(&self) -> bool {
        !matches!(self, Continuation::Off)
    }
}

/// Image attached to a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Downloaded and base64 encoded before upload.
    Url(String),
    Base64(String),
}

/// Per-call overlay for `HubClient::send_message`.
#[derive(Clone, Default)]
pub struct TurnOptions {
    pub conversation_id: Option<String>,
    pub client_id: Option<String>,
    pub signature: Option<SessionSignature>,
    pub parent_message_id: Option<MessageId>,
    pub continuation: Continuation,
    pub invocation_id: u32,
    pub tone: Option<String>,
    pub persona: Option<String>,
    pub tier: Option<String>,
    /// Merged over the configured plugin map.
    pub plugins: HashMap<String, bool>,
    pub system_message: Option<String>,
    pub context: Option<String>,
    pub locale: Option<String>,
    pub image: Option<ImageSource>,
    pub timeout: Option<Duration>,
    pub progress: Option<Arc<dyn ProgressListener>>,
    pub cancel: Option<CancellationToken>,
}

impl TurnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuses a previously issued session.
    pub fn with_session(mut self, session: &SessionHandle) -> Self {
        self.conversation_id = Some(session.conversation_id.clone());
        self.client_id = Some(session.client_id.clone());
        self.signature = Some(session.signature.clone());
        self
    }

    pub fn with_parent(mut self, parent: MessageId) -> Self {
        self.parent_message_id = Some(parent);
        self
    }

    pub fn with_continuation(mut self, continuation: Continuation) -> Self {
        self.continuation = continuation;
        self
    }

    pub fn with_invocation_id(mut self, invocation_id: u32) -> Self {
        self.invocation_id = invocation_id;
        self
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = Some(tone.into());
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn with_plugin(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.plugins.insert(name.into(), enabled);
        self
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_image(mut self, image: ImageSource) -> Self {
        self.image = Some(image);
        self
    }

    /// Overrides the configured turn deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_progress(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.progress = Some(listener);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The caller-supplied session, if every part is present.
    pub fn session(&self) -> Option<SessionHandle> {
        SessionHandle::from_parts(
            self.conversation_id.as_deref(),
            self.client_id.as_deref(),
            self.signature.clone(),
        )
    }
}

impl fmt::Debug for TurnOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnOptions")
            .field("conversation_id", &self.conversation_id)
            .field("client_id", &self.client_id)
            .field("parent_message_id", &self.parent_message_id)
            .field("continuation", &self.continuation)
            .field("invocation_id", &self.invocation_id)
            .field("tone", &self.tone)
            .field("image", &self.image.is_some())
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

/// Configuration in force for one turn.
#[derive(Clone)]
pub struct EffectiveOptions {
    pub dialect: DialectSettings,
    pub system_message: Option<String>,
    pub context: Option<String>,
    pub locale: Option<String>,
    pub turn_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub liveness_timeout: Option<Duration>,
    pub progress: Arc<dyn ProgressListener>,
    pub cancel: CancellationToken,
}

impl EffectiveOptions {
    /// Overlays `options` on `config`. Unknown dialect names fall back to
    /// their defaults.
    pub fn resolve(config: &HubConfig, options: &TurnOptions) -> Self {
        let tone = options.tone.as_deref().or(config.tone.as_deref());
        let persona = options.persona.as_deref().or(config.persona.as_deref());
        let tier = options.tier.as_deref().or(config.tier.as_deref());

        let mut plugins = config.plugins.clone();
        plugins.extend(options.plugins.iter().map(|(k, v)| (k.clone(), *v)));

        let dialect = DialectSettings {
            tone: tone.map(ToneStyle::parse_or_default).unwrap_or_default(),
            persona: persona.map(Persona::parse_or_default).unwrap_or_default(),
            tier: tier.map(AccountTier::parse_or_default).unwrap_or_default(),
            plugins: PluginSet::from_map(&plugins),
            gen_image: config.features.gen_image,
        };

        Self {
            dialect,
            system_message: options.system_message.clone().or_else(|| config.system_message.clone()),
            context: options.context.clone().or_else(|| config.context.clone()),
            locale: options.locale.clone().or_else(|| config.locale.clone()),
            turn_timeout: options.timeout.unwrap_or_else(|| config.turn_timeout()),
            heartbeat_interval: config.heartbeat_interval(),
            liveness_timeout: config.liveness_timeout(),
            progress: options.progress.clone().unwrap_or_else(|| Arc::new(NoopProgress)),
            cancel: options.cancel.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hub::Plugin;

    fn config() -> HubConfig {
        let mut config = HubConfig::default();
        config.tone = Some("precise".into());
        config.system_message = Some("configured system".into());
        config.plugins.insert("search".into(), false);
        config
    }

    #[test]
    fn defaults_come_from_config() {
        let effective = EffectiveOptions::resolve(&config(), &TurnOptions::new());

        assert_eq!(effective.dialect.tone, ToneStyle::Precise);
        assert_eq!(effective.system_message.as_deref(), Some("configured system"));
        assert_eq!(effective.turn_timeout, Duration::from_secs(300));
        assert!(!effective.dialect.plugins.is_enabled(Plugin::Search));
        assert!(!effective.cancel.is_cancelled());
    }

    #[test]
    fn call_overlay_wins() {
        let options = TurnOptions::new()
            .with_tone("creative")
            .with_plugin("search", true)
            .with_system_message("per call")
            .with_timeout(Duration::from_secs(5));

        let effective = EffectiveOptions::resolve(&config(), &options);

        assert_eq!(effective.dialect.tone, ToneStyle::Creative);
        assert!(effective.dialect.plugins.is_enabled(Plugin::Search));
        assert_eq!(effective.system_message.as_deref(), Some("per call"));
        assert_eq!(effective.turn_timeout, Duration::from_secs(5));
    }

    #[test]
    fn resolving_leaves_config_untouched() {
        let config = config();
        let before = config.tone.clone();

        let _ = EffectiveOptions::resolve(&config, &TurnOptions::new().with_tone("balanced"));

        assert_eq!(config.tone, before);
    }

    #[test]
    fn unknown_tone_falls_back_to_default() {
        let effective = EffectiveOptions::resolve(&HubConfig::default(), &TurnOptions::new().with_tone("sarcastic"));
        assert_eq!(effective.dialect.tone, ToneStyle::default());
    }

    #[test]
    fn session_requires_every_part() {
        let handle = SessionHandle::new("c", "p", SessionSignature::Plain("s".into()));
        assert_eq!(TurnOptions::new().with_session(&handle).session(), Some(handle));

        let mut partial = TurnOptions::new();
        partial.conversation_id = Some("c".into());
        assert!(partial.session().is_none());
    }
}
