//! Protocol dialect: symbolic conversation settings and the option flags
//! they map to.
//!
//! Names coming from configuration or callers are resolved leniently: an
//! unknown name falls back to the default variant and is logged, so a typo
//! never aborts a turn.

use std::collections::HashMap;
use std::fmt;

/// Conversation tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ToneStyle {
    #[default]
    Creative,
    Precise,
    Balanced,
    Fast,
}

impl ToneStyle {
    /// Resolves a tone name, falling back to `Creative`.
    pub fn parse_or_default(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "creative" => Self::Creative,
            "precise" => Self::Precise,
            "balanced" => Self::Balanced,
            "fast" => Self::Fast,
            other => {
                tracing::warn!(tone = %other, "unknown tone style, using default");
                Self::default()
            }
        }
    }

    /// Option flag selecting this tone.
    pub fn option_flag(&self) -> &'static str {
        match self {
            Self::Creative => "h3imaginative",
            Self::Precise => "h3precise",
            Self::Fast => "galileo",
            Self::Balanced => "harmonyv3",
        }
    }
}

impl fmt::Display for ToneStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Creative => "creative",
            Self::Precise => "precise",
            Self::Balanced => "balanced",
            Self::Fast => "fast",
        };
        write!(f, "{}", s)
    }
}

/// Assistant persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Persona {
    /// Edge sidebar persona; needs the `nojbfedge` flag.
    #[default]
    Sydney,
    Copilot,
}

impl Persona {
    /// Resolves a persona name, falling back to `Sydney`.
    pub fn parse_or_default(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "sydney" => Self::Sydney,
            "copilot" => Self::Copilot,
            other => {
                tracing::warn!(persona = %other, "unknown persona, using default");
                Self::default()
            }
        }
    }

    fn trailing_flag(&self) -> Option<&'static str> {
        match self {
            Self::Sydney => Some("nojbfedge"),
            Self::Copilot => None,
        }
    }
}

/// Account tier of the supplied credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccountTier {
    #[default]
    Free,
    Pro,
}

impl AccountTier {
    /// Resolves a tier name, falling back to `Free`.
    pub fn parse_or_default(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "free" => Self::Free,
            "pro" => Self::Pro,
            other => {
                tracing::warn!(tier = %other, "unknown account tier, using default");
                Self::default()
            }
        }
    }

    fn model_flag(&self) -> Option<&'static str> {
        match self {
            Self::Free => None,
            Self::Pro => Some("gpt4tmncnp"),
        }
    }
}

/// Service-side plugins that can be toggled per turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plugin {
    Search,
    ImageCreator,
}

impl Plugin {
    /// Resolves a plugin name; unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace(['_', '-', ' '], "").as_str() {
            "search" | "websearch" => Some(Self::Search),
            "imagecreator" | "imagegen" => Some(Self::ImageCreator),
            _ => None,
        }
    }
}

/// Enabled plugins for a turn. Both are on unless switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginSet {
    search: bool,
    image_creator: bool,
}

impl PluginSet {
    /// Builds a plugin set from a `name -> enabled` map, overriding defaults.
    pub fn from_map(map: &HashMap<String, bool>) -> Self {
        let mut set = Self::default();
        for (name, enabled) in map {
            match Plugin::parse(name) {
                Some(plugin) => set = set.with(plugin, *enabled),
                None => tracing::warn!(plugin = %name, "ignoring unknown plugin"),
            }
        }
        set
    }

    /// Returns a copy with one plugin toggled.
    pub fn with(mut self, plugin: Plugin, enabled: bool) -> Self {
        match plugin {
            Plugin::Search => self.search = enabled,
            Plugin::ImageCreator => self.image_creator = enabled,
        }
        self
    }

    pub fn is_enabled(&self, plugin: Plugin) -> bool {
        match plugin {
            Plugin::Search => self.search,
            Plugin::ImageCreator => self.image_creator,
        }
    }
}

impl Default for PluginSet {
    fn default() -> Self {
        Self {
            search: true,
            image_creator: true,
        }
    }
}

/// Resolved dialect settings for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DialectSettings {
    pub tone: ToneStyle,
    pub persona: Persona,
    pub tier: AccountTier,
    pub plugins: PluginSet,
    /// Whether the image-generation feature is available to this client.
    pub gen_image: bool,
}

impl DialectSettings {
    /// The `optionsSets` list in the order the service expects.
    pub fn option_sets(&self) -> Vec<&'static str> {
        let mut sets = vec![
            "nlu_direct_response_filter",
            "deepleo",
            "disable_emoji_spoken_text",
            "responsible_ai_policy_235",
            "enablemm",
            "dv3sugg",
            "iyxapbing",
            "iycapbing",
            self.tone.option_flag(),
        ];
        sets.extend(self.tier.model_flag());
        sets.push("clgalileo");
        if self.image_generation_enabled() {
            sets.push("gencontentv3");
        }
        sets.extend([
            "fluxsrtrunc",
            "fluxtrunc",
            "fluxv1",
            "rai278",
            "replaceurl",
            "eredirecturl",
        ]);
        if !self.plugins.is_enabled(Plugin::Search) {
            sets.push("nosearchall");
        }
        sets.extend(self.persona.trailing_flag());
        sets
    }

    /// Image placeholders only ever arrive when this is true.
    pub fn image_generation_enabled(&self) -> bool {
        self.gen_image
            && self.tone == ToneStyle::Creative
            && self.plugins.is_enabled(Plugin::ImageCreator)
    }
}
