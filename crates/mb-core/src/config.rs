//! Configuration management
//!
//! Configuration is read in the following priority order:
//! 1. Environment variables
//! 2. `mb-gateway.toml` configuration file
//! 3. Default values
//!
//! Strings in the configuration file may reference environment variables
//! with the `${VAR_NAME}` form.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default configuration file name
pub const CONFIG_FILE: &str = "mb-gateway.toml";

/// Graph API credentials and endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacebookConfig {
    /// Facebook page ID
    pub page_id: String,

    /// Facebook app ID
    pub app_id: String,

    /// Page access token used for the Send and Profile APIs
    #[serde(skip_serializing)]
    pub page_access_token: String,

    /// App secret, used for webhook signatures and the app access token
    #[serde(skip_serializing)]
    pub app_secret: String,

    /// Token echoed back during the webhook subscription handshake
    #[serde(skip_serializing)]
    pub verify_token: String,

    /// Graph API base URL including the version segment
    #[serde(default = "default_graph_api_url")]
    pub graph_api_url: String,
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            page_id: String::new(),
            app_id: String::new(),
            page_access_token: String::new(),
            app_secret: String::new(),
            verify_token: String::new(),
            graph_api_url: default_graph_api_url(),
        }
    }
}

/// Webhook server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port for the webhook server
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public URL of this app (the webhook lives at `<app_url>/webhook`)
    #[serde(default)]
    pub app_url: String,

    /// Public URL of the companion website, whitelisted for webviews
    #[serde(default)]
    pub shop_url: Option<String>,

    /// Gap between consecutive replies of one multi-message response
    #[serde(default = "default_send_stagger_ms")]
    pub send_stagger_ms: u64,

    /// Run the full profile setup when the server starts
    #[serde(default)]
    pub setup_on_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            app_url: String::new(),
            shop_url: None,
            send_stagger_ms: default_send_stagger_ms(),
            setup_on_start: false,
        }
    }
}

/// Persona to register on the page at setup time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersonaConfig {
    pub name: String,
    pub picture: String,
}

/// Main configuration for mb-gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub facebook: FacebookConfig,

    #[serde(default)]
    pub server: ServerConfig,

    /// Locale used when the user's locale is not bundled
    #[serde(default = "default_locale")]
    pub default_locale: String,

    /// Personas created at setup when they do not exist yet
    #[serde(default)]
    pub personas: Vec<PersonaConfig>,

    /// Name of the persona that speaks the human hand-off message
    #[serde(default = "default_agent_persona")]
    pub agent_persona: String,

    /// Domains whitelisted for webviews (empty = app and shop URLs)
    #[serde(default)]
    pub whitelisted_domains: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            facebook: FacebookConfig::default(),
            server: ServerConfig::default(),
            default_locale: default_locale(),
            personas: Vec::new(),
            agent_persona: default_agent_persona(),
            whitelisted_domains: Vec::new(),
        }
    }
}

fn default_graph_api_url() -> String {
    "https://graph.facebook.com/v18.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_send_stagger_ms() -> u64 {
    2000
}

fn default_locale() -> String {
    "es_ES".to_string()
}

fn default_agent_persona() -> String {
    "Agente".to_string()
}

/// TOML file layout; every field is optional so partial files merge
/// over the defaults.
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    facebook: Option<TomlFacebook>,
    server: Option<TomlServer>,
    default_locale: Option<String>,
    personas: Option<Vec<PersonaConfig>>,
    agent_persona: Option<String>,
    whitelisted_domains: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlFacebook {
    page_id: Option<String>,
    app_id: Option<String>,
    page_access_token: Option<String>,
    app_secret: Option<String>,
    verify_token: Option<String>,
    graph_api_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlServer {
    port: Option<u16>,
    app_url: Option<String>,
    shop_url: Option<String>,
    send_stagger_ms: Option<u64>,
    setup_on_start: Option<bool>,
}

impl Config {
    /// Expand `${VAR_NAME}` references with environment values.
    ///
    /// Unset variables expand to an empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::with_capacity(value.len());
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let mut cfg = Self::from_toml_str(&toml_content)?;
        cfg.apply_env_overrides();

        Ok(cfg)
    }

    /// Parse a TOML document (after `${VAR}` expansion) without env overrides
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = Self::expand_env_vars(content);
        let toml: TomlConfig = toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        Ok(Self::from_toml_config(toml))
    }

    /// Load from `./mb-gateway.toml` when present, otherwise from the
    /// environment only.
    pub fn load() -> Result<Self> {
        if Path::new(CONFIG_FILE).exists() {
            tracing::info!("Loading configuration from {}", CONFIG_FILE);
            return Self::from_toml_file(CONFIG_FILE);
        }

        Ok(Self::from_env())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg
    }

    fn from_toml_config(toml: TomlConfig) -> Self {
        let defaults = Self::default();

        let fb = toml.facebook.unwrap_or_default();
        let facebook = FacebookConfig {
            page_id: fb.page_id.unwrap_or_default(),
            app_id: fb.app_id.unwrap_or_default(),
            page_access_token: fb.page_access_token.unwrap_or_default(),
            app_secret: fb.app_secret.unwrap_or_default(),
            verify_token: fb.verify_token.unwrap_or_default(),
            graph_api_url: fb.graph_api_url.unwrap_or_else(default_graph_api_url),
        };

        let server = toml.server.unwrap_or_default();
        let server = ServerConfig {
            port: server.port.unwrap_or_else(default_port),
            app_url: server.app_url.unwrap_or_default(),
            shop_url: server.shop_url.filter(|s| !s.is_empty()),
            send_stagger_ms: server.send_stagger_ms.unwrap_or_else(default_send_stagger_ms),
            setup_on_start: server.setup_on_start.unwrap_or(false),
        };

        Config {
            facebook,
            server,
            default_locale: toml.default_locale.unwrap_or(defaults.default_locale),
            personas: toml.personas.unwrap_or_default(),
            agent_persona: toml.agent_persona.unwrap_or(defaults.agent_persona),
            whitelisted_domains: toml.whitelisted_domains.unwrap_or_default(),
        }
    }

    /// Override values with environment variables that are set and non-empty
    fn apply_env_overrides(&mut self) {
        fn env(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        }

        if let Some(v) = env("PAGE_ID") {
            self.facebook.page_id = v;
        }
        if let Some(v) = env("APP_ID") {
            self.facebook.app_id = v;
        }
        if let Some(v) = env("PAGE_ACCESS_TOKEN") {
            self.facebook.page_access_token = v;
        }
        if let Some(v) = env("APP_SECRET") {
            self.facebook.app_secret = v;
        }
        if let Some(v) = env("VERIFY_TOKEN") {
            self.facebook.verify_token = v;
        }
        if let Some(v) = env("GRAPH_API_URL") {
            self.facebook.graph_api_url = v;
        }

        if let Some(port) = env("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(v) = env("APP_URL") {
            self.server.app_url = v;
        }
        if let Some(v) = env("SHOP_URL") {
            self.server.shop_url = Some(v);
        }
        if let Some(ms) = env("SEND_STAGGER_MS").and_then(|p| p.parse().ok()) {
            self.server.send_stagger_ms = ms;
        }
        if let Some(v) = env("SETUP_ON_START") {
            self.server.setup_on_start = v.to_lowercase() == "true";
        }

        if let Some(v) = env("DEFAULT_LOCALE") {
            self.default_locale = v;
        }
        if let Some(v) = env("AGENT_PERSONA") {
            self.agent_persona = v;
        }
        if let Some(v) = env("WHITELISTED_DOMAINS") {
            self.whitelisted_domains = v.split(',').map(|s| s.trim().to_string()).collect();
        }
    }

    /// Fail with every missing required value at once
    pub fn check(&self) -> Result<()> {
        let required = [
            ("PAGE_ID", &self.facebook.page_id),
            ("APP_ID", &self.facebook.app_id),
            ("PAGE_ACCESS_TOKEN", &self.facebook.page_access_token),
            ("APP_SECRET", &self.facebook.app_secret),
            ("VERIFY_TOKEN", &self.facebook.verify_token),
            ("APP_URL", &self.server.app_url),
        ];

        let missing: Vec<String> = required
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| name.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingVariables(missing))
        }
    }

    /// Callback URL registered with the subscriptions API
    pub fn webhook_url(&self) -> String {
        format!("{}/webhook", self.server.app_url.trim_end_matches('/'))
    }

    /// Domains to whitelist, defaulting to the app and shop URLs
    pub fn whitelisted_domains(&self) -> Vec<String> {
        if !self.whitelisted_domains.is_empty() {
            return self.whitelisted_domains.clone();
        }

        std::iter::once(self.server.app_url.clone())
            .chain(self.server.shop_url.clone())
            .filter(|d| !d.is_empty())
            .collect()
    }

    /// Delay between consecutive messages of one reply
    pub fn send_stagger(&self) -> Duration {
        Duration::from_millis(self.server.send_stagger_ms)
    }
}
