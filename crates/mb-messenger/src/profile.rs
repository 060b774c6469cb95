//! Page profile and thread setup
//!
//! One-time configuration pushed to the Messenger Profile API: Get Started
//! button, localized greeting, persistent menu, whitelisted domains, plus
//! webhook subscriptions, personas and built-in NLP.

use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use mb_core::{Catalog, Config};

use crate::api::GraphApi;
use crate::bot::Payload;
use crate::error::{MessengerError, Result};
use crate::persona::PersonaRegistry;

/// Locale value the platform uses for the fallback entry
const DEFAULT_PROFILE_LOCALE: &str = "default";

/// Platform-side placeholder replaced with the user's first name
const USER_FIRST_NAME_TOKEN: &str = "{{user_first_name}}";

/// Messenger Profile API body. Unset sections are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessengerProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_started: Option<GetStarted>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting: Option<Vec<Greeting>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_menu: Option<Vec<PersistentMenu>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitelisted_domains: Option<Vec<String>>,
}

impl MessengerProfile {
    /// Combine two profiles; sections set in `self` win
    pub fn merge(self, other: MessengerProfile) -> Self {
        Self {
            get_started: self.get_started.or(other.get_started),
            greeting: self.greeting.or(other.greeting),
            persistent_menu: self.persistent_menu.or(other.persistent_menu),
            whitelisted_domains: self.whitelisted_domains.or(other.whitelisted_domains),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GetStarted {
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Greeting {
    pub locale: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistentMenu {
    pub locale: String,
    pub composer_input_disabled: bool,
    pub call_to_actions: Vec<MenuAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuAction {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub payload: String,
}

/// Which part of the setup to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupMode {
    All,
    Webhook,
    Feed,
    Profile,
    Personas,
    Nlp,
    Domains,
    GetStarted,
    Greeting,
    Menu,
}

impl FromStr for SetupMode {
    type Err = MessengerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "all" => Ok(SetupMode::All),
            "webhook" => Ok(SetupMode::Webhook),
            "feed" => Ok(SetupMode::Feed),
            "profile" => Ok(SetupMode::Profile),
            "personas" => Ok(SetupMode::Personas),
            "nlp" => Ok(SetupMode::Nlp),
            "domains" => Ok(SetupMode::Domains),
            "get-started" => Ok(SetupMode::GetStarted),
            "greeting" => Ok(SetupMode::Greeting),
            "menu" => Ok(SetupMode::Menu),
            other => Err(MessengerError::UnknownSetupMode(other.to_string())),
        }
    }
}

/// Page profile configurator
#[derive(Clone)]
pub struct Profile {
    api: GraphApi,
    catalog: Arc<Catalog>,
    config: Arc<Config>,
    personas: PersonaRegistry,
}

impl Profile {
    pub fn new(
        api: GraphApi,
        catalog: Arc<Catalog>,
        config: Arc<Config>,
        personas: PersonaRegistry,
    ) -> Self {
        Self {
            api,
            catalog,
            config,
            personas,
        }
    }

    /// Run the calls for `mode`
    pub async fn apply(&self, mode: SetupMode) -> Result<()> {
        info!("Running profile setup: {:?}", mode);

        match mode {
            SetupMode::All => {
                self.set_webhook().await?;
                self.set_page_feed_webhook().await?;
                self.set_thread().await?;
                self.set_personas().await?;
                self.set_whitelisted_domains().await?;
                self.set_nlp().await?;
            }
            SetupMode::Webhook => self.set_webhook().await?,
            SetupMode::Feed => self.set_page_feed_webhook().await?,
            SetupMode::Profile => self.set_thread().await?,
            SetupMode::Personas => self.set_personas().await?,
            SetupMode::Nlp => self.set_nlp().await?,
            SetupMode::Domains => self.set_whitelisted_domains().await?,
            SetupMode::GetStarted => self.set_get_started().await?,
            SetupMode::Greeting => self.set_greeting().await?,
            SetupMode::Menu => self.set_persistent_menu().await?,
        }

        Ok(())
    }

    pub async fn set_webhook(&self) -> Result<()> {
        self.api.call_subscriptions_api(None).await?;
        self.api.call_subscribed_apps(None).await
    }

    pub async fn set_page_feed_webhook(&self) -> Result<()> {
        self.api.call_subscriptions_api(Some("feed")).await?;
        self.api.call_subscribed_apps(Some("feed")).await
    }

    /// Get started, greeting and persistent menu in one call
    pub async fn set_thread(&self) -> Result<()> {
        let profile = self
            .get_started()
            .merge(self.greeting())
            .merge(self.persistent_menu());

        self.api.call_messenger_profile_api(&profile).await
    }

    pub async fn set_get_started(&self) -> Result<()> {
        self.api.call_messenger_profile_api(&self.get_started()).await
    }

    pub async fn set_greeting(&self) -> Result<()> {
        self.api.call_messenger_profile_api(&self.greeting()).await
    }

    pub async fn set_persistent_menu(&self) -> Result<()> {
        self.api
            .call_messenger_profile_api(&self.persistent_menu())
            .await
    }

    pub async fn set_whitelisted_domains(&self) -> Result<()> {
        self.api
            .call_messenger_profile_api(&self.whitelisted_domains())
            .await
    }

    pub async fn set_nlp(&self) -> Result<()> {
        self.api.call_nlp_configs_api().await
    }

    /// Register existing personas without creating new ones
    pub async fn load_personas(&self) -> Result<usize> {
        let existing = self.api.get_persona_api().await?;
        for persona in &existing {
            self.personas.insert(&persona.name, &persona.id);
        }

        info!("Loaded personas: {:?}", self.personas.names());
        Ok(existing.len())
    }

    /// Register existing personas and create the configured ones that are missing
    pub async fn set_personas(&self) -> Result<()> {
        self.load_personas().await?;

        for persona in &self.config.personas {
            if self.personas.contains(&persona.name) {
                continue;
            }

            let id = self
                .api
                .post_persona_api(&persona.name, &persona.picture)
                .await?;
            self.personas.insert(&persona.name, &id);
        }

        info!("Personas ready: {:?}", self.personas.names());
        Ok(())
    }

    pub fn get_started(&self) -> MessengerProfile {
        MessengerProfile {
            get_started: Some(GetStarted {
                payload: Payload::Empezar.as_str().to_string(),
            }),
            ..Default::default()
        }
    }

    pub fn greeting(&self) -> MessengerProfile {
        let greetings = self
            .catalog
            .locales()
            .map(|locale| Greeting {
                locale: self.profile_locale(locale),
                text: self
                    .catalog
                    .translator(locale)
                    .t_with("bot.intro", &[("user_first_name", USER_FIRST_NAME_TOKEN)]),
            })
            .collect();

        MessengerProfile {
            greeting: Some(greetings),
            ..Default::default()
        }
    }

    pub fn persistent_menu(&self) -> MessengerProfile {
        let menus = self
            .catalog
            .locales()
            .map(|locale| {
                let tr = self.catalog.translator(locale);
                PersistentMenu {
                    locale: self.profile_locale(locale),
                    composer_input_disabled: false,
                    call_to_actions: Payload::PERSISTENT_MENU
                        .iter()
                        .map(|payload| MenuAction {
                            kind: "postback",
                            title: payload.title(tr),
                            payload: payload.as_str().to_string(),
                        })
                        .collect(),
                }
            })
            .collect();

        MessengerProfile {
            persistent_menu: Some(menus),
            ..Default::default()
        }
    }

    pub fn whitelisted_domains(&self) -> MessengerProfile {
        MessengerProfile {
            whitelisted_domains: Some(self.config.whitelisted_domains()),
            ..Default::default()
        }
    }

    fn profile_locale(&self, locale: &str) -> String {
        if locale == self.catalog.default_locale() {
            DEFAULT_PROFILE_LOCALE.to_string()
        } else {
            locale.to_string()
        }
    }
}
