//! Graph API client
//!
//! Thin wrapper over the Messenger Platform endpoints the bot uses: Send,
//! Messenger Profile, webhook subscriptions, personas, user profiles and
//! built-in NLP.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use mb_core::Config;

use crate::error::{MessengerError, Result};
use crate::profile::MessengerProfile;
use crate::response::SendRequest;
use crate::types::UserProfile;

/// Webhook fields subscribed when no custom list is given
pub const DEFAULT_FIELDS: &str =
    "messages,messaging_postbacks,messaging_optins,message_deliveries,messaging_referrals";

/// Profile fields requested for each user
const USER_PROFILE_FIELDS: &str = "first_name,last_name,gender,locale,timezone";

/// Graph API client
#[derive(Clone)]
pub struct GraphApi {
    client: Client,
    base_url: String,
    page_id: String,
    app_id: String,
    app_secret: String,
    page_access_token: String,
    verify_token: String,
    webhook_url: String,
}

impl GraphApi {
    /// Create a new Graph API client
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: config.facebook.graph_api_url.trim_end_matches('/').to_string(),
            page_id: config.facebook.page_id.clone(),
            app_id: config.facebook.app_id.clone(),
            app_secret: config.facebook.app_secret.clone(),
            page_access_token: config.facebook.page_access_token.clone(),
            verify_token: config.facebook.verify_token.clone(),
            webhook_url: config.webhook_url(),
        })
    }

    /// Point the client at another host (used by tests)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    /// Verify the webhook subscription handshake
    pub fn verify_webhook(&self, mode: &str, token: &str, challenge: &str) -> Result<String> {
        if mode == "subscribe" && token == self.verify_token {
            info!("Webhook verified");
            Ok(challenge.to_string())
        } else {
            error!("Webhook verification failed: invalid mode or token");
            Err(MessengerError::WebhookVerificationFailed)
        }
    }

    /// Check a caller-supplied verify token (profile setup endpoint)
    pub fn is_verify_token(&self, token: &str) -> bool {
        !self.verify_token.is_empty() && token == self.verify_token
    }

    fn app_access_token(&self) -> String {
        format!("{}|{}", self.app_id, self.app_secret)
    }

    /// Turn non-2xx responses into [`MessengerError::Api`]
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("Graph API error: {} - {}", status, body);
        Err(MessengerError::Api(format!("{} - {}", status, body)))
    }

    /// Send a message through the Send API
    pub async fn call_send_api(&self, request: &SendRequest) -> Result<SendResponse> {
        let url = format!("{}/me/messages", self.base_url);
        debug!("Send API request: {}", serde_json::to_string(request)?);

        let response = self
            .client
            .post(&url)
            .query(&[("access_token", &self.page_access_token)])
            .json(request)
            .send()
            .await?;

        let sent: SendResponse = Self::check(response).await?.json().await?;
        debug!("Message sent: {:?}", sent.message_id);

        Ok(sent)
    }

    /// Update the page's Messenger profile (get started, greeting, menu, domains)
    pub async fn call_messenger_profile_api(&self, profile: &MessengerProfile) -> Result<()> {
        let url = format!("{}/me/messenger_profile", self.base_url);
        debug!("Messenger profile request: {}", serde_json::to_string(profile)?);

        let response = self
            .client
            .post(&url)
            .query(&[("access_token", &self.page_access_token)])
            .json(profile)
            .send()
            .await?;

        Self::check(response).await?;
        info!("Messenger profile updated");

        Ok(())
    }

    /// Register the app-level webhook subscription
    pub async fn call_subscriptions_api(&self, custom_fields: Option<&str>) -> Result<()> {
        let url = format!("{}/{}/subscriptions", self.base_url, self.app_id);
        let fields = custom_fields.unwrap_or(DEFAULT_FIELDS);

        let response = self
            .client
            .post(&url)
            .query(&[
                ("access_token", self.app_access_token().as_str()),
                ("object", "page"),
                ("callback_url", self.webhook_url.as_str()),
                ("verify_token", self.verify_token.as_str()),
                ("fields", fields),
                ("include_values", "true"),
            ])
            .send()
            .await?;

        Self::check(response).await?;
        info!("Webhook subscribed to {} ({})", self.webhook_url, fields);

        Ok(())
    }

    /// Subscribe the app to the page's events
    pub async fn call_subscribed_apps(&self, custom_fields: Option<&str>) -> Result<()> {
        let url = format!("{}/{}/subscribed_apps", self.base_url, self.page_id);
        let fields = custom_fields.unwrap_or(DEFAULT_FIELDS);

        let response = self
            .client
            .post(&url)
            .query(&[
                ("access_token", self.page_access_token.as_str()),
                ("subscribed_fields", fields),
            ])
            .send()
            .await?;

        Self::check(response).await?;
        info!("Page {} subscribed to app ({})", self.page_id, fields);

        Ok(())
    }

    /// Get user profile information
    pub async fn get_user_profile(&self, psid: &str) -> Result<UserProfile> {
        let url = format!("{}/{}", self.base_url, psid);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("fields", USER_PROFILE_FIELDS),
                ("access_token", self.page_access_token.as_str()),
            ])
            .send()
            .await?;

        let profile: UserProfile = Self::check(response).await?.json().await?;
        debug!("Got user profile for {}: {:?}", psid, profile);

        Ok(profile)
    }

    /// List the page's personas
    pub async fn get_persona_api(&self) -> Result<Vec<Persona>> {
        let url = format!("{}/me/personas", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("access_token", &self.page_access_token)])
            .send()
            .await?;

        let list: PersonaList = Self::check(response).await?.json().await?;
        Ok(list.data)
    }

    /// Create a persona and return its ID
    pub async fn post_persona_api(&self, name: &str, picture: &str) -> Result<String> {
        let url = format!("{}/me/personas", self.base_url);

        let response = self
            .client
            .post(&url)
            .query(&[("access_token", &self.page_access_token)])
            .json(&NewPersona {
                name,
                profile_picture_url: picture,
            })
            .send()
            .await?;

        let created: PersonaCreated = Self::check(response).await?.json().await?;
        info!("Created persona {} ({})", name, created.id);

        Ok(created.id)
    }

    /// Enable built-in NLP for the page
    pub async fn call_nlp_configs_api(&self) -> Result<()> {
        let url = format!("{}/me/nlp_configs", self.base_url);

        let response = self
            .client
            .post(&url)
            .query(&[
                ("access_token", self.page_access_token.as_str()),
                ("nlp_enabled", "true"),
            ])
            .send()
            .await?;

        Self::check(response).await?;
        info!("Built-in NLP enabled");

        Ok(())
    }
}

// =============================================================================
// Graph API response bodies
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SendResponse {
    pub recipient_id: Option<String>,
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Persona {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct PersonaList {
    #[serde(default)]
    data: Vec<Persona>,
}

#[derive(Debug, Serialize)]
struct NewPersona<'a> {
    name: &'a str,
    profile_picture_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct PersonaCreated {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{Recipient, Response};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> Config {
        let mut config = Config::default();
        config.facebook.page_id = "page1".to_string();
        config.facebook.app_id = "app1".to_string();
        config.facebook.app_secret = "secret".to_string();
        config.facebook.page_access_token = "page-token".to_string();
        config.facebook.verify_token = "verify".to_string();
        config.server.app_url = "https://bot.example.com".to_string();
        config
    }

    async fn api(server: &MockServer) -> GraphApi {
        GraphApi::new(&config()).unwrap().with_base_url(&server.uri())
    }

    #[test]
    fn test_verify_webhook() {
        let api = GraphApi::new(&config()).unwrap();
        assert_eq!(api.verify_webhook("subscribe", "verify", "challenge").unwrap(), "challenge");
        assert!(api.verify_webhook("subscribe", "wrong", "challenge").is_err());
        assert!(api.verify_webhook("unsubscribe", "verify", "challenge").is_err());
    }

    #[test]
    fn test_is_verify_token() {
        let api = GraphApi::new(&config()).unwrap();
        assert!(api.is_verify_token("verify"));
        assert!(!api.is_verify_token(""));

        let api = GraphApi::new(&Config::default()).unwrap();
        assert!(!api.is_verify_token(""));
    }

    #[tokio::test]
    async fn test_call_send_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/messages"))
            .and(query_param("access_token", "page-token"))
            .and(body_json(json!({
                "recipient": {"id": "psid1"},
                "messaging_type": "RESPONSE",
                "message": {"text": "Hola"}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"recipient_id": "psid1", "message_id": "m1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let request = SendRequest::new(Recipient::Id("psid1".to_string()), Response::text("Hola"));
        let sent = api(&server).await.call_send_api(&request).await.unwrap();
        assert_eq!(sent.message_id.as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn test_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad recipient"))
            .mount(&server)
            .await;

        let request = SendRequest::new(Recipient::Id("x".to_string()), Response::text("Hola"));
        match api(&server).await.call_send_api(&request).await {
            Err(MessengerError::Api(message)) => assert!(message.contains("bad recipient")),
            other => panic!("expected API error, got {:?}", other.map(|r| r.message_id)),
        }
    }

    #[tokio::test]
    async fn test_call_subscriptions_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/app1/subscriptions"))
            .and(query_param("access_token", "app1|secret"))
            .and(query_param("object", "page"))
            .and(query_param("callback_url", "https://bot.example.com/webhook"))
            .and(query_param("fields", "feed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        api(&server).await.call_subscriptions_api(Some("feed")).await.unwrap();
    }

    #[tokio::test]
    async fn test_call_subscribed_apps_default_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/page1/subscribed_apps"))
            .and(query_param("subscribed_fields", DEFAULT_FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        api(&server).await.call_subscribed_apps(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_user_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/psid1"))
            .and(query_param("fields", USER_PROFILE_FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "first_name": "Ana",
                "last_name": "Gómez",
                "locale": "es_LA",
                "timezone": -5,
                "id": "psid1"
            })))
            .mount(&server)
            .await;

        let profile = api(&server).await.get_user_profile("psid1").await.unwrap();
        assert_eq!(profile.first_name.as_deref(), Some("Ana"));
        assert_eq!(profile.locale.as_deref(), Some("es_LA"));
    }

    #[tokio::test]
    async fn test_personas() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/personas"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"name": "Agente", "id": "111"}],
                "paging": {}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/me/personas"))
            .and(body_json(json!({"name": "Ventas", "profile_picture_url": "https://x/v.png"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "222"})))
            .mount(&server)
            .await;

        let api = api(&server).await;
        let personas = api.get_persona_api().await.unwrap();
        assert_eq!(
            personas,
            vec![Persona {
                name: "Agente".to_string(),
                id: "111".to_string()
            }]
        );
        assert_eq!(api.post_persona_api("Ventas", "https://x/v.png").await.unwrap(), "222");
    }

    #[tokio::test]
    async fn test_call_nlp_configs_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/nlp_configs"))
            .and(query_param("nlp_enabled", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        api(&server).await.call_nlp_configs_api().await.unwrap();
    }
}
