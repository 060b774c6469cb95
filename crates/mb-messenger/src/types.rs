//! Inbound webhook types and user data
//!
//! Everything the platform may omit is optional so a single unexpected
//! event never fails the whole batch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level webhook body
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEntry {
    pub id: Option<String>,
    pub time: Option<i64>,
    /// Messenger events
    pub messaging: Option<Vec<MessagingEvent>>,
    /// Page feed changes
    pub changes: Option<Vec<Change>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagingEvent {
    pub sender: Option<Party>,
    pub recipient: Option<Party>,
    pub timestamp: Option<i64>,
    pub message: Option<InboundMessage>,
    pub postback: Option<Postback>,
    pub referral: Option<Referral>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Party {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundMessage {
    pub mid: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub is_echo: bool,
    pub quick_reply: Option<QuickReplyPayload>,
    pub attachments: Option<Vec<InboundAttachment>>,
    pub nlp: Option<Nlp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuickReplyPayload {
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundAttachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Option<serde_json::Value>,
}

/// Built-in NLP annotations attached to text messages
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Nlp {
    #[serde(default)]
    pub entities: HashMap<String, Vec<NlpEntity>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NlpEntity {
    pub confidence: f64,
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Postback {
    pub title: Option<String>,
    pub payload: Option<String>,
    pub referral: Option<Referral>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Referral {
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Page feed change (`entry.changes[]`)
#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    pub field: String,
    #[serde(default)]
    pub value: FeedValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedValue {
    pub item: Option<String>,
    pub verb: Option<String>,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub from: Option<Party>,
}

/// Profile fields returned by `GET /{psid}`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub locale: Option<String>,
    pub timezone: Option<f64>,
}

/// The person on the other side of the conversation
#[derive(Debug, Clone, Default)]
pub struct User {
    /// Page-scoped ID
    pub psid: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub locale: Option<String>,
    pub timezone: Option<f64>,
}

impl User {
    /// A user known only by PSID
    pub fn new(psid: &str) -> Self {
        Self {
            psid: psid.to_string(),
            ..Default::default()
        }
    }

    pub fn with_profile(psid: &str, profile: UserProfile) -> Self {
        Self {
            psid: psid.to_string(),
            first_name: profile.first_name,
            last_name: profile.last_name,
            gender: profile.gender,
            locale: profile.locale,
            timezone: profile.timezone,
        }
    }

    pub fn first_name(&self) -> &str {
        self.first_name.as_deref().unwrap_or_default()
    }
}
