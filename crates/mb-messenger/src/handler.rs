//! Message handler for Messenger webhooks

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use mb_core::{Catalog, Config};

use crate::api::GraphApi;
use crate::error::{MessengerError, Result};
use crate::persona::PersonaRegistry;
use crate::receive::{handle_private_reply, Outbound, Receive};
use crate::response::Recipient;
use crate::types::{Change, MessagingEvent, User, WebhookEntry, WebhookPayload};

/// Messenger message handler
#[derive(Clone)]
pub struct MessengerHandler {
    api: GraphApi,
    catalog: Arc<Catalog>,
    personas: PersonaRegistry,
    agent_persona: String,
    stagger: Duration,
}

impl MessengerHandler {
    /// Create a new Messenger handler
    pub fn new(
        api: GraphApi,
        catalog: Arc<Catalog>,
        personas: PersonaRegistry,
        config: &Config,
    ) -> Self {
        Self {
            api,
            catalog,
            personas,
            agent_persona: config.agent_persona.clone(),
            stagger: config.send_stagger(),
        }
    }

    /// Process a page webhook.
    ///
    /// Returns one handle per event with replies to send; callers may drop them.
    pub async fn process_webhook(&self, payload: &WebhookPayload) -> Result<Vec<JoinHandle<()>>> {
        if payload.object != "page" {
            return Err(MessengerError::UnsupportedObject(payload.object.clone()));
        }

        let mut handles = Vec::new();
        for entry in &payload.entry {
            handles.extend(self.handle_webhook_entry(entry).await);
        }

        Ok(handles)
    }

    /// Handle one webhook entry; errors are logged per event
    pub async fn handle_webhook_entry(&self, entry: &WebhookEntry) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for change in entry.changes.iter().flatten() {
            match self.handle_feed_change(change) {
                Ok(Some(handle)) => handles.push(handle),
                Ok(None) => {}
                Err(e) => error!("Error handling feed change: {}", e),
            }
        }

        for event in entry.messaging.iter().flatten() {
            match self.handle_messaging(event).await {
                Ok(scheduled) => handles.extend(scheduled),
                Err(e) => error!("Error handling messaging event: {}", e),
            }
        }

        handles
    }

    /// Handle a single messaging event
    ///
    /// Replies go out from one task, in order.
    pub async fn handle_messaging(&self, event: &MessagingEvent) -> Result<Option<JoinHandle<()>>> {
        if event.message.as_ref().is_some_and(|m| m.is_echo) {
            debug!("Ignoring echo message");
            return Ok(None);
        }

        let sender_id = match &event.sender {
            Some(sender) if sender.id != self.api.page_id() => &sender.id,
            Some(_) => {
                debug!("Ignoring event sent by the page");
                return Ok(None);
            }
            None => {
                warn!("No sender ID in messaging event");
                return Ok(None);
            }
        };

        let user = self.load_user(sender_id).await;
        let tr = self
            .catalog
            .translator(user.locale.as_deref().unwrap_or_default());
        let agent_persona = self.personas.get(&self.agent_persona);

        let outbound = Receive::new(&user, event, tr)
            .with_agent_persona(agent_persona.as_deref())
            .with_stagger(self.stagger)
            .handle_message();

        if outbound.is_empty() {
            return Ok(None);
        }

        info!("Scheduling {} message(s) for {}", outbound.len(), sender_id);
        Ok(Some(self.dispatch(outbound)))
    }

    /// Private reply to a new visitor post or comment on the page feed
    fn handle_feed_change(&self, change: &Change) -> Result<Option<JoinHandle<()>>> {
        if change.field != "feed" || change.value.verb.as_deref() != Some("add") {
            return Ok(None);
        }

        let value = &change.value;
        if value.from.as_ref().is_some_and(|from| from.id == self.api.page_id()) {
            return Ok(None);
        }

        let missing = |field: &str| MessengerError::InvalidPayload(format!("feed change without {}", field));
        let recipient = match value.item.as_deref() {
            Some("post") => Recipient::PostId(value.post_id.clone().ok_or_else(|| missing("post_id"))?),
            Some("comment") => {
                Recipient::CommentId(value.comment_id.clone().ok_or_else(|| missing("comment_id"))?)
            }
            _ => return Ok(None),
        };

        info!("Private reply to {:?}", recipient);
        let request = handle_private_reply(self.catalog.translator(self.catalog.default_locale()), recipient);

        Ok(Some(self.dispatch(vec![Outbound {
            request,
            delay: Duration::ZERO,
        }])))
    }

    /// Look up the user's profile, falling back to the PSID alone
    async fn load_user(&self, psid: &str) -> User {
        match self.api.get_user_profile(psid).await {
            Ok(profile) => User::with_profile(psid, profile),
            Err(e) => {
                warn!("Profile is unavailable for {}: {}", psid, e);
                User::new(psid)
            }
        }
    }

    /// Fire-and-forget sends in list order.
    ///
    /// Each delay counts from the moment the event was handled; a send
    /// never starts before the previous one has finished.
    fn dispatch(&self, outbound: Vec<Outbound>) -> JoinHandle<()> {
        let api = self.api.clone();
        let start = Instant::now();

        tokio::spawn(async move {
            for Outbound { request, delay } in outbound {
                tokio::time::sleep_until(start + delay).await;
                if let Err(e) = api.call_send_api(&request).await {
                    error!("Failed to send message to {:?}: {}", request.recipient, e);
                }
            }
        })
    }
}
