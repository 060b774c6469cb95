//! Inbound event → reply mapping
//!
//! [`Receive`] turns one messaging event into the ordered list of Send API
//! requests to issue, each with the delay after which it goes out. It does
//! no I/O; the handler performs the actual sends.

use std::time::Duration;

use tracing::{error, info};

use mb_core::Translator;

use crate::bot::{Bot, Payload};
use crate::error::{MessengerError, Result};
use crate::response::{Recipient, Response, SendRequest};
use crate::types::{InboundMessage, MessagingEvent, Nlp, NlpEntity, Postback, Referral, User};

/// NLP entity that flags a greeting
pub const GREETING_ENTITY: &str = "intro";

/// Minimum confidence for the greeting entity (exclusive)
pub const GREETING_CONFIDENCE: f64 = 0.8;

/// Keyword that starts the conversation when typed
const START_KEYWORD: &str = "empezar";

/// Default gap between consecutive replies
pub const DEFAULT_STAGGER: Duration = Duration::from_secs(2);

/// A Send API request and when to issue it
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub request: SendRequest,
    pub delay: Duration,
}

/// Receiver for a single messaging event
pub struct Receive<'a> {
    user: &'a User,
    event: &'a MessagingEvent,
    tr: Translator<'a>,
    agent_persona: Option<&'a str>,
    stagger: Duration,
}

impl<'a> Receive<'a> {
    pub fn new(user: &'a User, event: &'a MessagingEvent, tr: Translator<'a>) -> Self {
        Self {
            user,
            event,
            tr,
            agent_persona: None,
            stagger: DEFAULT_STAGGER,
        }
    }

    /// Persona ID used for the agent hand-off reply
    pub fn with_agent_persona(mut self, persona_id: Option<&'a str>) -> Self {
        self.agent_persona = persona_id;
        self
    }

    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Replies for the event, in send order.
    ///
    /// Failures while building the reply are reported to the user as a
    /// single error message.
    pub fn handle_message(&self) -> Vec<Outbound> {
        let responses = self.responses().unwrap_or_else(|e| {
            error!("Failed to handle event for {}: {}", self.user.psid, e);
            vec![Response::text(
                self.tr.t_with("error.interno", &[("error", &e.to_string())]),
            )]
        });

        self.schedule(responses)
    }

    fn responses(&self) -> Result<Vec<Response>> {
        if let Some(message) = &self.event.message {
            if let Some(quick_reply) = &message.quick_reply {
                return Ok(self.handle_payload(&quick_reply.payload));
            }
            if message.attachments.is_some() {
                return Ok(self.handle_attachment_message());
            }
            if let Some(text) = message.text.as_deref().filter(|t| !t.is_empty()) {
                return Ok(self.handle_text_message(message, text));
            }
        } else if let Some(postback) = &self.event.postback {
            return self.handle_postback(postback);
        } else if let Some(referral) = &self.event.referral {
            return self.handle_referral(referral);
        }

        Ok(Vec::new())
    }

    fn handle_text_message(&self, message: &InboundMessage, text: &str) -> Vec<Response> {
        info!("Received text: {} for {}", text, self.user.psid);

        let greeting = first_entity(message.nlp.as_ref(), GREETING_ENTITY)
            .is_some_and(|entity| entity.confidence > GREETING_CONFIDENCE);

        if greeting || text.trim().to_lowercase().contains(START_KEYWORD) {
            return Response::nux_message(self.user, self.tr, true);
        }

        vec![
            Response::text(self.tr.t_with("error.message", &[("message", text)])),
            Response::text(self.tr.t("bot.guia")),
            Response::main_menu(self.tr),
        ]
    }

    fn handle_attachment_message(&self) -> Vec<Response> {
        info!("Received attachment for {}", self.user.psid);

        let agent = Payload::Agente;
        vec![Response::quick_reply(
            self.tr.t("archivo.adjunto"),
            [(agent.title(self.tr), agent.as_str())],
        )]
    }

    fn handle_postback(&self, postback: &Postback) -> Result<Vec<Response>> {
        let payload = match (&postback.payload, &postback.referral) {
            (Some(payload), _) => payload,
            (None, Some(referral)) if referral.kind.as_deref() == Some("OPEN_THREAD") => referral
                .reference
                .as_ref()
                .ok_or_else(|| MessengerError::InvalidPayload("referral without ref".to_string()))?,
            _ => {
                return Err(MessengerError::InvalidPayload(
                    "postback without payload".to_string(),
                ));
            }
        };

        Ok(self.handle_payload(&payload.to_uppercase()))
    }

    fn handle_referral(&self, referral: &Referral) -> Result<Vec<Response>> {
        let payload = referral
            .reference
            .as_ref()
            .ok_or_else(|| MessengerError::InvalidPayload("referral without ref".to_string()))?;

        Ok(self.handle_payload(&payload.to_uppercase()))
    }

    /// Replies for a normalized payload keyword
    pub fn handle_payload(&self, payload: &str) -> Vec<Response> {
        info!("Received payload: {} for {}", payload, self.user.psid);

        match payload.parse::<Payload>() {
            Ok(Payload::MenuPrincipal | Payload::NuevaConsulta) => {
                Response::nux_message(self.user, self.tr, false)
            }
            Ok(Payload::Empezar) => Response::nux_message(self.user, self.tr, true),
            Ok(known) => Bot::handle_payload(known, self.tr, self.agent_persona)
                .into_iter()
                .collect(),
            Err(_) => vec![Response::text(
                self.tr.t_with("error.payload", &[("payload", payload)]),
            )],
        }
    }

    /// Staggers replies by their position unless a reply sets its own delay
    fn schedule(&self, responses: Vec<Response>) -> Vec<Outbound> {
        let mut slot = Duration::ZERO;
        let mut outbound = Vec::with_capacity(responses.len());

        for response in responses {
            let delay = response.delay.unwrap_or(slot);
            outbound.push(Outbound {
                request: SendRequest::new(Recipient::Id(self.user.psid.clone()), response),
                delay,
            });
            slot += self.stagger;
        }

        outbound
    }
}

/// Private reply to a page post or comment
pub fn handle_private_reply(tr: Translator<'_>, recipient: Recipient) -> SendRequest {
    let welcome = format!(
        "{} {}. {}",
        tr.t("bot.saludo"),
        tr.t("bot.guia"),
        tr.t("bot.ayuda")
    );

    let menu = Payload::MenuPrincipal;
    let response = Response::quick_reply(
        welcome,
        [(tr.t("menu.principal"), menu.as_str())],
    );

    SendRequest::new(recipient, response)
}

/// First value of an NLP entity, if present
pub fn first_entity<'n>(nlp: Option<&'n Nlp>, name: &str) -> Option<&'n NlpEntity> {
    nlp?.entities.get(name)?.first()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NlpEntity, QuickReplyPayload};
    use mb_core::Catalog;
    use std::collections::HashMap;

    fn catalog() -> Catalog {
        Catalog::bundled("es_ES").unwrap()
    }

    fn user() -> User {
        User {
            first_name: Some("Ana".to_string()),
            ..User::new("psid-1")
        }
    }

    fn text_event(text: &str) -> MessagingEvent {
        MessagingEvent {
            message: Some(InboundMessage {
                text: Some(text.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn texts(outbound: &[Outbound]) -> Vec<Option<&str>> {
        outbound
            .iter()
            .map(|o| o.request.message.text.as_deref())
            .collect()
    }

    #[test]
    fn test_unrecognized_text() {
        let catalog = catalog();
        let tr = catalog.translator("es_ES");
        let user = user();
        let event = text_event("¿tienen envíos?");

        let outbound = Receive::new(&user, &event, tr).handle_message();
        assert_eq!(outbound.len(), 3);
        assert_eq!(
            outbound[0].request.message.text,
            Some(tr.t_with("error.message", &[("message", "¿tienen envíos?")]))
        );
        assert_eq!(outbound[1].request.message.text, Some(tr.t("bot.guia")));
        assert_eq!(outbound[2].request.message.quick_replies.len(), 6);
    }

    #[test]
    fn test_stagger_delays() {
        let catalog = catalog();
        let user = user();
        let event = text_event("hola?");

        let outbound = Receive::new(&user, &event, catalog.translator("es_ES")).handle_message();
        let delays: Vec<_> = outbound.iter().map(|o| o.delay).collect();
        assert_eq!(
            delays,
            vec![Duration::ZERO, Duration::from_secs(2), Duration::from_secs(4)]
        );

        let outbound = Receive::new(&user, &event, catalog.translator("es_ES"))
            .with_stagger(Duration::from_millis(10))
            .handle_message();
        assert_eq!(outbound[2].delay, Duration::from_millis(20));
    }

    #[test]
    fn test_greeting_by_keyword() {
        let catalog = catalog();
        let user = user();
        let event = text_event("  Quiero EMPEZAR ");

        let outbound = Receive::new(&user, &event, catalog.translator("es_ES")).handle_message();
        assert_eq!(outbound.len(), 3);
        assert!(texts(&outbound)[0].unwrap().contains("Ana"));
    }

    #[test]
    fn test_greeting_by_nlp_confidence() {
        let catalog = catalog();
        let user = user();

        let with_confidence = |confidence: f64| {
            let mut entities = HashMap::new();
            entities.insert(
                GREETING_ENTITY.to_string(),
                vec![NlpEntity {
                    confidence,
                    value: None,
                }],
            );
            let mut event = text_event("buenas");
            event.message.as_mut().unwrap().nlp = Some(Nlp { entities });
            event
        };

        let confident = with_confidence(0.95);
        let outbound = Receive::new(&user, &confident, catalog.translator("es_ES")).handle_message();
        assert!(texts(&outbound)[0].unwrap().contains("Ana"));

        let borderline = with_confidence(0.8);
        let outbound = Receive::new(&user, &borderline, catalog.translator("es_ES")).handle_message();
        assert!(texts(&outbound)[0].unwrap().contains("buenas"));
    }

    #[test]
    fn test_quick_reply_payload() {
        let catalog = catalog();
        let tr = catalog.translator("es_ES");
        let user = user();
        let event = MessagingEvent {
            message: Some(InboundMessage {
                text: Some("Soporte técnico".to_string()),
                quick_reply: Some(QuickReplyPayload {
                    payload: "SOPORTE".to_string(),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let outbound = Receive::new(&user, &event, tr).handle_message();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].request.message.text, Some(tr.t("respuestas.soporte")));
        assert_eq!(outbound[0].request.recipient, Recipient::Id("psid-1".to_string()));
        assert_eq!(outbound[0].delay, Duration::ZERO);
    }

    #[test]
    fn test_attachment() {
        let catalog = catalog();
        let tr = catalog.translator("es_ES");
        let user = user();
        let event: MessagingEvent = serde_json::from_str(
            r#"{"message": {"attachments": [{"type": "image", "payload": {"url": "https://x"}}]}}"#,
        )
        .unwrap();

        let outbound = Receive::new(&user, &event, tr).handle_message();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].request.message.text, Some(tr.t("archivo.adjunto")));
        assert_eq!(outbound[0].request.message.quick_replies[0].payload, "AGENTE");
    }

    #[test]
    fn test_postback_is_uppercased() {
        let catalog = catalog();
        let tr = catalog.translator("es_ES");
        let user = user();
        let event: MessagingEvent =
            serde_json::from_str(r#"{"postback": {"title": "Info", "payload": "informacion"}}"#).unwrap();

        let outbound = Receive::new(&user, &event, tr).handle_message();
        assert_eq!(outbound[0].request.message.text, Some(tr.t("respuestas.informacion")));
    }

    #[test]
    fn test_postback_open_thread_referral() {
        let catalog = catalog();
        let tr = catalog.translator("es_ES");
        let user = user();
        let event: MessagingEvent = serde_json::from_str(
            r#"{"postback": {"referral": {"ref": "linea_atencion", "type": "OPEN_THREAD"}}}"#,
        )
        .unwrap();

        let outbound = Receive::new(&user, &event, tr).handle_message();
        assert_eq!(outbound[0].request.message.text, Some(tr.t("respuestas.lineaAtencion")));
    }

    #[test]
    fn test_postback_without_payload_reports_error() {
        let catalog = catalog();
        let tr = catalog.translator("es_ES");
        let user = user();
        let event: MessagingEvent = serde_json::from_str(r#"{"postback": {"title": "x"}}"#).unwrap();

        let outbound = Receive::new(&user, &event, tr).handle_message();
        assert_eq!(outbound.len(), 1);
        let text = outbound[0].request.message.text.as_deref().unwrap();
        assert!(text.contains("postback without payload"));
    }

    #[test]
    fn test_referral() {
        let catalog = catalog();
        let tr = catalog.translator("es_ES");
        let user = user();
        let event: MessagingEvent =
            serde_json::from_str(r#"{"referral": {"ref": "finalizar_chat", "source": "SHORTLINK"}}"#)
                .unwrap();

        let outbound = Receive::new(&user, &event, tr).handle_message();
        assert_eq!(outbound[0].request.message.text, Some(tr.t("respuestas.finalizarChat")));
    }

    #[test]
    fn test_menu_payloads() {
        let catalog = catalog();
        let tr = catalog.translator("es_ES");
        let user = user();
        let event = MessagingEvent::default();
        let receive = Receive::new(&user, &event, tr);

        assert_eq!(receive.handle_payload("MENU_PRINCIPAL").len(), 2);
        assert_eq!(receive.handle_payload("NUEVA_CONSULTA").len(), 2);
        assert_eq!(receive.handle_payload("EMPEZAR").len(), 3);
    }

    #[test]
    fn test_unknown_payload_fallback() {
        let catalog = catalog();
        let tr = catalog.translator("es_ES");
        let user = user();
        let event = MessagingEvent::default();

        let responses = Receive::new(&user, &event, tr).handle_payload("PROMO_VERANO");
        assert_eq!(responses.len(), 1);
        assert_eq!(
            responses[0].message.text,
            Some(tr.t_with("error.payload", &[("payload", "PROMO_VERANO")]))
        );
    }

    #[test]
    fn test_agent_persona_moves_to_request() {
        let catalog = catalog();
        let user = user();
        let event: MessagingEvent =
            serde_json::from_str(r#"{"postback": {"payload": "AGENTE"}}"#).unwrap();

        let outbound = Receive::new(&user, &event, catalog.translator("es_ES"))
            .with_agent_persona(Some("persona-9"))
            .handle_message();
        assert_eq!(outbound[0].request.persona_id.as_deref(), Some("persona-9"));
    }

    #[test]
    fn test_empty_event() {
        let catalog = catalog();
        let user = user();
        let event = MessagingEvent::default();
        assert!(Receive::new(&user, &event, catalog.translator("es_ES"))
            .handle_message()
            .is_empty());
    }

    #[test]
    fn test_empty_text_gets_no_reply() {
        let catalog = catalog();
        let user = user();
        let event = text_event("");
        assert!(Receive::new(&user, &event, catalog.translator("es_ES"))
            .handle_message()
            .is_empty());
    }

    #[test]
    fn test_own_delay_overrides_slot() {
        let catalog = catalog();
        let user = user();
        let event = MessagingEvent::default();
        let receive = Receive::new(&user, &event, catalog.translator("es_ES"));

        let outbound = receive.schedule(vec![
            Response::text("a"),
            Response::text("b").with_delay(Duration::from_millis(100)),
            Response::text("c"),
        ]);
        let delays: Vec<_> = outbound.iter().map(|o| o.delay).collect();
        assert_eq!(
            delays,
            vec![Duration::ZERO, Duration::from_millis(100), Duration::from_secs(4)]
        );
    }

    #[test]
    fn test_private_reply() {
        let catalog = catalog();
        let tr = catalog.translator("es_ES");

        let request = handle_private_reply(tr, Recipient::CommentId("1_2".to_string()));
        assert_eq!(request.recipient, Recipient::CommentId("1_2".to_string()));
        let text = request.message.text.as_deref().unwrap();
        assert!(text.starts_with(&tr.t("bot.saludo")));
        assert_eq!(request.message.quick_replies[0].payload, "MENU_PRINCIPAL");
    }

    #[test]
    fn test_first_entity() {
        assert!(first_entity(None, "intro").is_none());
        let nlp = Nlp::default();
        assert!(first_entity(Some(&nlp), "intro").is_none());
    }
}
