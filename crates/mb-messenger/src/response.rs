//! Outbound message builders
//!
//! Typed versions of the Send API message shapes: text, quick replies and
//! generic/button templates. A [`Response`] also carries the delivery hints
//! (delay, persona) that travel outside the message body.

use std::time::Duration;

use serde::Serialize;

use mb_core::Translator;

use crate::bot::Payload;
use crate::types::User;

/// Message body as accepted by the Send API
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<QuickReply>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickReply {
    pub content_type: &'static str,
    pub title: String,
    pub payload: String,
}

impl QuickReply {
    pub fn text(title: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            content_type: "text",
            title: title.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Attachment {
    Template(Template),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "template_type", rename_all = "snake_case")]
pub enum Template {
    Generic { elements: Vec<Element> },
    Button { text: String, buttons: Vec<Button> },
}

/// Generic template card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Button>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Button {
    WebUrl {
        title: String,
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        webview_height_ratio: Option<WebviewHeight>,
    },
    Postback {
        title: String,
        payload: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WebviewHeight {
    Compact,
    Tall,
    Full,
}

impl Button {
    pub fn postback(title: impl Into<String>, payload: impl Into<String>) -> Self {
        Button::Postback {
            title: title.into(),
            payload: payload.into(),
        }
    }

    pub fn web_url(
        title: impl Into<String>,
        url: impl Into<String>,
        ratio: Option<WebviewHeight>,
    ) -> Self {
        Button::WebUrl {
            title: title.into(),
            url: url.into(),
            webview_height_ratio: ratio,
        }
    }
}

/// A message to send plus its delivery hints
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub message: Message,
    /// Overrides the staggered send slot
    pub delay: Option<Duration>,
    /// Persona that speaks the message
    pub persona_id: Option<String>,
}

impl From<Message> for Response {
    fn from(message: Message) -> Self {
        Self {
            message,
            delay: None,
            persona_id: None,
        }
    }
}

impl Response {
    pub fn text(text: impl Into<String>) -> Self {
        Message {
            text: Some(text.into()),
            ..Default::default()
        }
        .into()
    }

    pub fn text_with_persona(text: impl Into<String>, persona_id: impl Into<String>) -> Self {
        Self::text(text).with_persona(persona_id)
    }

    /// Text with one quick reply per `(title, payload)` pair
    pub fn quick_reply<T, P>(text: impl Into<String>, replies: impl IntoIterator<Item = (T, P)>) -> Self
    where
        T: Into<String>,
        P: Into<String>,
    {
        Message {
            text: Some(text.into()),
            quick_replies: replies
                .into_iter()
                .map(|(title, payload)| QuickReply::text(title, payload))
                .collect(),
            ..Default::default()
        }
        .into()
    }

    pub fn generic_template(
        image_url: impl Into<String>,
        title: impl Into<String>,
        subtitle: impl Into<String>,
        buttons: Vec<Button>,
    ) -> Self {
        Self::template(Template::Generic {
            elements: vec![Element {
                title: title.into(),
                subtitle: Some(subtitle.into()).filter(|s| !s.is_empty()),
                image_url: Some(image_url.into()),
                buttons,
            }],
        })
    }

    /// Generic template card without buttons
    pub fn image_template(
        image_url: impl Into<String>,
        title: impl Into<String>,
        subtitle: impl Into<String>,
    ) -> Self {
        Self::generic_template(image_url, title, subtitle, Vec::new())
    }

    pub fn button_template(title: impl Into<String>, buttons: Vec<Button>) -> Self {
        Self::template(Template::Button {
            text: title.into(),
            buttons,
        })
    }

    fn template(template: Template) -> Self {
        Message {
            attachment: Some(Attachment::Template(template)),
            ..Default::default()
        }
        .into()
    }

    /// Welcome sequence for new conversations and the main menu.
    ///
    /// `with_greeting` prepends the personalized intro line.
    pub fn nux_message(user: &User, tr: Translator<'_>, with_greeting: bool) -> Vec<Response> {
        let mut responses = Vec::with_capacity(3);

        if with_greeting {
            responses.push(Self::text(
                tr.t_with("bot.intro", &[("user_first_name", user.first_name())]),
            ));
        }
        responses.push(Self::text(tr.t("bot.guia")));
        responses.push(Self::main_menu(tr));

        responses
    }

    /// Help prompt offering every main menu option as a quick reply
    pub fn main_menu(tr: Translator<'_>) -> Self {
        Self::quick_reply(
            tr.t("bot.ayuda"),
            Payload::MAIN_MENU
                .iter()
                .map(|payload| (payload.title(tr), payload.as_str())),
        )
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_persona(mut self, persona_id: impl Into<String>) -> Self {
        self.persona_id = Some(persona_id.into());
        self
    }
}

/// Who receives a Send API message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// Page-scoped user ID
    Id(String),
    /// Private reply to a comment
    CommentId(String),
    /// Private reply to a visitor post
    PostId(String),
}

/// Send API request body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendRequest {
    pub recipient: Recipient,
    pub messaging_type: &'static str,
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<String>,
}

impl SendRequest {
    pub fn new(recipient: Recipient, response: Response) -> Self {
        Self {
            recipient,
            messaging_type: "RESPONSE",
            message: response.message,
            persona_id: response.persona_id,
        }
    }
}
