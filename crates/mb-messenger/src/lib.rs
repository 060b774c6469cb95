//! mb-messenger: Messenger Platform bot
//!
//! Receives webhook events, maps them to canned localized replies and
//! sends those replies through the Graph API Send API. Also configures the
//! page profile (greeting, persistent menu, personas) at setup time.

pub mod api;
pub mod bot;
pub mod error;
pub mod handler;
pub mod persona;
pub mod profile;
pub mod receive;
pub mod response;
pub mod types;
pub mod webhook;

pub use api::GraphApi;
pub use bot::{Bot, Payload};
pub use error::{MessengerError, Result};
pub use handler::MessengerHandler;
pub use persona::PersonaRegistry;
pub use profile::{Profile, SetupMode};
pub use receive::Receive;
pub use response::{Response, SendRequest};
pub use webhook::{start_webhook_server, WebhookState};
