//! mb-core: shared building blocks for mb-gateway
//!
//! Configuration loading, the common error type and the locale catalog
//! used to render every user-facing string.

pub mod config;
pub mod error;
pub mod i18n;

pub use config::{Config, FacebookConfig, PersonaConfig, ServerConfig};
pub use error::{Error, Result};
pub use i18n::{Catalog, Translator};
