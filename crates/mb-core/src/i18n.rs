//! Locale catalog
//!
//! Locales are nested JSON objects compiled into the binary. Keys are
//! addressed with dotted paths (`menu.soporte`) and values may contain
//! `{{name}}` placeholders.

use serde_json::Value;

use crate::error::{Error, Result};

/// Locales shipped with the binary
const BUNDLED: &[(&str, &str)] = &[
    ("es_ES", include_str!("../locales/es_ES.json")),
    ("en_US", include_str!("../locales/en_US.json")),
];

/// Loaded set of locales, default locale first
#[derive(Debug, Clone)]
pub struct Catalog {
    locales: Vec<(String, Value)>,
}

impl Catalog {
    /// Load the bundled locales with `default_locale` as the fallback
    pub fn bundled(default_locale: &str) -> Result<Self> {
        Self::from_sources(default_locale, BUNDLED)
    }

    /// Build a catalog from `(locale, json)` pairs
    pub fn from_sources(default_locale: &str, sources: &[(&str, &str)]) -> Result<Self> {
        let mut locales = Vec::with_capacity(sources.len());
        for (code, json) in sources {
            let value: Value = serde_json::from_str(json)
                .map_err(|e| Error::Locale(format!("{}: {}", code, e)))?;
            if !value.is_object() {
                return Err(Error::Locale(format!("{}: root must be an object", code)));
            }
            locales.push((code.to_string(), value));
        }

        let position = locales
            .iter()
            .position(|(code, _)| code == default_locale)
            .ok_or_else(|| Error::Locale(format!("default locale {} is not bundled", default_locale)))?;
        let default = locales.remove(position);
        locales.insert(0, default);

        Ok(Self { locales })
    }

    /// Locale codes, default first
    pub fn locales(&self) -> impl Iterator<Item = &str> {
        self.locales.iter().map(|(code, _)| code.as_str())
    }

    /// The fallback locale
    pub fn default_locale(&self) -> &str {
        &self.locales[0].0
    }

    /// Translator for `locale`.
    ///
    /// An exact match wins, then a locale sharing the language
    /// (`es_LA` → `es_ES`), then the default locale.
    pub fn translator(&self, locale: &str) -> Translator<'_> {
        let language = locale.split(['_', '-']).next().unwrap_or_default();

        let resolved = self
            .locales
            .iter()
            .find(|(code, _)| code == locale)
            .or_else(|| {
                self.locales
                    .iter()
                    .find(|(code, _)| code.split('_').next() == Some(language))
            })
            .map(|(code, _)| code.as_str())
            .unwrap_or_else(|| self.default_locale());

        Translator {
            catalog: self,
            locale: resolved,
        }
    }

    fn lookup(&self, locale: &str, key: &str) -> Option<&str> {
        let (_, root) = self.locales.iter().find(|(code, _)| code == locale)?;
        key.split('.')
            .try_fold(root, |node, segment| node.get(segment))?
            .as_str()
    }
}

/// A catalog bound to one locale
#[derive(Debug, Clone, Copy)]
pub struct Translator<'a> {
    catalog: &'a Catalog,
    locale: &'a str,
}

impl<'a> Translator<'a> {
    /// Resolved locale code
    pub fn locale(&self) -> &'a str {
        self.locale
    }

    /// Translate `key`; falls back to the default locale, then to the key
    pub fn t(&self, key: &str) -> String {
        self.catalog
            .lookup(self.locale, key)
            .or_else(|| self.catalog.lookup(self.catalog.default_locale(), key))
            .map(str::to_string)
            .unwrap_or_else(|| {
                tracing::warn!("Missing translation for {} ({})", key, self.locale);
                key.to_string()
            })
    }

    /// Translate `key` and substitute `{{name}}` placeholders
    pub fn t_with(&self, key: &str, params: &[(&str, &str)]) -> String {
        params
            .iter()
            .fold(self.t(key), |text, (name, value)| {
                text.replace(&format!("{{{{{}}}}}", name), value)
            })
    }
}
