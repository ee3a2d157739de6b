use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use thiserror::Error;
use toml::{Table, Value};
use tracing::warn;

/// Environment variable pointing at a message override file.
pub const MESSAGES_PATH_ENV: &str = "DONATION_MESSAGES_PATH";

#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    overrides: HashMap<String, String>,
}

impl MessageCatalog {
    pub fn from_file(path: &Path) -> Result<Self, MessageCatalogError> {
        let contents = fs::read_to_string(path)?;
        let overrides = parse_catalog(&contents)?;
        Ok(Self { overrides })
    }

    /// Uses `configured`, then [`MESSAGES_PATH_ENV`], falling back to the
    /// embedded defaults when neither yields a readable catalog.
    pub fn resolve(configured: Option<&Path>) -> Self {
        let path = configured
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(MESSAGES_PATH_ENV).map(PathBuf::from));
        load_catalog_from_optional_path(path.as_deref()).unwrap_or_else(|err| {
            warn!("donation messages unavailable: {err}");
            MessageCatalog::default()
        })
    }

    pub fn text(&self, key: &str) -> String {
        self.lookup(key).to_string()
    }

    /// Looks up `key` and fills every `{name}` placeholder from `pairs`.
    pub fn render<'a, I, V>(&self, key: &str, pairs: I) -> String
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Into<String>,
    {
        pairs
            .into_iter()
            .fold(self.lookup(key).to_string(), |text, (name, value)| {
                text.replace(&format!("{{{name}}}"), &value.into())
            })
    }

    /// Override first, then the embedded text. Unknown keys echo themselves.
    fn lookup<'a>(&'a self, key: &'a str) -> &'a str {
        self.overrides
            .get(key)
            .or_else(|| DEFAULT_MESSAGES.get(key))
            .map(String::as_str)
            .unwrap_or(key)
    }
}

#[derive(Debug, Error)]
pub enum MessageCatalogError {
    #[error("cannot read donation message overrides: {0}")]
    Unreadable(#[from] std::io::Error),
    #[error("donation message overrides are not valid TOML: {0}")]
    Malformed(#[from] toml::de::Error),
    #[error("donation message `{key}` must be text or a section of texts")]
    NonTextEntry { key: String },
}

static DEFAULT_MESSAGES: Lazy<HashMap<String, String>> = Lazy::new(|| {
    parse_catalog(include_str!("../donation_messages.toml"))
        .expect("embedded donation_messages.toml must be valid")
});

pub(crate) fn load_catalog_from_optional_path(
    path: Option<&Path>,
) -> Result<MessageCatalog, MessageCatalogError> {
    match path {
        Some(path) => MessageCatalog::from_file(path),
        None => Ok(MessageCatalog::default()),
    }
}

/// Flattens nested sections into dotted keys, `[button] donate` becoming
/// `button.donate`.
fn parse_catalog(input: &str) -> Result<HashMap<String, String>, MessageCatalogError> {
    let sections: Table = toml::from_str(input)?;
    let mut messages = HashMap::new();
    let mut pending: Vec<(String, Value)> = sections.into_iter().collect();
    while let Some((key, value)) = pending.pop() {
        match value {
            Value::String(text) => {
                messages.insert(key, text);
            }
            Value::Table(children) => pending.extend(
                children
                    .into_iter()
                    .map(|(child, value)| (format!("{key}.{child}"), value)),
            ),
            _ => return Err(MessageCatalogError::NonTextEntry { key }),
        }
    }
    Ok(messages)
}
