//! Remote launch configuration.
//!
//! The server publishes a small text document naming the archive
//! (`codebase` + `initial_jar`), its version (`download`) and the entry
//! point (`initial_class`). It is fetched once per load attempt.

mod parse;

use crate::error::{LaunchError, ProtocolError};
use crate::fetch::{self, FetchOptions};
use std::collections::HashMap;
use url::Url;

pub const KEY_CODEBASE: &str = "codebase";
pub const KEY_INITIAL_JAR: &str = "initial_jar";
pub const KEY_DOWNLOAD: &str = "download";
pub const KEY_INITIAL_CLASS: &str = "initial_class";

/// Entry point used when the config does not name one.
pub const DEFAULT_ENTRY_POINT: &str = "client";

/// Placeholder replaced by the endpoint selector in preferred URLs.
pub const ENDPOINT_PLACEHOLDER: &str = "{endpoint}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    values: HashMap<String, String>,
}

impl RemoteConfig {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(Self {
            values: parse::parse_lines(text)?,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn require(&self, key: &'static str) -> Result<&str, ProtocolError> {
        self.get(key).ok_or(ProtocolError::MissingKey(key))
    }

    /// Numbered applet parameter (`param=<n>=<value>`).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.get(&format!("param-{}", name))
    }

    /// The archive version identifier.
    pub fn version(&self) -> Result<i32, ProtocolError> {
        let raw = self.require(KEY_DOWNLOAD)?;
        raw.trim()
            .parse()
            .map_err(|_| ProtocolError::InvalidVersion(raw.to_string()))
    }

    /// `codebase` followed directly by `initial_jar`.
    pub fn archive_url(&self) -> Result<Url, ProtocolError> {
        let joined = format!(
            "{}{}",
            self.require(KEY_CODEBASE)?,
            self.require(KEY_INITIAL_JAR)?
        );
        Url::parse(&joined).map_err(|e| ProtocolError::InvalidUrl {
            url: joined.clone(),
            reason: e.to_string(),
        })
    }

    /// `initial_class` without a trailing `.class`, or [`DEFAULT_ENTRY_POINT`].
    pub fn entry_point(&self) -> String {
        match self.get(KEY_INITIAL_CLASS) {
            Some(name) => name.strip_suffix(".class").unwrap_or(name).to_string(),
            None => DEFAULT_ENTRY_POINT.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All pairs, sorted by key.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .values
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        pairs.sort();
        pairs
    }
}

/// Produces a fresh config for each load attempt.
pub trait ConfigSource: Send + Sync {
    fn fetch(&self) -> Result<RemoteConfig, LaunchError>;
}

/// Fetches the config over HTTP, preferring a selected endpoint.
///
/// When the preferred URL fails to download or parse, the default URL is
/// tried instead; failures of the default URL are returned as is.
#[derive(Debug, Clone)]
pub struct HttpConfigSource {
    default_url: String,
    preferred_url: Option<String>,
    options: FetchOptions,
}

impl HttpConfigSource {
    pub fn new(default_url: impl Into<String>) -> Self {
        Self {
            default_url: default_url.into(),
            preferred_url: None,
            options: FetchOptions::default(),
        }
    }

    /// Prefers `template` with `{endpoint}` replaced by `selector`.
    /// A selector of 0 or a template without the placeholder selects nothing.
    pub fn with_endpoint(mut self, template: &str, selector: u32) -> Self {
        self.preferred_url = preferred_url(template, selector);
        self
    }

    pub fn preferred_url(&self) -> Option<&str> {
        self.preferred_url.as_deref()
    }

    pub fn default_url(&self) -> &str {
        &self.default_url
    }

    fn fetch_from(&self, url: &str) -> Result<RemoteConfig, LaunchError> {
        tracing::debug!(url, "fetching config");
        let text = fetch::get(url, &self.options)?.into_text()?;
        let config = RemoteConfig::parse(&text)?;
        tracing::info!(url, keys = config.len(), "config loaded");
        Ok(config)
    }
}

fn preferred_url(template: &str, selector: u32) -> Option<String> {
    if selector == 0 || !template.contains(ENDPOINT_PLACEHOLDER) {
        return None;
    }
    Some(template.replace(ENDPOINT_PLACEHOLDER, &selector.to_string()))
}

impl ConfigSource for HttpConfigSource {
    fn fetch(&self) -> Result<RemoteConfig, LaunchError> {
        if let Some(url) = &self.preferred_url {
            match self.fetch_from(url) {
                Ok(config) => return Ok(config),
                Err(e @ (LaunchError::Transient(_) | LaunchError::Protocol(_))) => {
                    tracing::warn!(url = %url, error = %e, "preferred endpoint failed, using default");
                }
                Err(e) => return Err(e),
            }
        }
        self.fetch_from(&self.default_url)
    }
}
