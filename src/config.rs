//! Runtime configuration, read from `.env` and the process environment.

use crate::dictionary::{DictionaryConfig, DEFAULT_DICTIONARY_PATH};
use crate::error::{DictionaryError, Result};
use crate::record::DEFAULT_BASE_URI;
use std::path::PathBuf;

pub const DEFAULT_ENDPOINT: &str = "/integration/v2/column/";
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Connection settings for the catalog REST API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub base_url: String,
    /// Sent as the `TOKEN` header
    pub api_token: String,
    pub endpoint: String,
    pub page_size: usize,
}

impl CatalogConfig {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URI.to_string(),
            api_token: api_token.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub dictionary_path: PathBuf,
    pub base_url: String,
    pub api_token: Option<String>,
    pub endpoint: String,
    pub page_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dictionary_path: PathBuf::from(DEFAULT_DICTIONARY_PATH),
            base_url: DEFAULT_BASE_URI.to_string(),
            api_token: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and read settings from the environment.
    ///
    /// Recognized: `DICTIONARY_PATH`, `ALATION_BASE_URL`, `ALATION_API_TOKEN`,
    /// `ALATION_ENDPOINT`, `ALATION_PAGE_SIZE`.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("DICTIONARY_PATH") {
            config.dictionary_path = PathBuf::from(path);
        }
        if let Some(base_url) = lookup("ALATION_BASE_URL") {
            config.base_url = base_url;
        }
        config.api_token = lookup("ALATION_API_TOKEN").filter(|token| !token.trim().is_empty());
        if let Some(endpoint) = lookup("ALATION_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(page_size) = lookup("ALATION_PAGE_SIZE") {
            config.page_size = parse_page_size(&page_size)?;
        }

        Ok(config)
    }

    pub fn dictionary(&self) -> DictionaryConfig {
        DictionaryConfig::new(&self.dictionary_path).with_base_uri(&self.base_url)
    }

    /// Catalog settings; requires an API token.
    pub fn catalog(&self) -> Result<CatalogConfig> {
        let api_token = self.api_token.clone().ok_or_else(|| {
            DictionaryError::Config(
                "an API token is required (set ALATION_API_TOKEN or pass --token)".to_string(),
            )
        })?;

        Ok(CatalogConfig {
            base_url: self.base_url.clone(),
            api_token,
            endpoint: self.endpoint.clone(),
            page_size: self.page_size,
        })
    }
}

pub fn parse_page_size(raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(DictionaryError::Config(format!(
            "page size must be a positive integer, got '{}'",
            raw
        ))),
    }
}
