//! Configuration resolution for rpger
//!
//! All options resolve from the environment with validated defaults. A
//! present-but-invalid value is a hard `Error::Config`; a missing value
//! silently takes the default so a bare `rpger extract file.pdf
//! --provider=mock` works with no environment at all.

use crate::{Error, Result};

/// Default single-value character ceiling handed to identification
pub const IDENTIFY_CHAR_CEILING: usize = 5_000;

/// Resolved process configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Vector store base URL, e.g. `http://localhost:8000`
    pub vector_store_url: Option<String>,
    /// Document store base URL
    pub document_store_url: Option<String>,

    /// API key for the cloud-A provider
    pub provider_a_key: Option<String>,
    /// API key for the cloud-B provider
    pub provider_b_key: Option<String>,
    /// Base URL of the local provider, e.g. `http://localhost:11434`
    pub local_provider_url: String,
    /// Model name served by the local provider
    pub local_provider_model: String,

    /// Sampling temperature for identification calls
    pub ai_temperature: f64,
    /// Token ceiling per provider call
    pub ai_max_tokens: u32,
    /// Per-call timeout in milliseconds
    pub ai_timeout_ms: u64,
    /// Retry attempts after the first failure
    pub ai_retries: u32,

    /// Upper bound on parallel per-page workers
    pub max_page_workers: usize,
    /// Documents above this page count are clamped to 4 workers
    pub large_doc_page_threshold: usize,

    /// Maximum accepted upload size in bytes
    pub upload_max_bytes: u64,
    /// Idle lifetime of a terminal session before the sweeper evicts it
    pub session_ttl_seconds: u64,

    /// HTTP listen port for `rpger serve`
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vector_store_url: None,
            document_store_url: None,
            provider_a_key: None,
            provider_b_key: None,
            local_provider_url: "http://localhost:11434".to_string(),
            local_provider_model: "llama3".to_string(),
            ai_temperature: 0.1,
            ai_max_tokens: 4000,
            ai_timeout_ms: 30_000,
            ai_retries: 3,
            max_page_workers: 8,
            large_doc_page_threshold: 400,
            upload_max_bytes: 200 * 1024 * 1024,
            session_ttl_seconds: 3600,
            port: 5780,
        }
    }
}

impl Config {
    /// Resolve configuration from the process environment
    ///
    /// # Errors
    /// Returns `Error::Config` naming the offending variable when a value
    /// is present but fails to parse or violates its bound.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Config::default();

        cfg.vector_store_url = non_empty(std::env::var("VECTOR_STORE_URL").ok());
        cfg.document_store_url = non_empty(std::env::var("DOCUMENT_STORE_URL").ok());
        cfg.provider_a_key = non_empty(std::env::var("PROVIDER_A_KEY").ok());
        cfg.provider_b_key = non_empty(std::env::var("PROVIDER_B_KEY").ok());
        if let Some(url) = non_empty(std::env::var("LOCAL_PROVIDER_URL").ok()) {
            cfg.local_provider_url = url;
        }
        if let Some(model) = non_empty(std::env::var("LOCAL_PROVIDER_MODEL").ok()) {
            cfg.local_provider_model = model;
        }

        if let Some(v) = parse_env::<f64>("AI_TEMPERATURE")? {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::Config(format!(
                    "AI_TEMPERATURE must be in [0,1], got {v}"
                )));
            }
            cfg.ai_temperature = v;
        }
        if let Some(v) = parse_env::<u32>("AI_MAX_TOKENS")? {
            if v < 256 {
                return Err(Error::Config(format!(
                    "AI_MAX_TOKENS must be >= 256, got {v}"
                )));
            }
            cfg.ai_max_tokens = v;
        }
        if let Some(v) = parse_env::<u64>("AI_TIMEOUT_MS")? {
            if v < 1000 {
                return Err(Error::Config(format!(
                    "AI_TIMEOUT_MS must be >= 1000, got {v}"
                )));
            }
            cfg.ai_timeout_ms = v;
        }
        if let Some(v) = parse_env::<u32>("AI_RETRIES")? {
            cfg.ai_retries = v;
        }
        if let Some(v) = parse_env::<usize>("MAX_PAGE_WORKERS")? {
            if v == 0 {
                return Err(Error::Config("MAX_PAGE_WORKERS must be > 0".into()));
            }
            cfg.max_page_workers = v;
        }
        if let Some(v) = parse_env::<usize>("LARGE_DOC_PAGE_THRESHOLD")? {
            cfg.large_doc_page_threshold = v;
        }
        if let Some(v) = parse_env::<u64>("UPLOAD_MAX_BYTES")? {
            cfg.upload_max_bytes = v;
        }
        if let Some(v) = parse_env::<u64>("SESSION_TTL_SECONDS")? {
            cfg.session_ttl_seconds = v;
        }
        if let Some(v) = parse_env::<u16>("RPGER_PORT")? {
            cfg.port = v;
        }

        Ok(cfg)
    }

    /// Effective worker count for a document of `pages` pages
    pub fn page_workers_for(&self, pages: usize) -> usize {
        let base = self.max_page_workers.min(8).min(pages.max(1));
        if pages > self.large_doc_page_threshold {
            base.min(4)
        } else {
            base
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} has invalid value {raw:?}"))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let cfg = Config::default();
        assert_eq!(cfg.ai_timeout_ms, 30_000);
        assert_eq!(cfg.ai_retries, 3);
        assert_eq!(cfg.upload_max_bytes, 200 * 1024 * 1024);
        assert_eq!(cfg.session_ttl_seconds, 3600);
    }

    #[test]
    fn worker_count_clamps() {
        let cfg = Config::default();
        assert_eq!(cfg.page_workers_for(3), 3);
        assert_eq!(cfg.page_workers_for(124), 8);
        // Large documents bound memory by dropping to at most 4 workers
        assert_eq!(cfg.page_workers_for(500), 4);
    }
}
