//! AI provider abstraction
//!
//! One capability interface with four variants: mock, cloud-A, cloud-B,
//! and local-http. All variants produce structurally identical outputs;
//! a real provider that returns anything else fails with `ai_malformed`
//! and the orchestrator's degradation policy takes over.

mod cloud_a;
mod cloud_b;
mod local;
mod mock;
mod prompts;

pub use cloud_a::CloudAProvider;
pub use cloud_b::CloudBProvider;
pub use local::LocalHttpProvider;
pub use mock::MockProvider;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rpger_common::config::Config;
use rpger_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error as ThisError;
use tokio::sync::{Mutex, Semaphore};

use crate::models::ContentKind;

/// Outbound concurrency per provider
const PROVIDER_CONCURRENCY: usize = 4;
/// Exponential backoff base
const BACKOFF_BASE_MS: u64 = 500;

/// Provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Mock,
    CloudA,
    CloudB,
    Local,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "mock" => Ok(ProviderKind::Mock),
            "cloud-a" => Ok(ProviderKind::CloudA),
            "cloud-b" => Ok(ProviderKind::CloudB),
            "local" => Ok(ProviderKind::Local),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderKind::Mock => "mock",
            ProviderKind::CloudA => "cloud-a",
            ProviderKind::CloudB => "cloud-b",
            ProviderKind::Local => "local",
        };
        write!(f, "{s}")
    }
}

/// Per-call options
#[derive(Debug, Clone, PartialEq)]
pub struct CallOptions {
    /// Sampling temperature in [0,1]
    pub temperature: f64,
    /// Token ceiling, >= 256
    pub max_tokens: u32,
    pub timeout_ms: u64,
    /// Retries after the first attempt
    pub retries: u32,
    /// Identical (operation, content-hash, options) returns the prior verdict
    pub cache: bool,
}

impl CallOptions {
    /// Defaults for identification calls
    pub fn identify_defaults(cfg: &Config) -> Self {
        Self {
            temperature: cfg.ai_temperature,
            max_tokens: cfg.ai_max_tokens,
            timeout_ms: cfg.ai_timeout_ms,
            retries: cfg.ai_retries,
            cache: true,
        }
    }

    /// Defaults for categorization calls (temperature pinned to 0)
    pub fn categorize_defaults(cfg: &Config) -> Self {
        Self {
            temperature: 0.0,
            ..Self::identify_defaults(cfg)
        }
    }

    fn cache_fragment(&self) -> String {
        format!(
            "{:.3}:{}:{}",
            self.temperature, self.max_tokens, self.retries
        )
    }
}

/// Provider-level errors; the wrapper maps these onto the common taxonomy
#[derive(Debug, ThisError)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Unreachable(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("malformed output: {0}")]
    Malformed(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),
}

impl ProviderError {
    fn retryable(&self) -> bool {
        match self {
            ProviderError::Unreachable(_) | ProviderError::Timeout(_) => true,
            ProviderError::Api(status, _) => *status == 429 || *status >= 500,
            ProviderError::Unauthorized(_) | ProviderError::Malformed(_) => false,
        }
    }

    fn into_common(self) -> Error {
        match self {
            ProviderError::Unreachable(m) => Error::AiUnreachable(m),
            ProviderError::Timeout(ms) => Error::AiTimeout(ms),
            ProviderError::Unauthorized(m) => Error::ProviderUnauthorized(m),
            ProviderError::Malformed(m) => Error::AiMalformed(m),
            ProviderError::Api(status, m) => Error::AiUnreachable(format!("HTTP {status}: {m}")),
        }
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Identification verdict before post-derivation fields are attached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictDraft {
    pub kind: ContentKind,
    pub game: String,
    pub edition: String,
    pub book: String,
    pub book_title: String,
    #[serde(default)]
    pub publisher: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
}

/// Categorization of one section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Categorization {
    pub category: String,
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
}

/// Character pass selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterPassKind {
    Discover,
    Enhance,
}

/// A character sketch returned by a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterSketch {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub pages: Vec<u32>,
    #[serde(default)]
    pub personality: Vec<String>,
    #[serde(default)]
    pub behaviors: Vec<String>,
    #[serde(default)]
    pub quotes: Vec<crate::models::CharacterQuote>,
    /// Names of related characters; stored as an adjacency map downstream
    #[serde(default)]
    pub relationships: Vec<String>,
}

/// The single provider capability
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn identify(
        &self,
        text: &str,
        kind_hint: ContentKind,
        opts: &CallOptions,
    ) -> ProviderResult<VerdictDraft>;

    async fn categorize(
        &self,
        section_text: &str,
        allowed_categories: &[&str],
        opts: &CallOptions,
    ) -> ProviderResult<Categorization>;

    async fn extract_characters(
        &self,
        novel_text: &str,
        pass: CharacterPassKind,
        prior: Option<&[CharacterSketch]>,
        opts: &CallOptions,
    ) -> ProviderResult<Vec<CharacterSketch>>;
}

/// Construct a provider by kind
///
/// The mock needs no configuration; the cloud variants refuse to build
/// without their keys so a missing key surfaces at selection time, not
/// mid-pipeline.
pub fn build_provider(kind: ProviderKind, cfg: &Config) -> Result<Arc<dyn AiProvider>> {
    match kind {
        ProviderKind::Mock => Ok(Arc::new(MockProvider::new())),
        ProviderKind::CloudA => {
            let key = cfg.provider_a_key.clone().ok_or_else(|| {
                Error::ProviderUnauthorized("PROVIDER_A_KEY is not set".to_string())
            })?;
            Ok(Arc::new(CloudAProvider::new(key)?))
        }
        ProviderKind::CloudB => {
            let key = cfg.provider_b_key.clone().ok_or_else(|| {
                Error::ProviderUnauthorized("PROVIDER_B_KEY is not set".to_string())
            })?;
            Ok(Arc::new(CloudBProvider::new(key)?))
        }
        ProviderKind::Local => Ok(Arc::new(LocalHttpProvider::new(
            cfg.local_provider_url.clone(),
            cfg.local_provider_model.clone(),
        )?)),
    }
}

/// Retry/cache/concurrency wrapper around a provider
///
/// Holds the bounded outbound semaphore, the exponential-backoff retry
/// loop (base 500 ms, jitter plus/minus 20 percent), and the response
/// cache keyed by (operation, content-hash, options).
pub struct ProviderClient {
    provider: Arc<dyn AiProvider>,
    semaphore: Arc<Semaphore>,
    cache: Mutex<HashMap<String, serde_json::Value>>,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn AiProvider>) -> Self {
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(PROVIDER_CONCURRENCY)),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub async fn identify(
        &self,
        text: &str,
        kind_hint: ContentKind,
        opts: &CallOptions,
    ) -> Result<VerdictDraft> {
        let key = cache_key("identify", text, opts);
        self.cached(opts, &key, || async {
            self.retry(opts, || self.provider.identify(text, kind_hint, opts))
                .await
        })
        .await
    }

    pub async fn categorize(
        &self,
        section_text: &str,
        allowed: &[&str],
        opts: &CallOptions,
    ) -> Result<Categorization> {
        let key = cache_key("categorize", section_text, opts);
        self.cached(opts, &key, || async {
            self.retry(opts, || {
                self.provider.categorize(section_text, allowed, opts)
            })
            .await
        })
        .await
    }

    pub async fn extract_characters(
        &self,
        text: &str,
        pass: CharacterPassKind,
        prior: Option<&[CharacterSketch]>,
        opts: &CallOptions,
    ) -> Result<Vec<CharacterSketch>> {
        // Character passes feed overlapping windows; caching them would
        // only ever hit on identical chunks, so skip the cache entirely.
        self.retry(opts, || {
            self.provider.extract_characters(text, pass, prior, opts)
        })
        .await
        .map_err(ProviderError::into_common)
    }

    async fn cached<T, F, Fut>(&self, opts: &CallOptions, key: &str, op: F) -> Result<T>
    where
        T: Serialize + serde::de::DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ProviderResult<T>>,
    {
        if opts.cache {
            if let Some(hit) = self.cache.lock().await.get(key) {
                if let Ok(value) = serde_json::from_value(hit.clone()) {
                    return Ok(value);
                }
            }
        }
        let value = op().await.map_err(ProviderError::into_common)?;
        if opts.cache {
            if let Ok(json) = serde_json::to_value(&value) {
                self.cache.lock().await.insert(key.to_string(), json);
            }
        }
        Ok(value)
    }

    async fn retry<T, F, Fut>(&self, opts: &CallOptions, mut op: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ProviderResult<T>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ProviderError::Unreachable("client shut down".into()))?;

        let mut attempt = 0u32;
        loop {
            let outcome = tokio::time::timeout(Duration::from_millis(opts.timeout_ms), op()).await;
            let err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(opts.timeout_ms),
            };

            if attempt >= opts.retries || !err.retryable() {
                return Err(err);
            }
            attempt += 1;
            let backoff = backoff_with_jitter(attempt);
            tracing::debug!(
                provider = %self.provider.kind(),
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Retrying provider call"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_MS.saturating_mul(1u64 << (attempt - 1).min(6));
    let jitter = rand::thread_rng().gen_range(0.8..=1.2);
    Duration::from_millis((base as f64 * jitter) as u64)
}

fn cache_key(operation: &str, content: &str, opts: &CallOptions) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{operation}:{:x}:{}", digest, opts.cache_fragment())
}

/// Extract the first JSON object from a model's text reply
///
/// Providers are prompted for a single JSON object, but chat models pad
/// replies with prose; anything without a parseable object is malformed.
pub(crate) fn parse_json_reply<T: serde::de::DeserializeOwned>(reply: &str) -> ProviderResult<T> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(ProviderError::Malformed(format!(
            "no JSON object in reply: {}",
            truncate(reply, 120)
        )));
    };
    if end < start {
        return Err(ProviderError::Malformed("unbalanced JSON braces".into()));
    }
    serde_json::from_str(&reply[start..=end])
        .map_err(|e| ProviderError::Malformed(format!("{e}: {}", truncate(reply, 120))))
}

/// Same for a JSON array reply
pub(crate) fn parse_json_array_reply<T: serde::de::DeserializeOwned>(
    reply: &str,
) -> ProviderResult<Vec<T>> {
    let start = reply.find('[');
    let end = reply.rfind(']');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(ProviderError::Malformed(format!(
            "no JSON array in reply: {}",
            truncate(reply, 120)
        )));
    };
    if end < start {
        return Err(ProviderError::Malformed("unbalanced JSON brackets".into()));
    }
    serde_json::from_str(&reply[start..=end])
        .map_err(|e| ProviderError::Malformed(format!("{e}: {}", truncate(reply, 120))))
}

fn truncate(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyProvider {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl AiProvider for FlakyProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Mock
        }

        async fn identify(
            &self,
            _text: &str,
            kind_hint: ContentKind,
            _opts: &CallOptions,
        ) -> ProviderResult<VerdictDraft> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(ProviderError::Unreachable("flaky".into()));
            }
            Ok(VerdictDraft {
                kind: kind_hint,
                game: "dnd".into(),
                edition: "1st".into(),
                book: "phb".into(),
                book_title: "Player's Handbook".into(),
                publisher: None,
                confidence: 0.8,
                rationale: "test".into(),
            })
        }

        async fn categorize(
            &self,
            _text: &str,
            _allowed: &[&str],
            _opts: &CallOptions,
        ) -> ProviderResult<Categorization> {
            Err(ProviderError::Unauthorized("nope".into()))
        }

        async fn extract_characters(
            &self,
            _text: &str,
            _pass: CharacterPassKind,
            _prior: Option<&[CharacterSketch]>,
            _opts: &CallOptions,
        ) -> ProviderResult<Vec<CharacterSketch>> {
            Ok(Vec::new())
        }
    }

    fn fast_opts() -> CallOptions {
        CallOptions {
            temperature: 0.1,
            max_tokens: 256,
            timeout_ms: 1000,
            retries: 3,
            cache: true,
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let client = ProviderClient::new(Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            fail_first: 2,
        }));
        let draft = client
            .identify("text", ContentKind::SourceMaterial, &fast_opts())
            .await
            .unwrap();
        assert_eq!(draft.game, "dnd");
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let client = ProviderClient::new(provider);
        let err = client
            .categorize("text", &["Combat"], &fast_opts())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "provider_unauthorized");
    }

    #[tokio::test]
    async fn identical_requests_hit_the_cache() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let client = ProviderClient::new(provider.clone());
        let opts = fast_opts();
        client
            .identify("same text", ContentKind::Novel, &opts)
            .await
            .unwrap();
        client
            .identify("same text", ContentKind::Novel, &opts)
            .await
            .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn json_reply_parsing_tolerates_prose() {
        #[derive(Deserialize)]
        struct Out {
            category: String,
        }
        let reply = "Sure, here is the result:\n{\"category\": \"Combat\"}\nHope that helps!";
        let out: Out = parse_json_reply(reply).unwrap();
        assert_eq!(out.category, "Combat");

        let err = parse_json_reply::<Out>("no json here").unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }
}
