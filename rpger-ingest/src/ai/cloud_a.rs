//! Cloud-A provider: Anthropic-style messages endpoint
//!
//! Authenticates with an `x-api-key` header; the reply's text content
//! block carries the JSON payload the prompts demand.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{
    parse_json_array_reply, parse_json_reply, prompts, AiProvider, CallOptions, Categorization,
    CharacterPassKind, CharacterSketch, ProviderError, ProviderKind, ProviderResult, VerdictDraft,
};
use crate::models::ContentKind;

const BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MODEL: &str = "claude-sonnet-4-5";
const USER_AGENT: &str = concat!("rpger/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

pub struct CloudAProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl CloudAProvider {
    pub fn new(api_key: String) -> rpger_common::Result<Self> {
        Self::with_base_url(api_key, BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> rpger_common::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| rpger_common::Error::Internal(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            base_url,
        })
    }

    async fn chat(&self, prompt: String, opts: &CallOptions) -> ProviderResult<String> {
        let body = json!({
            "model": MODEL,
            "max_tokens": opts.max_tokens,
            "temperature": opts.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });

        tracing::debug!(provider = "cloud-a", "Querying messages endpoint");

        let response = self
            .http
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::Unauthorized(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(status.as_u16(), text));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        parsed
            .content
            .into_iter()
            .find(|b| b.block_type == "text")
            .map(|b| b.text)
            .ok_or_else(|| ProviderError::Malformed("reply has no text block".into()))
    }
}

#[async_trait]
impl AiProvider for CloudAProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CloudA
    }

    async fn identify(
        &self,
        text: &str,
        kind_hint: ContentKind,
        opts: &CallOptions,
    ) -> ProviderResult<VerdictDraft> {
        let reply = self.chat(prompts::identify(text, kind_hint), opts).await?;
        parse_json_reply(&reply)
    }

    async fn categorize(
        &self,
        section_text: &str,
        allowed_categories: &[&str],
        opts: &CallOptions,
    ) -> ProviderResult<Categorization> {
        let reply = self
            .chat(prompts::categorize(section_text, allowed_categories), opts)
            .await?;
        parse_json_reply(&reply)
    }

    async fn extract_characters(
        &self,
        novel_text: &str,
        pass: CharacterPassKind,
        prior: Option<&[CharacterSketch]>,
        opts: &CallOptions,
    ) -> ProviderResult<Vec<CharacterSketch>> {
        let reply = self
            .chat(prompts::characters(novel_text, pass, prior), opts)
            .await?;
        parse_json_array_reply(&reply)
    }
}
