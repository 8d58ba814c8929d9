//! Cloud-B provider: OpenAI-style chat completions endpoint
//!
//! Bearer-token auth; the first choice's message content carries the
//! JSON payload.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{
    parse_json_array_reply, parse_json_reply, prompts, AiProvider, CallOptions, Categorization,
    CharacterPassKind, CharacterSketch, ProviderError, ProviderKind, ProviderResult, VerdictDraft,
};
use crate::models::ContentKind;

const BASE_URL: &str = "https://api.openai.com/v1/chat/completions";
const MODEL: &str = "gpt-4o-mini";
const USER_AGENT: &str = concat!("rpger/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

pub struct CloudBProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl CloudBProvider {
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

        tracing::debug!(provider = "cloud-b", "Querying chat completions");

        let response = self
            .http
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
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

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::Malformed("reply has no choices".into()))
    }
}

#[async_trait]
impl AiProvider for CloudBProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CloudB
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
