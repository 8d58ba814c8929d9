//! Local provider: Ollama-style HTTP endpoint
//!
//! Talks to `{base_url}/api/chat` with non-streaming requests. Useful
//! when no cloud key is configured but a local model server is running.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{
    parse_json_array_reply, parse_json_reply, prompts, AiProvider, CallOptions, Categorization,
    CharacterPassKind, CharacterSketch, ProviderError, ProviderKind, ProviderResult, VerdictDraft,
};
use crate::models::ContentKind;

const USER_AGENT: &str = concat!("rpger/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

pub struct LocalHttpProvider {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl LocalHttpProvider {
    pub fn new(base_url: String, model: String) -> rpger_common::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| rpger_common::Error::Internal(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    async fn chat(&self, prompt: String, opts: &CallOptions) -> ProviderResult<String> {
        let url = format!("{}/api/chat", self.base_url);
        let body = json!({
            "model": self.model,
            "stream": false,
            "options": {"temperature": opts.temperature, "num_predict": opts.max_tokens},
            "messages": [{"role": "user", "content": prompt}],
        });

        tracing::debug!(provider = "local", url = %url, model = %self.model, "Querying local model");

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(status.as_u16(), text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        if parsed.message.content.is_empty() {
            return Err(ProviderError::Malformed("empty reply".into()));
        }
        Ok(parsed.message.content)
    }
}

#[async_trait]
impl AiProvider for LocalHttpProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
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
