use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{LanguageModel, Role, Turn};
use crate::config::ModelConfig;
use crate::error::{MeshchatError, Result};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<MessageRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

/// Anthropic Messages API client.
pub struct AnthropicModel {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicModel {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
        })
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| MeshchatError::Translation {
                reason: "no API key configured (set ANTHROPIC_API_KEY or model.api_key)".into(),
            })?;
        Self::new(
            config.api_base_url.clone(),
            api_key,
            config.model.clone(),
            config.max_tokens,
            config.timeout(),
        )
    }
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, turns: &[Turn]) -> Result<String> {
        // The API rejects empty content blocks.
        let messages = turns
            .iter()
            .filter(|t| !t.content.trim().is_empty())
            .map(|t| MessageRequest {
                role: t.role,
                content: &t.content,
            })
            .collect();

        let req = CompletionRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages,
        };

        tracing::debug!(model = %self.model, turns = turns.len(), "requesting completion");
        let res = self
            .client
            .post(format!("{url}/v1/messages", url = self.url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&req)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "completion request failed");
            return Err(MeshchatError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = res.json().await?;
        let text: String = completion
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn model_for(url: String) -> AnthropicModel {
        AnthropicModel::new(url, "abc", "claude-test", 64, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_complete_concatenates_text_blocks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "abc")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(Matcher::PartialJson(json!({
                "model": "claude-test",
                "max_tokens": 64,
                "system": "be terse",
                "messages": [{"role": "user", "content": "make it red"}],
            })))
            .with_status(200)
            .with_body(
                json!({
                    "content": [
                        {"type": "text", "text": "Sure. "},
                        {"type": "tool_use", "id": "x"},
                        {"type": "text", "text": "{\"command\": \"change_color\"}"}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let model = model_for(server.url());
        let turns = vec![Turn::user("make it red"), Turn::assistant("")];
        let reply = model.complete("be terse", &turns).await.unwrap();

        assert_eq!(reply, "Sure. {\"command\": \"change_color\"}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .with_body("overloaded")
            .create_async()
            .await;

        let model = model_for(server.url());
        let err = model
            .complete("system", &[Turn::user("hi")])
            .await
            .unwrap_err();

        match err {
            MeshchatError::Api { status, body } => {
                assert_eq!(status, 529);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
        mock.assert_async().await;
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = ModelConfig {
            api_key: None,
            ..ModelConfig::default()
        };
        assert!(matches!(
            AnthropicModel::from_config(&config),
            Err(MeshchatError::Translation { .. })
        ));
    }
}
