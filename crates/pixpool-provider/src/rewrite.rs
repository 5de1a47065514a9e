//! Prompt localization through an OpenAI-compatible chat API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::RewriteConfig;
use crate::error::{ProviderError, ProviderResult};

/// Instruction sent with every rewrite. `{prompt}` is replaced by the text.
pub const REWRITE_PROMPT_TEMPLATE: &str = "Rewrite the following text as an English prompt for an \
AI image generator. Keep every subject and detail, and keep any `--` parameters unchanged. \
Output only the prompt, without explanation.\n\nText: {prompt}";

/// Rewrites text into a prompt the generation channels accept.
#[async_trait]
pub trait PromptRewriter: Send + Sync {
    async fn rewrite(&self, text: &str, model: &str) -> ProviderResult<String>;
}

/// Whether `text` contains letters outside the Latin script.
pub fn needs_rewrite(text: &str) -> bool {
    text.chars().any(|c| c.is_alphabetic() && !is_latin(c))
}

fn is_latin(c: char) -> bool {
    c.is_ascii()
        || ('\u{00A0}'..='\u{024F}').contains(&c)
        || ('\u{1E00}'..='\u{1EFF}').contains(&c)
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Rewriter backed by a chat-completions endpoint.
pub struct OpenAiRewriter {
    api_url: String,
    api_key: String,
    client: Client,
}

impl OpenAiRewriter {
    pub fn new(config: &RewriteConfig, timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }
}

#[async_trait]
impl PromptRewriter for OpenAiRewriter {
    async fn rewrite(&self, text: &str, model: &str) -> ProviderResult<String> {
        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: REWRITE_PROMPT_TEMPLATE.replace("{prompt}", text),
            }],
            temperature: 0.7,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http { status, body });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::invalid_response("empty rewrite response"))?;

        debug!(model, "Rewrote prompt");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_needs_rewrite() {
        assert!(needs_rewrite("测试"));
        assert!(needs_rewrite("a cat 在 the park"));
        assert!(needs_rewrite("кошка"));
        assert!(!needs_rewrite("a cat --ar 16:9"));
        assert!(!needs_rewrite("café crème, Łódź, Nguyễn"));
        assert!(!needs_rewrite("12345 !?"));
        assert!(!needs_rewrite(""));
    }

    fn rewriter(server: &MockServer) -> OpenAiRewriter {
        OpenAiRewriter::new(
            &RewriteConfig {
                api_url: server.uri(),
                api_key: "sk-test".into(),
                model: "gpt-4o-mini".into(),
            },
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_rewrite_returns_trimmed_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "  a test  \n"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let out = rewriter(&server).rewrite("测试", "gpt-4o-mini").await.unwrap();
        assert_eq!(out, "a test");
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&server)
            .await;

        let err = rewriter(&server).rewrite("测试", "m").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = rewriter(&server).rewrite("测试", "m").await.unwrap_err();
        assert!(matches!(err, ProviderError::Http { status: 401, .. }));
    }
}
