use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::OpenAiCompatibleLlmConfig;
use crate::error::ProviderError;
use crate::traits::LlmProvider;
use crate::types::{CompletionRequest, CompletionResponse};

#[derive(Clone)]
pub struct OpenAiCompatibleLlmProvider {
    config: OpenAiCompatibleLlmConfig,
    client: Client,
}

impl OpenAiCompatibleLlmProvider {
    pub fn new(config: OpenAiCompatibleLlmConfig) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatibleLlmProvider {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        if request.messages.is_empty() {
            return Err(ProviderError::Config("no messages to complete".to_string()));
        }

        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        let mut payload = Map::new();
        payload.insert("model".to_string(), Value::String(self.config.model.clone()));
        payload.insert("messages".to_string(), Value::Array(messages));
        payload.insert(
            "max_tokens".to_string(),
            Value::Number(request.max_tokens.unwrap_or(self.config.max_tokens).into()),
        );
        let temperature = request.temperature.unwrap_or(self.config.temperature);
        payload.insert(
            "temperature".to_string(),
            serde_json::Number::from_f64(f64::from(temperature))
                .map(Value::Number)
                .unwrap_or(Value::Null),
        );
        if request.json_mode {
            payload.insert(
                "response_format".to_string(),
                serde_json::json!({"type": "json_object"}),
            );
        }

        let res = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        let parsed: OpenAiChatResponse = res.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("no completion choices".to_string()))?;

        Ok(CompletionResponse {
            provider: self.name().to_string(),
            model: parsed.model,
            content: choice.message.content,
            usage_tokens: parsed.usage.and_then(|u| u.total_tokens),
        })
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}
