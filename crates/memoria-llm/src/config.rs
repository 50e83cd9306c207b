use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleLlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl OpenAiCompatibleLlmConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com".to_string(),
            model: model.into(),
            max_tokens: 1024,
            temperature: 0.2,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LlmProviderConfig {
    OpenAiCompatible(OpenAiCompatibleLlmConfig),
}
