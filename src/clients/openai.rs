use crate::config::KeyFromEnv;
use crate::core::LowLevelClient;
use crate::error::{AIError, OpenAIError};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

pub mod models;

pub use models::OpenAIModel;

#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub model: OpenAIModel,
    pub temperature: f32,
    pub base_url: String,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: OpenAIClient::find_key().unwrap_or_default(),
            model: OpenAIModel::default(),
            temperature: 0.7,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct OpenAIClient {
    config: OpenAIConfig,
    http: reqwest::Client,
}

impl KeyFromEnv for OpenAIClient {
    const KEY_NAME: &'static str = "OPENAI_API_KEY";
}

impl OpenAIClient {
    pub fn new(config: OpenAIConfig) -> Self {
        info!(model = %config.model.id(), "Creating new OpenAI client");
        if config.api_key.is_empty() {
            warn!("{} is empty; requests will fail authentication", Self::KEY_NAME);
        }
        Self { config, http: reqwest::Client::new() }
    }

    pub fn model(&self) -> &OpenAIModel {
        &self.config.model
    }

    fn messages_body(&self, prompt: String) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model.id(),
            "messages": [
                {"role": "user", "content": prompt}
            ]
        });
        if self.config.model.accepts_temperature() {
            body["temperature"] = serde_json::json!(self.config.temperature);
        }
        body
    }
}

#[async_trait]
impl LowLevelClient for OpenAIClient {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len(), model = %self.config.model.id()))]
    async fn ask_raw(&self, prompt: String) -> Result<String, AIError> {
        let body = self.messages_body(prompt);
        debug!("Sending request to OpenAI chat completions");
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP request failed");
                AIError::OpenAI(OpenAIError::Http(e.to_string()))
            })?;

        debug!(status = %resp.status(), "Received response from OpenAI");
        if resp.status() == 401 {
            error!("OpenAI authentication failed");
            return Err(AIError::OpenAI(OpenAIError::Authentication));
        }
        if resp.status() == 429 {
            warn!("OpenAI rate limit exceeded");
            return Err(AIError::OpenAI(OpenAIError::RateLimit));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %txt, "OpenAI API error");
            return Err(AIError::OpenAI(OpenAIError::Api(txt)));
        }

        #[derive(Deserialize)]
        struct Choices {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Msg,
        }
        #[derive(Deserialize)]
        struct Msg {
            content: Option<String>,
        }

        let parsed: Choices = resp
            .json()
            .await
            .map_err(|e| AIError::OpenAI(OpenAIError::Http(e.to_string())))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AIError::OpenAI(OpenAIError::Api("No choices".into())))?;
        info!(response_len = content.len(), "Successfully received OpenAI response");
        Ok(content)
    }

    fn clone_box(&self) -> Box<dyn LowLevelClient> {
        Box::new(self.clone())
    }
}
