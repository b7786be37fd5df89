use crate::clients::mock::{MockClient, MockHandle, MockResponse};
use crate::clients::openai::{OpenAIClient, OpenAIConfig};
use crate::config::KeyFromEnv;
use crate::core::LowLevelClient;
use crate::error::AIError;
use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;

/// Which model backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    OpenAI,
    Mock,
}

impl Default for ClientType {
    /// OpenAI when a key is available in the environment or `.env`, otherwise the mock.
    fn default() -> Self {
        if OpenAIClient::find_key().is_some() {
            Self::OpenAI
        } else {
            Self::Mock
        }
    }
}

impl FromStr for ClientType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown client type: '{}'. Supported: openai, mock", s)),
        }
    }
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientType::OpenAI => write!(f, "openai"),
            ClientType::Mock => write!(f, "mock"),
        }
    }
}

/// Flexible client that wraps any LowLevelClient and provides factory functions
#[derive(Debug, Clone)]
pub struct FlexibleClient {
    inner: Arc<dyn LowLevelClient>,
}

impl FlexibleClient {
    pub fn new(client: Box<dyn LowLevelClient>) -> Self {
        Self { inner: Arc::from(client) }
    }

    /// Build the client named by `client_type`; the OpenAI variant uses `config`.
    pub fn from_type(client_type: ClientType, config: OpenAIConfig) -> Self {
        match client_type {
            ClientType::OpenAI => Self::openai(config),
            ClientType::Mock => Self::mock().0,
        }
    }

    pub fn openai(config: OpenAIConfig) -> Self {
        Self::new(Box::new(OpenAIClient::new(config)))
    }

    /// Create a FlexibleClient with a mock and return the handle for configuration
    pub fn mock() -> (Self, Arc<MockHandle>) {
        let (mock_client, handle) = MockClient::new();
        (Self::new(Box::new(mock_client)), handle)
    }

    pub fn mock_with_responses(responses: Vec<MockResponse>) -> (Self, Arc<MockHandle>) {
        let (mock_client, handle) = MockClient::with_responses(responses);
        (Self::new(Box::new(mock_client)), handle)
    }
}

#[async_trait]
impl LowLevelClient for FlexibleClient {
    async fn ask_raw(&self, prompt: String) -> Result<String, AIError> {
        self.inner.ask_raw(prompt).await
    }

    fn clone_box(&self) -> Box<dyn LowLevelClient> {
        Box::new(self.clone())
    }
}
