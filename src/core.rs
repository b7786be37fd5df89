//! Core querying API: wraps a low-level model client with schema-aware prompting
//! and a schema-checked decode of the reply.
//!
//! Every call is a single attempt. A transport failure surfaces as
//! [`QueryResolverError::Ai`], a reply that does not decode into the requested
//! type surfaces as [`QueryResolverError::Decode`].

use crate::error::{AIError, QueryResolverError};
use crate::interceptors::Interceptor;
use crate::json_utils::{decode_all, decode_reply, ReplyShape};
use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Low-level model client abstraction.
///
/// Implementors provide `ask_raw`, which executes a prompt and returns the raw
/// model text. Parsing is performed by `QueryResolver`.
#[async_trait]
pub trait LowLevelClient: Send + Sync + Debug {
    /// The only method that implementations must provide
    async fn ask_raw(&self, prompt: String) -> Result<String, AIError>;

    /// Clone this client into a boxed trait object
    fn clone_box(&self) -> Box<dyn LowLevelClient>;
}

impl Clone for Box<dyn LowLevelClient> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[async_trait]
impl LowLevelClient for Box<dyn LowLevelClient> {
    async fn ask_raw(&self, prompt: String) -> Result<String, AIError> {
        self.as_ref().ask_raw(prompt).await
    }

    fn clone_box(&self) -> Box<dyn LowLevelClient> {
        self.as_ref().clone_box()
    }
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Append the JSON schema of the expected reply type to every prompt.
    pub schema_guidance: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { schema_guidance: true }
    }
}

/// Query resolver that wraps a LowLevelClient and decodes typed replies.
#[derive(Clone)]
pub struct QueryResolver<C: LowLevelClient> {
    client: C,
    config: ResolverConfig,
    interceptor: Option<Arc<dyn Interceptor>>,
}

impl<C: LowLevelClient> QueryResolver<C> {
    pub fn new(client: C, config: ResolverConfig) -> Self {
        info!(schema_guidance = config.schema_guidance, "Creating new QueryResolver");
        Self { client, config, interceptor: None }
    }

    /// Record every prompt and raw reply through the given interceptor.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Ask once and decode the first JSON structure in the reply that matches `T`
    /// and passes its shape checks.
    #[instrument(target = "book_quiz::resolver", skip(self, prompt), fields(prompt_len = prompt.len()))]
    pub async fn query<T>(&self, prompt: String) -> Result<T, QueryResolverError>
    where
        T: DeserializeOwned + JsonSchema + ReplyShape,
    {
        let raw = self.ask(self.add_schema_guidance::<T>(prompt)).await?;
        let value = decode_reply::<T>(&raw)?;
        debug!("Reply decoded");
        Ok(value)
    }

    /// Ask once and decode every `T` found in the reply, top-level arrays included.
    #[instrument(target = "book_quiz::resolver", skip(self, prompt), fields(prompt_len = prompt.len()))]
    pub async fn query_all<T>(&self, prompt: String) -> Result<Vec<T>, QueryResolverError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let raw = self.ask(self.add_schema_guidance::<Vec<T>>(prompt)).await?;
        let items = decode_all::<T>(&raw)?;
        debug!(items = items.len(), "Reply decoded");
        Ok(items)
    }

    async fn ask(&self, prompt: String) -> Result<String, QueryResolverError> {
        info!(prompt_len = prompt.len(), "Sending prompt");
        let recorded = self.interceptor.as_ref().map(|_| prompt.clone());
        let raw = self.client.ask_raw(prompt).await?;
        info!(response_len = raw.len(), "Received reply");

        if let (Some(interceptor), Some(prompt)) = (&self.interceptor, recorded) {
            if let Err(e) = interceptor.save(&prompt, &raw).await {
                warn!(error = %e, "Interceptor failed to record exchange");
            }
        }
        Ok(raw)
    }

    /// Add JSON schema guidance to a prompt
    fn add_schema_guidance<T>(&self, prompt: String) -> String
    where
        T: JsonSchema,
    {
        if !self.config.schema_guidance {
            return prompt;
        }
        let schema = schema_for!(T);
        let schema_json = serde_json::to_string_pretty(&schema)
            .unwrap_or_else(|_| "Schema serialization failed".to_string());

        format!(
            "{}\n\n## Response Format\nRespond with valid JSON matching this schema:\n```json\n{}\n```",
            prompt, schema_json
        )
    }
}
