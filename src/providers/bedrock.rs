//! Amazon Bedrock provider
//!
//! Speaks the Nova message schema over `InvokeModel`:
//!
//! ```json
//! {
//!   "messages": [{ "role": "user", "content": [{ "text": "hello" }] }],
//!   "inferenceConfig": { "maxTokens": 512, "stopSequences": [], "temperature": 0.7, "topP": 0.9 }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_bedrockruntime::error::{DisplayErrorContext, SdkError};
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::Client;
use serde::{Deserialize, Serialize};

use crate::conversation::{Message, Role};
use crate::error::RelayError;

use super::{BackendConnector, InferenceBackend};

/// Request body for `InvokeModel`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceRequest {
    pub messages: Vec<InferenceMessage>,
    pub inference_config: InferenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Fixed generation parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    pub max_tokens: u32,
    pub stop_sequences: Vec<String>,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            stop_sequences: Vec::new(),
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

impl InferenceRequest {
    /// Translate a conversation into the model's schema.
    ///
    /// Only user and assistant turns are sent; any other role is dropped.
    pub fn from_messages(messages: &[Message]) -> Self {
        let messages = messages
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .map(|m| InferenceMessage {
                role: m.role.as_str().to_string(),
                content: vec![ContentBlock {
                    text: Some(m.content.clone()),
                }],
            })
            .collect();

        Self {
            messages,
            inference_config: InferenceConfig::default(),
        }
    }
}

/// Response body from `InvokeModel`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceResponse {
    #[serde(default)]
    pub output: Option<Output>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Output {
    #[serde(default)]
    pub message: Option<InferenceMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl InferenceResponse {
    /// Text of the first content block of the output message
    pub fn generated_text(&self) -> Result<&str, RelayError> {
        let content = self
            .output
            .as_ref()
            .and_then(|o| o.message.as_ref())
            .map(|m| m.content.as_slice())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                RelayError::UpstreamResponse("No response content from the model".to_string())
            })?;

        content[0].text.as_deref().ok_or_else(|| {
            RelayError::UpstreamResponse("First content block carries no text".to_string())
        })
    }
}

/// Bedrock runtime client bound to one region
pub struct BedrockBackend {
    client: Client,
}

impl BedrockBackend {
    pub async fn connect(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self {
            client: Client::new(&config),
        }
    }
}

#[async_trait]
impl InferenceBackend for BedrockBackend {
    async fn invoke(
        &self,
        model_id: &str,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, RelayError> {
        let body = serde_json::to_vec(request).map_err(|e| {
            RelayError::MalformedRequest(format!("Failed to encode payload: {}", e))
        })?;

        let output = self
            .client
            .invoke_model()
            .model_id(model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| {
                let detail = DisplayErrorContext(&e).to_string();
                match e {
                    SdkError::ServiceError(_) => RelayError::UpstreamResponse(detail),
                    _ => RelayError::UpstreamTransport(detail),
                }
            })?;

        serde_json::from_slice(output.body().as_ref()).map_err(|e| {
            RelayError::UpstreamResponse(format!("Failed to parse response: {}", e))
        })
    }
}

/// Connects real Bedrock clients
pub struct BedrockConnector;

#[async_trait]
impl BackendConnector for BedrockConnector {
    async fn connect(&self, region: &str) -> Arc<dyn InferenceBackend> {
        Arc::new(BedrockBackend::connect(region).await)
    }
}
