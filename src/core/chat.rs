//! Chat engine
//!
//! The ChatEngine turns one prompt plus prior history into one assistant
//! reply:
//! 1. Validates the request
//! 2. Resolves the inference client (pinning its region on first use)
//! 3. Appends the prompt to the history and translates it for the model
//! 4. Invokes the model once
//! 5. Appends the reply and returns the extended history

use serde::{Deserialize, Serialize};

use crate::conversation::Conversation;
use crate::error::RelayError;
use crate::providers::{ClientSlot, InferenceRequest};

/// Request accepted by the conversation service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The user's new message
    pub prompt: String,

    /// Caller identifier, used only to pick the inference region
    pub invoked_function_arn: String,

    /// Prior turns, oldest first
    pub conversation_history: Conversation,
}

/// Reply from the conversation service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub generated_text: String,

    /// Incoming history plus the new user and assistant turns
    pub conversation_history: Conversation,
}

pub struct ChatEngine {
    model_id: String,
    clients: ClientSlot,
}

impl ChatEngine {
    pub fn new(model_id: impl Into<String>, clients: ClientSlot) -> Self {
        Self {
            model_id: model_id.into(),
            clients,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Region the inference client is bound to, once one exists
    pub fn region(&self) -> Option<&str> {
        self.clients.region()
    }

    /// Generate one assistant turn for the given request
    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, RelayError> {
        if request.prompt.is_empty() {
            return Err(RelayError::MalformedRequest(
                "prompt must not be empty".to_string(),
            ));
        }

        let backend = self.clients.get(&request.invoked_function_arn).await;

        let mut history = request.conversation_history;
        history.add_user(&request.prompt);

        let payload = InferenceRequest::from_messages(&history.messages);
        tracing::debug!(
            model_id = %self.model_id,
            payload = %serde_json::to_string(&payload).unwrap_or_default(),
            "Calling inference API"
        );

        let response = backend.invoke(&self.model_id, &payload).await?;
        if let Some(usage) = &response.usage {
            tracing::debug!(
                stop_reason = response.stop_reason.as_deref().unwrap_or("unknown"),
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Inference completed"
            );
        }

        let generated_text = response.generated_text()?.to_string();
        history.add_assistant(&generated_text);

        Ok(GenerationResponse {
            generated_text,
            conversation_history: history,
        })
    }
}
