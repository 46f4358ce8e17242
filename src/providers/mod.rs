//! Inference API integration

pub mod bedrock;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::error::RelayError;

pub use bedrock::{
    BedrockBackend, BedrockConnector, InferenceConfig, InferenceRequest, InferenceResponse,
};

pub const DEFAULT_REGION: &str = "us-east-1";

const LAMBDA_ARN_PREFIX: &str = "arn:aws:lambda:";

/// A connected inference client
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn invoke(
        &self,
        model_id: &str,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, RelayError>;
}

/// Builds an inference client bound to a region
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, region: &str) -> Arc<dyn InferenceBackend>;
}

/// Extract the region segment of a Lambda function ARN.
///
/// `arn:aws:lambda:us-west-2:123456789012:function:f` yields `us-west-2`.
/// The first occurrence with a non-empty, colon-terminated region segment
/// wins; without one the result is [`DEFAULT_REGION`].
pub fn region_from_arn(arn: &str) -> String {
    arn.match_indices(LAMBDA_ARN_PREFIX)
        .filter_map(|(start, _)| arn[start + LAMBDA_ARN_PREFIX.len()..].split_once(':'))
        .map(|(region, _)| region)
        .find(|region| !region.is_empty())
        .unwrap_or(DEFAULT_REGION)
        .to_string()
}

/// Process-wide inference client, created at most once.
///
/// A slot is either pinned to a region at startup or filled on first use
/// from the caller identifier of that request. Either way every later
/// request reuses the same client and region.
pub struct ClientSlot {
    connector: Arc<dyn BackendConnector>,
    cell: OnceCell<(String, Arc<dyn InferenceBackend>)>,
}

impl ClientSlot {
    pub fn lazy(connector: Arc<dyn BackendConnector>) -> Self {
        Self {
            connector,
            cell: OnceCell::new(),
        }
    }

    pub async fn pinned(connector: Arc<dyn BackendConnector>, region: &str) -> Self {
        let backend = connector.connect(region).await;
        tracing::info!(%region, "Initialized inference client");
        Self {
            connector,
            cell: OnceCell::new_with(Some((region.to_string(), backend))),
        }
    }

    /// Client for this request, initializing from `caller_identifier` if empty
    pub async fn get(&self, caller_identifier: &str) -> Arc<dyn InferenceBackend> {
        let (_, backend) = self
            .cell
            .get_or_init(|| async {
                let region = region_from_arn(caller_identifier);
                let backend = self.connector.connect(&region).await;
                tracing::info!(%region, "Initialized inference client");
                (region, backend)
            })
            .await;
        Arc::clone(backend)
    }

    pub fn region(&self) -> Option<&str> {
        self.cell.get().map(|(region, _)| region.as_str())
    }
}
