//! LLM remediation port. Concrete provider adapters
//! (`original_source/llm_providers/{anthropic,gemini,groq,ollama}.py`) are
//! out of scope: the core calls a single `Solve(failureCtx) -> string`
//! port, and this module only defines the port and a stub that reports
//! the collaborator as unavailable.

use async_trait::async_trait;
use kure_core::error::CoreResult;
use kure_core::models::PodFailureResponse;

/// Context handed to the LLM on an explicit retry request. The ingest
/// path never calls this on its own — remediation text is AI-backed
/// only when a caller asks for it.
#[derive(Debug, Clone)]
pub struct FailureContext {
    pub pod_name: String,
    pub namespace: String,
    pub failure_reason: String,
    pub failure_message: Option<String>,
    pub logs: String,
}

impl FailureContext {
    pub fn from_pod_failure(row: &PodFailureResponse) -> Self {
        FailureContext {
            pod_name: row.pod_name.clone(),
            namespace: row.namespace.clone(),
            failure_reason: row.failure_reason.clone(),
            failure_message: row.failure_message.clone(),
            logs: row.logs.clone(),
        }
    }
}

#[async_trait]
pub trait LlmPort: Send + Sync {
    async fn solve(&self, ctx: FailureContext) -> CoreResult<String>;
}

/// No LLM provider is wired into this repository; configuring one is the
/// deployer's responsibility via a provider adapter implementing
/// [`LlmPort`]. Always reports [`kure_core::error::CoreError::Upstream`],
/// which only the explicit retry route surfaces.
pub struct UnconfiguredLlm;

#[async_trait]
impl LlmPort for UnconfiguredLlm {
    async fn solve(&self, _ctx: FailureContext) -> CoreResult<String> {
        Err(kure_core::error::CoreError::Upstream(
            "no LLM provider configured".into(),
        ))
    }
}
