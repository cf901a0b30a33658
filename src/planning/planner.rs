//! Planner stage: ask the model for the lecture's coarse structure

use super::{PlanDocument, PlanState};
use crate::llm::{LlmError, PromptContext, PromptTemplates, SharedProvider};
use crate::utils::http::{execute_with_retry, RetryConfig};
use crate::utils::text::parse_json_object;
use tracing::{info, warn};

/// Requests `{title, total_minutes, segments}` from the model
pub struct Planner {
    provider: SharedProvider,
    retry: RetryConfig,
}

impl Planner {
    pub fn new(provider: SharedProvider, retry: RetryConfig) -> Self {
        Self { provider, retry }
    }

    /// Run the stage.
    ///
    /// Never fails outright: any problem is appended to the error log as
    /// `Planner failed: <reason>` and the plan is left absent for the
    /// orchestrator to act on.
    pub async fn run(&self, state: &mut PlanState) {
        match self.outline(state).await {
            Ok(plan) => {
                info!(
                    run_id = %state.run_id,
                    keys = plan.len(),
                    "planner produced an outline"
                );
                state.lecture_plan = Some(PlanDocument::Raw(plan));
            }
            Err(reason) => {
                warn!(run_id = %state.run_id, "planner failed: {}", reason);
                state.lecture_plan = None;
                state.log_error(format!("Planner failed: {}", reason));
            }
        }
    }

    async fn outline(
        &self,
        state: &PlanState,
    ) -> Result<serde_json::Map<String, serde_json::Value>, String> {
        let context = PromptContext::new()
            .with_variable("topic", state.module_title.as_str())
            .with_variable("audience", state.audience.as_str())
            .with_variable("duration_hours", state.duration_hours.to_string())
            .with_variable("duration_minutes", state.target_minutes().to_string());
        let prompt = PromptTemplates::lecture_outline().render(&context)?;

        let response = execute_with_retry(|| self.provider.invoke(&prompt), &self.retry)
            .await
            .map_err(|e: LlmError| e.to_string())?;

        parse_json_object(&response)
    }
}
