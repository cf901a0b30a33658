//! Orchestration of the planning stages

use super::allocator::{self, AllocationError};
use super::detailer::Detailer;
use super::planner::Planner;
use super::validator::{self, GateDecision};
use super::{LecturePlan, PipelineStage, PlanDocument, PlanRequest, PlanState};
use crate::llm::{LlmError, SharedProvider};
use crate::utils::errors::{GenerationError, LecternError};
use crate::utils::http::RetryConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Tunables for one pipeline instance
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Detailer passes allowed after the first one fails validation
    pub max_validation_retries: usize,
    pub max_concurrent_segments: usize,
    /// Overall bound on one request; `None` waits indefinitely
    pub request_timeout: Option<Duration>,
    /// Backoff around every individual model call
    pub retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_validation_retries: 3,
            max_concurrent_segments: 4,
            request_timeout: Some(Duration::from_secs(300)),
            retry: RetryConfig::default(),
        }
    }
}

/// A finished run together with its diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    pub plan: LecturePlan,
    pub error_log: Vec<String>,
    pub stage_history: Vec<PipelineStage>,
    pub detail_attempts: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug)]
enum StageFailure {
    Planning(String),
    Allocation(AllocationError),
    Model(LlmError),
    RetriesExhausted { attempts: usize, last_error: String },
}

#[derive(Debug)]
enum Halt {
    Stage(StageFailure),
    Cancelled,
    Timeout(Duration),
}

impl Halt {
    fn into_error(self, error_log: Vec<String>) -> GenerationError {
        match self {
            Halt::Stage(StageFailure::Planning(message)) => GenerationError::Planning { message, error_log },
            Halt::Stage(StageFailure::Allocation(source)) => GenerationError::Allocation { source, error_log },
            Halt::Stage(StageFailure::Model(source)) => GenerationError::Model { source, error_log },
            Halt::Stage(StageFailure::RetriesExhausted { attempts, last_error }) => {
                GenerationError::RetriesExhausted {
                    attempts,
                    last_error,
                    error_log,
                }
            }
            Halt::Cancelled => GenerationError::Cancelled { error_log },
            Halt::Timeout(limit) => GenerationError::Timeout {
                timeout_ms: limit.as_millis() as u64,
                error_log,
            },
        }
    }
}

/// Planner → Allocator → Detailer → Validator, with the validator able to
/// send the run back to the detailer a bounded number of times.
pub struct LecturePlanPipeline {
    provider: SharedProvider,
    planner: Planner,
    detailer: Detailer,
    config: PipelineConfig,
}

impl LecturePlanPipeline {
    pub fn new(provider: SharedProvider, config: PipelineConfig) -> Self {
        Self {
            planner: Planner::new(provider.clone(), config.retry.clone()),
            detailer: Detailer::new(
                provider.clone(),
                config.retry.clone(),
                config.max_concurrent_segments,
            ),
            provider,
            config,
        }
    }

    pub fn provider(&self) -> &SharedProvider {
        &self.provider
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate the inputs and produce a plan, or fail with the reason
    pub async fn generate(
        &self,
        topic: &str,
        audience: Option<&str>,
        duration_hours: i64,
    ) -> Result<LecturePlan, LecternError> {
        let request = PlanRequest::new(topic, audience.map(str::to_string), duration_hours)?;
        let outcome = self.run(request, CancellationToken::new()).await?;
        Ok(outcome.plan)
    }

    /// Drive one request to completion, cancellation or timeout.
    ///
    /// The partially built state is dropped on every failure path; only its
    /// error log survives, inside the returned error.
    pub async fn run(
        &self,
        request: PlanRequest,
        cancel: CancellationToken,
    ) -> Result<PipelineOutcome, GenerationError> {
        let started_at = Utc::now();
        let mut state = PlanState::new(&request);

        info!(
            run_id = %state.run_id,
            topic = %state.module_title,
            audience = %state.audience,
            duration_hours = state.duration_hours,
            provider = self.provider.provider_name(),
            model = self.provider.model(),
            "starting lecture plan generation"
        );

        let timeout = self.config.request_timeout;
        let deadline = async move {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let result = tokio::select! {
            result = self.drive(&mut state) => result.map_err(Halt::Stage),
            _ = cancel.cancelled() => Err(Halt::Cancelled),
            _ = deadline => Err(Halt::Timeout(timeout.unwrap_or_default())),
        };

        match result {
            Ok(plan) => {
                let completed_at = Utc::now();
                info!(
                    run_id = %state.run_id,
                    attempts = state.detail_attempts,
                    agenda_items = plan.agenda.len(),
                    elapsed_ms = (completed_at - started_at).num_milliseconds(),
                    "lecture plan generated"
                );
                Ok(PipelineOutcome {
                    run_id: state.run_id,
                    plan,
                    error_log: state.error_log,
                    stage_history: state.stage_history,
                    detail_attempts: state.detail_attempts,
                    started_at,
                    completed_at,
                })
            }
            Err(halt) => {
                if !state.stage.is_terminal() {
                    state.enter(PipelineStage::Failed);
                }
                let failure = halt.into_error(std::mem::take(&mut state.error_log));
                error!(
                    run_id = %state.run_id,
                    category = failure.category(),
                    "lecture plan generation failed: {}",
                    failure
                );
                Err(failure)
            }
        }
    }

    async fn drive(&self, state: &mut PlanState) -> Result<LecturePlan, StageFailure> {
        self.planner.run(state).await;
        if state.lecture_plan.is_none() {
            let reason = state
                .error_log
                .last()
                .cloned()
                .unwrap_or_else(|| "planner produced no plan".to_string());
            return Err(StageFailure::Planning(reason));
        }

        self.transition(state, PipelineStage::Allocating);
        allocator::run(state).map_err(StageFailure::Allocation)?;

        loop {
            self.transition(state, PipelineStage::Detailing);
            self.detailer.run(state).await.map_err(StageFailure::Model)?;

            self.transition(state, PipelineStage::Validating);
            let document = match &state.lecture_plan {
                Some(PlanDocument::Raw(map)) => serde_json::Value::Object(map.clone()),
                _ => serde_json::Value::Null,
            };

            match validator::gate(&document, state.target_minutes()) {
                GateDecision::Accept(plan) => {
                    state.lecture_plan = Some(PlanDocument::Structured(plan.clone()));
                    self.transition(state, PipelineStage::Done);
                    return Ok(plan);
                }
                GateDecision::Retry { reason } => {
                    state.log_error(format!("Schema Validation Failed: {}", reason));
                    if state.detail_attempts > self.config.max_validation_retries {
                        return Err(StageFailure::RetriesExhausted {
                            attempts: state.detail_attempts,
                            last_error: reason,
                        });
                    }
                    warn!(
                        run_id = %state.run_id,
                        attempt = state.detail_attempts,
                        max_retries = self.config.max_validation_retries,
                        "plan rejected by validator, detailing again: {}",
                        reason
                    );
                }
            }
        }
    }

    fn transition(&self, state: &mut PlanState, next: PipelineStage) {
        info!(run_id = %state.run_id, from = %state.stage, to = %next, "stage transition");
        state.enter(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{is_outline_prompt, segment_of, ScriptedProvider};
    use serde_json::json;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn outline(segments: &[(&str, i64)]) -> String {
        let segments: Vec<_> = segments
            .iter()
            .map(|(t, m)| json!({ "topic": t, "duration_mins": m }))
            .collect();
        json!({ "title": "Outline", "total_minutes": 0, "segments": segments }).to_string()
    }

    fn good_detail(segment: &str) -> String {
        json!({ "details": [format!("about {}", segment)], "concepts": ["x", "y", "z"] }).to_string()
    }

    fn bad_detail() -> String {
        json!({ "details": { "nested": "object" }, "concepts": [] }).to_string()
    }

    fn config(max_validation_retries: usize) -> PipelineConfig {
        PipelineConfig {
            max_validation_retries,
            max_concurrent_segments: 2,
            request_timeout: Some(Duration::from_secs(10)),
            retry: RetryConfig::none(),
        }
    }

    fn request(hours: i64) -> PlanRequest {
        PlanRequest::new("Concurrency", None, hours).unwrap()
    }

    #[tokio::test]
    async fn test_happy_path_produces_balanced_plan() {
        let provider = Arc::new(ScriptedProvider::new(|prompt, _| {
            if is_outline_prompt(prompt) {
                Ok(outline(&[("Threads", 10), ("Locks", 10), ("Channels", 10)]))
            } else {
                Ok(good_detail(segment_of(prompt).unwrap_or("?")))
            }
        }));
        let pipeline = LecturePlanPipeline::new(provider.clone(), config(3));

        let outcome = assert_ok!(pipeline.run(request(1), CancellationToken::new()).await);

        assert_eq!(outcome.plan.title, "Concurrency");
        assert_eq!(outcome.plan.duration_minutes, 60);
        let minutes: Vec<i64> = outcome.plan.agenda.iter().map(|a| a.minutes).collect();
        assert_eq!(minutes, vec![20, 20, 20]);
        assert_eq!(outcome.plan.agenda[1].details, vec!["about Locks"]);
        assert_eq!(outcome.detail_attempts, 1);
        assert!(outcome.error_log.is_empty());
        assert_eq!(
            outcome.stage_history,
            vec![
                PipelineStage::Planning,
                PipelineStage::Allocating,
                PipelineStage::Detailing,
                PipelineStage::Validating,
                PipelineStage::Done,
            ]
        );
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn test_invalid_first_pass_then_success() {
        // call 0 is the outline, calls 1..=2 are the first detail pass
        let provider = Arc::new(ScriptedProvider::new(|prompt, index| {
            if is_outline_prompt(prompt) {
                Ok(outline(&[("Intro", 30), ("Body", 30)]))
            } else if index <= 2 {
                Ok(bad_detail())
            } else {
                Ok(good_detail(segment_of(prompt).unwrap_or("?")))
            }
        }));
        let pipeline = LecturePlanPipeline::new(provider, config(3));

        let outcome = assert_ok!(pipeline.run(request(1), CancellationToken::new()).await);

        assert_eq!(outcome.detail_attempts, 2);
        assert_eq!(outcome.error_log.len(), 1);
        assert!(outcome.error_log[0].starts_with("Schema Validation Failed"));
        assert_eq!(
            &outcome.stage_history[2..],
            &[
                PipelineStage::Detailing,
                PipelineStage::Validating,
                PipelineStage::Detailing,
                PipelineStage::Validating,
                PipelineStage::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let provider = Arc::new(ScriptedProvider::new(|prompt, _| {
            if is_outline_prompt(prompt) {
                Ok(outline(&[("Intro", 30), ("Body", 30)]))
            } else {
                Ok(bad_detail())
            }
        }));
        let pipeline = LecturePlanPipeline::new(provider.clone(), config(2));

        let err = assert_err!(pipeline.run(request(1), CancellationToken::new()).await);

        match &err {
            GenerationError::RetriesExhausted { attempts, .. } => assert_eq!(*attempts, 3),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.error_log().len(), 3);
        assert_eq!(provider.call_count(), 1 + 3 * 2);
    }

    #[tokio::test]
    async fn test_planner_failure_is_fatal() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| Ok("no json here".to_string())));
        let pipeline = LecturePlanPipeline::new(provider.clone(), config(3));

        let err = assert_err!(pipeline.run(request(1), CancellationToken::new()).await);

        assert!(matches!(err, GenerationError::Planning { .. }));
        assert!(err.error_log()[0].starts_with("Planner failed"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_scenario_d_empty_outline() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| Ok(outline(&[]))));
        let pipeline = LecturePlanPipeline::new(provider, config(3));

        let err = assert_err!(pipeline.run(request(2), CancellationToken::new()).await);

        match err {
            GenerationError::Allocation { source, .. } => assert_eq!(source, AllocationError::NoSegments),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_model_failure_during_detailing_is_fatal() {
        let provider = Arc::new(ScriptedProvider::new(|prompt, _| {
            if is_outline_prompt(prompt) {
                Ok(outline(&[("Intro", 60)]))
            } else {
                Err(LlmError::Authentication {
                    message: "revoked".to_string(),
                })
            }
        }));
        let pipeline = LecturePlanPipeline::new(provider, config(3));

        let err = assert_err!(pipeline.run(request(1), CancellationToken::new()).await);
        assert_eq!(err.category(), "model");
    }

    #[tokio::test]
    async fn test_cancellation_yields_no_plan() {
        let provider = Arc::new(
            ScriptedProvider::new(|_, _| Ok(outline(&[("Intro", 60)])))
                .with_delay(|_| Duration::from_secs(30)),
        );
        let pipeline = LecturePlanPipeline::new(provider, config(3));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = assert_err!(pipeline.run(request(1), cancel).await);
        assert!(matches!(err, GenerationError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let provider = Arc::new(
            ScriptedProvider::new(|_, _| Ok(outline(&[("Intro", 60)])))
                .with_delay(|_| Duration::from_secs(30)),
        );
        let mut config = config(3);
        config.request_timeout = Some(Duration::from_millis(20));
        let pipeline = LecturePlanPipeline::new(provider, config);

        let err = assert_err!(pipeline.run(request(1), CancellationToken::new()).await);
        assert!(matches!(err, GenerationError::Timeout { timeout_ms: 20, .. }));
    }

    #[tokio::test]
    async fn test_generate_validates_request() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| Ok("{}".to_string())));
        let pipeline = LecturePlanPipeline::new(provider.clone(), config(3));

        let err = assert_err!(pipeline.generate("   ", None, 1).await);
        assert!(matches!(err, LecternError::Validation { .. }));
        assert_eq!(provider.call_count(), 0);
    }
}
