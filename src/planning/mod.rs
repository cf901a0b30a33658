//! Lecture-plan generation pipeline
//!
//! A request flows through four stages that share one [`PlanState`]:
//! the [`planner`] asks the model for a coarse outline, the [`allocator`]
//! rescales segment durations to the requested total, the [`detailer`]
//! expands every segment and assembles the full document, and the
//! [`validator`] gate either accepts it or sends the run back to the detailer.
//! [`pipeline`] wires the stages together.

use crate::utils::errors::LecternError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod allocator;
pub mod detailer;
pub mod pipeline;
pub mod planner;
pub mod validator;

pub use pipeline::{LecturePlanPipeline, PipelineConfig, PipelineOutcome};

/// Audience used when the caller does not name one
pub const DEFAULT_AUDIENCE: &str = "Undergraduate";

/// A validated generation request. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    topic: String,
    audience: String,
    duration_hours: u32,
}

impl PlanRequest {
    /// Validate and build a request.
    ///
    /// The topic must be non-empty after trimming and the duration must be a
    /// positive number of hours. A missing or blank audience falls back to
    /// [`DEFAULT_AUDIENCE`].
    pub fn new<T: Into<String>>(
        topic: T,
        audience: Option<String>,
        duration_hours: i64,
    ) -> Result<Self, LecternError> {
        let topic = topic.into().trim().to_string();
        if topic.is_empty() {
            return Err(LecternError::validation("topic", "must not be empty"));
        }

        let duration_hours = u32::try_from(duration_hours)
            .ok()
            .filter(|hours| *hours > 0)
            .ok_or_else(|| {
                LecternError::validation(
                    "duration",
                    format!("must be a positive number of hours, got {}", duration_hours),
                )
            })?;

        let audience = audience
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| DEFAULT_AUDIENCE.to_string());

        Ok(Self {
            topic,
            audience,
            duration_hours,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn duration_hours(&self) -> u32 {
        self.duration_hours
    }
}

/// Stages of a generation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Planning,
    Allocating,
    Detailing,
    Validating,
    Done,
    Failed,
}

impl PipelineStage {
    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Planning and Allocating are one-shot; the only back-edge is
    /// Validating → Detailing. Any non-terminal stage may fail.
    pub fn can_transition_to(self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        match (self, next) {
            (Planning, Allocating)
            | (Allocating, Detailing)
            | (Detailing, Validating)
            | (Validating, Detailing)
            | (Validating, Done) => true,
            (Done | Failed, _) => false,
            (_, Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Planning => "planning",
            PipelineStage::Allocating => "allocating",
            PipelineStage::Detailing => "detailing",
            PipelineStage::Validating => "validating",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A named, time-boxed portion of the agenda as produced by the planner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub topic: String,
    pub duration_mins: i64,
}

impl Segment {
    pub fn new<T: Into<String>>(topic: T, duration_mins: i64) -> Self {
        Self {
            topic: topic.into(),
            duration_mins,
        }
    }
}

/// One enriched agenda entry of the final plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgendaItem {
    pub segment: String,
    pub minutes: i64,
    pub details: Vec<String>,
    #[serde(default)]
    pub key_concepts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityExercise {
    pub name: String,
    pub time_minutes: i64,
    pub steps: Vec<String>,
    pub materials: Vec<String>,
    pub expected_output: String,
}

impl Default for ActivityExercise {
    fn default() -> Self {
        Self {
            name: "Class Activity".to_string(),
            time_minutes: 15,
            steps: Vec::new(),
            materials: Vec::new(),
            expected_output: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeCheck {
    pub question: String,
    pub answer_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeworkAssignment {
    pub tasks: Vec<String>,
    pub submission_format: String,
    pub grading_criteria: Vec<String>,
}

impl Default for HomeworkAssignment {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            submission_format: "PDF".to_string(),
            grading_criteria: Vec::new(),
        }
    }
}

/// The target schema every accepted plan conforms to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LecturePlan {
    pub title: String,
    pub audience_level: String,
    pub duration_minutes: i64,
    pub learning_objectives: Vec<String>,
    pub prerequisites: Vec<String>,
    pub agenda: Vec<AgendaItem>,
    pub key_concepts: Vec<String>,
    pub teaching_notes: Vec<String>,
    pub activity_exercise: ActivityExercise,
    pub discussion_prompts: Vec<String>,
    pub knowledge_check: Vec<KnowledgeCheck>,
    pub homework_assignment: HomeworkAssignment,
    pub resources_optional: Vec<String>,
}

impl LecturePlan {
    /// Sum of agenda minutes
    pub fn agenda_minutes(&self) -> i64 {
        self.agenda.iter().map(|item| item.minutes).sum()
    }
}

/// The plan as it evolves through the stages
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PlanDocument {
    /// Unvalidated mapping, as produced by the model or assembled by the detailer
    Raw(serde_json::Map<String, serde_json::Value>),
    /// Accepted by the validator gate
    Structured(LecturePlan),
}

impl PlanDocument {
    pub fn as_raw(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match self {
            PlanDocument::Raw(map) => Some(map),
            PlanDocument::Structured(_) => None,
        }
    }
}

/// Record threaded through every stage of one run
#[derive(Debug, Clone)]
pub struct PlanState {
    pub run_id: Uuid,
    pub module_title: String,
    pub audience: String,
    pub duration_hours: u32,
    pub lecture_plan: Option<PlanDocument>,
    /// Balanced segments; the detailer re-reads these on every pass
    pub segments: Vec<Segment>,
    pub error_log: Vec<String>,
    pub stage: PipelineStage,
    pub stage_history: Vec<PipelineStage>,
    pub detail_attempts: usize,
}

impl PlanState {
    pub fn new(request: &PlanRequest) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            module_title: request.topic().to_string(),
            audience: request.audience().to_string(),
            duration_hours: request.duration_hours(),
            lecture_plan: None,
            segments: Vec::new(),
            error_log: Vec::new(),
            stage: PipelineStage::Planning,
            stage_history: vec![PipelineStage::Planning],
            detail_attempts: 0,
        }
    }

    /// Requested lecture length in minutes
    pub fn target_minutes(&self) -> i64 {
        i64::from(self.duration_hours) * 60
    }

    pub fn log_error<S: Into<String>>(&mut self, message: S) {
        self.error_log.push(message.into());
    }

    /// Move to `next`, recording it in the stage history
    pub fn enter(&mut self, next: PipelineStage) {
        debug_assert!(
            self.stage.can_transition_to(next),
            "illegal transition {} -> {}",
            self.stage,
            next
        );
        self.stage = next;
        self.stage_history.push(next);
    }

    pub fn raw_plan(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.lecture_plan.as_ref().and_then(PlanDocument::as_raw)
    }

    pub fn raw_plan_mut(&mut self) -> Option<&mut serde_json::Map<String, serde_json::Value>> {
        match self.lecture_plan.as_mut() {
            Some(PlanDocument::Raw(map)) => Some(map),
            _ => None,
        }
    }
}
