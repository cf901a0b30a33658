//! Detailer stage: expand every segment and assemble the full plan document

use super::{ActivityExercise, HomeworkAssignment, PlanDocument, PlanState, Segment};
use crate::llm::{LlmError, PromptContext, PromptTemplates, SharedProvider};
use crate::utils::http::{execute_with_retry, RetryConfig};
use crate::utils::text::parse_json_object;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

/// Stands in for the details of a segment whose model output was unusable
pub const DETAIL_PLACEHOLDER: &str = "AI failed to generate details";

/// Model output for one segment.
///
/// Values are kept as raw JSON; the validator gate decides whether they have
/// the right shape.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentDetail {
    pub details: Value,
    pub concepts: Value,
}

impl SegmentDetail {
    pub fn placeholder() -> Self {
        Self {
            details: json!([DETAIL_PLACEHOLDER]),
            concepts: json!([]),
        }
    }
}

/// Parse one segment-detail response.
///
/// Missing keys become empty lists. Text that does not hold a JSON object is
/// an error; callers substitute [`SegmentDetail::placeholder`].
pub fn parse_segment_detail(raw: &str) -> Result<SegmentDetail, String> {
    let mut map = parse_json_object(raw)?;
    Ok(SegmentDetail {
        details: map.remove("details").unwrap_or_else(|| json!([])),
        concepts: map.remove("concepts").unwrap_or_else(|| json!([])),
    })
}

/// Build the full plan document from balanced segments and their details.
///
/// Fields the model is not asked for are filled with fixed defaults.
pub fn assemble_document(
    title: &str,
    audience: &str,
    duration_minutes: i64,
    segments: &[Segment],
    details: Vec<SegmentDetail>,
) -> Map<String, Value> {
    let agenda: Vec<Value> = segments
        .iter()
        .zip(details)
        .map(|(segment, detail)| {
            json!({
                "segment": segment.topic,
                "minutes": segment.duration_mins,
                "details": detail.details,
                "key_concepts": detail.concepts,
            })
        })
        .collect();

    let activity = ActivityExercise::default();
    let homework = HomeworkAssignment::default();

    let document = json!({
        "title": title,
        "audience_level": audience,
        "duration_minutes": duration_minutes,
        "learning_objectives": [format!("Understand {}", title)],
        "prerequisites": [],
        "agenda": agenda,
        "key_concepts": [],
        "teaching_notes": [],
        "activity_exercise": {
            "name": activity.name,
            "time_minutes": activity.time_minutes,
            "steps": activity.steps,
            "materials": activity.materials,
            "expected_output": activity.expected_output,
        },
        "discussion_prompts": [],
        "knowledge_check": [],
        "homework_assignment": {
            "tasks": homework.tasks,
            "submission_format": homework.submission_format,
            "grading_criteria": homework.grading_criteria,
        },
        "resources_optional": [],
    });

    match document {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Fans segment prompts out to the model with bounded concurrency
pub struct Detailer {
    provider: SharedProvider,
    retry: RetryConfig,
    max_concurrency: usize,
}

impl Detailer {
    pub fn new(provider: SharedProvider, retry: RetryConfig, max_concurrency: usize) -> Self {
        Self {
            provider,
            retry,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Run one detailing pass over `state.segments`.
    ///
    /// Malformed output for a segment is noted in the error log and replaced
    /// by the placeholder. A model call that still fails after retries aborts
    /// the pass.
    pub async fn run(&self, state: &mut PlanState) -> Result<(), LlmError> {
        state.detail_attempts += 1;
        let attempt = state.detail_attempts;
        let title = state.module_title.clone();
        let audience = state.audience.clone();
        let segments = state.segments.clone();

        debug!(
            run_id = %state.run_id,
            attempt,
            segments = segments.len(),
            concurrency = self.max_concurrency,
            "detailing segments"
        );

        // `buffered` yields in input order regardless of completion order
        let results: Vec<(SegmentDetail, Option<String>)> = stream::iter(segments.clone())
            .map(|segment| {
                let (title, audience) = (title.clone(), audience.clone());
                async move { self.detail_segment(&title, &audience, &segment).await }
            })
            .buffered(self.max_concurrency)
            .try_collect()
            .await?;

        let mut details = Vec::with_capacity(results.len());
        for (detail, note) in results {
            if let Some(note) = note {
                state.log_error(note);
            }
            details.push(detail);
        }

        let document = assemble_document(
            &title,
            &audience,
            state.target_minutes(),
            &segments,
            details,
        );
        state.lecture_plan = Some(PlanDocument::Raw(document));

        info!(run_id = %state.run_id, attempt, "assembled lecture plan");
        Ok(())
    }

    async fn detail_segment(
        &self,
        title: &str,
        audience: &str,
        segment: &Segment,
    ) -> Result<(SegmentDetail, Option<String>), LlmError> {
        let context = PromptContext::new()
            .with_variable("lecture_title", title)
            .with_variable("segment", segment.topic.as_str())
            .with_variable("audience", audience)
            .with_variable("minutes", segment.duration_mins.to_string());
        let prompt = PromptTemplates::segment_detail()
            .render(&context)
            .map_err(|message| LlmError::Unknown { message })?;

        let response = execute_with_retry(|| self.provider.invoke(&prompt), &self.retry).await?;

        match parse_segment_detail(&response) {
            Ok(detail) => Ok((detail, None)),
            Err(reason) => {
                warn!(segment = %segment.topic, "malformed segment detail: {}", reason);
                let note = format!(
                    "Detailer: segment '{}' returned malformed output: {}",
                    segment.topic, reason
                );
                Ok((SegmentDetail::placeholder(), Some(note)))
            }
        }
    }
}
