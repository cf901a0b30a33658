//! Prompt templates for the lecture-plan generation stages

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Template for a single-shot model interaction
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub system_message: String,
    pub user_template: String,
    pub variables: Vec<String>,
}

/// Context for filling prompt templates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptContext {
    pub variables: HashMap<String, String>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.variables.insert(key.into(), value.into());
        self
    }
}

impl PromptTemplate {
    /// Fill the template with context variables
    pub fn fill(&self, context: &PromptContext) -> Result<(String, String), String> {
        for variable in &self.variables {
            if !context.variables.contains_key(variable) {
                return Err(format!("Missing required variable: {}", variable));
            }
        }

        let mut system_message = self.system_message.clone();
        let mut user_message = self.user_template.clone();

        for (key, value) in &context.variables {
            let placeholder = format!("{{{{{}}}}}", key);
            system_message = system_message.replace(&placeholder, value);
            user_message = user_message.replace(&placeholder, value);
        }

        Ok((system_message, user_message))
    }

    /// Fill the template and flatten it into one prompt string
    pub fn render(&self, context: &PromptContext) -> Result<String, String> {
        let (system_message, user_message) = self.fill(context)?;
        Ok(format!("{}\n\n{}", system_message.trim(), user_message.trim()))
    }
}

/// Collection of predefined prompt templates
pub struct PromptTemplates;

impl PromptTemplates {
    /// Coarse lecture structure: title, total minutes and timed segments
    pub fn lecture_outline() -> PromptTemplate {
        PromptTemplate {
            system_message: r#"
Act as an Academic Planner. You design the high-level structure of a single lecture.

Respond with ONLY a JSON object, no prose and no markdown, with exactly this shape:
{
  "title": "string",
  "total_minutes": 0,
  "segments": [
    { "topic": "string", "duration_mins": 0 }
  ]
}

Rules:
- "segments" lists the lecture's parts in teaching order
- "duration_mins" is a whole number of minutes
- Use plain double quotes only
"#
            .to_string(),
            user_template: "Topic: {{topic}}\nAudience: {{audience}}\nTotal Time: {{duration_hours}} hours ({{duration_minutes}} minutes)".to_string(),
            variables: vec![
                "topic".to_string(),
                "audience".to_string(),
                "duration_hours".to_string(),
                "duration_minutes".to_string(),
            ],
        }
    }

    /// Supporting details and key concepts for one agenda segment
    pub fn segment_detail() -> PromptTemplate {
        PromptTemplate {
            system_message: r#"
You expand one segment of a lecture for the instructor who will teach it.

Respond with ONLY a JSON object, no prose and no markdown, with exactly this shape:
{
  "details": ["3 to 5 short bullet points"],
  "concepts": ["exactly 3 key terms"]
}
"#
            .to_string(),
            user_template: "Lecture: {{lecture_title}}\nSegment: {{segment}}\nAudience: {{audience}} level students\nDuration: {{minutes}} minutes".to_string(),
            variables: vec![
                "lecture_title".to_string(),
                "segment".to_string(),
                "audience".to_string(),
                "minutes".to_string(),
            ],
        }
    }
}
