//! Validator gate: accept the assembled document or send it back for another pass

use super::LecturePlan;
use serde_json::Value;

/// Outcome of the gate for one assembled document
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Accept(LecturePlan),
    Retry { reason: String },
}

/// Coerce the shapes models commonly get almost right.
///
/// A string `details` (per agenda item) or `key_concepts` becomes a
/// one-element list, as does a string `teaching_notes`. A list-valued
/// `activity_exercise` or `homework_assignment` is replaced by its first
/// element. Anything else is left for the type check to judge.
pub fn normalize_document(document: &mut Value) {
    let Some(map) = document.as_object_mut() else {
        return;
    };

    if let Some(Value::Array(agenda)) = map.get_mut("agenda") {
        for item in agenda.iter_mut().filter_map(Value::as_object_mut) {
            for key in ["details", "key_concepts"] {
                wrap_string(item.get_mut(key));
            }
        }
    }

    wrap_string(map.get_mut("teaching_notes"));

    for key in ["activity_exercise", "homework_assignment"] {
        let first = match map.get(key) {
            Some(Value::Array(items)) => items.first().cloned(),
            _ => None,
        };
        if let Some(first) = first {
            map.insert(key.to_string(), first);
        }
    }
}

fn wrap_string(value: Option<&mut Value>) {
    if let Some(value) = value {
        if value.is_string() {
            let text = value.take();
            *value = Value::Array(vec![text]);
        }
    }
}

/// Check a document against the lecture-plan schema.
///
/// Pure: the input is not modified. Normalization is applied to a copy, then
/// every field is type-checked, the agenda must be non-empty and its minutes
/// must sum to `duration_minutes`. When `expected_minutes` is given,
/// `duration_minutes` must equal it.
pub fn validate_document(document: &Value, expected_minutes: Option<i64>) -> Result<LecturePlan, String> {
    let mut candidate = document.clone();
    normalize_document(&mut candidate);

    let plan: LecturePlan = serde_json::from_value(candidate).map_err(|e| e.to_string())?;

    if let Some(expected) = expected_minutes {
        if plan.duration_minutes != expected {
            return Err(format!(
                "duration_minutes is {} but the lecture is {} minutes",
                plan.duration_minutes, expected
            ));
        }
    }

    if plan.agenda.is_empty() {
        return Err("agenda is empty".to_string());
    }

    let agenda_minutes = plan.agenda_minutes();
    if agenda_minutes != plan.duration_minutes {
        return Err(format!(
            "agenda minutes sum to {} but duration_minutes is {}",
            agenda_minutes, plan.duration_minutes
        ));
    }

    Ok(plan)
}

/// Run the gate for a pipeline pass
pub fn gate(document: &Value, expected_minutes: i64) -> GateDecision {
    match validate_document(document, Some(expected_minutes)) {
        Ok(plan) => GateDecision::Accept(plan),
        Err(reason) => GateDecision::Retry { reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_document() -> Value {
        json!({
            "title": "Databases",
            "audience_level": "Undergraduate",
            "duration_minutes": 60,
            "learning_objectives": ["Understand Databases"],
            "prerequisites": [],
            "agenda": [
                { "segment": "Relational model", "minutes": 25, "details": ["tables"], "key_concepts": ["relation"] },
                { "segment": "SQL", "minutes": 35, "details": ["select"], "key_concepts": [] }
            ],
            "key_concepts": [],
            "teaching_notes": [],
            "activity_exercise": { "name": "Class Activity", "time_minutes": 15, "steps": [], "materials": [], "expected_output": "" },
            "discussion_prompts": [],
            "knowledge_check": [],
            "homework_assignment": { "tasks": [], "submission_format": "PDF", "grading_criteria": [] },
            "resources_optional": []
        })
    }

    #[test]
    fn test_valid_document_is_accepted() {
        let plan = validate_document(&valid_document(), Some(60)).unwrap();
        assert_eq!(plan.agenda.len(), 2);
        assert_eq!(plan.agenda_minutes(), 60);
        assert!(matches!(gate(&valid_document(), 60), GateDecision::Accept(_)));
    }

    #[test]
    fn test_gate_is_pure() {
        let mut doc = valid_document();
        doc["agenda"][0]["details"] = json!("a single string");
        let before = doc.clone();

        let first = validate_document(&doc, Some(60));
        let second = validate_document(&doc, Some(60));

        assert_eq!(doc, before);
        assert_eq!(first, second);
    }

    #[test]
    fn test_normalization_coerces_near_misses() {
        let mut doc = valid_document();
        doc["agenda"][0]["details"] = json!("only one point");
        doc["teaching_notes"] = json!("speak slowly");
        doc["activity_exercise"] = json!([
            { "name": "Design a schema", "time_minutes": 10, "steps": ["draw"], "materials": [], "expected_output": "ERD" },
            { "name": "ignored", "time_minutes": 1, "steps": [], "materials": [], "expected_output": "" }
        ]);
        doc["homework_assignment"] = json!([
            { "tasks": ["normalize"], "submission_format": "PDF", "grading_criteria": [] }
        ]);

        let plan = validate_document(&doc, Some(60)).unwrap();
        assert_eq!(plan.agenda[0].details, vec!["only one point"]);
        assert_eq!(plan.teaching_notes, vec!["speak slowly"]);
        assert_eq!(plan.activity_exercise.name, "Design a schema");
        assert_eq!(plan.homework_assignment.tasks, vec!["normalize"]);
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        let mut doc = valid_document();
        doc["agenda"][0]["details"] = json!({ "not": "a list" });
        assert!(matches!(gate(&doc, 60), GateDecision::Retry { .. }));

        let mut doc = valid_document();
        doc.as_object_mut().unwrap().remove("title");
        let reason = validate_document(&doc, None).unwrap_err();
        assert!(reason.contains("title"));
    }

    #[test]
    fn test_minute_sum_must_match_duration() {
        let mut doc = valid_document();
        doc["agenda"][1]["minutes"] = json!(30);
        let reason = validate_document(&doc, Some(60)).unwrap_err();
        assert!(reason.contains("sum to 55"));
    }

    #[test]
    fn test_duration_must_match_request() {
        let reason = validate_document(&valid_document(), Some(120)).unwrap_err();
        assert!(reason.contains("120"));
        assert!(validate_document(&valid_document(), None).is_ok());
    }

    #[test]
    fn test_empty_agenda_is_rejected() {
        let mut doc = valid_document();
        doc["agenda"] = json!([]);
        doc["duration_minutes"] = json!(0);
        assert_eq!(validate_document(&doc, None).unwrap_err(), "agenda is empty");
    }
}
