//! Scripted provider used by tests in place of a real model

use super::{LlmError, LlmProvider};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Responder = dyn Fn(&str, usize) -> Result<String, LlmError> + Send + Sync;

/// Provider whose answers come from a closure over `(prompt, call_index)`
pub struct ScriptedProvider {
    responder: Box<Responder>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    delay: Option<Box<dyn Fn(&str) -> Duration + Send + Sync>>,
}

impl ScriptedProvider {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, usize) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering, per prompt
    pub fn with_delay<D>(mut self, delay: D) -> Self
    where
        D: Fn(&str) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Box::new(delay));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of recorded prompts containing `needle`
    pub fn prompts_containing(&self, needle: &str) -> usize {
        self.prompts.lock().unwrap().iter().filter(|p| p.contains(needle)).count()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn invoke(&self, prompt: &str) -> Result<String, LlmError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(prompt)).await;
        }
        (self.responder)(prompt, index)
    }
}

/// True when the prompt is the outline (planner) prompt
pub fn is_outline_prompt(prompt: &str) -> bool {
    prompt.contains("Academic Planner")
}

/// Segment name carried by a segment-detail prompt
pub fn segment_of(prompt: &str) -> Option<&str> {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix("Segment: "))
        .map(str::trim)
}
