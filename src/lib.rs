//! Lectern - lecture-plan generation driven by a language model
//!
//! A request (topic, audience, duration) is turned into a structured,
//! schema-validated lecture plan by a small staged pipeline: the model drafts
//! an outline, deterministic arithmetic balances the time, the model expands
//! each segment, and a validator gate accepts the result or sends it back.

pub mod config;
pub mod llm;
pub mod planning;
pub mod server;
pub mod utils;

// Re-export commonly used types and traits
pub use config::{Config, ConfigManager, ProviderConfig};
pub use llm::{LlmError, LlmProvider, LlmProviderFactory, ProviderSettings, SharedProvider};
pub use planning::{
    LecturePlan, LecturePlanPipeline, PipelineConfig, PipelineOutcome, PipelineStage, PlanRequest,
};
pub use utils::errors::{ConfigError, GenerationError, LecternError};

/// The main result type used throughout the application
pub type Result<T> = std::result::Result<T, LecternError>;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Lectern";
