//! Synheart Rules - Personalized recommendation engine for wearable health data
//!
//! Rules turns a user's daily wearable history into at most a handful of
//! recommendation messages per day through a deterministic pipeline:
//! history normalization → feature aggregation → condition evaluation →
//! message selection and rendering → cooldown and conflict post-processing.
//!
//! ## Modules
//!
//! - **Features**: rolling aggregates (`current`, `mean_7d`, `median_14d`, ...) per variable
//! - **DSL**: JSON condition trees with explicit evaluation traces
//! - **Messages**: weighted, anti-repeat message selection and `{{ var:agg:fmt }}` templates
//! - **Post-processing**: per-rule cooldowns, daily caps and category caps
//! - **Providers**: history, rule and audit seams with in-memory implementations

pub mod baseline;
pub mod config;
pub mod dsl;
pub mod error;
pub mod features;
pub mod messages;
pub mod normalizer;
pub mod pipeline;
pub mod postprocess;
pub mod providers;
pub mod schema;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::EngineConfig;
pub use error::{DslError, EngineError};
pub use features::{Aggregator, FeatureAggregator, FeatureSnapshot};
pub use pipeline::{features_json, simulate_json, RulesEngine};
pub use providers::{AuditSink, HistoryProvider, RuleProvider};
pub use types::{AuditEntry, EvaluationResult, HistoricalRecord, Message, RecommendationEvent, Rule};

// Document exports
pub use schema::{HistoryLoader, RuleLoader, VariableCatalog};

/// Engine version
pub const RULES_VERSION: &str = env!("CARGO_PKG_VERSION");
