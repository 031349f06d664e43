//! Core domain types for the BuildIt CI/CD pipeline status engine.
//!
//! This crate contains:
//! - Resource identifiers and the error type
//! - The job status state machine
//! - Stage and pipeline status aggregation and stage gating
//! - Pipeline definitions, persisted records and read views
//! - The storage abstraction for pipeline records

pub mod definition;
pub mod error;
pub mod id;
pub mod job;
pub mod pipeline;
pub mod record;
pub mod stage;
pub mod status;
pub mod store;
pub mod view;

pub use definition::{JobDefinition, JobDefinitionKind, PipelineDefinition, StageDefinition};
pub use error::{Error, Result};
pub use id::{JobId, PipelineId};
pub use job::{Job, JobKind, Transition, When};
pub use pipeline::Pipeline;
pub use record::{PipelineRecord, StageRecord};
pub use stage::Stage;
pub use status::{CompositeStatus, JobStatus};
pub use store::PipelineStore;
pub use view::{JobView, PipelineView, StageView};
