//! Change notifications published after each committed mutation.

use buildit_core::{CompositeStatus, PipelineId, Transition};
use serde::Serialize;

/// Event emitted when a pipeline changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    PipelineCreated {
        pipeline_id: PipelineId,
        status: CompositeStatus,
    },
    JobTransitioned {
        pipeline_id: PipelineId,
        transition: Transition,
    },
    StageStatusChanged {
        pipeline_id: PipelineId,
        stage: String,
        status: CompositeStatus,
    },
    PipelineStatusChanged {
        pipeline_id: PipelineId,
        status: CompositeStatus,
    },
}

impl PipelineEvent {
    pub fn pipeline_id(&self) -> PipelineId {
        match self {
            PipelineEvent::PipelineCreated { pipeline_id, .. }
            | PipelineEvent::JobTransitioned { pipeline_id, .. }
            | PipelineEvent::StageStatusChanged { pipeline_id, .. }
            | PipelineEvent::PipelineStatusChanged { pipeline_id, .. } => *pipeline_id,
        }
    }
}
