//! Declarations a pipeline is created from.

use serde::{Deserialize, Serialize};

use crate::job::When;
use crate::status::JobStatus;

/// Declared shape of a pipeline: ordered stages of jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    pub stages: Vec<StageDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    pub jobs: Vec<JobDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    #[serde(default)]
    pub allow_failure: bool,
    pub kind: JobDefinitionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobDefinitionKind {
    Build {
        #[serde(default)]
        when: When,
    },
    /// Reported by an external system; declared with its current status.
    External {
        target_url: Option<String>,
        status: JobStatus,
    },
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Append a stage.
    pub fn stage(mut self, name: impl Into<String>, jobs: Vec<JobDefinition>) -> Self {
        self.stages.push(StageDefinition {
            name: name.into(),
            jobs,
        });
        self
    }
}

impl JobDefinition {
    pub fn build(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allow_failure: false,
            kind: JobDefinitionKind::Build {
                when: When::OnSuccess,
            },
        }
    }

    pub fn manual(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allow_failure: false,
            kind: JobDefinitionKind::Build { when: When::Manual },
        }
    }

    pub fn external(name: impl Into<String>, target_url: Option<String>, status: JobStatus) -> Self {
        Self {
            name: name.into(),
            allow_failure: false,
            kind: JobDefinitionKind::External { target_url, status },
        }
    }

    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }
}
