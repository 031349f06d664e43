//! Pipeline definition parsing.
//!
//! ```kdl
//! pipeline "my-service"
//!
//! stage "test" {
//!     job "unit"
//!     job "lint" allow_failure=#true
//! }
//!
//! stage "deploy" {
//!     job "production" when="manual"
//! }
//!
//! stage "external" {
//!     external "jenkins" status="success" target_url="https://ci.example.com/42"
//! }
//! ```

use crate::kdl_ext::{bool_prop, first_string_arg, string_prop};
use crate::{ConfigError, ConfigResult};
use buildit_core::{
    JobDefinition, JobDefinitionKind, JobStatus, PipelineDefinition, StageDefinition, When,
};
use kdl::{KdlDocument, KdlNode};
use std::collections::HashSet;
use std::path::Path;

/// Parse a pipeline definition from KDL text.
pub fn parse_pipeline(kdl: &str) -> ConfigResult<PipelineDefinition> {
    let doc: KdlDocument = kdl.parse()?;

    let mut name = String::new();
    let mut stages: Vec<StageDefinition> = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "pipeline" => {
                name = first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("pipeline name".to_string()))?;
            }
            "stage" => {
                let stage = parse_stage(node)?;
                if stages.iter().any(|s| s.name == stage.name) {
                    return Err(ConfigError::Duplicate(format!("stage '{}'", stage.name)));
                }
                stages.push(stage);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    if name.is_empty() {
        return Err(ConfigError::MissingField("pipeline name".to_string()));
    }

    Ok(PipelineDefinition { name, stages })
}

/// Read and parse a pipeline definition file.
pub fn load_pipeline(path: impl AsRef<Path>) -> ConfigResult<PipelineDefinition> {
    let content = std::fs::read_to_string(path)?;
    parse_pipeline(&content)
}

fn parse_stage(node: &KdlNode) -> ConfigResult<StageDefinition> {
    let name = first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("stage name".to_string()))?;

    let mut jobs: Vec<JobDefinition> = Vec::new();
    let mut seen = HashSet::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let job = match child.name().value() {
                "job" => parse_job(child, &name)?,
                "external" => parse_external(child, &name)?,
                _ => continue,
            };
            if !seen.insert(job.name.clone()) {
                return Err(ConfigError::Duplicate(format!(
                    "job '{}' in stage '{}'",
                    job.name, name
                )));
            }
            jobs.push(job);
        }
    }

    Ok(StageDefinition { name, jobs })
}

fn parse_job(node: &KdlNode, stage: &str) -> ConfigResult<JobDefinition> {
    let name = first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField(format!("job name in stage '{}'", stage)))?;

    let when = match string_prop(node, "when").as_deref() {
        None | Some("on_success") => When::OnSuccess,
        Some("manual") => When::Manual,
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                field: format!("when for job '{}'", name),
                message: format!("expected 'on_success' or 'manual', got '{}'", other),
            });
        }
    };

    Ok(JobDefinition {
        name,
        allow_failure: bool_prop(node, "allow_failure").unwrap_or(false),
        kind: JobDefinitionKind::Build { when },
    })
}

fn parse_external(node: &KdlNode, stage: &str) -> ConfigResult<JobDefinition> {
    let name = first_string_arg(node).ok_or_else(|| {
        ConfigError::MissingField(format!("external job name in stage '{}'", stage))
    })?;

    let status = match string_prop(node, "status") {
        None => JobStatus::Running,
        Some(raw) => {
            let status: JobStatus = raw.parse().map_err(|_| ConfigError::InvalidValue {
                field: format!("status for external job '{}'", name),
                message: format!("unknown status '{}'", raw),
            })?;
            if !buildit_core::job::is_generic_status(status) {
                return Err(ConfigError::InvalidValue {
                    field: format!("status for external job '{}'", name),
                    message: format!("external jobs cannot be {}", status),
                });
            }
            status
        }
    };

    let target_url = match string_prop(node, "target_url") {
        Some(raw) => {
            url::Url::parse(&raw).map_err(|e| ConfigError::InvalidValue {
                field: format!("target_url for external job '{}'", name),
                message: e.to_string(),
            })?;
            Some(raw)
        }
        None => None,
    };

    Ok(JobDefinition {
        name,
        allow_failure: bool_prop(node, "allow_failure").unwrap_or(false),
        kind: JobDefinitionKind::External { target_url, status },
    })
}
