//! CLI command implementations.

pub mod jobs;
pub mod pipelines;

use anyhow::{Context, Result, bail};
use buildit_core::{JobId, JobView, PipelineView, StageView, Transition};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Write;
use tracing::debug;
use url::Url;

/// Thin JSON client for the BuildIt API.
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    json: bool,
}

impl ApiClient {
    pub fn new(api_url: &str, json: bool) -> Result<Self> {
        let base = Url::parse(api_url)?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            json,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("Invalid request path: {}", path))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        debug!(%url, "GET");
        let response = self.http.get(url).send().await?;
        self.decode(response).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: Option<Value>) -> Result<T> {
        let url = self.url(path)?;
        debug!(%url, "POST");
        let request = self.http.post(url);
        let request = match body {
            Some(body) => request.json(&body),
            None => request,
        };
        self.decode(request.send().await?).await
    }

    async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .with_context(|| format!("Unreadable response ({})", status))?;

        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown error");
            if let Some(current) = body.get("current") {
                if let Ok(view) = serde_json::from_value::<PipelineView>(current.clone()) {
                    eprint!("{}", render_pipeline(&view));
                }
            }
            bail!("{} ({})", message, status);
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        serde_json::from_value(body).context("Unexpected response shape")
    }

    /// Whether human-readable output should be printed.
    pub fn human(&self) -> bool {
        !self.json
    }
}

/// Body of every accepted action.
#[derive(Debug, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub created: Vec<JobId>,
    pub transitions: Vec<Transition>,
    pub pipeline: PipelineView,
}

pub fn render_action(response: &ActionResponse) -> String {
    let mut out = String::new();
    if response.transitions.is_empty() {
        out.push_str("Nothing changed\n");
    }
    for t in &response.transitions {
        let from = t.from.map(|s| s.to_string()).unwrap_or_else(|| "new".to_string());
        let _ = writeln!(out, "  {}/{} ({}): {} -> {}", t.stage, t.job, t.job_id, from, t.to);
    }
    out.push_str(&render_pipeline(&response.pipeline));
    out
}

pub fn render_pipeline(view: &PipelineView) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Pipeline {} ({}) {}@{}: {}",
        view.name, view.id, view.git_ref, view.sha, view.status
    );
    for stage in &view.stages {
        out.push_str(&render_stage(stage));
    }
    if !view.retried.is_empty() {
        let _ = writeln!(out, "  retried:");
        for job in &view.retried {
            let _ = writeln!(out, "    {}", render_job(job));
        }
    }
    out
}

pub fn render_stage(stage: &StageView) -> String {
    let mut out = format!("  [{}] {}\n", stage.status, stage.name);
    for job in &stage.jobs {
        let _ = writeln!(out, "    {}", render_job(job));
    }
    out
}

fn render_job(job: &JobView) -> String {
    let mut line = format!("{:<24} {:<10} {}", job.name, job.status.to_string(), job.id);
    let mut tags = Vec::new();
    if job.allow_failure {
        tags.push("allowed to fail");
    }
    if job.manual {
        tags.push("manual");
    }
    if job.generic {
        tags.push("external");
    }
    if job.retryable {
        tags.push("retryable");
    }
    if job.playable {
        tags.push("playable");
    }
    if !tags.is_empty() {
        let _ = write!(line, " ({})", tags.join(", "));
    }
    if let Some(url) = &job.target_url {
        let _ = write!(line, " {}", url);
    }
    line
}

pub fn validate(path: &str) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path))?;
    match buildit_config::pipeline::parse_pipeline(&content) {
        Ok(pipeline) => {
            let jobs: usize = pipeline.stages.iter().map(|s| s.jobs.len()).sum();
            println!(
                "Configuration is valid: {} ({} stages, {} jobs)",
                pipeline.name,
                pipeline.stages.len(),
                jobs
            );
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildit_core::{CompositeStatus, JobStatus, PipelineId};

    const CREATED: &str = "2024-01-01T00:00:00Z";

    fn sample() -> PipelineView {
        let job = serde_json::json!({
            "id": JobId::new(),
            "name": "lint",
            "stage": "test",
            "status": "failed",
            "allow_failure": true,
            "manual": false,
            "generic": false,
            "target_url": null,
            "retryable": true,
            "playable": false,
            "cancelable": false,
            "retried": false,
            "retry_of": null,
            "created_at": CREATED,
            "started_at": null,
            "finished_at": null,
        });
        serde_json::from_value(serde_json::json!({
            "id": PipelineId::new(),
            "name": "app",
            "git_ref": "main",
            "sha": "abc123",
            "status": "success",
            "retryable": true,
            "cancelable": false,
            "job_count": 1,
            "stages": [{ "name": "test", "position": 0, "status": "success", "jobs": [job] }],
            "retried": [],
            "created_at": CREATED,
            "updated_at": CREATED,
        }))
        .unwrap()
    }

    #[test]
    fn test_render_pipeline() {
        let view = sample();
        assert_eq!(view.status, CompositeStatus::Success);
        assert_eq!(view.stages[0].jobs[0].status, JobStatus::Failed);

        let text = render_pipeline(&view);
        assert!(text.starts_with("Pipeline app"));
        assert!(text.contains("main@abc123: success"));
        assert!(text.contains("[success] test"));
        assert!(text.contains("allowed to fail, retryable"));
    }

    #[test]
    fn test_render_noop_action() {
        let response = ActionResponse {
            created: vec![],
            transitions: vec![],
            pipeline: sample(),
        };
        assert!(render_action(&response).starts_with("Nothing changed"));
    }

    #[test]
    fn test_client_rejects_bad_url() {
        assert!(ApiClient::new("not a url", false).is_err());
        let client = ApiClient::new("http://localhost:3000", false).unwrap();
        assert_eq!(
            client.url("/api/v1/pipelines").unwrap().as_str(),
            "http://localhost:3000/api/v1/pipelines"
        );
    }
}
