//! Pipeline commands.

use anyhow::{Context, Result};
use buildit_core::{PipelineView, StageView};
use serde_json::json;

use super::{ActionResponse, ApiClient, render_action, render_pipeline, render_stage};

pub async fn list(client: &ApiClient) -> Result<()> {
    let pipelines: Vec<PipelineView> = client.get("/api/v1/pipelines").await?;
    if client.human() {
        if pipelines.is_empty() {
            println!("No pipelines");
        }
        for view in &pipelines {
            println!(
                "{}  {:<10} {} {}@{}",
                view.id, view.status, view.name, view.git_ref, view.sha
            );
        }
    }
    Ok(())
}

/// Create a pipeline from a local `buildit.kdl`, validating it first.
pub async fn create(client: &ApiClient, config_path: &str, git_ref: &str, sha: &str) -> Result<()> {
    let config = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path))?;
    buildit_config::parse_pipeline(&config)
        .with_context(|| format!("Failed to parse pipeline config: {}", config_path))?;

    let view: PipelineView = client
        .post(
            "/api/v1/pipelines",
            Some(json!({ "ref": git_ref, "sha": sha, "config": config })),
        )
        .await?;
    if client.human() {
        print!("{}", render_pipeline(&view));
    }
    Ok(())
}

pub async fn show(client: &ApiClient, id: &str) -> Result<()> {
    let view: PipelineView = client.get(&format!("/api/v1/pipelines/{}", id)).await?;
    if client.human() {
        print!("{}", render_pipeline(&view));
    }
    Ok(())
}

pub async fn jobs(client: &ApiClient, id: &str) -> Result<()> {
    let stages: Vec<StageView> = client.get(&format!("/api/v1/pipelines/{}/jobs", id)).await?;
    if client.human() {
        for stage in &stages {
            print!("{}", render_stage(stage));
        }
    }
    Ok(())
}

pub async fn cancel(client: &ApiClient, id: &str) -> Result<()> {
    action(client, &format!("/api/v1/pipelines/{}/cancel", id)).await
}

pub async fn retry(client: &ApiClient, id: &str) -> Result<()> {
    action(client, &format!("/api/v1/pipelines/{}/retry", id)).await
}

pub(super) async fn action(client: &ApiClient, path: &str) -> Result<()> {
    let response: ActionResponse = client.post(path, None).await?;
    if client.human() {
        print!("{}", render_action(&response));
    }
    Ok(())
}
