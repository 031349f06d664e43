//! Job commands.

use anyhow::Result;
use serde_json::json;

use super::pipelines::action;
use super::{ActionResponse, ApiClient, render_action};

pub async fn retry(client: &ApiClient, id: &str) -> Result<()> {
    let response: ActionResponse = client
        .post(&format!("/api/v1/jobs/{}/retry", id), None)
        .await?;
    if client.human() {
        for created in &response.created {
            println!("Retried as job {}", created);
        }
        print!("{}", render_action(&response));
    }
    Ok(())
}

pub async fn play(client: &ApiClient, id: &str) -> Result<()> {
    action(client, &format!("/api/v1/jobs/{}/play", id)).await
}

pub async fn cancel(client: &ApiClient, id: &str) -> Result<()> {
    action(client, &format!("/api/v1/jobs/{}/cancel", id)).await
}

pub async fn report(client: &ApiClient, id: &str, status: &str) -> Result<()> {
    let response: ActionResponse = client
        .post(
            &format!("/api/v1/jobs/{}/status", id),
            Some(json!({ "status": status })),
        )
        .await?;
    if client.human() {
        print!("{}", render_action(&response));
    }
    Ok(())
}
