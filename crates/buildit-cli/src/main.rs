//! BuildIt CLI tool.

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::ApiClient;

#[derive(Parser)]
#[command(name = "buildit")]
#[command(about = "BuildIt pipeline status CLI", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, env = "BUILDIT_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and act on pipelines
    Pipelines {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Act on single jobs
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Validate a pipeline configuration
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "buildit.kdl")]
        path: String,
    },
}

#[derive(Subcommand)]
enum PipelineCommands {
    /// List all pipelines
    List,
    /// Create a pipeline from a definition file
    Create {
        /// Git ref the pipeline runs for
        #[arg(long = "ref", default_value = "main")]
        git_ref: String,
        /// Commit sha
        #[arg(long)]
        sha: String,
        /// Path to the configuration file
        #[arg(long, default_value = "buildit.kdl")]
        config: String,
    },
    /// Show pipeline status
    Show {
        /// Pipeline ID
        id: String,
    },
    /// Show jobs grouped by stage
    Jobs {
        /// Pipeline ID
        id: String,
    },
    /// Cancel every waiting or running job
    Cancel {
        /// Pipeline ID
        id: String,
    },
    /// Retry every failed or canceled job
    Retry {
        /// Pipeline ID
        id: String,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// Retry a finished job
    Retry {
        /// Job ID
        id: String,
    },
    /// Start a manual job
    Play {
        /// Job ID
        id: String,
    },
    /// Cancel a job
    Cancel {
        /// Job ID
        id: String,
    },
    /// Report a job status on behalf of a backend
    Report {
        /// Job ID
        id: String,
        /// New status (running, success, failed, canceled)
        status: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Validate { path } = &cli.command {
        return commands::validate(path);
    }

    let client = ApiClient::new(&cli.api_url, cli.json)
        .with_context(|| format!("Invalid API URL: {}", cli.api_url))?;

    match cli.command {
        Commands::Pipelines { command } => match command {
            PipelineCommands::List => commands::pipelines::list(&client).await?,
            PipelineCommands::Create {
                git_ref,
                sha,
                config,
            } => commands::pipelines::create(&client, &config, &git_ref, &sha).await?,
            PipelineCommands::Show { id } => commands::pipelines::show(&client, &id).await?,
            PipelineCommands::Jobs { id } => commands::pipelines::jobs(&client, &id).await?,
            PipelineCommands::Cancel { id } => commands::pipelines::cancel(&client, &id).await?,
            PipelineCommands::Retry { id } => commands::pipelines::retry(&client, &id).await?,
        },
        Commands::Jobs { command } => match command {
            JobCommands::Retry { id } => commands::jobs::retry(&client, &id).await?,
            JobCommands::Play { id } => commands::jobs::play(&client, &id).await?,
            JobCommands::Cancel { id } => commands::jobs::cancel(&client, &id).await?,
            JobCommands::Report { id, status } => {
                commands::jobs::report(&client, &id, &status).await?
            }
        },
        Commands::Validate { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_job_report() {
        let cli = Cli::parse_from(["buildit", "jobs", "report", "abc", "running", "--json"]);
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Jobs {
                command: JobCommands::Report { ref id, ref status }
            } if id == "abc" && status == "running"
        ));
    }
}
