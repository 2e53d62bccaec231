use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use nightly_publisher::clock::SystemClock;
use nightly_publisher::config::{self, Config, ProjectConfig};
use nightly_publisher::google::{DriveClient, GoogleHttp, SheetsClient, YouTubeClient};
use nightly_publisher::model::{RunType, TargetResult};
use nightly_publisher::orchestrator::{describe, post_result, video_result, Collaborators, Orchestrator};
use nightly_publisher::social::XClient;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the nightly publishing pass over all active projects
    Nightly {
        /// Reference time (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        /// all, video or social
        #[arg(long = "type", default_value = "all")]
        run_type: RunType,
        /// Only run this project
        #[arg(long)]
        project: Option<String>,
    },
    /// Show a project's catalog, newest slot first
    List {
        #[arg(long)]
        project: String,
    },
    /// Show the video metadata a slot would be published with
    Preview {
        #[arg(long)]
        project: String,
        #[arg(long)]
        nr: u32,
    },
    /// Publish one slot's video now
    Upload {
        #[arg(long)]
        project: String,
        #[arg(long)]
        nr: u32,
    },
    /// Post one slot to the social platform now
    Post {
        #[arg(long)]
        project: String,
        #[arg(long)]
        nr: u32,
    },
    /// Push current catalog metadata onto an already published video
    Refresh {
        #[arg(long)]
        project: String,
        #[arg(long)]
        nr: u32,
    },
}

fn build_orchestrator(cfg: &Config) -> Result<Orchestrator> {
    let token = std::env::var("GOOGLE_ACCESS_TOKEN").unwrap_or_else(|_| cfg.google.access_token.clone());
    let google = GoogleHttp::new(token)?;
    let services = Collaborators {
        rows: Arc::new(SheetsClient::new(google.clone())),
        blobs: Arc::new(DriveClient::new(google.clone())),
        video: Arc::new(YouTubeClient::new(google)),
        social: Arc::new(XClient::new(cfg.x.clone())?),
    };
    Ok(Orchestrator::new(cfg.app.clone(), services, Arc::new(SystemClock::start())))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn project<'a>(cfg: &'a Config, id: &str) -> Result<&'a ProjectConfig> {
    Ok(cfg.project(id)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let orchestrator = build_orchestrator(&cfg)?;

    match args.command {
        Command::Nightly { at, run_type, project } => {
            let projects: Vec<ProjectConfig> = match project {
                Some(id) => vec![cfg.project(&id)?.clone()],
                None => cfg.projects.clone(),
            };
            let reference_time = at.unwrap_or_else(Utc::now);
            info!(%reference_time, %run_type, projects = projects.len(), "starting nightly run");
            let report = orchestrator.run(&projects, reference_time, run_type).await;
            print_json(&report)?;
        }
        Command::List { project: id } => {
            let entries = orchestrator.list(project(&cfg, &id)?).await?;
            print_json(&entries)?;
        }
        Command::Preview { project: id, nr } => {
            let metadata = orchestrator.preview(project(&cfg, &id)?, nr).await?;
            print_json(&metadata)?;
        }
        Command::Upload { project: id, nr } => {
            let result = match orchestrator.publish_one(project(&cfg, &id)?, nr).await {
                Ok(ack) => video_result(nr, &ack),
                Err(err) => TargetResult::error(nr, describe(&err)),
            };
            print_json(&result)?;
        }
        Command::Post { project: id, nr } => {
            let result = match orchestrator.post_one(project(&cfg, &id)?, nr).await {
                Ok(ack) => post_result(nr, &ack),
                Err(err) => TargetResult::error(nr, describe(&err)),
            };
            print_json(&result)?;
        }
        Command::Refresh { project: id, nr } => {
            let result = match orchestrator.refresh_one(project(&cfg, &id)?, nr).await {
                Ok(ack) => TargetResult::processed(nr, ack.detail(), false),
                Err(err) => TargetResult::error(nr, describe(&err)),
            };
            print_json(&result)?;
        }
    }

    Ok(())
}
