//! Demo dispatcher: runs a batch of jobs through a shell workflow.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use dispatch_actors::{BatchSource, DefinitionWorkflow, Dispatcher, RunSummary, ShellRunner};
use dispatch_core::{DispatchConfig, Job, Workflow};
use tracing_subscriber::EnvFilter;

const ENV_WORKFLOW: &str = "DISPATCH_WORKFLOW";
const ENV_DEMO_JOBS: &str = "DISPATCH_DEMO_JOBS";

const DEFAULT_DEMO_JOBS: usize = 5;
const DEMO_JOB_SPACING: Duration = Duration::from_secs(5);

const DEMO_WORKFLOW: &str = r#"{
  "name": "Simple Workflow",
  "steps": [
    "echo 'Step 1: Clone Repo' && sleep 1",
    "echo 'Step 2: Build' && sleep 1",
    "echo 'Step 3: Test' && sleep 1"
  ]
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = DispatchConfig::from_env()?;
    let definition = load_definition()?;

    // Fail fast on a broken file; jobs still re-parse their own copy.
    let workflow = Workflow::parse(&definition)?;
    tracing::info!("Loaded workflow '{}' with {} steps", workflow.name, workflow.len());

    let demo_jobs = match std::env::var(ENV_DEMO_JOBS) {
        Ok(value) => value.trim().parse::<usize>()?,
        Err(_) => DEFAULT_DEMO_JOBS,
    };

    let mut dispatcher = Dispatcher::builder(
        config,
        Arc::new(ShellRunner::new()),
        Arc::new(DefinitionWorkflow::new(definition)),
    )
    .start()
    .await?;

    let jobs = (1..=demo_jobs).map(|n| Job::new(format!("Test Job {}", n)));
    dispatcher.add_source(BatchSource::new("demo", jobs).with_interval(DEMO_JOB_SPACING));

    let summary = dispatcher.run_until(shutdown_signal()).await?;
    // Failed jobs are in the ledger; only a broken run is a process error.
    print_summary(&summary);
    Ok(())
}

fn load_definition() -> Result<String, Box<dyn Error>> {
    match std::env::var(ENV_WORKFLOW) {
        Ok(path) => {
            tracing::info!("Reading workflow from {}", path);
            Ok(std::fs::read_to_string(&path)?)
        }
        Err(_) => Ok(DEMO_WORKFLOW.to_string()),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn print_summary(summary: &RunSummary) {
    for source in &summary.sources {
        println!(
            "source {}: {} submitted, {} rejected ({:?})",
            source.name, source.submitted, source.rejected, source.exit
        );
    }
    for record in &summary.report.records {
        println!(
            "{}  {:<12} {:<10} {:>6}ms  {}",
            record.job_id,
            record.job_name,
            record.worker_id,
            record.duration_ms(),
            record.outcome
        );
    }
    println!(
        "{} jobs: {} completed, {} failed",
        summary.report.executed(),
        summary.report.completed(),
        summary.report.failed()
    );
}
