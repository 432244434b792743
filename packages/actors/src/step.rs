//! Step runner trait and implementations.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use dispatch_core::{Job, Step, StepOutput};
use tokio::process::Command;

/// Result type for a single step.
pub type StepResult = Result<StepOutput, String>;

/// Future type for async step runners.
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = StepResult> + Send + 'a>>;

/// Runs one workflow step to completion.
///
/// Implement this trait to define what a step's instruction means. The
/// executor calls it once per step, in order, and never concurrently for
/// the same job.
pub trait StepRunner: Send + Sync + 'static {
    fn run<'a>(&'a self, step: &'a Step, job: &'a Job) -> StepFuture<'a>;
}

/// A simple function-based step runner.
pub struct FnRunner<F>
where
    F: Fn(&Step, &Job) -> StepFuture<'static> + Send + Sync + 'static,
{
    runner: F,
}

impl<F> FnRunner<F>
where
    F: Fn(&Step, &Job) -> StepFuture<'static> + Send + Sync + 'static,
{
    /// Create a new function-based runner.
    pub fn new(runner: F) -> Self {
        Self { runner }
    }
}

impl<F> StepRunner for FnRunner<F>
where
    F: Fn(&Step, &Job) -> StepFuture<'static> + Send + Sync + 'static,
{
    fn run<'a>(&'a self, step: &'a Step, job: &'a Job) -> StepFuture<'a> {
        (self.runner)(step, job)
    }
}

/// Runs each step as a shell command line.
///
/// A zero exit status is success. Anything else fails the step with the exit
/// code and the last line of stderr. The child is killed if the step future
/// is dropped, which is how per-step timeouts stop it.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    flag: String,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            flag: "-c".to_string(),
        }
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different interpreter, e.g. `("bash", "-c")`.
    pub fn with_shell(mut self, shell: impl Into<String>, flag: impl Into<String>) -> Self {
        self.shell = shell.into();
        self.flag = flag.into();
        self
    }

    async fn run_command(&self, step: &Step, job: &Job) -> StepResult {
        let output = Command::new(&self.shell)
            .arg(&self.flag)
            .arg(step.command())
            .env("DISPATCH_JOB_ID", job.id.to_string())
            .env("DISPATCH_JOB_NAME", &job.name)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to spawn {}: {}", self.shell, e))?;

        if output.status.success() {
            Ok(StepOutput::new(last_line(&output.stdout)))
        } else {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            let stderr = last_line(&output.stderr);
            if stderr.is_empty() {
                Err(format!("exit status {}", code))
            } else {
                Err(format!("exit status {}: {}", code, stderr))
            }
        }
    }
}

impl StepRunner for ShellRunner {
    fn run<'a>(&'a self, step: &'a Step, job: &'a Job) -> StepFuture<'a> {
        Box::pin(self.run_command(step, job))
    }
}

fn last_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .to_string()
}
