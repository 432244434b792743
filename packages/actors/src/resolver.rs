//! Resolving the workflow a job should run.

use std::sync::Arc;

use dispatch_core::{Job, ParseError, Workflow};

/// Payload key holding an inline workflow definition.
pub const PAYLOAD_WORKFLOW_KEY: &str = "workflow";

/// Maps a job to the workflow it runs.
///
/// A resolver may hand out one shared, read-only workflow for every job or
/// parse a fresh one per job. A parse error fails only that job.
pub trait WorkflowResolver: Send + Sync + 'static {
    fn resolve(&self, job: &Job) -> Result<Arc<Workflow>, ParseError>;
}

impl<F> WorkflowResolver for F
where
    F: Fn(&Job) -> Result<Arc<Workflow>, ParseError> + Send + Sync + 'static,
{
    fn resolve(&self, job: &Job) -> Result<Arc<Workflow>, ParseError> {
        self(job)
    }
}

/// One workflow parsed up front and shared by every job.
#[derive(Debug, Clone)]
pub struct SharedWorkflow(Arc<Workflow>);

impl SharedWorkflow {
    pub fn new(workflow: Workflow) -> Self {
        Self(Arc::new(workflow))
    }

    pub fn parse(definition: &str) -> Result<Self, ParseError> {
        Ok(Self::new(Workflow::parse(definition)?))
    }

    pub fn workflow(&self) -> &Workflow {
        &self.0
    }
}

impl WorkflowResolver for SharedWorkflow {
    fn resolve(&self, _job: &Job) -> Result<Arc<Workflow>, ParseError> {
        Ok(Arc::clone(&self.0))
    }
}

/// A definition kept as text and parsed again for every job, so no parsed
/// state is ever shared between executions.
#[derive(Debug, Clone)]
pub struct DefinitionWorkflow {
    definition: String,
}

impl DefinitionWorkflow {
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
        }
    }
}

impl WorkflowResolver for DefinitionWorkflow {
    fn resolve(&self, _job: &Job) -> Result<Arc<Workflow>, ParseError> {
        Workflow::parse(&self.definition).map(Arc::new)
    }
}

/// Reads the definition from the job's own payload under `"workflow"`,
/// either as a JSON document string or as an inline object.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadWorkflow;

impl WorkflowResolver for PayloadWorkflow {
    fn resolve(&self, job: &Job) -> Result<Arc<Workflow>, ParseError> {
        let workflow = match job.payload.get(PAYLOAD_WORKFLOW_KEY) {
            Some(serde_json::Value::String(text)) => Workflow::parse(text)?,
            Some(value @ serde_json::Value::Object(_)) => Workflow::from_value(value.clone())?,
            _ => return Err(ParseError::MissingDefinition),
        };
        Ok(Arc::new(workflow))
    }
}
