//! Workflow definitions: a named, ordered list of steps.

use serde::{Deserialize, Serialize};

/// A single executable instruction, typically a shell command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Step(pub String);

impl Step {
    pub fn new(command: impl Into<String>) -> Self {
        Self(command.into())
    }

    /// The instruction text.
    pub fn command(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Step {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Step {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A parsed workflow. Step order is exactly the order in the definition.
///
/// Workflows hold no execution state, so a single parsed value can be shared
/// behind an `Arc` by any number of concurrent executions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Workflow {
    /// Build a workflow from in-memory parts.
    pub fn new<S: Into<Step>>(name: impl Into<String>, steps: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            steps: steps.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a JSON workflow definition.
    ///
    /// ```json
    /// { "name": "build", "steps": ["cargo build", "cargo test"] }
    /// ```
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let workflow: Workflow = serde_json::from_str(text)?;
        workflow.validate()?;
        Ok(workflow)
    }

    /// Build a workflow from an already-decoded JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ParseError> {
        let workflow: Workflow = serde_json::from_value(value)?;
        workflow.validate()?;
        Ok(workflow)
    }

    fn validate(&self) -> Result<(), ParseError> {
        if self.name.trim().is_empty() {
            return Err(ParseError::MissingName);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// A malformed workflow definition.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid workflow document: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("workflow has no name")]
    MissingName,

    #[error("job carries no workflow definition")]
    MissingDefinition,
}
