//! Execution backend abstraction.
//!
//! The [`Backend`] trait decouples loop orchestration from the job-execution
//! service that actually runs tasks. Tests use scripted backends that return
//! predetermined reports without contacting anything.

use std::fmt;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::types::StagingDescriptor;

/// Everything the backend needs to run one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescription {
    pub name: String,
    pub executable: Option<String>,
    pub arguments: Vec<String>,
    pub pre_exec: Vec<String>,
    pub cores: Option<u32>,
    pub mpi: bool,
    pub input_staging: Vec<StagingDescriptor>,
    pub output_staging: Vec<StagingDescriptor>,
}

/// Backend-assigned task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle(pub String);

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Done,
    Failed,
    Canceled,
}

/// One entry of a task's state history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub state: String,
    pub timestamp: DateTime<Utc>,
}

/// Terminal report for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub handle: TaskHandle,
    pub state: TaskState,
    /// Working directory as reported; may be a URI.
    pub working_directory: String,
    pub stderr: Option<String>,
    pub history: Vec<StateTransition>,
}

/// Abstraction over job-execution services.
pub trait Backend {
    fn submit(&self, task: &TaskDescription) -> Result<TaskHandle>;

    /// Block until every handle is terminal. Reports follow `handles` order.
    fn wait(&self, handles: &[TaskHandle]) -> Result<Vec<TaskReport>>;
}

/// One or more tasks of a step ended in a non-`Done` state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{step} failed:\n{}", .failures.join("\n"))]
pub struct TaskFailedError {
    pub step: String,
    pub failures: Vec<String>,
}

/// Submit every task, then wait for all of them.
#[instrument(skip_all, fields(tasks = tasks.len()))]
pub fn submit_and_wait<B: Backend>(
    backend: &B,
    tasks: &[TaskDescription],
) -> Result<Vec<TaskReport>> {
    let mut handles = Vec::with_capacity(tasks.len());
    for task in tasks {
        let handle = backend.submit(task)?;
        debug!(name = %task.name, %handle, "task submitted");
        handles.push(handle);
    }
    let reports = backend.wait(&handles)?;
    if reports.len() != handles.len() {
        return Err(anyhow!(
            "backend returned {} reports for {} tasks",
            reports.len(),
            handles.len()
        ));
    }
    Ok(reports)
}

/// Fail with [`TaskFailedError`] unless every report is `Done`.
pub fn ensure_all_done(step: &str, reports: &[TaskReport]) -> Result<()> {
    let failures: Vec<String> = reports
        .iter()
        .filter(|report| report.state != TaskState::Done)
        .map(|report| {
            format!(
                " * task {} ended {:?}: {}",
                report.handle,
                report.state,
                report.stderr.as_deref().unwrap_or("no stderr")
            )
        })
        .collect();
    if failures.is_empty() {
        return Ok(());
    }
    warn!(step, failed = failures.len(), "tasks failed");
    Err(TaskFailedError {
        step: step.to_string(),
        failures,
    }
    .into())
}
