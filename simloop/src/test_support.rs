//! Test-only helpers for registries, contexts, and a scripted backend.

use std::cell::RefCell;

use anyhow::{Result, anyhow};
use chrono::{TimeDelta, TimeZone, Utc};

use crate::core::registry::WorkingDirectoryRegistry;
use crate::core::types::{Coordinate, ExecutionContext, Phase};
use crate::io::backend::{
    Backend, StateTransition, TaskDescription, TaskHandle, TaskReport, TaskState,
};

/// Registry pre-populated with `entries`. Panics on duplicates.
pub fn registry(entries: &[(Coordinate, &str)]) -> WorkingDirectoryRegistry {
    let mut registry = WorkingDirectoryRegistry::new();
    for (coordinate, location) in entries {
        registry
            .publish(*coordinate, location)
            .expect("test registry entry");
    }
    registry
}

pub fn context(
    phase: Phase,
    iteration: u32,
    instance: u32,
    simulation_width: u32,
    analysis_width: u32,
) -> ExecutionContext {
    ExecutionContext {
        phase,
        iteration,
        instance,
        simulation_width,
        analysis_width,
    }
}

/// Backend that completes every task immediately.
///
/// Task `n` (1-based, in submission order) gets handle `unit.{n:06}` and
/// working directory `file://localhost/scratch/unit.{n:06}`. Tasks named in
/// `failing` end `Failed`.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    submitted: RefCell<Vec<TaskDescription>>,
    failing: Vec<String>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.failing.push(name.to_string());
        self
    }

    /// Every task submitted so far, in order.
    pub fn submitted(&self) -> Vec<TaskDescription> {
        self.submitted.borrow().clone()
    }

    fn index(handle: &TaskHandle) -> Result<usize> {
        handle
            .0
            .strip_prefix("unit.")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| anyhow!("unknown handle {handle}"))
    }
}

impl Backend for ScriptedBackend {
    fn submit(&self, task: &TaskDescription) -> Result<TaskHandle> {
        let mut submitted = self.submitted.borrow_mut();
        submitted.push(task.clone());
        Ok(TaskHandle(format!("unit.{:06}", submitted.len())))
    }

    fn wait(&self, handles: &[TaskHandle]) -> Result<Vec<TaskReport>> {
        let submitted = self.submitted.borrow();
        handles
            .iter()
            .map(|handle| {
                let index = Self::index(handle)?;
                let task = submitted
                    .get(index - 1)
                    .ok_or_else(|| anyhow!("unknown handle {handle}"))?;
                let failed = self.failing.contains(&task.name);
                let start = Utc
                    .timestamp_opt(1_700_000_000 + index as i64 * 60, 0)
                    .single()
                    .expect("timestamp");
                let last = if failed { "Failed" } else { "Done" };
                Ok(TaskReport {
                    handle: handle.clone(),
                    state: if failed {
                        TaskState::Failed
                    } else {
                        TaskState::Done
                    },
                    working_directory: format!("file://localhost/scratch/{handle}"),
                    stderr: failed.then(|| format!("{} exited 1", task.name)),
                    history: vec![
                        StateTransition {
                            state: "Executing".to_string(),
                            timestamp: start,
                        },
                        StateTransition {
                            state: last.to_string(),
                            timestamp: start + TimeDelta::seconds(30),
                        },
                    ],
                })
            })
            .collect()
    }
}
