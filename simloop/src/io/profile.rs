//! Execution profiling dumps (`pattern_overhead.csv`, `execution_profile.csv`).
//!
//! Probes mark the orchestrator's own overhead around each kernel; task rows
//! carry the backend-reported state history of every submitted task.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::io::backend::{StateTransition, TaskReport};

/// Point in a kernel's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Before descriptors are built.
    Start,
    /// Tasks built, about to submit.
    Wait,
    /// All tasks terminal.
    Res,
    /// Results processed.
    Stop,
}

impl Probe {
    pub fn as_str(self) -> &'static str {
        match self {
            Probe::Start => "start_time",
            Probe::Wait => "wait_time",
            Probe::Res => "res_time",
            Probe::Stop => "stop_time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileStep {
    PreLoop,
    Simulation,
    Analysis,
    PostLoop,
}

impl ProfileStep {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileStep::PreLoop => "pre_loop",
            ProfileStep::Simulation => "sim",
            ProfileStep::Analysis => "ana",
            ProfileStep::PostLoop => "post_loop",
        }
    }
}

#[derive(Debug, Clone)]
struct ProbeRecord {
    iteration: Option<u32>,
    step: ProfileStep,
    kernel: String,
    probe: Probe,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct TaskRecord {
    uid: String,
    iteration: Option<u32>,
    step: ProfileStep,
    history: Vec<StateTransition>,
}

#[derive(Debug, Clone)]
pub struct ProfilePaths {
    pub overhead_path: PathBuf,
    pub execution_path: PathBuf,
}

impl ProfilePaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            overhead_path: dir.join("pattern_overhead.csv"),
            execution_path: dir.join("execution_profile.csv"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileRecorder {
    probes: Vec<ProbeRecord>,
    tasks: Vec<TaskRecord>,
}

impl ProfileRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&mut self, iteration: Option<u32>, step: ProfileStep, kernel: &str, probe: Probe) {
        self.probes.push(ProbeRecord {
            iteration,
            step,
            kernel: kernel.to_string(),
            probe,
            timestamp: Utc::now(),
        });
    }

    pub fn task(&mut self, iteration: Option<u32>, step: ProfileStep, report: &TaskReport) {
        self.tasks.push(TaskRecord {
            uid: report.handle.to_string(),
            iteration,
            step,
            history: report.history.clone(),
        });
    }

    pub fn probe_count(&self) -> usize {
        self.probes.len()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Write both CSV files into `dir`.
    pub fn write(&self, dir: &Path) -> Result<ProfilePaths> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create profile dir {}", dir.display()))?;
        let paths = ProfilePaths::new(dir);
        self.write_overhead(&paths.overhead_path)?;
        self.write_execution(&paths.execution_path)?;
        debug!(
            probes = self.probes.len(),
            tasks = self.tasks.len(),
            dir = %dir.display(),
            "profile written"
        );
        Ok(paths)
    }

    fn write_overhead(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("create {}", path.display()))?;
        writer.write_record(["iteration", "step", "kernel", "probe", "timestamp"])?;
        for record in &self.probes {
            writer.write_record([
                iteration_cell(record.iteration),
                record.step.as_str().to_string(),
                record.kernel.clone(),
                record.probe.as_str().to_string(),
                timestamp_cell(&record.timestamp),
            ])?;
        }
        writer
            .flush()
            .with_context(|| format!("write {}", path.display()))
    }

    fn write_execution(&self, path: &Path) -> Result<()> {
        let states = self.observed_states();
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("create {}", path.display()))?;

        let mut header = vec!["uid".to_string(), "iteration".to_string(), "step".to_string()];
        header.extend(states.iter().cloned());
        writer.write_record(&header)?;

        for task in &self.tasks {
            let mut row = vec![
                task.uid.clone(),
                iteration_cell(task.iteration),
                task.step.as_str().to_string(),
            ];
            for state in &states {
                // Last entry wins when a backend reports a state twice.
                let cell = task
                    .history
                    .iter()
                    .rev()
                    .find(|transition| &transition.state == state)
                    .map(|transition| timestamp_cell(&transition.timestamp))
                    .unwrap_or_default();
                row.push(cell);
            }
            writer.write_record(&row)?;
        }
        writer
            .flush()
            .with_context(|| format!("write {}", path.display()))
    }

    /// Backend state names in first-seen order.
    fn observed_states(&self) -> Vec<String> {
        let mut states: Vec<String> = Vec::new();
        for transition in self.tasks.iter().flat_map(|task| task.history.iter()) {
            if !states.contains(&transition.state) {
                states.push(transition.state.clone());
            }
        }
        states
    }
}

fn iteration_cell(iteration: Option<u32>) -> String {
    iteration.map(|i| i.to_string()).unwrap_or_default()
}

fn timestamp_cell(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}
