//! Workflow definition stored as TOML.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::staging::DataMovementDirective;
use crate::core::types::{Category, Direction, ExecutionContext, Phase, TaskStaging};
use crate::io::backend::TaskDescription;

/// Simulation-analysis loop definition.
///
/// Edited by humans; unknown keys are rejected so typos in directive names
/// do not silently drop data movement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    /// Number of simulation/analysis iterations (1-based, inclusive).
    pub iterations: u32,

    /// Fail on `$` tokens that match no known placeholder.
    #[serde(default)]
    pub strict_placeholders: bool,

    pub simulation: PhaseConfig,
    pub analysis: PhaseConfig,

    #[serde(default)]
    pub pre_loop: Option<KernelConfig>,

    #[serde(default)]
    pub post_loop: Option<KernelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PhaseConfig {
    /// Concurrent instances per iteration, fixed for the run.
    pub width: u32,
    /// Kernels run in sequence; each one is a barrier.
    pub kernels: Vec<KernelConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    pub name: String,
    pub executable: Option<String>,
    pub arguments: Vec<String>,
    pub pre_exec: Vec<String>,
    pub cores: Option<u32>,
    pub mpi: bool,
    /// Run only instance 1 regardless of the phase width.
    pub single_instance: bool,

    pub upload_input: PathList,
    pub link_input: PathList,
    pub copy_input: PathList,
    pub download_input: PathList,
    pub copy_output: PathList,
    pub download_output: PathList,
}

/// A directive given as one expression or a list of expressions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PathList {
    One(String),
    Many(Vec<String>),
}

impl Default for PathList {
    fn default() -> Self {
        PathList::Many(Vec::new())
    }
}

impl PathList {
    pub fn expressions(&self) -> &[String] {
        match self {
            PathList::One(expression) => std::slice::from_ref(expression),
            PathList::Many(expressions) => expressions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.expressions().is_empty()
    }
}

impl KernelConfig {
    /// Declared data movement, in field order.
    pub fn directives(&self) -> Vec<DataMovementDirective> {
        [
            (Category::Upload, Direction::Input, &self.upload_input),
            (Category::Link, Direction::Input, &self.link_input),
            (Category::Copy, Direction::Input, &self.copy_input),
            (Category::Download, Direction::Input, &self.download_input),
            (Category::Copy, Direction::Output, &self.copy_output),
            (Category::Download, Direction::Output, &self.download_output),
        ]
        .into_iter()
        .filter(|(_, _, paths)| !paths.is_empty())
        .map(|(category, direction, paths)| {
            DataMovementDirective::new(category, direction, paths.expressions().iter().cloned())
        })
        .collect()
    }

    /// Number of instances this kernel runs in a phase of `width`.
    pub fn instances(&self, width: u32) -> u32 {
        if self.single_instance { 1 } else { width }
    }

    /// Backend-facing description of one instance of this kernel.
    pub fn describe(&self, name: String, staging: TaskStaging) -> TaskDescription {
        TaskDescription {
            name,
            executable: self.executable.clone(),
            arguments: self.arguments.clone(),
            pre_exec: self.pre_exec.clone(),
            cores: self.cores,
            mpi: self.mpi,
            input_staging: staging.input,
            output_staging: staging.output,
        }
    }

    fn validate(&self, label: &str) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("{label}: kernel name must be non-empty"));
        }
        if self.cores == Some(0) {
            return Err(anyhow!("{label}: cores must be > 0"));
        }
        Ok(())
    }
}

impl WorkflowConfig {
    pub fn phase(&self, phase: Phase) -> &PhaseConfig {
        match phase {
            Phase::Simulation => &self.simulation,
            Phase::Analysis => &self.analysis,
        }
    }

    /// Context for instance `instance` of `phase` in `iteration`.
    pub fn context(&self, phase: Phase, iteration: u32, instance: u32) -> ExecutionContext {
        ExecutionContext {
            phase,
            iteration,
            instance,
            simulation_width: self.simulation.width,
            analysis_width: self.analysis.width,
        }
    }

    /// The pre-loop task resolves as the first simulation instance.
    pub fn pre_loop_context(&self) -> ExecutionContext {
        self.context(Phase::Simulation, 1, 1)
    }

    /// The post-loop task resolves as the first analysis instance of the last iteration.
    pub fn post_loop_context(&self) -> ExecutionContext {
        self.context(Phase::Analysis, self.iterations, 1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(anyhow!("iterations must be > 0"));
        }
        for phase in [Phase::Simulation, Phase::Analysis] {
            let config = self.phase(phase);
            if config.width == 0 {
                return Err(anyhow!("{phase}.width must be > 0"));
            }
            if config.kernels.is_empty() {
                return Err(anyhow!("{phase}.kernels must declare at least one kernel"));
            }
            for (index, kernel) in config.kernels.iter().enumerate() {
                kernel.validate(&format!("{phase}.kernels[{index}]"))?;
            }
        }
        if let Some(kernel) = &self.pre_loop {
            kernel.validate("pre_loop")?;
        }
        if let Some(kernel) = &self.post_loop {
            kernel.validate("post_loop")?;
        }
        Ok(())
    }
}

/// Load and validate a workflow definition.
pub fn load_workflow(path: &Path) -> Result<WorkflowConfig> {
    debug!(path = %path.display(), "loading workflow");
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let workflow: WorkflowConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    workflow
        .validate()
        .with_context(|| format!("validate {}", path.display()))?;
    debug!(
        iterations = workflow.iterations,
        simulation_width = workflow.simulation.width,
        analysis_width = workflow.analysis.width,
        "workflow loaded"
    );
    Ok(workflow)
}
