//! Offline staging for `simloop plan` and `simloop check`.
//!
//! Nothing here talks to a backend: `plan_task` resolves one task against a
//! registry snapshot loaded from disk, and `check_workflow` dry-runs the whole
//! loop against synthetic working directories.

use anyhow::{Context, Result, bail};

use crate::core::registry::WorkingDirectoryRegistry;
use crate::core::resolver::Resolver;
use crate::core::staging::build_task_staging;
use crate::core::types::{Coordinate, ExecutionContext, Phase};
use crate::io::backend::TaskDescription;
use crate::io::workflow::{KernelConfig, PhaseConfig, WorkflowConfig};
use crate::orchestrator::task_name;

/// Root of the fake working directories used by `check_workflow`.
pub const DRY_RUN_ROOT: &str = "/dry-run";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStep {
    PreLoop,
    Simulation,
    Analysis,
    PostLoop,
}

/// Which task to plan. `iteration`, `instance`, and `kernel` only matter
/// for simulation and analysis steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub step: PlanStep,
    pub iteration: u32,
    pub instance: u32,
    pub kernel: Option<String>,
}

/// Resolve the staging of one task against `registry`.
pub fn plan_task(
    workflow: &WorkflowConfig,
    registry: &WorkingDirectoryRegistry,
    request: &PlanRequest,
) -> Result<TaskDescription> {
    let (name, kernel, context) = match request.step {
        PlanStep::PreLoop => (
            Coordinate::PreLoop.to_string(),
            workflow
                .pre_loop
                .as_ref()
                .context("workflow has no pre_loop kernel")?,
            workflow.pre_loop_context(),
        ),
        PlanStep::PostLoop => (
            Coordinate::PostLoop.to_string(),
            workflow
                .post_loop
                .as_ref()
                .context("workflow has no post_loop kernel")?,
            workflow.post_loop_context(),
        ),
        PlanStep::Simulation => phase_task(workflow, Phase::Simulation, request)?,
        PlanStep::Analysis => phase_task(workflow, Phase::Analysis, request)?,
    };

    let resolver = Resolver::new(registry).strict(workflow.strict_placeholders);
    let staging = build_task_staging(&kernel.directives(), &context, &resolver)
        .with_context(|| format!("build staging for '{name}' ({})", kernel.name))?;
    Ok(kernel.describe(name, staging))
}

fn phase_task<'w>(
    workflow: &'w WorkflowConfig,
    phase: Phase,
    request: &PlanRequest,
) -> Result<(String, &'w KernelConfig, ExecutionContext)> {
    if request.iteration == 0 || request.iteration > workflow.iterations {
        bail!(
            "iteration {} outside 1..={}",
            request.iteration,
            workflow.iterations
        );
    }
    let config = workflow.phase(phase);
    let kernel = select_kernel(config, phase, request.kernel.as_deref())?;
    let instances = kernel.instances(config.width);
    if request.instance == 0 || request.instance > instances {
        bail!(
            "{phase} kernel '{}' has instances 1..={instances}, not {}",
            kernel.name,
            request.instance
        );
    }
    Ok((
        task_name(phase, request.iteration, request.instance),
        kernel,
        workflow.context(phase, request.iteration, request.instance),
    ))
}

fn select_kernel<'w>(
    config: &'w PhaseConfig,
    phase: Phase,
    name: Option<&str>,
) -> Result<&'w KernelConfig> {
    match name {
        Some(name) => config
            .kernels
            .iter()
            .find(|kernel| kernel.name == name)
            .with_context(|| format!("{phase} has no kernel named '{name}'")),
        None => match config.kernels.as_slice() {
            [only] => Ok(only),
            kernels => bail!(
                "{phase} declares {} kernels; name one explicitly",
                kernels.len()
            ),
        },
    }
}

/// Dry-run every task of the loop and report each staging failure.
///
/// Working directories are synthetic (`/dry-run/<coordinate>`) and are
/// published in the same order the loop would publish them, so a reference
/// to a step that has not run yet is reported exactly as it would fail live.
pub fn check_workflow(workflow: &WorkflowConfig) -> Vec<String> {
    let mut registry = WorkingDirectoryRegistry::new();
    let mut problems = Vec::new();

    if let Some(kernel) = &workflow.pre_loop {
        let context = workflow.pre_loop_context();
        let name = Coordinate::PreLoop.to_string();
        check_task(workflow, &registry, name, kernel, &context, &mut problems);
        publish(&mut registry, Coordinate::PreLoop, &mut problems);
    }

    for iteration in 1..=workflow.iterations {
        for phase in [Phase::Simulation, Phase::Analysis] {
            let config = workflow.phase(phase);
            let mut published = 0;
            for kernel in &config.kernels {
                published = kernel.instances(config.width);
                for instance in 1..=published {
                    let context = workflow.context(phase, iteration, instance);
                    let name = task_name(phase, iteration, instance);
                    check_task(workflow, &registry, name, kernel, &context, &mut problems);
                }
            }
            let locations = (1..=published).map(|instance| {
                (instance, synthetic_dir(Coordinate::task(iteration, phase, instance)))
            });
            match registry.with_phase(iteration, phase, locations) {
                Ok(next) => registry = next,
                Err(err) => problems.push(format!("iteration {iteration} {phase}: {err}")),
            }
        }
    }

    if let Some(kernel) = &workflow.post_loop {
        let context = workflow.post_loop_context();
        let name = Coordinate::PostLoop.to_string();
        check_task(workflow, &registry, name, kernel, &context, &mut problems);
    }
    problems
}

fn check_task(
    workflow: &WorkflowConfig,
    registry: &WorkingDirectoryRegistry,
    name: String,
    kernel: &KernelConfig,
    context: &ExecutionContext,
    problems: &mut Vec<String>,
) {
    let resolver = Resolver::new(registry).strict(workflow.strict_placeholders);
    if let Err(err) = build_task_staging(&kernel.directives(), context, &resolver) {
        let err = anyhow::Error::new(err);
        problems.push(format!("{name} ({}): {err:#}", kernel.name));
    }
}

fn publish(
    registry: &mut WorkingDirectoryRegistry,
    coordinate: Coordinate,
    problems: &mut Vec<String>,
) {
    if let Err(err) = registry.publish(coordinate, &synthetic_dir(coordinate)) {
        problems.push(format!("{coordinate}: {err}"));
    }
}

fn synthetic_dir(coordinate: Coordinate) -> String {
    format!("{DRY_RUN_ROOT}/{coordinate}")
}
