//! Simulation-analysis loop driver over a [`Backend`].
//!
//! Every kernel is a barrier: all of its instances are submitted, waited on,
//! and checked before the next kernel starts. A phase publishes its working
//! directories only after its last kernel succeeds, so tasks of the next
//! phase always resolve against a complete snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::registry::{SharedRegistry, WorkingDirectoryRegistry};
use crate::core::resolver::Resolver;
use crate::core::staging::build_task_staging;
use crate::core::types::{Coordinate, ExecutionContext, Phase};
use crate::io::backend::{Backend, TaskReport, ensure_all_done, submit_and_wait};
use crate::io::profile::{Probe, ProfilePaths, ProfileRecorder, ProfileStep};
use crate::io::registry_store::write_registry;
use crate::io::workflow::{KernelConfig, WorkflowConfig};

#[derive(Debug, Clone, Default)]
pub struct LoopOptions {
    /// Write profiling CSVs here once the loop completes.
    pub profile_dir: Option<PathBuf>,
    /// Rewrite the registry snapshot here after every publish.
    pub registry_path: Option<PathBuf>,
}

/// Progress notification passed to the `run_loop` callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    PreLoopCompleted { working_directory: String },
    PhaseCompleted { iteration: u32, phase: Phase, tasks: usize },
    PostLoopCompleted { working_directory: String },
}

#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub iterations_completed: u32,
    pub tasks_submitted: usize,
    pub registry: Arc<WorkingDirectoryRegistry>,
    pub profile: Option<ProfilePaths>,
}

/// Run the optional pre-loop task, every iteration, then the optional post-loop task.
///
/// Stops at the first error; nothing after a failed kernel is submitted.
#[instrument(skip_all, fields(iterations = workflow.iterations))]
pub fn run_loop<B: Backend, F: FnMut(&LoopEvent)>(
    workflow: &WorkflowConfig,
    backend: &B,
    options: &LoopOptions,
    mut on_event: F,
) -> Result<LoopOutcome> {
    let mut run = LoopRun {
        workflow,
        backend,
        registry: SharedRegistry::default(),
        registry_path: options.registry_path.as_deref(),
        profile: ProfileRecorder::new(),
        tasks_submitted: 0,
    };

    if let Some(kernel) = &workflow.pre_loop {
        let working_directory = run.boundary(kernel, ProfileStep::PreLoop, Coordinate::PreLoop)?;
        on_event(&LoopEvent::PreLoopCompleted { working_directory });
    }

    let mut iterations_completed = 0;
    for iteration in 1..=workflow.iterations {
        for phase in [Phase::Simulation, Phase::Analysis] {
            let tasks = run.phase(iteration, phase)?;
            on_event(&LoopEvent::PhaseCompleted {
                iteration,
                phase,
                tasks,
            });
        }
        iterations_completed = iteration;
    }

    if let Some(kernel) = &workflow.post_loop {
        let working_directory =
            run.boundary(kernel, ProfileStep::PostLoop, Coordinate::PostLoop)?;
        on_event(&LoopEvent::PostLoopCompleted { working_directory });
    }

    let profile = match &options.profile_dir {
        Some(dir) => Some(run.profile.write(dir)?),
        None => None,
    };
    info!(
        iterations_completed,
        tasks = run.tasks_submitted,
        "loop complete"
    );
    Ok(LoopOutcome {
        iterations_completed,
        tasks_submitted: run.tasks_submitted,
        registry: run.registry.snapshot(),
        profile,
    })
}

/// Name the backend sees for one loop task.
pub fn task_name(phase: Phase, iteration: u32, instance: u32) -> String {
    match phase {
        Phase::Simulation => format!("sim ;{iteration} ;{instance}"),
        Phase::Analysis => format!("ana ;{iteration} ;{instance}"),
    }
}

struct LoopRun<'a, B> {
    workflow: &'a WorkflowConfig,
    backend: &'a B,
    registry: SharedRegistry,
    registry_path: Option<&'a Path>,
    profile: ProfileRecorder,
    tasks_submitted: usize,
}

impl<B: Backend> LoopRun<'_, B> {
    /// Run the pre- or post-loop task and record its working directory.
    fn boundary(
        &mut self,
        kernel: &KernelConfig,
        step: ProfileStep,
        coordinate: Coordinate,
    ) -> Result<String> {
        let context = match coordinate {
            Coordinate::PostLoop => self.workflow.post_loop_context(),
            _ => self.workflow.pre_loop_context(),
        };
        let name = coordinate.to_string();
        let reports = self.kernel(kernel, step, None, vec![(name, context)])?;
        let location = reports
            .first()
            .map(|report| report.working_directory.clone())
            .with_context(|| format!("{coordinate}: backend returned no report"))?;
        self.registry
            .publish(coordinate, &location)
            .with_context(|| format!("publish {coordinate}"))?;
        self.persist_registry()?;
        info!(%coordinate, working_directory = %location, "boundary task complete");
        Ok(location)
    }

    fn persist_registry(&self) -> Result<()> {
        match self.registry_path {
            Some(path) => write_registry(path, &self.registry.snapshot()),
            None => Ok(()),
        }
    }

    /// Run every kernel of one phase, then publish the last kernel's directories.
    #[instrument(skip(self))]
    fn phase(&mut self, iteration: u32, phase: Phase) -> Result<usize> {
        let workflow = self.workflow;
        let config = workflow.phase(phase);
        let step = match phase {
            Phase::Simulation => ProfileStep::Simulation,
            Phase::Analysis => ProfileStep::Analysis,
        };

        let mut tasks = 0;
        let mut last = Vec::new();
        for kernel in &config.kernels {
            let contexts = (1..=kernel.instances(config.width))
                .map(|instance| {
                    (
                        task_name(phase, iteration, instance),
                        workflow.context(phase, iteration, instance),
                    )
                })
                .collect();
            last = self.kernel(kernel, step, Some(iteration), contexts)?;
            tasks += last.len();
        }

        let locations = (1u32..).zip(
            last.iter()
                .map(|report| report.working_directory.as_str()),
        );
        self.registry
            .publish_phase(iteration, phase, locations)
            .with_context(|| format!("publish iteration {iteration} {phase}"))?;
        self.persist_registry()?;
        info!(iteration, tasks, "phase complete");
        Ok(tasks)
    }

    /// Build, submit, and await one kernel's instances against the current snapshot.
    fn kernel(
        &mut self,
        kernel: &KernelConfig,
        step: ProfileStep,
        iteration: Option<u32>,
        contexts: Vec<(String, ExecutionContext)>,
    ) -> Result<Vec<TaskReport>> {
        self.profile.probe(iteration, step, &kernel.name, Probe::Start);
        let snapshot = self.registry.snapshot();
        let resolver = Resolver::new(&snapshot).strict(self.workflow.strict_placeholders);
        let directives = kernel.directives();

        let mut tasks = Vec::with_capacity(contexts.len());
        for (name, context) in contexts {
            let staging = build_task_staging(&directives, &context, &resolver)
                .with_context(|| format!("build staging for '{name}' ({})", kernel.name))?;
            debug!(
                name = %name,
                inputs = staging.input.len(),
                outputs = staging.output.len(),
                "task staged"
            );
            tasks.push(kernel.describe(name, staging));
        }

        self.profile.probe(iteration, step, &kernel.name, Probe::Wait);
        let reports = submit_and_wait(self.backend, &tasks)?;
        self.tasks_submitted += tasks.len();
        self.profile.probe(iteration, step, &kernel.name, Probe::Res);

        for report in &reports {
            self.profile.task(iteration, step, report);
        }
        let label = match iteration {
            Some(iteration) => format!("iteration {iteration} {} ({})", step.as_str(), kernel.name),
            None => format!("{} ({})", step.as_str(), kernel.name),
        };
        ensure_all_done(&label, &reports)?;
        self.profile.probe(iteration, step, &kernel.name, Probe::Stop);
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::backend::TaskFailedError;
    use crate::io::registry_store::load_registry;
    use crate::io::workflow::{PathList, PhaseConfig};
    use crate::test_support::ScriptedBackend;

    fn kernel(name: &str) -> KernelConfig {
        KernelConfig {
            name: name.to_string(),
            ..KernelConfig::default()
        }
    }

    fn workflow(iterations: u32, width: u32) -> WorkflowConfig {
        WorkflowConfig {
            iterations,
            strict_placeholders: false,
            simulation: PhaseConfig {
                width,
                kernels: vec![KernelConfig {
                    link_input: PathList::One("$PREV_ANALYSIS/restart.rst".to_string()),
                    ..kernel("md")
                }],
            },
            analysis: PhaseConfig {
                width,
                kernels: vec![KernelConfig {
                    copy_input: PathList::One("$PREV_SIMULATION/traj.dcd".to_string()),
                    ..kernel("cluster")
                }],
            },
            pre_loop: None,
            post_loop: None,
        }
    }

    #[test]
    fn task_names_carry_iteration_and_instance() {
        assert_eq!(task_name(Phase::Simulation, 2, 3), "sim ;2 ;3");
        assert_eq!(task_name(Phase::Analysis, 1, 4), "ana ;1 ;4");
    }

    #[test]
    fn first_iteration_cannot_reference_previous_analysis() {
        let backend = ScriptedBackend::new();
        let err = run_loop(&workflow(1, 1), &backend, &LoopOptions::default(), |_| {})
            .expect_err("no previous analysis");
        let message = format!("{err:#}");
        assert!(message.contains("sim ;1 ;1"), "{message}");
        assert!(message.contains("$PREV_ANALYSIS"), "{message}");
        assert!(backend.submitted().is_empty());
    }

    #[test]
    fn phases_publish_after_their_barrier() {
        let mut config = workflow(2, 2);
        config.simulation.kernels[0].link_input = PathList::default();
        let backend = ScriptedBackend::new();
        let mut events = Vec::new();

        let outcome = run_loop(&config, &backend, &LoopOptions::default(), |event| {
            events.push(event.clone());
        })
        .expect("loop");

        assert_eq!(outcome.iterations_completed, 2);
        assert_eq!(outcome.tasks_submitted, 8);
        assert_eq!(outcome.registry.len(), 8);
        assert_eq!(
            events[1],
            LoopEvent::PhaseCompleted {
                iteration: 1,
                phase: Phase::Analysis,
                tasks: 2,
            }
        );

        // Analysis instance k reads simulation instance k of the same iteration.
        let submitted = backend.submitted();
        let ana = submitted
            .iter()
            .find(|task| task.name == "ana ;2 ;2")
            .expect("ana task");
        let sim_dir = outcome
            .registry
            .get(&Coordinate::task(2, Phase::Simulation, 2))
            .expect("sim dir");
        assert_eq!(ana.input_staging[0].source, format!("{sim_dir}/traj.dcd"));
    }

    #[test]
    fn registry_snapshot_is_written_after_each_publish() {
        let mut config = workflow(1, 1);
        config.simulation.kernels[0].link_input = PathList::default();
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state").join("registry.json");
        let options = LoopOptions {
            registry_path: Some(path.clone()),
            ..LoopOptions::default()
        };
        let backend = ScriptedBackend::new().failing("ana ;1 ;1");

        run_loop(&config, &backend, &options, |_| {}).expect_err("analysis fails");

        // The simulation phase was published before analysis failed.
        let saved = load_registry(&path).expect("load");
        assert_eq!(saved.len(), 1);
        assert_eq!(
            saved.get(&Coordinate::task(1, Phase::Simulation, 1)),
            Some("/scratch/unit.000001")
        );
    }

    #[test]
    fn failed_task_stops_the_loop() {
        let mut config = workflow(2, 1);
        config.simulation.kernels[0].link_input = PathList::default();
        let backend = ScriptedBackend::new().failing("ana ;1 ;1");

        let err = run_loop(&config, &backend, &LoopOptions::default(), |_| {}).expect_err("fail");
        let failed = err.downcast_ref::<TaskFailedError>().expect("typed");
        assert_eq!(failed.step, "iteration 1 ana (cluster)");
        assert_eq!(backend.submitted().len(), 2);
    }
}
