//! Loop-level tests driving `run_loop` through full workflows.
//!
//! A scripted backend stands in for the execution service; tests assert on
//! the staging every submitted task received and on the final registry.

use std::fs;

use simloop::core::types::{Coordinate, Phase, StagingAction, StagingDescriptor};
use simloop::io::backend::TaskFailedError;
use simloop::io::registry_store::load_registry;
use simloop::io::workflow::{PathList, WorkflowConfig};
use simloop::orchestrator::{LoopEvent, LoopOptions, run_loop};
use simloop::test_support::ScriptedBackend;

const WORKFLOW: &str = r#"
iterations = 2

[simulation]
width = 2

[[simulation.kernels]]
name = "md"
link_input = ["$PRE_LOOP/system.pdb", "$PREV_ANALYSIS/restart.rst > restart.rst"]
download_output = "traj.dcd > results/traj.dcd"

[analysis]
width = 2

[[analysis.kernels]]
name = "cluster"
copy_input = "$PREV_SIMULATION/traj.dcd"

[[analysis.kernels]]
name = "reduce"
single_instance = true
link_input = ["$SIMULATION_ITERATION_1_INSTANCE_2/traj.dcd > first.dcd"]

[pre_loop]
name = "prepare"

[post_loop]
name = "report"
copy_input = "$ANALYSIS_ITERATION_2_INSTANCE_1/restart.rst > final.rst"
"#;

fn link(source: &str, target: &str) -> StagingDescriptor {
    StagingDescriptor {
        source: source.to_string(),
        target: target.to_string(),
        action: Some(StagingAction::Link),
    }
}

fn workflow() -> WorkflowConfig {
    toml::from_str(WORKFLOW).expect("parse workflow")
}

#[test]
fn first_iteration_prev_analysis_is_unresolved() {
    let backend = ScriptedBackend::new();
    let err = run_loop(&workflow(), &backend, &LoopOptions::default(), |_| {})
        .expect_err("iteration 1 has no previous analysis");

    let message = format!("{err:#}");
    assert!(message.contains("iteration_0/analysis_1"), "{message}");
    // Only the pre-loop task ran.
    let names: Vec<String> = backend.submitted().into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["pre_loop"]);
}

#[test]
fn full_loop_resolves_against_completed_phases() {
    let mut workflow = workflow();
    workflow.simulation.kernels[0].link_input = PathList::One("$PRE_LOOP/system.pdb".to_string());
    let backend = ScriptedBackend::new();
    let temp = tempfile::tempdir().expect("tempdir");
    let options = LoopOptions {
        profile_dir: Some(temp.path().join("profile")),
        registry_path: Some(temp.path().join("registry.json")),
    };
    let mut events = Vec::new();

    let outcome = run_loop(&workflow, &backend, &options, |event| events.push(event.clone()))
        .expect("loop");

    // pre_loop + 2 x (2 sim + 2 cluster + 1 reduce) + post_loop
    assert_eq!(outcome.tasks_submitted, 12);
    assert_eq!(outcome.iterations_completed, 2);
    assert_eq!(events.len(), 6);
    assert_eq!(
        events[0],
        LoopEvent::PreLoopCompleted {
            working_directory: "file://localhost/scratch/unit.000001".to_string(),
        }
    );
    assert_eq!(
        events[2],
        LoopEvent::PhaseCompleted {
            iteration: 1,
            phase: Phase::Analysis,
            tasks: 3,
        }
    );

    let submitted = backend.submitted();
    let names: Vec<&str> = submitted.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "pre_loop",
            "sim ;1 ;1",
            "sim ;1 ;2",
            "ana ;1 ;1",
            "ana ;1 ;2",
            "ana ;1 ;1",
            "sim ;2 ;1",
            "sim ;2 ;2",
            "ana ;2 ;1",
            "ana ;2 ;2",
            "ana ;2 ;1",
            "post_loop",
        ]
    );

    // Simulation links the pre-loop directory, path component only.
    assert_eq!(
        submitted[1].input_staging,
        vec![link("/scratch/unit.000001/system.pdb", "system.pdb")]
    );
    assert_eq!(submitted[1].output_staging[0].target, "results/traj.dcd");

    // Analysis instance 2 copies from simulation instance 2 of the same iteration.
    assert_eq!(submitted[4].input_staging[0].source, "/scratch/unit.000003/traj.dcd");
    assert_eq!(submitted[9].input_staging[0].source, "/scratch/unit.000008/traj.dcd");

    // The explicit coordinate always points at iteration 1.
    assert_eq!(
        submitted[10].input_staging,
        vec![link("/scratch/unit.000003/traj.dcd", "first.dcd")]
    );

    // The registry keeps the last kernel of each phase; reduce ran one instance.
    let registry = &outcome.registry;
    assert_eq!(
        registry.get(&Coordinate::task(2, Phase::Analysis, 1)),
        Some("/scratch/unit.000011")
    );
    assert!(!registry.contains(&Coordinate::task(2, Phase::Analysis, 2)));
    assert_eq!(registry.get(&Coordinate::PostLoop), Some("/scratch/unit.000012"));

    // Post-loop reads the final analysis directory.
    assert_eq!(
        submitted[11].input_staging[0].source,
        "/scratch/unit.000011/restart.rst"
    );

    // The persisted snapshot matches the final registry.
    let saved = load_registry(&temp.path().join("registry.json")).expect("saved registry");
    assert_eq!(&saved, &**registry);

    let profile = outcome.profile.expect("profile written");
    let overhead = fs::read_to_string(&profile.overhead_path).expect("overhead csv");
    // Header + four probes for each of the eight kernel runs.
    assert_eq!(overhead.lines().count(), 1 + 4 * 8);
    let execution = fs::read_to_string(&profile.execution_path).expect("execution csv");
    assert_eq!(execution.lines().next(), Some("uid,iteration,step,Executing,Done"));
    assert_eq!(execution.lines().count(), 1 + 12);
}

#[test]
fn failed_units_are_reported_together() {
    let mut workflow = workflow();
    workflow.simulation.kernels[0].link_input = Default::default();
    let backend = ScriptedBackend::new()
        .failing("sim ;1 ;1")
        .failing("sim ;1 ;2");

    let err = run_loop(&workflow, &backend, &LoopOptions::default(), |_| {})
        .expect_err("simulation fails");

    let failed = err.downcast_ref::<TaskFailedError>().expect("typed error");
    assert_eq!(failed.step, "iteration 1 sim (md)");
    assert_eq!(failed.failures.len(), 2);
    assert!(failed.failures[0].contains("sim ;1 ;1 exited 1"));
    // Nothing after the failed barrier was submitted.
    assert_eq!(backend.submitted().len(), 3);
}
