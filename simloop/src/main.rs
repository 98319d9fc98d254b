//! Simulation-analysis loop staging tool.
//!
//! Reads a workflow definition (`workflow.toml`) and resolves the data
//! movement of its tasks, either for one task against a recorded registry
//! (`plan`) or for the whole loop as a dry run (`check`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use simloop::core::error::StagingError;
use simloop::core::registry::WorkingDirectoryRegistry;
use simloop::exit_codes;
use simloop::io::registry_store::load_registry;
use simloop::io::workflow::load_workflow;
use simloop::logging;
use simloop::plan::{PlanRequest, PlanStep, check_workflow, plan_task};

#[derive(Parser)]
#[command(
    name = "simloop",
    version,
    about = "Placeholder resolution and data staging for simulation-analysis loops"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved task description (staging included) as JSON.
    Plan {
        /// Workflow definition (TOML).
        workflow: PathBuf,
        /// Registry snapshot (JSON). Defaults to an empty registry.
        #[arg(long)]
        registry: Option<PathBuf>,
        #[arg(long, value_enum)]
        step: StepArg,
        #[arg(long, default_value_t = 1)]
        iteration: u32,
        #[arg(long, default_value_t = 1)]
        instance: u32,
        /// Kernel name, required when the phase declares several.
        #[arg(long)]
        kernel: Option<String>,
    },
    /// Dry-run every task of the workflow and list staging problems.
    Check { workflow: PathBuf },
    /// Inspect registry snapshots.
    Registry {
        #[command(subcommand)]
        command: RegistryCommand,
    },
}

#[derive(Subcommand)]
enum RegistryCommand {
    /// List entries as `<coordinate>\t<path>` in loop order.
    Show { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StepArg {
    PreLoop,
    Simulation,
    Analysis,
    PostLoop,
}

impl From<StepArg> for PlanStep {
    fn from(step: StepArg) -> Self {
        match step {
            StepArg::PreLoop => PlanStep::PreLoop,
            StepArg::Simulation => PlanStep::Simulation,
            StepArg::Analysis => PlanStep::Analysis,
            StepArg::PostLoop => PlanStep::PostLoop,
        }
    }
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Plan {
            workflow,
            registry,
            step,
            iteration,
            instance,
            kernel,
        } => {
            let request = PlanRequest {
                step: step.into(),
                iteration,
                instance,
                kernel,
            };
            cmd_plan(&workflow, registry.as_deref(), &request)
        }
        Command::Check { workflow } => cmd_check(&workflow),
        Command::Registry {
            command: RegistryCommand::Show { path },
        } => cmd_registry_show(&path),
    }
}

fn cmd_plan(
    workflow_path: &Path,
    registry_path: Option<&Path>,
    request: &PlanRequest,
) -> Result<i32> {
    let workflow = load_workflow(workflow_path)?;
    let registry = match registry_path {
        Some(path) => load_registry(path)?,
        None => WorkingDirectoryRegistry::new(),
    };
    let task = plan_task(&workflow, &registry, request)?;
    print_json(&task)?;
    Ok(exit_codes::OK)
}

fn cmd_check(workflow_path: &Path) -> Result<i32> {
    let workflow = load_workflow(workflow_path)?;
    let problems = check_workflow(&workflow);
    if problems.is_empty() {
        return Ok(exit_codes::OK);
    }
    for problem in &problems {
        println!("{problem}");
    }
    Ok(exit_codes::STAGING)
}

fn cmd_registry_show(path: &Path) -> Result<i32> {
    let registry = load_registry(path)?;
    for (coordinate, location) in registry.iter() {
        println!("{coordinate}\t{location}");
    }
    Ok(exit_codes::OK)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.chain().any(|cause| cause.is::<StagingError>()) {
        exit_codes::STAGING
    } else {
        exit_codes::INVALID
    }
}
