//! Shared deterministic types for placeholder resolution and staging.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the two roles inside an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Simulation,
    Analysis,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Simulation => "simulation",
            Phase::Analysis => "analysis",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry key for a completed task.
///
/// Ordering is `PreLoop`, then tasks by `(iteration, phase, instance)`, then
/// `PostLoop`, which keeps serialized registries stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Coordinate {
    PreLoop,
    Task {
        iteration: u32,
        phase: Phase,
        instance: u32,
    },
    PostLoop,
}

impl Coordinate {
    pub fn task(iteration: u32, phase: Phase, instance: u32) -> Self {
        Coordinate::Task {
            iteration,
            phase,
            instance,
        }
    }

    /// Iteration and instance numbers are 1-based.
    pub fn is_valid(&self) -> bool {
        match self {
            Coordinate::PreLoop | Coordinate::PostLoop => true,
            Coordinate::Task {
                iteration,
                instance,
                ..
            } => *iteration >= 1 && *instance >= 1,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coordinate::PreLoop => f.write_str("pre_loop"),
            Coordinate::PostLoop => f.write_str("post_loop"),
            Coordinate::Task {
                iteration,
                phase,
                instance,
            } => write!(f, "iteration_{iteration}/{phase}_{instance}"),
        }
    }
}

impl FromStr for Coordinate {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pre_loop" => return Ok(Coordinate::PreLoop),
            "post_loop" => return Ok(Coordinate::PostLoop),
            _ => {}
        }
        let invalid = || format!("invalid coordinate '{raw}'");
        let (iteration, task) = raw.split_once('/').ok_or_else(invalid)?;
        let iteration = iteration
            .strip_prefix("iteration_")
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        let (phase, instance) = task.rsplit_once('_').ok_or_else(invalid)?;
        let phase = match phase {
            "simulation" => Phase::Simulation,
            "analysis" => Phase::Analysis,
            _ => return Err(invalid()),
        };
        let instance = instance.parse::<u32>().map_err(|_| invalid())?;
        let coordinate = Coordinate::task(iteration, phase, instance);
        if !coordinate.is_valid() {
            return Err(format!("{}: iteration and instance are 1-based", invalid()));
        }
        Ok(coordinate)
    }
}

impl TryFrom<String> for Coordinate {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Coordinate> for String {
    fn from(coordinate: Coordinate) -> Self {
        coordinate.to_string()
    }
}

/// Where the task being built sits in the run.
///
/// Built per task and discarded after submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    pub phase: Phase,
    /// Current iteration (1-based).
    pub iteration: u32,
    /// Instance whose task is being built (1-based).
    pub instance: u32,
    pub simulation_width: u32,
    pub analysis_width: u32,
}

impl ExecutionContext {
    pub fn widths_match(&self) -> bool {
        self.simulation_width == self.analysis_width
    }
}

/// Data-movement category of a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Upload,
    Link,
    Copy,
    Download,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Upload => "upload",
            Category::Link => "link",
            Category::Copy => "copy",
            Category::Download => "download",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Input => "input",
            Direction::Output => "output",
        })
    }
}

/// Backend action carried by link and copy descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingAction {
    Link,
    Copy,
}

/// Submission-ready transfer record.
///
/// Entries without `action` are uploads (input) or downloads (output).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingDescriptor {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<StagingAction>,
}

/// Input and output descriptors for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStaging {
    pub input: Vec<StagingDescriptor>,
    pub output: Vec<StagingDescriptor>,
}
