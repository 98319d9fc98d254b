//! Classification of placeholder text into [`PlaceholderToken`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::error::ResolveError;
use crate::core::types::{Coordinate, ExecutionContext, Phase};

pub const PRE_LOOP: &str = "$PRE_LOOP";
pub const POST_LOOP: &str = "$POST_LOOP";
pub const PREV_SIMULATION: &str = "$PREV_SIMULATION";
pub const PREV_ANALYSIS: &str = "$PREV_ANALYSIS";

const INDEXED_PREFIXES: [(&str, &str); 4] = [
    ("$PREV_SIMULATION_INSTANCE_", "$PREV_SIMULATION_INSTANCE_<y>"),
    ("$PREV_ANALYSIS_INSTANCE_", "$PREV_ANALYSIS_INSTANCE_<y>"),
    (
        "$SIMULATION_ITERATION_",
        "$SIMULATION_ITERATION_<x>_INSTANCE_<y>",
    ),
    ("$ANALYSIS_ITERATION_", "$ANALYSIS_ITERATION_<x>_INSTANCE_<y>"),
];

static PREV_INSTANCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$PREV_(SIMULATION|ANALYSIS)_INSTANCE_(\d+)$").expect("valid regex")
});

static ITERATION_INSTANCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$(SIMULATION|ANALYSIS)_ITERATION_(\d+)_INSTANCE_(\d+)$").expect("valid regex")
});

/// Recognized symbolic back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceholderToken {
    PreLoop,
    PostLoop,
    /// Same instance of the simulation phase in the current iteration.
    PrevSimulation,
    /// Same instance of the analysis phase in the previous iteration.
    PrevAnalysis,
    PrevSimulationInstance(u32),
    PrevAnalysisInstance(u32),
    SimulationAt { iteration: u32, instance: u32 },
    AnalysisAt { iteration: u32, instance: u32 },
}

impl PlaceholderToken {
    /// Registry entry this token points at from `context`.
    pub fn coordinate(&self, context: &ExecutionContext) -> Coordinate {
        let previous = context.iteration.saturating_sub(1);
        match *self {
            PlaceholderToken::PreLoop => Coordinate::PreLoop,
            PlaceholderToken::PostLoop => Coordinate::PostLoop,
            PlaceholderToken::PrevSimulation => {
                Coordinate::task(context.iteration, Phase::Simulation, context.instance)
            }
            PlaceholderToken::PrevAnalysis => {
                Coordinate::task(previous, Phase::Analysis, context.instance)
            }
            PlaceholderToken::PrevSimulationInstance(instance) => {
                Coordinate::task(context.iteration, Phase::Simulation, instance)
            }
            PlaceholderToken::PrevAnalysisInstance(instance) => {
                Coordinate::task(previous, Phase::Analysis, instance)
            }
            PlaceholderToken::SimulationAt {
                iteration,
                instance,
            } => Coordinate::task(iteration, Phase::Simulation, instance),
            PlaceholderToken::AnalysisAt {
                iteration,
                instance,
            } => Coordinate::task(iteration, Phase::Analysis, instance),
        }
    }
}

impl fmt::Display for PlaceholderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaceholderToken::PreLoop => f.write_str(PRE_LOOP),
            PlaceholderToken::PostLoop => f.write_str(POST_LOOP),
            PlaceholderToken::PrevSimulation => f.write_str(PREV_SIMULATION),
            PlaceholderToken::PrevAnalysis => f.write_str(PREV_ANALYSIS),
            PlaceholderToken::PrevSimulationInstance(y) => {
                write!(f, "$PREV_SIMULATION_INSTANCE_{y}")
            }
            PlaceholderToken::PrevAnalysisInstance(y) => write!(f, "$PREV_ANALYSIS_INSTANCE_{y}"),
            PlaceholderToken::SimulationAt {
                iteration,
                instance,
            } => write!(f, "$SIMULATION_ITERATION_{iteration}_INSTANCE_{instance}"),
            PlaceholderToken::AnalysisAt {
                iteration,
                instance,
            } => write!(f, "$ANALYSIS_ITERATION_{iteration}_INSTANCE_{instance}"),
        }
    }
}

/// Classify leading placeholder text.
///
/// Returns `Ok(None)` for `$` text that matches no known form. Text that starts
/// with a known indexed prefix but has a bad index is malformed.
pub fn classify(text: &str) -> Result<Option<PlaceholderToken>, ResolveError> {
    match text {
        PRE_LOOP => return Ok(Some(PlaceholderToken::PreLoop)),
        POST_LOOP => return Ok(Some(PlaceholderToken::PostLoop)),
        PREV_SIMULATION => return Ok(Some(PlaceholderToken::PrevSimulation)),
        PREV_ANALYSIS => return Ok(Some(PlaceholderToken::PrevAnalysis)),
        _ => {}
    }

    if let Some(caps) = PREV_INSTANCE_RE.captures(text) {
        let instance = index(text, &caps[2])?;
        return Ok(Some(match &caps[1] {
            "SIMULATION" => PlaceholderToken::PrevSimulationInstance(instance),
            _ => PlaceholderToken::PrevAnalysisInstance(instance),
        }));
    }

    if let Some(caps) = ITERATION_INSTANCE_RE.captures(text) {
        let iteration = index(text, &caps[2])?;
        let instance = index(text, &caps[3])?;
        return Ok(Some(match &caps[1] {
            "SIMULATION" => PlaceholderToken::SimulationAt {
                iteration,
                instance,
            },
            _ => PlaceholderToken::AnalysisAt {
                iteration,
                instance,
            },
        }));
    }

    for (prefix, form) in INDEXED_PREFIXES {
        if text.starts_with(prefix) {
            return Err(ResolveError::MalformedExpression {
                token: text.to_string(),
                reason: format!("expected {form} with positive integer indices"),
            });
        }
    }

    Ok(None)
}

fn index(token: &str, digits: &str) -> Result<u32, ResolveError> {
    let malformed = |reason: &str| ResolveError::MalformedExpression {
        token: token.to_string(),
        reason: reason.to_string(),
    };
    let value = digits
        .parse::<u32>()
        .map_err(|_| malformed("index out of range"))?;
    if value == 0 {
        return Err(malformed("indices are 1-based"));
    }
    Ok(value)
}
