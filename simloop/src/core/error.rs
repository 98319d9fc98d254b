//! Typed failures raised while resolving placeholders and building staging.

use std::fmt;

use thiserror::Error;

use crate::core::types::{Category, Coordinate, Direction, Phase};

/// Context rule a placeholder violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderRule {
    /// Same-instance back-references need one-to-one instances.
    WidthMismatch { simulation: u32, analysis: u32 },
    WrongPhase { allowed: Phase, actual: Phase },
    IterationTooEarly { minimum: u32, actual: u32 },
}

impl fmt::Display for PlaceholderRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaceholderRule::WidthMismatch {
                simulation,
                analysis,
            } => write!(
                f,
                "simulation width ({simulation}) and analysis width ({analysis}) must be identical"
            ),
            PlaceholderRule::WrongPhase { allowed, actual } => write!(
                f,
                "can only be referenced within the {allowed} phase, not {actual}"
            ),
            PlaceholderRule::IterationTooEarly { minimum, actual } => write!(
                f,
                "requires iteration >= {minimum}, current iteration is {actual}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Token used where the execution context does not allow it.
    #[error("placeholder {token} {rule}")]
    Placeholder { token: String, rule: PlaceholderRule },

    /// Token is legal but the referenced task never published a working directory.
    #[error("placeholder {token} refers to {coordinate}, which has no working directory")]
    UnresolvedReference {
        token: String,
        coordinate: Coordinate,
    },

    #[error("malformed placeholder {token}: {reason}")]
    MalformedExpression { token: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StagingError {
    #[error("cannot resolve '{expression}'")]
    Resolve {
        expression: String,
        #[source]
        source: ResolveError,
    },

    #[error("{category} directives are not supported for {direction} staging")]
    UnsupportedDirective {
        category: Category,
        direction: Direction,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Entries are append-only.
    #[error("working directory for {0} is already published")]
    DuplicateEntry(Coordinate),

    #[error("invalid coordinate {0}: iteration and instance are 1-based")]
    InvalidCoordinate(Coordinate),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_error_keeps_resolve_source() {
        let err = StagingError::Resolve {
            expression: "$PREV_SIMULATION/out.dat".to_string(),
            source: ResolveError::Placeholder {
                token: "$PREV_SIMULATION".to_string(),
                rule: PlaceholderRule::WrongPhase {
                    allowed: Phase::Analysis,
                    actual: Phase::Simulation,
                },
            },
        };
        let chained = format!("{:#}", anyhow::Error::new(err));
        assert_eq!(
            chained,
            "cannot resolve '$PREV_SIMULATION/out.dat': placeholder $PREV_SIMULATION can only be referenced within the analysis phase, not simulation"
        );
    }
}
