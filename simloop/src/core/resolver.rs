//! Placeholder validation and substitution.
//!
//! Each token kind maps to a fixed list of [`Requirement`]s checked in order
//! against the [`ExecutionContext`]; the first failing requirement is reported.
//! A token that passes is replaced by the registry entry it points at.

use crate::core::error::{PlaceholderRule, ResolveError};
use crate::core::expression::parse;
use crate::core::registry::WorkingDirectoryRegistry;
use crate::core::token::{PlaceholderToken, classify};
use crate::core::types::{ExecutionContext, Phase};

/// Context condition a token needs before it may be substituted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    EqualWidths,
    InPhase(Phase),
    MinIteration(u32),
}

/// Rule table keyed by token kind.
pub fn requirements(token: &PlaceholderToken) -> &'static [Requirement] {
    match token {
        PlaceholderToken::PreLoop | PlaceholderToken::PostLoop => &[],
        PlaceholderToken::PrevSimulation => &[
            Requirement::EqualWidths,
            Requirement::InPhase(Phase::Analysis),
        ],
        PlaceholderToken::PrevAnalysis => &[
            Requirement::EqualWidths,
            Requirement::InPhase(Phase::Simulation),
        ],
        PlaceholderToken::PrevSimulationInstance(_) | PlaceholderToken::SimulationAt { .. } => &[
            Requirement::InPhase(Phase::Analysis),
            Requirement::MinIteration(1),
        ],
        PlaceholderToken::PrevAnalysisInstance(_) => &[
            Requirement::InPhase(Phase::Simulation),
            Requirement::MinIteration(2),
        ],
        PlaceholderToken::AnalysisAt { .. } => &[Requirement::MinIteration(1)],
    }
}

fn check(requirement: Requirement, context: &ExecutionContext) -> Result<(), PlaceholderRule> {
    match requirement {
        Requirement::EqualWidths if !context.widths_match() => Err(PlaceholderRule::WidthMismatch {
            simulation: context.simulation_width,
            analysis: context.analysis_width,
        }),
        Requirement::InPhase(allowed) if context.phase != allowed => {
            Err(PlaceholderRule::WrongPhase {
                allowed,
                actual: context.phase,
            })
        }
        Requirement::MinIteration(minimum) if context.iteration < minimum => {
            Err(PlaceholderRule::IterationTooEarly {
                minimum,
                actual: context.iteration,
            })
        }
        _ => Ok(()),
    }
}

/// Resolves expressions against one registry snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    registry: &'a WorkingDirectoryRegistry,
    strict: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a WorkingDirectoryRegistry) -> Self {
        Self {
            registry,
            strict: false,
        }
    }

    /// Reject unrecognized `$` tokens instead of passing them through.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Substitute the leading placeholder of `expression`.
    ///
    /// Literal expressions and unrecognized tokens (outside strict mode) come
    /// back unchanged. Only the token text is replaced.
    pub fn resolve(
        &self,
        expression: &str,
        context: &ExecutionContext,
    ) -> Result<String, ResolveError> {
        let parsed = parse(expression);
        let Some(leading) = parsed.token else {
            return Ok(expression.to_string());
        };

        let token = match classify(leading.text)? {
            Some(token) => token,
            None if self.strict => {
                return Err(ResolveError::MalformedExpression {
                    token: leading.text.to_string(),
                    reason: "not a recognized placeholder".to_string(),
                });
            }
            None => return Ok(expression.to_string()),
        };

        let location = self.lookup(leading.text, &token, context)?;
        let end = leading.offset + leading.text.len();
        Ok(format!(
            "{}{}{}",
            &expression[..leading.offset],
            location,
            &expression[end..]
        ))
    }

    fn lookup(
        &self,
        text: &str,
        token: &PlaceholderToken,
        context: &ExecutionContext,
    ) -> Result<&'a str, ResolveError> {
        for requirement in requirements(token) {
            check(*requirement, context).map_err(|rule| ResolveError::Placeholder {
                token: text.to_string(),
                rule,
            })?;
        }
        let coordinate = token.coordinate(context);
        self.registry
            .get(&coordinate)
            .ok_or_else(|| ResolveError::UnresolvedReference {
                token: text.to_string(),
                coordinate,
            })
    }
}

/// Resolve `expression` in permissive mode.
pub fn resolve(
    expression: &str,
    context: &ExecutionContext,
    registry: &WorkingDirectoryRegistry,
) -> Result<String, ResolveError> {
    Resolver::new(registry).resolve(expression, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Coordinate;
    use crate::test_support::{context, registry};

    fn campaign() -> WorkingDirectoryRegistry {
        registry(&[
            (Coordinate::PreLoop, "/work/pre"),
            (Coordinate::PostLoop, "/work/post"),
            (Coordinate::task(1, Phase::Simulation, 1), "/work/i1/s1"),
            (Coordinate::task(1, Phase::Simulation, 2), "/work/i1/s2"),
            (Coordinate::task(1, Phase::Analysis, 1), "/work/i1/a1"),
            (Coordinate::task(1, Phase::Analysis, 2), "/work/i1/a2"),
            (Coordinate::task(2, Phase::Simulation, 1), "/work/i2/s1"),
            (Coordinate::task(2, Phase::Simulation, 2), "/work/i2/s2"),
        ])
    }

    #[test]
    fn literal_is_identity() {
        let reg = campaign();
        for expression in ["data/in.dat", "a > b", "", "  spaced  "] {
            let ctx = context(Phase::Analysis, 2, 1, 2, 2);
            assert_eq!(resolve(expression, &ctx, &reg), Ok(expression.to_string()));
        }
    }

    #[test]
    fn pre_loop_resolves_in_any_context() {
        let reg = campaign();
        for ctx in [
            context(Phase::Simulation, 1, 1, 2, 3),
            context(Phase::Analysis, 7, 2, 1, 1),
        ] {
            assert_eq!(
                resolve("$PRE_LOOP/system.pdb", &ctx, &reg),
                Ok("/work/pre/system.pdb".to_string())
            );
        }
    }

    #[test]
    fn prev_simulation_uses_current_instance() {
        let reg = campaign();
        let ctx = context(Phase::Analysis, 2, 2, 2, 2);
        assert_eq!(
            resolve("$PREV_SIMULATION/traj.dcd", &ctx, &reg),
            Ok("/work/i2/s2/traj.dcd".to_string())
        );
    }

    #[test]
    fn prev_simulation_rejected_in_simulation_phase() {
        let reg = campaign();
        let ctx = context(Phase::Simulation, 2, 1, 2, 2);
        let err = resolve("$PREV_SIMULATION/traj.dcd", &ctx, &reg).expect_err("wrong phase");
        assert_eq!(
            err,
            ResolveError::Placeholder {
                token: "$PREV_SIMULATION".to_string(),
                rule: PlaceholderRule::WrongPhase {
                    allowed: Phase::Analysis,
                    actual: Phase::Simulation,
                },
            }
        );
    }

    #[test]
    fn prev_simulation_rejected_with_unequal_widths() {
        let reg = campaign();
        let ctx = context(Phase::Analysis, 2, 1, 2, 1);
        let err = resolve("$PREV_SIMULATION", &ctx, &reg).expect_err("width mismatch");
        assert!(matches!(
            err,
            ResolveError::Placeholder {
                rule: PlaceholderRule::WidthMismatch {
                    simulation: 2,
                    analysis: 1
                },
                ..
            }
        ));
    }

    #[test]
    fn width_checked_before_phase() {
        let reg = campaign();
        let ctx = context(Phase::Simulation, 2, 1, 3, 1);
        let err = resolve("$PREV_ANALYSIS", &ctx, &reg).expect_err("width mismatch");
        assert!(matches!(
            err,
            ResolveError::Placeholder {
                rule: PlaceholderRule::WidthMismatch { .. },
                ..
            }
        ));
    }

    #[test]
    fn prev_analysis_reads_previous_iteration() {
        let reg = campaign();
        let ctx = context(Phase::Simulation, 2, 2, 2, 2);
        assert_eq!(
            resolve("$PREV_ANALYSIS/restart.rst > input.rst", &ctx, &reg),
            Ok("/work/i1/a2/restart.rst > input.rst".to_string())
        );
    }

    #[test]
    fn prev_analysis_in_first_iteration_is_unresolved() {
        let reg = campaign();
        let ctx = context(Phase::Simulation, 1, 1, 2, 2);
        let err = resolve("$PREV_ANALYSIS", &ctx, &reg).expect_err("no iteration 0");
        assert!(matches!(err, ResolveError::UnresolvedReference { .. }));
    }

    #[test]
    fn prev_analysis_instance_requires_second_iteration() {
        let reg = campaign();
        let ctx = context(Phase::Simulation, 1, 1, 2, 2);
        let err = resolve("$PREV_ANALYSIS_INSTANCE_3/x", &ctx, &reg).expect_err("too early");
        assert_eq!(
            err,
            ResolveError::Placeholder {
                token: "$PREV_ANALYSIS_INSTANCE_3".to_string(),
                rule: PlaceholderRule::IterationTooEarly {
                    minimum: 2,
                    actual: 1
                },
            }
        );
    }

    #[test]
    fn prev_simulation_instance_ignores_widths() {
        let reg = campaign();
        let ctx = context(Phase::Analysis, 1, 1, 2, 1);
        assert_eq!(
            resolve("$PREV_SIMULATION_INSTANCE_2/out", &ctx, &reg),
            Ok("/work/i1/s2/out".to_string())
        );
    }

    #[test]
    fn instance_beyond_width_is_unresolved() {
        let reg = campaign();
        let ctx = context(Phase::Analysis, 1, 1, 2, 2);
        let err = resolve("$PREV_SIMULATION_INSTANCE_3", &ctx, &reg).expect_err("out of range");
        assert_eq!(
            err,
            ResolveError::UnresolvedReference {
                token: "$PREV_SIMULATION_INSTANCE_3".to_string(),
                coordinate: Coordinate::task(1, Phase::Simulation, 3),
            }
        );
    }

    #[test]
    fn simulation_at_reads_named_iteration() {
        let reg = campaign();
        let ctx = context(Phase::Analysis, 3, 1, 2, 2);
        assert_eq!(
            resolve("$SIMULATION_ITERATION_2_INSTANCE_1/out.dat", &ctx, &reg),
            Ok("/work/i2/s1/out.dat".to_string())
        );
    }

    #[test]
    fn simulation_at_rejected_in_simulation_phase() {
        let reg = campaign();
        let ctx = context(Phase::Simulation, 3, 1, 2, 2);
        let err = resolve("$SIMULATION_ITERATION_2_INSTANCE_1", &ctx, &reg).expect_err("phase");
        assert!(matches!(err, ResolveError::Placeholder { .. }));
    }

    #[test]
    fn analysis_at_allowed_in_both_phases() {
        let reg = campaign();
        for phase in [Phase::Simulation, Phase::Analysis] {
            let ctx = context(phase, 2, 1, 2, 2);
            assert_eq!(
                resolve("$ANALYSIS_ITERATION_1_INSTANCE_2/stats", &ctx, &reg),
                Ok("/work/i1/a2/stats".to_string())
            );
        }
    }

    #[test]
    fn analysis_at_future_iteration_is_unresolved() {
        let reg = campaign();
        let ctx = context(Phase::Simulation, 2, 1, 2, 2);
        let err = resolve("$ANALYSIS_ITERATION_5_INSTANCE_1", &ctx, &reg).expect_err("future");
        assert!(matches!(err, ResolveError::UnresolvedReference { .. }));
    }

    #[test]
    fn target_side_token_is_replaced_in_place() {
        let reg = campaign();
        let ctx = context(Phase::Analysis, 1, 1, 1, 1);
        assert_eq!(
            resolve("summary.csv > $POST_LOOP/summary.csv", &ctx, &reg),
            Ok("summary.csv > /work/post/summary.csv".to_string())
        );
    }

    #[test]
    fn unknown_token_passes_through_unless_strict() {
        let reg = campaign();
        let ctx = context(Phase::Analysis, 1, 1, 1, 1);
        assert_eq!(
            resolve("$SCRATCH/tmp", &ctx, &reg),
            Ok("$SCRATCH/tmp".to_string())
        );
        let err = Resolver::new(&reg)
            .strict(true)
            .resolve("$SCRATCH/tmp", &ctx)
            .expect_err("strict");
        assert!(matches!(err, ResolveError::MalformedExpression { .. }));
    }

    #[test]
    fn resolution_is_idempotent() {
        let reg = campaign();
        let ctx = context(Phase::Analysis, 2, 1, 2, 2);
        let first = resolve("$PREV_SIMULATION/a", &ctx, &reg);
        let second = resolve("$PREV_SIMULATION/a", &ctx, &reg);
        assert_eq!(first, second);
    }

    #[test]
    fn concurrent_instances_share_one_snapshot() {
        let reg = std::sync::Arc::new(campaign());
        let resolved: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (1..=2)
                .map(|instance| {
                    let reg = std::sync::Arc::clone(&reg);
                    scope.spawn(move || {
                        let ctx = context(Phase::Analysis, 2, instance, 2, 2);
                        resolve("$PREV_SIMULATION/traj", &ctx, &reg).expect("resolve")
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("join"))
                .collect()
        });
        assert_eq!(resolved, vec!["/work/i2/s1/traj", "/work/i2/s2/traj"]);
    }
}
