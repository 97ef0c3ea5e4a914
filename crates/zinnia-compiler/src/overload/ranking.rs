//! Cost-based ranking for overload resolution.
//!
//! Selects the best match from several viable candidates by their
//! conversion costs, with tie-breaking rules.

use zinnia_core::{CompilationError, Span};

use super::{OverloadMatch, format_signature};
use crate::state::CompilerState;

/// Find the best match from viable candidates.
///
/// Selects the candidate with the lowest total conversion cost. If several
/// candidates tie with the same cost, applies tie-breaking rules and fails
/// with `AmbiguousOverload` when they do not decide.
pub fn find_best_match(
    viable: &[OverloadMatch],
    state: &CompilerState,
    span: Span,
) -> Result<OverloadMatch, CompilationError> {
    assert!(!viable.is_empty());

    if viable.len() == 1 {
        return Ok(viable[0].clone());
    }

    let mut sorted: Vec<_> = viable.iter().collect();
    sorted.sort_by_key(|m| m.total_cost);

    let best = sorted[0];
    let second = sorted[1];

    if best.total_cost == second.total_cost {
        if let Some(winner) = break_tie(best, second) {
            return Ok(winner.clone());
        }
        return Err(ambiguous_overload_error(best, second, state, span));
    }

    Ok(best.clone())
}

/// Prefer the candidate with more exact matches.
fn break_tie<'a>(a: &'a OverloadMatch, b: &'a OverloadMatch) -> Option<&'a OverloadMatch> {
    let a_exact = count_exact_matches(a);
    let b_exact = count_exact_matches(b);

    match a_exact.cmp(&b_exact) {
        std::cmp::Ordering::Greater => Some(a),
        std::cmp::Ordering::Less => Some(b),
        std::cmp::Ordering::Equal => None,
    }
}

/// Defaults count as exact.
fn count_exact_matches(m: &OverloadMatch) -> usize {
    m.arg_conversions
        .iter()
        .filter(|c| c.as_ref().is_none_or(|conv| conv.is_exact()))
        .count()
}

fn ambiguous_overload_error(
    a: &OverloadMatch,
    b: &OverloadMatch,
    state: &CompilerState,
    span: Span,
) -> CompilationError {
    let name = state.idents.get(a.function).name.clone();
    let candidates = format!(
        "{} and {}",
        format_signature(a.function, state),
        format_signature(b.function, state)
    );

    CompilationError::AmbiguousOverload {
        name,
        candidates,
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::{Conversion, ConversionKind};
    use zinnia_core::{
        CompilerConfig, FunctionInfo, IdentId, IdentKind, Identifier, ScopeId, TypeId,
    };

    fn make_match(function: u32, cost: u32, exact_count: usize, total_args: usize) -> OverloadMatch {
        let arg_conversions = (0..total_args)
            .map(|i| {
                Some(if i < exact_count {
                    Conversion::identity()
                } else {
                    Conversion::implicit(
                        ConversionKind::Primitive {
                            from: TypeId(0),
                            to: TypeId(1),
                        },
                        Conversion::COST_PRIMITIVE_WIDENING,
                    )
                })
            })
            .collect();

        OverloadMatch {
            function: IdentId(function),
            arg_conversions,
            total_cost: cost,
        }
    }

    fn state_with_functions(count: u32) -> CompilerState {
        let mut state = CompilerState::new(CompilerConfig::default());
        let void = state.types.builtins().void;
        let ty = state.types.function(void, vec![]);
        for _ in 0..count {
            state
                .idents
                .declare(
                    ScopeId::GLOBAL,
                    Identifier::new("f", IdentKind::Function(FunctionInfo::new(vec![], void)), ty, Span::default()),
                )
                .unwrap();
        }
        state
    }

    #[test]
    fn single_viable_returns_it() {
        let state = state_with_functions(1);
        let m = make_match(0, 0, 1, 1);
        let result = find_best_match(std::slice::from_ref(&m), &state, Span::default()).unwrap();
        assert_eq!(result.function, m.function);
    }

    #[test]
    fn lower_cost_wins() {
        let state = state_with_functions(2);
        let viable = vec![make_match(0, 5, 0, 2), make_match(1, 2, 0, 2)];
        let result = find_best_match(&viable, &state, Span::default()).unwrap();
        assert_eq!(result.function, IdentId(1));
    }

    #[test]
    fn more_exact_matches_wins_tie() {
        let state = state_with_functions(2);
        let viable = vec![make_match(0, 2, 2, 3), make_match(1, 2, 1, 3)];
        let result = find_best_match(&viable, &state, Span::default()).unwrap();
        assert_eq!(result.function, IdentId(0));
    }

    #[test]
    fn equal_cost_equal_exact_is_ambiguous() {
        let state = state_with_functions(2);
        let viable = vec![make_match(0, 2, 1, 2), make_match(1, 2, 1, 2)];
        let err = find_best_match(&viable, &state, Span::default()).unwrap_err();
        assert!(matches!(
            err,
            CompilationError::AmbiguousOverload { ref candidates, .. } if candidates == "f() and f()"
        ));
    }
}
