//! Overload resolution for function calls.
//!
//! Selects the best matching function from a set of candidates based on the
//! argument types at the call site and the conversion costs they need.
//!
//! ## Algorithm
//!
//! 1. Bind arguments to parameters: positional arguments in order, named
//!    arguments by parameter name, defaults for the rest
//! 2. Check that every bound argument converts implicitly to its parameter
//! 3. Sum the conversion costs of each viable candidate
//! 4. Rank candidates by cost and select the best match
//! 5. Report ambiguous overloads when the best candidates tie

mod ranking;

pub use ranking::find_best_match;

use zinnia_core::{CompilationError, ConstValue, IdentId, Span, TypeId, TypeKind};

use crate::conversion::{Conversion, find_constant_conversion, find_conversion};
use crate::state::CompilerState;

/// An argument at a call site.
#[derive(Debug, Clone, PartialEq)]
pub struct OverloadArg {
    pub ty: TypeId,
    /// Known value of a constant argument; constants that fit convert
    /// implicitly to narrower integers.
    pub value: Option<ConstValue>,
}

impl OverloadArg {
    #[inline]
    pub fn new(ty: TypeId) -> Self {
        Self { ty, value: None }
    }

    #[inline]
    pub fn constant(ty: TypeId, value: ConstValue) -> Self {
        Self {
            ty,
            value: Some(value),
        }
    }
}

/// Argument types of a call, positional first, then named.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverloadSelectionData {
    pub positional: Vec<OverloadArg>,
    pub named: Vec<(String, OverloadArg)>,
}

impl OverloadSelectionData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selection data of positional arguments only.
    pub fn positional(types: impl IntoIterator<Item = TypeId>) -> Self {
        Self {
            positional: types.into_iter().map(OverloadArg::new).collect(),
            named: Vec::new(),
        }
    }

    pub fn with_named(mut self, name: impl Into<String>, arg: OverloadArg) -> Self {
        self.named.push((name.into(), arg));
        self
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of successful overload resolution.
#[derive(Debug, Clone)]
pub struct OverloadMatch {
    pub function: IdentId,
    /// One entry per parameter (`None` = default value used), followed by
    /// the conversions of extra variadic arguments.
    pub arg_conversions: Vec<Option<Conversion>>,
    /// Total conversion cost (lower is better).
    pub total_cost: u32,
}

/// Resolve an overloaded function call.
///
/// # Panics
///
/// Panics if `candidates` is empty.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn resolve_overload(
    candidates: &[IdentId],
    data: &OverloadSelectionData,
    state: &CompilerState,
    span: Span,
) -> Result<OverloadMatch, CompilationError> {
    assert!(!candidates.is_empty(), "no candidates for overload resolution");

    // Fast path: single candidate
    if let [only] = candidates {
        return try_single_candidate(*only, data, state, span);
    }

    let viable: Vec<_> = candidates
        .iter()
        .filter_map(|&id| try_match_candidate(id, data, state))
        .collect();

    if viable.is_empty() {
        return Err(no_matching_overload_error(candidates, data, state, span));
    }

    find_best_match(&viable, state, span)
}

fn try_single_candidate(
    function: IdentId,
    data: &OverloadSelectionData,
    state: &CompilerState,
    span: Span,
) -> Result<OverloadMatch, CompilationError> {
    try_match_candidate(function, data, state)
        .ok_or_else(|| no_matching_overload_error(&[function], data, state, span))
}

/// Try to match arguments against a candidate function.
///
/// Returns `None` if the candidate is not a function or an argument cannot
/// be bound or implicitly converted.
fn try_match_candidate(
    function: IdentId,
    data: &OverloadSelectionData,
    state: &CompilerState,
) -> Option<OverloadMatch> {
    let info = state.idents.get(function).function()?;
    let params = &info.params;
    let fixed = if info.variadic {
        params.len().saturating_sub(1)
    } else {
        params.len()
    };

    // Too many positional arguments (unless variadic)
    if !info.variadic && data.positional.len() > params.len() {
        return None;
    }

    let mut bound: Vec<Option<&OverloadArg>> = vec![None; params.len()];
    for (slot, arg) in bound.iter_mut().zip(data.positional.iter().take(fixed)) {
        *slot = Some(arg);
    }
    for (name, arg) in &data.named {
        let index = params.iter().position(|p| &p.name == name)?;
        if bound[index].is_some() {
            return None;
        }
        bound[index] = Some(arg);
    }

    let mut arg_conversions = Vec::with_capacity(bound.len());
    let mut total_cost = 0u32;

    for (index, (param, arg)) in params.iter().zip(&bound).enumerate() {
        match arg {
            Some(arg) => {
                let conv = convert_arg(arg, param.ty, state)?;
                total_cost = total_cost.saturating_add(conv.cost);
                arg_conversions.push(Some(conv));
            }
            None if param.default.is_some() => arg_conversions.push(None),
            // The variadic array may stay empty
            None if info.variadic && index == fixed => arg_conversions.push(None),
            None => return None,
        }
    }

    // Extra arguments convert to the element type of the variadic array
    if info.variadic && data.positional.len() > fixed {
        let element = params
            .last()
            .and_then(|p| match state.types.kind(p.ty) {
                TypeKind::RefArray { element, .. } => Some(*element),
                _ => None,
            })?;
        for arg in &data.positional[fixed..] {
            let conv = convert_arg(arg, element, state)?;
            total_cost = total_cost.saturating_add(conv.cost);
            arg_conversions.push(Some(conv));
        }
    }

    Some(OverloadMatch {
        function,
        arg_conversions,
        total_cost,
    })
}

fn convert_arg(arg: &OverloadArg, param: TypeId, state: &CompilerState) -> Option<Conversion> {
    let conv = match &arg.value {
        Some(value) => find_constant_conversion(value, arg.ty, param, state),
        None => find_conversion(arg.ty, param, state),
    }?;
    conv.is_implicit().then_some(conv)
}

/// Build error for no matching overload.
fn no_matching_overload_error(
    candidates: &[IdentId],
    data: &OverloadSelectionData,
    state: &CompilerState,
    span: Span,
) -> CompilationError {
    let name = candidates
        .first()
        .map(|&id| state.idents.get(id).name.clone())
        .unwrap_or_default();

    let positional = data.positional.iter().map(|a| state.types.name(a.ty).to_string());
    let named = data
        .named
        .iter()
        .map(|(n, a)| format!("{n}: {}", state.types.name(a.ty)));
    let args = positional.chain(named).collect::<Vec<_>>().join(", ");

    CompilationError::NoMatchingOverload { name, args, span }
}

/// `name(type, type)` of a function, for diagnostics.
pub(crate) fn format_signature(function: IdentId, state: &CompilerState) -> String {
    let ident = state.idents.get(function);
    let params = ident
        .function()
        .map(|f| {
            f.params
                .iter()
                .map(|p| state.types.name(p.ty))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    format!("{}({params})", ident.name)
}
