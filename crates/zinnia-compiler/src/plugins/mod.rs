//! The pipeline stages.
//!
//! - [`preproc`]: macro expansion
//! - [`id_recognizer`]: name binding, member access, overload selection and
//!   argument binding
//! - [`type_mngr`]: typing, conversions and operator semantics
//! - [`evaluator`]: constant folding and algebraic simplification
//! - [`compiler`]: property desugaring, increments, copy elision and
//!   assignment checks of declared identifiers

pub mod compiler;
pub mod evaluator;
pub mod id_recognizer;
pub mod preproc;
pub mod type_mngr;

pub use compiler::{CompilerPlugin, compound_assignment};
pub use evaluator::{Evaluator, EvaluatorOptions};
pub use id_recognizer::{AutoDeclareMode, IdRecognizer, IdRecognizerOptions};
pub use preproc::{Macro, MacroId, MacroTable, PreProcessor};
pub use type_mngr::{TypeMngr, TypeMngrFlags};

use zinnia_core::{CompilationError, IdentKind, ScopeId, TypeId};

use crate::node::ExprNode;
use crate::pipeline::{PluginResult, PluginRoot};
use crate::state::CompilerState;

/// Report `error` and fail the stage.
pub(crate) fn fail(root: &PluginRoot<'_>, error: CompilationError) -> PluginResult {
    root.state.diagnostics.add(error);
    PluginResult::Failed
}

/// The type a node names, if it is a type reference.
pub(crate) fn type_ref(state: &CompilerState, node: &ExprNode) -> Option<TypeId> {
    let ident = state.idents.get(node.ident()?);
    matches!(ident.kind, IdentKind::Type).then_some(ident.ty)
}

/// The scope a node names, if it is a namespace reference.
pub(crate) fn namespace_ref(state: &CompilerState, node: &ExprNode) -> Option<ScopeId> {
    match state.idents.get(node.ident()?).kind {
        IdentKind::Namespace(scope) => Some(scope),
        _ => None,
    }
}

#[inline]
pub(crate) fn type_name(state: &CompilerState, ty: TypeId) -> String {
    state.types.name(ty).to_string()
}

/// `type_name` of an optional type, `?` when untyped.
pub(crate) fn node_type_name(state: &CompilerState, node: &ExprNode) -> String {
    node.ty.map_or_else(|| "?".to_string(), |ty| type_name(state, ty))
}
