//! Zinnia
//!
//! Semantic core of a statically typed compiler: expression analysis
//! through a staged pipeline and flow checks of function bodies.
//!
//! The data model lives in [`core`] (`zinnia-core`), the stages and the
//! code checker in [`compiler`] (`zinnia-compiler`). [`Unit`] ties them
//! together for one compilation unit.
//!
//! # Example
//!
//! ```ignore
//! use zinnia::prelude::*;
//!
//! let mut unit = Unit::new(CompilerConfig::default());
//! let scope = unit.state_mut().function_scope(ScopeId::GLOBAL, void, None);
//! let sum = unit.expression(scope, raw)?;
//! let mut body = FunctionBody::new(scope, span);
//! body.push(body.root(), span, Command::Expression(sum));
//! unit.add_function("main", body)?;
//! unit.build()?;
//! ```

pub mod unit;

pub use unit::{Unit, UnitError};

pub use zinnia_compiler as compiler;
pub use zinnia_core as core;

pub mod prelude {
    pub use crate::unit::{Unit, UnitError};
    pub use zinnia_compiler::code_checker::{Command, CommandKind, ConditionResult, FunctionBody, StmtId};
    pub use zinnia_compiler::node::{ExprNode, LinkArena, NodeKind, NodeVariables};
    pub use zinnia_compiler::pipeline::{Expression, PluginRoot};
    pub use zinnia_compiler::state::CompilerState;
    pub use zinnia_core::{
        CheckingMode, CodeString, CompilationError, CompilerConfig, ConstValue, Diagnostics,
        FunctionInfo, IdentId, IdentKind, Identifier, Operator, Param, ScopeId, ScopeKind,
        Severity, Span, TypeId, TypeKind,
    };
}
