//! Zinnia Compiler
//!
//! Semantic analysis of expressions and function bodies.
//!
//! ## Architecture
//!
//! - **Expressions**: a raw node tree from the front end is pushed through a
//!   [`PluginRoot`], whose stages bind names, type operators, fold
//!   constants and lower properties and increments. The result is an
//!   [`Expression`]: the finished tree, the subexpressions it shares
//!   through links, and the variables it reads and assigns.
//! - **Function bodies**: finished expressions are arranged in a
//!   [`FunctionBody`] of blocks and commands, which the code checker walks
//!   for definite assignment, reachability and return paths.
//!
//! ## Modules
//!
//! - [`node`]: Expression nodes, the link arena and per-expression variable usage
//! - [`pipeline`]: The staged pipeline and its suspend/resume protocol
//! - [`plugins`]: The five stages
//! - [`conversion`]: Conversion costs between types
//! - [`overload`]: Overload resolution for calls
//! - [`state`]: Tables shared by the stages of one compilation unit
//! - [`code_checker`]: Statement-level flow analysis

pub mod code_checker;
pub mod conversion;
pub mod node;
pub mod overload;
pub mod pipeline;
pub mod plugins;
pub mod state;

#[cfg(test)]
mod testing;

pub use code_checker::{Command, CommandKind, FunctionBody, StmtId, check_function};
pub use conversion::{Conversion, ConversionKind, can_implicitly_convert, find_conversion};
pub use node::{ExprNode, ExpressionFlags, LinkArena, LinkId, NodeKind, NodeVariables};
pub use overload::{OverloadArg, OverloadMatch, OverloadSelectionData, resolve_overload};
pub use pipeline::{Expression, ExpressionPlugin, PluginResult, PluginRoot, Stage, StageTag};
pub use state::CompilerState;

// Re-export the error type from core for convenience
pub use zinnia_core::CompilationError;
