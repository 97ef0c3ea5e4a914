//! Zinnia Core
//!
//! Data model shared by the semantic-analysis stages.
//!
//! ## Modules
//!
//! - [`span`]: Source positions and the [`CodeString`] slices handed in by the front end
//! - [`name_hash`]: Hashes keying scope member tables
//! - [`operator`]: The operator set and its classification
//! - [`error`]: [`CompilationError`] and [`Severity`]
//! - [`diagnostics`]: The thread-safe message sink
//! - [`types`]: The type table
//! - [`identifier`]: Scopes and declared identifiers
//! - [`const_value`]: Compile-time constants and their arithmetic
//! - [`intrinsic`]: Foldable math functions
//! - [`const_cache`]: Deduplicated constant slots
//! - [`config`]: Compilation settings

pub mod config;
pub mod const_cache;
pub mod const_value;
pub mod diagnostics;
pub mod error;
pub mod identifier;
pub mod intrinsic;
pub mod name_hash;
pub mod operator;
pub mod span;
pub mod types;

pub use config::{CheckingMode, CompilerConfig};
pub use const_cache::{ConstCache, ConstHandle};
pub use const_value::{ConstKind, ConstValue};
pub use diagnostics::Diagnostics;
pub use error::{CompilationError, Severity};
pub use identifier::{
    Access, FunctionInfo, IdentFlags, IdentId, IdentKind, Identifier, IdentifierTable, Param,
    PropertyInfo, Scope, ScopeId, ScopeKind, VariableKind,
};
pub use intrinsic::MathIntrinsic;
pub use name_hash::NameHash;
pub use operator::Operator;
pub use span::{CodeString, Span};
pub use types::{Builtins, ReferenceMode, TupleMember, TypeId, TypeKind, TypeTable};
