//! Compilation unit API.
//!
//! A [`Unit`] owns the tables of one compilation: it runs expressions
//! through the stock pipelines and checks the function bodies added to it.
//!
//! # Example
//!
//! ```ignore
//! let mut unit = Unit::new(CompilerConfig::default());
//! let init = unit.global(raw_initializer)?;
//! unit.add_function("main", body)?;
//! unit.build()?;
//! ```

use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, trace};
use zinnia_compiler::code_checker::{FunctionBody, check_function};
use zinnia_compiler::node::ExprNode;
use zinnia_compiler::pipeline::{Expression, PluginRoot};
use zinnia_compiler::state::CompilerState;
use zinnia_core::{CompilerConfig, ConstCache, Diagnostics, ScopeId};

/// Failure of a unit operation. The details are in the unit's
/// [`Diagnostics`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("expression failed with {errors} error(s)")]
    Expression { errors: usize },

    #[error("function '{0}' is already defined")]
    DuplicateFunction(String),

    #[error("code check failed for {}", .failed.join(", "))]
    CheckFailed { failed: Vec<String> },
}

/// A compilation unit.
pub struct Unit {
    state: CompilerState,
    /// Function bodies in the order they were added.
    functions: Vec<(String, FunctionBody)>,
    by_name: FxHashMap<String, usize>,
    is_built: bool,
}

impl Unit {
    pub fn new(config: CompilerConfig) -> Self {
        Self::from_state(CompilerState::new(config))
    }

    /// A unit reporting into `diagnostics` and interning into `consts`,
    /// both possibly shared with units on other threads.
    pub fn with_shared(config: CompilerConfig, diagnostics: Arc<Diagnostics>, consts: Arc<ConstCache>) -> Self {
        Self::from_state(CompilerState::with_shared(config, diagnostics, consts))
    }

    fn from_state(state: CompilerState) -> Self {
        Self {
            state,
            functions: Vec::new(),
            by_name: FxHashMap::default(),
            is_built: false,
        }
    }

    #[inline]
    pub fn state(&self) -> &CompilerState {
        &self.state
    }

    #[inline]
    pub fn state_mut(&mut self) -> &mut CompilerState {
        &mut self.state
    }

    #[inline]
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.state.diagnostics
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Initializer of a global; must fold to a constant.
    pub fn global(&mut self, raw: ExprNode) -> Result<Expression, UnitError> {
        self.run(raw, |state| PluginRoot::for_globals(state, ScopeId::GLOBAL))
    }

    /// A constant declaration in `scope`.
    pub fn constant(&mut self, scope: ScopeId, raw: ExprNode) -> Result<Expression, UnitError> {
        self.run(raw, |state| PluginRoot::for_constants(state, scope, false))
    }

    /// An expression inside a function body.
    pub fn expression(&mut self, scope: ScopeId, raw: ExprNode) -> Result<Expression, UnitError> {
        self.run(raw, |state| PluginRoot::for_code_scope(state, scope))
    }

    fn run(
        &mut self,
        raw: ExprNode,
        pipeline: impl for<'s> FnOnce(&'s mut CompilerState) -> PluginRoot<'s>,
    ) -> Result<Expression, UnitError> {
        let diagnostics = Arc::clone(&self.state.diagnostics);
        let before = diagnostics.error_count();
        let expression = pipeline(&mut self.state).process(raw);
        expression.ok_or_else(|| UnitError::Expression {
            errors: diagnostics.error_count().saturating_sub(before),
        })
    }

    // ========================================================================
    // Function bodies
    // ========================================================================

    pub fn add_function(&mut self, name: impl Into<String>, body: FunctionBody) -> Result<(), UnitError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(UnitError::DuplicateFunction(name));
        }
        trace!(function = %name, statements = body.len(), "added function body");
        self.by_name.insert(name.clone(), self.functions.len());
        self.functions.push((name, body));
        self.is_built = false;
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<&FunctionBody> {
        self.by_name.get(name).map(|&index| &self.functions[index].1)
    }

    #[inline]
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Check every function body. All bodies are checked even if one
    /// fails.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn build(&mut self) -> Result<(), UnitError> {
        let failed: Vec<String> = self
            .functions
            .iter()
            .filter(|(_, body)| !check_function(&self.state, body))
            .map(|(name, _)| name.clone())
            .collect();

        debug!(
            functions = self.functions.len(),
            failed = failed.len(),
            errors = self.state.diagnostics.error_count(),
            warnings = self.state.diagnostics.warning_count(),
            "built unit"
        );
        self.is_built = failed.is_empty();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(UnitError::CheckFailed { failed })
        }
    }

    #[inline]
    pub fn is_built(&self) -> bool {
        self.is_built
    }
}
