//! The staged expression pipeline.
//!
//! A [`PluginRoot`] owns an ordered list of [`Stage`]s. Every node handed to
//! [`PluginRoot::new_node`] passes through each stage in order. A stage
//! answers with a [`PluginResult`]:
//!
//! - `Succeeded`: go on with the next stage
//! - `Ready`: the stage replaced the node; run every stage again from the
//!   first one
//! - `Interrupt`: the stage needs context only the parent node has; the node
//!   is marked with a [`Suspension`] and handed back
//! - `Failed`: a diagnostic was reported; the expression is dropped
//!
//! A suspended node is resumed by its parent with [`PluginRoot::finish_node`]
//! (or by the identifier recognizer with the context it was waiting for),
//! which continues the pipeline after the interrupting stage.
//!
//! # Example
//!
//! ```ignore
//! let mut root = PluginRoot::for_code_scope(&mut state, scope);
//! root.begin();
//! let node = root.recognize(raw)?;
//! let expression = root.end(node)?;
//! ```

use tracing::trace;
use zinnia_core::{CodeString, IdentId, Identifier, ScopeId, TypeId};

use crate::node::{ExprNode, ExpressionFlags, LinkArena, LinkId, LinkedNodeFlags, NodeVariables};
use crate::plugins::{
    AutoDeclareMode, CompilerPlugin, Evaluator, EvaluatorOptions, IdRecognizer,
    IdRecognizerOptions, PreProcessor, TypeMngr, TypeMngrFlags,
};
use crate::state::CompilerState;

/// Outcome of a stage processing one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginResult {
    Succeeded,
    Ready,
    Interrupt,
    Failed,
}

/// Names a stage kind, independent of its position in a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageTag {
    PreProc,
    IdRecognizer,
    TypeMngr,
    Evaluator,
    Compiler,
}

/// Where processing of a node paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suspension {
    /// Index of the interrupting stage.
    pub stage: usize,
    pub tag: StageTag,
}

/// Hooks of one pipeline stage.
pub trait ExpressionPlugin {
    /// Called by [`PluginRoot::begin`].
    fn begin(&self, _root: &mut PluginRoot<'_>) {}

    fn new_node(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult;

    /// Finish a node this stage interrupted, without any parent context.
    fn force_continue(&self, _root: &mut PluginRoot<'_>, _node: &mut ExprNode) -> PluginResult {
        PluginResult::Succeeded
    }

    /// Final checks on the expression root. Must not interrupt.
    fn end(&self, _root: &mut PluginRoot<'_>, _node: &mut ExprNode) -> PluginResult {
        PluginResult::Succeeded
    }

    /// Called after [`PluginRoot::declare_identifier`] created `id`.
    fn on_identifier_declared(&self, _root: &mut PluginRoot<'_>, _id: IdentId) {}
}

/// A configured stage.
#[derive(Debug, Clone, Copy)]
pub enum Stage {
    PreProc(PreProcessor),
    IdRecognizer(IdRecognizer),
    TypeMngr(TypeMngr),
    Evaluator(Evaluator),
    Compiler(CompilerPlugin),
}

impl Stage {
    pub fn plugin(&self) -> &dyn ExpressionPlugin {
        match self {
            Stage::PreProc(p) => p,
            Stage::IdRecognizer(p) => p,
            Stage::TypeMngr(p) => p,
            Stage::Evaluator(p) => p,
            Stage::Compiler(p) => p,
        }
    }

    pub fn tag(&self) -> StageTag {
        match self {
            Stage::PreProc(_) => StageTag::PreProc,
            Stage::IdRecognizer(_) => StageTag::IdRecognizer,
            Stage::TypeMngr(_) => StageTag::TypeMngr,
            Stage::Evaluator(_) => StageTag::Evaluator,
            Stage::Compiler(_) => StageTag::Compiler,
        }
    }
}

/// A finished expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub root: ExprNode,
    /// Subexpressions shared through `Linking` nodes of `root`.
    pub links: LinkArena,
    pub vars: NodeVariables,
}

/// Drives nodes through the stages of one pipeline.
///
/// A root processes one expression at a time between [`begin`] and
/// [`end`]; it can be reused for the next expression afterwards.
///
/// [`begin`]: PluginRoot::begin
/// [`end`]: PluginRoot::end
pub struct PluginRoot<'s> {
    pub state: &'s mut CompilerState,
    /// Scope the expression is recognized in.
    pub scope: ScopeId,
    stages: Vec<Stage>,
    links: LinkArena,
    currently_using: bool,
    /// Identifiers declared by the current expression, not yet published.
    pub(crate) declared: Vec<IdentId>,
    /// Names left unresolved by a recognizer that may not fail.
    pub(crate) dependencies: Vec<CodeString>,
}

impl<'s> PluginRoot<'s> {
    pub fn new(state: &'s mut CompilerState, scope: ScopeId, stages: Vec<Stage>) -> Self {
        Self {
            state,
            scope,
            stages,
            links: LinkArena::new(),
            currently_using: false,
            declared: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Pipeline for global initializers: everything must fold to a constant.
    pub fn for_globals(state: &'s mut CompilerState, scope: ScopeId) -> Self {
        Self::new(
            state,
            scope,
            vec![
                Stage::PreProc(PreProcessor),
                Stage::IdRecognizer(IdRecognizer::default()),
                Stage::TypeMngr(TypeMngr::default()),
                Stage::Evaluator(Evaluator::new(EvaluatorOptions { must_be_const: true })),
            ],
        )
    }

    /// Pipeline for statements of a function body.
    pub fn for_code_scope(state: &'s mut CompilerState, scope: ScopeId) -> Self {
        Self::new(
            state,
            scope,
            vec![
                Stage::PreProc(PreProcessor),
                Stage::IdRecognizer(IdRecognizer::new(IdRecognizerOptions {
                    auto_declare: AutoDeclareMode::Disable,
                    do_not_fail: false,
                })),
                Stage::TypeMngr(TypeMngr::new(TypeMngrFlags::CALCULATE_LAYOUTS)),
                Stage::Evaluator(Evaluator::default()),
                Stage::Compiler(CompilerPlugin),
            ],
        )
    }

    /// Pipeline for named constants. With `do_not_fail`, names that cannot
    /// be resolved yet are collected in [`dependencies`] instead of being
    /// reported.
    ///
    /// [`dependencies`]: PluginRoot::dependencies
    pub fn for_constants(state: &'s mut CompilerState, scope: ScopeId, do_not_fail: bool) -> Self {
        Self::new(
            state,
            scope,
            vec![
                Stage::PreProc(PreProcessor),
                Stage::IdRecognizer(IdRecognizer::new(IdRecognizerOptions {
                    auto_declare: AutoDeclareMode::Disable,
                    do_not_fail,
                })),
                Stage::TypeMngr(TypeMngr::new(TypeMngrFlags::ENABLE_UNTYPED_NODES)),
                Stage::Evaluator(Evaluator::default()),
            ],
        )
    }

    /// Set the type the finished expression is converted to.
    pub fn with_expected_type(mut self, ty: TypeId) -> Self {
        for stage in &mut self.stages {
            if let Stage::TypeMngr(mngr) = stage {
                mngr.expected = Some(ty);
            }
        }
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Whether a stage of kind `tag` is part of the pipeline.
    pub fn has_stage(&self, tag: StageTag) -> bool {
        self.stages.iter().any(|s| s.tag() == tag)
    }

    /// Names the current expression could not resolve.
    pub fn dependencies(&self) -> &[CodeString] {
        &self.dependencies
    }

    /// Identifiers declared by the current expression.
    pub fn declared(&self) -> &[IdentId] {
        &self.declared
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Start a new expression.
    ///
    /// # Panics
    ///
    /// Panics if the previous expression was neither ended nor reset.
    pub fn begin(&mut self) {
        assert!(
            !self.currently_using,
            "PluginRoot::begin called while an expression is in progress"
        );
        self.currently_using = true;
        self.links.clear();
        self.declared.clear();
        self.dependencies.clear();
        trace!(scope = ?self.scope, "begin expression");

        for index in 0..self.stages.len() {
            let stage = self.stages[index];
            stage.plugin().begin(self);
        }
    }

    /// Abandon the current expression.
    pub fn reset(&mut self) {
        self.currently_using = false;
        self.links.clear();
        self.declared.clear();
    }

    /// Finish the expression rooted at `node`.
    ///
    /// Resolves a suspended root, runs every stage's `end` hook (a `Ready`
    /// answer runs them again from the first stage), drops unused links and
    /// records the variable usage.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn end(&mut self, mut node: ExprNode) -> Option<Expression> {
        assert!(self.currently_using, "PluginRoot::end called without begin");

        if self.finish_node(&mut node, true) == PluginResult::Failed {
            self.reset();
            return None;
        }

        let mut index = 0;
        while index < self.stages.len() {
            let stage = self.stages[index];
            match stage.plugin().end(self, &mut node) {
                PluginResult::Succeeded => index += 1,
                PluginResult::Ready => index = 0,
                PluginResult::Interrupt => {
                    panic!("stage {:?} interrupted while ending an expression", stage.tag())
                }
                PluginResult::Failed => {
                    self.reset();
                    return None;
                }
            }
        }

        self.links.prune(&mut node);
        #[cfg(debug_assertions)]
        self.links.verify(&node);

        let vars = NodeVariables::collect(&node, &self.links, &self.state.idents);
        let links = std::mem::take(&mut self.links);
        self.currently_using = false;
        trace!(links = links.len(), "end expression");

        Some(Expression {
            root: node,
            links,
            vars,
        })
    }

    /// `begin`, `recognize` and `end` in one go.
    pub fn process(&mut self, raw: ExprNode) -> Option<Expression> {
        self.begin();
        match self.recognize(raw) {
            Some(node) => self.end(node),
            None => {
                self.reset();
                None
            }
        }
    }

    // ========================================================================
    // Node processing
    // ========================================================================

    /// Push a raw tree through the pipeline, children before their parent.
    ///
    /// The returned node may still be suspended; [`end`](PluginRoot::end)
    /// or the parent resolves it.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn recognize(&mut self, mut raw: ExprNode) -> Option<ExprNode> {
        let children = std::mem::take(&mut raw.children);
        let mut recognized = Vec::with_capacity(children.len());
        for child in children {
            recognized.push(self.recognize(child)?);
        }
        raw.children = recognized;
        self.new_node(raw)
    }

    /// Run the pipeline on a node whose children are already processed.
    /// Returns `None` if a stage failed.
    pub fn new_node(&mut self, mut node: ExprNode) -> Option<ExprNode> {
        match self.run_from(&mut node, 0) {
            PluginResult::Failed => None,
            _ => Some(node),
        }
    }

    /// [`new_node`](PluginRoot::new_node) followed by resolving the node if
    /// a stage interrupted it. Stages use this for nodes they synthesize.
    pub fn complete_node(&mut self, node: ExprNode) -> Option<ExprNode> {
        let mut node = self.new_node(node)?;
        match self.finish_node(&mut node, true) {
            PluginResult::Failed => None,
            _ => Some(node),
        }
    }

    /// Run the whole pipeline on `node` in place.
    pub fn run(&mut self, node: &mut ExprNode) -> PluginResult {
        self.run_from(node, 0)
    }

    fn run_from(&mut self, node: &mut ExprNode, from: usize) -> PluginResult {
        let mut index = from;
        while index < self.stages.len() {
            let stage = self.stages[index];

            #[cfg(debug_assertions)]
            let before = node.clone();

            match stage.plugin().new_node(self, node) {
                PluginResult::Succeeded => index += 1,
                PluginResult::Ready => {
                    #[cfg(debug_assertions)]
                    assert!(
                        *node != before,
                        "stage {:?} answered Ready without changing the node",
                        stage.tag()
                    );
                    index = 0;
                }
                PluginResult::Interrupt => {
                    assert!(
                        node.suspended.is_none(),
                        "node interrupted twice: {:?}",
                        node.code
                    );
                    node.suspended = Some(Suspension {
                        stage: index,
                        tag: stage.tag(),
                    });
                    trace!(stage = ?stage.tag(), code = node.code.as_str(), "node interrupted");
                    return PluginResult::Interrupt;
                }
                PluginResult::Failed => return PluginResult::Failed,
            }
        }

        assert!(
            !node.children.iter().any(ExprNode::is_suspended),
            "unfinished child left under {:?}",
            node.code
        );
        PluginResult::Succeeded
    }

    /// Continue a suspended node once. With `call_interrupter`, the
    /// interrupting stage's `force_continue` hook runs first; callers that
    /// already resolved the node themselves pass `false`.
    pub fn continue_node(&mut self, node: &mut ExprNode, call_interrupter: bool) -> PluginResult {
        let Some(suspension) = node.suspended else {
            return PluginResult::Succeeded;
        };

        let mut restart = false;
        if call_interrupter {
            let stage = self.stages[suspension.stage];
            match stage.plugin().force_continue(self, node) {
                PluginResult::Succeeded => {}
                PluginResult::Ready => restart = true,
                PluginResult::Failed => return PluginResult::Failed,
                PluginResult::Interrupt => {
                    panic!("stage {:?} interrupted in force_continue", stage.tag())
                }
            }
        }

        node.suspended = None;
        trace!(stage = ?suspension.tag, restart, code = node.code.as_str(), "node resumed");
        if restart {
            self.run_from(node, 0)
        } else {
            self.run_from(node, suspension.stage + 1)
        }
    }

    /// Continue `node` until no stage holds it suspended.
    pub fn finish_node(&mut self, node: &mut ExprNode, call_interrupter: bool) -> PluginResult {
        let mut call = call_interrupter;
        while node.is_suspended() {
            if self.continue_node(node, call) == PluginResult::Failed {
                return PluginResult::Failed;
            }
            call = true;
        }
        PluginResult::Succeeded
    }

    /// Resolve every suspended child of `node` without context.
    pub fn finish_children(&mut self, node: &mut ExprNode) -> PluginResult {
        for child in &mut node.children {
            if self.finish_node(child, true) == PluginResult::Failed {
                return PluginResult::Failed;
            }
        }
        PluginResult::Succeeded
    }

    // ========================================================================
    // Links
    // ========================================================================

    /// Move a processed node into the link arena.
    pub fn new_link(&mut self, node: ExprNode) -> LinkId {
        self.links.insert(node, LinkedNodeFlags::empty())
    }

    pub fn new_link_with(&mut self, node: ExprNode, flags: LinkedNodeFlags) -> LinkId {
        self.links.insert(node, flags)
    }

    /// A processed `Linking` node for `link`.
    pub fn linking_node(&mut self, link: LinkId) -> Option<ExprNode> {
        let code = self.links.get(link).node.code.clone();
        self.complete_node(ExprNode::linking(link, code))
    }

    pub fn links(&self) -> &LinkArena {
        &self.links
    }

    pub fn links_mut(&mut self) -> &mut LinkArena {
        &mut self.links
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    /// Create an identifier in the current scope and tell every stage. The
    /// identifier becomes visible by name once the expression ends, or
    /// immediately when the pipeline has no compiler stage.
    pub fn declare_identifier(&mut self, ident: Identifier) -> Option<IdentId> {
        let scope = self.scope;
        let created = self.state.idents.create(scope, ident);
        let id = self.state.report(created)?;
        self.declared.push(id);

        for index in 0..self.stages.len() {
            let stage = self.stages[index];
            stage.plugin().on_identifier_declared(self, id);
        }

        if !self.has_stage(StageTag::Compiler) {
            self.state.idents.publish(id);
        }
        trace!(name = %self.state.idents.get(id).name, "identifier declared");
        Some(id)
    }

    /// Declare a local named `name` and return a processed `Id` node that
    /// must be assigned within the expression.
    pub fn declare_var_and_create_id_node(
        &mut self,
        name: CodeString,
        ty: TypeId,
    ) -> Option<ExprNode> {
        let ident = Identifier::new(
            name.as_str(),
            zinnia_core::IdentKind::Variable(zinnia_core::VariableKind::Local),
            ty,
            name.span(),
        );
        let id = self.declare_identifier(ident)?;
        let node = ExprNode::id(id, name).with_flags(
            ExpressionFlags::ID_MUST_BE_ASSIGNED | ExpressionFlags::RECOGNIZED,
        );
        self.complete_node(node)
    }

    /// A declared-but-unpublished identifier of this expression named `name`.
    pub(crate) fn find_declared(&self, name: &str) -> Option<IdentId> {
        self.declared
            .iter()
            .copied()
            .find(|&id| self.state.idents.get(id).name == name)
    }
}
