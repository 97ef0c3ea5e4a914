//! Builders shared by the unit tests.

use zinnia_core::{
    CodeString, CompilationError, CompilerConfig, ConstValue, FunctionInfo, IdentFlags, IdentId,
    IdentKind, Identifier, Operator, Param, ScopeId, Span, TypeId,
};

use crate::node::ExprNode;
use crate::pipeline::{Expression, PluginRoot};
use crate::state::CompilerState;

pub(crate) fn code(text: &str) -> CodeString {
    CodeString::new(text, Span::new(1, 1, text.len() as u32))
}

pub(crate) fn name(text: &str) -> ExprNode {
    ExprNode::name(code(text))
}

pub(crate) fn int(value: i64) -> ExprNode {
    ExprNode::literal(ConstValue::integer(value), code(&value.to_string()))
}

pub(crate) fn double(value: f64) -> ExprNode {
    ExprNode::literal(ConstValue::Double(value), code(&value.to_string()))
}

pub(crate) fn boolean(value: bool) -> ExprNode {
    ExprNode::literal(ConstValue::Boolean(value), code(&value.to_string()))
}

pub(crate) fn op(op: Operator, children: Vec<ExprNode>) -> ExprNode {
    ExprNode::op(op, children, code(op.symbol()))
}

pub(crate) fn call(callee: &str, args: Vec<ExprNode>) -> ExprNode {
    call_node(name(callee), args)
}

pub(crate) fn call_node(callee: ExprNode, args: Vec<ExprNode>) -> ExprNode {
    let code = callee.code.clone();
    let mut children = vec![callee];
    children.extend(args);
    ExprNode::op(Operator::Call, children, code)
}

pub(crate) fn member(object: ExprNode, field: &str) -> ExprNode {
    ExprNode::op(Operator::Member, vec![object, name(field)], code(field))
}

pub(crate) fn assign(target: ExprNode, value: ExprNode) -> ExprNode {
    op(Operator::Assignment, vec![target, value])
}

/// A compiler state with one function body to recognize code in.
pub(crate) struct Fixture {
    pub state: CompilerState,
    pub scope: ScopeId,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default())
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        // Another test may have installed it already.
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .try_init();

        let mut state = CompilerState::new(config);
        let void = state.types.builtins().void;
        let scope = state.function_scope(ScopeId::GLOBAL, void, None);
        Self { state, scope }
    }

    pub fn int32(&self) -> TypeId {
        self.state.types.builtins().int32
    }

    pub fn local(&mut self, name: &str, ty: TypeId) -> IdentId {
        let id = self
            .state
            .idents
            .create_local(self.scope, name, ty, Span::default())
            .unwrap();
        self.state.idents.publish(id);
        id
    }

    /// A global function.
    pub fn function(&mut self, name: &str, params: Vec<Param>, ret: TypeId) -> IdentId {
        self.function_in(ScopeId::GLOBAL, name, FunctionInfo::new(params, ret))
    }

    pub fn function_in(&mut self, scope: ScopeId, name: &str, info: FunctionInfo) -> IdentId {
        let params = info.params.iter().map(|p| p.ty).collect();
        let ty = self.state.types.function(info.ret, params);
        self.state
            .idents
            .declare(
                scope,
                Identifier::new(name, IdentKind::Function(info), ty, Span::default())
                    .with_flags(IdentFlags::STATIC),
            )
            .unwrap()
    }

    pub fn process(&mut self, raw: ExprNode) -> Option<Expression> {
        PluginRoot::for_code_scope(&mut self.state, self.scope).process(raw)
    }

    pub fn process_constant(&mut self, raw: ExprNode) -> Option<Expression> {
        PluginRoot::for_constants(&mut self.state, self.scope, false).process(raw)
    }

    pub fn count(&self, predicate: impl Fn(&CompilationError) -> bool) -> usize {
        self.state.diagnostics.count_where(predicate)
    }
}
