//! Name binding stage.
//!
//! Unresolved names (`Str` nodes) and raw identifier references interrupt
//! the pipeline: whether `a` is a local, an implicit `this.a`, a type or a
//! method to select by argument types is only known once the parent node
//! is seen. The parent then resolves its children with a
//! [`ResolveContext`]:
//!
//! - a call supplies the argument types for overload selection
//! - an assignment supplies the type of an auto-declared target
//! - a member access looks the name up in the object's type scope
//!
//! Lookup of a bare name walks the scope chain outward: locals of the
//! function, members of the declaring type, enclosing namespaces, the
//! global scope. Calls bind their arguments to the selected function's
//! parameters (named arguments, defaults, variadic packing).

use tracing::trace;
use zinnia_core::{
    CodeString, CompilationError, IdentId, IdentKind, Identifier, NameHash, Operator, ScopeKind,
    Span, TypeId, VariableKind,
};

use super::{fail, namespace_ref, type_name, type_ref};
use crate::node::{ExprNode, ExpressionFlags, NodeKind};
use crate::overload::{OverloadArg, OverloadSelectionData, resolve_overload};
use crate::pipeline::{ExpressionPlugin, PluginResult, PluginRoot, StageTag};
use crate::state::CompilerState;

/// When an unknown name declares a new local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoDeclareMode {
    #[default]
    Disable,
    /// Unknown assignment targets become locals of the assigned type.
    Enabled,
    /// Any unknown name becomes a local; its type is inferred when nothing
    /// gives it one.
    Always,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdRecognizerOptions {
    pub auto_declare: AutoDeclareMode,
    /// Keep unknown names as `Str` nodes and record them as dependencies.
    pub do_not_fail: bool,
}

/// The name binding stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdRecognizer {
    pub options: IdRecognizerOptions,
}

/// What the parent knows about an interrupted child.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ResolveContext<'a> {
    /// Type a name declared by this use would get.
    pub declaration_type: Option<TypeId>,
    /// Arguments of the call the name is the callee of.
    pub overload: Option<&'a OverloadSelectionData>,
}

impl ExpressionPlugin for IdRecognizer {
    fn new_node(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
        if node.flags.contains(ExpressionFlags::RECOGNIZED) {
            return PluginResult::Succeeded;
        }

        match node.kind {
            NodeKind::Str | NodeKind::Id(_) | NodeKind::Op(Operator::Tuple) => PluginResult::Interrupt,
            NodeKind::Op(Operator::Member | Operator::ScopeResolution) => {
                match self.resolve_node(root, &mut node.children[0], &ResolveContext::default()) {
                    PluginResult::Failed => PluginResult::Failed,
                    _ => PluginResult::Interrupt,
                }
            }
            NodeKind::Op(Operator::Call) => self.resolve_call(root, node),
            NodeKind::Op(Operator::NewObject) => self.resolve_new_object(root, node),
            NodeKind::Op(Operator::Assignment) => self.resolve_assignment(root, node),
            NodeKind::Macro(_) | NodeKind::MacroArg(_) => PluginResult::Succeeded,
            _ => self.resolve_children(root, node, 0),
        }
    }

    fn force_continue(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
        self.resolve_suspended(root, node, &ResolveContext::default())
    }
}

impl IdRecognizer {
    pub fn new(options: IdRecognizerOptions) -> Self {
        Self { options }
    }

    /// Finish a child with the context of its parent.
    pub(crate) fn resolve_node(
        &self,
        root: &mut PluginRoot<'_>,
        node: &mut ExprNode,
        ctx: &ResolveContext<'_>,
    ) -> PluginResult {
        let Some(suspension) = node.suspended else {
            return PluginResult::Succeeded;
        };
        if suspension.tag != StageTag::IdRecognizer {
            return root.finish_node(node, true);
        }

        match self.resolve_suspended(root, node, ctx) {
            PluginResult::Failed => PluginResult::Failed,
            PluginResult::Ready => {
                node.suspended = None;
                if root.run(node) == PluginResult::Failed {
                    return PluginResult::Failed;
                }
                root.finish_node(node, true)
            }
            _ => root.finish_node(node, false),
        }
    }

    fn resolve_children(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode, from: usize) -> PluginResult {
        for child in node.children.iter_mut().skip(from) {
            if self.resolve_node(root, child, &ResolveContext::default()) == PluginResult::Failed {
                return PluginResult::Failed;
            }
        }
        PluginResult::Succeeded
    }

    fn resolve_suspended(
        &self,
        root: &mut PluginRoot<'_>,
        node: &mut ExprNode,
        ctx: &ResolveContext<'_>,
    ) -> PluginResult {
        match node.kind {
            NodeKind::Str => self.resolve_name(root, node, ctx),
            NodeKind::Id(id) => self.bind_name(root, node, id),
            NodeKind::Op(Operator::Member) => self.resolve_member(root, node, ctx, false),
            NodeKind::Op(Operator::ScopeResolution) => self.resolve_member(root, node, ctx, true),
            NodeKind::Op(Operator::Tuple) => self.resolve_tuple(root, node, ctx),
            _ => PluginResult::Succeeded,
        }
    }

    // ========================================================================
    // Names
    // ========================================================================

    fn resolve_name(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode, ctx: &ResolveContext<'_>) -> PluginResult {
        let name = node.code.as_str().to_string();
        let span = node.code.span();

        let candidates = match root.find_declared(&name) {
            Some(id) => vec![id],
            None => root.state.idents.lookup(root.scope, &name).to_vec(),
        };

        if candidates.is_empty() {
            if let Some(ty) = self.auto_declare_type(root, ctx) {
                let ident = Identifier::new(
                    name.as_str(),
                    IdentKind::Variable(VariableKind::Local),
                    ty,
                    span,
                );
                let Some(id) = root.declare_identifier(ident) else {
                    return PluginResult::Failed;
                };
                return self.bind_name(root, node, id);
            }
            if self.options.do_not_fail {
                if !root.dependencies.iter().any(|d| d.as_str() == name) {
                    root.dependencies.push(node.code.clone());
                }
                node.flags |= ExpressionFlags::RECOGNIZED;
                trace!(name, "name left unresolved");
                return PluginResult::Succeeded;
            }
            return fail(root, CompilationError::UnknownId { name, span });
        }

        match select(root, &candidates, &name, ctx, span) {
            Some(id) => self.bind_name(root, node, id),
            None => PluginResult::Failed,
        }
    }

    fn auto_declare_type(&self, root: &PluginRoot<'_>, ctx: &ResolveContext<'_>) -> Option<TypeId> {
        let declared = ctx.declaration_type.map(|ty| root.state.types.non_ref(ty));
        match (self.options.auto_declare, declared) {
            (AutoDeclareMode::Disable, _) | (AutoDeclareMode::Enabled, None) => None,
            (_, Some(ty)) => Some(ty),
            (AutoDeclareMode::Always, None) => Some(root.state.types.builtins().auto),
        }
    }

    /// Replace a bare name with what it refers to.
    fn bind_name(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode, id: IdentId) -> PluginResult {
        let code = node.code.clone();
        if !root.state.idents.can_access(root.scope, id) {
            let name = root.state.idents.get(id).name.clone();
            return fail(root, CompilationError::InaccessibleMember { name, span: code.span() });
        }
        root.state.idents.mark_used(id);

        let flags = node.flags | ExpressionFlags::RECOGNIZED;
        let ident = root.state.idents.get(id);
        if let IdentKind::Constant(value) = &ident.kind {
            let constant = ExprNode::constant(value.clone(), ident.ty, code).with_flags(flags);
            node.replace(constant);
            return PluginResult::Ready;
        }

        if is_instance_member(root.state, id) {
            let Some(member) = implicit_this_member(root, id, code) else {
                return PluginResult::Failed;
            };
            node.replace(member.with_flags(flags));
            return PluginResult::Ready;
        }

        node.replace(ExprNode::id(id, code).with_flags(flags));
        PluginResult::Ready
    }

    // ========================================================================
    // Members
    // ========================================================================

    /// `object.name` or `Scope::name`. The object was resolved when the node
    /// was created.
    fn resolve_member(
        &self,
        root: &mut PluginRoot<'_>,
        node: &mut ExprNode,
        ctx: &ResolveContext<'_>,
        scope_resolution: bool,
    ) -> PluginResult {
        let span = node.code.span();
        let object = &node.children[0];

        if object.is_str() {
            // The object is an unresolved dependency.
            node.children[1].suspended = None;
            node.children[1].flags |= ExpressionFlags::RECOGNIZED;
            node.flags |= ExpressionFlags::RECOGNIZED;
            return PluginResult::Succeeded;
        }

        let static_type = type_ref(root.state, object);
        let static_namespace = namespace_ref(root.state, object);
        let is_static = static_type.is_some() || static_namespace.is_some();
        if scope_resolution && !is_static {
            return fail(root, CompilationError::MustBeType { span: object.code.span() });
        }

        let scope = if let Some(ty) = static_type {
            root.state.types.struct_scope(ty)
        } else if static_namespace.is_some() {
            static_namespace
        } else {
            let Some(ty) = object.ty else {
                return fail(root, CompilationError::Untyped { span: object.code.span() });
            };
            let ty = root.state.types.non_ref(ty);
            if root.state.types.is_tuple(ty) {
                // Tuple members are bound by position when typed.
                node.children[1].suspended = None;
                node.children[1].flags |= ExpressionFlags::RECOGNIZED;
                node.flags |= ExpressionFlags::RECOGNIZED;
                return PluginResult::Succeeded;
            }
            root.state.types.struct_scope(ty)
        };

        let member = &node.children[1];
        let member_code = member.code.clone();
        let Some(scope) = scope else {
            let ty = object.ty.map_or_else(|| member_code.as_str().to_string(), |t| type_name(root.state, t));
            return fail(
                root,
                CompilationError::CantOpApplied {
                    op: Operator::Member.symbol().to_string(),
                    ty,
                    span,
                },
            );
        };

        let id = match member.kind {
            NodeKind::Id(id) => id,
            NodeKind::Str => {
                let name = member_code.as_str().to_string();
                let candidates = root.state.idents.members(scope, &name).to_vec();
                if candidates.is_empty() {
                    return fail(root, CompilationError::UnknownId { name, span: member_code.span() });
                }
                match select(root, &candidates, &name, ctx, member_code.span()) {
                    Some(id) => id,
                    None => return PluginResult::Failed,
                }
            }
            ref other => panic!("member access to {other:?}"),
        };

        let ident = root.state.idents.get(id).clone();
        if !root.state.idents.can_access(root.scope, id) {
            return fail(
                root,
                CompilationError::InaccessibleMember {
                    name: ident.name,
                    span: member_code.span(),
                },
            );
        }
        root.state.idents.mark_used(id);

        if let IdentKind::Constant(value) = &ident.kind {
            let constant = ExprNode::constant(value.clone(), ident.ty, member_code).with_flags(ExpressionFlags::RECOGNIZED);
            node.replace(constant);
            return PluginResult::Ready;
        }

        if is_static {
            if is_instance_member(root.state, id) {
                return fail(
                    root,
                    CompilationError::NonStatic {
                        name: ident.name,
                        span: member_code.span(),
                    },
                );
            }
            node.replace(ExprNode::id(id, member_code).with_flags(node.flags | ExpressionFlags::RECOGNIZED));
            return PluginResult::Ready;
        }

        if ident.is_static() || matches!(ident.kind, IdentKind::Type | IdentKind::Namespace(_)) {
            return fail(
                root,
                CompilationError::Static {
                    name: ident.name,
                    span: member_code.span(),
                },
            );
        }

        let Some(member) = root.complete_node(ExprNode::id(id, member_code).with_flags(ExpressionFlags::RECOGNIZED))
        else {
            return PluginResult::Failed;
        };
        node.children[1] = member;
        node.flags |= ExpressionFlags::RECOGNIZED;
        PluginResult::Succeeded
    }

    fn resolve_tuple(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode, ctx: &ResolveContext<'_>) -> PluginResult {
        let member_types: Vec<TypeId> = ctx
            .declaration_type
            .and_then(|ty| root.state.types.tuple_members(root.state.types.non_ref(ty)))
            .map(|members| members.iter().map(|m| m.ty).collect())
            .unwrap_or_default();

        for (index, child) in node.children.iter_mut().enumerate() {
            let child_ctx = ResolveContext {
                declaration_type: member_types.get(index).copied(),
                overload: None,
            };
            if self.resolve_node(root, child, &child_ctx) == PluginResult::Failed {
                return PluginResult::Failed;
            }
        }
        node.flags |= ExpressionFlags::RECOGNIZED;
        PluginResult::Succeeded
    }

    // ========================================================================
    // Operators needing context
    // ========================================================================

    fn resolve_assignment(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
        if self.resolve_node(root, &mut node.children[1], &ResolveContext::default()) == PluginResult::Failed {
            return PluginResult::Failed;
        }
        let ctx = ResolveContext {
            declaration_type: node.children[1].ty,
            overload: None,
        };
        self.resolve_node(root, &mut node.children[0], &ctx)
    }

    fn resolve_call(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
        if self.resolve_children(root, node, 1) == PluginResult::Failed
            || check_argument_order(root, &node.children[1..]) == PluginResult::Failed
        {
            return PluginResult::Failed;
        }

        let data = selection_data(&node.children[1..]);
        let ctx = ResolveContext {
            declaration_type: None,
            overload: data.as_ref(),
        };
        if self.resolve_node(root, &mut node.children[0], &ctx) == PluginResult::Failed {
            return PluginResult::Failed;
        }

        if type_ref(root.state, &node.children[0]).is_some() {
            // `T(args)` constructs a value.
            node.kind = NodeKind::Op(Operator::NewObject);
            return PluginResult::Ready;
        }

        let callee = node.children[0]
            .referenced_ident()
            .filter(|&id| root.state.idents.get(id).is_function());
        if let Some(function) = callee
            && process_params(root, node, function) == PluginResult::Failed
        {
            return PluginResult::Failed;
        }

        node.flags |= ExpressionFlags::RECOGNIZED;
        PluginResult::Succeeded
    }

    fn resolve_new_object(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
        if self.resolve_children(root, node, 0) == PluginResult::Failed {
            return PluginResult::Failed;
        }

        let type_node = &node.children[0];
        let Some(ty) = type_ref(root.state, type_node).or(node.ty) else {
            return fail(root, CompilationError::MustBeType { span: type_node.code.span() });
        };
        node.ty = Some(ty);
        node.flags |= ExpressionFlags::FIXED_TYPE;

        let constructors = root
            .state
            .types
            .struct_scope(ty)
            .map(|scope| root.state.idents.members_by_hash(scope, NameHash::constructor()).to_vec())
            .unwrap_or_default();
        let span = node.code.span();

        if constructors.is_empty() {
            if node.children.len() > 1 {
                return fail(
                    root,
                    CompilationError::ParamCount {
                        name: type_name(root.state, ty),
                        expected: 0,
                        found: node.children.len() - 1,
                        span,
                    },
                );
            }
        } else {
            let data = selection_data(&node.children[1..]).unwrap_or_default();
            let selected = root
                .state
                .report(resolve_overload(&constructors, &data, root.state, span));
            let Some(selected) = selected else {
                return PluginResult::Failed;
            };
            let code = node.children[0].code.clone();
            let Some(callee) =
                root.complete_node(ExprNode::id(selected.function, code).with_flags(ExpressionFlags::RECOGNIZED))
            else {
                return PluginResult::Failed;
            };
            node.children[0] = callee;
            if process_params(root, node, selected.function) == PluginResult::Failed {
                return PluginResult::Failed;
            }
        }

        node.flags |= ExpressionFlags::RECOGNIZED;
        PluginResult::Succeeded
    }
}

/// Members of a type scope that need an object.
fn is_instance_member(state: &CompilerState, id: IdentId) -> bool {
    let ident = state.idents.get(id);
    ident.needs_instance() && matches!(state.idents.scope(ident.scope).kind, ScopeKind::Type(_))
}

/// `this.member` for a member named without an object inside a method.
fn implicit_this_member(root: &mut PluginRoot<'_>, id: IdentId, code: CodeString) -> Option<ExprNode> {
    let this = root
        .state
        .idents
        .lookup(root.scope, "this")
        .iter()
        .copied()
        .find(|&t| root.state.idents.get(t).is_variable());

    let Some(this) = this else {
        let name = root.state.idents.get(id).name.clone();
        root.state
            .diagnostics
            .add(CompilationError::NonStatic { name, span: code.span() });
        return None;
    };
    root.state.idents.mark_used(this);

    let flags = ExpressionFlags::RECOGNIZED;
    let object = root.complete_node(ExprNode::id(this, CodeString::new("this", code.span())).with_flags(flags))?;
    let member = root.complete_node(ExprNode::id(id, code.clone()).with_flags(flags))?;
    Some(ExprNode::op(Operator::Member, vec![object, member], code).with_flags(flags))
}

/// Pick one identifier among same-named candidates.
fn select(
    root: &PluginRoot<'_>,
    candidates: &[IdentId],
    name: &str,
    ctx: &ResolveContext<'_>,
    span: Span,
) -> Option<IdentId> {
    let all_functions = candidates
        .iter()
        .all(|&id| root.state.idents.get(id).is_function());

    if all_functions && let Some(data) = ctx.overload {
        let result = resolve_overload(candidates, data, root.state, span);
        return root.state.report(result).map(|m| m.function);
    }

    match candidates {
        [only] => Some(*only),
        _ => {
            root.state.diagnostics.add(CompilationError::AmbiguousReference {
                name: name.to_string(),
                span,
            });
            None
        }
    }
}

/// Named arguments come last and name distinct parameters.
fn check_argument_order(root: &PluginRoot<'_>, args: &[ExprNode]) -> PluginResult {
    let mut names: Vec<&str> = Vec::new();
    for arg in args {
        match &arg.kind {
            NodeKind::NamedParameter(name) if names.contains(&name.as_str()) => {
                let name = name.clone();
                return fail(root, CompilationError::ParamAlreadySpecified { name, span: arg.code.span() });
            }
            NodeKind::NamedParameter(name) => names.push(name),
            _ if !names.is_empty() => {
                return fail(root, CompilationError::UnnamedParamAfterNamed { span: arg.code.span() });
            }
            _ => {}
        }
    }
    PluginResult::Succeeded
}

/// Argument types of a call; `None` when an argument is untyped.
fn selection_data(args: &[ExprNode]) -> Option<OverloadSelectionData> {
    let mut data = OverloadSelectionData::new();
    for arg in args {
        let (value, named) = match &arg.kind {
            NodeKind::NamedParameter(name) => (arg.children.first()?, Some(name.clone())),
            _ => (arg, None),
        };
        let ty = value.ty?;
        let overload_arg = match value.const_value() {
            Some(constant) => OverloadArg::constant(ty, constant.clone()),
            None => OverloadArg::new(ty),
        };
        match named {
            Some(name) => data.named.push((name, overload_arg)),
            None => data.positional.push(overload_arg),
        }
    }
    Some(data)
}

/// Bind the arguments of a call (children after the callee) to the
/// parameters of `function`: named arguments by name, defaults for missing
/// ones and extra arguments packed into the variadic array.
pub(crate) fn process_params(root: &mut PluginRoot<'_>, node: &mut ExprNode, function: IdentId) -> PluginResult {
    let ident = root.state.idents.get(function);
    let Some(info) = ident.function().cloned() else {
        return PluginResult::Succeeded;
    };
    let function_name = ident.name.clone();
    let span = node.code.span();
    let fixed = if info.variadic {
        info.params.len().saturating_sub(1)
    } else {
        info.params.len()
    };

    let args = node.children.split_off(1);
    let found = args.len();
    let mut bound: Vec<Option<ExprNode>> = vec![None; info.params.len()];
    let mut extras = Vec::new();
    let mut positional = 0;
    let mut seen_named = false;

    for mut arg in args {
        if let NodeKind::NamedParameter(param_name) = &arg.kind {
            seen_named = true;
            let Some(index) = info.params.iter().position(|p| &p.name == param_name) else {
                let name = param_name.clone();
                return fail(root, CompilationError::UnknownId { name, span: arg.code.span() });
            };
            if bound[index].is_some() {
                let name = param_name.clone();
                return fail(root, CompilationError::ParamAlreadySpecified { name, span: arg.code.span() });
            }
            arg.unwrap_child(0);
            bound[index] = Some(arg);
            continue;
        }

        if seen_named {
            return fail(root, CompilationError::UnnamedParamAfterNamed { span: arg.code.span() });
        }
        if positional < fixed {
            bound[positional] = Some(arg);
        } else if info.variadic {
            extras.push(arg);
        } else {
            return fail(
                root,
                CompilationError::ParamCount {
                    name: function_name,
                    expected: info.params.len(),
                    found,
                    span,
                },
            );
        }
        positional += 1;
    }

    for (index, param) in info.params.iter().enumerate() {
        if info.variadic && index == fixed {
            if bound[index].is_some() {
                if !extras.is_empty() {
                    return fail(
                        root,
                        CompilationError::ParamAlreadySpecified {
                            name: param.name.clone(),
                            span,
                        },
                    );
                }
                continue;
            }
            let array = ExprNode::op(Operator::Array, std::mem::take(&mut extras), node.code.clone())
                .with_type(param.ty)
                .with_flags(ExpressionFlags::FIXED_TYPE | ExpressionFlags::RECOGNIZED);
            let Some(array) = root.complete_node(array) else {
                return PluginResult::Failed;
            };
            bound[index] = Some(array);
            continue;
        }

        if bound[index].is_some() {
            continue;
        }
        if let Some(default) = &param.default {
            let ty = root.state.types.non_ref(param.ty);
            let constant = ExprNode::constant(default.clone(), ty, node.code.clone())
                .with_flags(ExpressionFlags::RECOGNIZED);
            let Some(constant) = root.complete_node(constant) else {
                return PluginResult::Failed;
            };
            bound[index] = Some(constant);
        } else if seen_named {
            return fail(
                root,
                CompilationError::ParamNotSpecified {
                    name: param.name.clone(),
                    span,
                },
            );
        } else {
            return fail(
                root,
                CompilationError::ParamCount {
                    name: function_name,
                    expected: info.params.len(),
                    found,
                    span,
                },
            );
        }
    }

    node.children.extend(bound.into_iter().flatten());
    PluginResult::Succeeded
}

#[cfg(test)]
mod tests {
    use super::*;
    use zinnia_core::{Access, ConstValue, FunctionInfo, IdentFlags, Param, ScopeId};

    use crate::testing::*;

    #[test]
    fn local_names_bind_to_their_identifier() {
        let mut f = Fixture::new();
        let int32 = f.int32();
        let x = f.local("x", int32);
        let expr = f.process(op(Operator::Add, vec![name("x"), int(1)])).unwrap();
        assert_eq!(expr.root.children[0].ident(), Some(x));
        assert_eq!(expr.root.ty, Some(int32));
    }

    #[test]
    fn unknown_names_are_reported() {
        let mut f = Fixture::new();
        assert!(f.process(name("nope")).is_none());
        assert_eq!(f.count(|e| matches!(e, CompilationError::UnknownId { name, .. } if name == "nope")), 1);
    }

    #[test]
    fn named_constants_become_values() {
        let mut f = Fixture::new();
        let int32 = f.int32();
        f.state
            .idents
            .declare(
                ScopeId::GLOBAL,
                Identifier::new("LIMIT", IdentKind::Constant(ConstValue::integer(64)), int32, Span::default()),
            )
            .unwrap();
        let expr = f.process(op(Operator::Multiply, vec![name("LIMIT"), int(2)])).unwrap();
        assert_eq!(expr.root.const_value(), Some(&ConstValue::integer(128)));
    }

    #[test]
    fn calls_select_overload_and_fill_defaults() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        f.function("f", vec![Param::new("a", b.int32)], b.void);
        let g = f.function(
            "f",
            vec![Param::new("a", b.float64), Param::new("scale", b.int32).with_default(ConstValue::integer(2))],
            b.void,
        );
        let expr = f.process(call("f", vec![double(1.5)])).unwrap();
        assert_eq!(expr.root.children[0].ident(), Some(g));
        assert_eq!(expr.root.children.len(), 3);
        assert_eq!(expr.root.children[2].const_value(), Some(&ConstValue::integer(2)));
    }

    #[test]
    fn named_arguments_are_reordered() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        f.function("clamp", vec![Param::new("low", b.int32), Param::new("high", b.int32)], b.int32);
        let raw = call(
            "clamp",
            vec![ExprNode::named_parameter("high", int(9), code("high: 9")), ExprNode::named_parameter("low", int(1), code("low: 1"))],
        );
        let expr = f.process(raw).unwrap();
        let values: Vec<_> = expr.root.children[1..].iter().map(|c| c.const_value().cloned()).collect();
        assert_eq!(values, vec![Some(ConstValue::integer(1)), Some(ConstValue::integer(9))]);
    }

    #[test]
    fn argument_binding_errors() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        f.function("g", vec![Param::new("a", b.int32), Param::new("b", b.int32)], b.void);
        let named = |param: &str, value: i64| ExprNode::named_parameter(param, int(value), code(param));

        assert!(f.process(call("g", vec![named("a", 1), int(2)])).is_none());
        assert!(f.process(call("g", vec![named("a", 1), named("a", 2)])).is_none());
        assert!(f.process(call("g", vec![int(1), named("a", 2)])).is_none());

        assert_eq!(f.count(|e| matches!(e, CompilationError::UnnamedParamAfterNamed { .. })), 1);
        assert_eq!(f.count(|e| matches!(e, CompilationError::ParamAlreadySpecified { .. })), 1);
        assert_eq!(f.count(|e| matches!(e, CompilationError::NoMatchingOverload { .. })), 1);
    }

    #[test]
    fn variadic_extras_are_packed() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        let array = f.state.types.ref_array(b.int32, 1);
        let mut info = FunctionInfo::new(vec![Param::new("first", b.int32), Param::new("rest", array)], b.void);
        info.variadic = true;
        f.function_in(ScopeId::GLOBAL, "sum", info);

        let expr = f.process(call("sum", vec![int(1), int(2), int(3)])).unwrap();
        assert_eq!(expr.root.children.len(), 3);
        let packed = &expr.root.children[2];
        assert_eq!(packed.ty, Some(array));
    }

    #[test]
    fn members_inside_methods_use_implicit_this() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        let (point, scope) = f.state.declare_struct("Point", ScopeId::GLOBAL, false).unwrap();
        let x = f
            .state
            .idents
            .declare(scope, Identifier::new("x", IdentKind::Variable(VariableKind::Member), b.int32, Span::default()))
            .unwrap();
        let method = f.state.function_scope(scope, b.int32, Some(point));
        f.state
            .idents
            .declare_parameter(method, "this", point, Span::default())
            .unwrap();
        f.scope = method;

        let expr = f.process(name("x")).unwrap();
        assert!(expr.root.is_op(Operator::Member));
        assert_eq!(expr.root.children[1].ident(), Some(x));
        assert_eq!(expr.root.ty, Some(b.int32));
    }

    #[test]
    fn instance_members_need_an_object() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        let (_, scope) = f.state.declare_struct("Point", ScopeId::GLOBAL, false).unwrap();
        f.state
            .idents
            .declare(scope, Identifier::new("x", IdentKind::Variable(VariableKind::Member), b.int32, Span::default()))
            .unwrap();

        let raw = ExprNode::op(Operator::ScopeResolution, vec![name("Point"), name("x")], code("Point::x"));
        assert!(f.process(raw).is_none());
        assert_eq!(f.count(|e| matches!(e, CompilationError::NonStatic { .. })), 1);
    }

    #[test]
    fn enum_members_fold_to_constants() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        let (color, scope) = f.state.declare_enum("Color", b.int32, ScopeId::GLOBAL).unwrap();
        f.state
            .idents
            .declare(scope, Identifier::new("Green", IdentKind::Constant(ConstValue::integer(1)), color, Span::default()))
            .unwrap();

        let expr = f.process(member(name("Color"), "Green")).unwrap();
        assert_eq!(expr.root.const_value(), Some(&ConstValue::integer(1)));
        assert_eq!(expr.root.ty, Some(color));
    }

    #[test]
    fn private_members_are_inaccessible_outside() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        let (point, scope) = f.state.declare_struct("Point", ScopeId::GLOBAL, false).unwrap();
        f.state
            .idents
            .declare(
                scope,
                Identifier::new("secret", IdentKind::Variable(VariableKind::Member), b.int32, Span::default())
                    .with_access(Access::Private),
            )
            .unwrap();
        f.local("p", point);

        assert!(f.process(member(name("p"), "secret")).is_none());
        assert_eq!(f.count(|e| matches!(e, CompilationError::InaccessibleMember { .. })), 1);
    }

    #[test]
    fn static_members_reject_instances() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        let (point, scope) = f.state.declare_struct("Point", ScopeId::GLOBAL, false).unwrap();
        f.state
            .idents
            .declare(
                scope,
                Identifier::new("count", IdentKind::Variable(VariableKind::Global), b.int32, Span::default())
                    .with_flags(IdentFlags::STATIC),
            )
            .unwrap();
        f.local("p", point);

        assert!(f.process(member(name("p"), "count")).is_none());
        assert!(f.process(member(name("Point"), "count")).is_some());
        assert_eq!(f.count(|e| matches!(e, CompilationError::Static { .. })), 1);
    }

    #[test]
    fn assignment_targets_can_be_auto_declared() {
        let mut f = Fixture::new();
        let scope = f.scope;
        let mut root = PluginRoot::new(
            &mut f.state,
            scope,
            vec![
                crate::pipeline::Stage::IdRecognizer(IdRecognizer::new(IdRecognizerOptions {
                    auto_declare: AutoDeclareMode::Enabled,
                    do_not_fail: false,
                })),
                crate::pipeline::Stage::TypeMngr(crate::plugins::TypeMngr::default()),
            ],
        );
        let expr = root.process(assign(name("fresh"), double(2.0))).unwrap();
        let id = expr.root.children[0].ident().unwrap();
        drop(root);
        assert_eq!(f.state.idents.get(id).ty, f.state.types.builtins().float64);
        assert_eq!(f.state.idents.lookup(scope, "fresh"), &[id]);
    }
}
