//! Lowering stage.
//!
//! Runs last. Property reads and writes become calls of their accessor
//! functions, `++` and `--` become assignments and identifiers declared by
//! the expression are checked to be assigned on every path before they are
//! published in their scope.
//!
//! Read-modify-write operations evaluate the receiver once: everything but
//! plain identifiers and constants in the target is moved into a linked
//! node shared by the read and the write.

use tracing::{debug, trace};
use zinnia_core::{CodeString, CompilationError, ConstValue, IdentId, IdentKind, Operator};

use super::fail;
use super::type_mngr::indexed_property;
use crate::node::{ExprNode, ExpressionFlags, LinkId, NodeKind, NodeVariables};
use crate::pipeline::{ExpressionPlugin, PluginResult, PluginRoot};
use crate::state::CompilerState;

/// The lowering stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompilerPlugin;

impl ExpressionPlugin for CompilerPlugin {
    fn new_node(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
        if node.ty.is_none() {
            return PluginResult::Succeeded;
        }
        if !extract_linked_getters(root, node) {
            return PluginResult::Failed;
        }
        let NodeKind::Op(op) = node.kind else {
            return PluginResult::Succeeded;
        };
        if !check_initialized_children(root, node, op) {
            return PluginResult::Failed;
        }

        if op.is_inc_dec() {
            return increment(root, node, op);
        }
        for index in 0..node.children.len() {
            if is_write_position(root.state, node, op, index) {
                continue;
            }
            if !extract_getters(root, &mut node.children[index]) {
                return PluginResult::Failed;
            }
        }

        if op == Operator::Assignment {
            return assignment(root, node);
        }
        PluginResult::Succeeded
    }

    fn end(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
        if node.ty.is_some() && !extract_getters(root, node) {
            return PluginResult::Failed;
        }
        if must_be_assigned(node) {
            let name = node.code.as_str().to_string();
            return fail(root, CompilationError::MustHaveInitVal { name, span: node.code.span() });
        }
        copy_elision(root, node);

        let vars = NodeVariables::collect(node, root.links(), &root.state.idents);
        let declared = std::mem::take(&mut root.declared);
        let mut succeeded = true;
        for &id in &declared {
            let ident = root.state.idents.get(id);
            let use_site = vars.used_before_assign.iter().find(|(used, _)| *used == id);
            let error = if let Some(&(_, span)) = use_site {
                CompilationError::MustHaveInitVal { name: ident.name.clone(), span }
            } else if !vars.is_assigned(id) {
                CompilationError::UnassignedVar { name: ident.name.clone(), span: ident.declaration }
            } else {
                continue;
            };
            root.state.diagnostics.add(error);
            succeeded = false;
        }

        if !succeeded {
            root.declared = declared;
            return PluginResult::Failed;
        }
        for &id in &declared {
            root.state.idents.publish(id);
        }
        if !declared.is_empty() {
            debug!(count = declared.len(), "declared identifiers published");
        }
        root.declared = declared;
        PluginResult::Succeeded
    }

    fn on_identifier_declared(&self, root: &mut PluginRoot<'_>, id: IdentId) {
        trace!(name = %root.state.idents.get(id).name, "declaration awaits assignment");
    }
}

// ============================================================================
// Declared identifiers
// ============================================================================

/// Whether a node is a declared identifier that still needs its value,
/// directly or as a tuple member.
fn must_be_assigned(node: &ExprNode) -> bool {
    if node.is_op(Operator::Tuple) {
        return node.children.iter().any(must_be_assigned);
    }
    node.flags.contains(ExpressionFlags::ID_MUST_BE_ASSIGNED)
}

/// Assignment targets lose the mark; anything else that reads a marked
/// identifier is an error.
fn check_initialized_children(root: &PluginRoot<'_>, node: &mut ExprNode, op: Operator) -> bool {
    if op == Operator::Tuple {
        return true;
    }
    for (index, child) in node.children.iter_mut().enumerate() {
        if op == Operator::Assignment && index == 0 {
            clear_must_be_assigned(child);
        } else if must_be_assigned(child) {
            root.state.diagnostics.add(CompilationError::MustHaveInitVal {
                name: child.code.as_str().to_string(),
                span: child.code.span(),
            });
            return false;
        }
    }
    true
}

fn clear_must_be_assigned(target: &mut ExprNode) {
    target.flags.remove(ExpressionFlags::ID_MUST_BE_ASSIGNED);
    if target.is_op(Operator::Tuple) {
        target.children.iter_mut().for_each(clear_must_be_assigned);
    }
}

/// `a = b` where `b` was declared by this expression stores directly into
/// `a`: the assignment becomes `a` and the linked computations assigning
/// `b` assign `a` instead.
///
/// Runs on the finished tree. `b` may appear nowhere but in the assignment
/// and the links it owns, and those links may not touch `a`.
fn copy_elision(root: &mut PluginRoot<'_>, node: &mut ExprNode) {
    let mut copies = Vec::new();
    node.for_each(&mut |n| {
        if n.is_op(Operator::Assignment)
            && let (Some(target), Some(value)) = (n.children[0].ident(), n.children[1].ident())
        {
            copies.push((target, value, n.links.clone()));
        }
    });

    for (target, value, owned) in copies {
        if !is_elidable(root, node, target, value, &owned) {
            continue;
        }
        root.declared.retain(|&id| id != value);
        for &link in &owned {
            root.links_mut().get_mut(link).node.rename_ident(value, target);
        }
        replace_copy(node, target, value);
    }
}

fn is_elidable(root: &PluginRoot<'_>, tree: &ExprNode, target: IdentId, value: IdentId, owned: &[LinkId]) -> bool {
    let idents = &root.state.idents;
    if target == value
        || !root.declared.contains(&value)
        || !idents.get(target).is_variable()
        || !idents.get(value).is_variable()
    {
        return false;
    }

    let links = root.links();
    let in_owned = |id: IdentId| owned.iter().map(|&l| links.get(l).node.count_ident(id)).sum::<usize>();
    let everywhere = tree.count_ident(value) + links.iter().map(|(_, l)| l.node.count_ident(value)).sum::<usize>();
    in_owned(target) == 0 && everywhere == 1 + in_owned(value)
}

fn replace_copy(node: &mut ExprNode, target: IdentId, value: IdentId) -> bool {
    if node.is_op(Operator::Assignment)
        && node.children[0].ident() == Some(target)
        && node.children[1].ident() == Some(value)
    {
        trace!(code = node.code.as_str(), "copy elided");
        let code = node.children[0].code.clone();
        let ty = node.children[0].ty;
        let mut elided = ExprNode::id(target, code).with_flags(ExpressionFlags::RECOGNIZED);
        elided.ty = ty;
        node.replace(elided);
        return true;
    }
    node.children.iter_mut().any(|child| replace_copy(child, target, value))
}

// ============================================================================
// Properties
// ============================================================================

/// The property `node` reads or writes: `P`, `object.P`, or an indexed
/// property access `object.P[i]`.
fn property_access(state: &CompilerState, node: &ExprNode) -> Option<IdentId> {
    let plain = |id: IdentId| {
        let info = state.idents.get(id).property()?;
        info.index_params.is_empty().then_some(id)
    };
    match node.kind {
        NodeKind::Id(id) => plain(id),
        NodeKind::Op(Operator::Member) => node.children[1].ident().and_then(plain),
        NodeKind::Op(Operator::Index) => indexed_property(state, &node.children[0]),
        _ => None,
    }
}

/// Operands that are written or accessed as a location rather than read.
fn is_write_position(state: &CompilerState, node: &ExprNode, op: Operator, index: usize) -> bool {
    match op {
        Operator::Assignment | Operator::Increase | Operator::Decrease => index == 0,
        Operator::Member => index == 1,
        Operator::Index => index == 0 && indexed_property(state, &node.children[0]).is_some(),
        Operator::Address | Operator::Tuple => true,
        op => op.is_reference(),
    }
}

/// Replace a property read by a getter call. Members of a tuple are read
/// one by one. Returns `false` if a getter is missing.
fn extract_getters(root: &mut PluginRoot<'_>, node: &mut ExprNode) -> bool {
    if node.is_op(Operator::Tuple) {
        return node.children.iter_mut().all(|member| extract_getters(root, member));
    }
    if property_access(root.state, node).is_none() {
        return true;
    }
    let access = node.take();
    match accessor_call(root, access, None) {
        Some(call) => {
            *node = call;
            true
        }
        None => false,
    }
}

fn extract_linked_getters(root: &mut PluginRoot<'_>, node: &ExprNode) -> bool {
    for &link in &node.links {
        let mut linked = root.links_mut().get_mut(link).node.take();
        let extracted = extract_getters(root, &mut linked);
        root.links_mut().get_mut(link).node = linked;
        if !extracted {
            return false;
        }
    }
    true
}

/// Call of the getter, or of the setter with `value` as last argument, of
/// the property `access` refers to.
fn accessor_call(root: &mut PluginRoot<'_>, mut access: ExprNode, value: Option<ExprNode>) -> Option<ExprNode> {
    let code = access.code.clone();
    let mut links = std::mem::take(&mut access.links);
    let (mut holder, mut args) = if access.is_op(Operator::Index) {
        let mut children = std::mem::take(&mut access.children);
        let holder = children.remove(0);
        (holder, children)
    } else {
        (access, Vec::new())
    };

    let property = holder.referenced_ident()?;
    let ident = root.state.idents.get(property);
    let name = ident.name.clone();
    let accessor = match (&ident.kind, value.is_some()) {
        (IdentKind::Property(info), true) => info.setter,
        (IdentKind::Property(info), false) => info.getter,
        _ => None,
    };
    let span = holder.code.span();
    let Some(accessor) = accessor else {
        let error = if value.is_some() {
            CompilationError::NoPropertySetter { name, span }
        } else {
            CompilationError::NoPropertyGetter { name, span }
        };
        root.state.diagnostics.add(error);
        return None;
    };
    if !root.state.idents.can_access(root.scope, accessor) {
        let name = root.state.idents.get(accessor).name.clone();
        root.state.diagnostics.add(CompilationError::InaccessibleMember { name, span });
        return None;
    }

    let flags = ExpressionFlags::RECOGNIZED;
    links.append(&mut holder.links);
    let function = root.complete_node(ExprNode::id(accessor, holder.code.clone()).with_flags(flags))?;
    let callee = if holder.is_op(Operator::Member) {
        let object = holder.children.swap_remove(0);
        let member = ExprNode::op(Operator::Member, vec![object, function], holder.code.clone());
        root.complete_node(member.with_flags(flags))?
    } else {
        function
    };

    trace!(property = name.as_str(), setter = value.is_some(), "property access lowered");
    let mut children = vec![callee];
    children.append(&mut args);
    children.extend(value);
    let call = ExprNode::op(Operator::Call, children, code).with_flags(flags).with_links(links);
    root.complete_node(call)
}

// ============================================================================
// Assignments
// ============================================================================

fn assignment(root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
    if node.children[0].is_op(Operator::Tuple)
        && node.children[0].children.iter().any(|m| property_access(root.state, m).is_some())
    {
        return tuple_assignment(root, node);
    }
    if property_access(root.state, &node.children[0]).is_none() {
        return PluginResult::Succeeded;
    }

    let value = node.children.swap_remove(1);
    let target = node.children.swap_remove(0);
    match accessor_call(root, target, Some(value)) {
        Some(call) => {
            node.replace(call);
            PluginResult::Ready
        }
        None => PluginResult::Failed,
    }
}

/// `(a, obj.P) = value` assigns every member on its own, so property members
/// can call their setter. The value is computed once.
fn tuple_assignment(root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
    let code = node.code.clone();
    let mut value = node.children.swap_remove(1);
    let targets = std::mem::take(&mut node.children[0].children);

    let mut links = Vec::new();
    let values = if value.is_op(Operator::Tuple) && value.children.len() == targets.len() {
        links.append(&mut value.links);
        std::mem::take(&mut value.children)
    } else {
        let link = root.new_link(value);
        links.push(link);
        let mut members = Vec::with_capacity(targets.len());
        for position in 1..=targets.len() {
            let Some(shared) = root.linking_node(link) else {
                return PluginResult::Failed;
            };
            let name = ExprNode::new(NodeKind::Str, CodeString::new(format!("Item{position}"), code.span()))
                .with_flags(ExpressionFlags::RECOGNIZED);
            let member = ExprNode::op(Operator::Member, vec![shared, name], code.clone())
                .with_flags(ExpressionFlags::RECOGNIZED);
            let Some(member) = root.complete_node(member) else {
                return PluginResult::Failed;
            };
            members.push(member);
        }
        members
    };

    let mut assignments = Vec::with_capacity(targets.len());
    for (target, value) in targets.into_iter().zip(values) {
        let assign = ExprNode::op(Operator::Assignment, vec![target, value], code.clone())
            .with_flags(ExpressionFlags::RECOGNIZED);
        let Some(assign) = root.complete_node(assign) else {
            return PluginResult::Failed;
        };
        assignments.push(assign);
    }

    let tuple = ExprNode::op(Operator::Tuple, assignments, code)
        .with_flags(ExpressionFlags::RECOGNIZED)
        .with_links(links);
    match root.complete_node(tuple) {
        Some(tuple) => {
            node.replace(tuple);
            PluginResult::Ready
        }
        None => PluginResult::Failed,
    }
}

/// `x++` is `x = x + 1`, `x--` is `x = x - 1`.
fn increment(root: &mut PluginRoot<'_>, node: &mut ExprNode, op: Operator) -> PluginResult {
    let Some(ty) = node.ty else {
        return PluginResult::Succeeded;
    };
    let types = &root.state.types;
    let (one, one_ty) = if types.is_pointer(ty) {
        (ConstValue::integer(1), root.state.config.index_type(types))
    } else {
        match ConstValue::integer(1).convert_to_type(ty, types) {
            Some(one) => (one, ty),
            None => return PluginResult::Succeeded,
        }
    };

    let code = node.code.clone();
    let Some(one) = root.complete_node(ExprNode::constant(one, one_ty, code.clone()).with_flags(ExpressionFlags::RECOGNIZED))
    else {
        return PluginResult::Failed;
    };
    let target = node.children[0].take();
    let operation = if op == Operator::Increase { Operator::Add } else { Operator::Subtract };
    match compound_assignment(root, target, operation, one, code) {
        Some(assignment) => {
            node.replace(assignment);
            PluginResult::Ready
        }
        None => PluginResult::Failed,
    }
}

/// Build the processed `target = target <op> value`.
///
/// Parts of `target` that have to be computed, like the object of a member
/// access or the indices of an element access, are linked so the read and
/// the write share one evaluation. The links are owned by the returned
/// assignment.
pub fn compound_assignment(
    root: &mut PluginRoot<'_>,
    target: ExprNode,
    op: Operator,
    value: ExprNode,
    code: CodeString,
) -> Option<ExprNode> {
    let mut links = Vec::new();
    let (read, write) = share_target(root, target, &mut links)?;

    let operation = ExprNode::op(op, vec![read, value], code.clone()).with_flags(ExpressionFlags::RECOGNIZED);
    let operation = root.complete_node(operation)?;
    let assignment = ExprNode::op(Operator::Assignment, vec![write, operation], code)
        .with_flags(ExpressionFlags::RECOGNIZED)
        .with_links(links);
    root.complete_node(assignment)
}

/// Two copies of an assignment target sharing everything they compute.
fn share_target(
    root: &mut PluginRoot<'_>,
    mut target: ExprNode,
    links: &mut Vec<LinkId>,
) -> Option<(ExprNode, ExprNode)> {
    links.append(&mut target.links);
    match target.kind {
        NodeKind::Id(_) | NodeKind::Linking(_) | NodeKind::Const(_) => Some((target.clone(), target)),
        NodeKind::Op(op @ (Operator::Member | Operator::Index)) => {
            // The member of a member access is a name, not a computation.
            let computed = if op == Operator::Member { 1 } else { target.children.len() };
            let mut read = Vec::with_capacity(target.children.len());
            let mut write = Vec::with_capacity(target.children.len());
            for (index, child) in target.children.into_iter().enumerate() {
                if index >= computed || is_simple(&child) {
                    read.push(child.clone());
                    write.push(child);
                } else {
                    let link = root.new_link(child);
                    links.push(link);
                    read.push(root.linking_node(link)?);
                    write.push(root.linking_node(link)?);
                }
            }
            let flags = ExpressionFlags::RECOGNIZED;
            let read = root.complete_node(ExprNode::op(op, read, target.code.clone()).with_flags(flags))?;
            let write = root.complete_node(ExprNode::op(op, write, target.code).with_flags(flags))?;
            Some((read, write))
        }
        _ => {
            let code = target.code.clone();
            let link = root.new_link(target);
            links.push(link);
            let read = root.linking_node(link)?;
            let write = root.complete_node(ExprNode::linking(link, code))?;
            Some((read, write))
        }
    }
}

/// Nodes that can be repeated without computing anything twice.
fn is_simple(node: &ExprNode) -> bool {
    node.links.is_empty()
        && matches!(
            node.kind,
            NodeKind::Id(_) | NodeKind::Const(_) | NodeKind::Linking(_) | NodeKind::Str | NodeKind::DataPointer(_)
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use zinnia_core::{Access, FunctionInfo, Identifier, Param, PropertyInfo, ScopeId, Span, TypeId};

    use crate::node::LinkedNodeFlags;
    use crate::testing::*;

    struct Widget {
        ty: TypeId,
        getter: IdentId,
        setter: IdentId,
    }

    fn method(f: &mut Fixture, scope: ScopeId, name: &str, info: FunctionInfo) -> IdentId {
        let params = info.params.iter().map(|p| p.ty).collect();
        let ty = f.state.types.function(info.ret, params);
        f.state
            .idents
            .declare(scope, Identifier::new(name, IdentKind::Function(info), ty, Span::default()))
            .unwrap()
    }

    /// A class `Widget` with a read-write `Size`, a read-only `Id` and an
    /// indexer over `int32`.
    fn widget(f: &mut Fixture) -> Widget {
        let b = f.state.types.builtins();
        let (ty, scope) = f.state.declare_struct("Widget", ScopeId::GLOBAL, true).unwrap();

        let getter = method(f, scope, "get_Size", FunctionInfo::new(vec![], b.int32));
        let setter = method(f, scope, "set_Size", FunctionInfo::new(vec![Param::new("value", b.int32)], b.void));
        let size = PropertyInfo { getter: Some(getter), setter: Some(setter), index_params: vec![] };
        f.state
            .idents
            .declare(scope, Identifier::new("Size", IdentKind::Property(size), b.int32, Span::default()))
            .unwrap();

        let get_id = method(f, scope, "get_Id", FunctionInfo::new(vec![], b.int32));
        let id = PropertyInfo { getter: Some(get_id), setter: None, index_params: vec![] };
        f.state
            .idents
            .declare(scope, Identifier::new("Id", IdentKind::Property(id), b.int32, Span::default()))
            .unwrap();

        let get_item = method(f, scope, "get_Item", FunctionInfo::new(vec![Param::new("i", b.int32)], b.float64));
        let set_item = method(
            f,
            scope,
            "set_Item",
            FunctionInfo::new(vec![Param::new("i", b.int32), Param::new("value", b.float64)], b.void),
        );
        let indexer = PropertyInfo {
            getter: Some(get_item),
            setter: Some(set_item),
            index_params: vec![Param::new("i", b.int32)],
        };
        f.state
            .idents
            .declare(
                scope,
                Identifier::new(crate::plugins::type_mngr::INDEXER, IdentKind::Property(indexer), b.float64, Span::default()),
            )
            .unwrap();

        Widget { ty, getter, setter }
    }

    fn callee(call: &ExprNode) -> Option<IdentId> {
        assert!(call.is_op(Operator::Call), "expected a call, got {:?}", call.kind);
        call.children[0].referenced_ident()
    }

    fn calls(expr: &crate::pipeline::Expression) -> usize {
        let mut count = 0;
        let mut visit = |n: &ExprNode| {
            if n.is_op(Operator::Call) {
                count += 1;
            }
        };
        expr.root.for_each(&mut visit);
        for (_, linked) in expr.links.iter() {
            linked.node.for_each(&mut visit);
        }
        count
    }

    #[test]
    fn property_reads_call_the_getter() {
        let mut f = Fixture::new();
        let w = widget(&mut f);
        f.local("w", w.ty);

        let expr = f.process(op(Operator::Add, vec![member(name("w"), "Size"), int(1)])).unwrap();
        assert_eq!(callee(&expr.root.children[0]), Some(w.getter));

        let expr = f.process(member(name("w"), "Size")).unwrap();
        assert_eq!(callee(&expr.root), Some(w.getter));
    }

    #[test]
    fn property_writes_call_the_setter() {
        let mut f = Fixture::new();
        let w = widget(&mut f);
        f.local("w", w.ty);

        let expr = f.process(assign(member(name("w"), "Size"), int(3))).unwrap();
        assert_eq!(callee(&expr.root), Some(w.setter));
        assert_eq!(expr.root.children.len(), 2);
        assert_eq!(expr.root.children[1].const_value(), Some(&ConstValue::integer(3)));
    }

    #[test]
    fn missing_accessors_are_reported() {
        let mut f = Fixture::new();
        let w = widget(&mut f);
        f.local("w", w.ty);

        assert!(f.process(assign(member(name("w"), "Id"), int(3))).is_none());
        assert_eq!(f.count(|e| matches!(e, CompilationError::NoPropertySetter { .. })), 1);
    }

    #[test]
    fn private_accessors_are_inaccessible() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        let (ty, scope) = f.state.declare_struct("Secret", ScopeId::GLOBAL, true).unwrap();
        let info = FunctionInfo::new(vec![], b.int32);
        let fn_ty = f.state.types.function(b.int32, vec![]);
        let getter = f
            .state
            .idents
            .declare(
                scope,
                Identifier::new("get_Value", IdentKind::Function(info), fn_ty, Span::default()).with_access(Access::Private),
            )
            .unwrap();
        let value = PropertyInfo { getter: Some(getter), setter: None, index_params: vec![] };
        f.state
            .idents
            .declare(scope, Identifier::new("Value", IdentKind::Property(value), b.int32, Span::default()))
            .unwrap();
        f.local("s", ty);

        assert!(f.process(member(name("s"), "Value")).is_none());
        assert_eq!(f.count(|e| matches!(e, CompilationError::InaccessibleMember { .. })), 1);
    }

    #[test]
    fn indexers_take_their_indices_as_arguments() {
        let mut f = Fixture::new();
        let w = widget(&mut f);
        f.local("w", w.ty);

        let raw = assign(op(Operator::Index, vec![name("w"), int(2)]), double(0.5));
        let expr = f.process(raw).unwrap();
        assert!(expr.root.is_op(Operator::Call));
        assert_eq!(expr.root.children.len(), 3);
        assert_eq!(expr.root.children[1].const_value(), Some(&ConstValue::integer(2)));
        assert_eq!(expr.root.children[2].const_value(), Some(&ConstValue::Double(0.5)));
    }

    #[test]
    fn increments_become_assignments() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        let x = f.local("x", b.uint8);

        let expr = f.process(op(Operator::Increase, vec![name("x")])).unwrap();
        assert!(expr.root.is_op(Operator::Assignment));
        assert_eq!(expr.root.children[0].ident(), Some(x));
        let sum = &expr.root.children[1];
        assert!(sum.is_op(Operator::Add));
        assert_eq!(sum.ty, Some(b.uint8));
        assert_eq!(sum.children[1].const_value(), Some(&ConstValue::integer(1)));

        let expr = f.process(op(Operator::Decrease, vec![name("x")])).unwrap();
        assert!(expr.root.children[1].is_op(Operator::Subtract));
    }

    #[test]
    fn element_increments_compute_the_index_once() {
        let mut f = Fixture::new();
        let int32 = f.int32();
        let array = f.state.types.fixed_array(int32, vec![4]);
        f.local("arr", array);
        f.function("next", vec![], int32);

        let raw = op(Operator::Increase, vec![op(Operator::Index, vec![name("arr"), call("next", vec![])])]);
        let expr = f.process(raw).unwrap();
        assert!(expr.root.is_op(Operator::Assignment));
        assert_eq!(expr.root.links.len(), 1);
        assert_eq!(calls(&expr), 1);
        assert_eq!(expr.links.linking_count(&expr.root, expr.root.links[0]), 2);
    }

    #[test]
    fn property_increments_call_getter_then_setter() {
        let mut f = Fixture::new();
        let w = widget(&mut f);
        f.local("w", w.ty);

        let expr = f.process(op(Operator::Increase, vec![member(name("w"), "Size")])).unwrap();
        assert_eq!(callee(&expr.root), Some(w.setter));
        let sum = &expr.root.children[1];
        assert!(sum.is_op(Operator::Add));
        assert_eq!(callee(&sum.children[0]), Some(w.getter));
    }

    #[test]
    fn tuple_targets_assign_properties_one_by_one() {
        let mut f = Fixture::new();
        let w = widget(&mut f);
        let int32 = f.int32();
        let x = f.local("x", int32);
        f.local("w", w.ty);

        let raw = assign(
            op(Operator::Tuple, vec![name("x"), member(name("w"), "Size")]),
            op(Operator::Tuple, vec![int(1), int(2)]),
        );
        let expr = f.process(raw).unwrap();
        assert!(expr.root.is_op(Operator::Tuple));
        assert!(expr.root.children[0].is_op(Operator::Assignment));
        assert_eq!(expr.root.children[0].children[0].ident(), Some(x));
        assert_eq!(callee(&expr.root.children[1]), Some(w.setter));
    }

    #[test]
    fn declared_identifiers_must_be_assigned_before_use() {
        let mut f = Fixture::new();
        let int32 = f.int32();
        let scope = f.scope;
        let mut root = PluginRoot::for_code_scope(&mut f.state, scope);

        root.begin();
        let x = root.declare_var_and_create_id_node(code("x"), int32).unwrap();
        assert!(root.recognize(op(Operator::Add, vec![x, int(1)])).is_none());
        root.reset();

        root.begin();
        let x = root.declare_var_and_create_id_node(code("x"), int32).unwrap();
        let id = x.ident().unwrap();
        let node = root.recognize(assign(x, int(1))).unwrap();
        assert!(root.end(node).is_some());
        drop(root);

        assert_eq!(f.count(|e| matches!(e, CompilationError::MustHaveInitVal { .. })), 1);
        assert!(f.state.idents.is_published(id));
    }

    #[test]
    fn declarations_assigned_on_one_branch_are_rejected() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        f.local("flag", b.boolean);
        let scope = f.scope;
        let mut root = PluginRoot::for_code_scope(&mut f.state, scope);

        root.begin();
        let x = root.declare_var_and_create_id_node(code("x"), b.int32).unwrap();
        let id = x.ident().unwrap();
        let raw = op(Operator::Condition, vec![name("flag"), assign(x, int(1)), int(0)]);
        let node = root.recognize(raw).unwrap();
        assert!(root.end(node).is_none());
        drop(root);

        assert_eq!(f.count(|e| matches!(e, CompilationError::UnassignedVar { .. })), 1);
        assert!(!f.state.idents.is_published(id));
    }

    #[test]
    fn copies_from_temporaries_are_elided() {
        let mut f = Fixture::new();
        let int32 = f.int32();
        let a = f.local("a", int32);
        let scope = f.scope;
        let mut root = PluginRoot::for_code_scope(&mut f.state, scope);

        root.begin();
        let temp = Identifier::new("temp", IdentKind::Variable(zinnia_core::VariableKind::Local), int32, Span::default());
        let temp = root.declare_identifier(temp).unwrap();
        let fill = root.recognize(assign(ExprNode::id(temp, code("temp")), int(5))).unwrap();
        let link = root.new_link_with(fill, LinkedNodeFlags::NOT_REMOVABLE);
        let raw = assign(name("a"), ExprNode::id(temp, code("temp"))).with_links(vec![link]);
        let node = root.recognize(raw).unwrap();

        let expr = root.end(node).unwrap();
        assert_eq!(expr.root.ident(), Some(a));
        assert!(root.declared().is_empty());
        assert!(expr.vars.is_assigned(a));
        let linked = &expr.links.get(link).node;
        assert_eq!(linked.children[0].ident(), Some(a));
        drop(root);
        assert!(!f.state.idents.is_published(temp));
    }

    #[test]
    fn temporaries_read_after_the_copy_are_kept() {
        let mut f = Fixture::new();
        let int32 = f.int32();
        let a = f.local("a", int32);
        let b = f.local("b", int32);
        let scope = f.scope;
        let mut root = PluginRoot::for_code_scope(&mut f.state, scope);

        root.begin();
        let temp = Identifier::new("temp", IdentKind::Variable(zinnia_core::VariableKind::Local), int32, Span::default());
        let temp = root.declare_identifier(temp).unwrap();
        let fill = root.recognize(assign(ExprNode::id(temp, code("temp")), int(5))).unwrap();
        let link = root.new_link_with(fill, LinkedNodeFlags::NOT_REMOVABLE);
        let copy = assign(name("a"), ExprNode::id(temp, code("temp"))).with_links(vec![link]);
        let again = assign(name("b"), ExprNode::id(temp, code("temp")));
        let node = root.recognize(op(Operator::Tuple, vec![copy, again])).unwrap();

        let expr = root.end(node).unwrap();
        let first = &expr.root.children[0];
        assert!(first.is_op(Operator::Assignment));
        assert_eq!(first.children[0].ident(), Some(a));
        assert_eq!(first.children[1].ident(), Some(temp));
        assert_eq!(expr.root.children[1].children[0].ident(), Some(b));
        assert_eq!(expr.root.children[1].children[1].ident(), Some(temp));
        assert_eq!(expr.links.get(link).node.children[0].ident(), Some(temp));
        drop(root);
        assert!(f.state.idents.is_published(temp));
    }
}
