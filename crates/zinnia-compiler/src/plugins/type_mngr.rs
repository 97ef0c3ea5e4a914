//! Typing stage.
//!
//! Gives every node its type, checks operand types against the operator and
//! inserts conversion nodes where an operand has to change type. Operators
//! applied to user types are first looked up as `%Operator_<Name>` functions
//! of the operand types; a match turns the operation into a call.
//!
//! Conversions are inserted as single-child `Cast` nodes with
//! [`ExpressionFlags::FIXED_TYPE`]; user conversion functions become calls.
//! Initializer lists (`{ ... }`) stay untyped until the type they initialize
//! is known, then become `Tuple` or `Array` nodes of that type.

use bitflags::bitflags;
use num_bigint::BigInt;
use num_traits::Zero;
use tracing::trace;
use zinnia_core::const_value::member_types;
use zinnia_core::{
    CompilationError, ConstValue, IdentId, IdentKind, NameHash, Operator, ReferenceMode, TypeId,
    TypeKind, TypeTable, VariableKind,
};

use super::{fail, node_type_name, type_name, type_ref};
use crate::conversion::{ConversionKind, can_implicitly_convert, find_constant_conversion, find_conversion};
use crate::node::{ExprNode, ExpressionFlags, NodeKind};
use crate::overload::{OverloadSelectionData, resolve_overload};
use crate::pipeline::{ExpressionPlugin, PluginResult, PluginRoot};
use crate::state::CompilerState;

/// Name of the property implementing `value[index]` on a user type.
pub const INDEXER: &str = "%Indexer";

bitflags! {
    /// Options of the [`TypeMngr`] stage.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeMngrFlags: u8 {
        const NO_WARNING_ON_CAST_TO_SAME_TYPE = 1 << 0;
        /// Constructors may be called like ordinary functions.
        const ALLOW_CONSTRUCTOR_CALLS = 1 << 1;
        /// Keep nodes whose type cannot be determined instead of failing.
        const ENABLE_UNTYPED_NODES = 1 << 2;
        /// Read-only identifiers may be assigned.
        const ENABLE_READONLY_WRITING = 1 << 3;
        /// Compute the layout of struct types as variables of them are used.
        const CALCULATE_LAYOUTS = 1 << 4;
    }
}

/// The typing stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeMngr {
    pub flags: TypeMngrFlags,
    /// Type the finished expression is converted to.
    pub expected: Option<TypeId>,
}

impl ExpressionPlugin for TypeMngr {
    fn new_node(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
        match node.kind {
            NodeKind::Op(op) => self.operator(root, node, op),
            NodeKind::Id(id) => {
                self.identifier(root, node, id);
                PluginResult::Succeeded
            }
            NodeKind::Const(_) => literal(root, node),
            NodeKind::Linking(link) => {
                node.ty = root.links().get(link).node.ty;
                PluginResult::Succeeded
            }
            NodeKind::Label(_) => {
                node.ty = Some(root.state.types.builtins().void);
                PluginResult::Succeeded
            }
            NodeKind::NamedParameter(_) => {
                node.ty = node.children.first().and_then(|c| c.ty);
                PluginResult::Succeeded
            }
            _ => PluginResult::Succeeded,
        }
    }

    fn end(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
        if let Some(expected) = self.expected
            && node.ty.map(|ty| root.state.types.non_ref(ty)) != Some(expected)
        {
            let value = node.take();
            return match convert(root, value, expected, false) {
                Some(converted) => {
                    node.replace(converted);
                    PluginResult::Ready
                }
                None => PluginResult::Failed,
            };
        }

        if node.ty.is_none() && !self.flags.contains(TypeMngrFlags::ENABLE_UNTYPED_NODES) {
            return fail(root, CompilationError::Untyped { span: node.code.span() });
        }
        PluginResult::Succeeded
    }
}

impl TypeMngr {
    pub fn new(flags: TypeMngrFlags) -> Self {
        Self { flags, expected: None }
    }

    fn identifier(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode, id: IdentId) {
        let ident = root.state.idents.get(id);
        if matches!(ident.kind, IdentKind::Type | IdentKind::Namespace(_)) {
            return;
        }
        let ty = ident.ty;
        node.ty = Some(ty);
        if self.flags.contains(TypeMngrFlags::CALCULATE_LAYOUTS) {
            let value = root.state.types.non_ref(ty);
            root.state.types.calculate_layout(value);
        }
    }

    fn operator(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode, op: Operator) -> PluginResult {
        if op == Operator::Cast && node.children.len() == 1 && node.flags.contains(ExpressionFlags::FIXED_TYPE) {
            return PluginResult::Succeeded;
        }

        let fixed = node.flags.contains(ExpressionFlags::FIXED_TYPE);
        let untyped = node
            .children
            .iter()
            .enumerate()
            .find(|(index, child)| child.ty.is_none() && !may_be_untyped(op, *index, child, fixed));
        if let Some((_, child)) = untyped {
            if self.flags.contains(TypeMngrFlags::ENABLE_UNTYPED_NODES) {
                return PluginResult::Succeeded;
            }
            return fail(root, CompilationError::Untyped { span: child.code.span() });
        }

        if let Some(result) = self.user_operator(root, node, op) {
            return result;
        }

        match op {
            Operator::RefEquality | Operator::RefInequality => {
                let plain = if op == Operator::RefEquality {
                    Operator::Equality
                } else {
                    Operator::Inequality
                };
                node.kind = NodeKind::Op(plain);
                node.flags |= ExpressionFlags::DISABLE_OP_FUNC;
                PluginResult::Ready
            }
            Operator::Add | Operator::Subtract | Operator::Multiply | Operator::Divide | Operator::Modulo => {
                arithmetic(root, node, op)
            }
            Operator::ShiftLeft | Operator::ShiftRight => shift(root, node, op),
            Operator::BitwiseAnd | Operator::BitwiseOr | Operator::BitwiseXor => bitwise(root, node, op),
            Operator::And | Operator::Or | Operator::Not => logical(root, node),
            Operator::UnaryPlus | Operator::Negation | Operator::Complement => unary(root, node, op),
            Operator::Equality
            | Operator::Inequality
            | Operator::Less
            | Operator::LessEqual
            | Operator::Greater
            | Operator::GreaterEqual => relation(root, node, op),
            Operator::Condition => condition(root, node),
            Operator::Tuple => tuple(root, node),
            Operator::Array => self.array(root, node),
            Operator::Index => index(root, node),
            Operator::Member => member(root, node),
            Operator::Call => self.call(root, node),
            Operator::NewObject => new_object(root, node),
            Operator::NewArray => new_array(root, node),
            Operator::Address => address(root, node),
            Operator::RefUnsafe | Operator::RefIdMustBeAssigned | Operator::RefIdGetsAssigned => {
                reference(root, node, op)
            }
            Operator::Increase | Operator::Decrease => self.inc_dec(root, node, op),
            Operator::Cast | Operator::Reinterpret | Operator::Is | Operator::As => self.cast(root, node, op),
            Operator::Assignment => self.assignment(root, node),
            Operator::ScopeResolution => fail(root, CompilationError::MustBeType { span: node.code.span() }),
        }
    }

    /// Rewrite the operation into a call of a `%Operator_<Name>` function of
    /// an operand type. `None` when no such function applies.
    fn user_operator(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode, op: Operator) -> Option<PluginResult> {
        if node.flags.contains(ExpressionFlags::DISABLE_OP_FUNC) || !op.can_be_op_function() || op.is_inc_dec() {
            return None;
        }

        let types = &root.state.types;
        let operand_types = node
            .children
            .iter()
            .map(|c| c.ty.map(|ty| types.non_ref(ty)))
            .collect::<Option<Vec<_>>>()?;
        let hash = NameHash::operator_function(op);
        let mut candidates = Vec::new();
        for &ty in &operand_types {
            if let TypeKind::Struct { scope, .. } = types.kind(ty) {
                for &id in root.state.idents.members_by_hash(*scope, hash) {
                    if !candidates.contains(&id) {
                        candidates.push(id);
                    }
                }
            }
        }
        if candidates.is_empty() {
            return None;
        }

        let data = OverloadSelectionData::positional(operand_types);
        let selected = match resolve_overload(&candidates, &data, root.state, node.code.span()) {
            Ok(selected) => selected,
            Err(error @ CompilationError::AmbiguousOverload { .. }) => return Some(fail(root, error)),
            Err(_) => return None,
        };
        trace!(%op, "operator bound to user function");

        let code = node.code.clone();
        let callee = ExprNode::id(selected.function, code.clone()).with_flags(ExpressionFlags::RECOGNIZED);
        let Some(callee) = root.complete_node(callee) else {
            return Some(PluginResult::Failed);
        };
        let mut children = vec![callee];
        children.append(&mut node.children);
        node.replace(ExprNode::op(Operator::Call, children, code).with_flags(ExpressionFlags::RECOGNIZED));
        Some(PluginResult::Ready)
    }

    fn array(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
        let count = node.children.len();
        if node.flags.contains(ExpressionFlags::FIXED_TYPE)
            && let Some(ty) = node.ty
        {
            let target = root.state.types.non_ref(ty);
            let element = match root.state.types.kind(target) {
                TypeKind::FixedArray { element, lengths } if lengths.iter().product::<u32>() as usize == count => {
                    *element
                }
                TypeKind::RefArray { element, .. } => *element,
                _ => {
                    let from = format!("[{count}]");
                    return fail(
                        root,
                        CompilationError::CannotConvert {
                            from,
                            to: type_name(root.state, target),
                            span: node.code.span(),
                        },
                    );
                }
            };
            for index in 0..count {
                if !convert_child(root, node, index, element, false) {
                    return PluginResult::Failed;
                }
            }
            return PluginResult::Succeeded;
        }

        if count == 0 {
            if self.flags.contains(TypeMngrFlags::ENABLE_UNTYPED_NODES) {
                return PluginResult::Succeeded;
            }
            return fail(root, CompilationError::Untyped { span: node.code.span() });
        }

        let element_types: Vec<TypeId> = (0..count).map(|i| operand_type(root.state, node, i)).collect();
        let (element, explicit) = match common_element_type(root.state, &element_types) {
            Ok(common) => common,
            Err(mismatch) => {
                return fail(
                    root,
                    CompilationError::CannotConvert {
                        from: type_name(root.state, mismatch),
                        to: type_name(root.state, element_types[0]),
                        span: node.code.span(),
                    },
                );
            }
        };
        for index in 0..count {
            if !convert_child(root, node, index, element, explicit) {
                return PluginResult::Failed;
            }
        }
        node.ty = Some(root.state.types.fixed_array(element, vec![count as u32]));
        PluginResult::Succeeded
    }

    fn call(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
        let span = node.code.span();
        let function = node.children[0]
            .referenced_ident()
            .and_then(|id| root.state.idents.get(id).function().map(|info| (id, info.clone())));

        let (name, params, ret) = match function {
            Some((id, info)) => {
                if info.constructor && !self.flags.contains(TypeMngrFlags::ALLOW_CONSTRUCTOR_CALLS) {
                    return fail(root, CompilationError::CantUseConstructors { span });
                }
                let name = root.state.idents.get(id).name.clone();
                (name, info.params.iter().map(|p| p.ty).collect::<Vec<_>>(), info.ret)
            }
            None => {
                let callee = operand_type(root.state, node, 0);
                match root.state.types.kind(callee) {
                    TypeKind::Function { ret, params } => {
                        (node.children[0].code.as_str().to_string(), params.clone(), *ret)
                    }
                    _ => return fail(root, CompilationError::CallingNotFunc { span }),
                }
            }
        };

        let found = node.children.len() - 1;
        if found != params.len() {
            return fail(
                root,
                CompilationError::ParamCount {
                    name,
                    expected: params.len(),
                    found,
                    span,
                },
            );
        }
        for (index, param) in params.into_iter().enumerate() {
            if !pass_argument(root, node, index + 1, param) {
                return PluginResult::Failed;
            }
        }
        node.ty = Some(ret);
        PluginResult::Succeeded
    }

    fn inc_dec(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode, op: Operator) -> PluginResult {
        let ty = operand_type(root.state, node, 0);
        if !(root.state.types.is_number(ty) || root.state.types.is_pointer(ty)) {
            return cant_apply(root, node, op, ty);
        }
        if !self.check_writable(root, &node.children[0]) {
            return PluginResult::Failed;
        }
        node.ty = Some(ty);
        PluginResult::Succeeded
    }

    fn cast(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode, op: Operator) -> PluginResult {
        let span = node.code.span();
        let target = match node.children.get(1) {
            Some(type_node) => match type_ref(root.state, type_node) {
                Some(ty) => ty,
                None => return fail(root, CompilationError::MustBeType { span: type_node.code.span() }),
            },
            None => match node.ty {
                Some(ty) => ty,
                None => return fail(root, CompilationError::MustBeType { span }),
            },
        };
        let from = operand_type(root.state, node, 0);

        match op {
            Operator::Is => node.ty = Some(root.state.types.builtins().boolean),
            Operator::As => node.ty = Some(target),
            Operator::Reinterpret => {
                let types = &root.state.types;
                if types.size_of(from) != types.size_of(target) {
                    return fail(
                        root,
                        CompilationError::ReinterpretSize {
                            from: type_name(root.state, from),
                            to: type_name(root.state, target),
                            span,
                        },
                    );
                }
                node.children.truncate(1);
                node.ty = Some(target);
                node.flags |= ExpressionFlags::FIXED_TYPE;
            }
            _ => {
                if from == target {
                    if !self.flags.contains(TypeMngrFlags::NO_WARNING_ON_CAST_TO_SAME_TYPE) {
                        root.state.diagnostics.add(CompilationError::CastToSameType {
                            ty: type_name(root.state, target),
                            span,
                        });
                    }
                    node.unwrap_child(0);
                    return PluginResult::Ready;
                }
                let value = node.children.swap_remove(0);
                let Some((converted, _)) = conversion_node(root, value, target, true) else {
                    return PluginResult::Failed;
                };
                node.replace(converted);
                return PluginResult::Ready;
            }
        }
        PluginResult::Succeeded
    }

    fn assignment(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
        let span = node.code.span();
        let target_ty = operand_type(root.state, node, 0);
        if root.state.types.contains_auto(target_ty) {
            let Some(value_ty) = node.children[1].ty else {
                return fail(root, CompilationError::Untyped { span });
            };
            if !infer_auto(root, &mut node.children[0], value_ty) {
                return PluginResult::Failed;
            }
        }

        if !self.check_writable(root, &node.children[0]) {
            return PluginResult::Failed;
        }
        if same_variable(node) {
            root.state.diagnostics.add(CompilationError::AssignSameVar { span });
        }

        let target = operand_type(root.state, node, 0);
        if !convert_child(root, node, 1, target, false) {
            return PluginResult::Failed;
        }
        node.ty = Some(target);
        PluginResult::Succeeded
    }

    /// Report targets that cannot be written.
    fn check_writable(&self, root: &PluginRoot<'_>, target: &ExprNode) -> bool {
        if target.is_op(Operator::Tuple) {
            return target.children.iter().all(|c| self.check_writable(root, c));
        }
        if !is_lvalue(root, target) {
            root.state
                .diagnostics
                .add(CompilationError::AssignRValue { span: target.code.span() });
            return false;
        }

        if let Some(id) = target.referenced_ident() {
            let ident = root.state.idents.get(id);
            if ident.is_read_only()
                && !root.declared.contains(&id)
                && !self.flags.contains(TypeMngrFlags::ENABLE_READONLY_WRITING)
            {
                root.state.diagnostics.add(CompilationError::ReadOnly {
                    name: ident.name.clone(),
                    span: target.code.span(),
                });
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Leaves
// ============================================================================

/// Natural type of a literal: integers take the first of `int32`, `int64`
/// and `uint64` that holds them.
fn literal(root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
    if node.ty.is_some() {
        return PluginResult::Succeeded;
    }
    let Some(value) = node.const_value() else {
        return PluginResult::Succeeded;
    };
    let types = &root.state.types;
    let b = types.builtins();
    let ty = match value {
        ConstValue::Integer(_) => {
            let fitting = [b.int32, b.int64, b.uint64]
                .into_iter()
                .find(|&ty| value.check_bounds(ty, types));
            match fitting {
                Some(ty) => ty,
                None => {
                    let error = CompilationError::ConstOutOfRange {
                        value: value.to_string(),
                        ty: type_name(root.state, b.uint64),
                        span: node.code.span(),
                    };
                    return fail(root, error);
                }
            }
        }
        ConstValue::Float(_) => b.float32,
        ConstValue::Double(_) => b.float64,
        ConstValue::String(_) => b.string,
        ConstValue::Char(_) => b.char,
        ConstValue::Boolean(_) => b.boolean,
        ConstValue::Null => b.null,
        ConstValue::Zero | ConstValue::Structured(_) => return PluginResult::Succeeded,
    };
    node.ty = Some(ty);
    PluginResult::Succeeded
}

// ============================================================================
// Operators
// ============================================================================

fn arithmetic(root: &mut PluginRoot<'_>, node: &mut ExprNode, op: Operator) -> PluginResult {
    let left = operand_type(root.state, node, 0);
    let right = operand_type(root.state, node, 1);
    let types = &root.state.types;

    if op == Operator::Add && (types.is_string(left) || types.is_string(right)) {
        return concatenation(root, node, left, right);
    }

    let pointer_offset = match op {
        Operator::Add if types.is_pointer(left) && types.is_integer(right) => Some(left),
        Operator::Add if types.is_integer(left) && types.is_pointer(right) => Some(right),
        Operator::Subtract if types.is_pointer(left) && types.is_integer(right) => Some(left),
        Operator::Subtract if types.is_pointer(left) && left == right => {
            let size = types.pointer_size() as u8;
            types.integer(size, true)
        }
        _ => None,
    };
    if let Some(ty) = pointer_offset {
        node.ty = Some(ty);
        return PluginResult::Succeeded;
    }

    match common_operand_type(&mut root.state.types, left, right) {
        Some(common) => {
            if !promote(root, node, common) {
                return PluginResult::Failed;
            }
            node.ty = Some(common);
            PluginResult::Succeeded
        }
        None => cant_apply2(root, node, op, left, right),
    }
}

/// `string + value`: the other operand is converted to its text.
fn concatenation(root: &mut PluginRoot<'_>, node: &mut ExprNode, left: TypeId, right: TypeId) -> PluginResult {
    let types = &root.state.types;
    let stringifiable =
        |ty: TypeId| types.is_string(ty) || types.is_number(ty) || types.is_char(ty) || types.is_boolean(ty) || types.is_enum(ty);
    if !stringifiable(left) || !stringifiable(right) {
        return cant_apply2(root, node, Operator::Add, left, right);
    }

    let string = types.builtins().string;
    for (index, ty) in [left, right].into_iter().enumerate() {
        if root.state.types.is_string(ty) {
            continue;
        }
        let value = node.children[index].take();
        let Some(text) = root.complete_node(ExprNode::cast(value, string)) else {
            return PluginResult::Failed;
        };
        node.children[index] = text;
    }
    node.ty = Some(string);
    PluginResult::Succeeded
}

fn shift(root: &mut PluginRoot<'_>, node: &mut ExprNode, op: Operator) -> PluginResult {
    let left = operand_type(root.state, node, 0);
    let right = operand_type(root.state, node, 1);
    let types = &root.state.types;
    if !types.is_integer(left) || !types.is_integer(right) {
        return cant_apply2(root, node, op, left, right);
    }

    let count = types.builtins().int32;
    if !convert_child(root, node, 1, count, true) {
        return PluginResult::Failed;
    }
    node.ty = Some(left);
    PluginResult::Succeeded
}

fn bitwise(root: &mut PluginRoot<'_>, node: &mut ExprNode, op: Operator) -> PluginResult {
    let left = operand_type(root.state, node, 0);
    let right = operand_type(root.state, node, 1);
    let types = &root.state.types;

    if types.is_integer(left) && types.is_integer(right) {
        let Some(common) = types.common_number_type(left, right) else {
            return cant_apply2(root, node, op, left, right);
        };
        if !promote(root, node, common) {
            return PluginResult::Failed;
        }
        node.ty = Some(common);
    } else if (types.is_boolean(left) && types.is_boolean(right)) || (left == right && types.is_enum(left)) {
        node.ty = Some(left);
    } else {
        return cant_apply2(root, node, op, left, right);
    }
    PluginResult::Succeeded
}

/// `&&`, `||` and `!`: operands become booleans.
fn logical(root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
    let boolean = root.state.types.builtins().boolean;
    for index in 0..node.children.len() {
        if !convert_child(root, node, index, boolean, false) {
            return PluginResult::Failed;
        }
    }
    node.ty = Some(boolean);
    PluginResult::Succeeded
}

fn unary(root: &mut PluginRoot<'_>, node: &mut ExprNode, op: Operator) -> PluginResult {
    let ty = operand_type(root.state, node, 0);
    let types = &root.state.types;
    let valid = match op {
        Operator::Complement => types.is_integer(ty),
        _ => types.is_scalar_or_vector_number(ty),
    };
    if !valid {
        return cant_apply(root, node, op, ty);
    }
    node.ty = Some(ty);
    PluginResult::Succeeded
}

fn relation(root: &mut PluginRoot<'_>, node: &mut ExprNode, op: Operator) -> PluginResult {
    let left = operand_type(root.state, node, 0);
    let right = operand_type(root.state, node, 1);
    if same_variable(node) {
        root.state
            .diagnostics
            .add(CompilationError::CmpSameVariable { span: node.code.span() });
    }

    let types = &root.state.types;
    let equality = matches!(op, Operator::Equality | Operator::Inequality);
    if types.is_number(left) && types.is_number(right) {
        if let Some(index) = adaptable_constant(root.state, node) {
            let other = if index == 0 { right } else { left };
            if !convert_child(root, node, index, other, false) {
                return PluginResult::Failed;
            }
        } else {
            let Some(common) = types.common_number_type(left, right) else {
                return cant_apply2(root, node, op, left, right);
            };
            if !promote(root, node, common) {
                return PluginResult::Failed;
            }
        }
    } else if left == right && (equality || types.is_char(left) || types.is_enum(left)) {
        // Compared as they are.
    } else if equality && can_implicitly_convert(right, left, root.state) {
        if !convert_child(root, node, 1, left, false) {
            return PluginResult::Failed;
        }
    } else if equality && can_implicitly_convert(left, right, root.state) {
        if !convert_child(root, node, 0, right, false) {
            return PluginResult::Failed;
        }
    } else {
        return cant_apply2(root, node, op, left, right);
    }

    node.ty = Some(root.state.types.builtins().boolean);
    PluginResult::Succeeded
}

/// Operand of a comparison that is an integer constant representable in the
/// type of the other, non-constant operand.
fn adaptable_constant(state: &CompilerState, node: &ExprNode) -> Option<usize> {
    (0..2).find(|&index| {
        let (constant, other) = (&node.children[index], &node.children[1 - index]);
        let Some(other_ty) = other.ty.map(|ty| state.types.non_ref(ty)) else {
            return false;
        };
        !other.is_const()
            && state.types.is_integer(other_ty)
            && constant.ty != other.ty
            && constant
                .const_value()
                .is_some_and(|value| value.as_integer().is_some() && value.check_bounds(other_ty, &state.types))
    })
}

fn condition(root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
    let boolean = root.state.types.builtins().boolean;
    if !convert_child(root, node, 0, boolean, false) {
        return PluginResult::Failed;
    }

    let then = operand_type(root.state, node, 1);
    let otherwise = operand_type(root.state, node, 2);
    let types = &root.state.types;
    let (ty, explicit) = if then == otherwise {
        (then, false)
    } else if let Some(common) = (types.is_number(then) && types.is_number(otherwise))
        .then(|| types.common_number_type(then, otherwise))
        .flatten()
    {
        (common, true)
    } else if can_implicitly_convert(otherwise, then, root.state) {
        (then, false)
    } else if can_implicitly_convert(then, otherwise, root.state) {
        (otherwise, false)
    } else {
        return cant_apply2(root, node, Operator::Condition, then, otherwise);
    };

    for index in 1..=2 {
        if !convert_child(root, node, index, ty, explicit) {
            return PluginResult::Failed;
        }
    }
    node.ty = Some(ty);
    PluginResult::Succeeded
}

fn tuple(root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
    if node.flags.contains(ExpressionFlags::FIXED_TYPE)
        && let Some(ty) = node.ty
    {
        let target = root.state.types.non_ref(ty);
        let members = element_types(root.state, target).filter(|m| m.len() == node.children.len());
        let Some(members) = members else {
            let from = format!("({} values)", node.children.len());
            return fail(
                root,
                CompilationError::CannotConvert {
                    from,
                    to: type_name(root.state, target),
                    span: node.code.span(),
                },
            );
        };
        for (index, member) in members.into_iter().enumerate() {
            if !convert_child(root, node, index, member, false) {
                return PluginResult::Failed;
            }
        }
        return PluginResult::Succeeded;
    }

    let members: Vec<TypeId> = (0..node.children.len())
        .map(|i| operand_type(root.state, node, i))
        .collect();
    node.ty = Some(root.state.types.tuple(members));
    PluginResult::Succeeded
}

fn index(root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
    if let Some(property) = indexed_property(root.state, &node.children[0]) {
        return property_index(root, node, property);
    }

    let object = operand_type(root.state, node, 0);
    let indices = node.children.len() - 1;
    let types = &root.state.types;
    let (element, expected) = match types.kind(object) {
        TypeKind::Pointer { child } => (*child, 1),
        TypeKind::FixedArray { element, lengths } => {
            for (index, &length) in node.children[1..].iter().zip(lengths) {
                let Some(value) = index.const_value().and_then(ConstValue::as_integer) else {
                    continue;
                };
                if *value < BigInt::zero() || *value >= BigInt::from(length) {
                    return fail(root, CompilationError::IndexOutOfRange { span: index.code.span() });
                }
            }
            (*element, lengths.len())
        }
        TypeKind::RefArray { element, dimensions } => (*element, *dimensions as usize),
        TypeKind::String => (types.builtins().char, 1),
        TypeKind::Struct { scope, .. } => {
            let indexer = root
                .state
                .idents
                .members(*scope, INDEXER)
                .iter()
                .copied()
                .find(|&id| root.state.idents.get(id).property().is_some());
            let Some(indexer) = indexer else {
                return cant_apply(root, node, Operator::Index, object);
            };
            let value = node.children[0].take();
            let code = value.code.clone();
            let flags = ExpressionFlags::RECOGNIZED;
            let Some(property) = root.complete_node(ExprNode::id(indexer, code.clone()).with_flags(flags)) else {
                return PluginResult::Failed;
            };
            let access = ExprNode::op(Operator::Member, vec![value, property], code).with_flags(flags);
            let Some(access) = root.complete_node(access) else {
                return PluginResult::Failed;
            };
            node.children[0] = access;
            return property_index(root, node, indexer);
        }
        _ => return cant_apply(root, node, Operator::Index, object),
    };

    if indices != expected {
        return fail(
            root,
            CompilationError::ParamCount {
                name: type_name(root.state, object),
                expected,
                found: indices,
                span: node.code.span(),
            },
        );
    }
    let index_type = root.state.config.index_type(&root.state.types);
    for position in 1..=indices {
        if !convert_index(root, node, position, index_type) {
            return PluginResult::Failed;
        }
    }
    node.ty = Some(element);
    PluginResult::Succeeded
}

/// `object.Property[indices]` for a property with index parameters.
fn property_index(root: &mut PluginRoot<'_>, node: &mut ExprNode, property: IdentId) -> PluginResult {
    let ident = root.state.idents.get(property);
    let Some(info) = ident.property() else {
        return PluginResult::Failed;
    };
    let (name, ty, params) = (ident.name.clone(), ident.ty, info.index_params.clone());
    let span = node.code.span();
    let found = node.children.len() - 1;

    if found < params.len() {
        return fail(root, CompilationError::MissingPropertyIndices { span });
    }
    if found > params.len() {
        return fail(
            root,
            CompilationError::ParamCount {
                name,
                expected: params.len(),
                found,
                span,
            },
        );
    }
    for (index, param) in params.iter().enumerate() {
        if !convert_child(root, node, index + 1, param.ty, false) {
            return PluginResult::Failed;
        }
    }
    node.ty = Some(ty);
    PluginResult::Succeeded
}

fn member(root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
    let ty = match node.children[1].kind {
        NodeKind::Id(id) => root.state.idents.get(id).ty,
        NodeKind::Str => {
            let object = operand_type(root.state, node, 0);
            let name = node.children[1].code.as_str();
            let position = tuple_member_index(&root.state.types, object, name);
            match position.and_then(|p| root.state.types.tuple_members(object).map(|m| m[p].ty)) {
                Some(ty) => ty,
                None => {
                    let name = name.to_string();
                    let span = node.children[1].code.span();
                    return fail(root, CompilationError::UnknownId { name, span });
                }
            }
        }
        _ => {
            let object = operand_type(root.state, node, 0);
            return cant_apply(root, node, Operator::Member, object);
        }
    };
    node.children[1].ty = Some(ty);
    node.ty = Some(ty);
    PluginResult::Succeeded
}

fn new_object(root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
    let span = node.code.span();
    let Some(ty) = node.ty else {
        return fail(root, CompilationError::MustBeType { span });
    };

    let constructor = node.children[0]
        .ident()
        .and_then(|id| root.state.idents.get(id).function())
        .map(|info| info.params.iter().map(|p| p.ty).collect::<Vec<_>>());
    let params = constructor.unwrap_or_default();
    let found = node.children.len() - 1;
    if found != params.len() {
        return fail(
            root,
            CompilationError::ParamCount {
                name: type_name(root.state, ty),
                expected: params.len(),
                found,
                span,
            },
        );
    }
    for (index, param) in params.into_iter().enumerate() {
        if !pass_argument(root, node, index + 1, param) {
            return PluginResult::Failed;
        }
    }
    PluginResult::Succeeded
}

fn new_array(root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
    let Some(element) = type_ref(root.state, &node.children[0]) else {
        return fail(root, CompilationError::MustBeType { span: node.children[0].code.span() });
    };
    let dimensions = node.children.len() - 1;
    if dimensions == 0 {
        return fail(
            root,
            CompilationError::ParamCount {
                name: type_name(root.state, element),
                expected: 1,
                found: 0,
                span: node.code.span(),
            },
        );
    }

    let index_type = root.state.config.index_type(&root.state.types);
    for position in 1..=dimensions {
        if !convert_index(root, node, position, index_type) {
            return PluginResult::Failed;
        }
    }
    node.ty = Some(root.state.types.ref_array(element, dimensions as u32));
    PluginResult::Succeeded
}

/// `&value`. The address of a constant points into the constant cache.
fn address(root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
    let child = &node.children[0];
    if let (Some(value), Some(ty)) = (child.const_value(), child.ty) {
        let handle = root.state.consts.get_or_insert(value, ty);
        let pointer = root.state.types.pointer_to(ty);
        let data = ExprNode::new(NodeKind::DataPointer(handle), node.code.clone())
            .with_type(pointer)
            .with_flags(ExpressionFlags::FIXED_TYPE | ExpressionFlags::RECOGNIZED);
        node.replace(data);
        return PluginResult::Ready;
    }

    if !is_lvalue(root, child) {
        return fail(root, CompilationError::InvalidAddressType { span: child.code.span() });
    }
    let target = operand_type(root.state, node, 0);
    node.ty = Some(root.state.types.pointer_to(target));
    PluginResult::Succeeded
}

fn reference(root: &mut PluginRoot<'_>, node: &mut ExprNode, op: Operator) -> PluginResult {
    if !is_lvalue(root, &node.children[0]) {
        return fail(root, CompilationError::AddressOfRValue { span: node.children[0].code.span() });
    }
    let mode = match op {
        Operator::RefIdMustBeAssigned => ReferenceMode::IdMustBeAssigned,
        Operator::RefIdGetsAssigned => ReferenceMode::IdGetsAssigned,
        _ => ReferenceMode::Unsafe,
    };
    let target = operand_type(root.state, node, 0);
    node.ty = Some(root.state.types.reference_to(target, mode));
    PluginResult::Succeeded
}

// ============================================================================
// Conversions
// ============================================================================

/// `node` converted to `to`, fully processed. Reports and returns `None`
/// when no conversion exists, or when it needs a cast and `explicit` is not
/// set.
pub(crate) fn convert(root: &mut PluginRoot<'_>, node: ExprNode, to: TypeId, explicit: bool) -> Option<ExprNode> {
    let (node, added) = conversion_node(root, node, to, explicit)?;
    if added { root.complete_node(node) } else { Some(node) }
}

/// The unprocessed node converting `node` to `to`, and whether a node was
/// added.
fn conversion_node(
    root: &mut PluginRoot<'_>,
    node: ExprNode,
    to: TypeId,
    explicit: bool,
) -> Option<(ExprNode, bool)> {
    if is_initializer(&node) {
        return initializer(root, node, to).map(|init| (init, true));
    }

    let span = node.code.span();
    let Some(from) = node.ty else {
        root.state.diagnostics.add(CompilationError::Untyped { span });
        return None;
    };
    let conversion = match node.const_value() {
        Some(value) => find_constant_conversion(value, from, to, root.state),
        None => find_conversion(from, to, root.state),
    };

    let Some(conversion) = conversion else {
        root.state.diagnostics.add(CompilationError::CannotConvert {
            from: type_name(root.state, from),
            to: type_name(root.state, to),
            span,
        });
        return None;
    };
    if !conversion.is_implicit() && !explicit && !node.flags.contains(ExpressionFlags::AUTO_CONVERT) {
        root.state.diagnostics.add(CompilationError::ImplicitlyCast {
            from: type_name(root.state, from),
            to: type_name(root.state, to),
            span,
        });
        return None;
    }

    match conversion.kind {
        ConversionKind::Identity => Some((node, false)),
        ConversionKind::UserDefined { function } => {
            let code = node.code.clone();
            let flags = ExpressionFlags::RECOGNIZED;
            let callee = root.complete_node(ExprNode::id(function, code.clone()).with_flags(flags))?;
            let access = root.complete_node(ExprNode::op(Operator::Member, vec![node, callee], code.clone()).with_flags(flags))?;
            Some((ExprNode::op(Operator::Call, vec![access], code).with_flags(flags), true))
        }
        _ => Some((ExprNode::cast(node, to), true)),
    }
}

/// Replace child `index` by its conversion to `to`.
fn convert_child(root: &mut PluginRoot<'_>, node: &mut ExprNode, index: usize, to: TypeId, explicit: bool) -> bool {
    let child = node.children[index].take();
    match convert(root, child, to, explicit) {
        Some(converted) => {
            node.children[index] = converted;
            true
        }
        None => false,
    }
}

/// Indices of any integer type convert to the index type, others only
/// implicitly.
fn convert_index(root: &mut PluginRoot<'_>, node: &mut ExprNode, index: usize, index_type: TypeId) -> bool {
    let ty = operand_type(root.state, node, index);
    let explicit = root.state.types.is_integer(ty);
    convert_child(root, node, index, index_type, explicit)
}

/// Convert both operands of a binary node to `common`.
fn promote(root: &mut PluginRoot<'_>, node: &mut ExprNode, common: TypeId) -> bool {
    convert_child(root, node, 0, common, true) && convert_child(root, node, 1, common, true)
}

/// Bind an argument to a parameter. Reference parameters take the
/// argument's address with the parameter's reference mode.
fn pass_argument(root: &mut PluginRoot<'_>, node: &mut ExprNode, index: usize, param: TypeId) -> bool {
    let TypeKind::Reference { child, mode } = root.state.types.kind(param) else {
        return convert_child(root, node, index, param, false);
    };
    let (child, mode) = (*child, *mode);
    let op = match mode {
        ReferenceMode::Unsafe => Operator::RefUnsafe,
        ReferenceMode::IdMustBeAssigned => Operator::RefIdMustBeAssigned,
        ReferenceMode::IdGetsAssigned => Operator::RefIdGetsAssigned,
    };

    let arg = &node.children[index];
    if arg.ty.map(|ty| root.state.types.non_ref(ty)) != Some(child) {
        root.state.diagnostics.add(CompilationError::CannotConvert {
            from: node_type_name(root.state, arg),
            to: type_name(root.state, param),
            span: arg.code.span(),
        });
        return false;
    }
    if arg.is_op(op) {
        return true;
    }

    let arg = node.children[index].take();
    let code = arg.code.clone();
    let wrapped = ExprNode::op(op, vec![arg], code).with_flags(ExpressionFlags::RECOGNIZED);
    match root.complete_node(wrapped) {
        Some(wrapped) => {
            node.children[index] = wrapped;
            true
        }
        None => false,
    }
}

/// An initializer list becomes a `Tuple` (tuples and value structs) or an
/// `Array` node of the target type. Object initializers name struct fields;
/// unnamed fields take their zero value.
fn initializer(root: &mut PluginRoot<'_>, mut node: ExprNode, to: TypeId) -> Option<ExprNode> {
    let target = root.state.types.non_ref(to);
    let code = node.code.clone();
    let span = code.span();
    let flags = ExpressionFlags::FIXED_TYPE | ExpressionFlags::RECOGNIZED;
    let cannot_convert = |root: &PluginRoot<'_>| {
        root.state.diagnostics.add(CompilationError::CannotConvert {
            from: "{...}".to_string(),
            to: type_name(root.state, target),
            span,
        });
        None
    };

    let values = std::mem::take(&mut node.children);
    let links = std::mem::take(&mut node.links);
    let names = match node.kind {
        NodeKind::ObjectInit(names) => names,
        _ => {
            let op = match root.state.types.kind(target) {
                TypeKind::FixedArray { .. } | TypeKind::RefArray { .. } => Operator::Array,
                TypeKind::Tuple { .. } | TypeKind::Struct { class: false, .. } => Operator::Tuple,
                _ => return cannot_convert(root),
            };
            let init = ExprNode::op(op, values, code).with_type(target).with_flags(flags);
            return Some(init.with_links(links));
        }
    };

    if !root.state.types.is_struct(target) {
        return cannot_convert(root);
    }
    let fields = struct_fields(root.state, target);
    let mut bound: Vec<Option<ExprNode>> = vec![None; fields.len()];
    for (name, value) in names.into_iter().zip(values) {
        let position = fields.iter().position(|&f| root.state.idents.get(f).name == name);
        let Some(position) = position else {
            let span = value.code.span();
            root.state.diagnostics.add(CompilationError::UnknownId { name, span });
            return None;
        };
        if bound[position].is_some() {
            let span = value.code.span();
            root.state
                .diagnostics
                .add(CompilationError::ParamAlreadySpecified { name, span });
            return None;
        }
        bound[position] = Some(value);
    }

    let mut members = Vec::with_capacity(fields.len());
    for (&field, value) in fields.iter().zip(bound) {
        let value = match value {
            Some(value) => value,
            None => {
                let ident = root.state.idents.get(field);
                let ty = ident.ty;
                let Some(zero) = ConstValue::zero_of_type(ty, &root.state.types) else {
                    let name = ident.name.clone();
                    root.state
                        .diagnostics
                        .add(CompilationError::MustHaveInitVal { name, span });
                    return None;
                };
                let zero = ExprNode::constant(zero, ty, code.clone()).with_flags(ExpressionFlags::RECOGNIZED);
                root.complete_node(zero)?
            }
        };
        members.push(value);
    }
    Some(
        ExprNode::op(Operator::Tuple, members, code)
            .with_type(target)
            .with_flags(flags)
            .with_links(links),
    )
}

/// Resolve `auto` in the type of an assignment target from the assigned
/// type. Tuple targets are inferred member-wise.
fn infer_auto(root: &mut PluginRoot<'_>, target: &mut ExprNode, value: TypeId) -> bool {
    let value = root.state.types.non_ref(value);
    let span = target.code.span();
    match target.kind {
        NodeKind::Id(id) => {
            let declared = root.state.idents.get(id).ty;
            let Some(inferred) = resolve_auto(&mut root.state.types, declared, value) else {
                root.state.diagnostics.add(CompilationError::Untyped { span });
                return false;
            };
            trace!(name = %root.state.idents.get(id).name, ty = %type_name(root.state, inferred), "auto type inferred");
            root.state.idents.get_mut(id).ty = inferred;
            target.ty = Some(inferred);
            true
        }
        NodeKind::Op(Operator::Tuple) => {
            let members: Option<Vec<TypeId>> = root
                .state
                .types
                .tuple_members(value)
                .map(|members| members.iter().map(|m| m.ty).collect());
            let Some(members) = members.filter(|m| m.len() == target.children.len()) else {
                root.state.diagnostics.add(CompilationError::Untyped { span });
                return false;
            };
            for (child, member) in target.children.iter_mut().zip(members) {
                let has_auto = child.ty.is_some_and(|ty| root.state.types.contains_auto(ty));
                if has_auto && !infer_auto(root, child, member) {
                    return false;
                }
            }
            let types: Vec<TypeId> = (0..target.children.len())
                .map(|i| operand_type(root.state, target, i))
                .collect();
            target.ty = Some(root.state.types.tuple(types));
            true
        }
        _ => {
            root.state.diagnostics.add(CompilationError::Untyped { span });
            false
        }
    }
}

fn resolve_auto(types: &mut TypeTable, declared: TypeId, value: TypeId) -> Option<TypeId> {
    if !types.contains_auto(declared) {
        return Some(declared);
    }
    if types.is_auto(declared) {
        let concrete = !(types.is_null(value) || types.is_void(value) || types.is_auto(value));
        return concrete.then_some(value);
    }

    let declared_members: Vec<TypeId> = types.tuple_members(declared)?.iter().map(|m| m.ty).collect();
    let value_members: Vec<TypeId> = types.tuple_members(value)?.iter().map(|m| m.ty).collect();
    if declared_members.len() != value_members.len() {
        return None;
    }
    let members = declared_members
        .into_iter()
        .zip(value_members)
        .map(|(d, v)| resolve_auto(types, d, v))
        .collect::<Option<Vec<_>>>()?;
    Some(types.tuple(members))
}

// ============================================================================
// Helpers
// ============================================================================

/// Whether a node can hold a value that can be written or referenced.
pub(crate) fn is_lvalue(root: &PluginRoot<'_>, node: &ExprNode) -> bool {
    match &node.kind {
        NodeKind::Id(id) => root.state.idents.get(*id).is_assignable_location(),
        NodeKind::Linking(link) => is_lvalue(root, &root.links().get(*link).node),
        NodeKind::Op(Operator::Member) => match &node.children[1].kind {
            NodeKind::Id(id) => root.state.idents.get(*id).is_assignable_location(),
            NodeKind::Str => is_lvalue(root, &node.children[0]),
            _ => false,
        },
        NodeKind::Op(Operator::Tuple) => node.children.iter().all(|c| is_lvalue(root, c)),
        NodeKind::Op(op) => *op == Operator::Index || op.is_reference(),
        _ => false,
    }
}

/// Position of a tuple member named `name`, or `ItemN` (1-based).
pub(crate) fn tuple_member_index(types: &TypeTable, tuple: TypeId, name: &str) -> Option<usize> {
    let members = types.tuple_members(tuple)?;
    members
        .iter()
        .position(|m| m.name.as_deref() == Some(name))
        .or_else(|| {
            let position: usize = name.strip_prefix("Item")?.parse().ok()?;
            (1..=members.len()).contains(&position).then(|| position - 1)
        })
}

/// Non-static member variables of a struct, in declaration order.
pub(crate) fn struct_fields(state: &CompilerState, ty: TypeId) -> Vec<IdentId> {
    let Some(scope) = state.types.struct_scope(ty) else {
        return Vec::new();
    };
    state
        .idents
        .scope(scope)
        .members()
        .iter()
        .copied()
        .filter(|&id| {
            let ident = state.idents.get(id);
            matches!(ident.kind, IdentKind::Variable(VariableKind::Member)) && !ident.is_static()
        })
        .collect()
}

/// Member types of a structured value type.
fn element_types(state: &CompilerState, ty: TypeId) -> Option<Vec<TypeId>> {
    if state.types.is_struct(ty) {
        let fields = struct_fields(state, ty);
        return Some(fields.into_iter().map(|f| state.idents.get(f).ty).collect());
    }
    member_types(ty, &state.types)
}

/// An indexed property accessed through `node`.
pub(crate) fn indexed_property(state: &CompilerState, node: &ExprNode) -> Option<IdentId> {
    let id = node.referenced_ident()?;
    let info = state.idents.get(id).property()?;
    (!info.index_params.is_empty()).then_some(id)
}

/// Value type of child `index`; untyped children read as `void`.
fn operand_type(state: &CompilerState, node: &ExprNode, index: usize) -> TypeId {
    node.children[index]
        .ty
        .map_or(state.types.builtins().void, |ty| state.types.non_ref(ty))
}

/// Type both operands of an arithmetic operator are promoted to: the common
/// number type, member-wise for vectors, broadcast for vector and scalar.
fn common_operand_type(types: &mut TypeTable, left: TypeId, right: TypeId) -> Option<TypeId> {
    if types.is_number(left) && types.is_number(right) {
        return types.common_number_type(left, right);
    }

    let members = |types: &TypeTable, ty: TypeId| -> Option<Vec<TypeId>> {
        types
            .is_vector_number(ty)
            .then(|| types.tuple_members(ty).map(|m| m.iter().map(|m| m.ty).collect()))
            .flatten()
    };
    let commons = match (members(types, left), members(types, right)) {
        (Some(l), Some(r)) if l.len() == r.len() => l
            .into_iter()
            .zip(r)
            .map(|(a, b)| types.common_number_type(a, b))
            .collect::<Option<Vec<_>>>()?,
        (Some(vector), None) if types.is_number(right) => vector
            .into_iter()
            .map(|m| types.common_number_type(m, right))
            .collect::<Option<Vec<_>>>()?,
        (None, Some(vector)) if types.is_number(left) => vector
            .into_iter()
            .map(|m| types.common_number_type(left, m))
            .collect::<Option<Vec<_>>>()?,
        _ => return None,
    };
    Some(types.tuple(commons))
}

/// Element type of an array literal and whether elements need explicit
/// conversions to reach it. `Err` carries an element type that fits no
/// common type.
fn common_element_type(state: &CompilerState, types: &[TypeId]) -> Result<(TypeId, bool), TypeId> {
    let first = types[0];
    if types.iter().all(|&ty| ty == first) {
        return Ok((first, false));
    }
    if types.iter().all(|&ty| state.types.is_number(ty)) {
        let common = types[1..]
            .iter()
            .try_fold(first, |acc, &ty| state.types.common_number_type(acc, ty));
        if let Some(common) = common {
            return Ok((common, true));
        }
    }
    types
        .iter()
        .copied()
        .find(|&candidate| types.iter().all(|&ty| can_implicitly_convert(ty, candidate, state)))
        .map(|common| (common, false))
        .ok_or_else(|| types.iter().copied().find(|&ty| ty != first).unwrap_or(first))
}

fn is_initializer(node: &ExprNode) -> bool {
    matches!(node.kind, NodeKind::ObjectInit(_) | NodeKind::ArrayInit)
}

/// Operand positions that legitimately carry no type.
fn may_be_untyped(op: Operator, index: usize, child: &ExprNode, fixed: bool) -> bool {
    match (op, index) {
        (Operator::Cast | Operator::Reinterpret | Operator::Is | Operator::As, 1) => true,
        (Operator::NewObject | Operator::NewArray, 0) => true,
        (Operator::Member, 1) => child.is_str(),
        (Operator::Assignment | Operator::Call | Operator::NewObject, _) => is_initializer(child),
        (Operator::Tuple | Operator::Array, _) => fixed && is_initializer(child),
        _ => false,
    }
}

/// `x = x` or `x == x` on the same identifier.
fn same_variable(node: &ExprNode) -> bool {
    matches!(
        (node.children[0].ident(), node.children[1].ident()),
        (Some(a), Some(b)) if a == b
    )
}

fn cant_apply(root: &PluginRoot<'_>, node: &ExprNode, op: Operator, ty: TypeId) -> PluginResult {
    fail(
        root,
        CompilationError::CantOpApplied {
            op: op.symbol().to_string(),
            ty: type_name(root.state, ty),
            span: node.code.span(),
        },
    )
}

fn cant_apply2(root: &PluginRoot<'_>, node: &ExprNode, op: Operator, left: TypeId, right: TypeId) -> PluginResult {
    fail(
        root,
        CompilationError::CantOpApplied2 {
            op: op.symbol().to_string(),
            left: type_name(root.state, left),
            right: type_name(root.state, right),
            span: node.code.span(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use zinnia_core::{FunctionInfo, IdentFlags, Identifier, Param, ScopeId, Span, TupleMember};

    use crate::testing::*;
    // The stage's own `member` is in scope through `super::*`.
    use crate::testing::member;

    fn text(value: &str) -> ExprNode {
        ExprNode::literal(ConstValue::String(value.to_string()), code(value))
    }

    fn member_var(f: &mut Fixture, scope: ScopeId, name: &str, ty: TypeId) -> IdentId {
        f.state
            .idents
            .declare(scope, Identifier::new(name, IdentKind::Variable(VariableKind::Member), ty, Span::default()))
            .unwrap()
    }

    #[test]
    fn literals_take_their_natural_type() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        let cases = [
            (int(5), b.int32),
            (int(5_000_000_000), b.int64),
            (double(0.5), b.float64),
            (boolean(true), b.boolean),
            (text("hi"), b.string),
        ];
        for (literal, ty) in cases {
            let expr = f.process_constant(literal).unwrap();
            assert_eq!(expr.root.ty, Some(ty));
        }
    }

    #[test]
    fn mixed_integer_widths_promote() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        f.local("s", b.int16);
        let expr = f.process(op(Operator::Add, vec![name("s"), int(1)])).unwrap();
        assert_eq!(expr.root.ty, Some(b.int32));
        assert!(expr.root.children[0].is_op(Operator::Cast));
        assert_eq!(expr.root.children[0].ty, Some(b.int32));
    }

    #[test]
    fn strings_concatenate_with_stringified_values() {
        let mut f = Fixture::new();
        let expr = f.process(op(Operator::Add, vec![text("n="), int(1)])).unwrap();
        assert_eq!(expr.root.const_value(), Some(&ConstValue::String("n=1".into())));
    }

    #[test]
    fn cast_to_same_type_warns_and_unwraps() {
        let mut f = Fixture::new();
        let int32 = f.int32();
        let x = f.local("x", int32);
        let expr = f.process(op(Operator::Cast, vec![name("x"), name("int32")])).unwrap();
        assert_eq!(expr.root.ident(), Some(x));
        assert_eq!(f.count(|e| matches!(e, CompilationError::CastToSameType { .. })), 1);
    }

    #[test]
    fn reinterpret_needs_equal_sizes() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        f.local("x", b.int32);
        assert!(f.process(op(Operator::Reinterpret, vec![name("x"), name("double")])).is_none());
        assert_eq!(f.count(|e| matches!(e, CompilationError::ReinterpretSize { .. })), 1);

        let expr = f.process(op(Operator::Reinterpret, vec![name("x"), name("float")])).unwrap();
        assert_eq!(expr.root.ty, Some(b.float32));
        assert_eq!(expr.root.children.len(), 1);
    }

    #[test]
    fn casts_to_narrower_types_must_be_explicit() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        f.local("wide", b.int64);
        f.local("narrow", b.int16);
        assert!(f.process(assign(name("narrow"), name("wide"))).is_none());
        assert_eq!(f.count(|e| matches!(e, CompilationError::ImplicitlyCast { .. })), 1);

        let cast = op(Operator::Cast, vec![name("wide"), name("int16")]);
        let expr = f.process(assign(name("narrow"), cast)).unwrap();
        assert_eq!(expr.root.children[1].ty, Some(b.int16));
    }

    #[test]
    fn read_only_targets_are_rejected() {
        let mut f = Fixture::new();
        let int32 = f.int32();
        let c = f.local("c", int32);
        f.state.idents.get_mut(c).flags |= IdentFlags::READ_ONLY;
        assert!(f.process(assign(name("c"), int(1))).is_none());
        assert_eq!(f.count(|e| matches!(e, CompilationError::ReadOnly { name, .. } if name == "c")), 1);
    }

    #[test]
    fn rvalues_cannot_be_assigned() {
        let mut f = Fixture::new();
        assert!(f.process(assign(int(1), int(2))).is_none());
        assert_eq!(f.count(|e| matches!(e, CompilationError::AssignRValue { .. })), 1);
    }

    #[test]
    fn same_variable_operations_warn() {
        let mut f = Fixture::new();
        let int32 = f.int32();
        f.local("x", int32);
        assert!(f.process(assign(name("x"), name("x"))).is_some());
        let expr = f.process(op(Operator::Equality, vec![name("x"), name("x")])).unwrap();
        assert_eq!(expr.root.ty, Some(f.state.types.builtins().boolean));
        assert_eq!(f.count(|e| matches!(e, CompilationError::AssignSameVar { .. })), 1);
        assert_eq!(f.count(|e| matches!(e, CompilationError::CmpSameVariable { .. })), 1);
    }

    #[test]
    fn constant_indices_are_bounds_checked() {
        let mut f = Fixture::new();
        let int32 = f.int32();
        let array = f.state.types.fixed_array(int32, vec![3]);
        f.local("arr", array);

        let expr = f.process(op(Operator::Index, vec![name("arr"), int(2)])).unwrap();
        assert_eq!(expr.root.ty, Some(int32));
        assert!(f.process(op(Operator::Index, vec![name("arr"), int(3)])).is_none());
        assert_eq!(f.count(|e| matches!(e, CompilationError::IndexOutOfRange { .. })), 1);
    }

    #[test]
    fn user_operators_become_calls() {
        let mut f = Fixture::new();
        let (vec2, scope) = f.state.declare_struct("Vec2", ScopeId::GLOBAL, false).unwrap();
        let info = FunctionInfo::new(vec![Param::new("a", vec2), Param::new("b", vec2)], vec2);
        let fn_ty = f.state.types.function(vec2, vec![vec2, vec2]);
        let add = f.state.idents.declare_with_hash(
            scope,
            NameHash::operator_function(Operator::Add),
            Identifier::new(Operator::Add.function_name(), IdentKind::Function(info), fn_ty, Span::default())
                .with_flags(IdentFlags::STATIC),
        );
        f.local("a", vec2);
        f.local("b", vec2);

        let expr = f.process(op(Operator::Add, vec![name("a"), name("b")])).unwrap();
        assert!(expr.root.is_op(Operator::Call));
        assert_eq!(expr.root.children[0].ident(), Some(add));
        assert_eq!(expr.root.ty, Some(vec2));
    }

    #[test]
    fn ref_equality_skips_operator_functions() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        let (node_ty, scope) = f.state.declare_struct("Node", ScopeId::GLOBAL, true).unwrap();
        let info = FunctionInfo::new(vec![Param::new("a", node_ty), Param::new("b", node_ty)], b.boolean);
        let fn_ty = f.state.types.function(b.boolean, vec![node_ty, node_ty]);
        f.state.idents.declare_with_hash(
            scope,
            NameHash::operator_function(Operator::Equality),
            Identifier::new(Operator::Equality.function_name(), IdentKind::Function(info), fn_ty, Span::default())
                .with_flags(IdentFlags::STATIC),
        );
        f.local("a", node_ty);
        f.local("b", node_ty);

        let expr = f.process(op(Operator::RefEquality, vec![name("a"), name("b")])).unwrap();
        assert!(expr.root.is_op(Operator::Equality));
        assert!(expr.root.flags.contains(ExpressionFlags::DISABLE_OP_FUNC));
        assert_eq!(expr.root.ty, Some(b.boolean));

        let expr = f.process(op(Operator::Equality, vec![name("a"), name("b")])).unwrap();
        assert!(expr.root.is_op(Operator::Call));
    }

    #[test]
    fn auto_locals_take_the_assigned_type() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        let v = f.local("v", b.auto);
        f.process(assign(name("v"), double(1.5))).unwrap();
        assert_eq!(f.state.idents.get(v).ty, b.float64);

        let w = f.local("w", b.auto);
        assert!(f.process(assign(name("w"), ExprNode::literal(ConstValue::Null, code("null")))).is_none());
        assert_eq!(f.state.idents.get(w).ty, b.auto);
        assert_eq!(f.count(|e| matches!(e, CompilationError::Untyped { .. })), 1);
    }

    #[test]
    fn tuple_targets_infer_member_wise() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        let p = f.local("p", b.auto);
        let q = f.local("q", b.auto);
        let target = op(Operator::Tuple, vec![name("p"), name("q")]);
        let value = op(Operator::Tuple, vec![int(1), double(2.0)]);
        let expr = f.process(assign(target, value)).unwrap();

        assert_eq!(f.state.idents.get(p).ty, b.int32);
        assert_eq!(f.state.idents.get(q).ty, b.float64);
        let expected = f.state.types.tuple([b.int32, b.float64]);
        assert_eq!(expr.root.ty, Some(expected));
    }

    #[test]
    fn reference_parameters_take_addresses() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        let out = f.state.types.reference_to(b.int32, ReferenceMode::IdGetsAssigned);
        f.function("read", vec![Param::new("value", out)], b.void);
        f.local("x", b.int32);

        let expr = f.process(call("read", vec![name("x")])).unwrap();
        assert!(expr.root.children[1].is_op(Operator::RefIdGetsAssigned));
        assert_eq!(expr.root.children[1].ty, Some(out));

        assert!(f.process(call("read", vec![int(1)])).is_none());
        assert_eq!(f.count(|e| matches!(e, CompilationError::AddressOfRValue { .. })), 1);
    }

    #[test]
    fn object_initializers_fill_missing_fields_with_zero() {
        let mut f = Fixture::new();
        let int32 = f.int32();
        let (point, scope) = f.state.declare_struct("Point", ScopeId::GLOBAL, false).unwrap();
        member_var(&mut f, scope, "x", int32);
        member_var(&mut f, scope, "y", int32);
        f.state.types.set_struct_fields(point, vec![int32, int32]);
        f.local("p", point);

        let init = ExprNode::new(NodeKind::ObjectInit(vec!["y".into()]), code("{ y = 2 }")).with_children(vec![int(2)]);
        let expr = f.process(assign(name("p"), init)).unwrap();
        let value = &expr.root.children[1];
        assert_eq!(value.ty, Some(point));
        assert_eq!(
            value.const_value(),
            Some(&ConstValue::Structured(vec![ConstValue::integer(0), ConstValue::integer(2)]))
        );

        let wrong = ExprNode::new(NodeKind::ObjectInit(vec!["z".into()]), code("{ z = 1 }")).with_children(vec![int(1)]);
        assert!(f.process(assign(name("p"), wrong)).is_none());
        assert_eq!(f.count(|e| matches!(e, CompilationError::UnknownId { name, .. } if name == "z")), 1);
    }

    #[test]
    fn expected_type_converts_the_result() {
        let mut f = Fixture::new();
        let uint8 = f.state.types.builtins().uint8;
        let scope = f.scope;
        let mut root = PluginRoot::for_constants(&mut f.state, scope, false).with_expected_type(uint8);
        let expr = root.process(int(7)).unwrap();
        assert_eq!(expr.root.ty, Some(uint8));
        assert_eq!(expr.root.const_value(), Some(&ConstValue::integer(7)));

        assert!(root.process(int(300)).is_none());
        drop(root);
        assert_eq!(f.count(|e| matches!(e, CompilationError::ImplicitlyCast { .. })), 1);
    }

    #[test]
    fn address_of_constant_points_into_the_cache() {
        let mut f = Fixture::new();
        let int32 = f.int32();
        let expr = f.process(op(Operator::Address, vec![int(5)])).unwrap();
        assert!(matches!(expr.root.kind, NodeKind::DataPointer(_)));
        assert_eq!(expr.root.ty, Some(f.state.types.pointer_to(int32)));
        assert_eq!(f.state.consts.len(), 1);
    }

    #[test]
    fn tuple_members_resolve_by_name_or_position() {
        let mut f = Fixture::new();
        let b = f.state.types.builtins();
        let pair = f.state.types.named_tuple(vec![
            TupleMember { name: Some("key".into()), ty: b.int32 },
            TupleMember { name: None, ty: b.float64 },
        ]);
        f.local("t", pair);

        let expr = f.process(member(name("t"), "key")).unwrap();
        assert_eq!(expr.root.ty, Some(b.int32));
        let expr = f.process(member(name("t"), "Item2")).unwrap();
        assert_eq!(expr.root.ty, Some(b.float64));
    }
}
