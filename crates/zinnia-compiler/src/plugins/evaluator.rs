//! Constant folding stage.
//!
//! Operators whose operands are all constants are computed with
//! [`ConstValue::do_operation`], wrapped to the result type. Partially
//! constant expressions are simplified: constants move to the right of
//! commutative operators, chains like `(a + 1) + 2` are reassociated into
//! `a + 3` and neutral operands (`x + 0`, `x * 1`) disappear.
//!
//! Operand combinations the constant arithmetic does not define are left
//! unevaluated rather than folded, as are divisions by zero and shifts by
//! more than [`MAX_SHIFT`](zinnia_core::const_value::MAX_SHIFT).

use tracing::trace;
use zinnia_core::const_value::member_types;
use zinnia_core::{CheckingMode, CompilationError, ConstValue, Operator, TypeId, TypeKind, TypeTable};

use super::type_mngr::{struct_fields, tuple_member_index};
use super::{fail, type_name};
use crate::node::{ExprNode, ExpressionFlags, NodeKind};
use crate::pipeline::{ExpressionPlugin, PluginResult, PluginRoot};

#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluatorOptions {
    /// Report expressions that do not fold to a constant.
    pub must_be_const: bool,
}

/// The constant folding stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator {
    pub options: EvaluatorOptions,
}

impl ExpressionPlugin for Evaluator {
    fn new_node(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
        let (NodeKind::Op(op), Some(ty)) = (&node.kind, node.ty) else {
            return PluginResult::Succeeded;
        };
        match *op {
            Operator::Cast if node.children.len() == 1 => fold_cast(root, node, ty),
            Operator::Reinterpret if node.children.len() == 1 => fold_reinterpret(root, node, ty),
            Operator::Condition => condition(node),
            Operator::And | Operator::Or => logical(root, node, *op, ty),
            Operator::Tuple | Operator::Array => structured_literal(root, node, ty),
            Operator::Member => constant_member(root, node, ty),
            Operator::Index => constant_element(root, node, ty),
            Operator::Call => intrinsic(root, node, ty),
            op if op.is_calculable() => operator(root, node, op, ty),
            _ => PluginResult::Succeeded,
        }
    }

    fn end(&self, root: &mut PluginRoot<'_>, node: &mut ExprNode) -> PluginResult {
        let constant = node.is_const() || matches!(node.kind, NodeKind::DataPointer(_));
        if self.options.must_be_const && !constant {
            return fail(root, CompilationError::MustBeConst { span: node.code.span() });
        }
        PluginResult::Succeeded
    }
}

impl Evaluator {
    pub fn new(options: EvaluatorOptions) -> Self {
        Self { options }
    }
}

/// Replace `node` with a constant of type `ty`.
fn set_constant(node: &mut ExprNode, value: ConstValue, ty: TypeId) -> PluginResult {
    trace!(value = %value, code = node.code.as_str(), "folded");
    let code = node.code.clone();
    node.replace(ExprNode::constant(value, ty, code).with_flags(ExpressionFlags::RECOGNIZED));
    PluginResult::Ready
}

fn constants(node: &ExprNode) -> Option<Vec<&ConstValue>> {
    node.children.iter().map(ExprNode::const_value).collect()
}

// ============================================================================
// Operators
// ============================================================================

fn operator(root: &mut PluginRoot<'_>, node: &mut ExprNode, op: Operator, ty: TypeId) -> PluginResult {
    if node.children.iter().all(ExprNode::is_const) {
        return fold(root, node, op, ty);
    }
    if node.children.len() != 2 {
        return PluginResult::Succeeded;
    }

    let types = &root.state.types;
    if op.is_reversible() && node.children[0].is_const() && !types.is_string(ty) {
        node.children.swap(0, 1);
        node.kind = NodeKind::Op(op.mirrored());
        return PluginResult::Ready;
    }
    if !node.children[1].is_const() {
        return PluginResult::Succeeded;
    }

    if op == Operator::Subtract
        && let Some(value) = node.children[1].const_value()
        && value.is_negative_number()
        && let Some(negated) = value.do_operation(None, Operator::Negation)
    {
        let value_ty = node.children[1].ty.unwrap_or(ty);
        let negated = negated.wrap_to_type(value_ty, types);
        let code = node.children[1].code.clone();
        node.children[1] = ExprNode::constant(negated, value_ty, code).with_flags(ExpressionFlags::RECOGNIZED);
        node.kind = NodeKind::Op(Operator::Add);
        return PluginResult::Ready;
    }

    if let Some(result) = reassociate(&root.state.types, node, op, ty) {
        return result;
    }
    if let Some(result) = neutral_operand(&root.state.types, node, op, ty) {
        return result;
    }
    unsigned_zero(&root.state.types, node, op)
}

fn fold(root: &mut PluginRoot<'_>, node: &mut ExprNode, op: Operator, ty: TypeId) -> PluginResult {
    let Some(values) = constants(node) else {
        return PluginResult::Succeeded;
    };
    let (a, b) = (values[0], values.get(1).copied());

    if matches!(op, Operator::Equality | Operator::Inequality)
        && let Some(b) = b
        && (matches!(a, ConstValue::Null) || matches!(b, ConstValue::Null))
    {
        let nulls = |v: &ConstValue| matches!(v, ConstValue::Null);
        if matches!(a, ConstValue::Zero) || matches!(b, ConstValue::Zero) {
            return PluginResult::Succeeded;
        }
        let same = nulls(a) == nulls(b);
        return set_constant(node, ConstValue::Boolean(same == (op == Operator::Equality)), ty);
    }

    let op = match (a, op) {
        (ConstValue::Boolean(_), Operator::BitwiseAnd) => Operator::And,
        (ConstValue::Boolean(_), Operator::BitwiseOr) => Operator::Or,
        (ConstValue::Boolean(_), Operator::BitwiseXor) => Operator::Inequality,
        _ => op,
    };
    if !can_fold(op, a, b) {
        return PluginResult::Succeeded;
    }
    let Some(raw) = a.do_operation(b, op) else {
        return PluginResult::Succeeded;
    };

    let types = &root.state.types;
    if root.state.config.checking_mode == CheckingMode::Checked && !raw.check_bounds(ty, types) {
        let error = CompilationError::ConstOutOfRange {
            value: raw.to_string(),
            ty: type_name(root.state, ty),
            span: node.code.span(),
        };
        return fail(root, error);
    }
    let value = raw.wrap_to_type(ty, types);
    set_constant(node, value, ty)
}

/// Whether [`ConstValue::do_operation`] defines `op` on the operands.
fn can_fold(op: Operator, a: &ConstValue, b: Option<&ConstValue>) -> bool {
    let member_wise = !op.is_rel_equality() && !op.is_logical();
    match (a, b) {
        (ConstValue::Structured(l), Some(ConstValue::Structured(r))) => {
            member_wise && l.len() == r.len() && l.iter().zip(r).all(|(x, y)| can_fold(op, x, Some(y)))
        }
        (ConstValue::Structured(l), None) => {
            matches!(op, Operator::UnaryPlus | Operator::Negation | Operator::Complement)
                && l.iter().all(|x| can_fold(op, x, None))
        }
        (ConstValue::Structured(l), Some(scalar)) => member_wise && l.iter().all(|x| can_fold(op, x, Some(scalar))),
        (_, Some(ConstValue::Structured(_))) => false,
        (_, Some(b)) if a.kind() != b.kind() => false,
        _ => defined(op, a),
    }
}

fn defined(op: Operator, value: &ConstValue) -> bool {
    let unary = matches!(op, Operator::UnaryPlus | Operator::Negation);
    match value {
        ConstValue::Integer(_) => {
            op.is_bit_arithm_shift() || op.is_rel_equality() || unary || op == Operator::Complement
        }
        ConstValue::Char(_) => op.is_bit_arithm() || op.is_rel_equality() || unary || op == Operator::Complement,
        ConstValue::Float(_) | ConstValue::Double(_) => op.is_arithmetical() || op.is_rel_equality() || unary,
        ConstValue::String(_) => matches!(op, Operator::Add | Operator::Equality | Operator::Inequality),
        ConstValue::Boolean(_) => matches!(
            op,
            Operator::Not | Operator::Equality | Operator::Inequality | Operator::And | Operator::Or
        ),
        ConstValue::Structured(_) | ConstValue::Zero | ConstValue::Null => false,
    }
}

/// `(a + c1) + c2` to `a + (c1 + c2)`, likewise for `-` after `+`, and
/// `*`, `/` after `*`. Division only reassociates floating point values.
fn reassociate(types: &TypeTable, node: &mut ExprNode, op: Operator, ty: TypeId) -> Option<PluginResult> {
    let inner = &node.children[0];
    let inner_op = inner.operator()?;
    let combine = match (inner_op, op) {
        (Operator::Add, Operator::Add | Operator::Subtract) => op,
        (Operator::Multiply, Operator::Multiply) => op,
        (Operator::Multiply, Operator::Divide) if types.is_float(ty) => op,
        _ => return None,
    };
    if !types.is_scalar_or_vector_number(ty)
        || inner.ty != Some(ty)
        || inner.children.len() != 2
        || inner.children[0].is_const()
    {
        return None;
    }

    let c1 = inner.children[1].const_value()?;
    let c2 = node.children[1].const_value()?;
    if !can_fold(combine, c1, Some(c2)) {
        return None;
    }
    let value = c1.do_operation(Some(c2), combine)?.wrap_to_type(ty, types);

    let mut inner = node.children[0].take();
    let operand = inner.children.swap_remove(0);
    let code = node.children[1].code.clone();
    let constant = ExprNode::constant(value, ty, code).with_flags(ExpressionFlags::RECOGNIZED);
    node.kind = NodeKind::Op(inner_op);
    node.children = vec![operand, constant];
    node.links.append(&mut inner.links);
    Some(PluginResult::Ready)
}

/// `x + 0`, `x - 0`, `x | 0`, `x ^ 0`, shifts by zero, `x * 1` and `x / 1`
/// become `x`; `x * 0` becomes zero.
fn neutral_operand(types: &TypeTable, node: &mut ExprNode, op: Operator, ty: TypeId) -> Option<PluginResult> {
    let constant = node.children[1].const_value()?;
    if node.children[0].ty != Some(ty) || !types.is_scalar_or_vector_number(ty) {
        return None;
    }

    let zero = constant.is_zero_number();
    let one = constant.is_one_number();
    match op {
        Operator::Add
        | Operator::Subtract
        | Operator::BitwiseOr
        | Operator::BitwiseXor
        | Operator::ShiftLeft
        | Operator::ShiftRight
            if zero =>
        {
            node.unwrap_child(0);
            Some(PluginResult::Ready)
        }
        Operator::Multiply | Operator::Divide if one => {
            node.unwrap_child(0);
            Some(PluginResult::Ready)
        }
        Operator::Multiply if zero => {
            let value = ConstValue::zero_of_type(ty, types)?;
            Some(set_constant(node, value, ty))
        }
        _ => None,
    }
}

/// Comparisons of an unsigned value against zero: `u >= 0` is true, `u < 0`
/// false, `u > 0` is `u != 0` and `u <= 0` is `u == 0`. Only applies when the
/// compared value has exactly the unsigned type of the comparison.
fn unsigned_zero(types: &TypeTable, node: &mut ExprNode, op: Operator) -> PluginResult {
    let (value, zero) = (&node.children[0], &node.children[1]);
    let Some(value_ty) = value.ty else {
        return PluginResult::Succeeded;
    };
    let exact = !value.is_op(Operator::Cast) && zero.ty == Some(value_ty) && types.is_unsigned(value_ty);
    let is_zero = zero.const_value().is_some_and(|v| v.as_integer().is_some() && v.is_zero_number());
    if !exact || !is_zero {
        return PluginResult::Succeeded;
    }

    let Some(ty) = node.ty else {
        return PluginResult::Succeeded;
    };
    match op {
        Operator::GreaterEqual => set_constant(node, ConstValue::Boolean(true), ty),
        Operator::Less => set_constant(node, ConstValue::Boolean(false), ty),
        Operator::Greater => {
            node.kind = NodeKind::Op(Operator::Inequality);
            PluginResult::Ready
        }
        Operator::LessEqual => {
            node.kind = NodeKind::Op(Operator::Equality);
            PluginResult::Ready
        }
        _ => PluginResult::Succeeded,
    }
}

/// `c ? a : b` with a constant condition is the taken branch.
fn condition(node: &mut ExprNode) -> PluginResult {
    match node.children[0].condition_result() {
        Some(taken) => {
            node.unwrap_child(if taken { 1 } else { 2 });
            PluginResult::Ready
        }
        None => PluginResult::Succeeded,
    }
}

/// `&&` and `||` with a constant operand.
fn logical(root: &mut PluginRoot<'_>, node: &mut ExprNode, op: Operator, ty: TypeId) -> PluginResult {
    if node.children.iter().all(ExprNode::is_const) {
        return fold(root, node, op, ty);
    }
    // The operand value that decides the result on its own.
    let absorbing = op == Operator::Or;
    for index in 0..2 {
        let Some(value) = node.children[index].condition_result() else {
            continue;
        };
        if value == absorbing {
            return set_constant(node, ConstValue::Boolean(absorbing), ty);
        }
        node.unwrap_child(1 - index);
        return PluginResult::Ready;
    }
    PluginResult::Succeeded
}

// ============================================================================
// Conversions
// ============================================================================

enum CastFailure {
    /// The constant arithmetic has no such conversion; the cast stays.
    Unsupported,
    OutOfRange(ConstValue),
    NotRepresentable,
}

fn fold_cast(root: &mut PluginRoot<'_>, node: &mut ExprNode, ty: TypeId) -> PluginResult {
    let Some(value) = node.children[0].const_value() else {
        return PluginResult::Succeeded;
    };
    let mode = root.state.config.checking_mode;
    match cast_constant(value, ty, &root.state.types, mode) {
        Ok(converted) => set_constant(node, converted, ty),
        Err(CastFailure::Unsupported) => PluginResult::Succeeded,
        Err(CastFailure::OutOfRange(value)) => {
            let error = CompilationError::ConstOutOfRange {
                value: value.to_string(),
                ty: type_name(root.state, ty),
                span: node.code.span(),
            };
            fail(root, error)
        }
        Err(CastFailure::NotRepresentable) => {
            let error = CompilationError::CannotConvertConst {
                value: value.to_string(),
                to: type_name(root.state, ty),
                span: node.code.span(),
            };
            fail(root, error)
        }
    }
}

/// Convert a constant to `ty`. A scalar converted to a structured type is
/// broadcast to every member.
fn cast_constant(value: &ConstValue, ty: TypeId, types: &TypeTable, mode: CheckingMode) -> Result<ConstValue, CastFailure> {
    let ty = types.non_ref(ty);
    if !matches!(value, ConstValue::Zero)
        && let Some(members) = member_types(ty, types)
    {
        let converted = match value {
            ConstValue::Structured(values) if values.len() == members.len() => values
                .iter()
                .zip(members)
                .map(|(v, m)| cast_constant(v, m, types, mode))
                .collect::<Result<Vec<_>, _>>()?,
            ConstValue::Structured(_) => return Err(CastFailure::Unsupported),
            scalar => members
                .into_iter()
                .map(|m| cast_constant(scalar, m, types, mode))
                .collect::<Result<Vec<_>, _>>()?,
        };
        return Ok(ConstValue::Structured(converted));
    }

    let integral = types.is_integer(ty) || types.is_char(ty) || types.is_enum(ty);
    let value = match value {
        ConstValue::Float(_) | ConstValue::Double(_) if integral => {
            value.convert_to_type(ty, types).ok_or(CastFailure::NotRepresentable)?
        }
        _ => value.clone(),
    };
    if integral && let ConstValue::Integer(_) = value {
        let value = if value.check_bounds(ty, types) || mode == CheckingMode::Unchecked {
            value.wrap_to_type(ty, types)
        } else {
            return Err(CastFailure::OutOfRange(value));
        };
        return value.convert_to_type(ty, types).ok_or(CastFailure::Unsupported);
    }
    value.convert_to_type(ty, types).ok_or(CastFailure::Unsupported)
}

/// Reinterpret the bytes of a number constant as an integer or floating
/// point value of the same size.
fn fold_reinterpret(root: &mut PluginRoot<'_>, node: &mut ExprNode, ty: TypeId) -> PluginResult {
    let Some(value) = node.children[0].const_value() else {
        return PluginResult::Succeeded;
    };
    let types = &root.state.types;
    let size = types.size_of(ty) as usize;
    let result = match types.kind(types.non_ref(ty)) {
        TypeKind::Integer { signed: true, .. } => value.get_signed(0, size).map(ConstValue::integer),
        TypeKind::Integer { signed: false, .. } => value.get_unsigned(0, size).map(ConstValue::integer),
        TypeKind::Float { size: 4 } => value
            .get_unsigned(0, 4)
            .and_then(|bits| u32::try_from(bits).ok())
            .map(|bits| ConstValue::Float(f32::from_bits(bits))),
        TypeKind::Float { .. } => value
            .get_unsigned(0, 8)
            .map(|bits| ConstValue::Double(f64::from_bits(bits))),
        _ => None,
    };
    match result {
        Some(value) => set_constant(node, value, ty),
        None => PluginResult::Succeeded,
    }
}

// ============================================================================
// Structured values
// ============================================================================

/// Tuple and array literals of constants become one structured constant.
fn structured_literal(root: &PluginRoot<'_>, node: &mut ExprNode, ty: TypeId) -> PluginResult {
    let types = &root.state.types;
    let target = types.non_ref(ty);
    let fixed = matches!(
        types.kind(target),
        TypeKind::Tuple { .. } | TypeKind::Struct { class: false, .. } | TypeKind::FixedArray { .. }
    );
    let Some(values) = constants(node).filter(|_| fixed) else {
        return PluginResult::Succeeded;
    };
    let value = ConstValue::Structured(values.into_iter().cloned().collect());
    if !value.check_bounds(target, types) {
        return PluginResult::Succeeded;
    }
    set_constant(node, value, ty)
}

/// A member of a structured constant.
fn constant_member(root: &PluginRoot<'_>, node: &mut ExprNode, ty: TypeId) -> PluginResult {
    let (object, member) = (&node.children[0], &node.children[1]);
    let (Some(value), Some(object_ty)) = (object.const_value(), object.ty) else {
        return PluginResult::Succeeded;
    };
    let object_ty = root.state.types.non_ref(object_ty);
    let position = match member.kind {
        NodeKind::Str => tuple_member_index(&root.state.types, object_ty, member.code.as_str()),
        NodeKind::Id(id) => struct_fields(root.state, object_ty).iter().position(|&f| f == id),
        _ => None,
    };
    match position.and_then(|p| value.get_member(p)) {
        Some(member) => set_constant(node, member, ty),
        None => PluginResult::Succeeded,
    }
}

/// An element of a constant fixed array at constant indices.
fn constant_element(root: &PluginRoot<'_>, node: &mut ExprNode, ty: TypeId) -> PluginResult {
    let Some(values) = constants(node) else {
        return PluginResult::Succeeded;
    };
    let Some(array_ty) = node.children[0].ty else {
        return PluginResult::Succeeded;
    };
    let array_ty = root.state.types.non_ref(array_ty);
    let TypeKind::FixedArray { lengths, .. } = root.state.types.kind(array_ty) else {
        return PluginResult::Succeeded;
    };
    if values.len() - 1 != lengths.len() {
        return PluginResult::Succeeded;
    }

    let mut flat = 0usize;
    for (index, &length) in values[1..].iter().zip(lengths) {
        let Some(index) = index.as_integer().and_then(|i| usize::try_from(i).ok()) else {
            return PluginResult::Succeeded;
        };
        if index >= length as usize {
            return PluginResult::Succeeded;
        }
        flat = flat * length as usize + index;
    }
    match values[0].get_member(flat) {
        Some(element) => set_constant(node, element, ty),
        None => PluginResult::Succeeded,
    }
}

// ============================================================================
// Intrinsics
// ============================================================================

/// Math functions called with constant arguments.
fn intrinsic(root: &PluginRoot<'_>, node: &mut ExprNode, ty: TypeId) -> PluginResult {
    let function = node.children[0]
        .referenced_ident()
        .and_then(|id| root.state.idents.get(id).function())
        .and_then(|info| info.intrinsic);
    let Some(function) = function else {
        return PluginResult::Succeeded;
    };
    let args: Option<Vec<&ConstValue>> = node.children[1..].iter().map(ExprNode::const_value).collect();
    let Some(args) = args.filter(|a| function.accepts_arity(a.len())) else {
        return PluginResult::Succeeded;
    };

    let result = match args.as_slice() {
        [x] => function.apply1(x),
        [x, y] => function.apply2(x, y),
        _ => None,
    };
    let mode = root.state.config.checking_mode;
    match result.map(|r| cast_constant(&r, ty, &root.state.types, mode)) {
        Some(Ok(value)) => set_constant(node, value, ty),
        _ => PluginResult::Succeeded,
    }
}
