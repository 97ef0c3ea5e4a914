//! Integration tests using Unit as the entry point.
//!
//! Each test builds raw expression trees the way a parser would hand them
//! over, runs them through the stock pipelines and, where statements are
//! involved, checks the resulting function bodies.

use std::sync::Arc;

use proptest::prelude::*;
use zinnia::prelude::*;
use zinnia_core::{ConstCache, IdentFlags, PropertyInfo, ReferenceMode};

// =============================================================================
// Builders
// =============================================================================

fn code_at(text: &str, line: u32) -> CodeString {
    CodeString::new(text, Span::new(line, 1, text.len() as u32))
}

fn name_at(text: &str, line: u32) -> ExprNode {
    ExprNode::name(code_at(text, line))
}

fn name(text: &str) -> ExprNode {
    name_at(text, 1)
}

fn int(value: i64) -> ExprNode {
    ExprNode::literal(ConstValue::integer(value), code_at(&value.to_string(), 1))
}

fn op(op: Operator, children: Vec<ExprNode>) -> ExprNode {
    ExprNode::op(op, children, code_at(op.symbol(), 1))
}

fn call(callee: &str, args: Vec<ExprNode>) -> ExprNode {
    let callee = name(callee);
    let code = callee.code.clone();
    let mut children = vec![callee];
    children.extend(args);
    ExprNode::op(Operator::Call, children, code)
}

fn assign(target: ExprNode, value: ExprNode) -> ExprNode {
    op(Operator::Assignment, vec![target, value])
}

fn member(object: ExprNode, field: &str) -> ExprNode {
    ExprNode::op(Operator::Member, vec![object, name(field)], code_at(field, 1))
}

fn line(n: u32) -> Span {
    Span::point(n, 1)
}

// =============================================================================
// Declarations
// =============================================================================

fn function_in(unit: &mut Unit, scope: ScopeId, name: &str, params: Vec<Param>, ret: TypeId) -> IdentId {
    let state = unit.state_mut();
    let ty = state.types.function(ret, params.iter().map(|p| p.ty).collect());
    state
        .idents
        .declare(
            scope,
            Identifier::new(name, IdentKind::Function(FunctionInfo::new(params, ret)), ty, Span::default())
                .with_flags(IdentFlags::STATIC),
        )
        .unwrap()
}

fn function(unit: &mut Unit, name: &str, params: Vec<Param>, ret: TypeId) -> IdentId {
    function_in(unit, ScopeId::GLOBAL, name, params, ret)
}

fn method(unit: &mut Unit, scope: ScopeId, name: &str, params: Vec<Param>, ret: TypeId) -> IdentId {
    let state = unit.state_mut();
    let ty = state.types.function(ret, params.iter().map(|p| p.ty).collect());
    state
        .idents
        .declare(
            scope,
            Identifier::new(name, IdentKind::Function(FunctionInfo::new(params, ret)), ty, Span::default()),
        )
        .unwrap()
}

fn local(unit: &mut Unit, scope: ScopeId, name: &str, ty: TypeId) -> IdentId {
    let idents = &mut unit.state_mut().idents;
    let id = idents.create_local(scope, name, ty, Span::point(1, 5)).unwrap();
    idents.publish(id);
    id
}

/// A unit with one void function scope to compile statements in.
fn unit() -> (Unit, ScopeId) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut unit = Unit::new(CompilerConfig::default());
    let void = unit.state().types.builtins().void;
    let scope = unit.state_mut().function_scope(ScopeId::GLOBAL, void, None);
    (unit, scope)
}

fn count(unit: &Unit, predicate: impl Fn(&CompilationError) -> bool) -> usize {
    unit.diagnostics().count_where(predicate)
}

fn calls_to(expr: &Expression, unit: &Unit, function: &str) -> usize {
    let mut count = 0;
    let mut visit = |n: &ExprNode| {
        if n.is_op(Operator::Call)
            && n.children[0]
                .referenced_ident()
                .is_some_and(|id| unit.state().idents.get(id).name == function)
        {
            count += 1;
        }
    };
    expr.root.for_each(&mut visit);
    for (_, linked) in expr.links.iter() {
        linked.node.for_each(&mut visit);
    }
    count
}

// =============================================================================
// Constant folding
// =============================================================================

#[test]
fn test_narrow_integers_wrap() {
    let (mut unit, scope) = unit();
    let uint8 = unit.state().types.builtins().uint8;
    let cast = |value| op(Operator::Cast, vec![int(value), name("uint8")]);

    let expr = unit.constant(scope, op(Operator::Add, vec![cast(200), cast(100)])).unwrap();
    assert_eq!(expr.root.const_value(), Some(&ConstValue::integer(44)));
    assert_eq!(expr.root.ty, Some(uint8));
    assert_eq!(unit.diagnostics().error_count(), 0);
}

#[test]
fn test_checked_overflow_fails_the_constant() {
    let mut unit = Unit::new(CompilerConfig::default().with_checking_mode(CheckingMode::Checked));
    let cast = |value| op(Operator::Cast, vec![int(value), name("uint8")]);

    let err = unit
        .global(op(Operator::Add, vec![cast(200), cast(100)]))
        .unwrap_err();
    assert!(matches!(err, UnitError::Expression { errors } if errors >= 1));
    assert_eq!(count(&unit, |e| matches!(e, CompilationError::ConstOutOfRange { .. })), 1);
}

#[test]
fn test_neutral_operands() {
    let (mut unit, scope) = unit();
    let int32 = unit.state().types.builtins().int32;
    let e = local(&mut unit, scope, "e", int32);

    let expr = unit.expression(scope, op(Operator::Add, vec![name("e"), int(0)])).unwrap();
    assert_eq!(expr.root.ident(), Some(e));

    let expr = unit.expression(scope, op(Operator::Multiply, vec![name("e"), int(1)])).unwrap();
    assert_eq!(expr.root.ident(), Some(e));

    let expr = unit.expression(scope, op(Operator::Multiply, vec![name("e"), int(0)])).unwrap();
    assert_eq!(expr.root.const_value(), Some(&ConstValue::integer(0)));
    assert_eq!(expr.root.ty, Some(int32));
}

#[test]
fn test_global_initializers_share_constants() {
    let diagnostics = Arc::new(Diagnostics::new());
    let consts = Arc::new(ConstCache::new());
    let mut first = Unit::with_shared(CompilerConfig::default(), Arc::clone(&diagnostics), Arc::clone(&consts));
    let mut second = Unit::with_shared(CompilerConfig::default(), Arc::clone(&diagnostics), consts);

    let a = first.global(op(Operator::Multiply, vec![int(6), int(7)])).unwrap();
    let b = second.global(op(Operator::Subtract, vec![int(50), int(8)])).unwrap();
    assert_eq!(a.root.const_value(), Some(&ConstValue::integer(42)));
    assert_eq!(a.root.const_value(), b.root.const_value());
    assert!(diagnostics.is_empty());
}

proptest! {
    #[test]
    fn test_global_comparisons_agree_with_native(a in any::<i32>(), b in any::<i32>()) {
        let mut unit = Unit::new(CompilerConfig::default());
        let less = unit.global(op(Operator::Less, vec![int(i64::from(a)), int(i64::from(b))])).unwrap();
        prop_assert_eq!(less.root.const_value(), Some(&ConstValue::Boolean(a < b)));
    }

    #[test]
    fn test_uint8_sums_wrap(a in any::<u8>(), b in any::<u8>()) {
        let (mut unit, scope) = unit();
        let cast = |value: u8| op(Operator::Cast, vec![int(i64::from(value)), name("uint8")]);
        let sum = unit.constant(scope, op(Operator::Add, vec![cast(a), cast(b)])).unwrap();
        prop_assert_eq!(sum.root.const_value(), Some(&ConstValue::integer(i64::from(a.wrapping_add(b)))));
    }
}

// =============================================================================
// Overloads
// =============================================================================

#[test]
fn test_exact_overload_wins() {
    let (mut unit, scope) = unit();
    let b = unit.state().types.builtins();
    let f_int = function(&mut unit, "f", vec![Param::new("x", b.int32)], b.void);
    let f_double = function(&mut unit, "f", vec![Param::new("x", b.float64)], b.void);
    local(&mut unit, scope, "i", b.int32);
    local(&mut unit, scope, "d", b.float64);

    let expr = unit.expression(scope, call("f", vec![name("i")])).unwrap();
    assert_eq!(expr.root.children[0].ident(), Some(f_int));
    let expr = unit.expression(scope, call("f", vec![name("d")])).unwrap();
    assert_eq!(expr.root.children[0].ident(), Some(f_double));
}

#[test]
fn test_narrower_widening_wins() {
    let (mut unit, scope) = unit();
    let b = unit.state().types.builtins();
    function(&mut unit, "g", vec![Param::new("x", b.int64)], b.void);
    let g_int = function(&mut unit, "g", vec![Param::new("x", b.int32)], b.void);
    local(&mut unit, scope, "s", b.int16);

    // Declaration order does not matter.
    for _ in 0..2 {
        let expr = unit.expression(scope, call("g", vec![name("s")])).unwrap();
        assert_eq!(expr.root.children[0].ident(), Some(g_int));
    }
}

#[test]
fn test_ambiguous_overload() {
    let (mut unit, scope) = unit();
    let b = unit.state().types.builtins();
    function(&mut unit, "h", vec![Param::new("x", b.int32), Param::new("y", b.float64)], b.void);
    function(&mut unit, "h", vec![Param::new("x", b.float64), Param::new("y", b.int32)], b.void);
    local(&mut unit, scope, "i", b.int32);

    let err = unit
        .expression(scope, call("h", vec![name("i"), name("i")]))
        .unwrap_err();
    assert!(matches!(err, UnitError::Expression { errors } if errors >= 1));
    assert_eq!(
        count(&unit, |e| matches!(e, CompilationError::AmbiguousOverload { name, .. } if name == "h")),
        1
    );
}

// =============================================================================
// Desugaring
// =============================================================================

struct Widget {
    ty: TypeId,
    getter: IdentId,
    setter: IdentId,
}

fn widget(unit: &mut Unit) -> Widget {
    let b = unit.state().types.builtins();
    let (ty, scope) = unit.state_mut().declare_struct("Widget", ScopeId::GLOBAL, true).unwrap();
    let getter = method(unit, scope, "get_Size", vec![], b.int32);
    let setter = method(unit, scope, "set_Size", vec![Param::new("value", b.int32)], b.void);
    let size = PropertyInfo {
        getter: Some(getter),
        setter: Some(setter),
        index_params: vec![],
    };
    unit.state_mut()
        .idents
        .declare(scope, Identifier::new("Size", IdentKind::Property(size), b.int32, Span::default()))
        .unwrap();
    Widget { ty, getter, setter }
}

#[test]
fn test_property_reads_and_writes_become_calls() {
    let (mut unit, scope) = unit();
    let int32 = unit.state().types.builtins().int32;
    let w = widget(&mut unit);
    local(&mut unit, scope, "w", w.ty);
    let x = local(&mut unit, scope, "x", int32);

    let expr = unit.expression(scope, assign(member(name("w"), "Size"), int(5))).unwrap();
    assert!(expr.root.is_op(Operator::Call));
    assert_eq!(expr.root.children[0].referenced_ident(), Some(w.setter));
    assert_eq!(expr.root.children.last().and_then(|c| c.const_value()), Some(&ConstValue::integer(5)));

    let expr = unit.expression(scope, assign(name("x"), member(name("w"), "Size"))).unwrap();
    assert!(expr.root.is_op(Operator::Assignment));
    assert_eq!(expr.root.children[0].ident(), Some(x));
    let read = &expr.root.children[1];
    assert!(read.is_op(Operator::Call));
    assert_eq!(read.children[0].referenced_ident(), Some(w.getter));
}

#[test]
fn test_element_increment_computes_the_index_once() {
    let (mut unit, scope) = unit();
    let int32 = unit.state().types.builtins().int32;
    let array = unit.state_mut().types.fixed_array(int32, vec![8]);
    local(&mut unit, scope, "arr", array);
    function(&mut unit, "i", vec![], int32);

    let raw = op(Operator::Increase, vec![op(Operator::Index, vec![name("arr"), call("i", vec![])])]);
    let expr = unit.expression(scope, raw).unwrap();
    assert!(expr.root.is_op(Operator::Assignment));
    assert_eq!(calls_to(&expr, &unit, "i"), 1);
}

#[test]
fn test_property_update_evaluates_the_object_once() {
    let (mut unit, scope) = unit();
    let int32 = unit.state().types.builtins().int32;
    let w = widget(&mut unit);
    let widgets = unit.state_mut().types.fixed_array(w.ty, vec![4]);
    local(&mut unit, scope, "ws", widgets);
    function(&mut unit, "pick", vec![], int32);

    let target = member(op(Operator::Index, vec![name("ws"), call("pick", vec![])]), "Size");
    let expr = unit.expression(scope, op(Operator::Increase, vec![target])).unwrap();
    assert_eq!(expr.root.children[0].referenced_ident(), Some(w.setter));
    assert_eq!(calls_to(&expr, &unit, "pick"), 1);
    assert_eq!(calls_to(&expr, &unit, "get_Size"), 1);
    assert_eq!(calls_to(&expr, &unit, "set_Size"), 1);
}

// =============================================================================
// Function bodies
// =============================================================================

#[test]
fn test_use_of_possibly_unassigned_local() {
    let (mut unit, scope) = unit();
    let b = unit.state().types.builtins();
    unit.state_mut()
        .idents
        .declare_parameter(scope, "flag", b.boolean, Span::point(1, 10))
        .unwrap();
    local(&mut unit, scope, "x", b.int32);
    function(&mut unit, "consume", vec![Param::new("value", b.int32)], b.void);

    let condition = unit.expression(scope, name("flag")).unwrap();
    let write = unit.expression(scope, assign(name("x"), int(1))).unwrap();
    let read = unit
        .expression(scope, call("consume", vec![name_at("x", 5)]))
        .unwrap();

    let mut body = FunctionBody::new(scope, line(1));
    let then = body.block(scope);
    body.push(then, line(3), Command::Expression(write));
    let root = body.root();
    body.push(
        root,
        line(2),
        Command::If {
            branches: vec![(condition, then)],
            otherwise: None,
        },
    );
    body.push(root, line(5), Command::Expression(read));
    unit.add_function("main", body).unwrap();

    assert_eq!(
        unit.build(),
        Err(UnitError::CheckFailed {
            failed: vec!["main".to_string()]
        })
    );
    assert!(!unit.is_built());
    let spans: Vec<Span> = unit
        .diagnostics()
        .messages()
        .into_iter()
        .filter(|e| matches!(e, CompilationError::UnassignedVar { name, .. } if name == "x"))
        .map(|e| e.span())
        .collect();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].line, 5);
}

#[test]
fn test_constant_conditions_decide_branches() {
    let (mut unit, scope) = unit();
    let b = unit.state().types.builtins();
    local(&mut unit, scope, "x", b.int32);
    function(&mut unit, "consume", vec![Param::new("value", b.int32)], b.void);
    let boolean = |value: bool| ExprNode::literal(ConstValue::Boolean(value), code_at(&value.to_string(), 2));

    let always = unit.expression(scope, boolean(true)).unwrap();
    let never = unit.expression(scope, boolean(false)).unwrap();
    let write = unit.expression(scope, assign(name("x"), int(1))).unwrap();
    let skipped = unit.expression(scope, call("consume", vec![int(2)])).unwrap();
    let read = unit
        .expression(scope, call("consume", vec![name_at("x", 7)]))
        .unwrap();

    let mut body = FunctionBody::new(scope, line(1));
    let then = body.block(scope);
    body.push(then, line(3), Command::Expression(write));
    let dead = body.block(scope);
    body.push(dead, line(5), Command::Expression(skipped));
    let root = body.root();
    body.push(
        root,
        line(2),
        Command::If {
            branches: vec![(always, then)],
            otherwise: None,
        },
    );
    body.push(
        root,
        line(4),
        Command::If {
            branches: vec![(never, dead)],
            otherwise: None,
        },
    );
    body.push(root, line(7), Command::Expression(read));
    unit.add_function("main", body).unwrap();

    assert_eq!(unit.build(), Ok(()));
    assert_eq!(unit.diagnostics().error_count(), 0);
    assert_eq!(unit.diagnostics().warning_count(), 1);
    assert_eq!(
        count(&unit, |e| matches!(e, CompilationError::UnreachableCode { span } if span.line == 5)),
        1
    );
}

#[test]
fn test_code_after_return_warns_once() {
    let (mut unit, scope) = unit();
    let b = unit.state().types.builtins();
    function(&mut unit, "consume", vec![Param::new("value", b.int32)], b.void);
    let first = unit.expression(scope, call("consume", vec![int(1)])).unwrap();
    let second = unit.expression(scope, call("consume", vec![int(2)])).unwrap();

    let mut body = FunctionBody::new(scope, line(1));
    let root = body.root();
    body.push(root, line(2), Command::Return(None));
    body.push(root, line(3), Command::Expression(first));
    body.push(root, line(4), Command::Expression(second));
    unit.add_function("main", body).unwrap();

    assert_eq!(unit.build(), Ok(()));
    assert!(unit.is_built());
    assert_eq!(unit.diagnostics().warning_count(), 1);
    assert_eq!(
        count(&unit, |e| matches!(e, CompilationError::UnreachableCode { span } if span.line == 3)),
        1
    );
}

#[test]
fn test_output_parameter_must_be_assigned() {
    let (mut unit, _) = unit();
    let b = unit.state().types.builtins();
    let out = unit.state_mut().types.reference_to(b.int32, ReferenceMode::IdGetsAssigned);
    let scope = unit.state_mut().function_scope(ScopeId::GLOBAL, b.void, None);
    unit.state_mut()
        .idents
        .declare_parameter(scope, "result", out, Span::point(1, 12))
        .unwrap();

    let body = FunctionBody::new(scope, line(1));
    unit.add_function("fill", body).unwrap();
    assert!(unit.build().is_err());
    assert_eq!(
        count(&unit, |e| matches!(e, CompilationError::UnassignedVar { name, .. } if name == "result")),
        1
    );
}

#[test]
fn test_duplicate_function_names() {
    let (mut unit, scope) = unit();
    unit.add_function("main", FunctionBody::new(scope, line(1))).unwrap();
    let err = unit.add_function("main", FunctionBody::new(scope, line(9))).unwrap_err();
    assert_eq!(err, UnitError::DuplicateFunction("main".to_string()));
    assert_eq!(unit.function_count(), 1);
    assert_eq!(unit.function("main").map(|b| b.declaration), Some(line(1)));
}

#[test]
fn test_disabled_code_checking() {
    let mut unit = Unit::new(CompilerConfig::default().with_code_checking(false));
    let b = unit.state().types.builtins();
    let scope = unit.state_mut().function_scope(ScopeId::GLOBAL, b.int32, None);

    // Falls off the end of a non-void function.
    unit.add_function("answer", FunctionBody::new(scope, line(1))).unwrap();
    assert_eq!(unit.build(), Ok(()));
    assert!(unit.diagnostics().is_empty());
}
