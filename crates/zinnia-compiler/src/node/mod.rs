//! The expression-node graph.
//!
//! An [`ExprNode`] is an owned tree: operands are stored in `children` and
//! plain children never alias. Sharing is only introduced through linked
//! nodes: a subexpression computed once is moved into the [`LinkArena`] and
//! referenced by [`NodeKind::Linking`] handles. The node that owns the link
//! lists its handle in `links`.
//!
//! ## Child layout per operator
//!
//! - `Call`, `NewObject`: callee or constructed type, then the arguments
//! - `NewArray`: the element type, then the dimension sizes
//! - `Member`: the object, then the member
//! - `Index`: the indexed value, then the indices
//! - `Cast`, `Reinterpret`, `Is`, `As`: the value, optionally followed by a
//!   type reference; once typed the target lives in `ty`
//! - `Condition`: condition, then-value, else-value

mod linking;
mod variables;

pub use linking::{LinkArena, LinkId, LinkedNode, LinkedNodeFlags};
pub use variables::NodeVariables;

use bitflags::bitflags;
use zinnia_core::{CodeString, ConstHandle, ConstValue, IdentId, Operator, TypeId};

use crate::pipeline::Suspension;
use crate::plugins::preproc::MacroId;

bitflags! {
    /// Per-node processing options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ExpressionFlags: u16 {
        /// Conversions may be inserted around the node without a diagnostic.
        const AUTO_CONVERT = 1 << 0;
        /// `ty` was set by the creator and must not be inferred.
        const FIXED_TYPE = 1 << 1;
        /// The identifier must be assigned before the expression is finished.
        const ID_MUST_BE_ASSIGNED = 1 << 2;
        /// The operands were swapped while canonicalizing.
        const REVERSE_OPERATION = 1 << 3;
        /// Property reads through this node become getter calls.
        const ENABLE_GETTER = 1 << 4;
        /// Do not look for user operator functions.
        const DISABLE_OP_FUNC = 1 << 5;
        /// Member access binds statically.
        const DISABLE_VIRTUAL_MEMBER = 1 << 6;
        /// Name binding is finished; the recognizer leaves the node alone.
        const RECOGNIZED = 1 << 7;
    }
}

/// What a node is.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A bound identifier.
    Id(IdentId),
    /// An operator applied to `children`.
    Op(Operator),
    /// A folded constant.
    Const(ConstValue),
    /// A name not resolved yet; the text is `code`.
    Str,
    /// A use of a linked subexpression.
    Linking(LinkId),
    /// A jump target.
    Label(u32),
    /// Address of an interned constant.
    DataPointer(ConstHandle),
    /// `name: value`; the value is the only child.
    NamedParameter(String),
    /// A parameterized macro not expanded yet.
    Macro(MacroId),
    /// Placeholder for a macro argument inside a macro body.
    MacroArg(usize),
    /// `{ a = 1, b = 2 }`; member names match the children.
    ObjectInit(Vec<String>),
    /// `{ 1, 2, 3 }`.
    ArrayInit,
}

/// A node of the expression tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprNode {
    pub kind: NodeKind,
    /// Resolved type, `None` until the type manager runs.
    pub ty: Option<TypeId>,
    pub code: CodeString,
    pub flags: ExpressionFlags,
    pub children: Vec<ExprNode>,
    /// Links owned by this node.
    pub links: Vec<LinkId>,
    /// Set while a stage has paused processing of this node.
    pub suspended: Option<Suspension>,
}

impl ExprNode {
    pub fn new(kind: NodeKind, code: CodeString) -> Self {
        Self {
            kind,
            ty: None,
            code,
            flags: ExpressionFlags::empty(),
            children: Vec::new(),
            links: Vec::new(),
            suspended: None,
        }
    }

    /// An unresolved name.
    #[inline]
    pub fn name(code: CodeString) -> Self {
        Self::new(NodeKind::Str, code)
    }

    #[inline]
    pub fn id(id: IdentId, code: CodeString) -> Self {
        Self::new(NodeKind::Id(id), code)
    }

    /// A constant of a known type.
    pub fn constant(value: ConstValue, ty: TypeId, code: CodeString) -> Self {
        Self::new(NodeKind::Const(value), code).with_type(ty)
    }

    /// A literal whose type is inferred from the value.
    #[inline]
    pub fn literal(value: ConstValue, code: CodeString) -> Self {
        Self::new(NodeKind::Const(value), code)
    }

    pub fn op(op: Operator, children: Vec<ExprNode>, code: CodeString) -> Self {
        Self::new(NodeKind::Op(op), code).with_children(children)
    }

    #[inline]
    pub fn linking(link: LinkId, code: CodeString) -> Self {
        Self::new(NodeKind::Linking(link), code)
    }

    pub fn named_parameter(name: impl Into<String>, value: ExprNode, code: CodeString) -> Self {
        Self::new(NodeKind::NamedParameter(name.into()), code).with_children(vec![value])
    }

    /// A cast of `value` to `ty`.
    pub fn cast(value: ExprNode, ty: TypeId) -> Self {
        let code = value.code.clone();
        Self::op(Operator::Cast, vec![value], code)
            .with_type(ty)
            .with_flags(ExpressionFlags::FIXED_TYPE)
    }

    pub fn with_type(mut self, ty: TypeId) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_flags(mut self, flags: ExpressionFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_children(mut self, children: Vec<ExprNode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_links(mut self, links: Vec<LinkId>) -> Self {
        self.links = links;
        self
    }

    /// Replace the node, keeping the links it owns.
    pub fn replace(&mut self, mut with: ExprNode) {
        with.links.append(&mut self.links);
        *self = with;
    }

    /// Replace the node with its child `index`, keeping owned links.
    pub fn unwrap_child(&mut self, index: usize) {
        let child = self.children.swap_remove(index);
        self.replace(child);
    }

    /// Move the node out, leaving a placeholder behind.
    pub fn take(&mut self) -> ExprNode {
        std::mem::replace(self, ExprNode::new(NodeKind::Str, CodeString::default()))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[inline]
    pub fn operator(&self) -> Option<Operator> {
        match self.kind {
            NodeKind::Op(op) => Some(op),
            _ => None,
        }
    }

    #[inline]
    pub fn is_op(&self, op: Operator) -> bool {
        self.operator() == Some(op)
    }

    #[inline]
    pub fn ident(&self) -> Option<IdentId> {
        match self.kind {
            NodeKind::Id(id) => Some(id),
            _ => None,
        }
    }

    #[inline]
    pub fn const_value(&self) -> Option<&ConstValue> {
        match &self.kind {
            NodeKind::Const(value) => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn is_const(&self) -> bool {
        matches!(self.kind, NodeKind::Const(_))
    }

    #[inline]
    pub fn is_str(&self) -> bool {
        matches!(self.kind, NodeKind::Str)
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.suspended.is_some()
    }

    /// The constant boolean value of a folded condition.
    pub fn condition_result(&self) -> Option<bool> {
        self.const_value().and_then(ConstValue::as_bool)
    }

    /// The identifier a node refers to directly, or through `Member`.
    pub fn referenced_ident(&self) -> Option<IdentId> {
        match &self.kind {
            NodeKind::Id(id) => Some(*id),
            NodeKind::Op(Operator::Member) => self.children.get(1).and_then(ExprNode::ident),
            _ => None,
        }
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Visit the node and its descendants, parents first. Linked nodes are
    /// not entered.
    pub fn for_each(&self, f: &mut impl FnMut(&ExprNode)) {
        f(self);
        for child in &self.children {
            child.for_each(f);
        }
    }

    /// Whether any node in the tree satisfies `predicate`.
    pub fn any(&self, predicate: &mut impl FnMut(&ExprNode) -> bool) -> bool {
        predicate(self) || self.children.iter().any(|c| c.any(predicate))
    }

    /// Number of nodes referring to identifier `id`.
    pub fn count_ident(&self, id: IdentId) -> usize {
        let mut count = 0;
        self.for_each(&mut |n| {
            if n.ident() == Some(id) {
                count += 1;
            }
        });
        count
    }

    /// Replace every `Id(from)` with `Id(to)`.
    pub fn rename_ident(&mut self, from: IdentId, to: IdentId) {
        if self.kind == NodeKind::Id(from) {
            self.kind = NodeKind::Id(to);
        }
        for child in &mut self.children {
            child.rename_ident(from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zinnia_core::Span;

    fn code(text: &str) -> CodeString {
        CodeString::new(text, Span::new(1, 1, text.len() as u32))
    }

    #[test]
    fn builders_set_fields() {
        let node = ExprNode::constant(ConstValue::integer(3), TypeId(9), code("3"))
            .with_flags(ExpressionFlags::AUTO_CONVERT);
        assert_eq!(node.ty, Some(TypeId(9)));
        assert!(node.is_const());
        assert!(node.flags.contains(ExpressionFlags::AUTO_CONVERT));
        assert!(!node.is_suspended());
    }

    #[test]
    fn cast_fixes_type() {
        let cast = ExprNode::cast(ExprNode::name(code("x")), TypeId(4));
        assert!(cast.is_op(Operator::Cast));
        assert!(cast.flags.contains(ExpressionFlags::FIXED_TYPE));
        assert_eq!(cast.children.len(), 1);
    }

    #[test]
    fn ident_counting_and_renaming() {
        let mut tree = ExprNode::op(
            Operator::Add,
            vec![ExprNode::id(IdentId(1), code("a")), ExprNode::id(IdentId(1), code("a"))],
            code("a + a"),
        );
        assert_eq!(tree.count_ident(IdentId(1)), 2);
        tree.rename_ident(IdentId(1), IdentId(2));
        assert_eq!(tree.count_ident(IdentId(1)), 0);
        assert_eq!(tree.count_ident(IdentId(2)), 2);
    }

    #[test]
    fn replace_keeps_owned_links() {
        let mut node = ExprNode::op(Operator::Cast, vec![ExprNode::name(code("x"))], code("(T)x"))
            .with_links(vec![LinkId(3)]);
        node.unwrap_child(0);
        assert!(node.is_str());
        assert_eq!(node.links, vec![LinkId(3)]);
    }

    #[test]
    fn referenced_ident_sees_through_member() {
        let member = ExprNode::op(
            Operator::Member,
            vec![ExprNode::id(IdentId(1), code("o")), ExprNode::id(IdentId(7), code("f"))],
            code("o.f"),
        );
        assert_eq!(member.referenced_ident(), Some(IdentId(7)));
        assert_eq!(ExprNode::literal(ConstValue::Boolean(true), code("true")).condition_result(), Some(true));
    }
}
