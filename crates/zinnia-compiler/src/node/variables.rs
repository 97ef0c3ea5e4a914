//! Per-expression variable usage.
//!
//! [`NodeVariables`] records which locals an expression assigns on every
//! path, which it reads before assigning and which have their address
//! taken. The code checker combines these records statement by statement
//! instead of walking the expression trees again.

use rustc_hash::FxHashSet;
use zinnia_core::{IdentId, IdentifierTable, Operator, Span};

use super::{ExprNode, LinkArena, LinkedNodeFlags, NodeKind};

/// Variable usage of one finished expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeVariables {
    /// Locals holding a value on every path through the expression.
    pub assigned: Vec<IdentId>,
    /// Locals read anywhere in the expression.
    pub read: Vec<IdentId>,
    /// Reads of locals not yet assigned at that point of the expression.
    pub used_before_assign: Vec<(IdentId, Span)>,
    /// Locals whose address is taken.
    pub address_used: Vec<IdentId>,
}

impl NodeVariables {
    /// Walk `root` in evaluation order. Linked nodes are visited once, at
    /// their owner.
    pub fn collect(root: &ExprNode, links: &LinkArena, idents: &IdentifierTable) -> Self {
        let mut walker = Walker {
            links,
            idents,
            vars: NodeVariables::default(),
        };
        let mut assigned = FxHashSet::default();
        walker.visit(root, &mut assigned);

        let mut vars = walker.vars;
        vars.assigned = assigned.into_iter().collect();
        vars.assigned.sort();
        vars.read.sort();
        vars.read.dedup();
        vars.address_used.sort();
        vars.address_used.dedup();
        vars
    }

    #[inline]
    pub fn is_assigned(&self, id: IdentId) -> bool {
        self.assigned.contains(&id)
    }

    /// Whether `id` is read anywhere before the expression assigns it.
    pub fn is_used_before_assign(&self, id: IdentId) -> bool {
        self.used_before_assign.iter().any(|(used, _)| *used == id)
    }

    #[inline]
    pub fn is_read(&self, id: IdentId) -> bool {
        self.read.contains(&id)
    }

    #[inline]
    pub fn is_address_used(&self, id: IdentId) -> bool {
        self.address_used.contains(&id)
    }
}

struct Walker<'a> {
    links: &'a LinkArena,
    idents: &'a IdentifierTable,
    vars: NodeVariables,
}

impl Walker<'_> {
    fn local(&self, node: &ExprNode) -> Option<IdentId> {
        node.ident().filter(|&id| self.idents.get(id).is_local())
    }

    fn visit(&mut self, node: &ExprNode, assigned: &mut FxHashSet<IdentId>) {
        self.visit_links(node, assigned, false);

        match node.kind {
            NodeKind::Id(id) if self.idents.get(id).is_local() => {
                self.vars.read.push(id);
                if !assigned.contains(&id) {
                    self.vars.used_before_assign.push((id, node.code.span()));
                }
            }
            NodeKind::Op(op) => self.visit_op(op, node, assigned),
            _ => {
                for child in &node.children {
                    self.visit(child, assigned);
                }
            }
        }

        self.visit_links(node, assigned, true);
    }

    fn visit_links(&mut self, node: &ExprNode, assigned: &mut FxHashSet<IdentId>, post: bool) {
        for &link in &node.links {
            let linked = self.links.get(link);
            if linked.flags.contains(LinkedNodeFlags::POST_COMPUTATION) == post {
                self.visit(&linked.node, assigned);
            }
        }
    }

    fn visit_op(&mut self, op: Operator, node: &ExprNode, assigned: &mut FxHashSet<IdentId>) {
        let children = &node.children;
        match op {
            Operator::Assignment => {
                self.visit_target(&children[0], assigned);
                self.visit(&children[1], assigned);
                self.assign_target(&children[0], assigned);
            }
            Operator::RefIdGetsAssigned => match self.local(&children[0]) {
                Some(id) => {
                    self.vars.address_used.push(id);
                    assigned.insert(id);
                }
                None => self.visit_target(&children[0], assigned),
            },
            Operator::Address | Operator::RefUnsafe => match self.local(&children[0]) {
                Some(id) => self.vars.address_used.push(id),
                None => self.visit(&children[0], assigned),
            },
            Operator::RefIdMustBeAssigned => {
                self.visit(&children[0], assigned);
                if let Some(id) = self.local(&children[0]) {
                    self.vars.address_used.push(id);
                }
            }
            Operator::Condition => {
                self.visit(&children[0], assigned);
                let mut then_branch = assigned.clone();
                self.visit(&children[1], &mut then_branch);
                let mut else_branch = assigned.clone();
                self.visit(&children[2], &mut else_branch);
                *assigned = then_branch.intersection(&else_branch).copied().collect();
            }
            Operator::And | Operator::Or => {
                self.visit(&children[0], assigned);
                // The right operand may not run.
                let mut right = assigned.clone();
                self.visit(&children[1], &mut right);
            }
            _ => {
                for child in children {
                    self.visit(child, assigned);
                }
            }
        }
    }

    /// Operands of an assignment target that are evaluated, not written.
    fn visit_target(&mut self, target: &ExprNode, assigned: &mut FxHashSet<IdentId>) {
        match target.kind {
            NodeKind::Id(_) => {}
            NodeKind::Op(Operator::Tuple) => {
                for member in &target.children {
                    self.visit_target(member, assigned);
                }
            }
            _ => {
                self.visit_links(target, assigned, false);
                for child in &target.children {
                    self.visit(child, assigned);
                }
                self.visit_links(target, assigned, true);
            }
        }
    }

    fn assign_target(&self, target: &ExprNode, assigned: &mut FxHashSet<IdentId>) {
        if let Some(id) = self.local(target) {
            assigned.insert(id);
        } else if target.is_op(Operator::Tuple) {
            for member in &target.children {
                self.assign_target(member, assigned);
            }
        }
    }
}
