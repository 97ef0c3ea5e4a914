//! Linked nodes: subexpressions evaluated once and used several times.
//!
//! The arena is owned by the pipeline for the duration of one expression
//! and handed out with the finished tree. How many [`NodeKind::Linking`]
//! handles point at a link is counted from the tree when needed rather than
//! kept in the link.

use bitflags::bitflags;

use super::{ExprNode, NodeKind};

/// Handle of a linked node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct LinkId(pub u32);

impl LinkId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LinkedNodeFlags: u8 {
        /// Computed after the owner's operands rather than before.
        const POST_COMPUTATION = 1 << 0;
        /// Kept even when no handle refers to it.
        const NOT_REMOVABLE = 1 << 1;
    }
}

/// A shared subexpression.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedNode {
    pub node: ExprNode,
    pub flags: LinkedNodeFlags,
}

/// Storage of the linked nodes of one expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkArena {
    slots: Vec<Option<LinkedNode>>,
}

impl LinkArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: ExprNode, flags: LinkedNodeFlags) -> LinkId {
        let id = LinkId(self.slots.len() as u32);
        self.slots.push(Some(LinkedNode { node, flags }));
        id
    }

    /// # Panics
    ///
    /// Panics on a handle that was removed or never allocated.
    pub fn get(&self, id: LinkId) -> &LinkedNode {
        match self.slots.get(id.index()) {
            Some(Some(link)) => link,
            _ => panic!("dangling link handle {id:?}"),
        }
    }

    pub fn get_mut(&mut self, id: LinkId) -> &mut LinkedNode {
        match self.slots.get_mut(id.index()) {
            Some(Some(link)) => link,
            _ => panic!("dangling link handle {id:?}"),
        }
    }

    pub fn contains(&self, id: LinkId) -> bool {
        matches!(self.slots.get(id.index()), Some(Some(_)))
    }

    pub fn remove(&mut self, id: LinkId) -> Option<LinkedNode> {
        self.slots.get_mut(id.index()).and_then(Option::take)
    }

    /// Live links.
    pub fn iter(&self) -> impl Iterator<Item = (LinkId, &LinkedNode)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|link| (LinkId(i as u32), link)))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Number of `Linking` handles to `id` in `tree` and in the other live
    /// links.
    pub fn linking_count(&self, tree: &ExprNode, id: LinkId) -> usize {
        let count_in = |node: &ExprNode| {
            let mut count = 0;
            node.for_each(&mut |n| {
                if n.kind == NodeKind::Linking(id) {
                    count += 1;
                }
            });
            count
        };

        let in_links: usize = self
            .iter()
            .filter(|(other, _)| *other != id)
            .map(|(_, link)| count_in(&link.node))
            .sum();
        count_in(tree) + in_links
    }

    /// Drop links no handle refers to, unless marked `NOT_REMOVABLE`.
    /// Repeats until stable since removing a link can orphan the links its
    /// node referred to.
    pub fn prune(&mut self, tree: &mut ExprNode) {
        loop {
            let unused: Vec<LinkId> = self
                .iter()
                .filter(|(id, link)| {
                    !link.flags.contains(LinkedNodeFlags::NOT_REMOVABLE)
                        && self.linking_count(tree, *id) == 0
                })
                .map(|(id, _)| id)
                .collect();
            if unused.is_empty() {
                return;
            }
            for id in &unused {
                self.remove(*id);
            }
            detach(tree, &unused);
        }
    }

    /// Check that every `Linking` handle refers to a live link owned by one
    /// of its ancestors and that every link has exactly one owner.
    ///
    /// # Panics
    ///
    /// Panics when the invariant does not hold.
    pub fn verify(&self, tree: &ExprNode) {
        let mut owners = vec![0usize; self.slots.len()];
        let mut visible = Vec::new();
        self.verify_node(tree, &mut visible, &mut owners);

        for (id, _) in self.iter() {
            let count = owners[id.index()];
            assert!(count == 1, "link {id:?} has {count} owners");
        }
    }

    fn verify_node(&self, node: &ExprNode, visible: &mut Vec<LinkId>, owners: &mut [usize]) {
        let depth = visible.len();
        for &id in &node.links {
            assert!(self.contains(id), "node owns dangling link {id:?}");
            owners[id.index()] += 1;
            visible.push(id);
            let linked = &self.get(id).node;
            self.verify_node(linked, visible, owners);
        }

        if let NodeKind::Linking(id) = node.kind {
            assert!(self.contains(id), "dangling link handle {id:?}");
            assert!(visible.contains(&id), "link {id:?} is used outside its owner");
        }
        for child in &node.children {
            self.verify_node(child, visible, owners);
        }
        visible.truncate(depth);
    }
}

fn detach(node: &mut ExprNode, removed: &[LinkId]) {
    node.links.retain(|id| !removed.contains(id));
    for child in &mut node.children {
        detach(child, removed);
    }
}
