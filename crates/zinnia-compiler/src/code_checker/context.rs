//! State carried along one control-flow path.

use bitflags::bitflags;

use super::command::StmtId;

/// Fixed-size set of local indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LocalSet {
    words: Vec<u64>,
}

impl LocalSet {
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
        }
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.words
            .get(index / 64)
            .is_some_and(|word| word & (1u64 << (index % 64)) != 0)
    }

    pub fn insert(&mut self, index: usize) {
        let word = index / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (index % 64);
    }

    pub fn remove(&mut self, index: usize) {
        if let Some(word) = self.words.get_mut(index / 64) {
            *word &= !(1u64 << (index % 64));
        }
    }

    pub fn is_subset(&self, other: &LocalSet) -> bool {
        self.words.iter().enumerate().all(|(i, word)| {
            let theirs = other.words.get(i).copied().unwrap_or(0);
            word & !theirs == 0
        })
    }

    pub fn intersect_with(&mut self, other: &LocalSet) {
        for (i, word) in self.words.iter_mut().enumerate() {
            *word &= other.words.get(i).copied().unwrap_or(0);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..64).filter(move |bit| word & (1u64 << bit) != 0).map(move |bit| i * 64 + bit)
        })
    }
}

bitflags! {
    /// How the body uses a local, gathered over every path.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LocalUsage: u8 {
        const READ = 1 << 0;
        const USED = 1 << 1;
        const ADDRESS_USED = 1 << 2;
    }
}

/// Where a jump transfers control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Run the statement (goto).
    Enter(StmtId),
    /// Finish the statement normally (break leaves the loop, continue
    /// leaves its body).
    Leave(StmtId),
    /// Leave the function.
    Return,
    /// Unwind to the closest handler.
    Raise,
}

/// One path through the body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlowState {
    /// Locals holding a value, by local index.
    pub assigned: LocalSet,
    /// Jumps waiting for a `finally` block to finish, innermost last. Each
    /// entry names the `Try` command whose `finally` runs.
    pub pending: Vec<(StmtId, Destination)>,
}

impl FlowState {
    pub fn new(locals: usize) -> Self {
        Self {
            assigned: LocalSet::new(locals),
            pending: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_keeps_common_locals() {
        let mut a = LocalSet::new(70);
        a.insert(1);
        a.insert(65);
        let mut b = LocalSet::new(70);
        b.insert(65);

        assert!(b.is_subset(&a));
        assert!(!a.is_subset(&b));
        a.intersect_with(&b);
        assert_eq!(a, b);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![65]);
    }

    #[test]
    fn sets_grow_on_demand() {
        let mut set = LocalSet::new(0);
        assert!(!set.contains(130));
        set.insert(130);
        assert!(set.contains(130));
        set.remove(130);
        assert!(!set.contains(130));
        assert!(set.is_subset(&LocalSet::new(0)));
    }
}
