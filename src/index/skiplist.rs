//! Skiplist back-end for the entry index.
//!
//! A classic tower skiplist over arena-allocated nodes. Links are `u32`
//! node ids into a node pool rather than pointers, so cursors (node ids)
//! survive any number of later inserts and the whole structure is `Send`
//! without ceremony.
//!
//! Geometry: maximum height 12, branching factor 4, tower heights drawn
//! from a seeded [`SmallRng`] so a given insertion order always produces
//! the same shape. There are no back links; `prev` re-seeks for the last
//! node ordered before the current entry, the standard skiplist trade-off
//! that keeps inserts cheap.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{EntryId, EntryIndex, IndexCursor, IndexView, SeekTarget};

const MAX_HEIGHT: usize = 12;
const BRANCHING: u32 = 4;

/// Sentinel for "no node".
const NIL: u32 = u32::MAX;

/// Head node id; its entry slot is never read.
const HEAD: u32 = 0;

struct Node {
    entry: EntryId,
    next: [u32; MAX_HEIGHT],
}

/// Probabilistic ordered list of index entries.
pub struct SkipListIndex {
    nodes: Vec<Node>,
    max_height: usize,
    len: usize,
    rng: SmallRng,
}

impl SkipListIndex {
    /// Create an empty skiplist.
    pub fn new() -> Self {
        let head = Node {
            entry: 0,
            next: [NIL; MAX_HEIGHT],
        };
        Self {
            nodes: vec![head],
            max_height: 1,
            len: 0,
            // fixed seed: deterministic shape for a given insertion order
            rng: SmallRng::seed_from_u64(0x7AB0_1A5E_ED01),
        }
    }

    fn random_height(&mut self) -> usize {
        let mut height = 1;
        while height < MAX_HEIGHT && self.rng.gen_ratio(1, BRANCHING) {
            height += 1;
        }
        height
    }

    /// Walk down the towers, returning the first node for which
    /// `before(node)` is false; `prevs`, when given, receives the last
    /// node before the boundary at every level (the splice points).
    fn find_boundary(
        &self,
        mut before: impl FnMut(u32) -> bool,
        mut prevs: Option<&mut [u32; MAX_HEIGHT]>,
    ) -> u32 {
        let mut node = HEAD;
        let mut level = self.max_height - 1;
        loop {
            let next = self.nodes[node as usize].next[level];
            if next != NIL && before(next) {
                node = next;
            } else {
                if let Some(prevs) = prevs.as_deref_mut() {
                    prevs[level] = node;
                }
                if level == 0 {
                    return next;
                }
                level -= 1;
            }
        }
    }

    /// Last node strictly before the boundary, or `HEAD` when none is.
    fn find_last_before(&self, mut before: impl FnMut(u32) -> bool) -> u32 {
        let mut node = HEAD;
        let mut level = self.max_height - 1;
        loop {
            let next = self.nodes[node as usize].next[level];
            if next != NIL && before(next) {
                node = next;
            } else if level == 0 {
                return node;
            } else {
                level -= 1;
            }
        }
    }
}

impl Default for SkipListIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryIndex for SkipListIndex {
    fn insert(&mut self, id: EntryId, view: &IndexView<'_>) {
        let height = self.random_height();
        if height > self.max_height {
            self.max_height = height;
        }

        let mut prevs = [HEAD; MAX_HEIGHT];
        let nodes = &self.nodes;
        self.find_boundary(
            |n| view.compare_ids(nodes[n as usize].entry, id).is_lt(),
            Some(&mut prevs),
        );

        let new_id = self.nodes.len() as u32;
        let mut node = Node {
            entry: id,
            next: [NIL; MAX_HEIGHT],
        };
        for (level, &prev) in prevs.iter().enumerate().take(height) {
            node.next[level] = self.nodes[prev as usize].next[level];
        }
        self.nodes.push(node);
        for (level, &prev) in prevs.iter().enumerate().take(height) {
            self.nodes[prev as usize].next[level] = new_id;
        }
        self.len += 1;
    }

    fn len(&self) -> usize {
        self.len
    }

    fn first(&self) -> Option<IndexCursor> {
        match self.nodes[HEAD as usize].next[0] {
            NIL => None,
            node => Some(node),
        }
    }

    fn last(&self) -> Option<IndexCursor> {
        let node = self.find_last_before(|_| true);
        if node == HEAD {
            None
        } else {
            Some(node)
        }
    }

    fn lower_bound(&self, target: &SeekTarget<'_>, view: &IndexView<'_>) -> Option<IndexCursor> {
        let nodes = &self.nodes;
        let node = self.find_boundary(
            |n| {
                view.compare_id_to_target(nodes[n as usize].entry, target)
                    .is_lt()
            },
            None,
        );
        if node == NIL {
            None
        } else {
            Some(node)
        }
    }

    fn next(&self, cursor: IndexCursor, _view: &IndexView<'_>) -> Option<IndexCursor> {
        match self.nodes[cursor as usize].next[0] {
            NIL => None,
            node => Some(node),
        }
    }

    fn prev(&self, cursor: IndexCursor, view: &IndexView<'_>) -> Option<IndexCursor> {
        let target = self.nodes[cursor as usize].entry;
        let nodes = &self.nodes;
        let node = self.find_last_before(|n| view.compare_ids(nodes[n as usize].entry, target).is_lt());
        if node == HEAD {
            None
        } else {
            Some(node)
        }
    }

    fn entry_id(&self, cursor: IndexCursor) -> EntryId {
        self.nodes[cursor as usize].entry
    }
}
