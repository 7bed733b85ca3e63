//! Red-black tree back-end for the entry index.
//!
//! A deterministic balanced search tree over arena-allocated nodes with
//! parent links. Nodes live in a pool addressed by `u32` ids, so cursors
//! are stable across inserts and `next`/`prev` walk child and parent links
//! directly from a node handle — no per-iterator stack.
//!
//! The index never removes nodes (overwrite mode redirects entries in
//! place), so only the insert rebalance exists; there is no delete fixup
//! to get wrong.

use super::{EntryId, EntryIndex, IndexCursor, IndexView, SeekTarget};

/// Sentinel for "no node".
const NIL: u32 = u32::MAX;

struct Node {
    entry: EntryId,
    left: u32,
    right: u32,
    parent: u32,
    red: bool,
}

/// Deterministic ordered container of index entries.
pub struct RbTreeIndex {
    nodes: Vec<Node>,
    root: u32,
}

impl RbTreeIndex {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: NIL,
        }
    }

    fn is_red(&self, node: u32) -> bool {
        node != NIL && self.nodes[node as usize].red
    }

    fn min_from(&self, mut node: u32) -> u32 {
        while self.nodes[node as usize].left != NIL {
            node = self.nodes[node as usize].left;
        }
        node
    }

    fn max_from(&self, mut node: u32) -> u32 {
        while self.nodes[node as usize].right != NIL {
            node = self.nodes[node as usize].right;
        }
        node
    }

    fn rotate_left(&mut self, x: u32) {
        let y = self.nodes[x as usize].right;
        let y_left = self.nodes[y as usize].left;

        self.nodes[x as usize].right = y_left;
        if y_left != NIL {
            self.nodes[y_left as usize].parent = x;
        }

        let x_parent = self.nodes[x as usize].parent;
        self.nodes[y as usize].parent = x_parent;
        if x_parent == NIL {
            self.root = y;
        } else if self.nodes[x_parent as usize].left == x {
            self.nodes[x_parent as usize].left = y;
        } else {
            self.nodes[x_parent as usize].right = y;
        }

        self.nodes[y as usize].left = x;
        self.nodes[x as usize].parent = y;
    }

    fn rotate_right(&mut self, x: u32) {
        let y = self.nodes[x as usize].left;
        let y_right = self.nodes[y as usize].right;

        self.nodes[x as usize].left = y_right;
        if y_right != NIL {
            self.nodes[y_right as usize].parent = x;
        }

        let x_parent = self.nodes[x as usize].parent;
        self.nodes[y as usize].parent = x_parent;
        if x_parent == NIL {
            self.root = y;
        } else if self.nodes[x_parent as usize].right == x {
            self.nodes[x_parent as usize].right = y;
        } else {
            self.nodes[x_parent as usize].left = y;
        }

        self.nodes[y as usize].right = x;
        self.nodes[x as usize].parent = y;
    }

    fn insert_fixup(&mut self, mut z: u32) {
        while self.is_red(self.nodes[z as usize].parent) {
            let parent = self.nodes[z as usize].parent;
            // a red parent is never the root, so the grandparent exists
            let grand = self.nodes[parent as usize].parent;

            if parent == self.nodes[grand as usize].left {
                let uncle = self.nodes[grand as usize].right;
                if self.is_red(uncle) {
                    self.nodes[parent as usize].red = false;
                    self.nodes[uncle as usize].red = false;
                    self.nodes[grand as usize].red = true;
                    z = grand;
                } else {
                    if z == self.nodes[parent as usize].right {
                        z = parent;
                        self.rotate_left(z);
                    }
                    let parent = self.nodes[z as usize].parent;
                    let grand = self.nodes[parent as usize].parent;
                    self.nodes[parent as usize].red = false;
                    self.nodes[grand as usize].red = true;
                    self.rotate_right(grand);
                }
            } else {
                let uncle = self.nodes[grand as usize].left;
                if self.is_red(uncle) {
                    self.nodes[parent as usize].red = false;
                    self.nodes[uncle as usize].red = false;
                    self.nodes[grand as usize].red = true;
                    z = grand;
                } else {
                    if z == self.nodes[parent as usize].left {
                        z = parent;
                        self.rotate_right(z);
                    }
                    let parent = self.nodes[z as usize].parent;
                    let grand = self.nodes[parent as usize].parent;
                    self.nodes[parent as usize].red = false;
                    self.nodes[grand as usize].red = true;
                    self.rotate_left(grand);
                }
            }
        }
        let root = self.root;
        self.nodes[root as usize].red = false;
    }
}

impl Default for RbTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryIndex for RbTreeIndex {
    fn insert(&mut self, id: EntryId, view: &IndexView<'_>) {
        let new_id = self.nodes.len() as u32;

        let mut parent = NIL;
        let mut link_left = false;
        let mut cursor = self.root;
        while cursor != NIL {
            parent = cursor;
            let node = &self.nodes[cursor as usize];
            if view.compare_ids(id, node.entry).is_lt() {
                link_left = true;
                cursor = node.left;
            } else {
                link_left = false;
                cursor = node.right;
            }
        }

        self.nodes.push(Node {
            entry: id,
            left: NIL,
            right: NIL,
            parent,
            red: true,
        });

        if parent == NIL {
            self.root = new_id;
        } else if link_left {
            self.nodes[parent as usize].left = new_id;
        } else {
            self.nodes[parent as usize].right = new_id;
        }

        self.insert_fixup(new_id);
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn first(&self) -> Option<IndexCursor> {
        if self.root == NIL {
            None
        } else {
            Some(self.min_from(self.root))
        }
    }

    fn last(&self) -> Option<IndexCursor> {
        if self.root == NIL {
            None
        } else {
            Some(self.max_from(self.root))
        }
    }

    fn lower_bound(&self, target: &SeekTarget<'_>, view: &IndexView<'_>) -> Option<IndexCursor> {
        let mut best = NIL;
        let mut cursor = self.root;
        while cursor != NIL {
            let node = &self.nodes[cursor as usize];
            if view.compare_id_to_target(node.entry, target).is_gt() {
                best = cursor;
                cursor = node.left;
            } else {
                cursor = node.right;
            }
        }
        if best == NIL {
            None
        } else {
            Some(best)
        }
    }

    fn next(&self, cursor: IndexCursor, _view: &IndexView<'_>) -> Option<IndexCursor> {
        let right = self.nodes[cursor as usize].right;
        if right != NIL {
            return Some(self.min_from(right));
        }
        let mut child = cursor;
        let mut parent = self.nodes[cursor as usize].parent;
        while parent != NIL && self.nodes[parent as usize].right == child {
            child = parent;
            parent = self.nodes[parent as usize].parent;
        }
        if parent == NIL {
            None
        } else {
            Some(parent)
        }
    }

    fn prev(&self, cursor: IndexCursor, _view: &IndexView<'_>) -> Option<IndexCursor> {
        let left = self.nodes[cursor as usize].left;
        if left != NIL {
            return Some(self.max_from(left));
        }
        let mut child = cursor;
        let mut parent = self.nodes[cursor as usize].parent;
        while parent != NIL && self.nodes[parent as usize].left == child {
            child = parent;
            parent = self.nodes[parent as usize].parent;
        }
        if parent == NIL {
            None
        } else {
            Some(parent)
        }
    }

    fn entry_id(&self, cursor: IndexCursor) -> EntryId {
        self.nodes[cursor as usize].entry
    }
}
