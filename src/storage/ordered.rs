//! Ordered Engine: an Arena Red-Black Tree
//!
//! Entries are kept sorted by key in a red-black tree whose nodes live in a
//! single `Vec`. Links between nodes are indices into that vector, and the
//! shared sentinel that stands in for every missing child is the [`NIL`]
//! index, so rotations and deletions can never leave a dangling reference.
//!
//! ## Invariants
//!
//! 1. The root is Black.
//! 2. No Red node has a Red child.
//! 3. Every path from a node down to the sentinel crosses the same number of
//!    Black nodes (the black-height).
//! 4. Keys in a left subtree are smaller than the node key, keys in a right
//!    subtree are larger.
//!
//! ```text
//!                 ┌──────────┐
//!                 │ 40 Black │            nodes: Vec<Node>
//!                 └────┬─────┘            root:  index of 40
//!           ┌──────────┴──────────┐       NIL:   usize::MAX (always Black)
//!      ┌────┴────┐           ┌────┴────┐
//!      │ 20 Red  │           │ 60 Red  │
//!      └────┬────┘           └────┬────┘
//!        ┌──┴──┐               ┌──┴──┐
//!       NIL   NIL             NIL   NIL
//! ```
//!
//! Removing a node frees its arena slot by moving the last node of the vector
//! into it and relinking that node's parent and children.

use super::entry::{Entry, ExactMatch, ValueEquality};
use super::Engine;
use std::cmp::Ordering;
use std::fmt;

type NodeId = usize;

/// The sentinel. Never a valid index into the arena.
const NIL: NodeId = usize::MAX;

/// Node color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Black,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left = 0,
    Right = 1,
}

impl Side {
    #[inline]
    fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

struct Node<K, V> {
    entry: Entry<K, V>,
    color: Color,
    parent: NodeId,
    children: [NodeId; 2],
}

/// A red-black tree keyed store.
///
/// Lookups, insertions and removals are O(log n); iteration yields entries in
/// ascending key order by stepping through parent links.
pub struct OrderedEngine<K, V, Q = ExactMatch> {
    nodes: Vec<Node<K, V>>,
    root: NodeId,
    /// Parent link of the sentinel. Only meaningful during deletion fixup.
    nil_parent: NodeId,
    equality: Q,
}

impl<K, V, Q> fmt::Debug for OrderedEngine<K, V, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedEngine")
            .field("len", &self.nodes.len())
            .finish()
    }
}

impl<K: Ord, V> Default for OrderedEngine<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> OrderedEngine<K, V> {
    /// Creates an empty tree comparing values with `PartialEq`.
    pub fn new() -> Self {
        Self::with_equality(ExactMatch)
    }
}

impl<K: Ord, V, Q> OrderedEngine<K, V, Q> {
    /// Creates an empty tree using `equality` for FIND.
    pub fn with_equality(equality: Q) -> Self {
        Self {
            nodes: Vec::new(),
            root: NIL,
            nil_parent: NIL,
            equality,
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over entries in ascending key order.
    pub fn iter(&self) -> Iter<'_, K, V, Q> {
        let next = if self.root == NIL {
            NIL
        } else {
            self.minimum(self.root)
        };
        Iter { tree: self, next }
    }

    /// Inserts `entry` unless its key is already present.
    ///
    /// Returns `false` (dropping `entry`) for a duplicate key.
    pub fn insert(&mut self, entry: Entry<K, V>) -> bool {
        let mut parent = NIL;
        let mut side = Side::Left;
        let mut current = self.root;

        while current != NIL {
            parent = current;
            side = match entry.key.cmp(self.key(current)) {
                Ordering::Less => Side::Left,
                Ordering::Greater => Side::Right,
                Ordering::Equal => return false,
            };
            current = self.child(current, side);
        }

        let id = self.nodes.len();
        self.nodes.push(Node {
            entry,
            color: Color::Red,
            parent,
            children: [NIL, NIL],
        });

        if parent == NIL {
            self.root = id;
        } else {
            self.set_child(parent, side, id);
        }

        self.insert_fixup(id);
        true
    }

    pub fn get(&self, key: &K) -> Option<&Entry<K, V>> {
        match self.search(key) {
            NIL => None,
            id => Some(&self.nodes[id].entry),
        }
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut Entry<K, V>> {
        match self.search(key) {
            NIL => None,
            id => Some(&mut self.nodes[id].entry),
        }
    }

    /// Removes and returns the entry stored under `key`.
    pub fn remove(&mut self, key: &K) -> Option<Entry<K, V>> {
        match self.search(key) {
            NIL => None,
            id => Some(self.delete(id)),
        }
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = NIL;
        self.nil_parent = NIL;
    }

    // ========================================================================
    // Link helpers (the sentinel reads as a Black leaf)
    // ========================================================================

    #[inline]
    fn key(&self, id: NodeId) -> &K {
        &self.nodes[id].entry.key
    }

    #[inline]
    fn color(&self, id: NodeId) -> Color {
        if id == NIL {
            Color::Black
        } else {
            self.nodes[id].color
        }
    }

    #[inline]
    fn set_color(&mut self, id: NodeId, color: Color) {
        if id != NIL {
            self.nodes[id].color = color;
        }
    }

    #[inline]
    fn parent(&self, id: NodeId) -> NodeId {
        if id == NIL {
            self.nil_parent
        } else {
            self.nodes[id].parent
        }
    }

    #[inline]
    fn set_parent(&mut self, id: NodeId, parent: NodeId) {
        if id == NIL {
            self.nil_parent = parent;
        } else {
            self.nodes[id].parent = parent;
        }
    }

    #[inline]
    fn child(&self, id: NodeId, side: Side) -> NodeId {
        self.nodes[id].children[side as usize]
    }

    #[inline]
    fn set_child(&mut self, id: NodeId, side: Side, child: NodeId) {
        self.nodes[id].children[side as usize] = child;
    }

    /// Which child of its parent `id` is. The parent must not be the sentinel.
    #[inline]
    fn side_of(&self, id: NodeId) -> Side {
        if self.child(self.parent(id), Side::Left) == id {
            Side::Left
        } else {
            Side::Right
        }
    }

    fn search(&self, key: &K) -> NodeId {
        let mut current = self.root;
        while current != NIL {
            current = match key.cmp(self.key(current)) {
                Ordering::Less => self.child(current, Side::Left),
                Ordering::Greater => self.child(current, Side::Right),
                Ordering::Equal => return current,
            };
        }
        NIL
    }

    fn minimum(&self, mut id: NodeId) -> NodeId {
        while self.child(id, Side::Left) != NIL {
            id = self.child(id, Side::Left);
        }
        id
    }

    /// In-order successor, or `NIL` after the largest key.
    fn successor(&self, id: NodeId) -> NodeId {
        let right = self.child(id, Side::Right);
        if right != NIL {
            return self.minimum(right);
        }

        let mut current = id;
        let mut parent = self.parent(current);
        while parent != NIL && current == self.child(parent, Side::Right) {
            current = parent;
            parent = self.parent(parent);
        }
        parent
    }

    // ========================================================================
    // Rebalancing
    // ========================================================================

    /// Rotates `x` down towards `side`; its child on the opposite side takes
    /// its place. `rotate(x, Side::Left)` is the classic left rotation.
    fn rotate(&mut self, x: NodeId, side: Side) {
        let y = self.child(x, side.opposite());
        let inner = self.child(y, side);

        self.set_child(x, side.opposite(), inner);
        if inner != NIL {
            self.nodes[inner].parent = x;
        }

        let parent = self.nodes[x].parent;
        self.nodes[y].parent = parent;
        if parent == NIL {
            self.root = y;
        } else {
            let x_side = self.side_of(x);
            self.set_child(parent, x_side, y);
        }

        self.set_child(y, side, x);
        self.nodes[x].parent = y;
    }

    fn insert_fixup(&mut self, mut z: NodeId) {
        while self.color(self.parent(z)) == Color::Red {
            // A Red parent is never the root, so the grandparent exists.
            let parent = self.parent(z);
            let grandparent = self.parent(parent);
            let side = self.side_of(parent);
            let uncle = self.child(grandparent, side.opposite());

            if self.color(uncle) == Color::Red {
                self.set_color(parent, Color::Black);
                self.set_color(uncle, Color::Black);
                self.set_color(grandparent, Color::Red);
                z = grandparent;
                continue;
            }

            if z == self.child(parent, side.opposite()) {
                // Inner grandchild: straighten into the outer case first.
                z = parent;
                self.rotate(z, side);
            }

            let parent = self.parent(z);
            let grandparent = self.parent(parent);
            self.set_color(parent, Color::Black);
            self.set_color(grandparent, Color::Red);
            self.rotate(grandparent, side.opposite());
        }

        let root = self.root;
        self.set_color(root, Color::Black);
    }

    /// Replaces the subtree rooted at `u` with the one rooted at `v`.
    fn transplant(&mut self, u: NodeId, v: NodeId) {
        let parent = self.parent(u);
        if parent == NIL {
            self.root = v;
        } else {
            let side = self.side_of(u);
            self.set_child(parent, side, v);
        }
        self.set_parent(v, parent);
    }

    /// Unlinks node `z`, rebalances, and releases its arena slot.
    fn delete(&mut self, z: NodeId) -> Entry<K, V> {
        let left = self.child(z, Side::Left);
        let right = self.child(z, Side::Right);

        let (x, removed_color) = match (left != NIL, right != NIL) {
            (false, false) => {
                self.transplant(z, NIL);
                (NIL, self.color(z))
            }
            (true, false) | (false, true) => {
                let child = if left != NIL { left } else { right };
                self.transplant(z, child);
                (child, self.color(z))
            }
            (true, true) => {
                let successor = self.minimum(right);
                let successor_color = self.color(successor);
                let x = self.child(successor, Side::Right);

                if self.parent(successor) == z {
                    self.set_parent(x, successor);
                } else {
                    self.transplant(successor, x);
                    self.set_child(successor, Side::Right, right);
                    self.nodes[right].parent = successor;
                }

                self.transplant(z, successor);
                self.set_child(successor, Side::Left, left);
                self.nodes[left].parent = successor;
                let z_color = self.color(z);
                self.set_color(successor, z_color);

                (x, successor_color)
            }
        };

        if removed_color == Color::Black {
            self.delete_fixup(x);
        }
        self.nil_parent = NIL;

        self.release(z)
    }

    /// Restores the black-height after a Black node was spliced out above `x`.
    fn delete_fixup(&mut self, mut x: NodeId) {
        while x != self.root && self.color(x) == Color::Black {
            let parent = self.parent(x);
            let side = if self.child(parent, Side::Left) == x {
                Side::Left
            } else {
                Side::Right
            };
            let mut sibling = self.child(parent, side.opposite());

            if self.color(sibling) == Color::Red {
                self.set_color(sibling, Color::Black);
                self.set_color(parent, Color::Red);
                self.rotate(parent, side);
                sibling = self.child(parent, side.opposite());
            }

            let near = self.child(sibling, side);
            let far = self.child(sibling, side.opposite());
            if self.color(near) == Color::Black && self.color(far) == Color::Black {
                self.set_color(sibling, Color::Red);
                x = parent;
                continue;
            }

            if self.color(far) == Color::Black {
                self.set_color(near, Color::Black);
                self.set_color(sibling, Color::Red);
                self.rotate(sibling, side.opposite());
                sibling = self.child(parent, side.opposite());
            }

            let parent_color = self.color(parent);
            self.set_color(sibling, parent_color);
            self.set_color(parent, Color::Black);
            let far = self.child(sibling, side.opposite());
            self.set_color(far, Color::Black);
            self.rotate(parent, side);
            x = self.root;
        }

        self.set_color(x, Color::Black);
    }

    /// Frees the slot of an already unlinked node by moving the last node of
    /// the arena into it.
    fn release(&mut self, z: NodeId) -> Entry<K, V> {
        let last = self.nodes.len() - 1;

        if z != last {
            let parent = self.nodes[last].parent;
            if parent == NIL {
                self.root = z;
            } else if self.child(parent, Side::Left) == last {
                self.set_child(parent, Side::Left, z);
            } else {
                self.set_child(parent, Side::Right, z);
            }

            for child in self.nodes[last].children {
                if child != NIL {
                    self.nodes[child].parent = z;
                }
            }
        }

        self.nodes.swap_remove(z).entry
    }
}

impl<K, V, Q> Engine for OrderedEngine<K, V, Q>
where
    K: Ord + Clone + Send,
    V: Send,
    Q: ValueEquality<V>,
{
    type Key = K;
    type Value = V;

    fn insert(&mut self, entry: Entry<K, V>) -> bool {
        OrderedEngine::insert(self, entry)
    }

    fn get(&self, key: &K) -> Option<&Entry<K, V>> {
        OrderedEngine::get(self, key)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut Entry<K, V>> {
        OrderedEngine::get_mut(self, key)
    }

    fn remove(&mut self, key: &K) -> Option<Entry<K, V>> {
        OrderedEngine::remove(self, key)
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn clear(&mut self) {
        OrderedEngine::clear(self)
    }

    fn entries(&self) -> Box<dyn Iterator<Item = &Entry<K, V>> + '_> {
        Box::new(self.iter())
    }

    fn find(&self, probe: &V) -> Vec<K> {
        self.iter()
            .filter(|entry| self.equality.matches(&entry.value, probe))
            .map(|entry| entry.key.clone())
            .collect()
    }
}

/// In-order iterator over an [`OrderedEngine`].
pub struct Iter<'a, K, V, Q> {
    tree: &'a OrderedEngine<K, V, Q>,
    next: NodeId,
}

impl<'a, K: Ord, V, Q> Iterator for Iter<'a, K, V, Q> {
    type Item = &'a Entry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NIL {
            return None;
        }
        let current = self.next;
        self.next = self.tree.successor(current);
        Some(&self.tree.nodes[current].entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with(keys: impl IntoIterator<Item = u32>) -> OrderedEngine<u32, String> {
        let mut tree = OrderedEngine::new();
        for key in keys {
            assert!(tree.insert(Entry::new(key as u64, key, format!("v{}", key))));
        }
        tree
    }

    /// Checks all red-black and BST invariants, returning the black-height.
    fn check_invariants<K: Ord, V, Q>(tree: &OrderedEngine<K, V, Q>) -> usize {
        assert_eq!(tree.color(tree.root), Color::Black, "root must be Black");
        if tree.root != NIL {
            assert_eq!(tree.nodes[tree.root].parent, NIL);
        }
        let (height, count) = check_subtree(tree, tree.root, None, None);
        assert_eq!(count, tree.len(), "every arena node must be reachable");
        height
    }

    fn check_subtree<K: Ord, V, Q>(
        tree: &OrderedEngine<K, V, Q>,
        id: NodeId,
        lower: Option<&K>,
        upper: Option<&K>,
    ) -> (usize, usize) {
        if id == NIL {
            return (1, 0);
        }
        let key = tree.key(id);
        if let Some(lower) = lower {
            assert!(key > lower, "left subtree key out of order");
        }
        if let Some(upper) = upper {
            assert!(key < upper, "right subtree key out of order");
        }

        let left = tree.child(id, Side::Left);
        let right = tree.child(id, Side::Right);
        for child in [left, right] {
            if child != NIL {
                assert_eq!(tree.nodes[child].parent, id, "broken parent link");
            }
            if tree.color(id) == Color::Red {
                assert_eq!(tree.color(child), Color::Black, "Red node with Red child");
            }
        }

        let (left_height, left_count) = check_subtree(tree, left, lower, Some(key));
        let (right_height, right_count) = check_subtree(tree, right, Some(key), upper);
        assert_eq!(left_height, right_height, "black-height mismatch");

        let own = usize::from(tree.color(id) == Color::Black);
        (left_height + own, left_count + right_count + 1)
    }

    fn keys(tree: &OrderedEngine<u32, String>) -> Vec<u32> {
        tree.iter().map(|entry| entry.key).collect()
    }

    /// Small deterministic generator so the shuffled tests are reproducible.
    fn shuffled(n: u32, mut seed: u64) -> Vec<u32> {
        let mut keys: Vec<u32> = (0..n).collect();
        for i in (1..keys.len()).rev() {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            keys.swap(i, (seed % (i as u64 + 1)) as usize);
        }
        keys
    }

    #[test]
    fn test_empty_tree() {
        let mut tree: OrderedEngine<u32, String> = OrderedEngine::new();
        assert!(tree.is_empty());
        assert!(tree.get(&1).is_none());
        assert!(tree.remove(&1).is_none());
        assert_eq!(tree.iter().count(), 0);
        check_invariants(&tree);
    }

    #[test]
    fn test_insert_and_get() {
        let mut tree = tree_with([5, 3, 8]);
        assert_eq!(tree.get(&3).unwrap().value, "v3");
        assert!(tree.get(&4).is_none());

        tree.get_mut(&8).unwrap().value = "eight".to_string();
        assert_eq!(tree.get(&8).unwrap().value, "eight");
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut tree = tree_with([1]);
        assert!(!tree.insert(Entry::new(99, 1, "other".to_string())));
        assert_eq!(tree.get(&1).unwrap().value, "v1");
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_ascending_inserts_stay_balanced() {
        let mut tree = tree_with(1..=100);
        assert_eq!(keys(&tree), (1..=100).collect::<Vec<_>>());
        let height = check_invariants(&tree);
        // 100 nodes fit in a black-height of at most log2(101) + 1.
        assert!(height <= 8, "black-height {} too large", height);

        for key in (2..=100).step_by(2) {
            assert!(tree.remove(&key).is_some());
            check_invariants(&tree);
        }
        assert_eq!(keys(&tree), (1..=100).step_by(2).collect::<Vec<_>>());
    }

    #[test]
    fn test_descending_inserts_stay_balanced() {
        let tree = tree_with((1..=64).rev());
        check_invariants(&tree);
        assert_eq!(keys(&tree), (1..=64).collect::<Vec<_>>());
    }

    #[test]
    fn test_remove_each_child_count() {
        let mut tree = tree_with([50, 25, 75, 10, 30, 60, 90, 5]);
        check_invariants(&tree);

        // Leaf
        assert_eq!(tree.remove(&5).unwrap().value, "v5");
        check_invariants(&tree);

        // Two children
        assert_eq!(tree.remove(&25).unwrap().key, 25);
        check_invariants(&tree);

        // Root with two children
        assert_eq!(tree.remove(&50).unwrap().key, 50);
        check_invariants(&tree);

        assert_eq!(keys(&tree), vec![10, 30, 60, 75, 90]);
        for key in [10, 30, 60, 75, 90] {
            assert!(tree.remove(&key).is_some());
            check_invariants(&tree);
        }
        assert!(tree.is_empty());
    }

    #[test]
    fn test_shuffled_insert_and_remove() {
        let mut tree = OrderedEngine::new();
        for key in shuffled(500, 0x9E37_79B9_7F4A_7C15) {
            assert!(tree.insert(Entry::new(0, key, key * 2)));
        }
        check_invariants(&tree);

        for (i, key) in shuffled(500, 0x2545_F491_4F6C_DD1D).into_iter().enumerate() {
            assert_eq!(tree.remove(&key).map(|entry| entry.value), Some(key * 2));
            if i % 25 == 0 {
                check_invariants(&tree);
            }
            assert!(tree.get(&key).is_none());
        }
        assert!(tree.is_empty());
        check_invariants(&tree);
    }

    #[test]
    fn test_interleaved_operations_keep_lookups_valid() {
        let mut tree = OrderedEngine::new();
        for key in shuffled(200, 7) {
            tree.insert(Entry::new(0, key, key));
            if key % 3 == 0 {
                tree.remove(&(key / 2));
            }
        }
        check_invariants(&tree);

        let expected: Vec<u32> = tree.iter().map(|entry| entry.key).collect();
        for key in &expected {
            assert_eq!(tree.get(key).unwrap().value, *key);
        }
        assert!(expected.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_clear() {
        let mut tree = tree_with(1..=10);
        tree.clear();
        assert!(tree.is_empty());
        assert!(tree.get(&3).is_none());
        assert!(tree.insert(Entry::new(1, 3, "again".to_string())));
        check_invariants(&tree);
    }

    #[test]
    fn test_find_uses_equality() {
        let mut tree = OrderedEngine::with_equality(|a: &u32, b: &u32| a % 10 == b % 10);
        for (key, value) in [("a", 11u32), ("b", 21), ("c", 12)] {
            tree.insert(Entry::new(0, key, value));
        }
        assert_eq!(Engine::find(&tree, &1), vec!["a", "b"]);
        assert_eq!(Engine::find(&tree, &5), Vec::<&str>::new());
    }
}
