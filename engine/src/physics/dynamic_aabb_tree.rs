// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use slotmap::{SecondaryMap, SlotMap, new_key_type};

use crate::{config::BroadphaseSettings, handles::ColliderHandle, physics::aabb::Aabb};

new_key_type! { pub struct NodeKey; }

#[derive(Debug, Clone, Copy, PartialEq)]
enum NodeKind {
    Internal { children: [NodeKey; 2] },
    Leaf { collider: ColliderHandle },
}

#[derive(Debug, Clone)]
struct Node {
    aabb: Aabb,
    parent: Option<NodeKey>,
    height: u32,
    kind: NodeKind,
}

/// Dynamic binary AABB tree over colliders.
///
/// Leaves hold "fat" boxes (the collider box grown by a margin) so colliders
/// that move a little don't need to be reinserted every step.
#[derive(Debug)]
pub struct DynamicAabbTree {
    nodes: SlotMap<NodeKey, Node>,
    root: Option<NodeKey>,
    leaves: SecondaryMap<ColliderHandle, NodeKey>,
    margin: f32,
    rebalance: bool,
}

impl Default for DynamicAabbTree {
    fn default() -> Self {
        Self::new(0.1, true)
    }
}

impl DynamicAabbTree {
    pub fn new(margin: f32, rebalance: bool) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            root: None,
            leaves: SecondaryMap::new(),
            margin,
            rebalance,
        }
    }

    pub fn from_settings(settings: &BroadphaseSettings) -> Self {
        Self::new(settings.aabb_margin, settings.rebalance)
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn contains(&self, collider: ColliderHandle) -> bool {
        self.leaves.contains_key(collider)
    }

    /// Height of the root; a single leaf has height 0.
    pub fn height(&self) -> u32 {
        self.root.map_or(0, |root| self.nodes[root].height)
    }

    /// The enlarged box stored for `collider`.
    pub fn fat_aabb(&self, collider: ColliderHandle) -> Option<Aabb> {
        self.leaves.get(collider).map(|leaf| self.nodes[*leaf].aabb)
    }

    /// Inserts `collider`, replacing any previous entry for it.
    pub fn add(&mut self, collider: ColliderHandle, aabb: Aabb) {
        if self.leaves.contains_key(collider) {
            self.remove(collider);
        }

        let leaf = self.nodes.insert(Node {
            aabb: aabb.expanded(self.margin),
            parent: None,
            height: 0,
            kind: NodeKind::Leaf { collider },
        });
        self.leaves.insert(collider, leaf);
        self.insert_leaf(leaf);
    }

    /// Removes `collider`. Returns false if it was not in the tree.
    pub fn remove(&mut self, collider: ColliderHandle) -> bool {
        let Some(leaf) = self.leaves.remove(collider) else {
            return false;
        };
        self.detach_leaf(leaf);
        self.nodes.remove(leaf);
        true
    }

    /// Moves `collider` to `aabb`. Reinserts only when the new box escapes the
    /// stored fat box; returns whether that happened.
    pub fn update(&mut self, collider: ColliderHandle, aabb: Aabb) -> bool {
        let Some(&leaf) = self.leaves.get(collider) else {
            self.add(collider, aabb);
            return true;
        };

        if self.nodes[leaf].aabb.contains(&aabb) {
            return false;
        }

        self.detach_leaf(leaf);
        self.nodes[leaf].aabb = aabb.expanded(self.margin);
        self.insert_leaf(leaf);
        true
    }

    /// Calls `callback` for every collider whose leaf box overlaps `aabb`.
    pub fn query<F: FnMut(ColliderHandle)>(&self, aabb: &Aabb, slack: f32, mut callback: F) {
        let Some(root) = self.root else {
            return;
        };

        let mut stack = Vec::with_capacity(64);
        stack.push(root);
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.aabb.intersects(aabb, slack) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { collider } => callback(collider),
                NodeKind::Internal { children } => {
                    stack.push(children[1]);
                    stack.push(children[0]);
                }
            }
        }
    }

    /// Colliders whose leaf box overlaps `aabb`, in depth-first order.
    pub fn get_collided(&self, aabb: &Aabb, slack: f32) -> Vec<ColliderHandle> {
        let mut hits = Vec::new();
        self.query(aabb, slack, |collider| hits.push(collider));
        hits
    }

    fn insert_leaf(&mut self, leaf: NodeKey) {
        self.nodes[leaf].parent = None;

        let Some(root) = self.root else {
            self.root = Some(leaf);
            return;
        };

        let leaf_aabb = self.nodes[leaf].aabb;
        let sibling = self.find_best_sibling(root, &leaf_aabb);

        let sibling_node = &self.nodes[sibling];
        let old_parent = sibling_node.parent;
        let aabb = sibling_node.aabb.union(&leaf_aabb);
        let height = sibling_node.height + 1;
        let new_parent = self.nodes.insert(Node {
            aabb,
            parent: old_parent,
            height,
            kind: NodeKind::Internal {
                children: [sibling, leaf],
            },
        });
        self.nodes[sibling].parent = Some(new_parent);
        self.nodes[leaf].parent = Some(new_parent);

        match old_parent {
            Some(parent) => self.replace_child(parent, sibling, new_parent),
            None => self.root = Some(new_parent),
        }

        self.refit_from(new_parent);
    }

    /// Branch and bound search for the node whose pairing with the new leaf
    /// adds the least surface area to the tree.
    fn find_best_sibling(&self, root: NodeKey, leaf_aabb: &Aabb) -> NodeKey {
        let leaf_area = leaf_aabb.surface_area();

        let mut best = root;
        let mut best_cost = f32::INFINITY;

        // (node, cost inherited from enlarging its ancestors)
        let mut stack: Vec<(NodeKey, f32)> = Vec::with_capacity(64);
        stack.push((root, 0.0));

        while let Some((index, inherited)) = stack.pop() {
            let node = &self.nodes[index];
            let combined_area = node.aabb.union(leaf_aabb).surface_area();

            let direct_cost = combined_area + inherited;
            if direct_cost < best_cost {
                best_cost = direct_cost;
                best = index;
            }

            if let NodeKind::Internal { children } = node.kind {
                let child_inherited = inherited + combined_area - node.aabb.surface_area();
                let lower_bound = leaf_area + child_inherited;
                if lower_bound < best_cost {
                    stack.push((children[1], child_inherited));
                    stack.push((children[0], child_inherited));
                }
            }
        }

        best
    }

    /// Unlinks `leaf` from the tree without freeing it. Its parent collapses
    /// and the sibling takes the parent's slot.
    fn detach_leaf(&mut self, leaf: NodeKey) {
        if self.root == Some(leaf) {
            self.root = None;
            return;
        }

        let Some(parent) = self.nodes[leaf].parent else {
            return;
        };
        let NodeKind::Internal { children } = self.nodes[parent].kind else {
            return;
        };
        let sibling = if children[0] == leaf {
            children[1]
        } else {
            children[0]
        };

        let grand_parent = self.nodes[parent].parent;
        self.nodes.remove(parent);
        self.nodes[leaf].parent = None;
        self.nodes[sibling].parent = grand_parent;

        match grand_parent {
            Some(grand_parent) => {
                self.replace_child(grand_parent, parent, sibling);
                self.refit_from(grand_parent);
            }
            None => self.root = Some(sibling),
        }
    }

    fn replace_child(&mut self, parent: NodeKey, old: NodeKey, new: NodeKey) {
        if let NodeKind::Internal { children } = &mut self.nodes[parent].kind {
            for child in children.iter_mut().filter(|c| **c == old) {
                *child = new;
            }
        }
    }

    /// Walks to the root recomputing boxes and heights, rotating on the way.
    fn refit_from(&mut self, start: NodeKey) {
        let mut current = Some(start);
        while let Some(index) = current {
            if self.rebalance {
                self.rotate(index);
            }
            self.update_node(index);
            current = self.nodes[index].parent;
        }
    }

    fn update_node(&mut self, index: NodeKey) {
        let NodeKind::Internal { children: [left, right] } = self.nodes[index].kind else {
            return;
        };
        let (left, right) = (&self.nodes[left], &self.nodes[right]);
        let aabb = left.aabb.union(&right.aabb);
        let height = 1 + left.height.max(right.height);

        let node = &mut self.nodes[index];
        node.aabb = aabb;
        node.height = height;
    }

    /// Swaps a child of `a` with a grandchild on the other side when that
    /// shrinks the intermediate node's surface area. `a`'s own box is unchanged.
    fn rotate(&mut self, a: NodeKey) {
        let NodeKind::Internal { children: [b, c] } = self.nodes[a].kind else {
            return;
        };

        // (child of a moving down, grandchild moving up, intermediate node)
        let mut best_swap: Option<(NodeKey, NodeKey, NodeKey)> = None;
        let mut best_gain = 0.0;

        for (upper, intermediate) in [(b, c), (c, b)] {
            let NodeKind::Internal {
                children: [first, second],
            } = self.nodes[intermediate].kind
            else {
                continue;
            };
            let area = self.nodes[intermediate].aabb.surface_area();
            let upper_aabb = self.nodes[upper].aabb;

            // `upper` trades places with `first`, leaving it paired with `second`.
            let gain = area - upper_aabb.union(&self.nodes[second].aabb).surface_area();
            if gain > best_gain {
                best_gain = gain;
                best_swap = Some((upper, first, intermediate));
            }

            let gain = area - upper_aabb.union(&self.nodes[first].aabb).surface_area();
            if gain > best_gain {
                best_gain = gain;
                best_swap = Some((upper, second, intermediate));
            }
        }

        let Some((upper, lower, intermediate)) = best_swap else {
            return;
        };

        self.replace_child(a, upper, lower);
        self.replace_child(intermediate, lower, upper);
        self.nodes[lower].parent = Some(a);
        self.nodes[upper].parent = Some(intermediate);
        self.update_node(intermediate);
    }

    /// Checks the structural invariants of the tree.
    pub fn validate(&self) -> Result<(), String> {
        let Some(root) = self.root else {
            if self.nodes.is_empty() && self.leaves.is_empty() {
                return Ok(());
            }
            return Err(format!(
                "empty tree still holds {} nodes and {} leaves",
                self.nodes.len(),
                self.leaves.len()
            ));
        };

        if self.nodes[root].parent.is_some() {
            return Err("root has a parent".to_string());
        }

        let mut leaf_count = 0;
        let mut visited = 0;
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            visited += 1;
            let node = self
                .nodes
                .get(index)
                .ok_or_else(|| format!("dangling node {index:?}"))?;

            match node.kind {
                NodeKind::Leaf { collider } => {
                    leaf_count += 1;
                    if node.height != 0 {
                        return Err(format!("leaf {index:?} has height {}", node.height));
                    }
                    if self.leaves.get(collider) != Some(&index) {
                        return Err(format!("leaf {index:?} is not mapped from {collider:?}"));
                    }
                }
                NodeKind::Internal { children } => {
                    for child in children {
                        let child_node = self
                            .nodes
                            .get(child)
                            .ok_or_else(|| format!("dangling child {child:?}"))?;
                        if child_node.parent != Some(index) {
                            return Err(format!("child {child:?} does not point back to {index:?}"));
                        }
                        stack.push(child);
                    }
                    let (left, right) = (&self.nodes[children[0]], &self.nodes[children[1]]);
                    if node.aabb != left.aabb.union(&right.aabb) {
                        return Err(format!("node {index:?} box is not the union of its children"));
                    }
                    if node.height != 1 + left.height.max(right.height) {
                        return Err(format!("node {index:?} has a stale height"));
                    }
                }
            }
        }

        if leaf_count != self.leaves.len() {
            return Err(format!(
                "{leaf_count} reachable leaves but {} mapped colliders",
                self.leaves.len()
            ));
        }
        if visited != self.nodes.len() || visited != 2 * leaf_count - 1 {
            return Err(format!(
                "{visited} reachable nodes, {} stored, {leaf_count} leaves",
                self.nodes.len()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use slotmap::SlotMap;

    fn handles(count: usize) -> Vec<ColliderHandle> {
        let mut keys: SlotMap<ColliderHandle, ()> = SlotMap::with_key();
        (0..count).map(|_| keys.insert(())).collect()
    }

    fn unit_box_at(x: f32, y: f32, z: f32) -> Aabb {
        let c = Vec3::new(x, y, z);
        Aabb::new(c - Vec3::splat(0.5), c + Vec3::splat(0.5))
    }

    fn random_aabb(rng: &mut StdRng) -> Aabb {
        let center = Vec3::new(
            rng.random_range(-50.0..50.0),
            rng.random_range(-50.0..50.0),
            rng.random_range(-50.0..50.0),
        );
        let half = Vec3::new(
            rng.random_range(0.1..4.0),
            rng.random_range(0.1..4.0),
            rng.random_range(0.1..4.0),
        );
        Aabb::new(center - half, center + half)
    }

    fn brute_force(
        tree: &DynamicAabbTree,
        live: &[ColliderHandle],
        query: &Aabb,
    ) -> Vec<ColliderHandle> {
        let mut hits: Vec<_> = live
            .iter()
            .copied()
            .filter(|h| {
                tree.fat_aabb(*h)
                    .is_some_and(|fat| fat.intersects(query, 0.0))
            })
            .collect();
        hits.sort();
        hits
    }

    #[test]
    fn single_collider_becomes_root_leaf() {
        let ids = handles(1);
        let mut tree = DynamicAabbTree::new(0.0, true);
        tree.add(ids[0], unit_box_at(0.0, 0.0, 0.0));

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.nodes.len(), 1);
        tree.validate().expect("valid tree");
    }

    #[test]
    fn second_collider_wraps_root_in_internal_node() {
        let ids = handles(2);
        let mut tree = DynamicAabbTree::new(0.0, true);
        tree.add(ids[0], unit_box_at(0.0, 0.0, 0.0));
        tree.add(ids[1], unit_box_at(5.0, 0.0, 0.0));

        assert_eq!(tree.height(), 1);
        assert_eq!(tree.nodes.len(), 3);
        let root = tree.root.expect("root");
        assert_eq!(
            tree.nodes[root].aabb,
            unit_box_at(0.0, 0.0, 0.0).union(&unit_box_at(5.0, 0.0, 0.0))
        );
        tree.validate().expect("valid tree");
    }

    #[test]
    fn removing_last_collider_empties_tree() {
        let ids = handles(2);
        let mut tree = DynamicAabbTree::default();
        tree.add(ids[0], unit_box_at(0.0, 0.0, 0.0));
        tree.add(ids[1], unit_box_at(3.0, 0.0, 0.0));

        assert!(tree.remove(ids[0]));
        tree.validate().expect("valid after first removal");
        assert_eq!(tree.height(), 0);

        assert!(tree.remove(ids[1]));
        assert!(tree.is_empty());
        assert!(tree.nodes.is_empty());
        tree.validate().expect("valid empty tree");

        assert!(!tree.remove(ids[1]));
    }

    #[test]
    fn new_leaf_pairs_with_nearby_sibling() {
        let ids = handles(3);
        let mut tree = DynamicAabbTree::new(0.0, false);
        tree.add(ids[0], unit_box_at(0.0, 0.0, 0.0));
        tree.add(ids[1], unit_box_at(100.0, 0.0, 0.0));
        tree.add(ids[2], unit_box_at(1.0, 0.0, 0.0));

        let leaf = tree.leaves[ids[2]];
        let parent = tree.nodes[leaf].parent.expect("parent");
        let NodeKind::Internal { children } = tree.nodes[parent].kind else {
            panic!("parent must be internal");
        };
        assert!(children.contains(&tree.leaves[ids[0]]));
        tree.validate().expect("valid tree");
    }

    #[test]
    fn randomized_tree_matches_brute_force_queries() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let ids = handles(300);
        let mut tree = DynamicAabbTree::new(0.05, true);

        for id in &ids {
            tree.add(*id, random_aabb(&mut rng));
        }
        tree.validate().expect("valid after inserts");

        for _ in 0..50 {
            let query = random_aabb(&mut rng);
            let mut hits = tree.get_collided(&query, 0.0);
            hits.sort();
            assert_eq!(hits, brute_force(&tree, &ids, &query));
        }

        let (removed, live) = ids.split_at(150);
        for id in removed {
            assert!(tree.remove(*id));
        }
        tree.validate().expect("valid after removals");
        assert_eq!(tree.len(), live.len());

        for _ in 0..50 {
            let query = random_aabb(&mut rng);
            let mut hits = tree.get_collided(&query, 0.0);
            hits.sort();
            assert_eq!(hits, brute_force(&tree, live, &query));
        }
    }

    #[test]
    fn randomized_updates_keep_invariants() {
        let mut rng = StdRng::seed_from_u64(42);
        let ids = handles(120);
        let mut tree = DynamicAabbTree::new(0.1, true);
        for id in &ids {
            tree.add(*id, random_aabb(&mut rng));
        }

        for _ in 0..5 {
            for id in &ids {
                let aabb = random_aabb(&mut rng);
                tree.update(*id, aabb);
                let fat = tree.fat_aabb(*id).expect("leaf");
                assert!(fat.contains(&aabb));
            }
            tree.validate().expect("valid after updates");
        }
    }

    #[test]
    fn small_moves_stay_inside_fat_box() {
        let ids = handles(1);
        let mut tree = DynamicAabbTree::new(0.1, true);
        tree.add(ids[0], unit_box_at(0.0, 0.0, 0.0));

        assert!(!tree.update(ids[0], unit_box_at(0.05, 0.0, 0.0)));
        assert!(tree.update(ids[0], unit_box_at(1.0, 0.0, 0.0)));
        tree.validate().expect("valid tree");
    }

    #[test]
    fn sequential_inserts_without_rebalance_stay_valid() {
        let ids = handles(64);
        let mut tree = DynamicAabbTree::new(0.0, false);
        for (i, id) in ids.iter().enumerate() {
            tree.add(*id, unit_box_at(i as f32 * 2.0, 0.0, 0.0));
        }
        tree.validate().expect("valid tree");

        let hits = tree.get_collided(&unit_box_at(10.0, 0.0, 0.0), 0.0);
        assert_eq!(hits, vec![ids[5]]);
    }

    #[test]
    fn rotate_moves_far_leaf_up() {
        let ids = handles(3);
        let mut tree = DynamicAabbTree::new(0.0, false);

        let leaf = |tree: &mut DynamicAabbTree, id: ColliderHandle, aabb: Aabb| {
            let key = tree.nodes.insert(Node {
                aabb,
                parent: None,
                height: 0,
                kind: NodeKind::Leaf { collider: id },
            });
            tree.leaves.insert(id, key);
            key
        };

        // a(b, c(f, g)) with b and g close together and f far away.
        let b = leaf(&mut tree, ids[0], unit_box_at(0.0, 0.0, 0.0));
        let f = leaf(&mut tree, ids[1], unit_box_at(100.0, 0.0, 0.0));
        let g = leaf(&mut tree, ids[2], unit_box_at(1.0, 0.0, 0.0));
        let c_aabb = tree.nodes[f].aabb.union(&tree.nodes[g].aabb);
        let c = tree.nodes.insert(Node {
            aabb: c_aabb,
            parent: None,
            height: 1,
            kind: NodeKind::Internal { children: [f, g] },
        });
        let a_aabb = tree.nodes[b].aabb.union(&tree.nodes[c].aabb);
        let a = tree.nodes.insert(Node {
            aabb: a_aabb,
            parent: None,
            height: 2,
            kind: NodeKind::Internal { children: [b, c] },
        });
        for (child, parent) in [(b, a), (c, a), (f, c), (g, c)] {
            tree.nodes[child].parent = Some(parent);
        }
        tree.root = Some(a);
        tree.validate().expect("hand-built tree is valid");

        tree.rotate(a);
        tree.update_node(a);

        assert_eq!(tree.nodes[a].kind, NodeKind::Internal { children: [f, c] });
        assert_eq!(tree.nodes[c].kind, NodeKind::Internal { children: [b, g] });
        tree.validate().expect("valid after rotation");
    }
}
