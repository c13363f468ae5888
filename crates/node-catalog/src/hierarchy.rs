//! Category hierarchy resolution shared by the tree and the registry
//!
//! Resolves flat parent references into an acyclic forest over slot
//! indices. Every category and node ends up somewhere: unknown parents and
//! categories resolve to root, and each parent cycle is broken at one
//! member.

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};

use crate::diagnostics::CatalogDiagnostic;
use crate::types::{CategoryManifest, NodeManifest};

pub(crate) struct Hierarchy<'a> {
    /// Deduplicated categories in catalog order
    pub categories: Vec<&'a CategoryManifest>,
    /// Effective parent slot of each category
    pub parents: Vec<Option<usize>>,
    /// Child slots of each category, in catalog order
    pub children: Vec<Vec<usize>>,
    /// `(position in input node slice, category slot)` for each kept node
    pub nodes: Vec<(usize, Option<usize>)>,
    pub diagnostics: Vec<CatalogDiagnostic>,
}

impl<'a> Hierarchy<'a> {
    pub fn resolve<N: Borrow<NodeManifest>>(
        categories: &'a [CategoryManifest],
        nodes: &[N],
    ) -> Self {
        let mut diagnostics = Vec::new();
        let mut kept: Vec<&'a CategoryManifest> = Vec::with_capacity(categories.len());
        let mut index: HashMap<&'a str, usize> = HashMap::with_capacity(categories.len());

        for category in categories {
            if index.contains_key(category.id.as_str()) {
                diagnostics.push(CatalogDiagnostic::DuplicateCategoryId {
                    category_id: category.id.clone(),
                });
                continue;
            }
            index.insert(category.id.as_str(), kept.len());
            kept.push(category);
        }

        let mut parents: Vec<Option<usize>> = Vec::with_capacity(kept.len());
        for category in &kept {
            let parent = match category.parent_id.as_deref() {
                None => None,
                Some(parent_id) => match index.get(parent_id) {
                    Some(&slot) => Some(slot),
                    None => {
                        diagnostics.push(CatalogDiagnostic::OrphanCategory {
                            category_id: category.id.clone(),
                            parent_id: parent_id.to_string(),
                        });
                        None
                    }
                },
            };
            parents.push(parent);
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); kept.len()];
        for (slot, parent) in parents.iter().enumerate() {
            if let Some(parent) = parent {
                children[*parent].push(slot);
            }
        }

        break_cycles(&kept, &mut parents, &mut children, &mut diagnostics);

        let mut seen: HashSet<&str> = HashSet::with_capacity(nodes.len());
        let mut node_slots = Vec::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            let node: &NodeManifest = node.borrow();
            if !seen.insert(node.node_type.as_str()) {
                diagnostics.push(CatalogDiagnostic::DuplicateNodeType {
                    node_type: node.node_type.clone(),
                });
                continue;
            }
            let slot = match node.category.as_deref() {
                None => None,
                Some(category_id) => match index.get(category_id) {
                    Some(&slot) => Some(slot),
                    None => {
                        diagnostics.push(CatalogDiagnostic::OrphanNode {
                            node_type: node.node_type.clone(),
                            category_id: category_id.to_string(),
                        });
                        None
                    }
                },
            };
            node_slots.push((position, slot));
        }

        for diagnostic in &diagnostics {
            log::warn!("{}", diagnostic);
        }

        Self {
            categories: kept,
            parents,
            children,
            nodes: node_slots,
            diagnostics,
        }
    }

    /// Root category slots in catalog order
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.parents
            .iter()
            .enumerate()
            .filter(|(_, parent)| parent.is_none())
            .map(|(slot, _)| slot)
    }

    /// Node positions grouped by category slot, plus root-level positions
    pub fn nodes_by_slot(&self) -> (Vec<Vec<usize>>, Vec<usize>) {
        let mut by_slot = vec![Vec::new(); self.categories.len()];
        let mut root = Vec::new();
        for &(position, slot) in &self.nodes {
            match slot {
                Some(slot) => by_slot[slot].push(position),
                None => root.push(position),
            }
        }
        (by_slot, root)
    }

    /// Ancestor slots from the root down to the direct parent
    pub fn ancestors(&self, slot: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut current = self.parents[slot];
        while let Some(parent) = current {
            chain.push(parent);
            current = self.parents[parent];
        }
        chain.reverse();
        chain
    }

    /// Transitive child slots, breadth-first, excluding `slot`
    pub fn descendants(&self, slot: usize) -> Vec<usize> {
        let mut found = Vec::new();
        let mut queue = std::collections::VecDeque::from_iter(self.children[slot].iter().copied());
        while let Some(next) = queue.pop_front() {
            found.push(next);
            queue.extend(self.children[next].iter().copied());
        }
        found
    }
}

/// Promote one member of every parent cycle to root
fn break_cycles(
    categories: &[&CategoryManifest],
    parents: &mut [Option<usize>],
    children: &mut [Vec<usize>],
    diagnostics: &mut Vec<CatalogDiagnostic>,
) {
    let mut reachable = vec![false; parents.len()];
    let roots: Vec<usize> = (0..parents.len()).filter(|&s| parents[s].is_none()).collect();
    mark_reachable(&roots, children, &mut reachable);

    while let Some(start) = reachable.iter().position(|r| !r) {
        // Walk up until a slot repeats; the walk from that slot on is the cycle
        let mut path = Vec::new();
        let mut current = start;
        let cycle_start = loop {
            if let Some(seen) = path.iter().position(|&s| s == current) {
                break Some(seen);
            }
            path.push(current);
            match parents[current] {
                Some(parent) => current = parent,
                None => break None,
            }
        };

        // Promote the member that comes first in catalog order
        let promoted = match cycle_start {
            Some(seen) => path[seen..].iter().copied().min().unwrap_or(current),
            None => current,
        };
        if let Some(parent) = parents[promoted].take() {
            children[parent].retain(|&c| c != promoted);
        }
        diagnostics.push(CatalogDiagnostic::ParentCycle {
            category_id: categories[promoted].id.clone(),
        });
        mark_reachable(&[promoted], children, &mut reachable);
    }
}

fn mark_reachable(starts: &[usize], children: &[Vec<usize>], reachable: &mut [bool]) {
    let mut stack = starts.to_vec();
    while let Some(slot) = stack.pop() {
        if reachable[slot] {
            continue;
        }
        reachable[slot] = true;
        stack.extend(children[slot].iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CategoryBuilder;

    fn ids(h: &Hierarchy<'_>, slots: &[usize]) -> Vec<String> {
        slots.iter().map(|&s| h.categories[s].id.clone()).collect()
    }

    fn slot(h: &Hierarchy<'_>, id: &str) -> usize {
        h.categories.iter().position(|c| c.id == id).unwrap()
    }

    #[test]
    fn test_ancestors_and_descendants() {
        let categories = vec![
            CategoryBuilder::new("root", "Root").build(),
            CategoryBuilder::new("mid", "Mid").parent("root").build(),
            CategoryBuilder::new("leaf-a", "A").parent("mid").build(),
            CategoryBuilder::new("leaf-b", "B").parent("mid").build(),
        ];
        let h = Hierarchy::resolve::<NodeManifest>(&categories, &[]);

        let leaf = slot(&h, "leaf-a");
        assert_eq!(ids(&h, &h.ancestors(leaf)), vec!["root", "mid"]);
        assert!(h.ancestors(slot(&h, "root")).is_empty());

        let root = slot(&h, "root");
        assert_eq!(ids(&h, &h.descendants(root)), vec!["mid", "leaf-a", "leaf-b"]);
        assert!(h.descendants(leaf).is_empty());
    }

    #[test]
    fn test_self_parent_is_promoted() {
        let categories = vec![CategoryBuilder::new("loop", "Loop").parent("loop").build()];
        let h = Hierarchy::resolve::<NodeManifest>(&categories, &[]);

        assert_eq!(h.roots().collect::<Vec<_>>(), vec![0]);
        assert!(h.children[0].is_empty());
        assert_eq!(h.diagnostics.len(), 1);
    }

    #[test]
    fn test_cycle_keeps_dangling_child_attached() {
        let categories = vec![
            CategoryBuilder::new("child", "Child").parent("b").build(),
            CategoryBuilder::new("a", "A").parent("b").build(),
            CategoryBuilder::new("b", "B").parent("a").build(),
        ];
        let h = Hierarchy::resolve::<NodeManifest>(&categories, &[]);

        let roots: Vec<usize> = h.roots().collect();
        assert_eq!(ids(&h, &roots), vec!["a"]);
        assert_eq!(h.parents[slot(&h, "b")], Some(slot(&h, "a")));
        assert_eq!(h.parents[slot(&h, "child")], Some(slot(&h, "b")));
        assert_eq!(ids(&h, &h.ancestors(slot(&h, "child"))), vec!["a", "b"]);
        assert_eq!(
            h.diagnostics,
            vec![CatalogDiagnostic::ParentCycle {
                category_id: "a".to_string()
            }]
        );
    }
}
