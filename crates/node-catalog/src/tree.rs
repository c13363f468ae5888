//! Immutable category tree
//!
//! A `CategoryTree` is built from flat category and node lists and is
//! never mutated afterwards. Every transform (`filter`, `get_subtree`,
//! `flatten`, ...) returns a new tree. Unchanged subtrees are shared
//! through `Arc`, so transforms only allocate along the paths they change.
//!
//! # Example
//!
//! ```ignore
//! let tree = CategoryTree::build(&manifest.categories, &manifest.nodes);
//! let matches = tree.filter_by_search("email").flatten_single_path();
//! ```

use std::borrow::Borrow;
use std::collections::HashMap;
use std::sync::Arc;

use crate::hierarchy::Hierarchy;
use crate::types::{CategoryId, CategoryManifest, NodeManifest};

/// A category with its nested categories and nodes, both sorted by
/// `sort_order`
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTreeNode {
    pub category: CategoryManifest,
    pub nested_categories: Vec<Arc<CategoryTreeNode>>,
    pub nodes: Vec<Arc<NodeManifest>>,
}

impl CategoryTreeNode {
    pub fn id(&self) -> &str {
        &self.category.id
    }
}

/// Predicates applied by `CategoryTree::filter`
///
/// Absent predicates accept everything.
#[derive(Default, Clone, Copy)]
pub struct TreeFilter<'a> {
    pub category_filter: Option<&'a dyn Fn(&CategoryManifest) -> bool>,
    pub node_filter: Option<&'a dyn Fn(&NodeManifest) -> bool>,
}

impl<'a> TreeFilter<'a> {
    /// Filter on nodes only
    pub fn nodes(node_filter: &'a dyn Fn(&NodeManifest) -> bool) -> Self {
        Self {
            category_filter: None,
            node_filter: Some(node_filter),
        }
    }

    /// Filter on categories only
    pub fn categories(category_filter: &'a dyn Fn(&CategoryManifest) -> bool) -> Self {
        Self {
            category_filter: Some(category_filter),
            node_filter: None,
        }
    }

    fn keep_category(&self, category: &CategoryManifest) -> bool {
        self.category_filter.is_none_or(|f| f(category))
    }

    fn keep_node(&self, node: &NodeManifest) -> bool {
        self.node_filter.is_none_or(|f| f(node))
    }
}

/// Connection-awareness used by `CategoryTree::filter_by_connections`
pub trait ConnectionFilter {
    /// Whether the category (or something beneath it) can take part in the
    /// pending connections
    fn is_valid_category_for_connection(&self, category_id: &str) -> bool;

    /// Whether a node type can take part in the pending connections
    fn can_node_connect(&self, node: &NodeManifest) -> bool;
}

/// Immutable forest of categories plus root-level nodes
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    root_categories: Vec<Arc<CategoryTreeNode>>,
    root_nodes: Vec<Arc<NodeManifest>>,
    index: HashMap<CategoryId, Arc<CategoryTreeNode>>,
}

impl PartialEq for CategoryTree {
    fn eq(&self, other: &Self) -> bool {
        self.root_categories == other.root_categories && self.root_nodes == other.root_nodes
    }
}

fn sort_categories(categories: &mut [Arc<CategoryTreeNode>]) {
    categories.sort_by_key(|c| c.category.sort_order);
}

fn sort_nodes(nodes: &mut [Arc<NodeManifest>]) {
    nodes.sort_by_key(|n| n.sort_order);
}

impl CategoryTree {
    /// An empty tree
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a tree from flat category and node lists
    pub fn build(categories: &[CategoryManifest], nodes: &[NodeManifest]) -> Self {
        let shared: Vec<Arc<NodeManifest>> = nodes.iter().cloned().map(Arc::new).collect();
        Self::build_shared(categories, &shared)
    }

    /// Build a tree over nodes already shared with the caller
    pub fn build_shared(categories: &[CategoryManifest], nodes: &[Arc<NodeManifest>]) -> Self {
        let hierarchy = Hierarchy::resolve(categories, nodes);
        Self::from_hierarchy(&hierarchy, nodes)
    }

    pub(crate) fn from_hierarchy<N>(hierarchy: &Hierarchy<'_>, nodes: &[N]) -> Self
    where
        N: Borrow<NodeManifest> + Into<Arc<NodeManifest>> + Clone,
    {
        let (by_slot, root_positions) = hierarchy.nodes_by_slot();

        let mut root_categories: Vec<Arc<CategoryTreeNode>> = hierarchy
            .roots()
            .map(|slot| build_category(hierarchy, slot, &by_slot, nodes))
            .collect();
        sort_categories(&mut root_categories);

        let mut root_nodes: Vec<Arc<NodeManifest>> = root_positions
            .iter()
            .map(|&p| nodes[p].clone().into())
            .collect();
        sort_nodes(&mut root_nodes);

        let tree = Self::from_parts(root_categories, root_nodes);
        log::debug!(
            "Built category tree: {} categories, {} nodes",
            tree.get_category_count(),
            tree.get_node_count()
        );
        tree
    }

    /// Assemble a tree from already-sorted roots and index it
    fn from_parts(
        root_categories: Vec<Arc<CategoryTreeNode>>,
        root_nodes: Vec<Arc<NodeManifest>>,
    ) -> Self {
        let mut index = HashMap::new();
        let mut stack: Vec<&Arc<CategoryTreeNode>> = root_categories.iter().collect();
        while let Some(node) = stack.pop() {
            index.insert(node.category.id.clone(), Arc::clone(node));
            stack.extend(node.nested_categories.iter());
        }
        Self {
            root_categories,
            root_nodes,
            index,
        }
    }

    /// Look up a category anywhere in the tree
    pub fn find_category(&self, id: &str) -> Option<&CategoryTreeNode> {
        self.index.get(id).map(|node| node.as_ref())
    }

    /// The tree beneath `id`: its nested categories and nodes become roots
    ///
    /// Returns an empty tree if `id` is unknown.
    pub fn get_subtree(&self, id: &str) -> Self {
        match self.index.get(id) {
            Some(node) => Self::from_parts(node.nested_categories.clone(), node.nodes.clone()),
            None => Self::empty(),
        }
    }

    /// Keep categories passing the category filter that still hold at least
    /// one nested category or node, and nodes passing the node filter
    pub fn filter(&self, filter: &TreeFilter<'_>) -> Self {
        let root_categories = self
            .root_categories
            .iter()
            .filter_map(|c| filter_category(c, filter))
            .collect();
        let root_nodes = self
            .root_nodes
            .iter()
            .filter(|n| filter.keep_node(n))
            .cloned()
            .collect();
        Self::from_parts(root_categories, root_nodes)
    }

    /// Keep nodes whose label, type, description, or tags contain `term`
    /// (case-insensitive). An empty term returns the tree unchanged;
    /// whitespace is part of the term.
    pub fn filter_by_search(&self, term: &str) -> Self {
        if term.is_empty() {
            return self.clone();
        }
        let needle = term.to_lowercase();
        let matches = |node: &NodeManifest| node.matches_search(&needle);
        self.filter(&TreeFilter::nodes(&matches))
    }

    /// Keep what a `ConnectionFilter` accepts
    pub fn filter_by_connections(&self, validator: &dyn ConnectionFilter) -> Self {
        let categories = |c: &CategoryManifest| validator.is_valid_category_for_connection(&c.id);
        let nodes = |n: &NodeManifest| validator.can_node_connect(n);
        self.filter(&TreeFilter {
            category_filter: Some(&categories),
            node_filter: Some(&nodes),
        })
    }

    /// Collapse a single chain of categories
    ///
    /// With exactly one root category and no root nodes, walk down while the
    /// current category has one nested category and no nodes, then expose the
    /// first branch point's children and nodes as the new roots. Otherwise
    /// returns an unchanged copy.
    pub fn flatten_single_path(&self) -> Self {
        if self.root_categories.len() != 1 || !self.root_nodes.is_empty() {
            return self.clone();
        }

        let mut current = &self.root_categories[0];
        while current.nested_categories.len() == 1 && current.nodes.is_empty() {
            current = &current.nested_categories[0];
        }

        Self::from_parts(current.nested_categories.clone(), current.nodes.clone())
    }

    /// Every node in the tree as root nodes, sorted by `sort_order`;
    /// categories are discarded
    pub fn flatten(&self) -> Self {
        let mut nodes: Vec<Arc<NodeManifest>> = Vec::with_capacity(self.get_node_count());
        for category in &self.root_categories {
            collect_nodes(category, &mut nodes);
        }
        nodes.extend(self.root_nodes.iter().cloned());
        sort_nodes(&mut nodes);
        Self::from_parts(Vec::new(), nodes)
    }

    pub fn is_empty(&self) -> bool {
        self.root_categories.is_empty() && self.root_nodes.is_empty()
    }

    pub fn get_root_categories(&self) -> &[Arc<CategoryTreeNode>] {
        &self.root_categories
    }

    pub fn get_root_nodes(&self) -> &[Arc<NodeManifest>] {
        &self.root_nodes
    }

    /// All categories in depth-first order
    pub fn get_all_categories(&self) -> Vec<&CategoryTreeNode> {
        let mut all = Vec::with_capacity(self.index.len());
        let mut stack: Vec<&Arc<CategoryTreeNode>> = self.root_categories.iter().rev().collect();
        while let Some(node) = stack.pop() {
            all.push(node.as_ref());
            stack.extend(node.nested_categories.iter().rev());
        }
        all
    }

    /// All nodes: root-level nodes first, then category nodes depth-first
    pub fn get_all_nodes(&self) -> Vec<&NodeManifest> {
        let mut all: Vec<&NodeManifest> = self.root_nodes.iter().map(|n| n.as_ref()).collect();
        for category in self.get_all_categories() {
            all.extend(category.nodes.iter().map(|n| n.as_ref()));
        }
        all
    }

    pub fn get_category_count(&self) -> usize {
        self.index.len()
    }

    pub fn get_node_count(&self) -> usize {
        self.root_nodes.len()
            + self
                .index
                .values()
                .map(|c| c.nodes.len())
                .sum::<usize>()
    }
}

fn build_category<N>(
    hierarchy: &Hierarchy<'_>,
    slot: usize,
    by_slot: &[Vec<usize>],
    nodes: &[N],
) -> Arc<CategoryTreeNode>
where
    N: Borrow<NodeManifest> + Into<Arc<NodeManifest>> + Clone,
{
    let mut nested_categories: Vec<Arc<CategoryTreeNode>> = hierarchy.children[slot]
        .iter()
        .map(|&child| build_category(hierarchy, child, by_slot, nodes))
        .collect();
    sort_categories(&mut nested_categories);

    let mut category_nodes: Vec<Arc<NodeManifest>> = by_slot[slot]
        .iter()
        .map(|&p| nodes[p].clone().into())
        .collect();
    sort_nodes(&mut category_nodes);

    Arc::new(CategoryTreeNode {
        category: hierarchy.categories[slot].clone(),
        nested_categories,
        nodes: category_nodes,
    })
}

fn filter_category(
    node: &Arc<CategoryTreeNode>,
    filter: &TreeFilter<'_>,
) -> Option<Arc<CategoryTreeNode>> {
    if !filter.keep_category(&node.category) {
        return None;
    }

    let nested_categories: Vec<Arc<CategoryTreeNode>> = node
        .nested_categories
        .iter()
        .filter_map(|c| filter_category(c, filter))
        .collect();
    let nodes: Vec<Arc<NodeManifest>> = node
        .nodes
        .iter()
        .filter(|n| filter.keep_node(n))
        .cloned()
        .collect();

    if nested_categories.is_empty() && nodes.is_empty() {
        return None;
    }

    let unchanged = nodes.len() == node.nodes.len()
        && nested_categories.len() == node.nested_categories.len()
        && nested_categories
            .iter()
            .zip(&node.nested_categories)
            .all(|(a, b)| Arc::ptr_eq(a, b));
    if unchanged {
        return Some(Arc::clone(node));
    }

    Some(Arc::new(CategoryTreeNode {
        category: node.category.clone(),
        nested_categories,
        nodes,
    }))
}

fn collect_nodes(category: &CategoryTreeNode, out: &mut Vec<Arc<NodeManifest>>) {
    out.extend(category.nodes.iter().cloned());
    for nested in &category.nested_categories {
        collect_nodes(nested, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{CategoryBuilder, NodeManifestBuilder};

    fn category(id: &str, parent: Option<&str>, sort_order: i32) -> CategoryManifest {
        let builder = CategoryBuilder::new(id, id).sort_order(sort_order);
        match parent {
            Some(parent) => builder.parent(parent).build(),
            None => builder.build(),
        }
    }

    fn node(node_type: &str, category: Option<&str>, sort_order: i32) -> NodeManifest {
        let builder = NodeManifestBuilder::new(node_type, node_type).sort_order(sort_order);
        match category {
            Some(category) => builder.category(category).build(),
            None => builder.build(),
        }
    }

    fn node_types(nodes: &[Arc<NodeManifest>]) -> Vec<&str> {
        nodes.iter().map(|n| n.node_type.as_str()).collect()
    }

    fn category_ids(categories: &[Arc<CategoryTreeNode>]) -> Vec<&str> {
        categories.iter().map(|c| c.id()).collect()
    }

    /// root -> middle -> {branch-a, branch-b}, one node per leaf
    fn branching_tree() -> CategoryTree {
        CategoryTree::build(
            &[
                category("root", None, 0),
                category("middle", Some("root"), 0),
                category("branch-a", Some("middle"), 0),
                category("branch-b", Some("middle"), 1),
            ],
            &[node("a-node", Some("branch-a"), 0), node("b-node", Some("branch-b"), 0)],
        )
    }

    #[test]
    fn test_build_nests_and_sorts() {
        let tree = CategoryTree::build(
            &[
                category("second", None, 2),
                category("first", None, 1),
                category("child", Some("first"), 0),
            ],
            &[
                node("late", Some("child"), 5),
                node("early", Some("child"), 1),
                node("loose", None, 0),
            ],
        );

        assert_eq!(category_ids(tree.get_root_categories()), vec!["first", "second"]);
        let child = tree.find_category("child").unwrap();
        assert_eq!(node_types(&child.nodes), vec!["early", "late"]);
        assert_eq!(node_types(tree.get_root_nodes()), vec!["loose"]);
        assert_eq!(tree.get_category_count(), 3);
        assert_eq!(tree.get_node_count(), 3);
    }

    #[test]
    fn test_sort_is_stable() {
        let tree = CategoryTree::build(
            &[category("c", None, 0), category("a", None, 0), category("b", None, 0)],
            &[node("z", None, 1), node("y", None, 1), node("x", None, 0)],
        );

        assert_eq!(category_ids(tree.get_root_categories()), vec!["c", "a", "b"]);
        assert_eq!(node_types(tree.get_root_nodes()), vec!["x", "z", "y"]);
    }

    #[test]
    fn test_build_is_idempotent() {
        let categories = [
            category("root", None, 0),
            category("a", Some("root"), 1),
            category("b", Some("root"), 1),
        ];
        let nodes = [node("n1", Some("a"), 0), node("n2", Some("b"), 0), node("n3", None, 0)];

        assert_eq!(
            CategoryTree::build(&categories, &nodes),
            CategoryTree::build(&categories, &nodes)
        );
    }

    #[test]
    fn test_orphans_promoted_to_root() {
        let tree = CategoryTree::build(
            &[category("lost", Some("missing"), 0)],
            &[node("stray", Some("nowhere"), 0)],
        );

        assert_eq!(category_ids(tree.get_root_categories()), vec!["lost"]);
        assert_eq!(node_types(tree.get_root_nodes()), vec!["stray"]);
    }

    #[test]
    fn test_parent_cycle_broken_at_first_member() {
        let tree = CategoryTree::build(
            &[
                category("kid", Some("b"), 0),
                category("a", Some("b"), 0),
                category("b", Some("a"), 0),
            ],
            &[node("n", Some("kid"), 0)],
        );

        assert_eq!(category_ids(tree.get_root_categories()), vec!["a"]);
        assert_eq!(tree.get_category_count(), 3);
        let b = tree.find_category("b").unwrap();
        assert_eq!(category_ids(&b.nested_categories), vec!["kid"]);
        assert_eq!(tree.find_category("kid").unwrap().nodes.len(), 1);
    }

    #[test]
    fn test_find_category_and_subtree() {
        let tree = branching_tree();
        assert!(tree.find_category("branch-b").is_some());
        assert!(tree.find_category("unknown").is_none());

        let subtree = tree.get_subtree("middle");
        assert_eq!(
            category_ids(subtree.get_root_categories()),
            vec!["branch-a", "branch-b"]
        );
        assert!(subtree.find_category("middle").is_none());
        assert_eq!(subtree.get_node_count(), 2);

        assert!(tree.get_subtree("unknown").is_empty());
    }

    #[test]
    fn test_filter_does_not_mutate_receiver() {
        let tree = branching_tree();
        let only_a = |n: &NodeManifest| n.node_type == "a-node";
        let filtered = tree.filter(&TreeFilter::nodes(&only_a));

        assert_eq!(filtered.get_node_count(), 1);
        assert_eq!(tree.get_node_count(), 2);
        assert_eq!(tree.get_category_count(), 4);
    }

    #[test]
    fn test_filter_prunes_empty_categories() {
        let tree = branching_tree();
        let only_a = |n: &NodeManifest| n.node_type == "a-node";
        let filtered = tree.filter(&TreeFilter::nodes(&only_a));

        assert!(filtered.find_category("root").is_some());
        assert!(filtered.find_category("middle").is_some());
        assert!(filtered.find_category("branch-a").is_some());
        assert!(filtered.find_category("branch-b").is_none());
    }

    #[test]
    fn test_filter_drops_rejected_category_subtree() {
        let tree = branching_tree();
        let not_middle = |c: &CategoryManifest| c.id != "middle";
        let filtered = tree.filter(&TreeFilter::categories(&not_middle));

        assert!(filtered.is_empty());
    }

    #[test]
    fn test_default_filter_drops_only_empty_categories() {
        let tree = CategoryTree::build(
            &[category("full", None, 0), category("empty", None, 1)],
            &[node("n", Some("full"), 0)],
        );
        let filtered = tree.filter(&TreeFilter::default());

        assert_eq!(category_ids(filtered.get_root_categories()), vec!["full"]);
        // Unchanged subtrees are shared, not copied
        assert!(Arc::ptr_eq(
            &filtered.get_root_categories()[0],
            &tree.get_root_categories()[0]
        ));
    }

    #[test]
    fn test_filter_by_search() {
        let tree = CategoryTree::build(
            &[category("files", None, 0), category("email", None, 1)],
            &[
                NodeManifestBuilder::new("read-file", "Read File")
                    .category("files")
                    .build(),
                NodeManifestBuilder::new("send-email", "Send Email")
                    .category("email")
                    .description("Sends a message")
                    .tag("smtp")
                    .build(),
            ],
        );

        let found = tree.filter_by_search("EMAIL");
        assert_eq!(found.get_node_count(), 1);
        assert!(found.find_category("files").is_none());

        assert_eq!(tree.filter_by_search("SMTP").get_node_count(), 1);
        assert_eq!(tree.filter_by_search("message").get_node_count(), 1);
        assert!(tree.filter_by_search("nothing-matches").is_empty());
        assert_eq!(tree.filter_by_search(""), tree);

        // Whitespace is matched literally
        assert_eq!(tree.filter_by_search("send ").get_node_count(), 1);
        assert!(tree.filter_by_search("email ").is_empty());
    }

    struct OnlyBranchA;

    impl ConnectionFilter for OnlyBranchA {
        fn is_valid_category_for_connection(&self, category_id: &str) -> bool {
            category_id != "branch-b"
        }

        fn can_node_connect(&self, _node: &NodeManifest) -> bool {
            true
        }
    }

    #[test]
    fn test_filter_by_connections() {
        let filtered = branching_tree().filter_by_connections(&OnlyBranchA);
        assert!(filtered.find_category("branch-a").is_some());
        assert!(filtered.find_category("branch-b").is_none());
        assert_eq!(filtered.get_node_count(), 1);
    }

    #[test]
    fn test_flatten_single_path_reroots_at_branch() {
        let flattened = branching_tree().flatten_single_path();

        assert_eq!(
            category_ids(flattened.get_root_categories()),
            vec!["branch-a", "branch-b"]
        );
        assert!(flattened.get_root_nodes().is_empty());
        assert!(flattened.find_category("root").is_none());
    }

    #[test]
    fn test_flatten_single_path_exposes_leaf_nodes() {
        let tree = CategoryTree::build(
            &[category("root", None, 0), category("leaf", Some("root"), 0)],
            &[node("n1", Some("leaf"), 0), node("n2", Some("leaf"), 1)],
        );
        let flattened = tree.flatten_single_path();

        assert!(flattened.get_root_categories().is_empty());
        assert_eq!(node_types(flattened.get_root_nodes()), vec!["n1", "n2"]);
    }

    #[test]
    fn test_flatten_single_path_noop_for_multiple_roots() {
        let tree = CategoryTree::build(
            &[category("a", None, 0), category("b", None, 1)],
            &[node("n1", Some("a"), 0), node("n2", Some("b"), 0)],
        );
        assert_eq!(tree.flatten_single_path(), tree);

        let with_root_node = CategoryTree::build(
            &[category("a", None, 0), category("inner", Some("a"), 0)],
            &[node("n1", Some("inner"), 0), node("loose", None, 0)],
        );
        assert_eq!(with_root_node.flatten_single_path(), with_root_node);
    }

    #[test]
    fn test_flatten_collects_everything() {
        let tree = CategoryTree::build(
            &[category("a", None, 0), category("b", Some("a"), 0)],
            &[
                node("deep", Some("b"), 3),
                node("shallow", Some("a"), 1),
                node("loose", None, 2),
            ],
        );
        let flat = tree.flatten();

        assert!(flat.get_root_categories().is_empty());
        assert_eq!(flat.get_category_count(), 0);
        assert_eq!(node_types(flat.get_root_nodes()), vec!["shallow", "loose", "deep"]);
    }

    #[test]
    fn test_all_accessors() {
        let tree = branching_tree();
        let ids: Vec<&str> = tree.get_all_categories().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["root", "middle", "branch-a", "branch-b"]);

        let types: Vec<&str> = tree
            .get_all_nodes()
            .iter()
            .map(|n| n.node_type.as_str())
            .collect();
        assert_eq!(types, vec!["a-node", "b-node"]);
        assert!(!tree.is_empty());
        assert!(CategoryTree::empty().is_empty());
    }
}
