//! Manifest registry: catalog ingestion, derived indices, and queries
//!
//! The registry owns the canonical `CategoryTree` and every lookup derived
//! from the registered catalog. All indices are rebuilt wholesale by
//! `register_manifest` and stay read-only until the next registration or
//! `clear()`.
//!
//! # Usage
//!
//! ```ignore
//! let mut registry = ManifestRegistry::new();
//! registry.register_manifest(manifest);
//!
//! // While the user drags a link out of an existing handle
//! let items = registry.get_node_options(&NodeOptionsQuery {
//!     connections: vec![preview],
//!     search: Some("email".to_string()),
//!     ..Default::default()
//! });
//! ```
//!
//! Registration takes `&mut self`, so concurrent readers behind a lock or
//! an `Arc` snapshot see either the old or the new catalog, never a mix.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapter::{CategoryTreeAdapter, ListItem};
use crate::constraints::{
    check_category_constraint, validate_connection, ConnectionContext, ConnectionNode,
    ConstraintViolation, ValidationResult,
};
use crate::diagnostics::CatalogDiagnostic;
use crate::error::{CatalogError, Result};
use crate::hierarchy::Hierarchy;
use crate::tree::{CategoryTree, ConnectionFilter};
use crate::types::{
    CategoryId, CategoryManifest, HandleKind, HandleManifest, NodeManifest, NodeType,
    WorkflowManifest,
};

/// A link the user is currently dragging out of an existing handle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewConnection {
    /// Instance id of the existing node on the canvas
    pub node_id: String,
    /// Resolved id of the existing handle
    pub handle_id: String,
    pub node_manifest: NodeManifest,
    pub handle_manifest: HandleManifest,
    /// Whether the node being added becomes the source of the edge
    pub add_new_node_as_source: bool,
}

/// Options for `ManifestRegistry::get_node_options`
///
/// Steps apply in a fixed order: category subtree, connection filter,
/// search, then flattening (`flatten_all` wins over `flatten_single_path`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOptionsQuery {
    #[serde(default)]
    pub connections: Vec<PreviewConnection>,
    #[serde(default)]
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub flatten_all: bool,
    #[serde(default)]
    pub flatten_single_path: bool,
}

/// Handles of one node type split by direction
#[derive(Debug, Clone, Default)]
struct NodeHandles {
    source: Vec<HandleManifest>,
    target: Vec<HandleManifest>,
}

impl NodeHandles {
    fn of_kind(&self, kind: HandleKind) -> &[HandleManifest] {
        match kind {
            HandleKind::Source => &self.source,
            HandleKind::Target => &self.target,
        }
    }
}

/// Everything derived from one registered catalog
#[derive(Debug)]
struct CatalogIndex {
    version: String,
    categories: HashMap<CategoryId, CategoryManifest>,
    nodes: HashMap<NodeType, Arc<NodeManifest>>,
    handles: HashMap<NodeType, NodeHandles>,
    children: HashMap<CategoryId, Vec<CategoryId>>,
    ancestors: HashMap<CategoryId, Vec<CategoryId>>,
    descendants: HashMap<CategoryId, Vec<CategoryId>>,
    nodes_by_category: HashMap<CategoryId, Vec<Arc<NodeManifest>>>,
    tree: CategoryTree,
    diagnostics: Vec<CatalogDiagnostic>,
}

impl CatalogIndex {
    fn build(manifest: WorkflowManifest) -> Self {
        let WorkflowManifest {
            version,
            categories,
            nodes,
        } = manifest;
        let nodes: Vec<Arc<NodeManifest>> = nodes.into_iter().map(Arc::new).collect();
        let mut hierarchy = Hierarchy::resolve(&categories, &nodes);

        let slot_ids: Vec<CategoryId> = hierarchy
            .categories
            .iter()
            .map(|c| c.id.clone())
            .collect();
        let to_ids = |slots: Vec<usize>| -> Vec<CategoryId> {
            slots.into_iter().map(|s| slot_ids[s].clone()).collect()
        };

        let mut category_map = HashMap::with_capacity(slot_ids.len());
        let mut children = HashMap::with_capacity(slot_ids.len());
        let mut ancestors = HashMap::with_capacity(slot_ids.len());
        let mut descendants = HashMap::with_capacity(slot_ids.len());
        for (slot, id) in slot_ids.iter().enumerate() {
            category_map.insert(id.clone(), hierarchy.categories[slot].clone());
            children.insert(id.clone(), to_ids(hierarchy.children[slot].clone()));
            ancestors.insert(id.clone(), to_ids(hierarchy.ancestors(slot)));
            descendants.insert(id.clone(), to_ids(hierarchy.descendants(slot)));
        }

        let mut node_map = HashMap::with_capacity(hierarchy.nodes.len());
        let mut handles: HashMap<NodeType, NodeHandles> =
            HashMap::with_capacity(hierarchy.nodes.len());
        let mut nodes_by_category: HashMap<CategoryId, Vec<Arc<NodeManifest>>> = HashMap::new();
        let mut handle_count = 0;
        for &(position, slot) in &hierarchy.nodes {
            let node = &nodes[position];
            node_map.insert(node.node_type.clone(), Arc::clone(node));

            let grouped = handles.entry(node.node_type.clone()).or_default();
            for handle in node.handles() {
                handle_count += 1;
                match handle.kind {
                    HandleKind::Source => grouped.source.push(handle.clone()),
                    HandleKind::Target => grouped.target.push(handle.clone()),
                }
            }

            if let Some(slot) = slot {
                nodes_by_category
                    .entry(slot_ids[slot].clone())
                    .or_default()
                    .push(Arc::clone(node));
            }
        }
        for list in nodes_by_category.values_mut() {
            list.sort_by_key(|n| n.sort_order);
        }

        let tree = CategoryTree::from_hierarchy(&hierarchy, &nodes);
        let diagnostics = std::mem::take(&mut hierarchy.diagnostics);

        log::debug!(
            "Registered manifest v{}: {} categories, {} nodes, {} handles, {} diagnostics",
            version,
            category_map.len(),
            node_map.len(),
            handle_count,
            diagnostics.len()
        );

        Self {
            version,
            categories: category_map,
            nodes: node_map,
            handles,
            children,
            ancestors,
            descendants,
            nodes_by_category,
            tree,
            diagnostics,
        }
    }
}

/// Registry of the current node catalog
///
/// This is the central query surface for "what can I add here" decisions:
/// 1. Direct lookups of categories, node types, and handles
/// 2. Precomputed ancestor/descendant chains for hierarchy checks
/// 3. Connection-aware filtering of the category tree
#[derive(Debug, Default)]
pub struct ManifestRegistry {
    index: Option<CatalogIndex>,
}

impl ManifestRegistry {
    /// Create a registry with no catalog
    pub fn new() -> Self {
        Self { index: None }
    }

    /// Create a registry and register `manifest`
    pub fn with_manifest(manifest: WorkflowManifest) -> Self {
        let mut registry = Self::new();
        registry.register_manifest(manifest);
        registry
    }

    /// Replace the registered catalog, rebuilding every index
    pub fn register_manifest(&mut self, manifest: WorkflowManifest) {
        self.index = Some(CatalogIndex::build(manifest));
    }

    /// Parse and register a manifest JSON document
    ///
    /// On error the previous catalog stays registered.
    pub fn register_manifest_json(&mut self, json: &str) -> Result<()> {
        let manifest = WorkflowManifest::from_json(json)?;
        self.register_manifest(manifest);
        Ok(())
    }

    /// Drop the registered catalog and every derived index
    pub fn clear(&mut self) {
        self.index = None;
    }

    pub fn has_manifest(&self) -> bool {
        self.index.is_some()
    }

    /// Version string of the registered catalog
    pub fn manifest_version(&self) -> Option<&str> {
        self.index.as_ref().map(|i| i.version.as_str())
    }

    /// The canonical category tree
    pub fn tree(&self) -> Result<&CategoryTree> {
        self.index
            .as_ref()
            .map(|i| &i.tree)
            .ok_or(CatalogError::NotRegistered)
    }

    /// Repairs applied while ingesting the registered catalog
    pub fn diagnostics(&self) -> &[CatalogDiagnostic] {
        self.index.as_ref().map_or(&[], |i| &i.diagnostics)
    }

    pub fn get_category(&self, id: &str) -> Option<&CategoryManifest> {
        self.index.as_ref()?.categories.get(id)
    }

    pub fn get_node_manifest(&self, node_type: &str) -> Option<&NodeManifest> {
        self.index
            .as_ref()?
            .nodes
            .get(node_type)
            .map(|n| n.as_ref())
    }

    /// All node types in the registry
    pub fn node_types(&self) -> Vec<&str> {
        self.index
            .as_ref()
            .map(|i| i.nodes.keys().map(|k| k.as_str()).collect())
            .unwrap_or_default()
    }

    /// Handles of `node_type` with the given direction, in declaration order
    pub fn get_handles(&self, node_type: &str, kind: HandleKind) -> &[HandleManifest] {
        self.index
            .as_ref()
            .and_then(|i| i.handles.get(node_type))
            .map_or(&[], |h| h.of_kind(kind))
    }

    /// The handle a new node of `node_type` connects through by default
    ///
    /// The first handle flagged `is_default_for_type`, else the first
    /// declared handle of that direction.
    pub fn get_default_handle(&self, node_type: &str, kind: HandleKind) -> Option<&HandleManifest> {
        let handles = self.get_handles(node_type, kind);
        handles
            .iter()
            .find(|h| h.is_default_for_type)
            .or_else(|| handles.first())
    }

    /// Direct child category ids
    pub fn get_category_children(&self, id: &str) -> &[CategoryId] {
        self.index
            .as_ref()
            .and_then(|i| i.children.get(id))
            .map_or(&[], |c| c.as_slice())
    }

    /// Ancestor ids from the root down to the direct parent, excluding `id`
    pub fn get_category_ancestors(&self, id: &str) -> &[CategoryId] {
        self.index
            .as_ref()
            .and_then(|i| i.ancestors.get(id))
            .map_or(&[], |a| a.as_slice())
    }

    /// Every transitive child id, breadth-first, excluding `id`
    pub fn get_category_descendants(&self, id: &str) -> &[CategoryId] {
        self.index
            .as_ref()
            .and_then(|i| i.descendants.get(id))
            .map_or(&[], |d| d.as_slice())
    }

    /// Whether `id` sits anywhere beneath `ancestor_id`
    pub fn is_category_descendant(&self, id: &str, ancestor_id: &str) -> bool {
        self.get_category_ancestors(id)
            .iter()
            .any(|a| a == ancestor_id)
    }

    /// Breadcrumb path from the root category down to `id` itself
    pub fn get_category_path(&self, id: &str) -> Vec<&CategoryManifest> {
        let Some(category) = self.get_category(id) else {
            return Vec::new();
        };
        self.get_category_ancestors(id)
            .iter()
            .filter_map(|a| self.get_category(a))
            .chain(std::iter::once(category))
            .collect()
    }

    /// Nodes declared directly in category `id`, sorted by `sort_order`
    pub fn get_nodes_in_category(&self, id: &str) -> &[Arc<NodeManifest>] {
        self.index
            .as_ref()
            .and_then(|i| i.nodes_by_category.get(id))
            .map_or(&[], |n| n.as_slice())
    }

    /// Whether a node from category `category_id` (or any of its
    /// descendants) satisfies the category rules of every pending connection
    ///
    /// A parent category stays eligible purely because a child qualifies.
    pub fn is_valid_category_for_connection(
        &self,
        category_id: &str,
        connections: &[PreviewConnection],
    ) -> bool {
        if connections.is_empty() {
            return true;
        }

        let passes_all = |candidate: &str| {
            connections
                .iter()
                .all(|connection| category_satisfies(candidate, connection))
        };

        passes_all(category_id)
            || self
                .get_category_descendants(category_id)
                .iter()
                .any(|d| passes_all(d))
    }

    /// Whether a new node of `node_type` may join every pending connection
    ///
    /// Unknown node types are never valid.
    pub fn is_valid_node_for_connection(
        &self,
        node_type: &str,
        connections: &[PreviewConnection],
    ) -> bool {
        if connections.is_empty() {
            return true;
        }
        if self.get_node_manifest(node_type).is_none() {
            return false;
        }
        connections
            .iter()
            .all(|c| self.validate_preview_connection(node_type, c).valid)
    }

    /// Full constraint verdict for adding `node_type` to one pending
    /// connection, through its default handle of the needed direction
    pub fn validate_preview_connection(
        &self,
        node_type: &str,
        connection: &PreviewConnection,
    ) -> ValidationResult {
        let Some(new_node) = self.get_node_manifest(node_type) else {
            return ValidationResult::rejected(ConstraintViolation::NoCompatibleHandle {
                node_type: node_type.to_string(),
                handle_kind: needed_kind(connection),
            });
        };
        let kind = needed_kind(connection);
        let Some(new_handle) = self.get_default_handle(node_type, kind) else {
            return ValidationResult::rejected(ConstraintViolation::NoCompatibleHandle {
                node_type: node_type.to_string(),
                handle_kind: kind,
            });
        };

        let new_endpoint = ConnectionNode::new(&new_node.node_type, new_node.category.as_deref());
        let existing_endpoint = ConnectionNode::new(
            &connection.node_manifest.node_type,
            connection.node_manifest.category.as_deref(),
        );

        let context = if connection.add_new_node_as_source {
            ConnectionContext {
                source_node: new_endpoint,
                source_handle: new_handle,
                target_node: existing_endpoint,
                target_handle: &connection.handle_manifest,
            }
        } else {
            ConnectionContext {
                source_node: existing_endpoint,
                source_handle: &connection.handle_manifest,
                target_node: new_endpoint,
                target_handle: new_handle,
            }
        };

        validate_connection(&context)
    }

    /// Node palette entries for the current interaction
    ///
    /// Returns an empty list if no catalog is registered.
    pub fn get_node_options(&self, query: &NodeOptionsQuery) -> Vec<ListItem> {
        self.get_node_options_with(query, &CategoryTreeAdapter::new())
    }

    /// `get_node_options` with a caller-supplied adapter (e.g. one carrying
    /// an icon resolver)
    pub fn get_node_options_with(
        &self,
        query: &NodeOptionsQuery,
        adapter: &CategoryTreeAdapter<'_>,
    ) -> Vec<ListItem> {
        match self.option_tree(query) {
            Some(tree) => adapter.to_list_items(&tree),
            None => Vec::new(),
        }
    }

    /// The filtered tree behind `get_node_options`
    pub fn option_tree(&self, query: &NodeOptionsQuery) -> Option<CategoryTree> {
        let index = self.index.as_ref()?;

        let mut tree = match query.category.as_deref() {
            Some(category) => index.tree.get_subtree(category),
            None => index.tree.clone(),
        };

        if !query.connections.is_empty() {
            tree = tree.filter_by_connections(&PreviewFilter {
                registry: self,
                connections: &query.connections,
            });
        }
        if let Some(search) = query.search.as_deref() {
            tree = tree.filter_by_search(search);
        }
        if query.flatten_all {
            tree = tree.flatten();
        } else if query.flatten_single_path {
            tree = tree.flatten_single_path();
        }

        log::debug!(
            "Node options: {} nodes in {} categories ({} pending connections)",
            tree.get_node_count(),
            tree.get_category_count(),
            query.connections.len()
        );
        Some(tree)
    }
}

/// Direction the new node's handle needs for `connection`
fn needed_kind(connection: &PreviewConnection) -> HandleKind {
    if connection.add_new_node_as_source {
        HandleKind::Source
    } else {
        HandleKind::Target
    }
}

/// Category rule of the existing handle, read from the new node's side
fn category_satisfies(category_id: &str, connection: &PreviewConnection) -> bool {
    let Some(constraints) = &connection.handle_manifest.constraints else {
        return true;
    };
    let (allowed, forbidden) = if connection.add_new_node_as_source {
        (
            &constraints.allowed_source_categories,
            &constraints.forbidden_source_categories,
        )
    } else {
        (
            &constraints.allowed_target_categories,
            &constraints.forbidden_target_categories,
        )
    };
    check_category_constraint(Some(category_id), allowed.as_deref(), forbidden.as_deref())
}

/// Binds a registry to the pending connections for tree filtering
struct PreviewFilter<'a> {
    registry: &'a ManifestRegistry,
    connections: &'a [PreviewConnection],
}

impl ConnectionFilter for PreviewFilter<'_> {
    fn is_valid_category_for_connection(&self, category_id: &str) -> bool {
        self.registry
            .is_valid_category_for_connection(category_id, self.connections)
    }

    fn can_node_connect(&self, node: &NodeManifest) -> bool {
        self.registry
            .is_valid_node_for_connection(&node.node_type, self.connections)
    }
}
