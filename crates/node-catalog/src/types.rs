//! Core manifest types for the node catalog
//!
//! These types describe the declarative catalog supplied by the host:
//! categories, node types, their handles, and the connection constraints
//! attached to each handle. They carry no behavior of their own.

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// Unique identifier for a category
pub type CategoryId = String;

/// Node type identifier (e.g., "automation.read-file")
pub type NodeType = String;

/// Unique identifier for a handle within a node type
pub type HandleId = String;

fn is_false(value: &bool) -> bool {
    !*value
}

/// A complete catalog as supplied by the external loader
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowManifest {
    /// Catalog format version
    #[serde(default)]
    pub version: String,
    /// Flat list of categories
    #[serde(default)]
    pub categories: Vec<CategoryManifest>,
    /// Flat list of node types
    #[serde(default)]
    pub nodes: Vec<NodeManifest>,
}

impl WorkflowManifest {
    /// Create an empty manifest with the given version
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            categories: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Parse a manifest from its JSON document form
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(CatalogError::InvalidManifest(
                "manifest document must be a JSON object".to_string(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// A hierarchical grouping of node types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryManifest {
    /// Globally unique category id
    pub id: CategoryId,
    /// Display name
    pub name: String,
    /// Parent category, absent for root categories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CategoryId>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub color_dark: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Declarative description of a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeManifest {
    /// Unique type identifier
    pub node_type: NodeType,
    #[serde(default)]
    pub version: String,
    /// Owning category, absent for root-level nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub sort_order: i32,
    /// Default display configuration
    pub display: NodeDisplay,
    /// Handle declarations grouped by the side of the node they sit on
    #[serde(default)]
    pub handle_configuration: Vec<HandleGroup>,
}

impl NodeManifest {
    /// Iterate over every declared handle across all groups
    pub fn handles(&self) -> impl Iterator<Item = &HandleManifest> {
        self.handle_configuration.iter().flat_map(|g| g.handles.iter())
    }

    /// Check whether this node matches a lowercase search needle
    ///
    /// Matches against the label, type identifier, description, and tags.
    pub fn matches_search(&self, needle: &str) -> bool {
        if self.display.label.to_lowercase().contains(needle) {
            return true;
        }
        if self.node_type.to_lowercase().contains(needle) {
            return true;
        }
        if let Some(description) = &self.display.description {
            if description.to_lowercase().contains(needle) {
                return true;
            }
        }
        self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }
}

/// Shape used when drawing a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeShape {
    #[default]
    Rectangle,
    Square,
    Circle,
    Diamond,
}

/// Display configuration declared by a node manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDisplay {
    /// Human-readable label
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub shape: NodeShape,
}

/// Per-instance display overrides
///
/// Every present field replaces the manifest default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<NodeShape>,
}

/// Side of the node a handle group is attached to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlePosition {
    Top,
    Right,
    #[default]
    Bottom,
    Left,
}

/// A group of handles sharing a position
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleGroup {
    #[serde(default)]
    pub position: HandlePosition,
    #[serde(default)]
    pub handles: Vec<HandleManifest>,
}

/// Direction of a handle on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    /// Edges leave the node through this handle
    Source,
    /// Edges enter the node through this handle
    Target,
}

/// What flows through a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleType {
    Input,
    Output,
    /// Side-channel attachment that may pair with any other artifact
    Artifact,
}

/// Role a handle plays when pairing two endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleRole {
    Source,
    Target,
    Artifact,
}

/// Handle visibility: a literal flag or a dot-path into instance inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Visibility {
    Flag(bool),
    Path(String),
}

/// A single connection point declared on a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleManifest {
    /// Handle id, may contain `{item}`/`{index}` tokens when repeated
    pub id: HandleId,
    #[serde(rename = "type")]
    pub kind: HandleKind,
    pub handle_type: HandleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<Visibility>,
    /// Dot-path to an array in instance inputs; one handle per element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_var: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_var: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<ConnectionConstraint>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_default_for_type: bool,
}

impl HandleManifest {
    /// Create a handle with no label, constraints, or repetition
    pub fn new(id: impl Into<String>, kind: HandleKind, handle_type: HandleType) -> Self {
        Self {
            id: id.into(),
            kind,
            handle_type,
            label: None,
            visible: None,
            repeat: None,
            item_var: None,
            index_var: None,
            constraints: None,
            is_default_for_type: false,
        }
    }

    /// The role used for handle-type compatibility checks
    pub fn role(&self) -> HandleRole {
        match (self.handle_type, self.kind) {
            (HandleType::Artifact, _) => HandleRole::Artifact,
            (_, HandleKind::Source) => HandleRole::Source,
            (_, HandleKind::Target) => HandleRole::Target,
        }
    }
}

/// A node type (wildcard pattern) plus optional exact handle id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleTarget {
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle_id: Option<HandleId>,
}

impl HandleTarget {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            handle_id: None,
        }
    }

    pub fn with_handle(mut self, handle_id: impl Into<String>) -> Self {
        self.handle_id = Some(handle_id.into());
        self
    }
}

/// Allow/forbid rules attached to a handle
///
/// Target rules apply when this handle is the source of an edge; source
/// rules apply when it is the target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_connections: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_targets: Option<Vec<HandleTarget>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbidden_targets: Option<Vec<HandleTarget>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_sources: Option<Vec<HandleTarget>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbidden_sources: Option<Vec<HandleTarget>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_target_categories: Option<Vec<CategoryId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbidden_target_categories: Option<Vec<CategoryId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_source_categories: Option<Vec<CategoryId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbidden_source_categories: Option<Vec<CategoryId>>,
}
