//! Fluent builders for catalog manifests
//!
//! Provides a compact API for assembling categories, node types, and
//! handles programmatically.
//!
//! # Example
//!
//! ```ignore
//! let manifest = ManifestBuilder::new("1.0")
//!     .category(CategoryBuilder::new("automation", "Automation").build())
//!     .node(
//!         NodeManifestBuilder::new("read-file", "Read File")
//!             .category("automation")
//!             .handle(HandleBuilder::target("in").build())
//!             .handle(HandleBuilder::source("out").default_for_type().build())
//!             .build(),
//!     )
//!     .build();
//! ```

use crate::types::{
    CategoryManifest, ConnectionConstraint, HandleGroup, HandleKind, HandleManifest,
    HandlePosition, HandleType, NodeDisplay, NodeManifest, NodeShape, Visibility,
    WorkflowManifest,
};

/// Fluent builder for a whole catalog
pub struct ManifestBuilder {
    manifest: WorkflowManifest,
}

impl ManifestBuilder {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            manifest: WorkflowManifest::new(version),
        }
    }

    /// Append a category
    pub fn category(mut self, category: CategoryManifest) -> Self {
        self.manifest.categories.push(category);
        self
    }

    /// Append a node type
    pub fn node(mut self, node: NodeManifest) -> Self {
        self.manifest.nodes.push(node);
        self
    }

    pub fn build(self) -> WorkflowManifest {
        self.manifest
    }
}

/// Fluent builder for a category
pub struct CategoryBuilder {
    category: CategoryManifest,
}

impl CategoryBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: CategoryManifest {
                id: id.into(),
                name: name.into(),
                parent_id: None,
                sort_order: 0,
                color: String::new(),
                color_dark: String::new(),
                icon: String::new(),
                tags: Vec::new(),
            },
        }
    }

    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.category.parent_id = Some(parent_id.into());
        self
    }

    pub fn sort_order(mut self, sort_order: i32) -> Self {
        self.category.sort_order = sort_order;
        self
    }

    /// Set light and dark theme colors
    pub fn colors(mut self, color: impl Into<String>, color_dark: impl Into<String>) -> Self {
        self.category.color = color.into();
        self.category.color_dark = color_dark.into();
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.category.icon = icon.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.category.tags.push(tag.into());
        self
    }

    pub fn build(self) -> CategoryManifest {
        self.category
    }
}

/// Fluent builder for a node type
///
/// Handles added with `handle` go into a group at the current position;
/// call `position` first to start a new group.
pub struct NodeManifestBuilder {
    node: NodeManifest,
}

impl NodeManifestBuilder {
    pub fn new(node_type: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            node: NodeManifest {
                node_type: node_type.into(),
                version: "1.0.0".to_string(),
                category: None,
                tags: Vec::new(),
                sort_order: 0,
                display: NodeDisplay {
                    label: label.into(),
                    ..Default::default()
                },
                handle_configuration: Vec::new(),
            },
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.node.version = version.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.node.category = Some(category.into());
        self
    }

    pub fn sort_order(mut self, sort_order: i32) -> Self {
        self.node.sort_order = sort_order;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.node.tags.push(tag.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.node.display.description = Some(description.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.node.display.icon = Some(icon.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.node.display.color = Some(color.into());
        self
    }

    pub fn shape(mut self, shape: NodeShape) -> Self {
        self.node.display.shape = shape;
        self
    }

    /// Start a new handle group at `position`
    pub fn position(mut self, position: HandlePosition) -> Self {
        self.node.handle_configuration.push(HandleGroup {
            position,
            handles: Vec::new(),
        });
        self
    }

    /// Add a handle to the current group
    pub fn handle(mut self, handle: HandleManifest) -> Self {
        if self.node.handle_configuration.is_empty() {
            self.node.handle_configuration.push(HandleGroup::default());
        }
        if let Some(group) = self.node.handle_configuration.last_mut() {
            group.handles.push(handle);
        }
        self
    }

    pub fn build(self) -> NodeManifest {
        self.node
    }
}

/// Fluent builder for a handle
pub struct HandleBuilder {
    handle: HandleManifest,
}

impl HandleBuilder {
    /// An output handle edges leave through
    pub fn source(id: impl Into<String>) -> Self {
        Self {
            handle: HandleManifest::new(id, HandleKind::Source, HandleType::Output),
        }
    }

    /// An input handle edges enter through
    pub fn target(id: impl Into<String>) -> Self {
        Self {
            handle: HandleManifest::new(id, HandleKind::Target, HandleType::Input),
        }
    }

    /// An artifact handle
    pub fn artifact(id: impl Into<String>, kind: HandleKind) -> Self {
        Self {
            handle: HandleManifest::new(id, kind, HandleType::Artifact),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.handle.label = Some(label.into());
        self
    }

    pub fn visible(mut self, visible: Visibility) -> Self {
        self.handle.visible = Some(visible);
        self
    }

    /// Repeat this handle once per element of the array at `path`
    pub fn repeat(mut self, path: impl Into<String>) -> Self {
        self.handle.repeat = Some(path.into());
        self
    }

    /// Override the `item`/`index` template variable names
    pub fn vars(mut self, item_var: impl Into<String>, index_var: impl Into<String>) -> Self {
        self.handle.item_var = Some(item_var.into());
        self.handle.index_var = Some(index_var.into());
        self
    }

    pub fn constraints(mut self, constraints: ConnectionConstraint) -> Self {
        self.handle.constraints = Some(constraints);
        self
    }

    pub fn default_for_type(mut self) -> Self {
        self.handle.is_default_for_type = true;
        self
    }

    pub fn build(self) -> HandleManifest {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_builder_groups_handles() {
        let node = NodeManifestBuilder::new("router", "Router")
            .handle(HandleBuilder::target("in").build())
            .position(HandlePosition::Right)
            .handle(HandleBuilder::source("a").build())
            .handle(HandleBuilder::source("b").default_for_type().build())
            .build();

        assert_eq!(node.handle_configuration.len(), 2);
        assert_eq!(node.handle_configuration[0].position, HandlePosition::Bottom);
        assert_eq!(node.handle_configuration[1].handles.len(), 2);
        assert_eq!(node.handles().count(), 3);
        assert!(node.handles().any(|h| h.is_default_for_type));
    }

    #[test]
    fn test_manifest_builder() {
        let manifest = ManifestBuilder::new("2")
            .category(
                CategoryBuilder::new("automation", "Automation")
                    .colors("#fff", "#000")
                    .icon("bolt")
                    .build(),
            )
            .node(NodeManifestBuilder::new("n", "N").category("automation").build())
            .build();

        assert_eq!(manifest.version, "2");
        assert_eq!(manifest.categories[0].color_dark, "#000");
        assert_eq!(manifest.nodes[0].category.as_deref(), Some("automation"));
    }
}
