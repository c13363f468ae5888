//! Node Catalog - Manifest-driven node palette and connection rules
//!
//! This crate turns a declarative catalog of node types and categories into
//! the answers a node-graph editor needs while the user builds a workflow:
//!
//! - A navigable, immutable category tree with search and flattening
//! - Connection constraints with wildcard node-type patterns
//! - "What can I add here" queries for an in-progress connection
//! - Per-instance handle expansion (visibility, repetition, templates)
//!
//! # Architecture
//!
//! - `ManifestRegistry`: Owns the registered catalog and its derived indices
//! - `CategoryTree`: Structurally shared tree views, filtered copy-on-write
//! - `constraints`: Pure validation of a proposed source/target pairing
//! - `ManifestResolver`: Instance-time display and handle resolution
//!
//! # Example
//!
//! ```ignore
//! use node_catalog::{ManifestRegistry, NodeOptionsQuery, WorkflowManifest};
//!
//! let mut registry = ManifestRegistry::new();
//! registry.register_manifest(WorkflowManifest::from_json(json)?);
//!
//! let items = registry.get_node_options(&NodeOptionsQuery {
//!     search: Some("email".to_string()),
//!     ..Default::default()
//! });
//! ```

pub mod adapter;
pub mod builder;
pub mod constraints;
pub mod diagnostics;
pub mod error;
mod hierarchy;
pub mod registry;
pub mod resolver;
pub mod tree;
pub mod types;

// Re-export key types
pub use adapter::{CategoryTreeAdapter, IconResolver, ListItem, ListItemData};
pub use builder::{CategoryBuilder, HandleBuilder, ManifestBuilder, NodeManifestBuilder};
pub use constraints::{
    can_accept_more_connections, check_category_constraint, matches_type_pattern,
    meets_minimum_connections, validate_connection, ConnectionContext, ConnectionNode,
    ConstraintViolation, TypePattern, ValidationResult,
};
pub use diagnostics::{diagnose_manifest, CatalogDiagnostic};
pub use error::{CatalogError, Result};
pub use registry::{ManifestRegistry, NodeOptionsQuery, PreviewConnection};
pub use resolver::{
    HandleResolution, ManifestResolver, ResolveContext, ResolveDiagnostic, ResolvedHandle,
    ResolvedHandleGroup, ResolvedNode, ViewState,
};
pub use tree::{CategoryTree, CategoryTreeNode, ConnectionFilter, TreeFilter};
pub use types::*;
