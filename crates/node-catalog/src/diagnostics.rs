//! Non-fatal catalog diagnostics
//!
//! Malformed hierarchy references never drop data. Unresolved parents and
//! categories are promoted to root and parent cycles are broken; each such
//! repair is reported here so hosts can surface it.

use serde::{Deserialize, Serialize};

use crate::hierarchy::Hierarchy;
use crate::types::{CategoryId, NodeType, WorkflowManifest};

/// A repair applied while ingesting a catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CatalogDiagnostic {
    /// Category parent does not exist; category treated as root
    #[serde(rename_all = "camelCase")]
    OrphanCategory {
        category_id: CategoryId,
        parent_id: CategoryId,
    },
    /// Node category does not exist; node treated as root-level
    #[serde(rename_all = "camelCase")]
    OrphanNode {
        node_type: NodeType,
        category_id: CategoryId,
    },
    /// Category sits on a parent cycle; promoted to root to break it
    #[serde(rename_all = "camelCase")]
    ParentCycle { category_id: CategoryId },
    /// A later category reused an id; the first definition is kept
    #[serde(rename_all = "camelCase")]
    DuplicateCategoryId { category_id: CategoryId },
    /// A later node reused a type; the first definition is kept
    #[serde(rename_all = "camelCase")]
    DuplicateNodeType { node_type: NodeType },
}

impl std::fmt::Display for CatalogDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrphanCategory {
                category_id,
                parent_id,
            } => {
                write!(
                    f,
                    "Category '{}' references unknown parent '{}'; treating as root",
                    category_id, parent_id
                )
            }
            Self::OrphanNode {
                node_type,
                category_id,
            } => {
                write!(
                    f,
                    "Node '{}' references unknown category '{}'; treating as root-level",
                    node_type, category_id
                )
            }
            Self::ParentCycle { category_id } => {
                write!(
                    f,
                    "Category '{}' is part of a parent cycle; treating as root",
                    category_id
                )
            }
            Self::DuplicateCategoryId { category_id } => {
                write!(f, "Duplicate category id '{}' ignored", category_id)
            }
            Self::DuplicateNodeType { node_type } => {
                write!(f, "Duplicate node type '{}' ignored", node_type)
            }
        }
    }
}

/// Collect every repair that ingesting `manifest` would apply
pub fn diagnose_manifest(manifest: &WorkflowManifest) -> Vec<CatalogDiagnostic> {
    Hierarchy::resolve(&manifest.categories, &manifest.nodes).diagnostics
}
