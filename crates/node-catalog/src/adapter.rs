//! Conversion of category trees into generic nested list items
//!
//! The list item shape carries no UI-toolkit types; presentation code maps
//! it onto whatever menu or palette widget it renders.

use serde::{Deserialize, Serialize};

use crate::tree::{CategoryTree, CategoryTreeNode};
use crate::types::{CategoryId, NodeManifest};

/// Payload attached to a list item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ListItemData {
    #[serde(rename_all = "camelCase")]
    Category {
        color_dark: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tags: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Node {
        #[serde(rename = "type")]
        node_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<CategoryId>,
        version: String,
    },
}

/// A generic nested list entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub data: ListItemData,
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ListItem>>,
}

impl ListItem {
    pub fn is_node(&self) -> bool {
        matches!(self.data, ListItemData::Node { .. })
    }

    /// Count node items in this item and everything beneath it
    pub fn node_count(&self) -> usize {
        let own = usize::from(self.is_node());
        own + self
            .children
            .iter()
            .flatten()
            .map(ListItem::node_count)
            .sum::<usize>()
    }
}

/// Maps icon identifiers to whatever the presentation layer renders
pub trait IconResolver {
    fn resolve_icon(&self, icon: &str) -> String;
}

impl<F> IconResolver for F
where
    F: Fn(&str) -> String,
{
    fn resolve_icon(&self, icon: &str) -> String {
        self(icon)
    }
}

/// Stateless tree-to-list transform
#[derive(Default, Clone, Copy)]
pub struct CategoryTreeAdapter<'a> {
    icon_resolver: Option<&'a dyn IconResolver>,
}

impl<'a> CategoryTreeAdapter<'a> {
    /// Adapter that passes icon identifiers through unchanged
    pub fn new() -> Self {
        Self {
            icon_resolver: None,
        }
    }

    pub fn with_icon_resolver(icon_resolver: &'a dyn IconResolver) -> Self {
        Self {
            icon_resolver: Some(icon_resolver),
        }
    }

    /// Root categories (that end up with children) followed by root nodes
    pub fn to_list_items(&self, tree: &CategoryTree) -> Vec<ListItem> {
        let mut items: Vec<ListItem> = tree
            .get_root_categories()
            .iter()
            .filter_map(|c| self.category_item(c))
            .collect();
        items.extend(tree.get_root_nodes().iter().map(|n| self.node_item(n)));
        items
    }

    fn icon(&self, icon: &str) -> String {
        match self.icon_resolver {
            Some(resolver) => resolver.resolve_icon(icon),
            None => icon.to_string(),
        }
    }

    fn category_item(&self, node: &CategoryTreeNode) -> Option<ListItem> {
        let mut children: Vec<ListItem> = node
            .nested_categories
            .iter()
            .filter_map(|c| self.category_item(c))
            .collect();
        children.extend(node.nodes.iter().map(|n| self.node_item(n)));

        if children.is_empty() {
            return None;
        }

        let category = &node.category;
        Some(ListItem {
            id: category.id.clone(),
            name: category.name.clone(),
            description: None,
            data: ListItemData::Category {
                color_dark: category.color_dark.clone(),
                tags: category.tags.clone(),
            },
            icon: self.icon(&category.icon),
            color: (!category.color.is_empty()).then(|| category.color.clone()),
            children: Some(children),
        })
    }

    fn node_item(&self, node: &NodeManifest) -> ListItem {
        ListItem {
            id: node.node_type.clone(),
            name: node.display.label.clone(),
            description: node.display.description.clone(),
            data: ListItemData::Node {
                node_type: node.node_type.clone(),
                category: node.category.clone(),
                version: node.version.clone(),
            },
            icon: self.icon(node.display.icon.as_deref().unwrap_or_default()),
            color: node.display.color.clone(),
            children: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{CategoryBuilder, NodeManifestBuilder};

    fn sample_tree() -> CategoryTree {
        CategoryTree::build(
            &[
                CategoryBuilder::new("automation", "Automation")
                    .icon("bolt")
                    .colors("#f80", "#840")
                    .tag("io")
                    .build(),
                CategoryBuilder::new("automation.files", "Files")
                    .parent("automation")
                    .build(),
                CategoryBuilder::new("empty", "Empty").sort_order(1).build(),
            ],
            &[
                NodeManifestBuilder::new("read-file", "Read File")
                    .category("automation.files")
                    .icon("file")
                    .color("#0af")
                    .version("2.1.0")
                    .build(),
                NodeManifestBuilder::new("note", "Note").build(),
            ],
        )
    }

    #[test]
    fn test_to_list_items_structure() {
        let items = CategoryTreeAdapter::new().to_list_items(&sample_tree());

        // Empty category is skipped, root node comes after root categories
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "automation");
        assert_eq!(items[0].icon, "bolt");
        assert_eq!(items[0].color.as_deref(), Some("#f80"));
        assert_eq!(items[1].id, "note");
        assert!(items[1].children.is_none());

        let files = &items[0].children.as_ref().unwrap()[0];
        assert_eq!(files.name, "Files");
        assert_eq!(files.color, None);

        assert_eq!(
            items[0].data,
            ListItemData::Category {
                color_dark: "#840".to_string(),
                tags: vec!["io".to_string()],
            }
        );

        let read_file = &files.children.as_ref().unwrap()[0];
        assert_eq!(read_file.color.as_deref(), Some("#0af"));
        assert_eq!(
            read_file.data,
            ListItemData::Node {
                node_type: "read-file".to_string(),
                category: Some("automation.files".to_string()),
                version: "2.1.0".to_string(),
            }
        );
        assert_eq!(items[0].node_count(), 1);
    }

    #[test]
    fn test_icon_resolver() {
        let resolver = |icon: &str| format!("icon:{}", icon);
        let items =
            CategoryTreeAdapter::with_icon_resolver(&resolver).to_list_items(&sample_tree());

        assert_eq!(items[0].icon, "icon:bolt");
        assert_eq!(items[1].icon, "icon:");
    }

    #[test]
    fn test_list_item_serialization() {
        let items = CategoryTreeAdapter::new().to_list_items(&sample_tree());
        let json = serde_json::to_value(&items).unwrap();

        assert_eq!(json[0]["data"]["kind"], "category");
        assert_eq!(json[0]["data"]["colorDark"], "#840");
        assert_eq!(json[1]["data"]["type"], "note");
        assert!(json[1].get("children").is_none());
    }
}
