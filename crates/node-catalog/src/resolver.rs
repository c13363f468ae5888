//! Per-instance resolution of display and handle declarations
//!
//! Rendering code calls into this module once per node instance to turn the
//! static manifest into concrete labels, shapes, and connection points:
//! - display defaults merged with instance overrides
//! - visibility expressions evaluated against instance inputs
//! - `repeat` handles expanded once per array element
//! - `{dotted.path}` template tokens substituted
//!
//! Nothing here fails. Unresolvable data degrades to hidden handles, zero
//! repeated handles, or verbatim template text.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{
    ConnectionConstraint, DisplayOverrides, HandleGroup, HandleId, HandleKind, HandleManifest,
    HandlePosition, HandleType, NodeDisplay, NodeManifest, NodeShape, NodeType, Visibility,
};

const DEFAULT_ITEM_VAR: &str = "item";
const DEFAULT_INDEX_VAR: &str = "index";

/// Instance data a node is resolved against
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveContext {
    /// The node instance's input values
    #[serde(default)]
    pub inputs: Value,
    /// Whether the editor currently shows this node collapsed
    #[serde(default)]
    pub collapsed: bool,
}

impl ResolveContext {
    pub fn new(inputs: Value) -> Self {
        Self {
            inputs,
            collapsed: false,
        }
    }

    pub fn collapsed(mut self, collapsed: bool) -> Self {
        self.collapsed = collapsed;
        self
    }
}

/// Per-editor UI state that affects resolution
///
/// Owned by whoever owns the editor view and passed in explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    #[serde(default)]
    pub collapsed_nodes: HashSet<String>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_collapsed(&self, node_id: &str) -> bool {
        self.collapsed_nodes.contains(node_id)
    }

    pub fn set_collapsed(&mut self, node_id: impl Into<String>, collapsed: bool) {
        let node_id = node_id.into();
        if collapsed {
            self.collapsed_nodes.insert(node_id);
        } else {
            self.collapsed_nodes.remove(&node_id);
        }
    }

    /// Flip the collapsed flag, returning the new state
    pub fn toggle(&mut self, node_id: &str) -> bool {
        if self.collapsed_nodes.remove(node_id) {
            false
        } else {
            self.collapsed_nodes.insert(node_id.to_string());
            true
        }
    }

    /// Build the resolve context for one node instance
    pub fn context_for(&self, node_id: &str, inputs: Value) -> ResolveContext {
        ResolveContext::new(inputs).collapsed(self.is_collapsed(node_id))
    }
}

/// Non-fatal problem found while resolving an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ResolveDiagnostic {
    /// A `repeat` path did not lead to an array
    #[serde(rename_all = "camelCase")]
    RepeatNotArray { handle_id: HandleId, path: String },
}

impl std::fmt::Display for ResolveDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RepeatNotArray { handle_id, path } => write!(
                f,
                "Handle '{}' repeats over '{}', which is not an array; no handles emitted",
                handle_id, path
            ),
        }
    }
}

/// A concrete connection point for one node instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedHandle {
    pub id: HandleId,
    #[serde(rename = "type")]
    pub kind: HandleKind,
    pub handle_type: HandleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<ConnectionConstraint>,
    #[serde(default)]
    pub is_default_for_type: bool,
    /// Array element this handle was expanded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_index: Option<usize>,
}

impl ResolvedHandle {
    fn from_manifest(handle: &HandleManifest, inputs: &Value) -> Self {
        Self {
            id: handle.id.clone(),
            kind: handle.kind,
            handle_type: handle.handle_type,
            label: handle.label.clone(),
            visible: ManifestResolver::resolve_visibility(handle.visible.as_ref(), inputs),
            constraints: handle.constraints.clone(),
            is_default_for_type: handle.is_default_for_type,
            repeat_index: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedHandleGroup {
    pub position: HandlePosition,
    pub handles: Vec<ResolvedHandle>,
}

/// Output of `ManifestResolver::resolve_handles`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleResolution {
    pub groups: Vec<ResolvedHandleGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<ResolveDiagnostic>,
}

impl HandleResolution {
    /// Every resolved handle across all groups
    pub fn handles(&self) -> impl Iterator<Item = &ResolvedHandle> {
        self.groups.iter().flat_map(|g| g.handles.iter())
    }

    pub fn find(&self, id: &str) -> Option<&ResolvedHandle> {
        self.handles().find(|h| h.id == id)
    }
}

/// Everything rendering code needs for one node instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedNode {
    pub node_type: NodeType,
    pub display: NodeDisplay,
    pub handle_groups: Vec<ResolvedHandleGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<ResolveDiagnostic>,
}

/// Resolves manifest templates against instance data
pub struct ManifestResolver;

impl ManifestResolver {
    /// Resolve display and handles for one node instance
    pub fn resolve_node(
        manifest: &NodeManifest,
        overrides: Option<&DisplayOverrides>,
        context: &ResolveContext,
    ) -> ResolvedNode {
        let display = Self::resolve_display(&manifest.display, overrides, context.collapsed);
        let HandleResolution {
            groups,
            diagnostics,
        } = Self::resolve_handles(&manifest.handle_configuration, context);

        ResolvedNode {
            node_type: manifest.node_type.clone(),
            display,
            handle_groups: groups,
            diagnostics,
        }
    }

    /// Merge instance overrides over manifest defaults, field by field
    ///
    /// Collapsed rectangles render as squares; other shapes are unaffected.
    pub fn resolve_display(
        defaults: &NodeDisplay,
        overrides: Option<&DisplayOverrides>,
        collapsed: bool,
    ) -> NodeDisplay {
        let mut display = defaults.clone();
        if let Some(overrides) = overrides {
            if let Some(label) = &overrides.label {
                display.label = label.clone();
            }
            if overrides.subtitle.is_some() {
                display.subtitle = overrides.subtitle.clone();
            }
            if overrides.description.is_some() {
                display.description = overrides.description.clone();
            }
            if overrides.icon.is_some() {
                display.icon = overrides.icon.clone();
            }
            if overrides.color.is_some() {
                display.color = overrides.color.clone();
            }
            if let Some(shape) = overrides.shape {
                display.shape = shape;
            }
        }

        if collapsed && display.shape == NodeShape::Rectangle {
            display.shape = NodeShape::Square;
        }
        display
    }

    /// Evaluate a visibility expression
    ///
    /// Absent means visible. A path is looked up in `inputs` and coerced to
    /// a boolean; a missing value is hidden.
    pub fn resolve_visibility(visible: Option<&Visibility>, inputs: &Value) -> bool {
        match visible {
            None => true,
            Some(Visibility::Flag(flag)) => *flag,
            Some(Visibility::Path(path)) => get_by_path(inputs, path).is_some_and(is_truthy),
        }
    }

    /// Expand every handle group for the given instance
    pub fn resolve_handles(groups: &[HandleGroup], context: &ResolveContext) -> HandleResolution {
        let mut diagnostics = Vec::new();
        let groups = groups
            .iter()
            .map(|group| {
                let mut handles = Vec::with_capacity(group.handles.len());
                for handle in &group.handles {
                    match &handle.repeat {
                        Some(path) => expand_repeat(
                            handle,
                            path,
                            &context.inputs,
                            &mut handles,
                            &mut diagnostics,
                        ),
                        None => {
                            handles.push(ResolvedHandle::from_manifest(handle, &context.inputs))
                        }
                    }
                }
                ResolvedHandleGroup {
                    position: group.position,
                    handles,
                }
            })
            .collect();

        HandleResolution {
            groups,
            diagnostics,
        }
    }

    /// Replace each `{dotted.path}` token with the value found in `vars`
    ///
    /// Strings are inserted as-is, other values as JSON text. Tokens that do
    /// not resolve (or resolve to null) stay in the output unchanged.
    pub fn replace_template_vars(template: &str, vars: &Value) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            let Some(close) = after.find('}') else {
                out.push_str(&rest[open..]);
                return out;
            };
            let token = &after[..close];

            // A nested '{' means this brace is literal; rescan from the next one
            if token.contains('{') {
                out.push('{');
                rest = after;
                continue;
            }

            match get_by_path(vars, token.trim()) {
                Some(Value::String(s)) => out.push_str(s),
                Some(Value::Null) | None => {
                    out.push('{');
                    out.push_str(token);
                    out.push('}');
                }
                Some(other) => out.push_str(&other.to_string()),
            }
            rest = &after[close + 1..];
        }

        out.push_str(rest);
        out
    }
}

fn expand_repeat(
    handle: &HandleManifest,
    path: &str,
    inputs: &Value,
    out: &mut Vec<ResolvedHandle>,
    diagnostics: &mut Vec<ResolveDiagnostic>,
) {
    let Some(Value::Array(items)) = get_by_path(inputs, path) else {
        let diagnostic = ResolveDiagnostic::RepeatNotArray {
            handle_id: handle.id.clone(),
            path: path.to_string(),
        };
        log::warn!("{}", diagnostic);
        diagnostics.push(diagnostic);
        return;
    };

    let item_var = handle.item_var.as_deref().unwrap_or(DEFAULT_ITEM_VAR);
    let index_var = handle.index_var.as_deref().unwrap_or(DEFAULT_INDEX_VAR);

    for (index, item) in items.iter().enumerate() {
        let mut vars = Map::with_capacity(2);
        vars.insert(item_var.to_string(), item.clone());
        vars.insert(index_var.to_string(), Value::from(index));
        let vars = Value::Object(vars);

        let mut resolved = ResolvedHandle::from_manifest(handle, inputs);
        resolved.id = ManifestResolver::replace_template_vars(&handle.id, &vars);
        resolved.label = handle
            .label
            .as_deref()
            .map(|label| ManifestResolver::replace_template_vars(label, &vars));
        resolved.repeat_index = Some(index);
        out.push(resolved);
    }
}

/// Look up a dot-separated path; numeric segments index into arrays
pub fn get_by_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Loose truthiness: null, false, zero, and empty strings are false
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{HandleBuilder, NodeManifestBuilder};
    use serde_json::json;

    #[test]
    fn test_resolve_display_merges_overrides() {
        let defaults = NodeDisplay {
            label: "Read File".to_string(),
            icon: Some("file".to_string()),
            color: Some("#fff".to_string()),
            ..Default::default()
        };
        let overrides = DisplayOverrides {
            label: Some("Load config".to_string()),
            color: Some("#000".to_string()),
            ..Default::default()
        };

        let display = ManifestResolver::resolve_display(&defaults, Some(&overrides), false);
        assert_eq!(display.label, "Load config");
        assert_eq!(display.color.as_deref(), Some("#000"));
        assert_eq!(display.icon.as_deref(), Some("file"));
        assert_eq!(display.shape, NodeShape::Rectangle);

        assert_eq!(ManifestResolver::resolve_display(&defaults, None, false), defaults);
    }

    #[test]
    fn test_collapsed_maps_only_rectangle() {
        let rectangle = NodeDisplay::default();
        let collapsed = ManifestResolver::resolve_display(&rectangle, None, true);
        assert_eq!(collapsed.shape, NodeShape::Square);

        let circle = NodeManifestBuilder::new("merge", "Merge")
            .shape(NodeShape::Circle)
            .build();
        let collapsed = ManifestResolver::resolve_display(&circle.display, None, true);
        assert_eq!(collapsed.shape, NodeShape::Circle);
    }

    #[test]
    fn test_resolve_visibility() {
        let inputs = json!({
            "options": {"showOutput": true, "count": 0, "name": "", "tags": []},
        });
        let path = |p: &str| Visibility::Path(p.to_string());

        assert!(ManifestResolver::resolve_visibility(None, &inputs));
        assert!(!ManifestResolver::resolve_visibility(Some(&Visibility::Flag(false)), &inputs));
        assert!(ManifestResolver::resolve_visibility(Some(&path("options.showOutput")), &inputs));
        assert!(!ManifestResolver::resolve_visibility(Some(&path("options.count")), &inputs));
        assert!(!ManifestResolver::resolve_visibility(Some(&path("options.name")), &inputs));
        assert!(ManifestResolver::resolve_visibility(Some(&path("options.tags")), &inputs));
        assert!(!ManifestResolver::resolve_visibility(Some(&path("options.missing")), &inputs));
    }

    #[test]
    fn test_replace_template_vars() {
        let vars = json!({"item": {"name": "alpha", "size": 3}, "index": 2});

        assert_eq!(
            ManifestResolver::replace_template_vars("out-{index}-{item.name}", &vars),
            "out-2-alpha"
        );
        assert_eq!(
            ManifestResolver::replace_template_vars("{item.size}x", &vars),
            "3x"
        );
        // Unknown tokens are kept verbatim
        assert_eq!(
            ManifestResolver::replace_template_vars("{unknown} and {item.name}", &vars),
            "{unknown} and alpha"
        );
        assert_eq!(
            ManifestResolver::replace_template_vars("{{index}} {open", &vars),
            "{2} {open"
        );
        assert_eq!(ManifestResolver::replace_template_vars("plain", &vars), "plain");
    }

    #[test]
    fn test_get_by_path() {
        let value = json!({"a": {"b": [10, {"c": "deep"}]}});
        assert_eq!(get_by_path(&value, "a.b.0"), Some(&json!(10)));
        assert_eq!(get_by_path(&value, "a.b.1.c"), Some(&json!("deep")));
        assert_eq!(get_by_path(&value, "a.x"), None);
        assert_eq!(get_by_path(&value, ""), None);
    }

    fn router() -> NodeManifest {
        NodeManifestBuilder::new("router", "Router")
            .handle(HandleBuilder::target("in").build())
            .position(HandlePosition::Right)
            .handle(
                HandleBuilder::source("route-{index}")
                    .label("Route {item.name}")
                    .repeat("routes")
                    .build(),
            )
            .handle(
                HandleBuilder::source("fallback")
                    .visible(Visibility::Path("useFallback".to_string()))
                    .build(),
            )
            .build()
    }

    #[test]
    fn test_resolve_handles_expands_repeat() {
        let context = ResolveContext::new(json!({
            "routes": [{"name": "alpha"}, {"name": "beta"}],
            "useFallback": false,
        }));
        let resolution =
            ManifestResolver::resolve_handles(&router().handle_configuration, &context);

        assert!(resolution.diagnostics.is_empty());
        assert_eq!(resolution.groups.len(), 2);
        assert_eq!(resolution.groups[0].handles.len(), 1);

        let right = &resolution.groups[1];
        assert_eq!(right.position, HandlePosition::Right);
        let ids: Vec<&str> = right.handles.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["route-0", "route-1", "fallback"]);
        assert_eq!(right.handles[1].label.as_deref(), Some("Route beta"));
        assert_eq!(right.handles[1].repeat_index, Some(1));
        assert!(!resolution.find("fallback").unwrap().visible);
    }

    #[test]
    fn test_repeat_over_non_array_emits_nothing() {
        let context = ResolveContext::new(json!({"routes": "alpha"}));
        let resolution =
            ManifestResolver::resolve_handles(&router().handle_configuration, &context);

        assert_eq!(resolution.handles().count(), 2);
        assert_eq!(
            resolution.diagnostics,
            vec![ResolveDiagnostic::RepeatNotArray {
                handle_id: "route-{index}".to_string(),
                path: "routes".to_string(),
            }]
        );
    }

    #[test]
    fn test_custom_repeat_vars() {
        let node = NodeManifestBuilder::new("fan", "Fan")
            .handle(
                HandleBuilder::source("{i}-{port}")
                    .repeat("ports")
                    .vars("port", "i")
                    .build(),
            )
            .build();
        let context = ResolveContext::new(json!({"ports": ["a", "b"]}));
        let resolution = ManifestResolver::resolve_handles(&node.handle_configuration, &context);

        let ids: Vec<&str> = resolution.handles().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["0-a", "1-b"]);
    }

    #[test]
    fn test_resolve_node_with_view_state() {
        let mut view = ViewState::new();
        assert!(view.toggle("router-1"));
        let context = view.context_for("router-1", json!({"routes": []}));
        assert!(context.collapsed);

        let node = ManifestResolver::resolve_node(&router(), None, &context);
        assert_eq!(node.node_type, "router");
        assert_eq!(node.display.shape, NodeShape::Square);
        assert_eq!(node.handle_groups[1].handles.len(), 1);

        view.set_collapsed("router-1", false);
        assert!(!view.is_collapsed("router-1"));
    }

    #[test]
    fn test_resolve_context_deserialization() {
        let context: ResolveContext =
            serde_json::from_value(json!({"inputs": {"a": 1}, "collapsed": true})).unwrap();
        assert!(context.collapsed);
        assert_eq!(context.inputs["a"], 1);

        let context: ResolveContext = serde_json::from_value(json!({})).unwrap();
        assert_eq!(context, ResolveContext::default());
    }
}
