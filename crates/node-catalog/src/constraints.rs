//! Connection constraint evaluation
//!
//! Pure functions deciding whether a proposed edge between two typed
//! endpoints is allowed, given the allow/forbid rules declared on each
//! endpoint's handle. Checks run in a fixed order and stop at the first
//! failure:
//!
//! 1. Handle-role compatibility (source/source and target/target are
//!    rejected unless an artifact handle is involved)
//! 2. The source handle's target rules (node type, then category)
//! 3. The target handle's source rules (node type, then category)

use serde::{Deserialize, Serialize};

use crate::types::{CategoryId, HandleKind, HandleManifest, HandleRole, HandleTarget};

/// One endpoint node of a proposed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionNode<'a> {
    pub node_type: &'a str,
    pub category: Option<&'a str>,
}

impl<'a> ConnectionNode<'a> {
    pub fn new(node_type: &'a str, category: Option<&'a str>) -> Self {
        Self {
            node_type,
            category,
        }
    }
}

/// Everything needed to judge a single proposed edge
#[derive(Debug, Clone, Copy)]
pub struct ConnectionContext<'a> {
    pub source_node: ConnectionNode<'a>,
    pub source_handle: &'a HandleManifest,
    pub target_node: ConnectionNode<'a>,
    pub target_handle: &'a HandleManifest,
}

/// Why a connection was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConstraintViolation {
    /// Both endpoints have the same non-artifact role
    #[serde(rename_all = "camelCase")]
    IncompatibleHandles { role: HandleRole },
    /// Target matches the source handle's forbidden targets
    #[serde(rename_all = "camelCase")]
    ForbiddenTarget { node_type: String, handle_id: String },
    /// Target is not in the source handle's allowed targets
    #[serde(rename_all = "camelCase")]
    TargetNotAllowed { node_type: String, handle_id: String },
    /// Target category fails the source handle's category rules
    #[serde(rename_all = "camelCase")]
    TargetCategoryRejected { category: Option<CategoryId> },
    /// Source matches the target handle's forbidden sources
    #[serde(rename_all = "camelCase")]
    ForbiddenSource { node_type: String, handle_id: String },
    /// Source is not in the target handle's allowed sources
    #[serde(rename_all = "camelCase")]
    SourceNotAllowed { node_type: String, handle_id: String },
    /// Source category fails the target handle's category rules
    #[serde(rename_all = "camelCase")]
    SourceCategoryRejected { category: Option<CategoryId> },
    /// The new node declares no handle of the direction the edge needs
    #[serde(rename_all = "camelCase")]
    NoCompatibleHandle {
        node_type: String,
        handle_kind: HandleKind,
    },
}

impl std::fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IncompatibleHandles { role } => {
                write!(f, "Cannot connect two {:?} handles", role)
            }
            Self::ForbiddenTarget {
                node_type,
                handle_id,
            } => {
                write!(
                    f,
                    "Target '{}' (handle '{}') is forbidden by the source handle",
                    node_type, handle_id
                )
            }
            Self::TargetNotAllowed {
                node_type,
                handle_id,
            } => {
                write!(
                    f,
                    "Target '{}' (handle '{}') is not in the source handle's allowed targets",
                    node_type, handle_id
                )
            }
            Self::TargetCategoryRejected { category } => match category {
                Some(c) => write!(f, "Target category '{}' is not allowed", c),
                None => write!(f, "Target node has no category but the source requires one"),
            },
            Self::ForbiddenSource {
                node_type,
                handle_id,
            } => {
                write!(
                    f,
                    "Source '{}' (handle '{}') is forbidden by the target handle",
                    node_type, handle_id
                )
            }
            Self::SourceNotAllowed {
                node_type,
                handle_id,
            } => {
                write!(
                    f,
                    "Source '{}' (handle '{}') is not in the target handle's allowed sources",
                    node_type, handle_id
                )
            }
            Self::SourceCategoryRejected { category } => match category {
                Some(c) => write!(f, "Source category '{}' is not allowed", c),
                None => write!(f, "Source node has no category but the target requires one"),
            },
            Self::NoCompatibleHandle {
                node_type,
                handle_kind,
            } => {
                write!(f, "Node '{}' has no {:?} handle", node_type, handle_kind)
            }
        }
    }
}

impl std::error::Error for ConstraintViolation {}

/// Verdict of `validate_connection`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    /// Human-readable reason, present when invalid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation: Option<ConstraintViolation>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
            violation: None,
        }
    }

    pub fn rejected(violation: ConstraintViolation) -> Self {
        Self {
            valid: false,
            reason: Some(violation.to_string()),
            violation: Some(violation),
        }
    }
}

impl From<Result<(), ConstraintViolation>> for ValidationResult {
    fn from(result: Result<(), ConstraintViolation>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(violation) => Self::rejected(violation),
        }
    }
}

/// A parsed node-type pattern
///
/// `*` alone matches every type. Otherwise `*` matches any run of
/// characters (including none) and everything else is literal, so
/// `automation.*` matches `automation.file` but not `automation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypePattern<'a> {
    Any,
    Exact(&'a str),
    Glob(Vec<&'a str>),
}

impl<'a> TypePattern<'a> {
    pub fn parse(pattern: &'a str) -> Self {
        if pattern == "*" {
            Self::Any
        } else if pattern.contains('*') {
            Self::Glob(pattern.split('*').collect())
        } else {
            Self::Exact(pattern)
        }
    }

    pub fn matches(&self, node_type: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(literal) => *literal == node_type,
            Self::Glob(parts) => glob_match(node_type, parts),
        }
    }
}

/// Match `value` against literal parts separated by `*` wildcards
fn glob_match(value: &str, parts: &[&str]) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return value.is_empty();
    };
    let Some(mut remainder) = value.strip_prefix(first) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remainder.is_empty();
    };

    for part in middle {
        match remainder.find(part) {
            Some(at) => remainder = &remainder[at + part.len()..],
            None => return false,
        }
    }

    remainder.ends_with(last)
}

/// Check whether a concrete node type matches a wildcard pattern
pub fn matches_type_pattern(node_type: &str, pattern: &str) -> bool {
    TypePattern::parse(pattern).matches(node_type)
}

fn matches_handle_target(target: &HandleTarget, node_type: &str, handle_id: &str) -> bool {
    matches_type_pattern(node_type, &target.node_type)
        && target.handle_id.as_deref().is_none_or(|id| id == handle_id)
}

enum ListVerdict {
    Pass,
    Forbidden,
    NotAllowed,
}

/// Evaluate allow/forbid handle-target lists; forbidden wins
fn check_handle_targets(
    node_type: &str,
    handle_id: &str,
    allowed: Option<&[HandleTarget]>,
    forbidden: Option<&[HandleTarget]>,
) -> ListVerdict {
    if let Some(forbidden) = forbidden {
        if forbidden
            .iter()
            .any(|t| matches_handle_target(t, node_type, handle_id))
        {
            return ListVerdict::Forbidden;
        }
    }
    if let Some(allowed) = allowed {
        if !allowed
            .iter()
            .any(|t| matches_handle_target(t, node_type, handle_id))
        {
            return ListVerdict::NotAllowed;
        }
    }
    ListVerdict::Pass
}

/// Check a category against allow/forbid lists
///
/// Forbidden is checked before allowed, and a missing allowed list permits
/// anything not forbidden. A node without a category passes only when
/// neither list is supplied.
pub fn check_category_constraint(
    category: Option<&str>,
    allowed: Option<&[CategoryId]>,
    forbidden: Option<&[CategoryId]>,
) -> bool {
    let Some(category) = category else {
        return allowed.is_none() && forbidden.is_none();
    };
    if let Some(forbidden) = forbidden {
        if forbidden.iter().any(|c| c == category) {
            return false;
        }
    }
    match allowed {
        Some(allowed) => allowed.iter().any(|c| c == category),
        None => true,
    }
}

fn check_handle_roles(context: &ConnectionContext<'_>) -> Result<(), ConstraintViolation> {
    let source = context.source_handle.role();
    let target = context.target_handle.role();
    match (source, target) {
        (HandleRole::Artifact, _) | (_, HandleRole::Artifact) => Ok(()),
        (a, b) if a == b => Err(ConstraintViolation::IncompatibleHandles { role: a }),
        _ => Ok(()),
    }
}

fn check_source_constraints(context: &ConnectionContext<'_>) -> Result<(), ConstraintViolation> {
    let Some(constraints) = &context.source_handle.constraints else {
        return Ok(());
    };
    let node_type = context.target_node.node_type;
    let handle_id = context.target_handle.id.as_str();

    match check_handle_targets(
        node_type,
        handle_id,
        constraints.allowed_targets.as_deref(),
        constraints.forbidden_targets.as_deref(),
    ) {
        ListVerdict::Pass => {}
        ListVerdict::Forbidden => {
            return Err(ConstraintViolation::ForbiddenTarget {
                node_type: node_type.to_string(),
                handle_id: handle_id.to_string(),
            })
        }
        ListVerdict::NotAllowed => {
            return Err(ConstraintViolation::TargetNotAllowed {
                node_type: node_type.to_string(),
                handle_id: handle_id.to_string(),
            })
        }
    }

    if !check_category_constraint(
        context.target_node.category,
        constraints.allowed_target_categories.as_deref(),
        constraints.forbidden_target_categories.as_deref(),
    ) {
        return Err(ConstraintViolation::TargetCategoryRejected {
            category: context.target_node.category.map(str::to_string),
        });
    }

    Ok(())
}

fn check_target_constraints(context: &ConnectionContext<'_>) -> Result<(), ConstraintViolation> {
    let Some(constraints) = &context.target_handle.constraints else {
        return Ok(());
    };
    let node_type = context.source_node.node_type;
    let handle_id = context.source_handle.id.as_str();

    match check_handle_targets(
        node_type,
        handle_id,
        constraints.allowed_sources.as_deref(),
        constraints.forbidden_sources.as_deref(),
    ) {
        ListVerdict::Pass => {}
        ListVerdict::Forbidden => {
            return Err(ConstraintViolation::ForbiddenSource {
                node_type: node_type.to_string(),
                handle_id: handle_id.to_string(),
            })
        }
        ListVerdict::NotAllowed => {
            return Err(ConstraintViolation::SourceNotAllowed {
                node_type: node_type.to_string(),
                handle_id: handle_id.to_string(),
            })
        }
    }

    if !check_category_constraint(
        context.source_node.category,
        constraints.allowed_source_categories.as_deref(),
        constraints.forbidden_source_categories.as_deref(),
    ) {
        return Err(ConstraintViolation::SourceCategoryRejected {
            category: context.source_node.category.map(str::to_string),
        });
    }

    Ok(())
}

/// Validate a proposed connection
pub fn validate_connection(context: &ConnectionContext<'_>) -> ValidationResult {
    check_handle_roles(context)
        .and_then(|()| check_source_constraints(context))
        .and_then(|()| check_target_constraints(context))
        .into()
}

/// Whether a handle may take another edge given its current edge count
pub fn can_accept_more_connections(handle: &HandleManifest, current_count: usize) -> bool {
    match handle.constraints.as_ref().and_then(|c| c.max_connections) {
        Some(max) => current_count < max as usize,
        None => true,
    }
}

/// Whether a handle has at least its declared minimum number of edges
pub fn meets_minimum_connections(handle: &HandleManifest, current_count: usize) -> bool {
    let min = handle
        .constraints
        .as_ref()
        .and_then(|c| c.min_connections)
        .unwrap_or(0);
    current_count >= min as usize
}
