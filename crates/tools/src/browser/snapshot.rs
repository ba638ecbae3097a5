//! Accessibility tree snapshot and ref system.
//!
//! Converts Chrome's flat accessibility node list into a typed tree and
//! assigns snapshot-scoped refs (`s1e1`, `s1e2`, ...) in pre-order so every
//! node can be re-located later through the session's ref table.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// An accessibility node with ref annotation.
///
/// Serializes with the wire keys `name`, `role`, `ref` and `children`, so
/// snapshots captured elsewhere can be loaded directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AXNode {
    #[serde(deserialize_with = "null_as_empty")]
    pub role: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(deserialize_with = "null_as_empty", skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(deserialize_with = "null_as_empty", skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(rename = "backendNodeId", skip_serializing_if = "Option::is_none")]
    pub backend_node_id: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AXNode>,
    #[serde(skip_serializing_if = "is_false")]
    pub focused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(skip_serializing_if = "is_false")]
    pub disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl AXNode {
    pub fn new(role: &str, name: &str) -> Self {
        Self {
            role: role.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_ref(mut self, ref_id: &str) -> Self {
        self.ref_id = Some(ref_id.to_string());
        self
    }

    pub fn with_children(mut self, children: Vec<AXNode>) -> Self {
        self.children = children;
        self
    }

    /// Pre-order (document order) traversal starting at this node.
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder { stack: vec![self] }
    }
}

/// Depth-first pre-order iterator over an accessibility tree.
///
/// Uses an explicit stack, so traversal depth is not bounded by the call stack.
pub struct PreOrder<'a> {
    stack: Vec<&'a AXNode>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a AXNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Roles that are structural/container (skip in compact mode if empty).
const STRUCTURAL_ROLES: &[&str] = &[
    "generic", "none", "presentation", "group", "region",
    "GenericContainer", "Section",
];

fn is_structural_role(role: &str) -> bool {
    STRUCTURAL_ROLES.iter().any(|r| r.eq_ignore_ascii_case(role))
}

/// Nesting depth kept when building a tree from CDP nodes. Building,
/// ref assignment, rendering and dropping all recurse no deeper than this.
pub const MAX_TREE_DEPTH: usize = 512;

/// Parse the `Accessibility.getFullAXTree` response into a tree.
///
/// Returns `None` when the page exposes no accessible content. Ignored nodes
/// are dropped and their children hoisted into the parent. Anything nested
/// deeper than [`MAX_TREE_DEPTH`] is cut off.
pub fn parse_ax_tree(cdp_response: &Value) -> Option<AXNode> {
    let nodes = cdp_response.get("nodes").and_then(|v| v.as_array())?;
    let root = nodes.first()?;

    let mut node_map: HashMap<&str, &Value> = HashMap::new();
    for node in nodes {
        if let Some(id) = node.get("nodeId").and_then(|v| v.as_str()) {
            node_map.insert(id, node);
        }
    }

    let mut visited = HashSet::new();
    Some(build_ax_node(root, &node_map, &mut visited, 0))
}

fn build_ax_node<'a>(
    node: &'a Value,
    node_map: &HashMap<&'a str, &'a Value>,
    visited: &mut HashSet<&'a str>,
    depth: usize,
) -> AXNode {
    if let Some(id) = node.get("nodeId").and_then(|v| v.as_str()) {
        visited.insert(id);
    }

    let role = get_ax_value(node, "role");
    let name = get_ax_value(node, "name");

    let mut ax = AXNode {
        role,
        name,
        value: get_ax_value(node, "value"),
        description: get_ax_value(node, "description"),
        backend_node_id: node.get("backendDOMNodeId").and_then(|v| v.as_i64()),
        ..Default::default()
    };

    if let Some(props) = node.get("properties").and_then(|v| v.as_array()) {
        for prop in props {
            let prop_name = prop.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let prop_value = prop.get("value").and_then(|v| v.get("value"));
            match prop_name {
                "focused" => ax.focused = prop_value.and_then(|v| v.as_bool()).unwrap_or(false),
                "checked" => {
                    // tristate: true / false / "mixed"
                    ax.checked = prop_value.map(|v| v.as_bool().unwrap_or(false));
                }
                "disabled" => ax.disabled = prop_value.and_then(|v| v.as_bool()).unwrap_or(false),
                "expanded" => ax.expanded = prop_value.and_then(|v| v.as_bool()),
                "level" => ax.level = prop_value.and_then(|v| v.as_i64()).map(|v| v as i32),
                _ => {}
            }
        }
    }

    ax.children = collect_children(node, node_map, visited, depth + 1);
    ax
}

fn collect_children<'a>(
    node: &'a Value,
    node_map: &HashMap<&'a str, &'a Value>,
    visited: &mut HashSet<&'a str>,
    depth: usize,
) -> Vec<AXNode> {
    if depth >= MAX_TREE_DEPTH {
        return Vec::new();
    }
    let Some(child_ids) = node.get("childIds").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let mut children = Vec::new();
    for id in child_ids.iter().filter_map(|id| id.as_str()) {
        if visited.contains(id) {
            continue;
        }
        let Some(child) = node_map.get(id).copied() else {
            continue;
        };
        if child.get("ignored").and_then(|v| v.as_bool()).unwrap_or(false) {
            visited.insert(id);
            children.extend(collect_children(child, node_map, visited, depth + 1));
        } else {
            children.push(build_ax_node(child, node_map, visited, depth));
        }
    }
    children
}

fn get_ax_value(node: &Value, field: &str) -> String {
    node.get(field)
        .and_then(|v| {
            // CDP returns {type: "...", value: "..."} for role/name/value/description
            v.get("value")
                .and_then(|val| val.as_str())
                .or_else(|| v.as_str())
        })
        .unwrap_or("")
        .to_string()
}

/// What the session remembers about a ref until the next snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RefEntry {
    pub role: String,
    pub name: String,
    pub backend_node_id: Option<i64>,
}

/// Refs issued by one snapshot. Replaced wholesale by the next snapshot.
#[derive(Debug, Clone, Default)]
pub struct RefTable {
    pub generation: u32,
    entries: HashMap<String, RefEntry>,
}

impl RefTable {
    pub fn get(&self, ref_id: &str) -> Option<&RefEntry> {
        self.entries.get(ref_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Assign `s{generation}e{n}` refs to every node in pre-order.
pub fn assign_refs(root: &mut AXNode, generation: u32) -> RefTable {
    let mut table = RefTable {
        generation,
        entries: HashMap::new(),
    };
    let mut counter = 0u32;
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        counter += 1;
        let ref_id = format!("s{}e{}", generation, counter);
        node.ref_id = Some(ref_id.clone());
        table.entries.insert(
            ref_id,
            RefEntry {
                role: node.role.clone(),
                name: node.name.clone(),
                backend_node_id: node.backend_node_id,
            },
        );
        stack.extend(node.children.iter_mut().rev());
    }
    table
}

/// Render the accessibility tree as an indented outline.
pub fn render_tree(root: &AXNode, compact: bool, max_depth: Option<usize>) -> String {
    let mut output = String::new();
    render_node(&mut output, root, 0, compact, max_depth);
    output
}

fn render_node(
    output: &mut String,
    node: &AXNode,
    indent: usize,
    compact: bool,
    max_depth: Option<usize>,
) {
    if let Some(max) = max_depth {
        if indent > max {
            return;
        }
    }

    // Unnamed containers only add nesting noise; keep their children
    if compact && is_structural_role(&node.role) && node.name.is_empty() {
        for child in &node.children {
            render_node(output, child, indent, compact, max_depth);
        }
        return;
    }

    if compact && node.role == "StaticText" && node.name.is_empty() {
        return;
    }

    let mut line = format!("{}- {}", "  ".repeat(indent), node.role);

    if !node.name.is_empty() {
        let name = if node.name.len() > 80 {
            format!("{}...", crate::safe_truncate(&node.name, 77))
        } else {
            node.name.clone()
        };
        line.push_str(&format!(" \"{}\"", name));
    }

    if let Some(ref ref_id) = node.ref_id {
        line.push_str(&format!(" [ref={}]", ref_id));
    }

    if let Some(level) = node.level {
        line.push_str(&format!(" [level={}]", level));
    }
    if node.focused {
        line.push_str(" [focused]");
    }
    if let Some(true) = node.checked {
        line.push_str(" [checked]");
    }
    if node.disabled {
        line.push_str(" [disabled]");
    }
    if let Some(expanded) = node.expanded {
        line.push_str(if expanded { " [expanded]" } else { " [collapsed]" });
    }
    if !node.value.is_empty() && node.value != node.name {
        let val = if node.value.len() > 60 {
            format!("{}...", crate::safe_truncate(&node.value, 57))
        } else {
            node.value.clone()
        };
        line.push_str(&format!(" value=\"{}\"", val));
    }

    output.push_str(&line);
    output.push('\n');

    for child in &node.children {
        render_node(output, child, indent + 1, compact, max_depth);
    }
}
