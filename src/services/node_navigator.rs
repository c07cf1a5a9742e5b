//! Graph navigation over a template.
//!
//! Edge conditions are never evaluated: the first declared edge leaving a
//! node is its only live successor.

use crate::domain::models::{NodeType, Template};

/// Id of the template's Start node, or `None` for a malformed template.
pub fn find_start_node(template: &Template) -> Option<&str> {
    template
        .nodes
        .values()
        .find(|n| n.node_type == NodeType::Start)
        .map(|n| n.id.as_str())
}

/// Target of the first edge leaving `node_id`, if any.
pub fn find_next_node<'a>(template: &'a Template, node_id: &str) -> Option<&'a str> {
    template
        .edges
        .iter()
        .find(|e| e.from == node_id)
        .map(|e| e.to.as_str())
}
