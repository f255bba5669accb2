//! Resolution of a source's bound input to a folder string.
//!
//! A source may be fed from another node in the host graph. The value is
//! found by following the link upstream:
//! - a node holding a direct value answers with it
//! - pass-through nodes forward to their own upstream link
//! - anything else answers from the executed-output cache, if present
//!
//! Recursion stops at [`MAX_RESOLVE_DEPTH`] hops.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Maximum number of links followed while resolving.
pub const MAX_RESOLVE_DEPTH: usize = 8;

/// An input connection: the node feeding it and that node's output slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkRef {
    pub node: String,
    pub slot: usize,
}

impl LinkRef {
    pub fn new(node: impl Into<String>, slot: usize) -> Self {
        Self {
            node: node.into(),
            slot,
        }
    }
}

/// Resolves a bound input link to a concrete string.
pub trait InputResolver {
    fn resolve(&self, link: &LinkRef) -> Option<String>;
}

/// Resolver for hosts without a graph; every link is unresolved.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInputs;

impl InputResolver for NoInputs {
    fn resolve(&self, _link: &LinkRef) -> Option<String> {
        None
    }
}

/// What a graph node contributes during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphNode {
    /// A node carrying a literal value (text field, primitive).
    Value(String),
    /// Reroute-like node forwarding whatever is connected upstream.
    PassThrough { upstream: Option<LinkRef> },
    /// Any other node; only its executed outputs are known.
    Opaque,
}

/// In-memory view of the host graph.
#[derive(Debug, Default)]
pub struct GraphLinks {
    nodes: HashMap<String, GraphNode>,
    executed: HashMap<LinkRef, String>,
}

impl GraphLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_node(&mut self, id: impl Into<String>, node: GraphNode) {
        self.nodes.insert(id.into(), node);
    }

    /// Record a value produced for `link` by the last execution.
    pub fn record_output(&mut self, link: LinkRef, value: impl Into<String>) {
        self.executed.insert(link, value.into());
    }

    fn resolve_at(&self, link: &LinkRef, depth: usize) -> Option<String> {
        if depth >= MAX_RESOLVE_DEPTH {
            warn!(node = %link.node, depth, "Input resolution too deep, giving up");
            return None;
        }
        trace!(node = %link.node, slot = link.slot, depth, "Resolving input");

        let direct = match self.nodes.get(&link.node) {
            Some(GraphNode::Value(value)) if !value.is_empty() => Some(value.clone()),
            Some(GraphNode::PassThrough {
                upstream: Some(upstream),
            }) => self.resolve_at(upstream, depth + 1),
            _ => None,
        };

        direct.or_else(|| self.executed.get(link).filter(|v| !v.is_empty()).cloned())
    }
}

impl InputResolver for GraphLinks {
    fn resolve(&self, link: &LinkRef) -> Option<String> {
        self.resolve_at(link, 0)
    }
}
