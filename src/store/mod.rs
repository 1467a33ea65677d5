//! The deduplicated node table and its sibling-list discipline.
//!
//! One [`Node`] per distinct value, keyed by content. Children of an edge
//! form an intrusive doubly-linked list threaded through the child nodes'
//! edges and anchored by the parent edge's `last` pointer; the table walks
//! it tail-first, so [`NodeTable::children`] yields newest-first order.

use std::collections::BTreeMap;

use crate::error::{Result, StoreError};
use crate::model::{Edge, EdgeId, EdgeIdAllocator, Node, ROOT_EDGE};

/// Address of an edge: the synthetic root, or the edge a value holds under
/// a given parent edge id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EdgeRef {
    /// The root edge (id 0).
    Root,
    /// The edge of `value` under parent edge `parent`.
    At {
        /// Child value owning the edge.
        value: String,
        /// Id of the parent edge.
        parent: EdgeId,
    },
}

impl EdgeRef {
    /// Address of `value`'s edge under `parent`.
    pub fn at(value: impl Into<String>, parent: EdgeId) -> Self {
        EdgeRef::At {
            value: value.into(),
            parent,
        }
    }
}

/// The set of distinct values and every position each occupies.
#[derive(Debug)]
pub struct NodeTable {
    nodes: BTreeMap<String, Node>,
    root: Edge,
    ids: EdgeIdAllocator,
}

impl Default for NodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTable {
    /// An empty table holding only the root edge.
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            root: Edge::new(ROOT_EDGE),
            ids: EdgeIdAllocator::new(),
        }
    }

    /// The node storing `value`, if present.
    pub fn node(&self, value: &str) -> Option<&Node> {
        self.nodes.get(value)
    }

    /// Resolve an edge address.
    pub fn edge(&self, at: &EdgeRef) -> Option<&Edge> {
        match at {
            EdgeRef::Root => Some(&self.root),
            EdgeRef::At { value, parent } => self.nodes.get(value)?.edge(*parent),
        }
    }

    fn edge_mut(&mut self, at: &EdgeRef) -> Option<&mut Edge> {
        match at {
            EdgeRef::Root => Some(&mut self.root),
            EdgeRef::At { value, parent } => self.nodes.get_mut(value)?.edge_mut(*parent),
        }
    }

    /// Id of the edge at `at`, or a corruption error: callers only hold
    /// addresses they just resolved or created.
    pub fn edge_id(&self, at: &EdgeRef) -> Result<EdgeId> {
        self.edge(at)
            .map(|edge| edge.id)
            .ok_or_else(|| StoreError::Corruption(format!("dangling edge address {at:?}")))
    }

    /// Number of distinct values.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of edges across all nodes.
    pub fn edge_count(&self) -> u64 {
        self.nodes.values().map(|n| n.parents.len() as u64).sum()
    }

    /// Children of the edge at `at`, newest first. An unresolvable address
    /// has no children; a broken sibling chain is corruption.
    pub fn children(&self, at: &EdgeRef) -> Result<Vec<String>> {
        let Some(edge) = self.edge(at) else {
            return Ok(Vec::new());
        };
        let parent_id = edge.id;
        let mut out = Vec::new();
        let mut cursor = edge.last.clone();
        while let Some(value) = cursor {
            let link = self
                .nodes
                .get(&value)
                .and_then(|node| node.edge(parent_id))
                .ok_or_else(|| {
                    StoreError::Corruption(format!(
                        "sibling chain under edge {parent_id} references missing edge of {value:?}"
                    ))
                })?;
            cursor = link.prev.clone();
            out.push(value);
        }
        Ok(out)
    }

    /// Create the node for `value` if absent. Returns whether it was new.
    pub fn ensure_node(&mut self, value: &str) -> bool {
        if self.nodes.contains_key(value) {
            return false;
        }
        self.nodes.insert(value.to_string(), Node::default());
        true
    }

    /// Create the edge of `value` under the edge at `parent` if absent,
    /// appending it to the sibling list. Returns the edge id and whether it
    /// was newly created. The node must already exist.
    pub fn ensure_edge(&mut self, value: &str, parent: &EdgeRef) -> Result<(EdgeId, bool)> {
        let parent_edge = self
            .edge(parent)
            .ok_or_else(|| StoreError::Corruption(format!("dangling parent address {parent:?}")))?;
        let parent_id = parent_edge.id;
        let old_last = parent_edge.last.clone();

        let node = self.nodes.get_mut(value).ok_or_else(|| {
            StoreError::Corruption(format!("edge requested for missing node {value:?}"))
        })?;
        if let Some(existing) = node.edge(parent_id) {
            return Ok((existing.id, false));
        }

        let id = self.ids.allocate();
        let mut edge = Edge::new(id);
        edge.prev = old_last.clone();
        node.parents.insert(parent_id, edge);

        if let Some(last_value) = old_last {
            let tail = self
                .nodes
                .get_mut(&last_value)
                .and_then(|node| node.edge_mut(parent_id))
                .ok_or_else(|| {
                    StoreError::Corruption(format!(
                        "tail {last_value:?} of edge {parent_id} has no edge record"
                    ))
                })?;
            tail.next = Some(value.to_string());
        }
        let parent_edge = self
            .edge_mut(parent)
            .ok_or_else(|| StoreError::Corruption(format!("dangling parent address {parent:?}")))?;
        parent_edge.last = Some(value.to_string());
        Ok((id, true))
    }

    /// Unlink and remove the edge of `value` under the edge at `parent`,
    /// dropping the node when its last edge goes. Returns whether the node
    /// was dropped.
    pub fn remove_edge(&mut self, value: &str, parent: &EdgeRef) -> Result<bool> {
        let parent_id = self.edge_id(parent)?;
        let removed = self
            .nodes
            .get(value)
            .and_then(|node| node.edge(parent_id))
            .cloned()
            .ok_or_else(|| {
                StoreError::Corruption(format!(
                    "removal of absent edge of {value:?} under edge {parent_id}"
                ))
            })?;

        let parent_edge = self
            .edge_mut(parent)
            .ok_or_else(|| StoreError::Corruption(format!("dangling parent address {parent:?}")))?;
        if parent_edge.last.as_deref() == Some(value) {
            parent_edge.last = removed.prev.clone();
        }
        if let Some(prev_value) = &removed.prev {
            let prev = self
                .nodes
                .get_mut(prev_value)
                .and_then(|node| node.edge_mut(parent_id))
                .ok_or_else(|| {
                    StoreError::Corruption(format!(
                        "sibling {prev_value:?} of {value:?} has no edge under {parent_id}"
                    ))
                })?;
            prev.next = removed.next.clone();
        }
        if let Some(next_value) = &removed.next {
            let next = self
                .nodes
                .get_mut(next_value)
                .and_then(|node| node.edge_mut(parent_id))
                .ok_or_else(|| {
                    StoreError::Corruption(format!(
                        "sibling {next_value:?} of {value:?} has no edge under {parent_id}"
                    ))
                })?;
            next.prev = removed.prev.clone();
        }

        let node = self.nodes.get_mut(value).ok_or_else(|| {
            StoreError::Corruption(format!("node {value:?} vanished during edge removal"))
        })?;
        node.parents.remove(&parent_id);
        if node.parents.is_empty() {
            self.nodes.remove(value);
            return Ok(true);
        }
        Ok(false)
    }

    /// Drop every node and reset the root's child anchor. Edge ids are not
    /// reused afterwards.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root.last = None;
    }

    // Replay-side mutations: raw graph edits with no sibling upkeep. The
    // loader stitches all sibling lists once, after the full log is applied.

    pub(crate) fn replay_insert_node(&mut self, value: &str) {
        self.nodes.entry(value.to_string()).or_default();
    }

    pub(crate) fn replay_attach(
        &mut self,
        value: &str,
        parent: EdgeId,
        id: EdgeId,
    ) -> Result<()> {
        let node = self.nodes.get_mut(value).ok_or_else(|| {
            StoreError::Corruption(format!("edge record for unknown node {value:?}"))
        })?;
        node.parents.entry(parent).or_insert_with(|| Edge::new(id));
        Ok(())
    }

    pub(crate) fn replay_detach(&mut self, value: &str, parent: EdgeId) -> Result<()> {
        let node = self.nodes.get_mut(value).ok_or_else(|| {
            StoreError::Corruption(format!("edge removal for unknown node {value:?}"))
        })?;
        if node.parents.remove(&parent).is_none() {
            return Err(StoreError::Corruption(format!(
                "edge removal under {parent} removed nothing from {value:?}"
            )));
        }
        Ok(())
    }

    pub(crate) fn replay_remove_node(&mut self, value: &str) -> Result<()> {
        if self.nodes.remove(value).is_none() {
            return Err(StoreError::Corruption(format!(
                "node removal for unknown value {value:?}"
            )));
        }
        Ok(())
    }

    /// Reseed the id allocator and rebuild every sibling list after replay.
    ///
    /// Nodes are grouped per parent edge id in the table's lexicographic
    /// order, which is the documented reload ordering: a live session orders
    /// siblings by insertion instead.
    pub(crate) fn finish_replay(&mut self) -> Result<()> {
        let mut max_seen = ROOT_EDGE;
        let mut groups: BTreeMap<EdgeId, Vec<String>> = BTreeMap::new();
        for (value, node) in &self.nodes {
            for (parent, edge) in &node.parents {
                max_seen = max_seen.max(*parent).max(edge.id);
                groups.entry(*parent).or_default().push(value.clone());
            }
        }
        self.ids.reseed(max_seen);

        for node in self.nodes.values_mut() {
            for edge in node.parents.values_mut() {
                edge.prev = None;
                edge.next = None;
                edge.last = groups.get(&edge.id).and_then(|members| members.last().cloned());
            }
        }
        for (parent, members) in &groups {
            for (i, value) in members.iter().enumerate() {
                let edge = self
                    .nodes
                    .get_mut(value)
                    .and_then(|node| node.edge_mut(*parent))
                    .ok_or_else(|| {
                        StoreError::Corruption(format!(
                            "replayed edge of {value:?} under {parent} vanished during rebuild"
                        ))
                    })?;
                edge.prev = (i > 0).then(|| members[i - 1].clone());
                edge.next = (i + 1 < members.len()).then(|| members[i + 1].clone());
            }
        }
        self.root.last = groups
            .get(&ROOT_EDGE)
            .and_then(|members| members.last().cloned());
        Ok(())
    }
}
