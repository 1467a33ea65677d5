//! Per-database engine: one instance owns the in-memory graph and its
//! journal, and implements every path operation over them.
//!
//! All operations share one token walk starting at the root edge. A `*`
//! token expands to every current child of the position reached so far and
//! recurses once per child; the substituted token is then literal, so child
//! values that happen to be `*` are not re-expanded. On literal tokens the
//! `\*` escape resolves to a literal `*` value.

mod pool;

pub use pool::{DatabasePool, PoolConfig, UseOutcome};

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{Result, StoreError};
use crate::journal::loader::{self, LoadStats};
use crate::journal::{codec, Journal, Record};
use crate::store::{EdgeRef, NodeTable};

/// Sentinel `tree` result when no position matched.
pub const EMPTY_TREE: &str = "<empty>";

/// Outcome of a `get`: deduplicated child values plus the count flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetResult {
    /// Children of every matched position, deduplicated and sorted.
    pub values: Vec<String>,
    /// `values.len()`, except `-1` when the single requested branch did not
    /// resolve — distinguishing "path not found" from "path childless".
    pub count: i64,
}

/// Where one walked branch ended up.
#[derive(Clone, Debug)]
enum Terminal {
    /// The branch resolved to this edge.
    Hit(EdgeRef),
    /// A token named a value the table does not hold at all.
    MissingValue,
    /// The value exists, but not as a child of the position reached.
    NotAChild,
}

impl Terminal {
    fn is_abort(&self) -> bool {
        !matches!(self, Terminal::Hit(_))
    }
}

/// One named database: the deduplicated value graph plus its journal.
#[derive(Debug)]
pub struct Database {
    name: String,
    store: NodeTable,
    journal: Journal,
}

impl Database {
    /// Open `name`, replaying its journal (created if absent) under
    /// `config`. Returns the instance and what the replay applied.
    pub fn open(name: &str, config: &PoolConfig) -> Result<(Self, LoadStats)> {
        let path = config.journal_path(name);
        let journal = Journal::open(&path, !config.volatile)?;
        let mut store = NodeTable::new();
        let stats = loader::load(&path, &mut store)?;
        let db = Self {
            name: name.to_string(),
            store,
            journal,
        };
        db.journal.append(&Record::LoadMark)?;
        Ok((db, stats))
    }

    /// The database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Distinct values currently stored.
    pub fn node_count(&self) -> usize {
        self.store.node_count()
    }

    /// Edges currently stored.
    pub fn edge_count(&self) -> u64 {
        self.store.edge_count()
    }

    /// Store `path`, creating whatever nodes and edges are missing. Returns
    /// the number of newly created edges; re-setting an existing path
    /// creates (and journals) nothing.
    pub fn set(&mut self, path: &[String]) -> Result<i64> {
        let mut created = 0;
        self.set_walk(path, 0, EdgeRef::Root, false, &mut created)?;
        Ok(created)
    }

    fn set_walk(
        &mut self,
        path: &[String],
        start: usize,
        at: EdgeRef,
        substituted: bool,
        created: &mut i64,
    ) -> Result<()> {
        let mut at = at;
        let mut substituted = substituted;
        for i in start..path.len() {
            let token = &path[i];
            if token == "*" && !substituted {
                let mut expansion = self.store.children(&at)?;
                expansion.sort();
                for child in expansion {
                    let mut branch = path.to_vec();
                    branch[i] = child;
                    self.set_walk(&branch, i, at.clone(), true, created)?;
                }
                return Ok(());
            }
            let value = if substituted {
                token.clone()
            } else {
                token.replace("\\*", "*")
            };
            substituted = false;

            let new_node = self.store.ensure_node(&value);
            if new_node {
                self.journal.append(&Record::Insert {
                    value: value.clone(),
                })?;
            }
            let parent_id = self.store.edge_id(&at)?;
            let (edge_id, new_edge) = self.store.ensure_edge(&value, &at)?;
            if new_edge {
                *created += 1;
                if !new_node {
                    // The journal carries no value on MATRIX lines; point
                    // replay at the node through one of its existing edges.
                    let existing = self
                        .store
                        .node(&value)
                        .ok_or_else(|| {
                            StoreError::Corruption(format!("node {value:?} vanished during set"))
                        })?
                        .any_edge_id(&[edge_id])?;
                    self.journal.append(&Record::Reference { edge: existing })?;
                }
                self.journal.append(&Record::Matrix {
                    parent: parent_id,
                    edge: edge_id,
                })?;
            }
            at = EdgeRef::at(value, parent_id);
        }
        Ok(())
    }

    /// Children of every position `path` resolves to.
    pub fn get(&self, path: &[String]) -> Result<GetResult> {
        let mut terminals = Vec::new();
        self.walk(path, 0, EdgeRef::Root, false, &mut terminals)?;

        let mut aborted = 0usize;
        let mut values = BTreeSet::new();
        for terminal in &terminals {
            match terminal {
                Terminal::Hit(at) => values.extend(self.store.children(at)?),
                _ => aborted += 1,
            }
        }
        let values: Vec<String> = values.into_iter().collect();
        let count = if terminals.len() == 1 && aborted > 0 {
            -1
        } else {
            values.len() as i64
        };
        Ok(GetResult { values, count })
    }

    /// True iff every branch of `path` resolves.
    pub fn is(&self, path: &[String]) -> Result<bool> {
        let mut terminals = Vec::new();
        self.walk(path, 0, EdgeRef::Root, false, &mut terminals)?;
        Ok(terminals.iter().all(|t| !t.is_abort()))
    }

    /// `get(path).count`.
    pub fn count(&self, path: &[String]) -> Result<i64> {
        Ok(self.get(path)?.count)
    }

    /// Delete the edges `path`'s final token resolves to, waterfall-deleting
    /// each one's descendant subtree first. Returns how many final-token
    /// edges were removed.
    pub fn del(&mut self, path: &[String]) -> Result<i64> {
        let mut removed = 0;
        self.del_walk(path, 0, EdgeRef::Root, false, &[], &mut removed)?;
        Ok(removed)
    }

    /// `del` in rename mode: after each final-token deletion, re-`set` the
    /// path prefix extended with `replacement`. The deleted subtree is not
    /// reattached. Always returns 0.
    pub fn update(&mut self, path: &[String], replacement: &[String]) -> Result<i64> {
        let mut removed = 0;
        self.del_walk(path, 0, EdgeRef::Root, false, replacement, &mut removed)?;
        Ok(0)
    }

    fn del_walk(
        &mut self,
        path: &[String],
        start: usize,
        at: EdgeRef,
        substituted: bool,
        replacement: &[String],
        removed: &mut i64,
    ) -> Result<()> {
        let mut at = at;
        let mut substituted = substituted;
        for i in start..path.len() {
            let token = &path[i];
            if token == "*" && !substituted {
                let mut expansion = self.store.children(&at)?;
                expansion.sort();
                for child in expansion {
                    let mut branch = path.to_vec();
                    branch[i] = child;
                    self.del_walk(&branch, i, at.clone(), true, replacement, removed)?;
                }
                return Ok(());
            }
            let value = if substituted {
                token.clone()
            } else {
                token.replace("\\*", "*")
            };
            substituted = false;

            let Some(node) = self.store.node(&value) else {
                return Ok(());
            };
            let parent_id = self.store.edge_id(&at)?;

            if i + 1 == path.len() {
                let node_tag = node.any_edge_id(&[])?;
                let target = EdgeRef::at(value.clone(), parent_id);
                if self.store.edge(&target).is_some() {
                    self.waterfall(&target)?;
                    let node_gone = self.store.remove_edge(&value, &at)?;
                    *removed += 1;
                    self.journal.append(&Record::DelEdge {
                        edge: node_tag,
                        parent: parent_id,
                    })?;
                    if node_gone {
                        self.journal.append(&Record::DelNode { edge: node_tag })?;
                    }
                    if !replacement.is_empty() {
                        let mut renamed: Vec<String> = path[..path.len() - 1].to_vec();
                        renamed.extend(replacement.iter().cloned());
                        self.set(&renamed)?;
                    }
                }
                return Ok(());
            }

            let next = EdgeRef::at(value, parent_id);
            if self.store.edge(&next).is_none() {
                return Ok(());
            }
            at = next;
        }
        Ok(())
    }

    /// Remove the entire descendant subtree of the edge at `parent`,
    /// deepest first, journaling every edge and node removal.
    fn waterfall(&mut self, parent: &EdgeRef) -> Result<()> {
        let parent_id = self.store.edge_id(parent)?;
        for child in self.store.children(parent)? {
            let child_ref = EdgeRef::at(child.clone(), parent_id);
            let child_edge = self.store.edge_id(&child_ref)?;
            self.waterfall(&child_ref)?;
            let node_gone = self.store.remove_edge(&child, parent)?;
            self.journal.append(&Record::DelEdge {
                edge: child_edge,
                parent: parent_id,
            })?;
            if node_gone {
                self.journal.append(&Record::DelNode { edge: child_edge })?;
            }
        }
        Ok(())
    }

    /// Render the subtree under every position `path` resolves to, one
    /// value per line with `{`/`}` lines wrapping each nesting level.
    /// `annotate` is accepted for the id-annotated variant and currently
    /// renders identically.
    pub fn tree(&self, path: &[String], annotate: bool) -> Result<String> {
        let _ = annotate;
        let mut terminals = Vec::new();
        self.walk(path, 0, EdgeRef::Root, false, &mut terminals)?;

        let mut out = String::new();
        for terminal in &terminals {
            if let Terminal::Hit(at) = terminal {
                self.render_subtree(at, &mut out)?;
            }
        }
        if out.is_empty() {
            return Ok(EMPTY_TREE.to_string());
        }
        if out.ends_with('\n') {
            out.pop();
        }
        Ok(out)
    }

    fn render_subtree(&self, at: &EdgeRef, out: &mut String) -> Result<()> {
        let children = self.store.children(at)?;
        if children.is_empty() {
            return Ok(());
        }
        let parent_id = self.store.edge_id(at)?;
        out.push_str("{\n");
        for child in &children {
            out.push_str(&codec::display_escape(child));
            out.push('\n');
            self.render_subtree(&EdgeRef::at(child.clone(), parent_id), out)?;
        }
        out.push_str("}\n");
        Ok(())
    }

    /// Clear every node and edge; journaled as a single marker.
    pub fn drop_all(&mut self) -> Result<i64> {
        self.store.clear();
        self.journal.append(&Record::DropDb)?;
        debug!(name = %self.name, "dropped database contents");
        Ok(0)
    }

    /// Rewrite the journal down to the operations reproducing current
    /// state. Not implemented; fails explicitly rather than no-op.
    pub fn compact(&mut self) -> Result<()> {
        Err(StoreError::Unsupported("journal compaction"))
    }

    /// The shared read-only walk: resolve `path` from `at`, recording one
    /// terminal per branch.
    fn walk(
        &self,
        path: &[String],
        start: usize,
        at: EdgeRef,
        substituted: bool,
        terminals: &mut Vec<Terminal>,
    ) -> Result<()> {
        let mut at = at;
        let mut substituted = substituted;
        for i in start..path.len() {
            let token = &path[i];
            if token == "*" && !substituted {
                let mut expansion = self.store.children(&at)?;
                expansion.sort();
                for child in expansion {
                    let mut branch = path.to_vec();
                    branch[i] = child;
                    self.walk(&branch, i, at.clone(), true, terminals)?;
                }
                return Ok(());
            }
            let value = if substituted {
                token.clone()
            } else {
                token.replace("\\*", "*")
            };
            substituted = false;

            if self.store.node(&value).is_none() {
                terminals.push(Terminal::MissingValue);
                return Ok(());
            }
            let parent_id = self.store.edge_id(&at)?;
            let next = EdgeRef::at(value, parent_id);
            if self.store.edge(&next).is_none() {
                terminals.push(Terminal::NotAChild);
                return Ok(());
            }
            at = next;
        }
        terminals.push(Terminal::Hit(at));
        Ok(())
    }
}
