//! Journal replay: rebuild a [`NodeTable`] from the on-disk log.
//!
//! Lines are applied strictly in file order. `MATRIX`/`DEL_*` records carry
//! only numeric ids, so replay keeps an id→value index fed by every `MATRIX`
//! line. Malformed lines are reported and skipped; an id that cannot be
//! resolved means the log no longer describes a coherent graph and is fatal.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::journal::Record;
use crate::store::NodeTable;

/// What a completed load replayed.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoadStats {
    /// Records applied (comments and skipped lines excluded).
    pub records: u64,
    /// Distinct values after replay.
    pub nodes: usize,
    /// Edges after replay.
    pub edges: u64,
}

/// Replay the journal at `path` into `table`.
///
/// The table's sibling lists are rebuilt from scratch afterwards, grouping
/// each parent's children in the table's lexicographic order — reload order
/// is documented to differ from live insertion order.
pub fn load(path: &Path, table: &mut NodeTable) -> Result<LoadStats> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut index: FxHashMap<u64, String> = FxHashMap::default();
    let mut selected: Option<String> = None;
    let mut records = 0u64;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let record = match Record::parse(&line) {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(err) => {
                warn!(line = line_no + 1, %err, "skipping malformed journal record");
                continue;
            }
        };
        apply(table, &mut index, &mut selected, record)?;
        records += 1;
    }

    let nodes = table.node_count();
    let edges = table.edge_count();
    table.finish_replay()?;
    debug!(records, nodes, edges, "journal replay complete");
    Ok(LoadStats {
        records,
        nodes,
        edges,
    })
}

fn apply(
    table: &mut NodeTable,
    index: &mut FxHashMap<u64, String>,
    selected: &mut Option<String>,
    record: Record,
) -> Result<()> {
    match record {
        Record::Insert { value } => {
            table.replay_insert_node(&value);
            *selected = Some(value);
        }
        Record::Reference { edge } => {
            let value = index.get(&edge.0).ok_or_else(|| {
                StoreError::Corruption(format!("reference to unknown edge id {edge}"))
            })?;
            *selected = Some(value.clone());
        }
        Record::Matrix { parent, edge } => {
            let value = selected.clone().ok_or_else(|| {
                StoreError::Corruption(format!("edge record {edge} with no node selected"))
            })?;
            table.replay_attach(&value, parent, edge)?;
            index.entry(edge.0).or_insert(value);
        }
        Record::DelEdge { edge, parent } => {
            let value = index
                .get(&edge.0)
                .cloned()
                .ok_or_else(|| {
                    StoreError::Corruption(format!("edge removal names unknown id {edge}"))
                })?;
            table.replay_detach(&value, parent)?;
        }
        Record::DelNode { edge } => {
            let value = index.remove(&edge.0).ok_or_else(|| {
                StoreError::Corruption(format!("node removal names unknown id {edge}"))
            })?;
            table.replay_remove_node(&value)?;
        }
        Record::DropDb => {
            table.clear();
            index.clear();
            *selected = None;
        }
        Record::LoadMark => {}
    }
    Ok(())
}
