//! Append-only operation journal.
//!
//! One text file per database: newline-terminated records, `|`-separated
//! fields, single-letter opcodes. `MATRIX` and the deletion records carry
//! only numeric ids; replay resolves them through an id index seeded by the
//! `INSERT`/`REFERENCE` records that precede them (see [`loader`]).

pub mod codec;
pub mod loader;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

use crate::error::Result;
use crate::model::EdgeId;

const OP_INSERT: &str = "i";
const OP_MATRIX: &str = "m";
const OP_REFERENCE: &str = "h";
const OP_DROPDB: &str = "p";
const OP_DEL_EDGE: &str = "d";
const OP_DEL_NODE: &str = "e";
const OP_LOAD_MARK: &str = "l";

/// One journaled operation, in file order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    /// A node was created for `value`; the next `Matrix` attaches to it.
    Insert {
        /// The newly stored value.
        value: String,
    },
    /// Re-selects the node owning `edge` as the target of the next `Matrix`.
    Reference {
        /// An existing edge id of the referenced node.
        edge: EdgeId,
    },
    /// The selected node gained an edge under `parent` with id `edge`.
    Matrix {
        /// Parent edge id.
        parent: EdgeId,
        /// Id assigned to the new edge.
        edge: EdgeId,
    },
    /// The node owning `edge` lost its edge under `parent`.
    DelEdge {
        /// An edge id of the affected node.
        edge: EdgeId,
        /// Parent edge id of the removed edge.
        parent: EdgeId,
    },
    /// The node owning `edge` was removed outright.
    DelNode {
        /// An edge id the node held before it emptied.
        edge: EdgeId,
    },
    /// The whole database was cleared.
    DropDb,
    /// Recovery checkpoint: appended after every successful load, no replay
    /// effect.
    LoadMark,
}

/// A record replay must skip: unknown opcode, missing field, unparsable id.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MalformedRecord(&'static str);

impl Record {
    /// Encode as one journal line, newline included.
    pub fn encode(&self) -> String {
        let fields: Vec<String> = match self {
            Record::Insert { value } => vec![OP_INSERT.into(), value.clone()],
            Record::Reference { edge } => vec![OP_REFERENCE.into(), edge.to_string()],
            Record::Matrix { parent, edge } => {
                vec![OP_MATRIX.into(), parent.to_string(), edge.to_string()]
            }
            Record::DelEdge { edge, parent } => {
                vec![OP_DEL_EDGE.into(), edge.to_string(), parent.to_string()]
            }
            Record::DelNode { edge } => vec![OP_DEL_NODE.into(), edge.to_string()],
            Record::DropDb => vec![OP_DROPDB.into()],
            Record::LoadMark => vec![OP_LOAD_MARK.into()],
        };
        let mut line = String::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                line.push(codec::FIELD_SEPARATOR);
            }
            line.push_str(&codec::escape(field));
        }
        line.push('\n');
        line
    }

    /// Parse one journal line. `Ok(None)` for comments and blank lines.
    pub fn parse(line: &str) -> std::result::Result<Option<Record>, MalformedRecord> {
        if line.starts_with(codec::COMMENT_MARKER) {
            return Ok(None);
        }
        let fields = codec::split_fields(line);
        let Some(op) = fields.first() else {
            return Ok(None);
        };
        let record = match op.as_str() {
            OP_INSERT => Record::Insert {
                value: fields
                    .get(1)
                    .cloned()
                    .ok_or(MalformedRecord("insert record missing its value"))?,
            },
            OP_REFERENCE => Record::Reference {
                edge: parse_id(&fields, 1)?,
            },
            OP_MATRIX => Record::Matrix {
                parent: parse_id(&fields, 1)?,
                edge: parse_id(&fields, 2)?,
            },
            OP_DEL_EDGE => Record::DelEdge {
                edge: parse_id(&fields, 1)?,
                parent: parse_id(&fields, 2)?,
            },
            OP_DEL_NODE => Record::DelNode {
                edge: parse_id(&fields, 1)?,
            },
            OP_DROPDB => Record::DropDb,
            OP_LOAD_MARK => Record::LoadMark,
            _ => return Err(MalformedRecord("unknown opcode")),
        };
        Ok(Some(record))
    }
}

fn parse_id(fields: &[String], index: usize) -> std::result::Result<EdgeId, MalformedRecord> {
    let field = fields
        .get(index)
        .ok_or(MalformedRecord("record missing an id field"))?;
    field
        .parse::<u64>()
        .map(EdgeId)
        .map_err(|_| MalformedRecord("record id is not a number"))
}

/// Append handle for one database's journal file.
///
/// Appends serialize behind their own lock, separate from the database
/// lock, so a future journal rewrite can drain them independently.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
    enabled: bool,
}

impl Journal {
    /// Open (creating if absent) the journal at `path`. With `enabled` off
    /// — volatile mode — appends become no-ops while the file is still
    /// created and replayable.
    pub fn open(path: impl AsRef<Path>, enabled: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            enabled,
        })
    }

    /// Durably append one record.
    pub fn append(&self, record: &Record) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let line = record.encode();
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
