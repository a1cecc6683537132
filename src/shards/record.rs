//! Shard placement records and the shard-document payload schema
//!
//! A shard document describes the complete placement of one database: one
//! entry per shard replica, each with the hash range it owns, the node
//! hosting it, and its physical shard name.

use crate::common::{Error, Result, HASH_SPACE_END};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open interval `[begin, end)` over the document-key hash space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashRange {
    pub begin: u64,
    pub end: u64,
}

impl HashRange {
    pub fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }

    /// Does this range own hash point `h`?
    pub fn contains(&self, h: u64) -> bool {
        self.begin <= h && h < self.end
    }
}

impl fmt::Display for HashRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}-{:08x}", self.begin, self.end)
    }
}

/// One shard replica of one database placed on one node.
///
/// Distinct replicas of the same range have distinct `name`s; ranges of a
/// database may overlap only across distinct nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardRecord {
    pub database: String,
    pub range: HashRange,
    pub node: String,
    pub name: String,
}

/// Wire schema of a shard document, e.g.
/// `{"shards":[{"range":[0,2147483648],"node":"node1@db1","name":"shards/00000000-7fffffff/orders.1719841046"}]}`
#[derive(Debug, Deserialize)]
struct ShardDoc {
    shards: Vec<ShardDocEntry>,
}

#[derive(Debug, Deserialize)]
struct ShardDocEntry {
    range: (u64, u64),
    node: String,
    name: String,
}

/// Parse a shard document payload into the record set for `database`.
///
/// Rejects structurally invalid documents: missing fields, an empty shard
/// list, empty/inverted ranges, or ranges outside the hash space.
pub fn parse_shard_doc(database: &str, doc: &serde_json::Value) -> Result<Vec<ShardRecord>> {
    let malformed = |reason: String| Error::MalformedShardDoc {
        database: database.to_string(),
        reason,
    };

    let doc: ShardDoc =
        serde_json::from_value(doc.clone()).map_err(|e| malformed(e.to_string()))?;

    if doc.shards.is_empty() {
        return Err(malformed("empty shard list".into()));
    }

    let mut records = Vec::with_capacity(doc.shards.len());
    for entry in doc.shards {
        let (begin, end) = entry.range;
        if begin >= end {
            return Err(malformed(format!("empty range [{}, {})", begin, end)));
        }
        if end > HASH_SPACE_END {
            return Err(malformed(format!(
                "range end {} outside hash space",
                end
            )));
        }
        records.push(ShardRecord {
            database: database.to_string(),
            range: HashRange::new(begin, end),
            node: entry.node,
            name: entry.name,
        });
    }

    Ok(records)
}

/// Does the union of the records' ranges cover the full hash space with no
/// gaps? Overlaps (replicas) are fine.
pub fn covers_hash_space(records: &[ShardRecord]) -> bool {
    let mut ranges: Vec<HashRange> = records.iter().map(|r| r.range).collect();
    ranges.sort_by_key(|r| (r.begin, r.end));

    let mut covered_to = 0u64;
    for range in ranges {
        if range.begin > covered_to {
            return false;
        }
        covered_to = covered_to.max(range.end);
    }
    covered_to >= HASH_SPACE_END
}
