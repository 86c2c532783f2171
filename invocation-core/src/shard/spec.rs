// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`ShardSpec`]: deterministic module-to-shard assignment.
//!
//! Two strategies are supported: `count`, which assigns modules round-robin by position, and
//! `hash`, which assigns modules by a stable hash of their name. `hash` is the strategy a module
//! list that changes between invocations should prefer, since it keeps each module's shard
//! assignment stable even as sibling modules are added or removed.

use std::str::FromStr;
use thiserror::Error;
use xxhash_rust::xxh64::xxh64;

/// How modules are partitioned across shards.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ShardSpec {
    /// Assigns the `index`-th module (zero-based, in scheduling order) to shard `index %
    /// total_shards`.
    Count {
        /// This shard's zero-based index.
        shard: u32,
        /// The total number of shards.
        total_shards: u32,
    },
    /// Assigns a module to `hash(name) % total_shards`.
    Hash {
        /// This shard's zero-based index.
        shard: u32,
        /// The total number of shards.
        total_shards: u32,
    },
}

impl ShardSpec {
    /// Returns whether the module at `index` with the given `name` belongs to this shard.
    pub fn matches(&self, index: u32, name: &str) -> bool {
        match *self {
            Self::Count { shard, total_shards } => index % total_shards == shard,
            Self::Hash { shard, total_shards } => {
                (xxh64(name.as_bytes(), 0) % u64::from(total_shards)) as u32 == shard
            }
        }
    }

    /// The total number of shards this spec divides modules across.
    pub fn total_shards(&self) -> u32 {
        match *self {
            Self::Count { total_shards, .. } | Self::Hash { total_shards, .. } => total_shards,
        }
    }
}

impl FromStr for ShardSpec {
    type Err = ShardSpecParseError;

    /// Parses strings of the form `"hash:M/N"` or `"count:M/N"`, where `M` is the zero-based
    /// shard index and `N` is the total shard count.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = s
            .split_once(':')
            .ok_or_else(|| ShardSpecParseError::Malformed(s.to_string()))?;
        let (shard_str, total_str) = rest
            .split_once('/')
            .ok_or_else(|| ShardSpecParseError::Malformed(s.to_string()))?;

        let shard: u32 = shard_str
            .parse()
            .map_err(|_| ShardSpecParseError::Malformed(s.to_string()))?;
        let total_shards: u32 = total_str
            .parse()
            .map_err(|_| ShardSpecParseError::Malformed(s.to_string()))?;

        if total_shards == 0 {
            return Err(ShardSpecParseError::ZeroTotalShards);
        }
        if shard >= total_shards {
            return Err(ShardSpecParseError::ShardOutOfRange { shard, total_shards });
        }

        match kind {
            "count" => Ok(Self::Count { shard, total_shards }),
            "hash" => Ok(Self::Hash { shard, total_shards }),
            other => Err(ShardSpecParseError::UnknownKind(other.to_string())),
        }
    }
}

/// An error raised while parsing a [`ShardSpec`] from a string.
#[derive(Clone, Debug, Error)]
pub enum ShardSpecParseError {
    /// The string wasn't in `"<kind>:<shard>/<total>"` form.
    #[error("malformed shard spec `{0}`, expected `<kind>:<shard>/<total>`")]
    Malformed(String),
    /// `<kind>` was neither `count` nor `hash`.
    #[error("unrecognized shard kind `{0}`, expected `count` or `hash`")]
    UnknownKind(String),
    /// `<total>` was zero.
    #[error("total shard count must be at least 1")]
    ZeroTotalShards,
    /// `<shard>` was not less than `<total>`.
    #[error("shard index {shard} is out of range for {total_shards} total shards")]
    ShardOutOfRange {
        /// The out-of-range shard index.
        shard: u32,
        /// The total shard count it was checked against.
        total_shards: u32,
    },
}
