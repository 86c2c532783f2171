// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic module sharding ([`ShardSpec`]) and cross-shard result merging
//! ([`ShardMainMerger`]).

mod merger;
mod spec;

pub use merger::{GroupAttribute, MergedModuleResult, ShardListenerHandle, ShardMainMerger, ShardResult};
pub use spec::{ShardSpec, ShardSpecParseError};
