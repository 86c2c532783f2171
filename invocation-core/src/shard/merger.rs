// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`ShardMainMerger`]: combines the per-shard results of one module that ran split across
//! multiple devices back into a single reported outcome, and fans every shard's events through to
//! one shared set of downstream listeners, forwarding only one `invocation_started` and one
//! `invocation_ended` no matter how many shards report in.

use crate::capability::{LogDataType, TestInvocationListener};
use crate::context::AttributeMultiMap;
use crate::errors::FailureDescription;
use crate::time::max_duration;
use async_trait::async_trait;
use camino::Utf8Path;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A group-level attribute, merged differently depending on its declared aggregation rule.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GroupAttribute {
    /// Summed across shards, e.g. a total test count.
    Sum(i64),
    /// The value from the highest-indexed shard wins, e.g. a final status string.
    LastWriterWins(String),
}

impl GroupAttribute {
    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Sum(a), Self::Sum(b)) => Self::Sum(a + b),
            (Self::LastWriterWins(_), Self::LastWriterWins(b)) => Self::LastWriterWins(b),
            (a, _) => a,
        }
    }
}

/// One shard's contribution to a module's result, keyed by its shard index so the merger can
/// apply `LastWriterWins` deterministically regardless of input order.
#[derive(Clone, Debug)]
pub struct ShardResult {
    /// This shard's zero-based index among its siblings.
    pub shard_index: u32,
    /// Build attributes this shard recorded, keyed by device descriptor.
    pub device_build_attributes: BTreeMap<String, AttributeMultiMap>,
    /// Group-level (module-wide) attributes this shard recorded.
    pub group_attributes: BTreeMap<String, GroupAttribute>,
    /// How long this shard took to run.
    pub elapsed: Duration,
}

/// The merged result of every shard belonging to one module.
#[derive(Clone, Debug, Default)]
pub struct MergedModuleResult {
    /// Per-device build attributes, unioned across every shard.
    pub device_build_attributes: BTreeMap<String, AttributeMultiMap>,
    /// Group attributes, merged per their aggregation rule.
    pub group_attributes: BTreeMap<String, GroupAttribute>,
    /// The slowest shard's elapsed time; this is what gets reported as the module's single
    /// `invocationEnded` duration.
    pub elapsed: Duration,
}

struct MergerState {
    invocation_started_forwarded: bool,
    shards_ended: u32,
    max_elapsed_millis: u64,
}

/// Sits between every shard of a split invocation and one shared set of downstream listeners.
///
/// Constructed with the full downstream listener list and the number of shards expected to
/// report in. The first shard's `invocation_started` is forwarded immediately; every later
/// shard's `invocation_started` is swallowed. Every other per-module/per-test event is forwarded
/// from every shard as it happens, since those events are already shard-qualified by the module
/// names [`crate::suite::ModuleSplitter`] gives each piece. `invocation_ended` is held until every
/// expected shard has reported one, at which point a single `invocation_ended` is forwarded
/// downstream carrying the slowest shard's elapsed time.
pub struct ShardMainMerger {
    downstream: Mutex<Vec<Box<dyn TestInvocationListener>>>,
    expected_shard_count: u32,
    state: Mutex<MergerState>,
}

impl ShardMainMerger {
    /// Creates a merger over `downstream_listeners`, expecting exactly `expected_shard_count`
    /// shards to report `invocation_ended` before it forwards one downstream.
    pub fn new(downstream_listeners: Vec<Box<dyn TestInvocationListener>>, expected_shard_count: u32) -> Self {
        Self {
            downstream: Mutex::new(downstream_listeners),
            expected_shard_count,
            state: Mutex::new(MergerState {
                invocation_started_forwarded: false,
                shards_ended: 0,
                max_elapsed_millis: 0,
            }),
        }
    }

    async fn on_invocation_started(&self, context_attributes: &BTreeMap<String, String>) {
        let mut state = self.state.lock().await;
        if state.invocation_started_forwarded {
            return;
        }
        state.invocation_started_forwarded = true;
        drop(state);

        let mut downstream = self.downstream.lock().await;
        for listener in downstream.iter_mut() {
            listener.invocation_started(context_attributes).await;
        }
    }

    async fn on_invocation_ended(&self, elapsed_millis: u64) {
        let elapsed_to_forward = {
            let mut state = self.state.lock().await;
            state.shards_ended += 1;
            state.max_elapsed_millis = state.max_elapsed_millis.max(elapsed_millis);
            if state.shards_ended < self.expected_shard_count {
                return;
            }
            state.max_elapsed_millis
        };

        let mut downstream = self.downstream.lock().await;
        for listener in downstream.iter_mut() {
            listener.invocation_ended(elapsed_to_forward).await;
        }
    }

    /// Merges `results` into one [`MergedModuleResult`].
    ///
    /// Device build attributes are unioned (order of the underlying values follows `shard_index`
    /// order, but the *set* of values per key is independent of input order). `Sum` group
    /// attributes are added, commutative by construction. `LastWriterWins` group attributes take
    /// the value from the result with the highest `shard_index`, which is why merging is
    /// well-defined regardless of the order `results` is iterated in.
    pub fn merge(results: &[ShardResult]) -> MergedModuleResult {
        let mut ordered: Vec<&ShardResult> = results.iter().collect();
        ordered.sort_by_key(|r| r.shard_index);

        let mut merged = MergedModuleResult::default();

        for result in ordered {
            for (device, attrs) in &result.device_build_attributes {
                merged
                    .device_build_attributes
                    .entry(device.clone())
                    .or_default()
                    .merge(attrs);
            }

            for (key, value) in &result.group_attributes {
                merged
                    .group_attributes
                    .entry(key.clone())
                    .and_modify(|existing| *existing = existing.clone().merge(value.clone()))
                    .or_insert_with(|| value.clone());
            }

            merged.elapsed = max_duration(merged.elapsed, result.elapsed);
        }

        merged
    }
}

macro_rules! forward_to_downstream {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        for listener in $self.merger.downstream.lock().await.iter_mut() {
            listener.$method($($arg),*).await;
        }
    };
}

/// One shard's view of a [`ShardMainMerger`]: the listener a shard's own invocation is driven
/// with, so every shard can run as if it owned the downstream listeners outright.
pub struct ShardListenerHandle {
    merger: Arc<ShardMainMerger>,
    #[allow(dead_code)]
    shard_index: u32,
}

impl ShardListenerHandle {
    /// Creates a handle for shard `shard_index` over `merger`.
    pub fn new(merger: Arc<ShardMainMerger>, shard_index: u32) -> Self {
        Self { merger, shard_index }
    }
}

#[async_trait]
impl TestInvocationListener for ShardListenerHandle {
    async fn invocation_started(&mut self, context_attributes: &BTreeMap<String, String>) {
        self.merger.on_invocation_started(context_attributes).await;
    }

    async fn test_module_started(&mut self, module_name: &str) {
        forward_to_downstream!(self, test_module_started, module_name);
    }

    async fn test_module_ended(&mut self) {
        forward_to_downstream!(self, test_module_ended);
    }

    async fn test_run_started(&mut self, run_name: &str, attempt_number: u32) {
        forward_to_downstream!(self, test_run_started, run_name, attempt_number);
    }

    async fn test_started(&mut self, test_name: &str) {
        forward_to_downstream!(self, test_started, test_name);
    }

    async fn test_failed(&mut self, test_name: &str, failure: &FailureDescription) {
        forward_to_downstream!(self, test_failed, test_name, failure);
    }

    async fn test_ignored(&mut self, test_name: &str) {
        forward_to_downstream!(self, test_ignored, test_name);
    }

    async fn test_ended(&mut self, test_name: &str, metrics: &BTreeMap<String, String>) {
        forward_to_downstream!(self, test_ended, test_name, metrics);
    }

    async fn test_run_failed(&mut self, failure: &FailureDescription) {
        forward_to_downstream!(self, test_run_failed, failure);
    }

    async fn test_run_ended(&mut self, elapsed_millis: u64, metrics: &BTreeMap<String, String>) {
        forward_to_downstream!(self, test_run_ended, elapsed_millis, metrics);
    }

    async fn test_log(&mut self, log_name: &str, data_type: LogDataType, path: &Utf8Path) {
        forward_to_downstream!(self, test_log, log_name, data_type, path);
    }

    async fn test_log_saved(&mut self, log_name: &str, saved_path: &Utf8Path) {
        forward_to_downstream!(self, test_log_saved, log_name, saved_path);
    }

    async fn log_association(&mut self, log_name: &str, test_name: &str) {
        forward_to_downstream!(self, log_association, log_name, test_name);
    }

    async fn invocation_failed(&mut self, failure: &FailureDescription) {
        forward_to_downstream!(self, invocation_failed, failure);
    }

    async fn invocation_ended(&mut self, elapsed_millis: u64) {
        self.merger.on_invocation_ended(elapsed_millis).await;
    }
}
