// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The [`MetricCollector`] capability trait: invocation-scoped metric collection, hooked into
//! the same lifecycle events a [`crate::capability::TestInvocationListener`] sees.

use crate::context::InvocationContext;
use async_trait::async_trait;

/// Collects metrics across the life of one invocation.
///
/// [`init`](Self::init) is called at most once per invocation, before any module runs; a
/// collector that is configured into more than one invocation gets its own `init` call per
/// invocation, but never more than one within a single invocation regardless of how many modules
/// or shards run.
#[async_trait]
pub trait MetricCollector: Send + Sync {
    /// A short name for logs.
    fn name(&self) -> &str;

    /// Called exactly once, before the first module of the invocation runs.
    async fn init(&self, context: &InvocationContext);

    /// Called before each module's first (or only) attempt starts.
    async fn on_test_run_start(&self, module_name: &str);

    /// Called after each module's attempts are all done.
    async fn on_test_run_end(&self, module_name: &str);

    /// Called before an individual test case starts, if the module reports per-test granularity.
    async fn on_test_start(&self, module_name: &str, test_name: &str);

    /// Called after an individual test case ends.
    async fn on_test_end(&self, module_name: &str, test_name: &str);
}
