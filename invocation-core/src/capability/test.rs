// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The [`RemoteTest`] capability trait and its optional sharding/configuration mix-ins.
//!
//! A single `RemoteTest` is the unit the [`crate::suite::ModuleSplitter`] reasons about, and the
//! unit a [`crate::retry::RetryDecision`] decides whether to rerun. A test that can describe how
//! to split itself implements [`ShardableTest`] in addition, and overrides
//! [`RemoteTest::as_shardable`] to expose it; a test that wants read access to the resolved
//! [`crate::config::CommandOptions`] implements [`ConfigurationReceiver`] and overrides
//! [`RemoteTest::as_configuration_receiver_mut`]. This lets code holding only a
//! `Box<dyn RemoteTest>` detect optional capabilities without downcasting through `dyn Any`.

use crate::capability::listener::TestInvocationListener;
use crate::config::CommandOptions;
use crate::context::InvocationContext;
use crate::errors::TestRunError;
use async_trait::async_trait;

/// A runnable unit of testing: anything from a single test method to an entire module's worth of
/// test methods collected behind one runner.
#[async_trait]
pub trait RemoteTest: Send + Sync {
    /// A short, stable name used in logs and in the default sharding split.
    fn name(&self) -> &str;

    /// Runs this test, reporting progress and results through `listener` as it goes.
    ///
    /// A `RemoteTest` that raises [`TestRunError::DeviceNotAvailable`] signals that the device
    /// is gone; the invocation engine still runs teardown before propagating that failure.
    async fn run(
        &self,
        context: &InvocationContext,
        listener: &mut dyn TestInvocationListener,
    ) -> Result<(), TestRunError>;

    /// Returns `self` as a [`ShardableTest`], if this test supports splitting. Defaults to
    /// `None`: tests with no opinion on sharding are left whole.
    fn as_shardable(&self) -> Option<&dyn ShardableTest> {
        None
    }

    /// Returns `self` as a mutable [`ConfigurationReceiver`], if this test wants configuration
    /// injected before it runs. Defaults to `None`.
    fn as_configuration_receiver_mut(&mut self) -> Option<&mut dyn ConfigurationReceiver> {
        None
    }

    /// Returns `self` as a mutable [`TestFilterReceiver`], if this test wants include/exclude
    /// filters pushed into it directly rather than being filtered externally. Defaults to `None`.
    fn as_test_filter_receiver_mut(&mut self) -> Option<&mut dyn TestFilterReceiver> {
        None
    }

    /// Returns `self` as a mutable [`MetricCollectorReceiver`], if this test wants the
    /// invocation's configured metric collectors pushed into it before it runs. Defaults to
    /// `None`.
    fn as_metric_collector_receiver_mut(&mut self) -> Option<&mut dyn MetricCollectorReceiver> {
        None
    }
}

/// A hint for how a [`ShardableTest`] should split itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ShardHint {
    /// The number of pieces to split into.
    pub shard_count: u32,
}

/// An optional mix-in for a [`RemoteTest`] that knows how to split itself into smaller,
/// independently runnable pieces.
///
/// A test with no opinion on sharding (the default) is left whole by the
/// [`crate::suite::ModuleSplitter`]; one that implements this but reports
/// [`is_strict_shardable`](Self::is_strict_shardable) as `false` may still be split only when
/// exactly one shard is requested (equivalent to not splitting).
pub trait ShardableTest: RemoteTest {
    /// Whether this test supports being split at all. Defaults to `true`; override to `false` to
    /// opt out unconditionally.
    fn is_shardable(&self) -> bool {
        true
    }

    /// Whether this test can be split into more than one non-trivial shard. A test that is
    /// shardable but not strictly shardable can only ever produce a single shard equal to
    /// itself.
    fn is_strict_shardable(&self) -> bool {
        true
    }

    /// Splits this test according to `hint`. Returns one [`RemoteTest`] per shard. Implementors
    /// should return a single-element vector containing a clone of themselves if splitting isn't
    /// possible for the given hint.
    fn split(&self, hint: ShardHint) -> Vec<Box<dyn RemoteTest>>;
}

/// An optional mix-in for a [`RemoteTest`] that wants to read the resolved command-line options
/// before it runs.
pub trait ConfigurationReceiver: RemoteTest {
    /// Called once, before [`RemoteTest::run`], with the fully resolved options.
    fn set_configuration_options(&mut self, options: &CommandOptions);
}

/// An optional mix-in for a [`RemoteTest`] that wants include/exclude filters applied internally
/// (e.g. a test runner that itself understands per-method filtering) instead of being filtered
/// from the outside by name.
pub trait TestFilterReceiver: RemoteTest {
    /// Adds a filter selecting tests to include. Repeated calls accumulate.
    fn add_include_filter(&mut self, filter: &str);

    /// Adds a filter selecting tests to exclude, applied after any include filters.
    fn add_exclude_filter(&mut self, filter: &str);
}

/// An optional mix-in for a [`RemoteTest`] that wants direct access to the invocation's
/// configured [`crate::capability::MetricCollector`]s, e.g. to report test-scoped metrics inline
/// as it runs rather than relying solely on the listener callbacks the collectors already
/// receive.
pub trait MetricCollectorReceiver: RemoteTest {
    /// Called once, before [`RemoteTest::run`], with the invocation's configured collectors.
    fn set_metric_collectors(&mut self, collectors: &[std::sync::Arc<dyn crate::capability::MetricCollector>]);
}
