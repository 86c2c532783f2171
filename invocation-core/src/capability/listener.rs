// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`TestInvocationListener`]: the fan-out sink for invocation, module, and test events.

use crate::errors::FailureDescription;
use async_trait::async_trait;
use camino::Utf8Path;
use std::collections::BTreeMap;

/// The log data type a saved log file represents, used to pick a viewer/renderer downstream.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LogDataType {
    /// Plain text, e.g. logcat or a test runner's stdout.
    Text,
    /// A zip archive of multiple files.
    Zip,
    /// A protobuf-encoded trace or perfetto capture.
    Proto,
    /// An arbitrary binary blob.
    Binary,
}

/// Receives every event the invocation engine raises, from invocation start through invocation
/// end, across every module and every test.
///
/// Methods are async since a real listener (in particular [`crate::reporter::LogSaverResultForwarder`])
/// needs to await I/O — persisting a log, uploading a report — while handling an event. A
/// listener implementation must not panic; any error it needs to surface should be logged and
/// swallowed rather than propagated, since the engine fans events out to every listener and one
/// listener's failure must not interrupt delivery to the others. Methods take `&mut self` since
/// most real listeners accumulate state (a report tree, a JUnit writer) as events arrive.
#[async_trait]
pub trait TestInvocationListener: Send {
    /// The invocation has begun. `context_attributes` is the initial flat attribute map merged
    /// from the invocation context.
    async fn invocation_started(&mut self, context_attributes: &BTreeMap<String, String>) {
        let _ = context_attributes;
    }

    /// A module (and its device-specific identifier, if more than one device participated) has
    /// started.
    async fn test_module_started(&mut self, module_name: &str) {
        let _ = module_name;
    }

    /// A module has ended.
    async fn test_module_ended(&mut self) {}

    /// A test run (one attempt of one module, or one shard of one module) has started.
    /// `attempt_number` is zero-based.
    async fn test_run_started(&mut self, run_name: &str, attempt_number: u32) {
        let _ = (run_name, attempt_number);
    }

    /// A single test case within the current run has started.
    async fn test_started(&mut self, test_name: &str) {
        let _ = test_name;
    }

    /// A single test case failed. Does not terminate the run; more tests may still be reported.
    async fn test_failed(&mut self, test_name: &str, failure: &FailureDescription) {
        let _ = (test_name, failure);
    }

    /// A single test case was skipped entirely (not executed, and not counted as a failure).
    async fn test_ignored(&mut self, test_name: &str) {
        let _ = test_name;
    }

    /// A single test case finished (pass, fail, or ignored all reach this).
    async fn test_ended(&mut self, test_name: &str, metrics: &BTreeMap<String, String>) {
        let _ = (test_name, metrics);
    }

    /// The current test run failed as a whole (distinct from an individual test case failing),
    /// e.g. the process hosting the tests crashed mid-run.
    async fn test_run_failed(&mut self, failure: &FailureDescription) {
        let _ = failure;
    }

    /// The current test run ended, having executed `elapsed_millis` of wall-clock time.
    async fn test_run_ended(&mut self, elapsed_millis: u64, metrics: &BTreeMap<String, String>) {
        let _ = (elapsed_millis, metrics);
    }

    /// A raw log (console output, a device log snapshot) became available, named `log_name`, of
    /// the given type.
    async fn test_log(&mut self, log_name: &str, data_type: LogDataType, path: &Utf8Path) {
        let _ = (log_name, data_type, path);
    }

    /// A log previously passed to [`test_log`](Self::test_log) was durably saved and is now
    /// addressable at `saved_path` (e.g. uploaded, or moved to a results directory).
    async fn test_log_saved(&mut self, log_name: &str, saved_path: &Utf8Path) {
        let _ = (log_name, saved_path);
    }

    /// Associates a previously saved log (by `log_name`) with the currently running test or run,
    /// for listeners that file logs per-test rather than per-invocation.
    async fn log_association(&mut self, log_name: &str, test_name: &str) {
        let _ = (log_name, test_name);
    }

    /// The invocation failed outright (as opposed to individual test failures).
    async fn invocation_failed(&mut self, failure: &FailureDescription) {
        let _ = failure;
    }

    /// The invocation has ended, having executed `elapsed_millis` of wall-clock time across every
    /// device shard.
    async fn invocation_ended(&mut self, elapsed_millis: u64) {
        let _ = elapsed_millis;
    }
}
