// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`SystemStatusChecker`]: the capability that validates device/system health at module
//! boundaries.

use crate::context::InvocationContext;
use async_trait::async_trait;

/// Checks some aspect of system health (e.g. free storage, running processes) both immediately
/// before and immediately after a module runs. If the pre- and post- results disagree, the
/// [`crate::suite::SuiteScheduler`] raises `MODULE_CHANGED_SYSTEM_STATUS` for that module.
#[async_trait]
pub trait SystemStatusChecker: Send + Sync {
    /// A short name for logs and failure attribution.
    fn name(&self) -> &str;

    /// Captures the current status. Called once before the module and once after; the two
    /// snapshots are compared with [`PartialEq`].
    async fn check_status(&self, context: &InvocationContext) -> SystemStatusSnapshot;
}

/// An opaque, comparable snapshot of whatever a [`SystemStatusChecker`] inspects.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SystemStatusSnapshot {
    /// A free-form description suitable for logging when two snapshots disagree.
    pub description: String,
    /// The comparable fingerprint. Two snapshots are considered to match the module's health
    /// constraint iff their fingerprints are equal.
    pub fingerprint: String,
}
