// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The [`TargetPreparer`] and [`MultiTargetPreparer`] capability traits.

use crate::context::{BuildInfo, InvocationContext};
use crate::errors::{FailureDescription, PreparerError};
use async_trait::async_trait;

/// Prepares a single device for a module, and tears that preparation back down afterward.
///
/// Preparers run in declaration order during setup and in *reverse* declaration order during
/// teardown (see [`crate::invocation::InvocationExecution`]), mirroring a stack discipline: the
/// last thing set up is the first thing torn down.
#[async_trait]
pub trait TargetPreparer: Send + Sync {
    /// A short name for logs and failure attribution.
    fn name(&self) -> &str;

    /// Prepares `device` for the module about to run.
    async fn set_up(&self, context: &InvocationContext, device_descriptor: &str) -> Result<(), PreparerError>;

    /// Reverses whatever [`set_up`](Self::set_up) did. Always called if `set_up` returned `Ok`,
    /// even if a later preparer or the tests themselves failed. `error` carries the failure
    /// that triggered teardown, if any.
    async fn tear_down(
        &self,
        context: &InvocationContext,
        device_descriptor: &str,
        error: Option<&PreparerError>,
    );

    /// Whether this preparer should be skipped entirely (both `set_up` and `tear_down`) when the
    /// module it is attached to has been marked disabled. Defaults to `false`: a disabled
    /// preparer still runs unless it opts out.
    fn is_disabled(&self) -> bool {
        false
    }

    /// Whether this preparer's `tear_down` specifically should be skipped, independent of
    /// [`is_disabled`](Self::is_disabled). A preparer can run `set_up` but opt out of its own
    /// teardown (or vice versa); the two checks are evaluated independently and combined with
    /// logical-or by the caller.
    fn is_tear_down_disabled(&self) -> bool {
        false
    }

    /// Returns `self` as a [`HostCleaner`], if this preparer also wants to run host-side cleanup
    /// once for the whole invocation. Defaults to `None`.
    fn as_host_cleaner(&self) -> Option<&dyn HostCleaner> {
        None
    }
}

/// Prepares multiple devices together for a module that spans more than one device slot (e.g.
/// a companion-device test). Unlike [`TargetPreparer`], this operates on the whole
/// [`InvocationContext`] rather than a single device, since cross-device coordination (pairing,
/// network bridging) is often needed.
#[async_trait]
pub trait MultiTargetPreparer: Send + Sync {
    /// A short name for logs and failure attribution.
    fn name(&self) -> &str;

    /// Prepares all allocated devices together.
    async fn set_up(&self, context: &InvocationContext) -> Result<(), PreparerError>;

    /// Reverses whatever [`set_up`](Self::set_up) did.
    async fn tear_down(&self, context: &InvocationContext, error: Option<&PreparerError>);

    /// Whether this preparer should be skipped entirely when disabled. See
    /// [`TargetPreparer::is_disabled`].
    fn is_disabled(&self) -> bool {
        false
    }

    /// Whether this preparer's `tear_down` specifically should be skipped. See
    /// [`TargetPreparer::is_tear_down_disabled`].
    fn is_tear_down_disabled(&self) -> bool {
        false
    }

    /// Returns `self` as a [`HostCleaner`], if this preparer also wants to run host-side cleanup
    /// once for the whole invocation. Defaults to `None`.
    fn as_host_cleaner(&self) -> Option<&dyn HostCleaner> {
        None
    }
}

/// An optional, invocation-scoped cleanup hook: unlike [`TargetPreparer::tear_down`], which runs
/// once per device per module, a `HostCleaner` runs exactly once per invocation, after every
/// device has been released, to reclaim host-side resources (temp directories, background
/// processes) a preparer accumulated across the whole run.
#[async_trait]
pub trait HostCleaner: Send + Sync {
    /// Releases host-side resources accumulated over the invocation. `build_info` is the build
    /// that was under test on the primary device, if one was fetched; `cause` is the failure (if
    /// any) that ended the invocation.
    async fn clean_up(&self, build_info: Option<&BuildInfo>, cause: Option<&FailureDescription>);
}
