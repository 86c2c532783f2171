// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The [`Device`] and [`BuildProvider`] capability traits.
//!
//! Neither trait talks to real hardware or a real artifact store here; a concrete harness
//! supplies those. The engine only depends on the shapes below.

use crate::context::BuildInfo;
use crate::errors::{BuildRetrievalError, DeviceSetupError};
use async_trait::async_trait;
use std::fmt;

/// The provisioning level a device was flashed with, mirrored from the Android build-type
/// convention since it is the most common axis a preparer branches on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DeviceBuildType {
    /// A production, locked-down build.
    User,
    /// A production build with debugging affordances enabled.
    UserDebug,
    /// An engineering build with all debugging affordances enabled.
    Eng,
}

impl fmt::Display for DeviceBuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::UserDebug => "userdebug",
            Self::Eng => "eng",
        };
        f.write_str(s)
    }
}

/// A single allocated device.
///
/// Implementations are expected to be cheap `Clone`-free handles (an `Arc` around a connection,
/// typically); the engine stores them as `Arc<dyn Device>` since the same device participates in
/// setup, every test, and teardown.
#[async_trait]
pub trait Device: Send + Sync {
    /// A short, stable identifier for this device, used in logs and in per-device build-info
    /// maps. Must be unique within one [`crate::context::InvocationContext`].
    fn device_descriptor(&self) -> &str;

    /// The provisioning level this device was flashed with.
    fn build_type(&self) -> DeviceBuildType;

    /// Runs before the invocation's `setUp` phase, once per device, with the build that was
    /// fetched for it. Typically flashes the build or verifies it is already installed.
    async fn pre_invocation_setup(&self, build_info: &BuildInfo) -> Result<(), DeviceSetupError>;

    /// Runs after the invocation's teardown phase, once per device, regardless of how the
    /// invocation ended. `cause` carries the failure that ended the invocation, if any, so the
    /// device can decide whether to collect a bugreport before releasing.
    async fn post_invocation_tear_down(&self, cause: Option<&crate::errors::FailureDescription>);

    /// Reboots the device. Used by recovery paths after a lost-device failure, and by preparers
    /// that need a clean boot between modules.
    async fn reboot(&self) -> Result<(), DeviceSetupError>;

    /// Returns whether the device currently responds, without raising. Used by system-status
    /// checks and by the suite scheduler's device-lost recovery path.
    async fn is_reachable(&self) -> bool;
}

/// Attempts to recover a device that has become unreachable, before the suite scheduler gives up
/// on it as lost. A device slot's recovery is tried at most once per detected loss; if it
/// succeeds the module that was running when the device was lost is still reported as failed,
/// but subsequent modules on that slot are allowed to proceed.
#[async_trait]
pub trait DeviceRecovery: Send + Sync {
    /// Attempts to bring `device` back to a reachable state.
    async fn recover(&self, device: &dyn Device) -> Result<(), DeviceSetupError>;
}

/// Supplies the build under test for one device.
///
/// One `BuildProvider` is consulted per device slot in the [`crate::context::InvocationContext`];
/// the resulting [`BuildInfo`] is keyed by [`Device::device_descriptor`] in the context's
/// per-device build-info map.
#[async_trait]
pub trait BuildProvider: Send + Sync {
    /// The build ID this provider was configured to fetch, for logging before the fetch
    /// completes.
    fn requested_build_id(&self) -> &str;

    /// Fetches (downloads, or resolves a local path to) the build under test.
    async fn fetch(&self) -> Result<BuildInfo, BuildRetrievalError>;

    /// Releases any resources (temp files, handles) held for a previously fetched build.
    /// Always called exactly once per successful [`fetch`](Self::fetch), during invocation
    /// cleanup, regardless of how the invocation ended.
    async fn clean_up(&self, build_info: &BuildInfo);
}
