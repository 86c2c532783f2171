// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits: the seams a concrete harness plugs concrete devices, builds, preparers,
//! tests, and sinks into.
//!
//! Each capability is a small, independent trait rather than a deep class hierarchy. A test
//! implementation picks up additional behavior (sharding, configuration injection) by also
//! implementing an optional mix-in trait and overriding the matching `as_*` accessor on
//! [`RemoteTest`], not by the engine downcasting a `dyn Any`.

mod device;
mod listener;
mod log_saver;
mod metric_collector;
mod preparer;
mod remote_file;
mod system_status;
mod test;

pub use device::{BuildProvider, Device, DeviceBuildType, DeviceRecovery};
pub use listener::{LogDataType, TestInvocationListener};
pub use log_saver::{LogSaveError, LogSaver};
pub use metric_collector::MetricCollector;
pub use preparer::{HostCleaner, MultiTargetPreparer, TargetPreparer};
pub use remote_file::{RemoteFileError, RemoteFileResolver};
pub use system_status::{SystemStatusChecker, SystemStatusSnapshot};
pub use test::{
    ConfigurationReceiver, MetricCollectorReceiver, RemoteTest, ShardHint, ShardableTest,
    TestFilterReceiver,
};
