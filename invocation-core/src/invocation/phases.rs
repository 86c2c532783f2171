// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The ordered phases of one invocation's lifecycle.
//!
//! Each phase is its own free function rather than a method a subclass overrides: the ordering
//! and the always-runs-teardown discipline live in [`super::InvocationExecution::invoke`], and
//! each phase here is individually unit-testable without constructing a whole invocation.

use crate::capability::{BuildProvider, Device, HostCleaner, MultiTargetPreparer, TargetPreparer};
use crate::config::DeviceSlot;
use crate::context::{BuildInfo, InvocationContext};
use crate::errors::{
    BuildRetrievalError, DeviceSetupError, FailureDescription, FailureOrigin, FailureStatus,
    PreInvocationSetupError, PreparerError,
};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::time::Duration;

/// Phase 1: fetches a build for every device slot, concurrently.
///
/// A failure here is unrecoverable for the whole invocation: there is no device to tear down yet,
/// since pre-invocation setup (phase 2) hasn't run.
pub(crate) async fn fetch_artifacts(
    device_slots: &IndexMap<String, DeviceSlot>,
) -> Result<BTreeMap<String, BuildInfo>, BuildRetrievalError> {
    let fetches = device_slots.iter().map(|(descriptor, slot)| async move {
        slot.build_provider
            .fetch()
            .await
            .map(|build_info| (descriptor.clone(), build_info))
    });

    let results = futures::future::join_all(fetches).await;
    let mut builds = BTreeMap::new();
    for result in results {
        let (descriptor, build_info) = result?;
        builds.insert(descriptor, build_info);
    }
    Ok(builds)
}

/// Phase 2: runs [`Device::pre_invocation_setup`] for every device with its fetched build.
///
/// Runs sequentially unless `parallel` is set, in which case every device's setup runs
/// concurrently, bounded by `timeout` (a zero `timeout` means no bound). Devices whose setup
/// already completed before a later device fails are left as-is; this phase does not itself roll
/// anything back; [`Device::post_invocation_tear_down`] is always called for every device later
/// regardless of whether its setup ran, and is expected to be a no-op for a device whose setup
/// never happened.
pub(crate) async fn pre_invocation_setup(
    device_slots: &IndexMap<String, DeviceSlot>,
    builds: &BTreeMap<String, BuildInfo>,
    parallel: bool,
    timeout: Duration,
) -> Result<(), PreInvocationSetupError> {
    if !parallel {
        for (descriptor, slot) in device_slots {
            run_one_device_setup(descriptor, slot, builds).await?;
        }
        return Ok(());
    }

    let setups = device_slots
        .iter()
        .map(|(descriptor, slot)| run_one_device_setup(descriptor, slot, builds));
    let joined = futures::future::join_all(setups);

    let results = if timeout.is_zero() {
        joined.await
    } else {
        tokio::time::timeout(timeout, joined)
            .await
            .map_err(|_| PreInvocationSetupError {
                device_name: "<all devices>".to_string(),
                source: DeviceSetupError::Timeout,
            })?
    };

    for result in results {
        result?;
    }
    Ok(())
}

async fn run_one_device_setup(
    descriptor: &str,
    slot: &DeviceSlot,
    builds: &BTreeMap<String, BuildInfo>,
) -> Result<(), PreInvocationSetupError> {
    let build_info = builds
        .get(descriptor)
        .expect("fetch_artifacts populates one build per device slot");
    slot.device
        .pre_invocation_setup(build_info)
        .await
        .map_err(|source| PreInvocationSetupError {
            device_name: descriptor.to_string(),
            source,
        })
}

/// One entry in the fully ordered setup/teardown sequence: the three preparer groups (`multiPre`,
/// per-device, `multi`) unified behind a single interface so [`setup`]/[`tear_down`] can treat
/// them uniformly.
pub(crate) enum PreparerStep<'a> {
    /// A preparer that runs across every device before any per-device preparer.
    MultiPre(&'a dyn MultiTargetPreparer),
    /// A preparer bound to one device slot.
    PerDevice(&'a dyn TargetPreparer, &'a str),
    /// A preparer that runs across every device after every per-device preparer.
    Multi(&'a dyn MultiTargetPreparer),
}

impl PreparerStep<'_> {
    fn is_disabled(&self) -> bool {
        match self {
            Self::MultiPre(p) | Self::Multi(p) => p.is_disabled(),
            Self::PerDevice(p, _) => p.is_disabled(),
        }
    }

    fn is_tear_down_disabled(&self) -> bool {
        match self {
            Self::MultiPre(p) | Self::Multi(p) => p.is_tear_down_disabled(),
            Self::PerDevice(p, _) => p.is_tear_down_disabled(),
        }
    }

    fn as_host_cleaner(&self) -> Option<&dyn HostCleaner> {
        match self {
            Self::MultiPre(p) | Self::Multi(p) => p.as_host_cleaner(),
            Self::PerDevice(p, _) => p.as_host_cleaner(),
        }
    }

    async fn set_up(&self, context: &InvocationContext) -> Result<(), PreparerError> {
        match self {
            Self::MultiPre(p) | Self::Multi(p) => p.set_up(context).await,
            Self::PerDevice(p, device_descriptor) => p.set_up(context, device_descriptor).await,
        }
    }

    async fn tear_down(&self, context: &InvocationContext, error: Option<&PreparerError>) {
        match self {
            Self::MultiPre(p) | Self::Multi(p) => p.tear_down(context, error).await,
            Self::PerDevice(p, device_descriptor) => p.tear_down(context, device_descriptor, error).await,
        }
    }
}

/// Builds the full ordered setup sequence per the configuration's three preparer groups:
/// `multiPre` first, then every device slot's own preparers in allocation order, then `multi`
/// last. This is the order [`setup`]/[`tear_down`] (reversed) run in.
pub(crate) fn build_preparer_steps<'a>(
    multi_pre_target_preparers: &'a [Box<dyn MultiTargetPreparer>],
    device_slots: &'a IndexMap<String, DeviceSlot>,
    multi_target_preparers: &'a [Box<dyn MultiTargetPreparer>],
) -> Vec<PreparerStep<'a>> {
    let mut steps = Vec::new();
    for preparer in multi_pre_target_preparers {
        steps.push(PreparerStep::MultiPre(preparer.as_ref()));
    }
    for slot in device_slots.values() {
        for preparer in &slot.preparers {
            steps.push(PreparerStep::PerDevice(preparer.as_ref(), &slot.descriptor));
        }
    }
    for preparer in multi_target_preparers {
        steps.push(PreparerStep::Multi(preparer.as_ref()));
    }
    steps
}

/// Runs every [`PreparerStep`]'s `set_up`, in order, skipping disabled steps. Returns how many
/// were attempted (including skipped ones) before the first failure, or the full count on
/// success, so the caller knows exactly which prefix [`tear_down`] needs to unwind.
pub(crate) async fn setup(
    steps: &[PreparerStep<'_>],
    context: &InvocationContext,
) -> (usize, Result<(), PreparerError>) {
    for (index, step) in steps.iter().enumerate() {
        if step.is_disabled() {
            continue;
        }
        if let Err(err) = step.set_up(context).await {
            return (index, Err(err));
        }
    }
    (steps.len(), Ok(()))
}

/// Tears down every step in `steps[..succeeded_count]`, in reverse order, skipping any step that
/// opted out via [`TargetPreparer::is_disabled`]/[`is_tear_down_disabled`][TargetPreparer::is_tear_down_disabled]
/// (or the [`MultiTargetPreparer`] equivalents).
pub(crate) async fn tear_down(
    steps: &[PreparerStep<'_>],
    context: &InvocationContext,
    succeeded_count: usize,
    error: Option<&PreparerError>,
) {
    for step in steps[..succeeded_count].iter().rev() {
        if step.is_disabled() || step.is_tear_down_disabled() {
            continue;
        }
        step.tear_down(context, error).await;
    }
}

/// Collects every [`HostCleaner`] mixed into `steps`, in step order.
pub(crate) fn host_cleaners<'a>(steps: &'a [PreparerStep<'a>]) -> Vec<&'a dyn HostCleaner> {
    steps.iter().filter_map(PreparerStep::as_host_cleaner).collect()
}

/// Phase 6: runs [`Device::post_invocation_tear_down`] for every device, regardless of how the
/// invocation ended. `cause` is the failure (if any) that ended the invocation.
pub(crate) async fn post_invocation_tear_down(
    device_slots: &IndexMap<String, DeviceSlot>,
    cause: Option<&FailureDescription>,
) {
    for slot in device_slots.values() {
        slot.device.post_invocation_tear_down(cause).await;
    }
}

/// Phase 7: releases every fetched build, then runs every configured [`HostCleaner`]. Always
/// runs, regardless of how earlier phases went.
pub(crate) async fn clean_up(
    device_slots: &IndexMap<String, DeviceSlot>,
    builds: &BTreeMap<String, BuildInfo>,
    host_cleaners: &[&dyn HostCleaner],
    primary_build_info: Option<&BuildInfo>,
    cause: Option<&FailureDescription>,
) {
    for (descriptor, slot) in device_slots {
        if let Some(build_info) = builds.get(descriptor) {
            slot.build_provider.clean_up(build_info).await;
        }
    }
    for cleaner in host_cleaners {
        cleaner.clean_up(primary_build_info, cause).await;
    }
}

/// Classifies a [`DeviceSetupError`] the way [`pre_invocation_setup`] surfaces it, for callers
/// that need a [`FailureDescription`] instead of the raw error.
pub(crate) fn device_setup_failure(device_name: &str, error: &DeviceSetupError) -> FailureDescription {
    let message = format!("device `{device_name}`: {error}");
    match error {
        DeviceSetupError::DeviceNotAvailable(_) => {
            FailureDescription::new(message, FailureStatus::DeviceLost)
        }
        DeviceSetupError::Timeout => FailureDescription::new(message, FailureStatus::InfraFailure),
        DeviceSetupError::Other(_) => FailureDescription::new(message, FailureStatus::InfraFailure),
    }
    .with_action_in_progress(FailureOrigin::Setup)
}
