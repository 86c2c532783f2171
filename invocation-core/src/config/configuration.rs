// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`Configuration`]: the fully resolved set of capability implementations and options that
//! drive one invocation.

use crate::capability::{
    BuildProvider, Device, DeviceRecovery, LogSaver, MetricCollector, MultiTargetPreparer,
    SystemStatusChecker, TargetPreparer, TestInvocationListener,
};
use crate::config::command_options::CommandOptions;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One device slot's worth of capability implementations: the device handle itself, the build
/// provider that supplies its build, and the preparers that run against it.
pub struct DeviceSlot {
    /// The device descriptor this slot is keyed by.
    pub descriptor: String,
    /// The device handle.
    pub device: Arc<dyn Device>,
    /// Supplies the build under test for this device.
    pub build_provider: Box<dyn BuildProvider>,
    /// Per-device preparers, run in order during setup and reverse order during teardown.
    pub preparers: Vec<Box<dyn TargetPreparer>>,
    /// Attempted when this slot's device is detected lost, before giving up on it entirely.
    pub device_recovery: Option<Arc<dyn DeviceRecovery>>,
    /// Free-form per-device tuning knobs (e.g. connection timeouts, flash tool flags) that don't
    /// warrant their own typed field.
    pub device_options: BTreeMap<String, String>,
}

impl DeviceSlot {
    /// Creates a device slot with no preparers, no recovery, and no extra options.
    pub fn new(
        descriptor: impl Into<String>,
        device: Arc<dyn Device>,
        build_provider: Box<dyn BuildProvider>,
    ) -> Self {
        Self {
            descriptor: descriptor.into(),
            device,
            build_provider,
            preparers: Vec::new(),
            device_recovery: None,
            device_options: BTreeMap::new(),
        }
    }

    /// Appends a per-device preparer, returning `self` for chaining.
    pub fn with_preparer(mut self, preparer: Box<dyn TargetPreparer>) -> Self {
        self.preparers.push(preparer);
        self
    }

    /// Sets the device-recovery handler, returning `self` for chaining.
    pub fn with_device_recovery(mut self, recovery: Arc<dyn DeviceRecovery>) -> Self {
        self.device_recovery = Some(recovery);
        self
    }

    /// Sets a free-form device option, returning `self` for chaining.
    pub fn with_device_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.device_options.insert(key.into(), value.into());
        self
    }
}

/// The fully resolved configuration an invocation is built from.
///
/// Unlike a loosely typed option bag populated by reflection, every field here has a concrete
/// type; a harness's configuration-file or command-line layer is responsible for producing one
/// of these before handing it to [`crate::invocation::InvocationExecution`].
pub struct Configuration {
    /// The device slots allocated to this invocation, in allocation order. The first slot is the
    /// default primary unless `primary_device_descriptor` says otherwise.
    pub device_slots: IndexMap<String, DeviceSlot>,

    /// Which device slot is primary. Required when more than one slot is present.
    pub primary_device_descriptor: Option<String>,

    /// Preparers that run once across every allocated device, before any per-device preparer.
    pub multi_pre_target_preparers: Vec<Box<dyn MultiTargetPreparer>>,

    /// Preparers that coordinate across every allocated device at once, after every per-device
    /// preparer has run.
    pub multi_target_preparers: Vec<Box<dyn MultiTargetPreparer>>,

    /// Checkers run immediately before and after each module.
    pub system_status_checkers: Vec<Box<dyn SystemStatusChecker>>,

    /// Metric collectors attached to this invocation. [`MetricCollector::init`] is called at most
    /// once per invocation, before the suite runs.
    pub metric_collectors: Vec<Arc<dyn MetricCollector>>,

    /// Where test logs are durably persisted.
    pub log_saver: Option<Arc<dyn LogSaver>>,

    /// Every listener to fan invocation/module/test events out to.
    pub listeners: Vec<Box<dyn TestInvocationListener>>,

    /// The resolved command-line/config-file options.
    pub options: CommandOptions,
}

impl Configuration {
    /// Creates an empty configuration with default options and no devices, preparers, or
    /// listeners. Intended as a builder starting point.
    pub fn new(options: CommandOptions) -> Self {
        Self {
            device_slots: IndexMap::new(),
            primary_device_descriptor: None,
            multi_pre_target_preparers: Vec::new(),
            multi_target_preparers: Vec::new(),
            system_status_checkers: Vec::new(),
            metric_collectors: Vec::new(),
            log_saver: None,
            listeners: Vec::new(),
            options,
        }
    }

    /// Adds a device slot, returning `self` for chaining.
    pub fn with_device_slot(mut self, slot: DeviceSlot) -> Self {
        self.device_slots.insert(slot.descriptor.clone(), slot);
        self
    }

    /// Appends a `multiPre` preparer, returning `self` for chaining.
    pub fn with_multi_pre_target_preparer(mut self, preparer: Box<dyn MultiTargetPreparer>) -> Self {
        self.multi_pre_target_preparers.push(preparer);
        self
    }

    /// Appends a `multi` preparer, returning `self` for chaining.
    pub fn with_multi_target_preparer(mut self, preparer: Box<dyn MultiTargetPreparer>) -> Self {
        self.multi_target_preparers.push(preparer);
        self
    }

    /// Appends a metric collector, returning `self` for chaining.
    pub fn with_metric_collector(mut self, collector: Arc<dyn MetricCollector>) -> Self {
        self.metric_collectors.push(collector);
        self
    }

    /// Appends a listener, returning `self` for chaining.
    pub fn with_listener(mut self, listener: Box<dyn TestInvocationListener>) -> Self {
        self.listeners.push(listener);
        self
    }
}
