// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`InvocationExecution`]: the top-level state machine that runs one invocation end to end.
//!
//! The seven phases run in this fixed order: fetch artifacts, pre-invocation device setup,
//! cross-device setup, the test suite itself, cross-device teardown, post-invocation device
//! teardown, and build cleanup. The last three phases always run once the listener has been
//! notified the invocation started, regardless of which earlier phase failed, mirroring a stack:
//! whatever was set up gets torn down, in reverse, even when something later in the stack blew
//! up.

mod phases;

use crate::capability::TestInvocationListener;
use crate::config::{Configuration, DeviceSlot};
use crate::context::{BuildInfo, ConfigurationDescriptor, InvocationContext};
use crate::errors::{FailureDescription, FailureStatus, InvocationError};
use crate::observability::invocation_span;
use crate::reporter::{LogSaverResultForwarder, ResultForwarder};
use crate::suite::{expand_modules, DeviceLostPolicy, ModuleDefinition, ModuleOutcome, ModuleSplitter, SuiteScheduler};
use crate::time::stopwatch;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Instrument;

/// The outcome of one full invocation.
#[derive(Debug)]
pub struct InvocationResult {
    /// Whether the invocation completed all its phases without an engine-level failure. Test
    /// failures inside `module_outcomes` do not affect this.
    pub completed: bool,
    /// The engine-level failure that ended the invocation early, if any.
    pub failure: Option<FailureDescription>,
    /// Every module's outcome, in the order they ran. Empty if the invocation never reached the
    /// test phase.
    pub module_outcomes: Vec<ModuleOutcome>,
    /// Total wall-clock time the invocation ran for.
    pub elapsed_millis: u64,
}

/// Drives one invocation from a [`Configuration`] and a pre-expanded, pre-filtered module list
/// through every phase described in the module docs above.
pub struct InvocationExecution;

impl InvocationExecution {
    /// Runs the full invocation lifecycle.
    pub async fn invoke(
        mut configuration: Configuration,
        modules: Vec<ModuleDefinition>,
        configuration_descriptor: ConfigurationDescriptor,
    ) -> InvocationResult {
        let span = invocation_span(&configuration_descriptor.name);
        let listener = take_listener(&mut configuration);
        Self::invoke_inner(configuration, modules, configuration_descriptor, listener)
            .instrument(span)
            .await
    }

    /// Runs `shards` independently and concurrently, merging their events through one
    /// [`ShardMainMerger`] so `downstream_listeners` sees a single `invocation_started` and a
    /// single `invocation_ended` regardless of how many shards ran.
    ///
    /// Each shard's own [`Configuration::listeners`] and [`Configuration::log_saver`] are ignored;
    /// `downstream_listeners`/`log_saver` given here are shared across every shard instead. Shards
    /// run via [`futures::future::join_all`] rather than individually spawned tasks, since a
    /// `Configuration` borrows capability trait objects that aren't required to be `'static`.
    pub async fn invoke_sharded(
        shards: Vec<(Configuration, Vec<ModuleDefinition>, ConfigurationDescriptor)>,
        downstream_listeners: Vec<Box<dyn TestInvocationListener>>,
        log_saver: Option<Arc<dyn crate::capability::LogSaver>>,
    ) -> Vec<InvocationResult> {
        let shard_count = shards.len() as u32;
        let downstream: Box<dyn TestInvocationListener> = match &log_saver {
            Some(log_saver) => Box::new(LogSaverResultForwarder::new(
                log_saver.clone(),
                Box::new(ResultForwarder::new(downstream_listeners)),
            )),
            None => Box::new(ResultForwarder::new(downstream_listeners)),
        };
        let merger = Arc::new(crate::shard::ShardMainMerger::new(vec![downstream], shard_count));

        let runs = shards
            .into_iter()
            .enumerate()
            .map(|(index, (mut configuration, modules, configuration_descriptor))| {
                // Each shard's own listeners/log_saver are discarded: every shard's events flow
                // through `merger` into the one shared `downstream` built above instead.
                let _ = take_listener(&mut configuration);
                let span = crate::observability::shard_span(index as u32);
                let listener: Box<dyn TestInvocationListener> =
                    Box::new(crate::shard::ShardListenerHandle::new(merger.clone(), index as u32));
                Self::invoke_inner(configuration, modules, configuration_descriptor, listener).instrument(span)
            });

        futures::future::join_all(runs).await
    }

    async fn invoke_inner(
        configuration: Configuration,
        modules: Vec<ModuleDefinition>,
        configuration_descriptor: ConfigurationDescriptor,
        mut listener: Box<dyn TestInvocationListener>,
    ) -> InvocationResult {
        let stopwatch = stopwatch();
        let device_slots = configuration.device_slots;
        let primary_device_descriptor = configuration.primary_device_descriptor;
        let multi_pre_target_preparers = configuration.multi_pre_target_preparers;
        let multi_target_preparers = configuration.multi_target_preparers;
        let system_status_checkers = configuration.system_status_checkers;
        let metric_collectors = configuration.metric_collectors;
        let options = configuration.options;

        let modules = Self::expand_and_shard_modules(modules, &options);

        listener.invocation_started(&BTreeMap::new()).await;

        let builds = match phases::fetch_artifacts(&device_slots).await {
            Ok(builds) => builds,
            Err(err) => {
                return Self::abort_before_context(
                    &stopwatch,
                    &device_slots,
                    &BTreeMap::new(),
                    listener.as_mut(),
                    InvocationError::BuildRetrieval(err).to_failure_description(),
                )
                .await;
            }
        };

        if let Err(err) = phases::pre_invocation_setup(
            &device_slots,
            &builds,
            options.parallel_pre_invocation_setup,
            options.parallel_pre_invocation_setup_timeout,
        )
        .await
        {
            let failure = phases::device_setup_failure(&err.device_name, &err.source);
            return Self::abort_before_context(&stopwatch, &device_slots, &builds, listener.as_mut(), failure).await;
        }

        let context = match build_context(&device_slots, &builds, primary_device_descriptor, configuration_descriptor)
        {
            Ok(context) => context,
            Err(err) => {
                let failure = FailureDescription::new(err.to_string(), FailureStatus::InfraFailure);
                return Self::abort_before_context(&stopwatch, &device_slots, &builds, listener.as_mut(), failure).await;
            }
        };

        for collector in &metric_collectors {
            collector.init(&context).await;
        }

        let steps = phases::build_preparer_steps(&multi_pre_target_preparers, &device_slots, &multi_target_preparers);
        let (succeeded_count, setup_result) = phases::setup(&steps, &context).await;

        let (module_outcomes, failure) = if let Err(err) = setup_result {
            let failure = err.to_failure_description();
            listener.invocation_failed(&failure).await;
            (Vec::new(), Some(failure))
        } else {
            let device_lost_policy = if options.abort_invocation_on_device_lost {
                DeviceLostPolicy::AbortInvocation
            } else {
                DeviceLostPolicy::SkipRemainingOnDevice
            };
            let scheduler = SuiteScheduler::new(&context, &system_status_checkers, device_lost_policy);
            let module_outcomes = scheduler.run(modules, listener.as_mut()).await;
            (module_outcomes, None)
        };

        phases::tear_down(&steps, &context, succeeded_count, None).await;
        phases::post_invocation_tear_down(&device_slots, failure.as_ref()).await;

        let primary_build_info = context.build_info_for(context.primary_device().device_descriptor());
        let host_cleaners = phases::host_cleaners(&steps);
        phases::clean_up(&device_slots, &builds, &host_cleaners, primary_build_info, failure.as_ref()).await;

        let elapsed_millis = stopwatch.snapshot().elapsed.as_millis() as u64;
        listener.invocation_ended(elapsed_millis).await;

        InvocationResult {
            completed: failure.is_none(),
            failure,
            module_outcomes,
            elapsed_millis,
        }
    }

    /// Expands every module across its abi/parameter variants, splits any strictly shardable test
    /// into this invocation's configured shard count, then keeps only the pieces
    /// [`crate::config::CommandOptions::shard_spec`] assigns to this shard. With no shard spec
    /// configured, every expanded module runs whole in this one invocation.
    fn expand_and_shard_modules(
        modules: Vec<ModuleDefinition>,
        options: &crate::config::CommandOptions,
    ) -> Vec<ModuleDefinition> {
        let expanded = expand_modules(modules, &options.abis, options);
        let total_shards = options.shard_spec.as_ref().map(|s| s.total_shards()).unwrap_or(1);
        let split: Vec<ModuleDefinition> = expanded
            .into_iter()
            .flat_map(|module| ModuleSplitter::split(module, total_shards))
            .collect();

        match &options.shard_spec {
            Some(spec) => split
                .into_iter()
                .enumerate()
                .filter(|(index, module)| spec.matches(*index as u32, &module.name))
                .map(|(_, module)| module)
                .collect(),
            None => split,
        }
    }

    /// Ends the invocation before an [`InvocationContext`] could be built: still runs device and
    /// build teardown for whatever succeeded so far, and still notifies `listener`.
    async fn abort_before_context(
        stopwatch: &crate::time::StopwatchStart,
        device_slots: &IndexMap<String, DeviceSlot>,
        builds: &BTreeMap<String, BuildInfo>,
        listener: &mut dyn TestInvocationListener,
        failure: FailureDescription,
    ) -> InvocationResult {
        listener.invocation_failed(&failure).await;
        phases::post_invocation_tear_down(device_slots, Some(&failure)).await;
        phases::clean_up(device_slots, builds, &[], None, Some(&failure)).await;

        let elapsed_millis = stopwatch.snapshot().elapsed.as_millis() as u64;
        listener.invocation_ended(elapsed_millis).await;

        InvocationResult {
            completed: false,
            failure: Some(failure),
            module_outcomes: Vec::new(),
            elapsed_millis,
        }
    }
}

/// Drains `configuration`'s listeners and log saver into one [`TestInvocationListener`], leaving
/// both fields empty/`None` so `configuration` can still be moved whole afterward.
fn take_listener(configuration: &mut Configuration) -> Box<dyn TestInvocationListener> {
    let listeners = std::mem::take(&mut configuration.listeners);
    let log_saver = configuration.log_saver.take();
    let result_forwarder = ResultForwarder::new(listeners);
    match log_saver {
        Some(log_saver) => Box::new(LogSaverResultForwarder::new(log_saver, Box::new(result_forwarder))),
        None => Box::new(result_forwarder),
    }
}

fn build_context(
    device_slots: &IndexMap<String, DeviceSlot>,
    builds: &BTreeMap<String, BuildInfo>,
    primary_device_descriptor: Option<String>,
    configuration_descriptor: ConfigurationDescriptor,
) -> Result<InvocationContext, crate::context::InvocationContextError> {
    let devices: IndexMap<String, Arc<dyn crate::capability::Device>> = device_slots
        .iter()
        .map(|(descriptor, slot)| (descriptor.clone(), slot.device.clone()))
        .collect();

    let primary = primary_device_descriptor
        .unwrap_or_else(|| device_slots.keys().next().cloned().unwrap_or_default());

    InvocationContext::new(devices, primary, builds.clone(), configuration_descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Device, DeviceBuildType, RemoteTest};
    use crate::config::{CommandOptions, Configuration, DeviceSlot, RetryPolicy};
    use crate::errors::{BuildRetrievalError, DeviceSetupError, TestRunError};
    use crate::suite::ModuleDefinition;
    use async_trait::async_trait;
    use std::sync::{Arc as StdArc, Mutex};

    struct FakeDevice {
        descriptor: String,
        fails_setup: bool,
    }

    #[async_trait]
    impl Device for FakeDevice {
        fn device_descriptor(&self) -> &str {
            &self.descriptor
        }

        fn build_type(&self) -> DeviceBuildType {
            DeviceBuildType::UserDebug
        }

        async fn pre_invocation_setup(&self, _build_info: &BuildInfo) -> Result<(), DeviceSetupError> {
            if self.fails_setup {
                Err(DeviceSetupError::DeviceNotAvailable("never came online".to_string()))
            } else {
                Ok(())
            }
        }

        async fn post_invocation_tear_down(&self, _cause: Option<&FailureDescription>) {}

        async fn reboot(&self) -> Result<(), DeviceSetupError> {
            Ok(())
        }

        async fn is_reachable(&self) -> bool {
            true
        }
    }

    struct FakeBuildProvider {
        build_id: String,
        fails: bool,
    }

    #[async_trait]
    impl crate::capability::BuildProvider for FakeBuildProvider {
        fn requested_build_id(&self) -> &str {
            &self.build_id
        }

        async fn fetch(&self) -> Result<BuildInfo, BuildRetrievalError> {
            if self.fails {
                Err(BuildRetrievalError {
                    requested_build_id: self.build_id.clone(),
                    message: "artifact store unreachable".to_string(),
                })
            } else {
                Ok(BuildInfo::new(self.build_id.clone()))
            }
        }

        async fn clean_up(&self, _build_info: &BuildInfo) {}
    }

    struct AlwaysPasses;

    #[async_trait]
    impl RemoteTest for AlwaysPasses {
        fn name(&self) -> &str {
            "always-passes"
        }

        async fn run(
            &self,
            _context: &InvocationContext,
            _listener: &mut dyn TestInvocationListener,
        ) -> Result<(), TestRunError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        events: StdArc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl TestInvocationListener for RecordingListener {
        async fn invocation_started(&mut self, _context_attributes: &BTreeMap<String, String>) {
            self.events.lock().unwrap().push("invocation_started".to_string());
        }

        async fn invocation_failed(&mut self, _failure: &FailureDescription) {
            self.events.lock().unwrap().push("invocation_failed".to_string());
        }

        async fn invocation_ended(&mut self, _elapsed_millis: u64) {
            self.events.lock().unwrap().push("invocation_ended".to_string());
        }
    }

    fn one_device_configuration(
        device_fails_setup: bool,
        build_fails: bool,
        events: StdArc<Mutex<Vec<String>>>,
    ) -> Configuration {
        let slot = DeviceSlot::new(
            "device0",
            StdArc::new(FakeDevice {
                descriptor: "device0".to_string(),
                fails_setup: device_fails_setup,
            }),
            Box::new(FakeBuildProvider {
                build_id: "build-1".to_string(),
                fails: build_fails,
            }),
        );

        Configuration::new(CommandOptions::default())
            .with_device_slot(slot)
            .with_listener(Box::new(RecordingListener { events }))
    }

    fn module(test: Box<dyn RemoteTest>) -> ModuleDefinition {
        ModuleDefinition {
            name: "suite-module".to_string(),
            device_descriptor: "device0".to_string(),
            test: StdArc::from(test),
            preparers: Vec::new(),
            retry_policy: RetryPolicy::none(),
        }
    }

    #[tokio::test]
    async fn a_happy_path_invocation_completes_and_runs_its_module() {
        let events = StdArc::new(Mutex::new(Vec::new()));
        let configuration = one_device_configuration(false, false, events.clone());
        let modules = vec![module(Box::new(AlwaysPasses))];

        let result = InvocationExecution::invoke(
            configuration,
            modules,
            ConfigurationDescriptor::new("suite", "run"),
        )
        .await;

        assert!(result.completed);
        assert!(result.failure.is_none());
        assert_eq!(result.module_outcomes.len(), 1);
        assert!(result.module_outcomes[0].passed);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["invocation_started", "invocation_ended"],
        );
    }

    #[tokio::test]
    async fn a_build_fetch_failure_aborts_before_any_module_runs() {
        let events = StdArc::new(Mutex::new(Vec::new()));
        let configuration = one_device_configuration(false, true, events.clone());
        let modules = vec![module(Box::new(AlwaysPasses))];

        let result = InvocationExecution::invoke(
            configuration,
            modules,
            ConfigurationDescriptor::new("suite", "run"),
        )
        .await;

        assert!(!result.completed);
        assert!(result.failure.is_some());
        assert!(result.module_outcomes.is_empty());
        assert_eq!(
            *events.lock().unwrap(),
            vec!["invocation_started", "invocation_failed", "invocation_ended"],
        );
    }

    #[tokio::test]
    async fn a_device_setup_failure_still_notifies_the_listener_and_never_runs_modules() {
        let events = StdArc::new(Mutex::new(Vec::new()));
        let configuration = one_device_configuration(true, false, events.clone());
        let modules = vec![module(Box::new(AlwaysPasses))];

        let result = InvocationExecution::invoke(
            configuration,
            modules,
            ConfigurationDescriptor::new("suite", "run"),
        )
        .await;

        assert!(!result.completed);
        assert_eq!(
            result.failure.as_ref().unwrap().status,
            FailureStatus::DeviceLost,
        );
        assert!(result.module_outcomes.is_empty());
        assert_eq!(
            *events.lock().unwrap(),
            vec!["invocation_started", "invocation_failed", "invocation_ended"],
        );
    }
}
