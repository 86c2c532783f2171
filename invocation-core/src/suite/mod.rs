// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`SuiteScheduler`]: runs a sequence of [`ModuleDefinition`]s against one
//! [`crate::context::InvocationContext`], with per-module retry, system-status drift detection,
//! and device-lost recovery.

mod abi_expansion;
mod module_splitter;

pub use abi_expansion::{expand_variants, filter_variants, order_items, order_variants};
pub use module_splitter::{ModuleDefinition, ModuleSplitter};

use crate::capability::{SystemStatusChecker, SystemStatusSnapshot, TargetPreparer, TestInvocationListener};
use crate::config::CommandOptions;
use crate::context::InvocationContext;
use crate::errors::{FailureDescription, FailureOrigin, FailureStatus, PreparerError, TestRunError};
use crate::observability::module_span;
use crate::retry::{AttemptOutcome, RetryContext};
use crate::time::stopwatch;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Instrument;

/// Expands every module in `base_modules` across the abi/parameter variant product
/// [`expand_variants`] describes, drops variants [`filter_variants`] rejects, and orders the
/// surviving variants with [`order_items`] using `options.shuffle_seed`.
///
/// Every variant derived from the same base module shares one `Arc<dyn RemoteTest>` instance:
/// expansion only changes the name a variant is reported under, not which test runs.
pub fn expand_modules(base_modules: Vec<ModuleDefinition>, abis: &[String], options: &CommandOptions) -> Vec<ModuleDefinition> {
    let mut expanded = Vec::with_capacity(base_modules.len());
    for module in base_modules {
        let variants = expand_variants(&module.name, abis, options);
        let variants = filter_variants(&module.name, variants, options);
        for variant_name in variants {
            expanded.push(ModuleDefinition {
                name: variant_name,
                device_descriptor: module.device_descriptor.clone(),
                test: Arc::clone(&module.test),
                preparers: module.preparers.clone(),
                retry_policy: module.retry_policy,
            });
        }
    }
    order_items(expanded, options.shuffle_seed)
}

/// How one module's execution ended, recorded for the suite-level summary.
#[derive(Debug)]
pub struct ModuleOutcome {
    /// The module's (possibly shard-suffixed) name.
    pub name: String,
    /// The device this module ran against.
    pub device_descriptor: String,
    /// Whether the module's last attempt passed.
    pub passed: bool,
    /// The number of attempts actually run.
    pub attempts_run: u32,
    /// The failure that ended the last attempt, if it did not pass.
    pub failure: Option<FailureDescription>,
}

/// Whether the suite scheduler should keep going after a device is lost.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceLostPolicy {
    /// Abort the whole invocation: every remaining module is marked `NOT_EXECUTED`.
    AbortInvocation,
    /// Only the modules still queued for the lost device are marked `NOT_EXECUTED`; modules
    /// bound to other devices continue normally.
    SkipRemainingOnDevice,
}

/// Runs a fixed, pre-expanded, pre-filtered list of [`ModuleDefinition`]s in order.
pub struct SuiteScheduler<'a> {
    context: &'a InvocationContext,
    system_status_checkers: &'a [Box<dyn SystemStatusChecker>],
    device_lost_policy: DeviceLostPolicy,
}

impl<'a> SuiteScheduler<'a> {
    /// Creates a scheduler bound to `context`, checking `system_status_checkers` around every
    /// module.
    pub fn new(
        context: &'a InvocationContext,
        system_status_checkers: &'a [Box<dyn SystemStatusChecker>],
        device_lost_policy: DeviceLostPolicy,
    ) -> Self {
        Self {
            context,
            system_status_checkers,
            device_lost_policy,
        }
    }

    /// Runs every module in `modules`, in order, reporting through `listener`.
    ///
    /// If a module's device is lost partway through the suite, every module still queued is
    /// synthesized as a `NOT_EXECUTED` outcome rather than attempted, per `device_lost_policy`:
    /// either every remaining module across every device, or only the ones bound to the lost
    /// device.
    pub async fn run(
        &self,
        modules: Vec<ModuleDefinition>,
        listener: &mut dyn TestInvocationListener,
    ) -> Vec<ModuleOutcome> {
        let mut outcomes = Vec::with_capacity(modules.len());
        let mut lost_devices: Vec<String> = Vec::new();
        let mut invocation_aborted = false;

        for module in modules {
            if invocation_aborted {
                outcomes.push(not_executed(
                    &module.name,
                    &module.device_descriptor,
                    "invocation aborted after device loss",
                ));
                continue;
            }
            if lost_devices.contains(&module.device_descriptor) {
                outcomes.push(not_executed(
                    &module.name,
                    &module.device_descriptor,
                    &format!("device `{}` was lost earlier in the suite", module.device_descriptor),
                ));
                continue;
            }

            let pre_status = self.capture_status().await;
            let device_descriptor = module.device_descriptor.clone();
            let outcome = self.run_module_with_retry(module, listener).await;

            let device_lost = matches!(&outcome.failure, Some(f) if f.status == FailureStatus::DeviceLost);
            if device_lost {
                lost_devices.push(device_descriptor);
                if self.device_lost_policy == DeviceLostPolicy::AbortInvocation {
                    invocation_aborted = true;
                }
            }

            let post_status = self.capture_status().await;
            if pre_status != post_status {
                tracing::warn!(module = %outcome.name, "system status changed across module boundary");
            }

            outcomes.push(outcome);
        }

        outcomes
    }

    async fn capture_status(&self) -> Vec<SystemStatusSnapshot> {
        let mut snapshots = Vec::with_capacity(self.system_status_checkers.len());
        for checker in self.system_status_checkers {
            snapshots.push(checker.check_status(self.context).await);
        }
        snapshots
    }

    async fn run_module_with_retry(
        &self,
        module: ModuleDefinition,
        listener: &mut dyn TestInvocationListener,
    ) -> ModuleOutcome {
        listener.test_module_started(&module.name).await;
        let span = module_span(&module.name, &module.device_descriptor);

        let outcome = run_module_attempts(&module, self.context, listener)
            .instrument(span)
            .await;

        listener.test_module_ended().await;
        outcome
    }
}

/// Runs every attempt of one module, distinguishing the two retry mechanisms: a plain
/// test-failure retry reruns only [`crate::capability::RemoteTest::run`], reusing whatever
/// preparer state is already set up, while a failure that originated in preparation redoes
/// `set_up` (and the tear-down that follows it) only when
/// [`crate::retry::RetryDecision::should_retry_preparation`] says so. Preparers are torn down
/// exactly once, after the last attempt, regardless of which mechanism drove the retries.
async fn run_module_attempts(
    module: &ModuleDefinition,
    context: &InvocationContext,
    listener: &mut dyn TestInvocationListener,
) -> ModuleOutcome {
    let decision = module.retry_policy.to_decision();
    let max_attempts = module.retry_policy.max_attempts;
    let mut attempt_number = 0u32;
    let mut last_failure: Option<FailureDescription> = None;
    let mut last_passed = false;
    let mut set_up_count = 0usize;
    let mut preparers_ready = module.preparers.is_empty();
    let mut last_teardown_error: Option<PreparerError> = None;

    loop {
        listener.test_run_started(&module.name, attempt_number).await;
        let attempt_start = stopwatch();
        let mut setup_failed = false;

        if !preparers_ready {
            match set_up_preparers(module, context).await {
                Ok(count) => {
                    set_up_count = count;
                    preparers_ready = true;
                }
                Err((count, err)) => {
                    set_up_count = count;
                    last_passed = false;
                    last_failure = Some(err.to_failure_description());
                    last_teardown_error = Some(err);
                    setup_failed = true;
                }
            }
        }

        if preparers_ready && !setup_failed {
            let test_result = module.test.run(context, listener).await;
            last_passed = test_result.is_ok();
            last_teardown_error = test_result.as_ref().err().map(|err| match err {
                TestRunError::DeviceNotAvailable(msg) => PreparerError::DeviceNotAvailable(msg.clone()),
                other => PreparerError::TargetSetupError(other.to_string()),
            });
            last_failure = test_result.err().map(|err| match err {
                TestRunError::DeviceNotAvailable(msg) => {
                    FailureDescription::new(msg, FailureStatus::DeviceLost)
                        .with_action_in_progress(FailureOrigin::Test)
                }
                other => FailureDescription::new(other.to_string(), FailureStatus::InfraFailure)
                    .with_action_in_progress(FailureOrigin::Test),
            });
        }

        if let Some(failure) = &last_failure {
            listener.test_run_failed(failure).await;
        }

        let elapsed = attempt_start.snapshot().elapsed;
        listener
            .test_run_ended(elapsed.as_millis() as u64, &BTreeMap::new())
            .await;

        let retry_ctx = RetryContext {
            attempt_number,
            max_attempts,
            outcome: AttemptOutcome { passed: last_passed },
            failure: last_failure.as_ref(),
        };
        attempt_number += 1;

        if !decision.should_retry(&retry_ctx) {
            break;
        }

        let failed_in_setup = matches!(
            last_failure.as_ref().and_then(|f| f.action_in_progress),
            Some(FailureOrigin::Setup)
        );
        if failed_in_setup {
            if !decision.should_retry_preparation(&retry_ctx) {
                break;
            }
            preparers_ready = false;
        }
    }

    tear_down_in_reverse(
        &module.preparers[..set_up_count],
        context,
        &module.device_descriptor,
        last_teardown_error.as_ref(),
    )
    .await;

    ModuleOutcome {
        name: module.name.clone(),
        device_descriptor: module.device_descriptor.clone(),
        passed: last_passed,
        attempts_run: attempt_number,
        failure: last_failure,
    }
}

/// Runs every preparer's `set_up` in order. Returns how many succeeded on failure, so the caller
/// knows exactly which prefix needs tearing down.
async fn set_up_preparers(
    module: &ModuleDefinition,
    context: &InvocationContext,
) -> Result<usize, (usize, PreparerError)> {
    let mut set_up_count = 0usize;
    for preparer in &module.preparers {
        if preparer.is_disabled() {
            set_up_count += 1;
            continue;
        }
        if let Err(err) = preparer.set_up(context, &module.device_descriptor).await {
            return Err((set_up_count, err));
        }
        set_up_count += 1;
    }
    Ok(set_up_count)
}

async fn tear_down_in_reverse(
    preparers: &[Arc<dyn TargetPreparer>],
    context: &InvocationContext,
    device_descriptor: &str,
    error: Option<&PreparerError>,
) {
    for preparer in preparers.iter().rev() {
        if preparer.is_disabled() || preparer.is_tear_down_disabled() {
            continue;
        }
        preparer.tear_down(context, device_descriptor, error).await;
    }
}

fn not_executed(name: &str, device_descriptor: &str, reason: &str) -> ModuleOutcome {
    ModuleOutcome {
        name: name.to_string(),
        device_descriptor: device_descriptor.to_string(),
        passed: false,
        attempts_run: 0,
        failure: Some(FailureDescription::new(reason, FailureStatus::NotExecuted)),
    }
}
