// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`CommandOptions`]: the explicit, typed schema for every option surface the engine reads.
//!
//! A concrete harness's command-line or config-file layer is responsible for producing one of
//! these; the engine never reaches into a generic option bag or injects fields by reflection.

use crate::config::retry_policy::RetryPolicy;
use crate::shard::ShardSpec;
use std::time::Duration;

/// The resolved set of options that shape one invocation, independent of which devices or builds
/// are in play.
#[derive(Clone, Debug)]
pub struct CommandOptions {
    /// The default retry policy applied to any module that doesn't declare its own.
    pub default_retry_policy: RetryPolicy,

    /// How this invocation's modules should be partitioned across shards, if at all.
    pub shard_spec: Option<ShardSpec>,

    /// A deterministic seed for randomized module-ordering; `None` preserves declaration order.
    pub shuffle_seed: Option<u64>,

    /// Whether to expand each module across every declared ABI.
    pub expand_abis: bool,

    /// The ABIs to expand against when `expand_abis` is set. Ignored when `expand_abis` is
    /// `false`.
    pub abis: Vec<String>,

    /// Device-state axes to expand modules across (e.g. `"all_foldable_states"`), by state name.
    pub device_state_axes: Vec<String>,

    /// Whether `instant_app` variants should be synthesized for eligible modules.
    pub enable_instant_app: bool,

    /// Whether `secondary_user` variants should be synthesized for eligible modules.
    pub enable_secondary_user: bool,

    /// Mainline APK combinations to expand eligible modules across. Empty means no mainline
    /// expansion.
    pub mainline_apk_combinations: Vec<String>,

    /// The maximum wall-clock time a single module attempt may run before being treated as
    /// timed out.
    pub module_timeout: Option<Duration>,

    /// Whether a lost device should abort the whole invocation (`true`) or should only fail the
    /// remaining modules on that device while letting other devices continue (`false`).
    pub abort_invocation_on_device_lost: bool,

    /// Positive module-name filters. Empty means no filter (everything is included by name).
    pub include_filters: Vec<String>,

    /// Negative module-name filters, applied after `include_filters`.
    pub exclude_filters: Vec<String>,

    /// Whether per-device pre-invocation setup (build flash/verify) runs concurrently across
    /// device slots rather than one device at a time.
    pub parallel_pre_invocation_setup: bool,

    /// The maximum wall-clock time the whole concurrent pre-invocation setup phase may take
    /// before it is treated as timed out. A zero duration means no timeout. Ignored when
    /// `parallel_pre_invocation_setup` is `false`.
    pub parallel_pre_invocation_setup_timeout: Duration,
}

impl CommandOptions {
    /// Returns whether `module_name` passes the configured include/exclude filters.
    pub fn passes_filters(&self, module_name: &str) -> bool {
        let included = self.include_filters.is_empty()
            || self.include_filters.iter().any(|f| f == module_name);
        let excluded = self.exclude_filters.iter().any(|f| f == module_name);
        included && !excluded
    }
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            default_retry_policy: RetryPolicy::none(),
            shard_spec: None,
            shuffle_seed: None,
            expand_abis: false,
            abis: Vec::new(),
            device_state_axes: Vec::new(),
            enable_instant_app: false,
            enable_secondary_user: false,
            mainline_apk_combinations: Vec::new(),
            module_timeout: None,
            abort_invocation_on_device_lost: true,
            include_filters: Vec::new(),
            exclude_filters: Vec::new(),
            parallel_pre_invocation_setup: false,
            parallel_pre_invocation_setup_timeout: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_include_filters_admit_everything() {
        let options = CommandOptions::default();
        assert!(options.passes_filters("any.module"));
    }

    #[test]
    fn exclude_filters_win_over_include_filters() {
        let options = CommandOptions {
            include_filters: vec!["foo".to_string()],
            exclude_filters: vec!["foo".to_string()],
            ..CommandOptions::default()
        };
        assert!(!options.passes_filters("foo"));
    }

    #[test]
    fn include_filters_reject_nonmatching_modules() {
        let options = CommandOptions {
            include_filters: vec!["foo".to_string()],
            ..CommandOptions::default()
        };
        assert!(!options.passes_filters("bar"));
    }
}
