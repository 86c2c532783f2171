// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`ModuleSplitter`]: turns one configured module into one or more independently schedulable
//! [`ModuleDefinition`]s, honoring whatever sharding opinion its test holds.

use crate::capability::{RemoteTest, ShardHint, TargetPreparer};
use crate::config::RetryPolicy;
use std::sync::Arc;

/// One schedulable unit: a name, the test to run, the preparers to run around it, and its retry
/// policy.
///
/// Preparers are held as `Arc` rather than `Box` because splitting a module into shards
/// "copies" its preparers — every shard runs against the same preparer instances, sharing
/// whatever setup they performed once for the whole (unsplit) module. The test is held as `Arc`
/// too: [`crate::suite::expand_modules`] shares one test instance across every abi/parameter
/// variant it derives from a single configured module, and only [`ModuleSplitter::split`]
/// actually replaces it with an independent per-shard piece.
pub struct ModuleDefinition {
    /// The module's name, suffixed with a shard index for split modules (e.g. `"foo_0_of_4"`).
    pub name: String,
    /// The descriptor of the device this module's preparers and test run against.
    pub device_descriptor: String,
    /// The test to run for this module or shard.
    pub test: Arc<dyn RemoteTest>,
    /// Preparers run (in order) before, and (in reverse order) after, this module's test.
    pub preparers: Vec<Arc<dyn TargetPreparer>>,
    /// This module's retry policy.
    pub retry_policy: RetryPolicy,
}

/// Splits [`ModuleDefinition`]s according to a requested shard count.
pub struct ModuleSplitter;

impl ModuleSplitter {
    /// Splits `module` into `shard_count` pieces, or returns it unsplit when `shard_count <= 1`,
    /// when the module's test has no sharding opinion at all (`as_shardable` returns `None`),
    /// when the test reports [`is_shardable`](crate::capability::ShardableTest::is_shardable) as
    /// `false`, or when the test is shardable but not
    /// [`strictly shardable`](crate::capability::ShardableTest::is_strict_shardable) and more
    /// than one shard was requested. Sharding never happens *within* a module boundary beyond
    /// what the test itself opts into: a module that declines to split always runs as one whole
    /// unit, even under a shard_count request.
    pub fn split(module: ModuleDefinition, shard_count: u32) -> Vec<ModuleDefinition> {
        if shard_count <= 1 {
            return vec![module];
        }

        let can_split = match module.test.as_shardable() {
            Some(shardable) => shardable.is_shardable() && shardable.is_strict_shardable(),
            None => false,
        };

        if !can_split {
            return vec![module];
        }

        let pieces = module
            .test
            .as_shardable()
            .expect("checked can_split above")
            .split(ShardHint { shard_count });

        let total = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(index, test)| ModuleDefinition {
                name: format!("{}_{}_of_{}", module.name, index, total),
                device_descriptor: module.device_descriptor.clone(),
                test: Arc::from(test),
                preparers: module.preparers.clone(),
                retry_policy: module.retry_policy,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{ShardableTest, TestInvocationListener};
    use crate::context::InvocationContext;
    use crate::errors::TestRunError;
    use async_trait::async_trait;

    struct FixedTest {
        name: String,
    }

    #[async_trait]
    impl RemoteTest for FixedTest {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(
            &self,
            _context: &InvocationContext,
            _listener: &mut dyn TestInvocationListener,
        ) -> Result<(), TestRunError> {
            Ok(())
        }
    }

    struct ShardableByCount {
        name: String,
    }

    #[async_trait]
    impl RemoteTest for ShardableByCount {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(
            &self,
            _context: &InvocationContext,
            _listener: &mut dyn TestInvocationListener,
        ) -> Result<(), TestRunError> {
            Ok(())
        }

        fn as_shardable(&self) -> Option<&dyn ShardableTest> {
            Some(self)
        }
    }

    impl ShardableTest for ShardableByCount {
        fn split(&self, hint: ShardHint) -> Vec<Box<dyn RemoteTest>> {
            (0..hint.shard_count)
                .map(|i| {
                    Box::new(FixedTest {
                        name: format!("{}-piece-{i}", self.name),
                    }) as Box<dyn RemoteTest>
                })
                .collect()
        }
    }

    struct ShardableButNotStrict {
        name: String,
    }

    #[async_trait]
    impl RemoteTest for ShardableButNotStrict {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(
            &self,
            _context: &InvocationContext,
            _listener: &mut dyn TestInvocationListener,
        ) -> Result<(), TestRunError> {
            Ok(())
        }

        fn as_shardable(&self) -> Option<&dyn ShardableTest> {
            Some(self)
        }
    }

    impl ShardableTest for ShardableButNotStrict {
        fn is_strict_shardable(&self) -> bool {
            false
        }

        fn split(&self, _hint: ShardHint) -> Vec<Box<dyn RemoteTest>> {
            panic!("split should never be called when not strictly shardable")
        }
    }

    fn definition(test: Box<dyn RemoteTest>) -> ModuleDefinition {
        ModuleDefinition {
            name: "module".to_string(),
            device_descriptor: "device0".to_string(),
            test: Arc::from(test),
            preparers: Vec::new(),
            retry_policy: RetryPolicy::none(),
        }
    }

    #[test]
    fn shard_count_of_one_leaves_module_whole() {
        let module = definition(Box::new(ShardableByCount { name: "module".into() }));
        let split = ModuleSplitter::split(module, 1);
        assert_eq!(split.len(), 1);
        assert_eq!(split[0].name, "module");
    }

    #[test]
    fn not_shardable_test_is_never_split() {
        let module = definition(Box::new(FixedTest { name: "module".into() }));
        let split = ModuleSplitter::split(module, 4);
        assert_eq!(split.len(), 1);
        assert_eq!(split[0].name, "module");
    }

    #[test]
    fn shardable_but_not_strict_is_never_split_past_one_shard() {
        let module = definition(Box::new(ShardableButNotStrict { name: "module".into() }));
        let split = ModuleSplitter::split(module, 4);
        assert_eq!(split.len(), 1);
    }

    #[test]
    fn strictly_shardable_test_splits_into_named_pieces() {
        let module = definition(Box::new(ShardableByCount { name: "module".into() }));
        let split = ModuleSplitter::split(module, 3);
        assert_eq!(split.len(), 3);
        assert_eq!(split[0].name, "module_0_of_3");
        assert_eq!(split[2].name, "module_2_of_3");
    }
}
