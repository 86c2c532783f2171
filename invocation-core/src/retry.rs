// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Intra-module retry: [`RetryStrategy`], [`RetryContext`], and the [`RetryDecision`] trait that
//! decides whether a module gets another attempt.
//!
//! A module attempt is identified by a zero-based `attempt_number`; the
//! [`crate::invocation::InvocationExecution`] guarantees exactly one `test_run_started` callback
//! per attempt, with `attempt_number` values forming the contiguous range `0..total_attempts`.

use crate::errors::FailureDescription;

/// The built-in retry strategies. Mirrors the four policies a module can declare.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RetryStrategy {
    /// Never retry; exactly one attempt always runs.
    NoRetry,
    /// Retry until `max_attempts` total attempts have run, regardless of outcome, then stop.
    Iterations,
    /// Retry after any failure (a test failure or a run failure), up to `max_attempts` attempts,
    /// stopping early on the first fully passing attempt.
    RetryAnyFailure,
    /// Keep rerunning as long as attempts keep passing, stopping on the first failure or at
    /// `max_attempts`, whichever comes first. Used to hunt flaky failures.
    RerunUntilFailure,
}

/// The outcome summary of a single attempt, as seen by the retry decision.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AttemptOutcome {
    /// Whether every test in this attempt passed and the run itself did not fail.
    pub passed: bool,
}

/// Everything a [`RetryDecision`] needs to decide whether to run another attempt.
#[derive(Clone, Debug)]
pub struct RetryContext<'a> {
    /// The attempt number that just completed, zero-based.
    pub attempt_number: u32,
    /// The maximum number of attempts the module's strategy allows.
    pub max_attempts: u32,
    /// The outcome of the attempt that just completed.
    pub outcome: AttemptOutcome,
    /// The failure that ended the attempt, if any.
    pub failure: Option<&'a FailureDescription>,
}

impl RetryContext<'_> {
    /// Whether `attempt_number` is the last attempt allowed by `max_attempts`, irrespective of
    /// outcome.
    pub fn is_last_possible_attempt(&self) -> bool {
        self.attempt_number + 1 >= self.max_attempts
    }
}

/// Decides, after each attempt, whether the module should be run again.
///
/// Implementations must be deterministic given the same [`RetryContext`] sequence: the invocation
/// engine relies on this to guarantee the "exactly N `test_run_started` calls with
/// `attempt_number` in `0..N`" property regardless of which strategy is configured.
pub trait RetryDecision: Send + Sync {
    /// Returns whether another attempt should run, given the context of the attempt that just
    /// finished.
    fn should_retry(&self, context: &RetryContext<'_>) -> bool;

    /// Returns whether the *next* attempt (already decided by [`should_retry`](Self::should_retry))
    /// needs its preparers' `set_up`/`tear_down` re-run, as opposed to jumping straight back into
    /// the test.
    ///
    /// This only matters when the previous attempt failed during preparation rather than during
    /// the test itself; the scheduler only consults this method in that case. Defaults to
    /// deferring to [`should_retry`](Self::should_retry), which is correct for every built-in
    /// strategy: if a strategy is willing to retry at all, it is willing to redo preparation when
    /// preparation is what failed.
    fn should_retry_preparation(&self, context: &RetryContext<'_>) -> bool {
        self.should_retry(context)
    }
}

/// The built-in [`RetryDecision`] implementing the four [`RetryStrategy`] variants.
#[derive(Clone, Copy, Debug)]
pub struct StrategyRetryDecision {
    strategy: RetryStrategy,
}

impl StrategyRetryDecision {
    /// Creates a decision that implements `strategy`.
    pub fn new(strategy: RetryStrategy) -> Self {
        Self { strategy }
    }
}

impl RetryDecision for StrategyRetryDecision {
    fn should_retry(&self, context: &RetryContext<'_>) -> bool {
        if context.is_last_possible_attempt() {
            return false;
        }

        match self.strategy {
            RetryStrategy::NoRetry => false,
            RetryStrategy::Iterations => true,
            RetryStrategy::RetryAnyFailure => !context.outcome.passed,
            RetryStrategy::RerunUntilFailure => context.outcome.passed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn context(attempt_number: u32, max_attempts: u32, passed: bool) -> RetryContext<'static> {
        RetryContext {
            attempt_number,
            max_attempts,
            outcome: AttemptOutcome { passed },
            failure: None,
        }
    }

    #[test_case(RetryStrategy::NoRetry, 0, 5, true, false; "no_retry never retries even after a pass")]
    #[test_case(RetryStrategy::NoRetry, 0, 5, false, false; "no_retry never retries even after a failure")]
    #[test_case(RetryStrategy::Iterations, 0, 3, true, true; "iterations keeps going after a pass")]
    #[test_case(RetryStrategy::Iterations, 2, 3, true, false; "iterations stops at max_attempts")]
    #[test_case(RetryStrategy::RetryAnyFailure, 0, 3, false, true; "retry_any_failure retries after a failure")]
    #[test_case(RetryStrategy::RetryAnyFailure, 0, 3, true, false; "retry_any_failure stops after a pass")]
    #[test_case(RetryStrategy::RerunUntilFailure, 0, 3, true, true; "rerun_until_failure keeps going while passing")]
    #[test_case(RetryStrategy::RerunUntilFailure, 0, 3, false, false; "rerun_until_failure stops on first failure")]
    fn strategy_decisions_match_the_table(
        strategy: RetryStrategy,
        attempt_number: u32,
        max_attempts: u32,
        passed: bool,
        expected: bool,
    ) {
        let decision = StrategyRetryDecision::new(strategy);
        let ctx = context(attempt_number, max_attempts, passed);
        assert_eq!(decision.should_retry(&ctx), expected);
    }

    #[test]
    fn max_attempts_of_one_never_retries_regardless_of_strategy() {
        for strategy in [
            RetryStrategy::NoRetry,
            RetryStrategy::Iterations,
            RetryStrategy::RetryAnyFailure,
            RetryStrategy::RerunUntilFailure,
        ] {
            let decision = StrategyRetryDecision::new(strategy);
            let ctx = context(0, 1, false);
            assert!(!decision.should_retry(&ctx), "{strategy:?} should not retry with max_attempts=1");
        }
    }
}
