// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`RetryPolicy`]: the per-module configuration of [`crate::retry::RetryStrategy`] plus its
//! attempt bound.

use crate::retry::{RetryStrategy, StrategyRetryDecision};
use std::str::FromStr;
use thiserror::Error;

/// A module's configured retry behavior: which strategy, and how many attempts it is bounded to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// The retry strategy to apply.
    pub strategy: RetryStrategy,
    /// The maximum number of attempts, inclusive of the first. Must be at least `1`.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// The default policy: no retries, a single attempt.
    pub fn none() -> Self {
        Self {
            strategy: RetryStrategy::NoRetry,
            max_attempts: 1,
        }
    }

    /// Builds the [`StrategyRetryDecision`] this policy configures.
    pub fn to_decision(self) -> StrategyRetryDecision {
        StrategyRetryDecision::new(self.strategy)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl FromStr for RetryPolicy {
    type Err = RetryPolicyParseError;

    /// Parses strings of the form `"<strategy>:<max_attempts>"`, e.g. `"retry_any_failure:3"`,
    /// or a bare strategy name, which defaults `max_attempts` to `2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (strategy_str, max_attempts) = match s.split_once(':') {
            Some((strategy_str, count_str)) => {
                let count = count_str
                    .parse::<u32>()
                    .map_err(|_| RetryPolicyParseError::InvalidMaxAttempts(count_str.to_string()))?;
                (strategy_str, count)
            }
            None => (s, 2),
        };

        let strategy = match strategy_str {
            "no_retry" => RetryStrategy::NoRetry,
            "iterations" => RetryStrategy::Iterations,
            "retry_any_failure" => RetryStrategy::RetryAnyFailure,
            "rerun_until_failure" => RetryStrategy::RerunUntilFailure,
            other => return Err(RetryPolicyParseError::UnknownStrategy(other.to_string())),
        };

        if max_attempts == 0 {
            return Err(RetryPolicyParseError::InvalidMaxAttempts(max_attempts.to_string()));
        }

        Ok(Self {
            strategy,
            max_attempts,
        })
    }
}

/// An error raised while parsing a [`RetryPolicy`] from a string.
#[derive(Clone, Debug, Error)]
pub enum RetryPolicyParseError {
    /// The strategy name wasn't recognized.
    #[error(
        "unrecognized retry strategy `{0}`, expected one of: no_retry, iterations, \
         retry_any_failure, rerun_until_failure"
    )]
    UnknownStrategy(String),
    /// `max_attempts` was zero or not a valid integer.
    #[error("invalid max attempts `{0}`, must be a positive integer")]
    InvalidMaxAttempts(String),
}
