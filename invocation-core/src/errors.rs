// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`FailureDescription`] and the error hierarchy the engine raises.
//!
//! Every failure that can terminate or blemish an invocation is represented as data, not just a
//! string: a [`FailureOrigin`], an optional [`ActionInProgress`], a [`FailureStatus`], and an
//! optional free-form error identifier. This lets a downstream listener branch on the failure
//! shape instead of pattern-matching error messages, and lets a shard subprocess boundary
//! round-trip a failure through a plain `BTreeMap<String, String>` (see
//! [`FailureDescription::to_kv`]/[`FailureDescription::from_kv`]).

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// The classification of a failure, per the taxonomy in the invocation-execution design.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum FailureStatus {
    /// An internal or environment fault unrelated to the tests themselves.
    InfraFailure,
    /// The build or a preparer signaled that required dependencies are broken.
    DependencyIssue,
    /// The device is no longer reachable; the invocation cannot continue on it.
    DeviceLost,
    /// A test case failed its assertions. Never terminates the invocation.
    TestFailure,
    /// A module or test was skipped because the invocation was stopped, or a predecessor was
    /// fatal.
    NotExecuted,
    /// The device is still nominally reachable but became unresponsive.
    LostSystemUnderTest,
    /// A system-status checker detected drift across a module boundary.
    ModuleChangedSystemStatus,
}

impl fmt::Display for FailureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InfraFailure => "INFRA_FAILURE",
            Self::DependencyIssue => "DEPENDENCY_ISSUE",
            Self::DeviceLost => "DEVICE_LOST",
            Self::TestFailure => "TEST_FAILURE",
            Self::NotExecuted => "NOT_EXECUTED",
            Self::LostSystemUnderTest => "LOST_SYSTEM_UNDER_TEST",
            Self::ModuleChangedSystemStatus => "MODULE_CHANGED_SYSTEM_STATUS",
        };
        f.write_str(s)
    }
}

/// Which phase of the invocation lifecycle a failure originated in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum FailureOrigin {
    /// The build-fetch phase.
    FetchingArtifacts,
    /// The (per-device or pooled) setup phase.
    Setup,
    /// The test-execution phase.
    Test,
    /// No phase; the invocation never reached one (e.g. a forced stop).
    Unset,
}

impl fmt::Display for FailureOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FetchingArtifacts => "FETCHING_ARTIFACTS",
            Self::Setup => "SETUP",
            Self::Test => "TEST",
            Self::Unset => "UNSET",
        };
        f.write_str(s)
    }
}

/// A structured record of a failure: message, classification, the phase it happened in
/// (`action_in_progress`), and an optional machine-readable error identifier.
///
/// This is the type threaded through `testRunFailed`/`invocationFailed` callbacks, and the type
/// serialized across a shard subprocess boundary via [`to_kv`](Self::to_kv)/
/// [`from_kv`](Self::from_kv).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FailureDescription {
    /// A human-readable description of what went wrong.
    pub message: String,
    /// The failure's classification.
    pub status: FailureStatus,
    /// The phase the failure happened in, if known.
    pub action_in_progress: Option<FailureOrigin>,
    /// A stable, machine-readable identifier for this failure kind, if the origin supplied one.
    pub error_identifier: Option<String>,
}

impl FailureDescription {
    /// Creates a new failure description with no action-in-progress or error identifier set.
    pub fn new(message: impl Into<String>, status: FailureStatus) -> Self {
        Self {
            message: message.into(),
            status,
            action_in_progress: None,
            error_identifier: None,
        }
    }

    /// Sets the phase the failure occurred in.
    pub fn with_action_in_progress(mut self, action: FailureOrigin) -> Self {
        self.action_in_progress = Some(action);
        self
    }

    /// Sets a machine-readable error identifier.
    pub fn with_error_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.error_identifier = Some(identifier.into());
        self
    }

    /// Flattens this failure into a compact key/value map, suitable for carrying across a shard
    /// subprocess boundary over any line-oriented or JSON transport.
    pub fn to_kv(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("message".to_string(), self.message.clone());
        map.insert("status".to_string(), self.status.to_string());
        if let Some(action) = self.action_in_progress {
            map.insert("actionInProgress".to_string(), action.to_string());
        }
        if let Some(id) = &self.error_identifier {
            map.insert("errorIdentifier".to_string(), id.clone());
        }
        map
    }

    /// Reconstructs a [`FailureDescription`] from the key/value map produced by
    /// [`to_kv`](Self::to_kv).
    pub fn from_kv(map: &BTreeMap<String, String>) -> Result<Self, FailureDescriptionParseError> {
        let message = map
            .get("message")
            .ok_or(FailureDescriptionParseError::MissingField("message"))?
            .clone();
        let status_str = map
            .get("status")
            .ok_or(FailureDescriptionParseError::MissingField("status"))?;
        let status = parse_failure_status(status_str)?;
        let action_in_progress = map
            .get("actionInProgress")
            .map(|s| parse_failure_origin(s))
            .transpose()?;
        let error_identifier = map.get("errorIdentifier").cloned();

        Ok(Self {
            message,
            status,
            action_in_progress,
            error_identifier,
        })
    }
}

impl fmt::Display for FailureDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)?;
        if let Some(action) = self.action_in_progress {
            write!(f, " (during {action})")?;
        }
        Ok(())
    }
}

impl std::error::Error for FailureDescription {}

fn parse_failure_status(s: &str) -> Result<FailureStatus, FailureDescriptionParseError> {
    Ok(match s {
        "INFRA_FAILURE" => FailureStatus::InfraFailure,
        "DEPENDENCY_ISSUE" => FailureStatus::DependencyIssue,
        "DEVICE_LOST" => FailureStatus::DeviceLost,
        "TEST_FAILURE" => FailureStatus::TestFailure,
        "NOT_EXECUTED" => FailureStatus::NotExecuted,
        "LOST_SYSTEM_UNDER_TEST" => FailureStatus::LostSystemUnderTest,
        "MODULE_CHANGED_SYSTEM_STATUS" => FailureStatus::ModuleChangedSystemStatus,
        other => {
            return Err(FailureDescriptionParseError::UnknownVariant(
                "status",
                other.to_string(),
            ));
        }
    })
}

fn parse_failure_origin(s: &str) -> Result<FailureOrigin, FailureDescriptionParseError> {
    Ok(match s {
        "FETCHING_ARTIFACTS" => FailureOrigin::FetchingArtifacts,
        "SETUP" => FailureOrigin::Setup,
        "TEST" => FailureOrigin::Test,
        "UNSET" => FailureOrigin::Unset,
        other => {
            return Err(FailureDescriptionParseError::UnknownVariant(
                "actionInProgress",
                other.to_string(),
            ));
        }
    })
}

/// An error produced while reconstructing a [`FailureDescription`] from a key/value map.
#[derive(Clone, Debug, Error)]
pub enum FailureDescriptionParseError {
    /// A required field was missing from the map.
    #[error("missing field `{0}` in serialized failure description")]
    MissingField(&'static str),
    /// A field held a value outside its known enumeration.
    #[error("unrecognized value for `{0}`: {1}")]
    UnknownVariant(&'static str, String),
}

/// An error raised while running the pre-invocation setup phase for one or more devices.
#[derive(Debug, Error, miette::Diagnostic)]
#[error("pre-invocation setup failed for device `{device_name}`")]
pub struct PreInvocationSetupError {
    /// The device whose setup failed.
    pub device_name: String,
    /// The underlying failure.
    #[source]
    pub source: DeviceSetupError,
}

/// An error a [`crate::capability::Device`] setup hook can raise.
#[derive(Debug, Error)]
pub enum DeviceSetupError {
    /// The device became unreachable during setup.
    #[error("device not available: {0}")]
    DeviceNotAvailable(String),
    /// Setup timed out against the shared deadline.
    #[error("pre-invocation setup timed out")]
    Timeout,
    /// Some other, non-fatal setup error.
    #[error("{0}")]
    Other(String),
}

/// An error raised by a [`crate::capability::TargetPreparer`] or
/// [`crate::capability::MultiTargetPreparer`] during `setUp`.
#[derive(Debug, Error)]
pub enum PreparerError {
    /// The device became unreachable.
    #[error("device not available: {0}")]
    DeviceNotAvailable(String),
    /// The build itself is broken (e.g. a version mismatch). Classified `DEPENDENCY_ISSUE`.
    #[error("build error: {0}")]
    BuildError(String),
    /// A target-setup-specific infrastructure failure. Classified `INFRA_FAILURE`.
    #[error("target setup error: {0}")]
    TargetSetupError(String),
}

impl PreparerError {
    /// Classifies this error per the invocation-level failure taxonomy.
    pub fn to_failure_description(&self) -> FailureDescription {
        match self {
            Self::DeviceNotAvailable(msg) => {
                FailureDescription::new(msg.clone(), FailureStatus::LostSystemUnderTest)
                    .with_action_in_progress(FailureOrigin::Setup)
            }
            Self::BuildError(msg) => {
                FailureDescription::new(msg.clone(), FailureStatus::DependencyIssue)
                    .with_action_in_progress(FailureOrigin::Setup)
            }
            Self::TargetSetupError(msg) => {
                FailureDescription::new(msg.clone(), FailureStatus::InfraFailure)
                    .with_action_in_progress(FailureOrigin::Setup)
            }
        }
    }
}

/// An error raised while running a test.
#[derive(Debug, Error)]
pub enum TestRunError {
    /// The device became unreachable. Propagated after teardown, not caught.
    #[error("device not available: {0}")]
    DeviceNotAvailable(String),
    /// An invalid argument was passed to the test. Classified `UNSET` rather than
    /// `INFRA_FAILURE`, per the failure taxonomy.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    /// Any other exception thrown by the test. Classified `INFRA_FAILURE` by default.
    #[error("{0}")]
    Other(String),
}

/// An error raised by a [`crate::capability::BuildProvider`] during `fetch`.
#[derive(Debug, Error)]
#[error("failed to fetch build `{requested_build_id}`: {message}")]
pub struct BuildRetrievalError {
    /// The build ID that was requested.
    pub requested_build_id: String,
    /// A human-readable description of the failure.
    pub message: String,
}

/// The terminal outcome of one invocation: either it completed (possibly with reported test
/// failures, which do not count as engine-level errors) or it was aborted by an engine-level
/// failure.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The build could not be fetched for one or more devices.
    #[error("build retrieval failed: {0}")]
    BuildRetrieval(#[from] BuildRetrievalError),
    /// Pre-invocation device setup failed.
    #[error(transparent)]
    PreInvocationSetup(#[from] PreInvocationSetupError),
    /// A preparer failed during setup.
    #[error("setup failed: {0:?}")]
    Setup(PreparerError),
    /// A test raised `DeviceNotAvailable`. Re-raised after teardown completes.
    #[error("device not available: {0}")]
    DeviceNotAvailable(String),
    /// A test raised some other uncaught exception.
    #[error("test execution error: {0:?}")]
    Test(TestRunError),
    /// Teardown itself raised one or more errors and no earlier error took precedence.
    #[error("{0}")]
    Teardown(#[from] TeardownErrors),
    /// The invocation was stopped before the test phase began.
    #[error("invocation stopped before tests began")]
    ForcedStopBeforeTests,
}

impl InvocationError {
    /// Classifies this error into the invocation-level [`FailureDescription`] table.
    pub fn to_failure_description(&self) -> FailureDescription {
        match self {
            Self::BuildRetrieval(err) => {
                FailureDescription::new(err.message.clone(), FailureStatus::InfraFailure)
                    .with_action_in_progress(FailureOrigin::FetchingArtifacts)
            }
            Self::PreInvocationSetup(err) => {
                FailureDescription::new(err.to_string(), FailureStatus::InfraFailure)
                    .with_action_in_progress(FailureOrigin::Setup)
            }
            Self::Setup(err) => err.to_failure_description(),
            Self::DeviceNotAvailable(msg) => {
                FailureDescription::new(msg.clone(), FailureStatus::LostSystemUnderTest)
                    .with_action_in_progress(FailureOrigin::Test)
            }
            Self::Test(TestRunError::IllegalArgument(msg)) => {
                FailureDescription::new(msg.clone(), FailureStatus::InfraFailure)
            }
            Self::Test(err) => {
                FailureDescription::new(err.to_string(), FailureStatus::InfraFailure)
                    .with_action_in_progress(FailureOrigin::Test)
            }
            Self::Teardown(err) => {
                FailureDescription::new(err.to_string(), FailureStatus::InfraFailure)
            }
            Self::ForcedStopBeforeTests => {
                FailureDescription::new(self.to_string(), FailureStatus::NotExecuted)
            }
        }
    }
}

/// One or more teardown steps raised an error. Every teardown still ran to completion; this
/// collects all of them, with the first carrying precedence for re-raising per the
/// teardown-safety rule.
#[derive(Debug, Error)]
#[error("{} teardown step(s) failed: {}", .errors.len(), .errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
pub struct TeardownErrors {
    /// All teardown errors, in the order they were raised.
    pub errors: Vec<PreparerError>,
}

impl TeardownErrors {
    /// Returns the first teardown error, which takes precedence when no test-phase error
    /// exists to re-raise instead.
    pub fn first(&self) -> &PreparerError {
        self.errors.first().expect("TeardownErrors is never empty")
    }
}
