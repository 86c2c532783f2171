// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`LogSaver`]: the capability that durably persists a log file handed to
//! [`crate::capability::listener::TestInvocationListener::test_log`].

use crate::capability::listener::LogDataType;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Persists log files somewhere durable (a results directory, object storage) and hands back the
/// addressable location.
#[async_trait]
pub trait LogSaver: Send + Sync {
    /// Saves the log at `source_path`, named `log_name`, of the given type, returning where it
    /// ended up.
    async fn save_log(
        &self,
        log_name: &str,
        data_type: LogDataType,
        source_path: &Utf8Path,
    ) -> Result<Utf8PathBuf, LogSaveError>;
}

/// An error raised while persisting a log file.
#[derive(Debug, Error)]
#[error("failed to save log `{log_name}`: {message}")]
pub struct LogSaveError {
    /// The log that failed to save.
    pub log_name: String,
    /// A human-readable description of the failure.
    pub message: String,
}
