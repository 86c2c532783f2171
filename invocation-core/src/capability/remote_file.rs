// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`RemoteFileResolver`]: the capability that resolves a symbolic remote-file reference (e.g.
//! a `gs://` or `https://` artifact URI named in configuration) to a local path.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Resolves a remote file reference to a local, readable path, downloading it if necessary.
#[async_trait]
pub trait RemoteFileResolver: Send + Sync {
    /// Whether this resolver recognizes and can handle `reference`.
    fn can_resolve(&self, reference: &str) -> bool;

    /// Resolves `reference` to a local path, downloading into `destination_dir` if needed.
    async fn resolve(
        &self,
        reference: &str,
        destination_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, RemoteFileError>;
}

/// An error raised while resolving a remote file reference.
#[derive(Debug, Error)]
#[error("failed to resolve `{reference}`: {message}")]
pub struct RemoteFileError {
    /// The reference that failed to resolve.
    pub reference: String,
    /// A human-readable description of the failure.
    pub message: String,
}
