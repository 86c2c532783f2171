// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Result forwarding: fanning invocation/module/test events out to listeners, with log
//! persistence layered on top.
//!
//! Neither [`ResultForwarder`] nor [`LogSaverResultForwarder`] makes any attempt to recover a
//! panicking listener; a listener is expected to treat its own errors as data (log and swallow),
//! the same contract [`crate::capability::TestInvocationListener`]'s docs describe.

mod forwarder;
mod log_saver_forwarder;

pub use forwarder::ResultForwarder;
pub use log_saver_forwarder::LogSaverResultForwarder;
