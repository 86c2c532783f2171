// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracing spans for the three granularities a harness typically wants to slice logs by: one
//! invocation, one module, and one shard. Callers wrap the corresponding future with
//! `.instrument(span)` ([`tracing::Instrument`]) rather than entering the span manually, so the
//! span stays attached across every `.await` point inside.

use tracing::Span;

/// A span covering one whole invocation, tagged with the configuration it was resolved from.
pub fn invocation_span(configuration_name: &str) -> Span {
    tracing::info_span!("invocation", configuration = %configuration_name)
}

/// A span covering one module's full run, including every retry attempt.
pub fn module_span(module_name: &str, device_descriptor: &str) -> Span {
    tracing::info_span!("module", name = %module_name, device = %device_descriptor)
}

/// A span covering one shard of a split invocation.
pub fn shard_span(shard_index: u32) -> Span {
    tracing::info_span!("shard", index = shard_index)
}
