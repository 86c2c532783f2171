// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration types: the explicit, typed option schema ([`CommandOptions`]), per-module retry
//! policy ([`RetryPolicy`]), and the fully resolved [`Configuration`] an invocation runs from.

mod command_options;
mod configuration;
mod retry_policy;

pub use command_options::CommandOptions;
pub use configuration::{Configuration, DeviceSlot};
pub use retry_policy::{RetryPolicy, RetryPolicyParseError};
