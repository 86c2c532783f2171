// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`ResultForwarder`]: fans every event out to a fixed list of listeners, in order.

use crate::capability::{LogDataType, TestInvocationListener};
use crate::errors::FailureDescription;
use async_trait::async_trait;
use camino::Utf8Path;
use std::collections::BTreeMap;

/// Forwards every [`TestInvocationListener`] event to each listener in `listeners`, in
/// declaration order.
///
/// A listener never sees an error from another listener: each listener's events are dispatched
/// fully independently. We do not wrap calls in `catch_unwind`; a listener that panics is a bug
/// in that listener, and should surface like any other panic rather than be silently absorbed.
pub struct ResultForwarder {
    listeners: Vec<Box<dyn TestInvocationListener>>,
}

impl ResultForwarder {
    /// Creates a forwarder over `listeners`.
    pub fn new(listeners: Vec<Box<dyn TestInvocationListener>>) -> Self {
        Self { listeners }
    }
}

macro_rules! forward {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        for listener in $self.listeners.iter_mut() {
            listener.$method($($arg),*).await;
        }
    };
}

#[async_trait]
impl TestInvocationListener for ResultForwarder {
    async fn invocation_started(&mut self, context_attributes: &BTreeMap<String, String>) {
        forward!(self, invocation_started, context_attributes);
    }

    async fn test_module_started(&mut self, module_name: &str) {
        forward!(self, test_module_started, module_name);
    }

    async fn test_module_ended(&mut self) {
        forward!(self, test_module_ended);
    }

    async fn test_run_started(&mut self, run_name: &str, attempt_number: u32) {
        forward!(self, test_run_started, run_name, attempt_number);
    }

    async fn test_started(&mut self, test_name: &str) {
        forward!(self, test_started, test_name);
    }

    async fn test_failed(&mut self, test_name: &str, failure: &FailureDescription) {
        forward!(self, test_failed, test_name, failure);
    }

    async fn test_ignored(&mut self, test_name: &str) {
        forward!(self, test_ignored, test_name);
    }

    async fn test_ended(&mut self, test_name: &str, metrics: &BTreeMap<String, String>) {
        forward!(self, test_ended, test_name, metrics);
    }

    async fn test_run_failed(&mut self, failure: &FailureDescription) {
        forward!(self, test_run_failed, failure);
    }

    async fn test_run_ended(&mut self, elapsed_millis: u64, metrics: &BTreeMap<String, String>) {
        forward!(self, test_run_ended, elapsed_millis, metrics);
    }

    async fn test_log(&mut self, log_name: &str, data_type: LogDataType, path: &Utf8Path) {
        forward!(self, test_log, log_name, data_type, path);
    }

    async fn test_log_saved(&mut self, log_name: &str, saved_path: &Utf8Path) {
        forward!(self, test_log_saved, log_name, saved_path);
    }

    async fn log_association(&mut self, log_name: &str, test_name: &str) {
        forward!(self, log_association, log_name, test_name);
    }

    async fn invocation_failed(&mut self, failure: &FailureDescription) {
        forward!(self, invocation_failed, failure);
    }

    async fn invocation_ended(&mut self, elapsed_millis: u64) {
        forward!(self, invocation_ended, elapsed_millis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingListener {
        events: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl TestInvocationListener for RecordingListener {
        async fn test_module_started(&mut self, module_name: &str) {
            self.events.lock().unwrap().push(format!("started:{module_name}"));
        }

        async fn test_module_ended(&mut self) {
            self.events.lock().unwrap().push("ended".to_string());
        }
    }

    #[tokio::test]
    async fn forwards_events_to_every_listener_in_order() {
        let events_a = Arc::new(Mutex::new(Vec::new()));
        let events_b = Arc::new(Mutex::new(Vec::new()));

        let listener_a = RecordingListener { events: events_a.clone() };
        let listener_b = RecordingListener { events: events_b.clone() };

        let mut forwarder = ResultForwarder::new(vec![Box::new(listener_a), Box::new(listener_b)]);
        forwarder.test_module_started("module.under.test").await;
        forwarder.test_module_ended().await;

        assert_eq!(*events_a.lock().unwrap(), vec!["started:module.under.test", "ended"]);
        assert_eq!(*events_b.lock().unwrap(), vec!["started:module.under.test", "ended"]);
    }
}
