// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`LogSaverResultForwarder`]: persists every log exactly once, then forwards the save location
//! (and, for a log seen while a test is running, its association with that test) to an inner
//! listener.

use crate::capability::{LogDataType, LogSaver, TestInvocationListener};
use crate::errors::FailureDescription;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Wraps an inner [`TestInvocationListener`], intercepting `test_log` to persist the log via a
/// [`LogSaver`], forwarding the raw event to `inner` unconditionally, then additionally raising
/// `test_log_saved` (and `log_association`, if a test is currently running) once the save
/// location is known.
///
/// Persistence happens exactly once per distinct `log_name`: a module that retries (and so emits
/// the same log name again on a later attempt) reuses the path from the earlier save rather than
/// uploading it twice, but `test_log_saved`/`log_association` still fire on every call, since a
/// listener that tracks per-test logs needs to hear about every association even when the
/// underlying artifact is shared. I/O errors from the log saver are logged via [`tracing::warn!`]
/// and otherwise swallowed — a failed log upload must never fail the invocation it was trying to
/// document.
pub struct LogSaverResultForwarder {
    log_saver: Arc<dyn LogSaver>,
    inner: Box<dyn TestInvocationListener>,
    saved_paths: BTreeMap<String, Utf8PathBuf>,
    current_test: Option<String>,
}

impl LogSaverResultForwarder {
    /// Creates a forwarder that persists logs via `log_saver` before handing save locations to
    /// `inner`.
    pub fn new(log_saver: Arc<dyn LogSaver>, inner: Box<dyn TestInvocationListener>) -> Self {
        Self {
            log_saver,
            inner,
            saved_paths: BTreeMap::new(),
            current_test: None,
        }
    }
}

#[async_trait]
impl TestInvocationListener for LogSaverResultForwarder {
    async fn invocation_started(&mut self, context_attributes: &BTreeMap<String, String>) {
        self.inner.invocation_started(context_attributes).await;
    }

    async fn test_module_started(&mut self, module_name: &str) {
        self.inner.test_module_started(module_name).await;
    }

    async fn test_module_ended(&mut self) {
        self.inner.test_module_ended().await;
    }

    async fn test_run_started(&mut self, run_name: &str, attempt_number: u32) {
        self.inner.test_run_started(run_name, attempt_number).await;
    }

    async fn test_started(&mut self, test_name: &str) {
        self.current_test = Some(test_name.to_string());
        self.inner.test_started(test_name).await;
    }

    async fn test_failed(&mut self, test_name: &str, failure: &FailureDescription) {
        self.inner.test_failed(test_name, failure).await;
    }

    async fn test_ignored(&mut self, test_name: &str) {
        self.inner.test_ignored(test_name).await;
    }

    async fn test_ended(&mut self, test_name: &str, metrics: &BTreeMap<String, String>) {
        self.inner.test_ended(test_name, metrics).await;
        self.current_test = None;
    }

    async fn test_run_failed(&mut self, failure: &FailureDescription) {
        self.inner.test_run_failed(failure).await;
    }

    async fn test_run_ended(&mut self, elapsed_millis: u64, metrics: &BTreeMap<String, String>) {
        self.inner.test_run_ended(elapsed_millis, metrics).await;
    }

    async fn test_log(&mut self, log_name: &str, data_type: LogDataType, path: &Utf8Path) {
        self.inner.test_log(log_name, data_type, path).await;

        let saved_path = if let Some(cached) = self.saved_paths.get(log_name) {
            cached.clone()
        } else {
            match self.log_saver.save_log(log_name, data_type, path).await {
                Ok(saved_path) => {
                    self.saved_paths.insert(log_name.to_string(), saved_path.clone());
                    saved_path
                }
                Err(err) => {
                    tracing::warn!(log_name, error = %err, "failed to persist log");
                    return;
                }
            }
        };

        self.inner.test_log_saved(log_name, &saved_path).await;
        if let Some(test_name) = self.current_test.clone() {
            self.inner.log_association(log_name, &test_name).await;
        }
    }

    async fn test_log_saved(&mut self, log_name: &str, saved_path: &Utf8Path) {
        // A log already saved upstream (e.g. by a nested forwarder) — pass through unchanged.
        self.inner.test_log_saved(log_name, saved_path).await;
    }

    async fn log_association(&mut self, log_name: &str, test_name: &str) {
        self.inner.log_association(log_name, test_name).await;
    }

    async fn invocation_failed(&mut self, failure: &FailureDescription) {
        self.inner.invocation_failed(failure).await;
    }

    async fn invocation_ended(&mut self, elapsed_millis: u64) {
        self.inner.invocation_ended(elapsed_millis).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::LogSaveError;
    use std::sync::{Arc as StdArc, Mutex};

    struct FakeLogSaver {
        save_count: StdArc<Mutex<u32>>,
        fail: bool,
    }

    #[async_trait]
    impl LogSaver for FakeLogSaver {
        async fn save_log(
            &self,
            log_name: &str,
            _data_type: LogDataType,
            _source_path: &Utf8Path,
        ) -> Result<Utf8PathBuf, LogSaveError> {
            *self.save_count.lock().unwrap() += 1;
            if self.fail {
                return Err(LogSaveError {
                    log_name: log_name.to_string(),
                    message: "disk full".to_string(),
                });
            }
            Ok(Utf8PathBuf::from(format!("/saved/{log_name}")))
        }
    }

    #[derive(Default)]
    struct RecordingInner {
        raw_logs: StdArc<Mutex<Vec<String>>>,
        saved_paths: StdArc<Mutex<Vec<Utf8PathBuf>>>,
        associations: StdArc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl TestInvocationListener for RecordingInner {
        async fn test_log(&mut self, log_name: &str, _data_type: LogDataType, _path: &Utf8Path) {
            self.raw_logs.lock().unwrap().push(log_name.to_string());
        }

        async fn test_log_saved(&mut self, _log_name: &str, saved_path: &Utf8Path) {
            self.saved_paths.lock().unwrap().push(saved_path.to_path_buf());
        }

        async fn log_association(&mut self, log_name: &str, test_name: &str) {
            self.associations
                .lock()
                .unwrap()
                .push((log_name.to_string(), test_name.to_string()));
        }
    }

    #[tokio::test]
    async fn every_test_log_call_is_forwarded_raw_to_the_inner_listener() {
        let saver = StdArc::new(FakeLogSaver {
            save_count: StdArc::new(Mutex::new(0)),
            fail: false,
        });
        let raw_logs = StdArc::new(Mutex::new(Vec::new()));
        let inner = Box::new(RecordingInner { raw_logs: raw_logs.clone(), ..Default::default() });

        let mut forwarder = LogSaverResultForwarder::new(saver, inner);
        forwarder
            .test_log("logcat", LogDataType::Text, Utf8Path::new("/tmp/logcat.txt"))
            .await;
        forwarder
            .test_log("logcat", LogDataType::Text, Utf8Path::new("/tmp/logcat.txt"))
            .await;

        assert_eq!(*raw_logs.lock().unwrap(), vec!["logcat".to_string(), "logcat".to_string()]);
    }

    #[tokio::test]
    async fn a_repeated_log_name_is_saved_once_but_reported_saved_every_time() {
        let save_count = StdArc::new(Mutex::new(0));
        let saved_paths = StdArc::new(Mutex::new(Vec::new()));

        let saver = StdArc::new(FakeLogSaver {
            save_count: save_count.clone(),
            fail: false,
        });
        let inner = Box::new(RecordingInner { saved_paths: saved_paths.clone(), ..Default::default() });

        let mut forwarder = LogSaverResultForwarder::new(saver, inner);

        forwarder
            .test_log("logcat", LogDataType::Text, Utf8Path::new("/tmp/logcat.txt"))
            .await;
        // A retry re-emits the same log name; it must not be saved twice, but the listener still
        // hears a `test_log_saved` for it.
        forwarder
            .test_log("logcat", LogDataType::Text, Utf8Path::new("/tmp/logcat.txt"))
            .await;

        assert_eq!(*save_count.lock().unwrap(), 1);
        assert_eq!(saved_paths.lock().unwrap().len(), 2);
        assert_eq!(saved_paths.lock().unwrap()[0], saved_paths.lock().unwrap()[1]);
    }

    #[tokio::test]
    async fn a_log_emitted_while_a_test_is_running_is_associated_with_it() {
        let saver = StdArc::new(FakeLogSaver {
            save_count: StdArc::new(Mutex::new(0)),
            fail: false,
        });
        let associations = StdArc::new(Mutex::new(Vec::new()));
        let inner = Box::new(RecordingInner { associations: associations.clone(), ..Default::default() });

        let mut forwarder = LogSaverResultForwarder::new(saver, inner);
        forwarder.test_started("com.example.FooTest#bar").await;
        forwarder
            .test_log("logcat", LogDataType::Text, Utf8Path::new("/tmp/logcat.txt"))
            .await;
        forwarder
            .test_ended("com.example.FooTest#bar", &BTreeMap::new())
            .await;
        // No test running now; this log gets no association.
        forwarder
            .test_log("bugreport", LogDataType::Zip, Utf8Path::new("/tmp/bugreport.zip"))
            .await;

        assert_eq!(
            *associations.lock().unwrap(),
            vec![("logcat".to_string(), "com.example.FooTest#bar".to_string())]
        );
    }

    #[tokio::test]
    async fn a_failed_save_is_swallowed_and_never_forwarded() {
        let saver = StdArc::new(FakeLogSaver {
            save_count: StdArc::new(Mutex::new(0)),
            fail: true,
        });
        let saved_paths = StdArc::new(Mutex::new(Vec::new()));
        let inner = Box::new(RecordingInner { saved_paths: saved_paths.clone(), ..Default::default() });

        let mut forwarder = LogSaverResultForwarder::new(saver, inner);
        forwarder
            .test_log("bugreport", LogDataType::Zip, Utf8Path::new("/tmp/bugreport.zip"))
            .await;

        assert!(saved_paths.lock().unwrap().is_empty());
    }
}
