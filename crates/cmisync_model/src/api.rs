//! Thread-safe API facade with delayed automatic commits.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::data_model::DataModel;
use crate::error::ErrorCode;

/// The object content talks to.
///
/// Wraps a [`DataModel`] behind a mutex so calls from the content bridge and
/// the autocommit timer are serialized. When the activity enables
/// autocommit, a successful `SetValue` schedules one `Commit("")` after the
/// configured delay; further writes while a commit is pending do not
/// schedule another, and an explicit `Commit` or `Finish` cancels it.
///
/// Scheduling needs a Tokio runtime. Without one, autocommit is skipped.
#[derive(Clone)]
pub struct ScormApi {
    model: Arc<Mutex<DataModel>>,
    autocommit: Option<Duration>,
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ScormApi {
    /// Wraps a session.
    pub fn new(model: DataModel) -> Self {
        let activity = model.activity();
        let autocommit = activity.autocommit.then_some(activity.autocommit_delay);
        Self {
            model: Arc::new(Mutex::new(model)),
            autocommit,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Runs `f` with exclusive access to the session.
    pub fn with_model<R>(&self, f: impl FnOnce(&mut DataModel) -> R) -> R {
        f(&mut self.model.lock())
    }

    /// Returns true if an automatic commit is scheduled.
    pub fn has_pending_autocommit(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// `LMSInitialize("")`.
    pub fn initialize(&self, param: &str) -> String {
        self.model.lock().initialize(param).to_string()
    }

    /// `LMSGetValue(element)`.
    pub fn get_value(&self, element: &str) -> String {
        self.model.lock().get_value(element)
    }

    /// `LMSSetValue(element, value)`.
    pub fn set_value(&self, element: &str, value: &str) -> String {
        let result = self.model.lock().set_value(element, value);
        if result == "true" {
            self.schedule_autocommit();
        }
        result.to_string()
    }

    /// `LMSCommit("")`.
    pub fn commit(&self, param: &str) -> String {
        self.cancel_autocommit();
        self.model.lock().commit(param).to_string()
    }

    /// `LMSFinish("")`.
    pub fn finish(&self, param: &str) -> String {
        self.cancel_autocommit();
        self.model.lock().finish(param).to_string()
    }

    /// `LMSGetLastError()`.
    pub fn get_last_error(&self) -> String {
        self.model.lock().get_last_error()
    }

    /// `LMSGetErrorString(code)`.
    pub fn get_error_string(&self, code: &str) -> String {
        self.model.lock().get_error_string(code)
    }

    /// `LMSGetDiagnostic(param)`.
    pub fn get_diagnostic(&self, param: &str) -> String {
        self.model.lock().get_diagnostic(param)
    }

    /// Dispatches a call by name.
    ///
    /// Accepts both the `LMS`-prefixed SCORM 1.2 names and the bare ones.
    /// Missing arguments are treated as empty strings. Unknown methods set
    /// error 401 and return `""`.
    pub fn call(&self, method: &str, args: &[&str]) -> String {
        let arg = |i: usize| args.get(i).copied().unwrap_or("");
        match method.strip_prefix("LMS").unwrap_or(method) {
            "Initialize" => self.initialize(arg(0)),
            "GetValue" => self.get_value(arg(0)),
            "SetValue" => self.set_value(arg(0), arg(1)),
            "Commit" => self.commit(arg(0)),
            "Finish" => self.finish(arg(0)),
            "GetLastError" => self.get_last_error(),
            "GetErrorString" => self.get_error_string(arg(0)),
            "GetDiagnostic" => self.get_diagnostic(arg(0)),
            other => {
                debug!(method = other, "unknown API method");
                self.model.lock().set_last_error(ErrorCode::NotImplemented);
                String::new()
            }
        }
    }

    fn schedule_autocommit(&self) {
        let Some(delay) = self.autocommit else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no async runtime, autocommit skipped");
            return;
        };

        let mut pending = self.pending.lock();
        if pending.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let model = Arc::clone(&self.model);
        let slot = Arc::clone(&self.pending);
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            slot.lock().take();
            let result = model.lock().commit("");
            debug!(result, "autocommit ran");
        }));
    }

    fn cancel_autocommit(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for ScormApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScormApi")
            .field("autocommit", &self.autocommit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ActivityConfig, SessionConfig};
    use crate::persistence::{Persistence, RecordingSink};
    use crate::types::{ScoUserData, UserDataMap};

    fn api(activity: ActivityConfig) -> (ScormApi, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let data = UserDataMap::from([(1, ScoUserData::new(1))]);
        let model = DataModel::new(
            Arc::new(activity),
            SessionConfig::new(1, 1).with_offline(true),
            &data,
            Persistence::offline_only(sink.clone()),
        );
        (ScormApi::new(model), sink)
    }

    #[test]
    fn dispatches_prefixed_and_bare_names() {
        let (api, _) = api(ActivityConfig::new(1, 1));
        assert_eq!(api.call("LMSInitialize", &[""]), "true");
        assert_eq!(api.call("SetValue", &["cmi.core.lesson_location", "x"]), "true");
        assert_eq!(api.call("LMSGetValue", &["cmi.core.lesson_location"]), "x");
        assert_eq!(api.call("GetLastError", &[]), "0");
    }

    #[test]
    fn unknown_method_is_not_implemented() {
        let (api, _) = api(ActivityConfig::new(1, 1));
        assert_eq!(api.call("LMSTerminate", &[""]), "");
        assert_eq!(api.get_last_error(), "401");
    }

    #[test]
    fn no_runtime_means_no_autocommit() {
        let (api, sink) = api(ActivityConfig::new(1, 1).with_autocommit(Duration::from_millis(1)));
        api.initialize("");
        api.set_value("cmi.core.lesson_location", "x");
        assert!(!api.has_pending_autocommit());
        assert!(sink.batches().is_empty());
    }

    #[tokio::test]
    async fn autocommit_coalesces_writes() {
        let (api, sink) = api(ActivityConfig::new(1, 1).with_autocommit(Duration::from_millis(20)));
        api.initialize("");
        api.set_value("cmi.core.lesson_location", "a");
        api.set_value("cmi.core.lesson_location", "b");
        assert!(api.has_pending_autocommit());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.batches().len(), 1);
        assert!(sink
            .entries()
            .iter()
            .any(|e| e.element == "cmi.core.lesson_location" && e.value == "b"));
        assert!(!api.has_pending_autocommit());
    }

    #[tokio::test]
    async fn explicit_commit_cancels_autocommit() {
        let (api, sink) = api(ActivityConfig::new(1, 1).with_autocommit(Duration::from_millis(20)));
        api.initialize("");
        api.set_value("cmi.core.lesson_location", "a");
        assert_eq!(api.commit(""), "true");
        assert!(!api.has_pending_autocommit());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.batches().len(), 1);
    }

    #[tokio::test]
    async fn failed_write_does_not_schedule() {
        let (api, _) = api(ActivityConfig::new(1, 1).with_autocommit(Duration::from_millis(20)));
        api.initialize("");
        assert_eq!(api.set_value("cmi.core.student_id", "x"), "false");
        assert!(!api.has_pending_autocommit());
    }
}
