//! The SCORM 1.2 runtime session.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{ActivityConfig, SessionConfig};
use crate::error::ErrorCode;
use crate::events::{EventSender, RuntimeEvent, RuntimeEventKind};
use crate::persistence::{Persistence, TrackBatch};
use crate::schema::{self, DefaultValue, ElementSchema, SCORE_CHILDREN};
use crate::time::Timespan;
use crate::types::{
    AttemptNumber, DataEntry, ElementMap, Mode, ScoId, ScoUserData, UserDataMap,
};

const TRUE: &str = "true";
const FALSE: &str = "false";

const LESSON_STATUS: &str = "cmi.core.lesson_status";
const SESSION_TIME: &str = "cmi.core.session_time";
const TOTAL_TIME: &str = "cmi.core.total_time";
const COMMENTS: &str = "cmi.comments";
const NAV_EVENT: &str = "nav.event";

/// Lifecycle of a runtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// `Initialize` has not been called yet.
    Uninitialized,
    /// Content may read and write elements.
    Active,
    /// `Finish` was called; `Initialize` starts the next SCO.
    Finished,
}

/// Working values of one SCO.
#[derive(Debug, Clone, Default)]
struct ScoState {
    values: ElementMap,
    /// Last persisted value per concrete element; `None` means "always send".
    baselines: BTreeMap<String, Option<String>>,
    /// Lesson status supplied by the LMS at launch.
    launch_status: String,
}

impl ScoState {
    fn build(data: &ScoUserData, mode: Mode) -> Self {
        let mut sco = ScoState::default();

        for (name, entry) in schema::entries() {
            if name.contains(".n.") {
                continue;
            }
            let default = match entry.default {
                DefaultValue::None => None,
                DefaultValue::Fixed(value) => Some(value.to_string()),
                DefaultValue::Launch => data.defaultdata.get(name).cloned(),
            };
            if let Some(value) = &default {
                sco.values.insert(name.to_string(), value.clone());
            }
            sco.baselines.insert(name.to_string(), default);
        }

        for element in data.defaultdata.keys() {
            if schema::is_indexed(element)
                || schema::lookup(element).is_none()
                || sco.values.contains_key(element)
            {
                continue;
            }
            let value = data.userdata.get(element).cloned().unwrap_or_default();
            sco.values.insert(element.clone(), value);
        }

        for (element, value) in &data.userdata {
            if !schema::is_indexed(element) {
                continue;
            }
            let dotted = schema::dotted_name(element).into_owned();
            sco.materialize_item(&dotted);
            for (counter, index) in index_chain(&dotted) {
                if index >= sco.count(&counter) {
                    sco.set(&counter, (index + 1).to_string());
                }
            }
            sco.baselines.insert(dotted.clone(), Some(value.clone()));
            sco.values.insert(dotted, value.clone());
        }

        sco.launch_status = sco.get(LESSON_STATUS).to_string();
        if sco.launch_status.is_empty() {
            sco.set(LESSON_STATUS, "not attempted");
        }
        let credit = if mode == Mode::Normal { "credit" } else { "no-credit" };
        sco.set("cmi.core.credit", credit);
        sco.set("cmi.core.lesson_mode", mode.as_str());
        sco
    }

    fn get(&self, element: &str) -> &str {
        self.values.get(element).map_or("", String::as_str)
    }

    fn set(&mut self, element: &str, value: impl Into<String>) {
        self.values.insert(element.to_string(), value.into());
    }

    fn count(&self, counter: &str) -> usize {
        self.get(counter).parse().unwrap_or(0)
    }

    /// Creates the bookkeeping elements of a collection item on first write.
    fn materialize_item(&mut self, element: &str) {
        if let Some((n, _)) = element
            .strip_prefix("cmi.objectives.")
            .and_then(|rest| rest.split_once('.'))
        {
            let score = format!("cmi.objectives.{n}.score");
            let children = format!("{score}._children");
            if !self.values.contains_key(&children) {
                self.set(&children, SCORE_CHILDREN);
                for field in ["raw", "min", "max"] {
                    self.set(&format!("{score}.{field}"), "");
                }
            }
        } else if let Some((n, _)) = element
            .strip_prefix("cmi.interactions.")
            .and_then(|rest| rest.split_once('.'))
        {
            for collection in ["objectives", "correct_responses"] {
                self.values
                    .entry(format!("cmi.interactions.{n}.{collection}._count"))
                    .or_insert_with(|| "0".to_string());
            }
        }
    }
}

/// Returns the `(counter element, index)` pairs along an indexed element.
///
/// `cmi.interactions.2.objectives.0.id` yields
/// `("cmi.interactions._count", 2)` and
/// `("cmi.interactions.2.objectives._count", 0)`.
pub fn index_chain(element: &str) -> Vec<(String, usize)> {
    let parts: Vec<&str> = element.split('.').collect();
    let mut chain = Vec::new();
    let Some((first, _)) = parts.split_first() else {
        return chain;
    };
    let mut prefix = (*first).to_string();
    let mut i = 1;
    while i + 1 < parts.len() {
        let segment = parts[i];
        let next = parts[i + 1];
        if !next.is_empty() && next.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = next.parse::<usize>() {
                chain.push((format!("{prefix}.{segment}._count"), index));
            }
            prefix = format!("{prefix}.{segment}.{next}");
            i += 2;
        } else {
            prefix = format!("{prefix}.{segment}");
            i += 1;
        }
    }
    chain
}

fn fixed_default(entry: &ElementSchema) -> Option<String> {
    match entry.default {
        DefaultValue::Fixed(value) => Some(value.to_string()),
        DefaultValue::None | DefaultValue::Launch => None,
    }
}

/// A SCORM 1.2 runtime session for one attempt.
///
/// Every SCO of the attempt keeps its own working values, so switching SCOs
/// with [`DataModel::load_sco`] loses nothing. API methods never fail in the
/// Rust sense: they return `"true"`/`"false"` or a value and store an
/// [`ErrorCode`] readable through [`DataModel::get_last_error`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use cmisync_model::{
///     ActivityConfig, DataModel, Persistence, RecordingSink, ScoUserData, SessionConfig,
///     UserDataMap,
/// };
///
/// let sink = Arc::new(RecordingSink::new());
/// let mut data = UserDataMap::new();
/// data.insert(1, ScoUserData::new(1));
/// let mut model = DataModel::new(
///     Arc::new(ActivityConfig::new(10, 20)),
///     SessionConfig::new(1, 1).with_offline(true),
///     &data,
///     Persistence::offline_only(sink.clone()),
/// );
///
/// assert_eq!(model.initialize(""), "true");
/// assert_eq!(model.set_value("cmi.core.lesson_location", "page-3"), "true");
/// assert_eq!(model.get_value("cmi.core.lesson_location"), "page-3");
/// assert_eq!(model.commit(""), "true");
/// ```
pub struct DataModel {
    activity: Arc<ActivityConfig>,
    sco_id: ScoId,
    attempt: AttemptNumber,
    mode: Mode,
    offline: bool,
    can_save_tracks: bool,
    scos: BTreeMap<ScoId, ScoState>,
    state: SessionState,
    last_error: ErrorCode,
    persistence: Persistence,
    events: Option<EventSender>,
}

impl DataModel {
    /// Creates a session from the attempt's current user data.
    pub fn new(
        activity: Arc<ActivityConfig>,
        session: SessionConfig,
        user_data: &UserDataMap,
        persistence: Persistence,
    ) -> Self {
        let scos = user_data
            .iter()
            .map(|(id, data)| (*id, ScoState::build(data, session.mode)))
            .collect();

        debug!(
            scorm_id = activity.scorm_id,
            attempt = session.attempt,
            mode = %session.mode,
            offline = session.offline,
            "created runtime session"
        );

        Self {
            activity,
            sco_id: session.sco_id,
            attempt: session.attempt,
            mode: session.mode,
            offline: session.offline,
            can_save_tracks: session.can_save_tracks,
            scos,
            state: SessionState::Uninitialized,
            last_error: ErrorCode::NoError,
            persistence,
            events: None,
        }
    }

    /// Sends runtime events to `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Returns the activity configuration.
    pub fn activity(&self) -> &ActivityConfig {
        &self.activity
    }

    /// Returns the SCO currently bound.
    pub fn sco_id(&self) -> ScoId {
        self.sco_id
    }

    /// Returns the attempt number.
    pub fn attempt(&self) -> AttemptNumber {
        self.attempt
    }

    /// Returns the session mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the code of the last API call.
    pub fn last_error(&self) -> ErrorCode {
        self.last_error
    }

    /// Returns true if commits go to local storage.
    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Switches between online and offline persistence.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    /// Binds the session to another SCO of the same attempt.
    pub fn load_sco(&mut self, sco_id: ScoId) {
        let mode = self.mode;
        self.scos
            .entry(sco_id)
            .or_insert_with(|| ScoState::build(&ScoUserData::new(sco_id), mode));
        self.sco_id = sco_id;
    }

    /// Returns the working values of every SCO.
    pub fn user_data(&self) -> UserDataMap {
        self.scos
            .iter()
            .map(|(id, sco)| {
                (
                    *id,
                    ScoUserData {
                        sco_id: *id,
                        userdata: sco.values.clone(),
                        defaultdata: ElementMap::new(),
                    },
                )
            })
            .collect()
    }

    /// `Initialize("")`.
    pub fn initialize(&mut self, param: &str) -> &'static str {
        let result = if !param.is_empty() {
            Err(ErrorCode::InvalidArgument)
        } else if self.state == SessionState::Active {
            Err(ErrorCode::GeneralException)
        } else {
            self.state = SessionState::Active;
            Ok(())
        };
        self.finish_call(result)
    }

    /// `GetValue(element)`.
    pub fn get_value(&mut self, element: &str) -> String {
        match self.try_get(element) {
            Ok(value) => {
                self.last_error = ErrorCode::NoError;
                value
            }
            Err(code) => {
                self.last_error = code;
                String::new()
            }
        }
    }

    /// `SetValue(element, value)`.
    pub fn set_value(&mut self, element: &str, value: &str) -> &'static str {
        let result = self.try_set(element, value);
        self.finish_call(result)
    }

    /// `Commit("")`.
    pub fn commit(&mut self, param: &str) -> &'static str {
        let result = if !param.is_empty() {
            Err(ErrorCode::InvalidArgument)
        } else if self.state != SessionState::Active {
            Err(ErrorCode::NotInitialized)
        } else {
            let stored = self.store_data(false);
            self.emit(RuntimeEventKind::UpdateToc);
            if stored {
                Ok(())
            } else {
                Err(ErrorCode::GeneralException)
            }
        };
        self.finish_call(result)
    }

    /// `Finish("")`.
    pub fn finish(&mut self, param: &str) -> &'static str {
        let result = if !param.is_empty() {
            Err(ErrorCode::InvalidArgument)
        } else if self.state != SessionState::Active {
            Err(ErrorCode::NotInitialized)
        } else {
            self.state = SessionState::Finished;
            let stored = self.store_data(true);

            let nav = self.current().get(NAV_EVENT).to_string();
            match nav.as_str() {
                "" if self.activity.auto_continue => self.emit(RuntimeEventKind::LaunchNextSco),
                "" => {}
                "continue" => self.emit(RuntimeEventKind::LaunchNextSco),
                _ => self.emit(RuntimeEventKind::LaunchPrevSco),
            }
            self.emit(RuntimeEventKind::UpdateToc);

            if stored {
                Ok(())
            } else {
                Err(ErrorCode::GeneralException)
            }
        };
        self.finish_call(result)
    }

    /// `GetLastError()`.
    pub fn get_last_error(&self) -> String {
        self.last_error.to_string()
    }

    /// `GetErrorString(code)`: the standard message, or `""` for unknown codes.
    pub fn get_error_string(&self, code: &str) -> String {
        code.parse::<u16>()
            .ok()
            .and_then(ErrorCode::from_code)
            .map(|c| c.message().to_string())
            .unwrap_or_default()
    }

    /// `GetDiagnostic(param)`: echoes `param`, or the last error code if empty.
    pub fn get_diagnostic(&self, param: &str) -> String {
        if param.is_empty() {
            self.last_error.to_string()
        } else {
            param.to_string()
        }
    }

    pub(crate) fn set_last_error(&mut self, code: ErrorCode) {
        self.last_error = code;
    }

    fn finish_call(&mut self, result: Result<(), ErrorCode>) -> &'static str {
        match result {
            Ok(()) => {
                self.last_error = ErrorCode::NoError;
                TRUE
            }
            Err(code) => {
                self.last_error = code;
                FALSE
            }
        }
    }

    fn current(&mut self) -> &ScoState {
        self.current_mut()
    }

    fn current_mut(&mut self) -> &mut ScoState {
        let mode = self.mode;
        let sco_id = self.sco_id;
        self.scos
            .entry(sco_id)
            .or_insert_with(|| ScoState::build(&ScoUserData::new(sco_id), mode))
    }

    fn try_get(&mut self, element: &str) -> Result<String, ErrorCode> {
        if self.state != SessionState::Active {
            return Err(ErrorCode::NotInitialized);
        }
        if element.is_empty() {
            return Err(ErrorCode::InvalidArgument);
        }
        let element = schema::dotted_name(element).into_owned();
        let generic = schema::generic_name(&element).into_owned();

        if let Some(entry) = schema::lookup(&generic) {
            if entry.access.readable() {
                return Ok(self.current().get(&element).to_string());
            }
            return Err(entry.read_error.unwrap_or(ErrorCode::WriteOnly));
        }

        if let Some(parent) = generic.strip_suffix("._children") {
            if schema::lookup(parent).is_some() {
                return Err(ErrorCode::CannotHaveChildren);
            }
        } else if let Some(parent) = generic.strip_suffix("._count") {
            if schema::lookup(parent).is_some() {
                return Err(ErrorCode::NotAnArray);
            }
        }
        Err(ErrorCode::InvalidArgument)
    }

    fn try_set(&mut self, element: &str, value: &str) -> Result<(), ErrorCode> {
        if self.state != SessionState::Active {
            return Err(ErrorCode::NotInitialized);
        }
        if element.is_empty() {
            return Err(ErrorCode::InvalidArgument);
        }
        let element = schema::dotted_name(element).into_owned();
        let generic = schema::generic_name(&element).into_owned();
        let entry = schema::lookup(&generic).ok_or(ErrorCode::InvalidArgument)?;

        if !entry.access.writable() {
            return Err(entry.write_error);
        }
        if let Some(format) = entry.format {
            if !format.matches(value, self.activity.strict_strings) {
                return Err(entry.write_error);
            }
        }

        let chain = if element != generic {
            index_chain(&element)
        } else {
            Vec::new()
        };
        let sco = self.current();
        if chain.iter().any(|(counter, index)| *index > sco.count(counter)) {
            return Err(ErrorCode::InvalidArgument);
        }

        let normalized;
        let value = match entry.range {
            Some(range) => {
                normalized = range.normalize(value).ok_or(entry.write_error)?;
                normalized.as_str()
            }
            None => value,
        };

        let sco = self.current_mut();
        if !chain.is_empty() {
            sco.materialize_item(&element);
            for (counter, index) in chain {
                let count = sco.count(&counter);
                if index == count {
                    sco.set(&counter, (count + 1).to_string());
                }
            }
        }

        if element == COMMENTS {
            let appended = format!("{}{}", sco.get(COMMENTS), value);
            sco.set(COMMENTS, appended);
        } else {
            sco.set(&element, value);
        }
        Ok(())
    }

    /// Returns the elements changed since the last persisted commit and
    /// advances their baselines.
    fn collect_changes(&mut self) -> Vec<DataEntry> {
        let ScoState {
            values, baselines, ..
        } = self.current_mut();
        let mut changes = Vec::new();

        for (element, value) in values.iter() {
            if !element.starts_with("cmi") || element == SESSION_TIME {
                continue;
            }
            let generic = schema::generic_name(element);
            let Some(entry) = schema::lookup(&generic) else {
                continue;
            };
            if !entry.access.writable() {
                continue;
            }
            let baseline = baselines
                .entry(element.clone())
                .or_insert_with(|| fixed_default(entry));
            if baseline.as_deref() != Some(value.as_str()) {
                changes.push(DataEntry::new(schema::storage_name(element), value.clone()));
                *baseline = Some(value.clone());
            }
        }
        changes
    }

    fn derive_completion(&mut self) {
        let sco = self.current_mut();
        let untouched = sco.get(LESSON_STATUS) == "not attempted";
        if untouched {
            sco.set(LESSON_STATUS, "completed");
        }

        if sco.get("cmi.core.lesson_mode") == Mode::Normal.as_str()
            && sco.get("cmi.core.credit") == "credit"
        {
            let raw = sco.get("cmi.core.score.raw").parse::<f64>();
            let mastery = sco.get("cmi.student_data.mastery_score").parse::<f64>();
            if let (Ok(raw), Ok(mastery)) = (raw, mastery) {
                let status = if raw >= mastery { "passed" } else { "failed" };
                sco.set(LESSON_STATUS, status);
            }
        }

        if sco.get("cmi.core.lesson_mode") == Mode::Browse.as_str()
            && sco.launch_status.is_empty()
            && untouched
        {
            sco.set(LESSON_STATUS, "browsed");
        }
    }

    fn total_time(&mut self) -> DataEntry {
        let sco = self.current();
        let total = sco.get(TOTAL_TIME).parse::<Timespan>().unwrap_or_else(|err| {
            debug!(%err, "treating unparsable total time as zero");
            Timespan::ZERO
        });
        let session = sco.get(SESSION_TIME).parse::<Timespan>().unwrap_or(Timespan::ZERO);
        DataEntry::new(TOTAL_TIME, (total + session).to_string())
    }

    fn store_data(&mut self, finishing: bool) -> bool {
        if !self.can_save_tracks {
            return true;
        }
        if finishing {
            self.derive_completion();
        }

        let saved_baselines = self.current().baselines.clone();
        let mut tracks = self.collect_changes();
        if finishing {
            let total = self.total_time();
            tracks.push(total);
        }

        let batch = TrackBatch {
            scorm_id: self.activity.scorm_id,
            course_id: self.activity.course_id,
            sco_id: self.sco_id,
            attempt: self.attempt,
            tracks,
            force_completed: self.activity.force_completed,
            sco_data: self.current().values.clone(),
        };

        let stored = self.persist(&batch);
        if !stored {
            self.current_mut().baselines = saved_baselines;
        }
        stored
    }

    fn persist(&mut self, batch: &TrackBatch) -> bool {
        if !self.offline {
            if let Some(online) = self.persistence.online.clone() {
                match online.save_tracks(batch) {
                    Ok(()) => return true,
                    Err(err) => {
                        warn!(
                            scorm_id = batch.scorm_id,
                            attempt = batch.attempt,
                            %err,
                            "online track submission failed, switching to offline"
                        );
                        self.offline = true;
                        self.emit(RuntimeEventKind::GoOffline);
                    }
                }
            }
        }

        match self.persistence.offline.save_tracks(batch) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    scorm_id = batch.scorm_id,
                    attempt = batch.attempt,
                    %err,
                    "offline track storage failed"
                );
                false
            }
        }
    }

    fn emit(&self, kind: RuntimeEventKind) {
        let Some(events) = &self.events else {
            return;
        };
        let event = RuntimeEvent {
            kind,
            scorm_id: self.activity.scorm_id,
            sco_id: self.sco_id,
            attempt: self.attempt,
        };
        if events.send(event).is_err() {
            debug!(?kind, "runtime event dropped, no receiver");
        }
    }
}

impl std::fmt::Debug for DataModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataModel")
            .field("scorm_id", &self.activity.scorm_id)
            .field("sco_id", &self.sco_id)
            .field("attempt", &self.attempt)
            .field("mode", &self.mode)
            .field("offline", &self.offline)
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}
