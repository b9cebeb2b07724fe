//! Signals raised by a runtime session for the host.

use tokio::sync::mpsc;

use crate::types::{AttemptNumber, ScoId, ScormId};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeEventKind {
    /// Tracked data changed; refresh the table of contents.
    UpdateToc,
    /// Content asked to continue to the next SCO.
    LaunchNextSco,
    /// Content asked to go back to the previous SCO.
    LaunchPrevSco,
    /// Online submission failed; the session is now offline.
    GoOffline,
}

/// A signal together with the session it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeEvent {
    /// What happened.
    pub kind: RuntimeEventKind,
    /// Activity id.
    pub scorm_id: ScormId,
    /// SCO bound when the event was raised.
    pub sco_id: ScoId,
    /// Attempt number.
    pub attempt: AttemptNumber,
}

/// Sending half handed to a session.
pub type EventSender = mpsc::UnboundedSender<RuntimeEvent>;
/// Receiving half kept by the host.
pub type EventReceiver = mpsc::UnboundedReceiver<RuntimeEvent>;

/// Creates an event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
