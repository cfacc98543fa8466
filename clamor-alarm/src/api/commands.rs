//! Command types sent from API handlers to the alarm service.
//!
//! Each command carries a oneshot reply channel so the handler can
//! await the result and translate it into an HTTP response. Reads do not
//! need commands; handlers take them from the service's watch channels.

use tokio::sync::oneshot;

use crate::alarm::{AlarmDraft, AlarmId, AlarmRecord};
use crate::error::Result;

pub enum AlarmCommand {
    /// Add a new alarm, enabled and armed.
    Create {
        draft: AlarmDraft,
        reply: oneshot::Sender<Result<AlarmRecord>>,
    },

    /// Change label and time, re-arming the alarm.
    Edit {
        id: AlarmId,
        draft: AlarmDraft,
        reply: oneshot::Sender<Result<AlarmRecord>>,
    },

    Delete {
        id: AlarmId,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Enable (re-arming) or disable an alarm.
    SetEnabled {
        id: AlarmId,
        enabled: bool,
        reply: oneshot::Sender<Result<AlarmRecord>>,
    },

    /// Silence the ringing alarm, if the noise gate allows it.
    Silence {
        reply: oneshot::Sender<Result<AlarmId>>,
    },
}
