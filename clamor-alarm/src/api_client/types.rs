//! API data transfer objects.
//!
//! These types define the API contract shared between the server and
//! clients. Alarm records travel in their persisted shape.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use crate::alarm::{AlarmDraft, AlarmId, AlarmRecord};

/// What the ring controller is doing.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct RingStatus {
    /// The active session, absent when idle.
    pub ringing: Option<RingingStatus>,
}

/// The ringing session as shown to the user.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct RingingStatus {
    #[schema(value_type = String)]
    pub alarm_id: AlarmId,
    pub label: String,
    /// Seconds of sustained noise still needed.
    pub remaining_secs: u64,
    /// Gate progress, 0.0 to 1.0.
    pub progress: f32,
    pub silence_enabled: bool,
    /// Shown when the microphone could not be opened.
    pub alert: Option<String>,
}

/// Body of `PATCH /alarms/{id}`.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct EnabledPatch {
    pub enabled: bool,
}

/// Body of a successful `POST /ringing/silence`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct Silenced {
    #[schema(value_type = String)]
    pub alarm_id: AlarmId,
}
