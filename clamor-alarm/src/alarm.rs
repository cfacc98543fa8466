//! Alarm records.
//!
//! An alarm is a one-shot event at an absolute instant. Its two flags
//! drive the scheduler:
//!
//! ```text
//!              time <= now, enabled
//!   armed ─────────────────────────────► triggered
//!     ▲                                      │
//!     └──── edit, or enable after disable ───┘
//! ```
//!
//! A disabled alarm never fires, whatever its `triggered` flag says.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Stable alarm identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, ToSchema)]
#[serde(transparent)]
pub struct AlarmId(String);

impl AlarmId {
    /// Identifier derived from a creation instant, e.g. `alarm_1767250800000`.
    pub fn from_creation_millis(millis: i128) -> Self {
        Self(format!("alarm_{millis}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AlarmId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AlarmId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A scheduled alarm, as stored and as exchanged with clients.
///
/// Field names on the wire match the persisted blob: `id`, `label`,
/// `time` (RFC 3339), `isEnabled`, `isTriggered`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct AlarmRecord {
    pub id: AlarmId,

    pub label: String,

    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub time: OffsetDateTime,

    #[serde(rename = "isEnabled")]
    pub enabled: bool,

    /// Set once the alarm has rung since it was last armed.
    #[serde(rename = "isTriggered")]
    pub triggered: bool,
}

impl AlarmRecord {
    /// A freshly created alarm: enabled and armed.
    pub fn new(id: AlarmId, draft: AlarmDraft) -> Self {
        Self {
            id,
            label: draft.label,
            time: draft.time,
            enabled: true,
            triggered: false,
        }
    }

    /// Whether the scheduler should fire this alarm at `now`.
    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.enabled && !self.triggered && self.time <= now
    }

    /// Apply an edit. Changing label or time re-arms the alarm.
    pub fn apply(&mut self, draft: AlarmDraft) {
        self.label = draft.label;
        self.time = draft.time;
        self.triggered = false;
    }

    /// Toggle the enabled flag. Enabling re-arms the alarm.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if enabled {
            self.triggered = false;
        }
    }
}

/// User-submitted alarm form: what to call it and when it rings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct AlarmDraft {
    pub label: String,

    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub time: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn record() -> AlarmRecord {
        AlarmRecord::new(
            AlarmId::from("a1"),
            AlarmDraft {
                label: "Wake up".into(),
                time: datetime!(2026-03-01 07:00 UTC),
            },
        )
    }

    #[test]
    fn new_alarm_is_enabled_and_armed() {
        let alarm = record();
        assert!(alarm.enabled);
        assert!(!alarm.triggered);
    }

    #[test]
    fn due_only_when_enabled_untriggered_and_past() {
        let mut alarm = record();
        let before = datetime!(2026-03-01 06:59:59 UTC);
        let exactly = datetime!(2026-03-01 07:00 UTC);

        assert!(!alarm.is_due(before));
        assert!(alarm.is_due(exactly));

        alarm.triggered = true;
        assert!(!alarm.is_due(exactly));

        alarm.triggered = false;
        alarm.enabled = false;
        assert!(!alarm.is_due(exactly));
    }

    #[test]
    fn edit_rearms_but_keeps_enabled_flag() {
        let mut alarm = record();
        alarm.triggered = true;
        alarm.enabled = false;

        alarm.apply(AlarmDraft {
            label: "Later".into(),
            time: datetime!(2026-03-02 08:00 UTC),
        });

        assert_eq!(alarm.label, "Later");
        assert!(!alarm.triggered);
        assert!(!alarm.enabled);
    }

    #[test]
    fn enabling_rearms_and_disabling_does_not() {
        let mut alarm = record();
        alarm.triggered = true;

        alarm.set_enabled(false);
        assert!(alarm.triggered);

        alarm.set_enabled(true);
        assert!(!alarm.triggered);
    }

    #[test]
    fn wire_format_uses_persisted_field_names() {
        let json = serde_json::to_value(record()).unwrap();

        assert_eq!(json["id"], "a1");
        assert_eq!(json["label"], "Wake up");
        assert_eq!(json["time"], "2026-03-01T07:00:00Z");
        assert_eq!(json["isEnabled"], true);
        assert_eq!(json["isTriggered"], false);
    }

    #[test]
    fn reads_browser_style_timestamps() {
        let json = r#"{"id":"alarm_1","label":"x","time":"2026-03-01T07:00:00.000Z","isEnabled":true,"isTriggered":false}"#;
        let alarm: AlarmRecord = serde_json::from_str(json).unwrap();
        assert_eq!(alarm.time, datetime!(2026-03-01 07:00 UTC));
    }
}
