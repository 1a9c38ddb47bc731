use std::{fmt::Display, str::FromStr, sync::Arc};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::whole_seconds_between;

/// Subject used for records that describe the machine rather than a window.
pub const SYSTEM_SUBJECT: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WindowOpen,
    WindowClose,
    Startup,
    Lock,
    Unlock,
    Logon,
    Logoff,
    Sleep,
    Resume,
    Unknown,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::WindowOpen,
        EventKind::WindowClose,
        EventKind::Startup,
        EventKind::Lock,
        EventKind::Unlock,
        EventKind::Logon,
        EventKind::Logoff,
        EventKind::Sleep,
        EventKind::Resume,
        EventKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::WindowOpen => "window_open",
            EventKind::WindowClose => "window_close",
            EventKind::Startup => "startup",
            EventKind::Lock => "lock",
            EventKind::Unlock => "unlock",
            EventKind::Logon => "logon",
            EventKind::Logoff => "logoff",
            EventKind::Sleep => "sleep",
            EventKind::Resume => "resume",
            EventKind::Unknown => "unknown",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| anyhow!("Unrecognized event type {s}"))
    }
}

/// A finished piece of activity history, as produced by the session tracker.
///
/// Records are immutable. `duration_seconds` is derived from the two timestamps, so a record
/// without an end never reports a duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRecord {
    machine_id: Arc<str>,
    subject: Arc<str>,
    kind: EventKind,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
}

impl ActivityRecord {
    pub fn window_open(machine_id: Arc<str>, subject: Arc<str>, start_time: DateTime<Utc>) -> Self {
        Self {
            machine_id,
            subject,
            kind: EventKind::WindowOpen,
            start_time,
            end_time: None,
        }
    }

    pub fn window_close(
        machine_id: Arc<str>,
        subject: Arc<str>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            machine_id,
            subject,
            kind: EventKind::WindowClose,
            start_time,
            end_time: Some(end_time),
        }
    }

    /// Instantaneous record attributed to the [SYSTEM_SUBJECT].
    pub fn system(machine_id: Arc<str>, kind: EventKind, at: DateTime<Utc>) -> Self {
        Self {
            machine_id,
            subject: SYSTEM_SUBJECT.into(),
            kind,
            start_time: at,
            end_time: None,
        }
    }

    pub fn machine_id(&self) -> &Arc<str> {
        &self.machine_id
    }

    pub fn subject(&self) -> &Arc<str> {
        &self.subject
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.end_time
            .map(|end| whole_seconds_between(self.start_time, end))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{ActivityRecord, EventKind, SYSTEM_SUBJECT};

    #[test]
    fn close_duration_is_floored() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let record = ActivityRecord::window_close(
            "pc".into(),
            "nvim - main.rs".into(),
            start,
            start + Duration::milliseconds(61_900),
        );
        assert_eq!(record.duration_seconds(), Some(61));
    }

    #[test]
    fn clock_regression_clamps_to_zero() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let record = ActivityRecord::window_close(
            "pc".into(),
            "a".into(),
            start,
            start - Duration::seconds(30),
        );
        assert_eq!(record.duration_seconds(), Some(0));
    }

    #[test]
    fn system_records_are_instantaneous() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let record = ActivityRecord::system("pc".into(), EventKind::Sleep, at);
        assert_eq!(&**record.subject(), SYSTEM_SUBJECT);
        assert_eq!(record.end_time(), None);
        assert_eq!(record.duration_seconds(), None);
    }

    #[test]
    fn event_kinds_parse_from_their_wire_names() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
            assert_eq!(
                serde_json::to_string(&kind).unwrap(),
                format!("\"{}\"", kind.as_str())
            );
        }
        assert!("window-open".parse::<EventKind>().is_err());
    }
}
