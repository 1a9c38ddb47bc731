use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::time::whole_seconds_between;

use super::record_event::{ActivityRecord, EventKind};

/// A persisted activity record, one json line in a day file. Field names match the columns
/// exposed by the query API.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct StoredRecord {
    pub id: Uuid,
    pub pc_name: Arc<str>,
    pub window_title: Arc<str>,
    pub event_type: EventKind,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
}

impl StoredRecord {
    /// Builds a row with a fresh id. The duration is always computed here, never accepted from
    /// the outside.
    pub fn new(
        pc_name: Arc<str>,
        window_title: Arc<str>,
        event_type: EventKind,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pc_name,
            window_title,
            event_type,
            start_time,
            end_time,
            duration_seconds: end_time.map(|end| whole_seconds_between(start_time, end)),
        }
    }
}

impl From<&ActivityRecord> for StoredRecord {
    fn from(record: &ActivityRecord) -> Self {
        StoredRecord::new(
            record.machine_id().clone(),
            record.subject().clone(),
            record.kind(),
            record.start_time(),
            record.end_time(),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::daemon::storage::record_event::{ActivityRecord, EventKind};

    use super::StoredRecord;

    #[test]
    fn stored_record_mirrors_activity_record() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let record = ActivityRecord::window_close(
            "X".into(),
            "code - lib.rs".into(),
            start,
            start + Duration::seconds(42),
        );
        let stored = StoredRecord::from(&record);
        assert_eq!(&*stored.pc_name, "X");
        assert_eq!(&*stored.window_title, "code - lib.rs");
        assert_eq!(stored.event_type, EventKind::WindowClose);
        assert_eq!(stored.duration_seconds, Some(42));
    }

    #[test]
    fn rows_without_end_have_no_duration() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let stored = StoredRecord::new("X".into(), "system".into(), EventKind::Lock, start, None);
        assert_eq!(stored.duration_seconds, None);

        let line = serde_json::to_string(&stored).unwrap();
        let parsed: StoredRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, stored);
    }
}
