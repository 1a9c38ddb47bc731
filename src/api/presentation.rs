use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error};

use crate::daemon::storage::{
    entities::StoredRecord,
    query::{list_records, RecordFilter},
    record_event::EventKind,
    record_storage::RecordStorage,
};

pub const GET_RECORDS_MESSAGE: &str = "getRecords";

/// One row of the activity table shown by the display surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordView {
    pub window_title: Arc<str>,
    pub event_type: EventKind,
    pub start_time: String,
    /// Empty while the record has no end.
    pub end_time: String,
    pub duration: Option<i64>,
}

impl From<StoredRecord> for RecordView {
    fn from(record: StoredRecord) -> Self {
        Self {
            window_title: record.window_title,
            event_type: record.event_type,
            start_time: record.start_time.to_rfc3339(),
            end_time: record
                .end_time
                .map(|end| end.to_rfc3339())
                .unwrap_or_default(),
            duration: record.duration_seconds,
        }
    }
}

/// The newest records as a json array. Failures render as an empty array.
pub async fn get_records_json(storage: &impl RecordStorage) -> String {
    let records = match list_records(storage, &RecordFilter::default()).await {
        Ok(records) => records,
        Err(e) => {
            error!("Failed to load records for display {e:?}");
            return "[]".to_owned();
        }
    };
    let views = records.into_iter().map(RecordView::from).collect::<Vec<_>>();
    serde_json::to_string(&views)
        .inspect_err(|e| error!("Failed to render records {e:?}"))
        .unwrap_or_else(|_| "[]".to_owned())
}

/// Answers a message from the display surface. Unknown messages get no reply.
pub async fn handle_bridge_message(storage: &impl RecordStorage, message: &str) -> Option<String> {
    if message != GET_RECORDS_MESSAGE {
        debug!("Ignoring bridge message {message:?}");
        return None;
    }
    Some(get_records_json(storage).await)
}
