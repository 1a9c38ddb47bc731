use std::sync::Arc;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::{
    daemon::storage::{
        entities::StoredRecord,
        query::{self, aggregate, RecordFilter, StatsFilter, DEFAULT_LIST_LIMIT},
        record_event::{ActivityRecord, EventKind},
        record_storage::{store_record, RecordStorage},
    },
    utils::time::{end_of_day, start_of_day},
};

use super::{ApiError, ApiResponse};

/// Body of `POST /api/records`. Fields are optional so that missing ones can be reported as a
/// validation failure rather than a decoding error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressPayload {
    pub pc_name: Option<String>,
    pub window_title: Option<String>,
    pub event_type: Option<String>,
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

impl From<&ActivityRecord> for IngressPayload {
    fn from(record: &ActivityRecord) -> Self {
        Self {
            pc_name: Some(record.machine_id().to_string()),
            window_title: Some(record.subject().to_string()),
            event_type: Some(record.kind().to_string()),
            start_time: Some(record.start_time().to_rfc3339_opts(SecondsFormat::Millis, true)),
            end_time: record
                .end_time()
                .map(|end| end.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

/// Query string of `GET /api/records`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ListQuery {
    pub pc_name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<String>,
}

/// Query string of `GET /api/records/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StatsQuery {
    pub pc_name: Option<String>,
    pub date: Option<String>,
}

/// Blank strings count as absent, the same way a form would send them.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|v| v.with_timezone(&Utc))
        .map_err(|e| ApiError::invalid(field, e))
}

/// Accepts a full timestamp or a bare `YYYY-MM-DD`. For a bare date, `end_of_range` selects
/// whether the bound sits at the beginning or the end of that day.
fn parse_bound(field: &'static str, value: &str, end_of_range: bool) -> Result<DateTime<Utc>, ApiError> {
    match NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d") {
        Ok(date) if end_of_range => Ok(end_of_day(date)),
        Ok(date) => Ok(start_of_day(date)),
        Err(_) => parse_timestamp(field, value),
    }
}

fn validate(payload: IngressPayload) -> Result<StoredRecord, ApiError> {
    let (Some(pc_name), Some(window_title), Some(event_type), Some(start_time)) = (
        present(payload.pc_name),
        present(payload.window_title),
        present(payload.event_type),
        present(payload.start_time),
    ) else {
        return Err(ApiError::MissingFields);
    };

    let event_type = event_type
        .trim()
        .parse::<EventKind>()
        .map_err(|e| ApiError::invalid("event_type", e))?;
    let start_time = parse_timestamp("start_time", &start_time)?;
    let end_time = present(payload.end_time)
        .map(|end| parse_timestamp("end_time", &end))
        .transpose()?;

    Ok(StoredRecord::new(
        Arc::from(pc_name),
        Arc::from(window_title),
        event_type,
        start_time,
        end_time,
    ))
}

/// `POST /api/records`. Nothing is written unless the whole payload is valid.
pub async fn create_record(storage: &impl RecordStorage, body: Value) -> ApiResponse {
    let payload = match serde_json::from_value::<IngressPayload>(body) {
        Ok(payload) => payload,
        Err(e) => return ApiError::invalid("body", e).into(),
    };
    let record = match validate(payload) {
        Ok(record) => record,
        Err(e) => return e.into(),
    };

    let id = record.id;
    let summary = format!("{} - {}", record.event_type, record.window_title);
    match store_record(storage, record).await {
        Ok(()) => {
            info!("Record saved: {summary}");
            ApiResponse::created(json!({
                "success": true,
                "id": id,
                "message": "Record saved successfully",
            }))
        }
        Err(e) => ApiError::Storage(e).into(),
    }
}

fn list_filter(params: ListQuery) -> Result<RecordFilter, ApiError> {
    let limit = match present(params.limit) {
        Some(limit) => limit
            .trim()
            .parse::<usize>()
            .map_err(|e| ApiError::invalid("limit", e))?,
        None => DEFAULT_LIST_LIMIT,
    };
    Ok(RecordFilter {
        pc_name: present(params.pc_name),
        start: present(params.start_date)
            .map(|v| parse_bound("start_date", &v, false))
            .transpose()?,
        end: present(params.end_date)
            .map(|v| parse_bound("end_date", &v, true))
            .transpose()?,
        limit,
    })
}

/// `GET /api/records`, newest first.
pub async fn list_records(storage: &impl RecordStorage, params: ListQuery) -> ApiResponse {
    let filter = match list_filter(params) {
        Ok(filter) => filter,
        Err(e) => return e.into(),
    };
    match query::list_records(storage, &filter).await {
        Ok(records) => ApiResponse::ok(json!({
            "success": true,
            "count": records.len(),
            "records": records,
        })),
        Err(e) => ApiError::Storage(e).into(),
    }
}

/// `GET /api/records/stats`, newest date first.
pub async fn record_stats(storage: &impl RecordStorage, params: StatsQuery) -> ApiResponse {
    let date = match present(params.date)
        .map(|v| NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d"))
        .transpose()
    {
        Ok(date) => date,
        Err(e) => return ApiError::invalid("date", e).into(),
    };
    let filter = StatsFilter {
        pc_name: present(params.pc_name),
        date,
    };
    match aggregate(storage, &filter).await {
        Ok(stats) => ApiResponse::ok(json!({
            "success": true,
            "stats": stats,
        })),
        Err(e) => ApiError::Storage(e).into(),
    }
}
