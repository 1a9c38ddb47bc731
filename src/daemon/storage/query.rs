//! Read side of the record store: newest-first listing and per-day aggregation.

use std::{cmp::Reverse, collections::BTreeMap, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use futures::{stream, StreamExt};
use serde::Serialize;
use tracing::error;

use super::{
    entities::StoredRecord, record_event::EventKind, record_storage::RecordStorage,
};

pub const DEFAULT_LIST_LIMIT: usize = 100;

/// How many day files are read concurrently.
const READ_AHEAD: usize = 4;

/// Filter for [list_records]. Both bounds are inclusive and compared against `start_time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub pc_name: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            pc_name: None,
            start: None,
            end: None,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl RecordFilter {
    fn covers_date(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start.date_naive())
            && self.end.map_or(true, |end| date <= end.date_naive())
    }

    fn matches(&self, record: &StoredRecord) -> bool {
        self.pc_name
            .as_deref()
            .map_or(true, |pc_name| &*record.pc_name == pc_name)
            && self.start.map_or(true, |start| record.start_time >= start)
            && self.end.map_or(true, |end| record.start_time <= end)
    }
}

/// Returns the records matching `filter`, newest `start_time` first, capped at `filter.limit`.
///
/// Day files partition records by start date, so days are visited newest first and reading
/// stops as soon as the limit is reached.
pub async fn list_records(
    storage: impl RecordStorage,
    filter: &RecordFilter,
) -> Result<Vec<StoredRecord>> {
    let mut result = Vec::new();
    if filter.limit == 0 {
        return Ok(result);
    }

    let mut dates = storage.stored_dates().await?;
    dates.retain(|date| filter.covers_date(*date));
    dates.sort_unstable_by_key(|date| Reverse(*date));

    let storage = Arc::new(storage);
    let mut days = stream::iter(dates)
        .map(|day| {
            let storage = storage.clone();
            async move { (day, storage.get_data_for(day).await) }
        })
        .buffered(READ_AHEAD);

    while let Some((day, data)) = days.next().await {
        let mut rows = data
            .inspect_err(|e| error!("Failed to read records of {day} {e:?}"))?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect::<Vec<_>>();
        rows.sort_by_key(|record| Reverse(record.start_time));

        let missing = filter.limit - result.len();
        result.extend(rows.into_iter().take(missing));
        if result.len() >= filter.limit {
            break;
        }
    }

    Ok(result)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsFilter {
    pub pc_name: Option<String>,
    pub date: Option<NaiveDate>,
}

/// Activity of one machine during one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyStats {
    pub pc_name: Arc<str>,
    pub date: NaiveDate,
    pub total_events: u64,
    pub window_opens: u64,
    /// Sum of the known durations. Rows without a duration don't contribute.
    pub total_seconds: i64,
}

impl DailyStats {
    fn new(pc_name: Arc<str>, date: NaiveDate) -> Self {
        Self {
            pc_name,
            date,
            total_events: 0,
            window_opens: 0,
            total_seconds: 0,
        }
    }

    fn add(&mut self, record: &StoredRecord) {
        self.total_events += 1;
        if record.event_type == EventKind::WindowOpen {
            self.window_opens += 1;
        }
        self.total_seconds += record.duration_seconds.unwrap_or_default();
    }
}

/// Groups records by machine and calendar date of `start_time`, newest date first. Within a
/// date, machines are ordered by name.
pub async fn aggregate(storage: impl RecordStorage, filter: &StatsFilter) -> Result<Vec<DailyStats>> {
    let dates = match filter.date {
        Some(date) => vec![date],
        None => storage.stored_dates().await?,
    };

    let storage = Arc::new(storage);
    let mut days = stream::iter(dates)
        .map(|day| {
            let storage = storage.clone();
            async move { (day, storage.get_data_for(day).await) }
        })
        .buffered(READ_AHEAD);

    let mut groups = BTreeMap::<(Reverse<NaiveDate>, Arc<str>), DailyStats>::new();
    while let Some((day, data)) = days.next().await {
        let rows = data.inspect_err(|e| error!("Failed to read records of {day} {e:?}"))?;
        for record in rows {
            let date = record.start_time.date_naive();
            if filter.date.is_some_and(|wanted| wanted != date) {
                continue;
            }
            if filter
                .pc_name
                .as_deref()
                .is_some_and(|pc_name| &*record.pc_name != pc_name)
            {
                continue;
            }
            groups
                .entry((Reverse(date), record.pc_name.clone()))
                .or_insert_with(|| DailyStats::new(record.pc_name.clone(), date))
                .add(&record);
        }
    }

    Ok(groups.into_values().collect())
}
