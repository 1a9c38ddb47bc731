use anyhow::Result;
use chrono::NaiveDate;
use tracing::debug;

use crate::daemon::storage::{
    entities::StoredRecord,
    record_event::ActivityRecord,
    record_storage::{RecordFileHandle, RecordStorage},
};

use super::sink::RecordSink;

/// Sink writing straight into the local [RecordStorage]. Keeps the file of the last written
/// day open, since consecutive records almost always land on the same day.
pub struct LocalSink<R: RecordStorage> {
    records_storage: R,
    current_handle: Option<R::RecordFile>,
}

impl<R: RecordStorage> LocalSink<R> {
    pub fn new(records_storage: R) -> Self {
        Self {
            records_storage,
            current_handle: None,
        }
    }

    async fn file_for(&mut self, date: NaiveDate) -> Result<&mut R::RecordFile> {
        let file = match self.current_handle.take() {
            Some(file) if file.get_date() == date => file,
            Some(mut stale) => {
                debug!("Switching record file from {} to {date}", stale.get_date());
                stale.flush().await?;
                self.records_storage.open_day(date).await?
            }
            None => self.records_storage.open_day(date).await?,
        };
        Ok(self.current_handle.insert(file))
    }
}

impl<R: RecordStorage> RecordSink for LocalSink<R> {
    async fn save(&mut self, record: &ActivityRecord) -> Result<()> {
        let stored = StoredRecord::from(record);
        let file = self.file_for(stored.start_time.date_naive()).await?;
        file.append(vec![stored]).await
    }

    async fn finalize(&mut self) -> Result<()> {
        if let Some(file) = self.current_handle.as_mut() {
            file.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::daemon::{
        processing::sink::RecordSink,
        storage::{
            record_event::{ActivityRecord, EventKind},
            record_storage::{RecordStorage, RecordStorageImpl},
        },
    };

    use super::LocalSink;

    #[tokio::test]
    async fn test_local_sink_files_records_by_start_day() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;
        let mut sink = LocalSink::new(&storage);

        let late = Utc.with_ymd_and_hms(2024, 2, 1, 23, 59, 0).unwrap();
        let after_midnight = late + Duration::minutes(2);
        let records = [
            ActivityRecord::window_open("pc".into(), "A".into(), late),
            // The close belongs to the day the session started.
            ActivityRecord::window_close("pc".into(), "A".into(), late, after_midnight),
            ActivityRecord::window_open("pc".into(), "B".into(), after_midnight),
            ActivityRecord::system("pc".into(), EventKind::Lock, after_midnight),
        ];
        for record in &records {
            sink.save(record).await?;
        }
        sink.finalize().await?;

        let first_day = storage
            .get_data_for(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
            .await?;
        let second_day = storage
            .get_data_for(NaiveDate::from_ymd_opt(2024, 2, 2).unwrap())
            .await?;

        assert_eq!(
            first_day.iter().map(|r| r.event_type).collect::<Vec<_>>(),
            vec![EventKind::WindowOpen, EventKind::WindowClose]
        );
        assert_eq!(first_day[1].duration_seconds, Some(120));
        assert_eq!(
            second_day.iter().map(|r| r.event_type).collect::<Vec<_>>(),
            vec![EventKind::WindowOpen, EventKind::Lock]
        );
        assert_eq!(second_day[1].end_time, None);
        Ok(())
    }
}
