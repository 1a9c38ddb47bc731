use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::utils::time::{date_to_record_name, record_name_to_date};

use super::entities::StoredRecord;

/// Interface for abstracting storage of records.
pub trait RecordStorage {
    type RecordFile: RecordFileHandle;

    /// Opens or creates the record file of a day. Records are filed under the UTC date of their
    /// `start_time`.
    fn open_day(&self, date: NaiveDate) -> impl Future<Output = Result<Self::RecordFile>>;

    /// Retrieves data from a record file for a certain day.
    fn get_data_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<StoredRecord>>> + Send;

    /// Lists every day that has a record file, in no particular order.
    fn stored_dates(&self) -> impl Future<Output = Result<Vec<NaiveDate>>> + Send;
}

impl<T: Deref> RecordStorage for T
where
    T::Target: RecordStorage,
{
    type RecordFile = <T::Target as RecordStorage>::RecordFile;

    fn open_day(&self, date: NaiveDate) -> impl Future<Output = Result<Self::RecordFile>> {
        self.deref().open_day(date)
    }

    fn get_data_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<StoredRecord>>> + Send {
        self.deref().get_data_for(date)
    }

    fn stored_dates(&self) -> impl Future<Output = Result<Vec<NaiveDate>>> + Send {
        self.deref().stored_dates()
    }
}

pub trait RecordFileHandle {
    fn append(&mut self, records: Vec<StoredRecord>) -> impl Future<Output = Result<()>>;
    fn get_date(&self) -> NaiveDate;
    fn flush(&mut self) -> impl Future<Output = Result<()>>;
}

/// Appends a single row to the file of its day.
pub async fn store_record(storage: &impl RecordStorage, record: StoredRecord) -> Result<()> {
    let mut file = storage.open_day(record.start_time.date_naive()).await?;
    file.append(vec![record]).await?;
    file.flush().await
}

/// The main realization of [RecordStorage]: a directory of json-lines files, one per UTC day.
pub struct RecordStorageImpl {
    record_dir: PathBuf,
}

impl RecordStorageImpl {
    /// Creates the directory when missing. Failing here means the store is unusable, which
    /// callers treat as fatal.
    pub fn new(record_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&record_dir)?;
        std::fs::read_dir(&record_dir)?;

        Ok(Self { record_dir })
    }

    async fn get_all_inner(&self, path: &Path) -> Result<Vec<StoredRecord>> {
        async fn extract(path: &Path) -> std::result::Result<Vec<StoredRecord>, std::io::Error> {
            debug!("Extracting {path:?}");
            let file = File::open(path).await?;
            file.lock_shared()?;
            let buffer = BufReader::new(file);
            let mut lines = buffer.lines();
            let mut records = vec![];
            while let Ok(Some(v)) = lines.next_line().await {
                if v.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<StoredRecord>(&v) {
                    Ok(v) => records.push(v),
                    Err(e) => {
                        // A write cut short by a kill leaves a broken last line.
                        warn!(
                            "During parsing in path {:?} found illegal json string {}:  {e}",
                            path, &v
                        )
                    }
                }
            }

            lines.into_inner().into_inner().unlock_async().await?;

            Ok(records)
        }

        match extract(path).await {
            Ok(s) => Ok(s),
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    Ok(vec![])
                } else {
                    Err(e)?
                }
            }
        }
    }
}

impl RecordStorage for RecordStorageImpl {
    type RecordFile = DayRecordFile<File>;

    async fn open_day(&self, date: NaiveDate) -> Result<Self::RecordFile> {
        let path = self.record_dir.join(date_to_record_name(date));

        let file = File::options()
            .append(true)
            .create(true)
            .read(true)
            .open(path)
            .await?;

        Ok(DayRecordFile::new(file, date))
    }

    async fn get_data_for(&self, date: NaiveDate) -> Result<Vec<StoredRecord>> {
        let path = self.record_dir.join(date_to_record_name(date));
        self.get_all_inner(&path).await
    }

    async fn stored_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut entries = tokio::fs::read_dir(&self.record_dir).await?;
        let mut dates = vec![];
        while let Some(entry) = entries.next_entry().await? {
            match entry.file_name().to_str().and_then(record_name_to_date) {
                Some(date) => dates.push(date),
                None => debug!("Skipping foreign file {:?}", entry.path()),
            }
        }
        Ok(dates)
    }
}

/// Append-only handle to the file of one day.
pub struct DayRecordFile<F> {
    file: F,
    date: NaiveDate,
}

impl<F: AsyncWrite + fs4::tokio::AsyncFileExt + Unpin> RecordFileHandle for DayRecordFile<F> {
    async fn append(&mut self, records: Vec<StoredRecord>) -> Result<()> {
        // Semi-safe acquire-release for a file
        self.file.lock_exclusive()?;
        let result = Self::append_with_file(&mut self.file, records).await;
        self.file.unlock_async().await?;
        result
    }

    fn get_date(&self) -> NaiveDate {
        self.date
    }

    async fn flush(&mut self) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }
}

impl<F: AsyncWrite + fs4::tokio::AsyncFileExt + Unpin> DayRecordFile<F> {
    fn new(file: F, date: NaiveDate) -> Self {
        Self { file, date }
    }

    async fn append_with_file(file: &mut F, records: Vec<StoredRecord>) -> Result<()> {
        // One write per batch, so a concurrent reader never sees half of a batch.
        let mut buffer = Vec::<u8>::new();
        for record in records {
            serde_json::to_writer(&mut buffer, &record)?;
            buffer.push(b'\n');
        }

        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::daemon::storage::{entities::StoredRecord, record_event::EventKind};

    use super::{store_record, RecordFileHandle, RecordStorage, RecordStorageImpl};

    fn record(window_title: &str, start_offset: i64) -> StoredRecord {
        let start = Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap();
        StoredRecord::new(
            "test pc".into(),
            window_title.into(),
            EventKind::WindowOpen,
            start + Duration::seconds(start_offset),
            None,
        )
    }

    #[tokio::test]
    async fn test_record_storage_basic() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;
        let date = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();
        let mut record_file = storage.open_day(date).await?;
        let records = [record("test", 0), record("test 2", 1)];

        record_file.append(vec![records[0].clone()]).await?;
        record_file.append(vec![records[1].clone()]).await?;
        record_file.flush().await?;

        let values = storage.get_data_for(date).await?;
        assert_eq!(values, records.to_vec());

        Ok(())
    }

    #[tokio::test]
    async fn test_record_storage_reopen_appends() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;

        store_record(&storage, record("first", 0)).await?;
        store_record(&storage, record("second", 5)).await?;

        let date = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();
        let values = storage.get_data_for(date).await?;
        assert_eq!(values.len(), 2);
        assert_eq!(&*values[1].window_title, "second");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_day_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;
        let values = storage
            .get_data_for(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())
            .await?;
        assert!(values.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_lines_are_skipped() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;
        store_record(&storage, record("kept", 0)).await?;

        let path = dir.path().join("2018-07-04.jsonl");
        let mut contents = std::fs::read_to_string(&path)?;
        contents.push_str("{\"id\": \"broken");
        std::fs::write(&path, contents)?;

        let values = storage
            .get_data_for(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap())
            .await?;
        assert_eq!(values.len(), 1);
        assert_eq!(&*values[0].window_title, "kept");
        Ok(())
    }

    #[tokio::test]
    async fn test_stored_dates_ignore_foreign_files() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;
        store_record(&storage, record("a", 0)).await?;
        store_record(&storage, record("b", 60 * 60 * 24)).await?;
        std::fs::write(dir.path().join("README"), "not a record file")?;

        let mut dates = storage.stored_dates().await?;
        dates.sort();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(),
                NaiveDate::from_ymd_opt(2018, 7, 5).unwrap()
            ]
        );
        Ok(())
    }
}
