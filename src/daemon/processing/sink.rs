use std::future::Future;

use anyhow::Result;

use crate::daemon::storage::record_event::ActivityRecord;

/// Where finished records end up. This should realistically be able to abstract over different
/// options: local storage, remote server saving.
///
/// A failed save is final for that record, callers don't retry.
pub trait RecordSink {
    fn save(&mut self, record: &ActivityRecord) -> impl Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl Future<Output = Result<()>>;
}
