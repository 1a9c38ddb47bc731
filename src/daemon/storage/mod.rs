//!  Storage is organized through [record_storage::RecordStorageImpl].
//!  The basic idea is:
//!   - There is a directory with all the records.
//!   - Records are stored as json lines in day files, keyed by the UTC date of `start_time`.
//!   - Reads go through [query], which prunes whole days before touching rows.

pub mod entities;
pub mod query;
pub mod record_event;
pub mod record_storage;
