use anyhow::Result;
use sink::RecordSink;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info};

use super::storage::record_event::ActivityRecord;

#[cfg(feature = "http")]
pub mod http;
pub mod local_save;
pub mod sink;

/// Drains the record queue into a [RecordSink], one record at a time and in emission order.
/// Failed saves are logged and dropped.
pub struct ProcessingModule<Sink> {
    receiver: UnboundedReceiver<ActivityRecord>,
    sink: Sink,
}

impl<S: RecordSink> ProcessingModule<S> {
    pub fn new(receiver: UnboundedReceiver<ActivityRecord>, sink: S) -> Self {
        Self { receiver, sink }
    }

    /// Runs until every sender is gone and the queue is empty, then finalizes the sink.
    pub async fn run(mut self) -> Result<()> {
        while let Some(record) = self.receiver.recv().await {
            debug!("Saving record {:?}", record);
            match self.sink.save(&record).await {
                Ok(_) => {
                    info!("Saved {} {}", record.kind(), record.subject())
                }
                Err(e) => {
                    error!("Dropping record {:?}: {e:?}", record)
                }
            }
        }

        self.receiver.close();
        self.sink.finalize().await
    }
}
