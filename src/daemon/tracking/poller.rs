use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::{utils::clock::Clock, window_api::WindowManager};

use super::tracker::{FocusSample, TrackerInput};

/// Samples the focused window at a fixed cadence and queues the result for the tracker.
pub struct FocusPoller {
    next: mpsc::Sender<TrackerInput>,
    producer: Box<dyn WindowManager>,
    shutdown: CancellationToken,
    poll_interval: Duration,
    time_provider: Box<dyn Clock>,
}

impl FocusPoller {
    pub fn new(
        next: mpsc::Sender<TrackerInput>,
        producer: Box<dyn WindowManager>,
        shutdown: CancellationToken,
        poll_interval: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            producer,
            shutdown,
            poll_interval,
            time_provider,
        }
    }

    fn sample(&mut self) -> Result<FocusSample> {
        let window_data = self.producer.get_active_window_data()?;
        Ok(FocusSample {
            identity: window_data.identity().into(),
            observed_at: self.time_provider.time(),
        })
    }

    /// Executes the polling loop until shutdown or until the tracker stops listening.
    pub async fn run(mut self) -> Result<()> {
        let mut poll_point = self.time_provider.instant();
        loop {
            poll_point += self.poll_interval;

            match self.sample() {
                Ok(sample) => {
                    let span = info_span!("Queueing focus sample");
                    debug!("Sampled {:?}", sample);
                    if self
                        .next
                        .send(TrackerInput::Focus(sample))
                        .instrument(span)
                        .await
                        .is_err()
                    {
                        debug!("Tracker is gone, stopping poller");
                        return Ok(());
                    }
                }
                // A failed read is the same as nothing being focused: skip this tick.
                Err(e) => {
                    warn!("Failed to read the focused window {:?}", e)
                }
            }

            // After a suspend the deadline is far behind, poll once right away instead of
            // replaying every missed tick.
            let now = self.time_provider.instant();
            if poll_point < now {
                debug!("Missed poll deadline by {:?}", now - poll_point);
                poll_point = now;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(poll_point) => ()
            }
        }
    }
}
