use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    daemon::storage::record_event::{ActivityRecord, EventKind},
    utils::clock::Clock,
};

use super::{
    session::{SessionState, Transition},
    system_events::SystemEvent,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusSample {
    /// `"<process> - <title>"`, or empty when nothing is focused.
    pub identity: Arc<str>,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemSample {
    pub event: SystemEvent,
    pub observed_at: DateTime<Utc>,
}

/// Everything the tracker reacts to, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerInput {
    Focus(FocusSample),
    System(SystemSample),
}

/// Owns the [SessionState] and turns the input queue into [ActivityRecord]s.
///
/// All inputs are consumed by this one task, so a close/open pair is always emitted together
/// and system events can't observe a half-switched session. Records go to an unbounded queue,
/// a slow sink never delays the next input.
pub struct SessionTracker {
    machine_id: Arc<str>,
    inputs: mpsc::Receiver<TrackerInput>,
    next: mpsc::UnboundedSender<ActivityRecord>,
    shutdown: CancellationToken,
    time_provider: Box<dyn Clock>,
    state: SessionState,
    started: bool,
}

impl SessionTracker {
    pub fn new(
        machine_id: Arc<str>,
        inputs: mpsc::Receiver<TrackerInput>,
        next: mpsc::UnboundedSender<ActivityRecord>,
        shutdown: CancellationToken,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            machine_id,
            inputs,
            next,
            shutdown,
            time_provider,
            state: SessionState::default(),
            started: false,
        }
    }

    fn emit(&self, record: ActivityRecord) {
        debug!("Emitting {:?}", record);
        if let Err(e) = self.next.send(record) {
            error!("Record queue is closed, dropping {:?}", e.0);
        }
    }

    fn apply(&mut self, input: TrackerInput) {
        match input {
            TrackerInput::Focus(FocusSample {
                identity,
                observed_at,
            }) => {
                let Transition::Switched { closed, opened } =
                    self.state.observe(&identity, observed_at)
                else {
                    return;
                };
                if let Some(closed) = closed {
                    self.emit(ActivityRecord::window_close(
                        self.machine_id.clone(),
                        closed.subject,
                        closed.start,
                        observed_at,
                    ));
                }
                info!("Focus moved to {}", opened.subject);
                self.emit(ActivityRecord::window_open(
                    self.machine_id.clone(),
                    opened.subject,
                    opened.start,
                ));
            }
            TrackerInput::System(SystemSample { event, observed_at }) => {
                info!("System event {:?}", event);
                self.emit(ActivityRecord::system(
                    self.machine_id.clone(),
                    event.kind(),
                    observed_at,
                ));
            }
        }
    }

    /// Emits the startup record, once. Called before the poller starts so that no focus sample
    /// can be stamped earlier than the startup.
    pub fn announce_startup(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.emit(ActivityRecord::system(
            self.machine_id.clone(),
            EventKind::Startup,
            self.time_provider.time(),
        ));
    }

    /// Emits the startup record unless already announced, then consumes inputs until shutdown.
    /// Inputs that were already queued are still applied before the final close of the open
    /// session.
    pub async fn run(mut self) -> Result<()> {
        self.announce_startup();

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                input = self.inputs.recv() => match input {
                    Some(input) => self.apply(input),
                    None => break,
                }
            }
        }

        self.inputs.close();
        while let Ok(input) = self.inputs.try_recv() {
            self.apply(input);
        }

        if let Some(session) = self.state.finish() {
            info!("Closing {} on shutdown", session.subject);
            self.emit(ActivityRecord::window_close(
                self.machine_id.clone(),
                session.subject,
                session.start,
                self.time_provider.time(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::{
            storage::record_event::{ActivityRecord, EventKind},
            tracking::system_events::SystemEvent,
        },
        utils::clock::ManualClock,
    };

    use super::{FocusSample, SessionTracker, SystemSample, TrackerInput};

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn focus(identity: &str, at: i64) -> TrackerInput {
        TrackerInput::Focus(FocusSample {
            identity: identity.into(),
            observed_at: t(at),
        })
    }

    fn system(event: SystemEvent, at: i64) -> TrackerInput {
        TrackerInput::System(SystemSample {
            event,
            observed_at: t(at),
        })
    }

    /// Queues all inputs, stops the tracker at `stop_at` and collects everything it emitted.
    async fn track(inputs: Vec<TrackerInput>, stop_at: i64) -> Result<Vec<ActivityRecord>> {
        let (input_sender, input_receiver) = mpsc::channel(inputs.len().max(1));
        let (record_sender, mut record_receiver) = mpsc::unbounded_channel();
        let clock = ManualClock::new(t(0));
        let shutdown = CancellationToken::new();
        let tracker = SessionTracker::new(
            "pc".into(),
            input_receiver,
            record_sender,
            shutdown.clone(),
            Box::new(clock.clone()),
        );

        let (tracking_result, sending_result) = tokio::join!(tracker.run(), async {
            for input in inputs {
                input_sender.send(input).await?;
            }
            clock.set(t(stop_at));
            shutdown.cancel();
            anyhow::Ok(())
        });
        tracking_result?;
        sending_result?;

        let mut records = vec![];
        while let Some(record) = record_receiver.recv().await {
            records.push(record);
        }
        Ok(records)
    }

    fn summary(records: &[ActivityRecord]) -> Vec<(EventKind, String, i64, Option<i64>)> {
        records
            .iter()
            .map(|r| {
                (
                    r.kind(),
                    r.subject().to_string(),
                    (r.start_time() - t(0)).num_seconds(),
                    r.duration_seconds(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn focus_changes_produce_close_open_pairs() -> Result<()> {
        let inputs = ["", "A", "A", "B", ""]
            .into_iter()
            .enumerate()
            .map(|(i, identity)| focus(identity, i as i64))
            .collect();
        let records = track(inputs, 10).await?;

        assert_eq!(
            summary(&records),
            vec![
                (EventKind::Startup, "system".into(), 0, None),
                (EventKind::WindowOpen, "A".into(), 1, None),
                (EventKind::WindowClose, "A".into(), 1, Some(2)),
                (EventKind::WindowOpen, "B".into(), 3, None),
                // B was still open, closed on shutdown.
                (EventKind::WindowClose, "B".into(), 3, Some(7)),
            ]
        );
        assert_eq!(records[2].end_time(), Some(t(3)));
        assert!(records.iter().all(|r| &**r.machine_id() == "pc"));
        Ok(())
    }

    #[tokio::test]
    async fn suspend_and_resume_emit_only_system_records() -> Result<()> {
        let records = track(
            vec![system(SystemEvent::Suspend, 5), system(SystemEvent::Resume, 50)],
            60,
        )
        .await?;

        assert_eq!(
            summary(&records),
            vec![
                (EventKind::Startup, "system".into(), 0, None),
                (EventKind::Sleep, "system".into(), 5, None),
                (EventKind::Resume, "system".into(), 50, None),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn system_events_leave_the_session_alone() -> Result<()> {
        let records = track(
            vec![
                focus("A", 1),
                system(SystemEvent::SessionLock, 2),
                system(SystemEvent::Unrecognized("console connect".into()), 3),
                system(SystemEvent::SessionUnlock, 4),
                focus("A", 5),
            ],
            9,
        )
        .await?;

        assert_eq!(
            summary(&records),
            vec![
                (EventKind::Startup, "system".into(), 0, None),
                (EventKind::WindowOpen, "A".into(), 1, None),
                (EventKind::Lock, "system".into(), 2, None),
                (EventKind::Unknown, "system".into(), 3, None),
                (EventKind::Unlock, "system".into(), 4, None),
                (EventKind::WindowClose, "A".into(), 1, Some(8)),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_without_focus_emits_no_close() -> Result<()> {
        let records = track(vec![focus("", 1), focus(" ", 2)], 3).await?;
        assert_eq!(
            summary(&records),
            vec![(EventKind::Startup, "system".into(), 0, None)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_close_clamps_clock_regression() -> Result<()> {
        // The wall clock was set back below the session start before stopping.
        let records = track(vec![focus("A", 30)], 10).await?;
        let close = records.last().unwrap();
        assert_eq!(close.kind(), EventKind::WindowClose);
        assert_eq!(close.duration_seconds(), Some(0));
        Ok(())
    }

    #[tokio::test]
    async fn startup_is_announced_once() -> Result<()> {
        let (input_sender, input_receiver) = mpsc::channel(4);
        let (record_sender, mut record_receiver) = mpsc::unbounded_channel();
        let clock = ManualClock::new(t(0));
        let mut tracker = SessionTracker::new(
            "pc".into(),
            input_receiver,
            record_sender,
            CancellationToken::new(),
            Box::new(clock.clone()),
        );
        tracker.announce_startup();
        clock.set(t(5));
        input_sender.send(focus("A", 6)).await?;
        drop(input_sender);
        tracker.run().await?;

        let mut records = vec![];
        while let Some(record) = record_receiver.recv().await {
            records.push(record);
        }
        let startups = records
            .iter()
            .filter(|r| r.kind() == EventKind::Startup)
            .collect::<Vec<_>>();
        assert_eq!(startups.len(), 1);
        assert_eq!(startups[0].start_time(), t(0));
        assert_eq!(records[0].kind(), EventKind::Startup);
        Ok(())
    }

    #[tokio::test]
    async fn tracker_survives_a_closed_record_queue() -> Result<()> {
        let (input_sender, input_receiver) = mpsc::channel(4);
        let (record_sender, record_receiver) = mpsc::unbounded_channel();
        drop(record_receiver);
        let tracker = SessionTracker::new(
            "pc".into(),
            input_receiver,
            record_sender,
            CancellationToken::new(),
            Box::new(ManualClock::new(t(0))),
        );
        input_sender.send(focus("A", 1)).await?;
        input_sender.send(focus("B", 2)).await?;
        drop(input_sender);
        tracker.run().await
    }
}
