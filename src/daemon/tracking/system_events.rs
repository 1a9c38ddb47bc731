use anyhow::{anyhow, Result};
use futures::{stream, stream::BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{daemon::storage::record_event::EventKind, utils::clock::Clock};

use super::tracker::{SystemSample, TrackerInput};

/// Power and session transitions reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    SessionLock,
    SessionUnlock,
    SessionLogon,
    SessionLogoff,
    Suspend,
    Resume,
    /// Any other reason the OS reported, kept for logging.
    Unrecognized(String),
}

impl SystemEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SystemEvent::SessionLock => EventKind::Lock,
            SystemEvent::SessionUnlock => EventKind::Unlock,
            SystemEvent::SessionLogon => EventKind::Logon,
            SystemEvent::SessionLogoff => EventKind::Logoff,
            SystemEvent::Suspend => EventKind::Sleep,
            SystemEvent::Resume => EventKind::Resume,
            SystemEvent::Unrecognized(_) => EventKind::Unknown,
        }
    }
}

/// Something that pushes [SystemEvent]s as they happen.
pub trait SystemEventSource {
    fn subscribe(&mut self) -> Result<BoxStream<'static, SystemEvent>>;
}

/// Used where the platform has no event backend. The stream never yields.
pub struct NoSystemEvents;

impl SystemEventSource for NoSystemEvents {
    fn subscribe(&mut self) -> Result<BoxStream<'static, SystemEvent>> {
        Ok(stream::pending().boxed())
    }
}

/// The event source of the platform this was built for. Without a backend the daemon still
/// tracks focus, it just never sees lock or sleep transitions.
pub fn platform_event_source() -> Box<dyn SystemEventSource> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "win")] {
            Box::new(crate::window_api::win_events::WindowsSystemEvents::new())
        } else {
            Box::new(NoSystemEvents)
        }
    }
}

/// Source fed through a channel, for embedding the tracker in a host that receives OS
/// notifications itself.
pub struct ChannelEventSource {
    receiver: Option<mpsc::UnboundedReceiver<SystemEvent>>,
}

impl ChannelEventSource {
    pub fn channel() -> (mpsc::UnboundedSender<SystemEvent>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            sender,
            Self {
                receiver: Some(receiver),
            },
        )
    }
}

impl SystemEventSource for ChannelEventSource {
    fn subscribe(&mut self) -> Result<BoxStream<'static, SystemEvent>> {
        let receiver = self
            .receiver
            .take()
            .ok_or_else(|| anyhow!("Channel event source can only be subscribed once"))?;
        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }
}

/// Stamps system events as they arrive and queues them for the tracker, next to focus samples.
pub async fn forward_system_events(
    mut source: Box<dyn SystemEventSource>,
    next: mpsc::Sender<TrackerInput>,
    shutdown: CancellationToken,
    time_provider: Box<dyn Clock>,
) -> Result<()> {
    let mut events = source.subscribe()?;
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            event = events.next() => event,
        };
        let Some(event) = event else {
            info!("System event source finished");
            return Ok(());
        };
        if let SystemEvent::Unrecognized(reason) = &event {
            warn!("Unrecognized system event {reason}");
        }
        debug!("Forwarding system event {event:?}");
        let sample = SystemSample {
            event,
            observed_at: time_provider.time(),
        };
        if next.send(TrackerInput::System(sample)).await.is_err() {
            debug!("Tracker is gone, dropping system events");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::{forward_system_events, ChannelEventSource, SystemEvent, SystemEventSource};
    #[cfg(not(feature = "win"))]
    use super::platform_event_source;
    use crate::{
        daemon::{
            storage::record_event::EventKind,
            tracking::tracker::{SystemSample, TrackerInput},
        },
        utils::clock::ManualClock,
    };

    #[test]
    fn events_map_to_record_kinds() {
        let mapping = [
            (SystemEvent::SessionLock, EventKind::Lock),
            (SystemEvent::SessionUnlock, EventKind::Unlock),
            (SystemEvent::SessionLogon, EventKind::Logon),
            (SystemEvent::SessionLogoff, EventKind::Logoff),
            (SystemEvent::Suspend, EventKind::Sleep),
            (SystemEvent::Resume, EventKind::Resume),
            (
                SystemEvent::Unrecognized("RemoteConnect".into()),
                EventKind::Unknown,
            ),
        ];
        for (event, kind) in mapping {
            assert_eq!(event.kind(), kind);
        }
    }

    #[test]
    fn channel_source_subscribes_once() {
        let (_sender, mut source) = ChannelEventSource::channel();
        assert!(source.subscribe().is_ok());
        assert!(source.subscribe().is_err());
    }

    #[tokio::test]
    async fn forwarded_events_are_stamped_in_order() -> Result<()> {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let (event_sender, source) = ChannelEventSource::channel();
        event_sender.send(SystemEvent::Suspend)?;
        event_sender.send(SystemEvent::Resume)?;
        drop(event_sender);

        let (sender, mut receiver) = mpsc::channel(4);
        forward_system_events(
            Box::new(source),
            sender,
            CancellationToken::new(),
            Box::new(ManualClock::new(at)),
        )
        .await?;

        let mut forwarded = vec![];
        while let Some(input) = receiver.recv().await {
            forwarded.push(input);
        }
        assert_eq!(
            forwarded,
            vec![
                TrackerInput::System(SystemSample {
                    event: SystemEvent::Suspend,
                    observed_at: at
                }),
                TrackerInput::System(SystemSample {
                    event: SystemEvent::Resume,
                    observed_at: at
                }),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn forwarding_stops_on_shutdown() -> Result<()> {
        let (_event_sender, source) = ChannelEventSource::channel();
        let (sender, _receiver) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        forward_system_events(
            Box::new(source),
            sender,
            shutdown,
            Box::new(ManualClock::new(Utc::now())),
        )
        .await
    }

    #[cfg(not(feature = "win"))]
    #[tokio::test(start_paused = true)]
    async fn without_backend_no_events_arrive() -> Result<()> {
        use futures::StreamExt;

        let mut events = platform_event_source().subscribe()?;
        let next = tokio::time::timeout(std::time::Duration::from_secs(60), events.next()).await;
        assert!(next.is_err());
        Ok(())
    }
}
