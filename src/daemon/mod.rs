use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use args::{SinkTarget, TrackerOptions};
use processing::{local_save::LocalSink, sink::RecordSink, ProcessingModule};
use storage::record_storage::RecordStorageImpl;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracking::{
    poller::FocusPoller,
    system_events::{forward_system_events, platform_event_source, SystemEventSource},
    tracker::{SessionTracker, TrackerInput},
};

use crate::{
    utils::clock::{Clock, DefaultClock},
    window_api::{GenericWindowManager, WindowManager},
};

pub mod args;
pub mod processing;
pub mod shutdown;
pub mod storage;
pub mod tracking;

/// Focus samples and system events waiting for the tracker.
const INPUT_QUEUE_SIZE: usize = 32;

#[cfg(feature = "http")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the daemon needs to know before it starts tracking.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub record_dir: PathBuf,
    pub machine_id: Arc<str>,
    pub poll_interval: Duration,
    pub sink: SinkTarget,
    pub api_url: Option<String>,
}

impl DaemonConfig {
    pub fn new(app_dir: PathBuf, options: TrackerOptions) -> Self {
        Self {
            record_dir: app_dir.join("records"),
            machine_id: options.machine_id.into(),
            poll_interval: Duration::from_millis(options.poll_interval_ms),
            sink: options.sink,
            api_url: options.api_url,
        }
    }
}

/// Represents the starting point for the daemon. Fails before tracking anything when the
/// configured sink can't be set up.
pub async fn start_daemon(config: DaemonConfig) -> Result<()> {
    #[cfg(unix)]
    std::env::set_current_dir("/")?;

    let manager = GenericWindowManager::new()?;
    let shutdown_token = CancellationToken::new();

    info!(
        "Tracking {} every {:?} into {:?}",
        config.machine_id, config.poll_interval, config.sink
    );

    match config.sink {
        SinkTarget::Local => {
            let storage = RecordStorageImpl::new(config.record_dir.clone()).inspect_err(|e| {
                error!("Record store at {:?} is unusable {e:?}", config.record_dir)
            })?;
            run_until_shutdown(&config, manager, LocalSink::new(storage), shutdown_token).await
        }
        #[cfg(feature = "http")]
        SinkTarget::Http => {
            let url = config
                .api_url
                .as_deref()
                .ok_or_else(|| anyhow!("The http sink needs --api-url"))?;
            let sink = processing::http::HttpSink::new(url, HTTP_TIMEOUT)?;
            run_until_shutdown(&config, manager, sink, shutdown_token).await
        }
        #[cfg(not(feature = "http"))]
        SinkTarget::Http => Err(anyhow!(
            "This build has no http sink, rebuild with the `http` feature"
        )),
    }
}

async fn run_until_shutdown(
    config: &DaemonConfig,
    manager: impl WindowManager + 'static,
    sink: impl RecordSink,
    shutdown_token: CancellationToken,
) -> Result<()> {
    let (_, result) = tokio::join!(shutdown::detect_shutdown(shutdown_token.clone()), async {
        let result = run_pipeline(
            config.machine_id.clone(),
            config.poll_interval,
            manager,
            platform_event_source(),
            sink,
            shutdown_token.clone(),
            DefaultClock,
        )
        .await;
        shutdown_token.cancel();
        result
    });
    result
}

fn create_poller(
    sender: mpsc::Sender<TrackerInput>,
    manager: impl WindowManager + 'static,
    shutdown_token: &CancellationToken,
    poll_interval: Duration,
    clock: impl Clock,
) -> FocusPoller {
    FocusPoller::new(
        sender,
        Box::new(manager),
        shutdown_token.clone(),
        poll_interval,
        Box::new(clock),
    )
}

fn create_tracker(
    machine_id: Arc<str>,
    receiver: mpsc::Receiver<TrackerInput>,
    sender: mpsc::UnboundedSender<storage::record_event::ActivityRecord>,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> SessionTracker {
    SessionTracker::new(
        machine_id,
        receiver,
        sender,
        shutdown_token.clone(),
        Box::new(clock),
    )
}

/// Wires poller, system events, tracker and processor together and runs them until
/// `shutdown_token` is cancelled. Returns once the last record reached the sink.
pub async fn run_pipeline<S: RecordSink>(
    machine_id: Arc<str>,
    poll_interval: Duration,
    manager: impl WindowManager + 'static,
    events: Box<dyn SystemEventSource>,
    sink: S,
    shutdown_token: CancellationToken,
    clock: impl Clock + Clone,
) -> Result<()> {
    let (input_sender, input_receiver) = mpsc::channel::<TrackerInput>(INPUT_QUEUE_SIZE);
    let (record_sender, record_receiver) = mpsc::unbounded_channel();

    let mut tracker = create_tracker(
        machine_id,
        input_receiver,
        record_sender,
        &shutdown_token,
        clock.clone(),
    );
    // Stamped before any task runs, so no focus sample can predate it.
    tracker.announce_startup();

    let poller = create_poller(
        input_sender.clone(),
        manager,
        &shutdown_token,
        poll_interval,
        clock.clone(),
    );
    let processor = ProcessingModule::new(record_receiver, sink);

    let (polling_result, forwarding_result, tracking_result, processing_result) = tokio::join!(
        poller.run(),
        forward_system_events(events, input_sender, shutdown_token.clone(), Box::new(clock)),
        tracker.run(),
        processor.run(),
    );

    if let Err(e) = polling_result {
        error!("Focus poller got an error {:?}", e);
    }

    if let Err(e) = forwarding_result {
        error!("System event forwarding got an error {:?}", e);
    }

    if let Err(e) = tracking_result {
        error!("Session tracker got an error {:?}", e);
    }

    processing_result.inspect_err(|e| error!("Processing module got an error {:?}", e))
}
