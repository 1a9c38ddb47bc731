use std::path::PathBuf;

use clap::{Args, Parser, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::utils::host::default_machine_id;

/// Where the daemon delivers the records it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SinkTarget {
    /// Day files inside the application directory.
    #[default]
    Local,
    /// The ingress endpoint of a record service, see `--api-url`.
    Http,
}

/// Options of the tracking pipeline, shared by the daemon binary and `flowrecord init`.
#[derive(Args, Debug, Clone)]
pub struct TrackerOptions {
    /// Milliseconds between two samples of the focused window.
    #[arg(long = "poll-interval-ms", default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: u64,
    /// Name stored as `pc_name` on every record. Defaults to the host name.
    #[arg(long = "machine-id", default_value_t = default_machine_id())]
    pub machine_id: String,
    #[arg(long, value_enum, default_value_t = SinkTarget::Local)]
    pub sink: SinkTarget,
    /// Records endpoint used by the http sink, e.g. http://localhost:3000/api/records
    #[arg(long = "api-url", env = "FLOWRECORD_API_URL")]
    pub api_url: Option<String>,
}

impl TrackerOptions {
    /// Renders the options back into command line arguments, for spawning a daemon.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--poll-interval-ms".to_string(),
            self.poll_interval_ms.to_string(),
            "--machine-id".to_string(),
            self.machine_id.clone(),
            "--sink".to_string(),
            match self.sink {
                SinkTarget::Local => "local",
                SinkTarget::Http => "http",
            }
            .to_string(),
        ];
        if let Some(api_url) = &self.api_url {
            args.push("--api-url".to_string());
            args.push(api_url.clone());
        }
        args
    }
}

#[derive(Parser, Debug)]
pub struct DaemonArgs {
    /// Run in the foreground instead of detaching.
    #[arg(long)]
    pub force: bool,
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
    #[command(flatten)]
    pub tracker: TrackerOptions,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{DaemonArgs, SinkTarget};

    #[test]
    fn defaults() {
        let args = DaemonArgs::parse_from(["flowrecord-daemon"]);
        assert!(!args.force);
        assert_eq!(args.tracker.poll_interval_ms, 1000);
        assert_eq!(args.tracker.sink, SinkTarget::Local);
        assert!(!args.tracker.machine_id.is_empty());
    }

    #[test]
    fn tracker_options_survive_a_respawn() {
        let args = DaemonArgs::parse_from([
            "flowrecord-daemon",
            "--machine-id",
            "desk-1",
            "--poll-interval-ms",
            "250",
            "--sink",
            "http",
            "--api-url",
            "http://localhost:3000/api/records",
        ]);
        let respawned = DaemonArgs::parse_from(
            std::iter::once("flowrecord-daemon".to_string()).chain(args.tracker.to_args()),
        );
        assert_eq!(respawned.tracker.machine_id, "desk-1");
        assert_eq!(respawned.tracker.poll_interval_ms, 250);
        assert_eq!(respawned.tracker.sink, SinkTarget::Http);
        assert_eq!(
            respawned.tracker.api_url.as_deref(),
            Some("http://localhost:3000/api/records")
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(DaemonArgs::try_parse_from(["flowrecord-daemon", "--poll-interval-ms", "0"]).is_err());
    }
}
