//! Records which window holds focus on a workstation, together with lock, sleep and similar
//! session transitions, as timestamped activity records. A daemon does the tracking, the cli
//! and the [api] handlers read the stored records back.

pub mod api;
pub mod cli;
pub mod daemon;
pub mod utils;
pub mod window_api;
