//! The activity session tracker. Focus samples from [poller] and OS notifications from
//! [system_events] share one ordered queue, which [tracker] consumes on a single task.

pub mod poller;
pub mod session;
pub mod system_events;
pub mod tracker;
