use std::env;

use sysinfo::System;

const UNKNOWN_MACHINE: &str = "unknown";

/// Stable identifier of the observed host. Prefers the OS host name and falls back to the
/// usual environment variables.
pub fn default_machine_id() -> String {
    System::host_name()
        .or_else(|| env::var("COMPUTERNAME").ok())
        .or_else(|| env::var("HOSTNAME").ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| UNKNOWN_MACHINE.to_string())
}
