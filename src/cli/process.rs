use std::{
    env,
    path::Path,
    process::Stdio,
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use sysinfo::{get_current_pid, Pid, ProcessesToUpdate, Signal, System};
use tracing::{info, warn};

use crate::daemon::args::TrackerOptions;

use super::daemon_path::to_daemon_path;

/// How long a daemon gets to flush its queue after SIGTERM.
const STOP_TIMEOUT: Duration = Duration::from_secs(15);
const STOP_POLL: Duration = Duration::from_millis(100);

/// Polls until `pid` is gone. Returns false when it is still running after `timeout`.
fn wait_for_exit(system: &mut System, pid: Pid, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        if system.process(pid).is_none() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(STOP_POLL);
    }
}

/// Asks every running daemon to stop and waits a bounded time for it. SIGTERM lets the daemon
/// close the open session before exiting. On Windows there is no SIGTERM, the daemon is killed
/// outright and its open session stays unclosed.
pub fn kill_previous_servers() -> Result<usize> {
    let daemon = to_daemon_path(env::current_exe()?);
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't resolve own pid {e}"))?;

    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let daemons = system
        .processes()
        .iter()
        .filter(|(pid, process)| {
            **pid != current_id && process.exe().is_some_and(|exe| same_binary(exe, &daemon))
        })
        .map(|(pid, _)| *pid)
        .collect::<Vec<_>>();

    let mut stopped = 0;
    for pid in daemons {
        let Some(process) = system.process(pid) else {
            continue;
        };
        info!("Stopping daemon {pid}");
        // This will forcefully terminate the process on Windows. Anything better will require a
        // lot more work.
        if process.kill_with(Signal::Term).is_none() {
            process.kill();
        }
        if wait_for_exit(&mut system, pid, STOP_TIMEOUT) {
            stopped += 1;
        } else {
            warn!("Daemon {pid} is still running after {STOP_TIMEOUT:?}");
            println!("Daemon {pid} didn't stop in time, it may still be flushing records");
        }
    }
    println!("Stopped {stopped} daemon(s)");
    Ok(stopped)
}

fn same_binary(exe: &Path, daemon: &Path) -> bool {
    exe.exists() && exe == daemon
}

/// Shuts down previous daemons and starts a new one detached from this terminal.
pub fn restart_server(app_dir: &Path, tracker: &TrackerOptions) -> Result<()> {
    kill_previous_servers()?;

    let daemon = to_daemon_path(env::current_exe()?);
    if !daemon.exists() {
        return Err(anyhow!("Daemon binary is missing at {daemon:?}"));
    }
    let mut command = std::process::Command::new(daemon);
    command.arg("--force").arg("--dir").arg(app_dir);
    command.args(tracker.to_args());

    #[cfg(feature = "win")]
    {
        use std::os::windows::process::CommandExt;
        use windows::Win32::System::Threading::DETACHED_PROCESS;
        command.creation_flags(DETACHED_PROCESS.0);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());
    command.stderr(Stdio::null());

    println!("Spawning");
    #[allow(clippy::zombie_processes)]
    let child = command.spawn()?;
    info!("Spawned daemon {}", child.id());
    println!("Success");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sysinfo::{get_current_pid, Pid, System};

    use super::wait_for_exit;

    #[test]
    fn waiting_is_bounded_for_a_live_process() {
        let mut system = System::new();
        let current = get_current_pid().unwrap();
        assert!(!wait_for_exit(&mut system, current, Duration::from_millis(250)));
    }

    #[test]
    fn waiting_ends_once_the_process_is_gone() {
        let mut system = System::new();
        let mut child = std::process::Command::new(std::env::current_exe().unwrap())
            .arg("--help")
            .stdout(std::process::Stdio::null())
            .spawn()
            .unwrap();
        let pid = Pid::from_u32(child.id());
        child.wait().unwrap();
        assert!(wait_for_exit(&mut system, pid, Duration::from_secs(5)));
    }
}
