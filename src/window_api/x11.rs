use anyhow::{anyhow, Result};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tracing::instrument;
use xcb::{
    x::{self, Atom, GetProperty, GrabServer, InternAtom, UngrabServer, Window, ATOM_ANY},
    Connection, Xid,
};

use super::{ActiveWindowData, WindowManager};

fn intern_atom(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_pid(conn: &Connection, window: Window, pid_atom: Atom) -> Result<Option<u32>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: pid_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<u32>().first().copied())
}

/// The focused window can be None (0) while switching workspaces or with nothing focused.
fn get_active_window(conn: &Connection, root: Window, active_window_atom: Atom) -> Result<Option<Window>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result
        .value::<Window>()
        .first()
        .copied()
        .filter(|window| !window.is_none()))
}

fn get_name(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<String> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    Ok(String::from_utf8_lossy(wm_name.value()).to_string())
}

pub struct LinuxWindowManager {
    connection: Connection,
    preferred_screen: usize,
    active_window_atom: Atom,
    window_name_atom: Atom,
    pid_atom: Atom,
    system: System,
}

impl LinuxWindowManager {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = intern_atom(&connection, b"_NET_ACTIVE_WINDOW")?;
        let window_name_atom = intern_atom(&connection, b"_NET_WM_NAME")?;
        let pid_atom = intern_atom(&connection, b"_NET_WM_PID")?;
        Ok(Self {
            connection,
            preferred_screen: usize::try_from(preferred_screen).unwrap_or_default(),
            active_window_atom,
            window_name_atom,
            pid_atom,
            system: System::new_with_specifics(RefreshKind::nothing()),
        })
    }

    fn process_path(&mut self, pid: u32) -> Option<String> {
        let pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_exe(sysinfo::UpdateKind::OnlyIfNotSet),
        );
        self.system
            .process(pid)
            .and_then(|process| process.exe())
            .and_then(|v| v.to_str())
            .map(|v| v.to_string())
    }

    #[instrument(skip(self))]
    fn get_active_inner(&mut self) -> Result<ActiveWindowData> {
        // Currently the application only supports 1 x11 screen.
        let root = self
            .connection
            .get_setup()
            .roots()
            .nth(self.preferred_screen)
            .ok_or_else(|| anyhow!("Screen {} is not available", self.preferred_screen))?
            .root();

        let Some(active_window) =
            get_active_window(&self.connection, root, self.active_window_atom)?
        else {
            return Ok(ActiveWindowData {
                window_title: "".into(),
                process_name: "".into(),
            });
        };
        let window_title = get_name(&self.connection, active_window, self.window_name_atom)?;
        let process_name = get_pid(&self.connection, active_window, self.pid_atom)?
            .and_then(|pid| self.process_path(pid))
            .unwrap_or_default();
        Ok(ActiveWindowData {
            window_title: window_title.into(),
            process_name: process_name.into(),
        })
    }
}

impl WindowManager for LinuxWindowManager {
    #[instrument(skip(self))]
    fn get_active_window_data(&mut self) -> Result<ActiveWindowData> {
        let _ = self.connection.send_request(&GrabServer {});
        let result = self.get_active_inner();
        let _ = self.connection.send_request(&UngrabServer {});
        result
    }
}
