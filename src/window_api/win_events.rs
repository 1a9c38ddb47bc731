use std::{cell::RefCell, thread};

use anyhow::{anyhow, Result};
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use windows::{
    core::{w, PCWSTR},
    Win32::{
        Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM},
        System::{
            LibraryLoader::GetModuleHandleW,
            RemoteDesktop::{
                WTSRegisterSessionNotification, WTSUnRegisterSessionNotification,
                NOTIFY_FOR_THIS_SESSION,
            },
        },
        UI::WindowsAndMessaging::{
            CreateWindowExW, DefWindowProcW, DispatchMessageW, GetMessageW, PostQuitMessage,
            RegisterClassW, TranslateMessage, HMENU, MSG, PBT_APMPOWERSTATUSCHANGE,
            PBT_APMRESUMEAUTOMATIC, PBT_APMSUSPEND, WINDOW_EX_STYLE, WINDOW_STYLE, WM_POWERBROADCAST,
            WM_WTSSESSION_CHANGE, WNDCLASSW, WTS_SESSION_LOCK, WTS_SESSION_LOGOFF,
            WTS_SESSION_LOGON, WTS_SESSION_UNLOCK,
        },
    },
};

use crate::daemon::tracking::system_events::{ChannelEventSource, SystemEvent, SystemEventSource};

use super::win::last_error_message;

thread_local! {
    /// Where the window procedure of the listener thread delivers events.
    static EVENTS: RefCell<Option<mpsc::UnboundedSender<SystemEvent>>> = const { RefCell::new(None) };
}

pub(crate) fn session_event(code: u32) -> SystemEvent {
    match code {
        WTS_SESSION_LOCK => SystemEvent::SessionLock,
        WTS_SESSION_UNLOCK => SystemEvent::SessionUnlock,
        WTS_SESSION_LOGON => SystemEvent::SessionLogon,
        WTS_SESSION_LOGOFF => SystemEvent::SessionLogoff,
        other => SystemEvent::Unrecognized(format!("session change {other}")),
    }
}

/// `None` for broadcasts that aren't tracked. `PBT_APMRESUMESUSPEND` follows the automatic
/// resume when a user is present, so only the automatic one counts.
pub(crate) fn power_event(code: u32) -> Option<SystemEvent> {
    match code {
        PBT_APMSUSPEND => Some(SystemEvent::Suspend),
        PBT_APMRESUMEAUTOMATIC => Some(SystemEvent::Resume),
        PBT_APMPOWERSTATUSCHANGE => Some(SystemEvent::Unrecognized("power status change".into())),
        _ => None,
    }
}

fn deliver(event: SystemEvent) {
    EVENTS.with(|events| {
        let delivered = events
            .borrow()
            .as_ref()
            .is_some_and(|sender| sender.send(event).is_ok());
        if !delivered {
            debug!("Nobody listens for system events anymore, stopping listener");
            unsafe { PostQuitMessage(0) };
        }
    });
}

unsafe extern "system" fn window_proc(
    window: HWND,
    message: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    let code = u32::try_from(wparam.0).unwrap_or(u32::MAX);
    match message {
        WM_WTSSESSION_CHANGE => deliver(session_event(code)),
        WM_POWERBROADCAST => {
            if let Some(event) = power_event(code) {
                deliver(event)
            }
        }
        _ => (),
    }
    unsafe { DefWindowProcW(window, message, wparam, lparam) }
}

/// A hidden top-level window. Message-only windows don't get power broadcasts.
unsafe fn create_listener_window() -> Result<HWND> {
    unsafe {
        let instance: HINSTANCE = GetModuleHandleW(PCWSTR::null())?.into();
        let class_name = w!("FlowRecordSystemEvents");
        let class = WNDCLASSW {
            lpfnWndProc: Some(window_proc),
            hInstance: instance,
            lpszClassName: class_name,
            ..Default::default()
        };
        if RegisterClassW(&class) == 0 {
            return Err(anyhow!(
                "Failed to register listener class {}",
                last_error_message()
            ));
        }
        let window = CreateWindowExW(
            WINDOW_EX_STYLE::default(),
            class_name,
            w!("FlowRecord"),
            WINDOW_STYLE::default(),
            0,
            0,
            0,
            0,
            HWND::default(),
            HMENU::default(),
            instance,
            None,
        )?;
        WTSRegisterSessionNotification(window, NOTIFY_FOR_THIS_SESSION)?;
        Ok(window)
    }
}

fn run_listener(sender: mpsc::UnboundedSender<SystemEvent>, ready: std::sync::mpsc::Sender<Result<()>>) {
    EVENTS.with(|events| *events.borrow_mut() = Some(sender));
    let window = match unsafe { create_listener_window() } {
        Ok(window) => {
            let _ = ready.send(Ok(()));
            window
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let mut message = MSG::default();
    while unsafe { GetMessageW(&mut message, HWND::default(), 0, 0) }.as_bool() {
        unsafe {
            let _ = TranslateMessage(&message);
            DispatchMessageW(&message);
        }
    }

    if let Err(e) = unsafe { WTSUnRegisterSessionNotification(window) } {
        warn!("Failed to unregister session notifications {e:?}");
    }
}

/// Session switches and power transitions of the interactive Windows session. The window
/// messages are received on a dedicated thread and handed over through a channel.
pub struct WindowsSystemEvents {
    sender: Option<mpsc::UnboundedSender<SystemEvent>>,
    source: ChannelEventSource,
}

impl WindowsSystemEvents {
    pub fn new() -> Self {
        let (sender, source) = ChannelEventSource::channel();
        Self {
            sender: Some(sender),
            source,
        }
    }
}

impl Default for WindowsSystemEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemEventSource for WindowsSystemEvents {
    fn subscribe(&mut self) -> Result<BoxStream<'static, SystemEvent>> {
        let sender = self
            .sender
            .take()
            .ok_or_else(|| anyhow!("Windows system events can only be subscribed once"))?;
        let (ready_sender, ready) = std::sync::mpsc::channel();
        thread::Builder::new()
            .name("system-events".into())
            .spawn(move || run_listener(sender, ready_sender))?;
        ready
            .recv()
            .map_err(|_| anyhow!("System event listener exited before starting"))?
            .inspect_err(|e| error!("Can't listen for system events {e:?}"))?;
        self.source.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use windows::Win32::UI::WindowsAndMessaging::{
        PBT_APMRESUMEAUTOMATIC, PBT_APMRESUMESUSPEND, PBT_APMSUSPEND, WTS_SESSION_LOCK,
        WTS_SESSION_LOGOFF, WTS_SESSION_REMOTE_CONTROL, WTS_SESSION_UNLOCK,
    };

    use super::{power_event, session_event};
    use crate::daemon::tracking::system_events::SystemEvent;

    #[test]
    fn session_codes_map_to_events() {
        assert_eq!(session_event(WTS_SESSION_LOCK), SystemEvent::SessionLock);
        assert_eq!(session_event(WTS_SESSION_UNLOCK), SystemEvent::SessionUnlock);
        assert_eq!(session_event(WTS_SESSION_LOGOFF), SystemEvent::SessionLogoff);
        assert!(matches!(
            session_event(WTS_SESSION_REMOTE_CONTROL),
            SystemEvent::Unrecognized(_)
        ));
    }

    #[test]
    fn only_automatic_resume_counts() {
        assert_eq!(power_event(PBT_APMSUSPEND), Some(SystemEvent::Suspend));
        assert_eq!(power_event(PBT_APMRESUMEAUTOMATIC), Some(SystemEvent::Resume));
        assert_eq!(power_event(PBT_APMRESUMESUSPEND), None);
    }
}
