use anyhow::{anyhow, Result};
use tracing::{error, warn};
use windows::{
    core::PWSTR,
    Win32::{
        Foundation::{CloseHandle, GetLastError, BOOL, HANDLE, HWND},
        System::{
            Diagnostics::Debug::{
                FormatMessageW, FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS,
            },
            SystemServices::{LANG_ENGLISH, SUBLANG_ENGLISH_US},
            Threading::{
                OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
                PROCESS_QUERY_LIMITED_INFORMATION,
            },
        },
        UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId},
    },
};

use super::{ActiveWindowData, WindowManager};

pub(crate) fn last_error_message() -> String {
    let err = unsafe { GetLastError() };
    let mut message_buffer = [0u16; 2048];
    let size = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            None,
            err.0,
            LANG_ENGLISH | (SUBLANG_ENGLISH_US << 10),
            PWSTR::from_raw(message_buffer.as_mut_ptr()),
            2048,
            None,
        )
    };
    let size = usize::try_from(size).unwrap_or_default().min(message_buffer.len());
    String::from_utf16_lossy(&message_buffer[..size])
}

#[tracing::instrument]
pub fn get_active() -> Result<ActiveWindowData> {
    let window = unsafe { GetForegroundWindow() };

    // Nothing is focused, for example while the desktop is locked.
    if window.is_invalid() {
        return Ok(ActiveWindowData {
            window_title: "".into(),
            process_name: "".into(),
        });
    }

    let mut text: [u16; 4096] = [0; 4096];
    let title = unsafe { get_window_title(window, &mut text) };

    let mut id = 0u32;
    unsafe { GetWindowThreadProcessId(window, Some(&mut id)) };
    if id == 0 {
        return Err(anyhow!("Failed to get active window {}", last_error_message()));
    }

    // A process we can't open still leaves a usable title.
    let process_name = match unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, BOOL::from(false), id) } {
        Ok(process_handle) => {
            let path = unsafe { get_window_process_path(process_handle, &mut text) }
                .inspect_err(|e| warn!("Failed to get window process path {e:?}"))
                .unwrap_or_default();
            unsafe { CloseHandle(process_handle) }
                .inspect_err(|e| error!("Failed to close handle {e:?}"))?;
            path
        }
        Err(e) => {
            warn!("Failed to open process {id} {e:?}");
            String::new()
        }
    };

    Ok(ActiveWindowData {
        process_name: process_name.into(),
        window_title: title.into(),
    })
}

unsafe fn get_window_process_path(process_handle: HANDLE, text: &mut [u16]) -> Result<String> {
    unsafe {
        let mut length = u32::try_from(text.len())?;
        QueryFullProcessImageNameW(
            process_handle,
            PROCESS_NAME_WIN32,
            PWSTR(text.as_mut_ptr()),
            &mut length,
        )?;
        let length = usize::try_from(length)?.min(text.len());
        Ok(String::from_utf16_lossy(&text[..length]))
    }
}

unsafe fn get_window_title(window_handle: HWND, text: &mut [u16]) -> String {
    let len = unsafe { GetWindowTextW(window_handle, text) };
    let len = usize::try_from(len).unwrap_or_default().min(text.len());
    String::from_utf16_lossy(&text[..len])
}

#[derive(Default)]
pub struct WindowsWindowManager {}

impl WindowsWindowManager {
    pub fn new() -> Self {
        Self {}
    }
}

impl WindowManager for WindowsWindowManager {
    fn get_active_window_data(&mut self) -> Result<ActiveWindowData> {
        get_active().inspect_err(|e| error!("Failed to get active window {e:?}"))
    }
}
