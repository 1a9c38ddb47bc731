//! Contains logic for reading the focused window, and on Windows the session and power
//! notifications, in different environments.
//! [GenericWindowManager] is the main artifact of this module that abstracts
//! the operations.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "win")]
pub mod win_events;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::{path::Path, sync::Arc};

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct ActiveWindowData {
    /// Name of the window. For example 'bash in hello' or 'Document 1' or 'Vibing in YouTube -
    /// Chrome'
    pub window_title: Arc<str>,
    /// Path to the executable owning the window. Empty when the process couldn't be resolved.
    pub process_name: Arc<str>,
}

impl ActiveWindowData {
    /// Identity of the window as tracked by sessions, `"<process> - <title>"`.
    ///
    /// A window without a title has no identity, and an unresolved process leaves just the
    /// title.
    pub fn identity(&self) -> String {
        let title = self.window_title.trim();
        if title.is_empty() {
            return String::new();
        }
        let process = Path::new(self.process_name.trim())
            .file_stem()
            .map(|v| v.to_string_lossy().to_string())
            .filter(|v| !v.is_empty());
        match process {
            Some(process) => format!("{process} - {title}"),
            None => title.to_string(),
        }
    }
}

/// Intended to serve as a contract windows and linux systems must implement.
#[cfg_attr(test, mockall::automock)]
pub trait WindowManager {
    fn get_active_window_data(&mut self) -> Result<ActiveWindowData>;
}

/// Serves as a cross-compatible WindowManager implementation.
pub struct GenericWindowManager {
    inner: Box<dyn WindowManager>,
}

impl GenericWindowManager {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsWindowManager;
                Ok(Self {
                    inner: Box::new(WindowsWindowManager::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::LinuxWindowManager;
                Ok(Self {
                    inner: Box::new(LinuxWindowManager::new()?),
                })
            }
            else {
                Err(anyhow::anyhow!(
                    "No window backend was compiled in, enable the `win` or `x11` feature"
                ))
            }
        }
    }
}

impl WindowManager for GenericWindowManager {
    fn get_active_window_data(&mut self) -> Result<ActiveWindowData> {
        self.inner.get_active_window_data()
    }
}

#[cfg(test)]
mod tests {
    use super::ActiveWindowData;

    fn window(process_name: &str, window_title: &str) -> ActiveWindowData {
        ActiveWindowData {
            window_title: window_title.into(),
            process_name: process_name.into(),
        }
    }

    #[test]
    fn identity_joins_process_stem_and_title() {
        assert_eq!(
            window("/usr/bin/nvim", "main.rs").identity(),
            "nvim - main.rs"
        );
        assert_eq!(window("firefox", "Inbox").identity(), "firefox - Inbox");
    }

    #[test]
    fn identity_falls_back_to_title() {
        assert_eq!(window("", "Document 1").identity(), "Document 1");
    }

    #[test]
    fn untitled_window_has_no_identity() {
        assert_eq!(window("/usr/bin/nvim", "  ").identity(), "");
        assert_eq!(window("", "").identity(), "");
    }
}
