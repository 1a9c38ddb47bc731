use std::sync::Arc;

use chrono::{DateTime, Utc};

/// A window that has held focus since `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub subject: Arc<str>,
    pub start: DateTime<Utc>,
}

/// Outcome of feeding one focus sample into [SessionState].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    /// Focus moved. `closed` is the session that just ended, if there was one.
    Switched {
        closed: Option<Session>,
        opened: Session,
    },
}

/// The currently open session. Empty until the first non-blank sample arrives.
#[derive(Debug, Default)]
pub struct SessionState {
    current: Option<Session>,
}

impl SessionState {
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Applies a focus sample taken at `now`.
    ///
    /// Blank identities mean nothing could be read, so they never end the current session.
    pub fn observe(&mut self, identity: &str, now: DateTime<Utc>) -> Transition {
        if identity.trim().is_empty() {
            return Transition::Unchanged;
        }
        if self
            .current
            .as_ref()
            .is_some_and(|session| &*session.subject == identity)
        {
            return Transition::Unchanged;
        }

        let opened = Session {
            subject: identity.into(),
            start: now,
        };
        let closed = self.current.replace(opened.clone());
        Transition::Switched { closed, opened }
    }

    /// Ends tracking and hands back the session that was still open.
    pub fn finish(&mut self) -> Option<Session> {
        self.current.take()
    }
}
