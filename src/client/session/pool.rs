use std::{collections::VecDeque, sync::Mutex, time::Duration};

use super::ServerSession;
use crate::bson::Document;

/// How long the server keeps an unused session alive.
pub(crate) const LOGICAL_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Server sessions released by finished client sessions, most recently used first.
#[derive(Debug, Default)]
pub(crate) struct ServerSessionPool {
    pool: Mutex<VecDeque<ServerSession>>,
}

impl ServerSessionPool {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ServerSession>> {
        self.pool
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Takes the most recently used session that is not about to expire, or starts a new one.
    /// Expiring sessions found along the way are dropped.
    pub(crate) fn check_out(&self) -> ServerSession {
        let mut pool = self.lock();
        while let Some(session) = pool.pop_front() {
            if session.is_about_to_expire(LOGICAL_SESSION_TIMEOUT) {
                continue;
            }
            return session;
        }
        ServerSession::new()
    }

    /// Returns `session` to the pool. Sessions that saw a network error, or that are about to
    /// expire, are discarded.
    pub(crate) fn check_in(&self, session: ServerSession) {
        let mut pool = self.lock();
        while let Some(oldest) = pool.back() {
            if !oldest.is_about_to_expire(LOGICAL_SESSION_TIMEOUT) {
                break;
            }
            pool.pop_back();
        }

        if !session.dirty && !session.is_about_to_expire(LOGICAL_SESSION_TIMEOUT) {
            pool.push_front(session);
        }
    }

    /// Empties the pool, returning the ids of the sessions it held.
    pub(crate) fn drain_session_ids(&self) -> Vec<Document> {
        self.lock().drain(..).map(|session| session.id).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &Document) -> bool {
        self.lock().iter().any(|session| &session.id == id)
    }
}
