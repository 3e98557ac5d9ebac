//! In-memory session store.
//!
//! Each session sits behind its own async mutex: operations on one session
//! are serialized for the whole turn, while different sessions proceed
//! concurrently. The outer map lock is only held for lookups and inserts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::SessionError;
use crate::session::{Session, SessionId};

pub type SessionHandle = Arc<Mutex<Session>>;

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session and return it already locked.
    ///
    /// The caller holds the guard for the first turn, so feedback arriving
    /// before the first turn completes waits instead of racing it.
    pub async fn insert_locked(&self, session: Session) -> OwnedMutexGuard<Session> {
        let id = session.id();
        let handle = Arc::new(Mutex::new(session));
        let guard = Arc::clone(&handle).lock_owned().await;
        self.sessions.write().await.insert(id, handle);
        guard
    }

    pub async fn get(&self, id: SessionId) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionError::UnknownSession(id))
    }

    /// Lock a session for the duration of one operation.
    pub async fn lock(&self, id: SessionId) -> Result<OwnedMutexGuard<Session>, SessionError> {
        let handle = self.get(id).await?;
        Ok(handle.lock_owned().await)
    }

    /// Clone of the session as of now. Waits for any in-flight turn.
    pub async fn snapshot(&self, id: SessionId) -> Result<Session, SessionError> {
        let handle = self.get(id).await?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    pub async fn remove(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.write().await.remove(&id)
    }

    /// Drop every terminal session and return their ids.
    ///
    /// Sessions locked by an in-flight turn are skipped. Feedback for an
    /// evicted session is rejected as unknown.
    pub async fn evict_terminal(&self) -> Vec<SessionId> {
        let mut sessions = self.sessions.write().await;
        let evicted: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, handle)| {
                handle
                    .try_lock()
                    .map(|session| session.is_terminal())
                    .unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &evicted {
            sessions.remove(id);
        }
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "evicted terminal sessions");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
