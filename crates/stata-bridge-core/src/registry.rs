//! Named sessions shared by concurrent callers.
//!
//! The map lock is held only for lookup and insertion. Each session has its
//! own lock, so commands in different sessions run in parallel while commands
//! in the same session run one at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{SessionConfig, SessionMode};
use crate::error::Result;
use crate::installation::Installation;
use crate::result::ExecutionResult;
use crate::session::{BatchSession, EngineSession, ProcessSession};

/// Session id used when a caller does not name one.
pub const DEFAULT_SESSION_ID: &str = "default";

/// A session handle. Lock it to run commands.
pub type SharedSession = Arc<Mutex<Box<dyn EngineSession>>>;

/// Summary of one registered session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    /// `true` while a command is running, since the session is then busy.
    pub alive: bool,
    pub mode: SessionMode,
}

/// Owns every open session, keyed by id.
pub struct SessionRegistry {
    installation: Installation,
    config: SessionConfig,
    sessions: Mutex<HashMap<String, SharedSession>>,
}

impl SessionRegistry {
    pub fn new(installation: Installation, config: SessionConfig) -> Self {
        Self {
            installation,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn installation(&self) -> &Installation {
        &self.installation
    }

    fn build(&self, session_id: &str) -> Result<Box<dyn EngineSession>> {
        let session: Box<dyn EngineSession> = match self.config.mode {
            SessionMode::Interactive => Box::new(ProcessSession::new(
                session_id,
                self.installation.clone(),
                self.config.clone(),
            )?),
            SessionMode::Batch => Box::new(BatchSession::new(
                session_id,
                self.installation.clone(),
                &self.config,
            )?),
        };
        Ok(session)
    }

    /// Return the session named `session_id`, creating and starting it if
    /// needed. A registered session whose engine died is restarted.
    ///
    /// A session that fails its first start is closed and never registered.
    pub async fn get_or_create(&self, session_id: &str) -> Result<SharedSession> {
        let (session, created) = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(session_id) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let session = Arc::new(Mutex::new(self.build(session_id)?));
                    sessions.insert(session_id.to_string(), Arc::clone(&session));
                    (session, true)
                }
            }
        };

        if created {
            let mut guard = session.lock().await;
            if let Err(err) = guard.start().await {
                warn!(session_id = %session_id, error = %err, "session failed to start");
                guard.close().await;
                drop(guard);
                self.forget(session_id, &session).await;
                return Err(err);
            }
            info!(session_id = %session_id, mode = self.config.mode.as_str(), "session created");
            drop(guard);
            return Ok(session);
        }

        // A session that is busy running a command is alive by definition.
        if let Ok(mut guard) = session.try_lock() {
            if !guard.is_alive() {
                warn!(session_id = %session_id, "session not alive; restarting");
                guard.start().await?;
            }
        }
        Ok(session)
    }

    /// Remove `session_id` only if it still maps to `session`.
    async fn forget(&self, session_id: &str, session: &SharedSession) {
        let mut sessions = self.sessions.lock().await;
        if sessions
            .get(session_id)
            .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            sessions.remove(session_id);
        }
    }

    /// Run `code` in `session_id`, using the configured default timeout when
    /// `timeout` is `None`.
    ///
    /// Errors only if the session cannot be created; everything else is in
    /// the result.
    pub async fn execute(
        &self,
        session_id: &str,
        code: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult> {
        let session = self.get_or_create(session_id).await?;
        let timeout = timeout.unwrap_or(self.config.default_timeout);
        let mut guard = session.lock().await;
        Ok(guard.execute(code, timeout).await)
    }

    /// Close and unregister one session. Returns `false` if it was unknown.
    pub async fn close_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(session_id);
        match removed {
            Some(session) => {
                session.lock().await.close().await;
                info!(session_id = %session_id, "session closed");
                true
            }
            None => false,
        }
    }

    /// Close every session. One session failing to shut down cleanly does not
    /// stop the others from closing.
    pub async fn close_all(&self) {
        let drained: Vec<(String, SharedSession)> =
            self.sessions.lock().await.drain().collect();
        if drained.is_empty() {
            return;
        }
        info!(count = drained.len(), "closing all sessions");
        for (session_id, session) in drained {
            let handle = tokio::spawn(async move {
                session.lock().await.close().await;
            });
            if let Err(err) = handle.await {
                warn!(session_id = %session_id, error = %err, "session close panicked");
            }
        }
    }

    /// Registered sessions sorted by id.
    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.lock().await;
        let mut infos: Vec<SessionInfo> = sessions
            .iter()
            .map(|(session_id, session)| {
                let (alive, mode) = match session.try_lock() {
                    Ok(mut guard) => (guard.is_alive(), guard.mode()),
                    Err(_) => (true, self.config.mode),
                };
                SessionInfo {
                    session_id: session_id.clone(),
                    alive,
                    mode,
                }
            })
            .collect();
        infos.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        infos
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.lock().await.contains_key(session_id)
    }
}
