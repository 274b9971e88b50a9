use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use spotcast_common::traits::VoiceTransport;

use crate::voice::supervisor::{SessionHandle, SessionState, StreamSupervisor};

/// At most one streaming session per guild.
pub struct SessionRegistry {
    supervisor: StreamSupervisor,
    sessions: Mutex<HashMap<u64, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(supervisor: StreamSupervisor) -> Self {
        Self {
            supervisor,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Starts streaming into `connection`, first tearing down whatever session
    /// the guild already had.
    pub async fn start(&self, connection: Arc<dyn VoiceTransport>) {
        let guild_id = connection.target().guild_id;
        let mut sessions = self.sessions.lock().await;

        if let Some(previous) = sessions.remove(&guild_id) {
            info!("Replacing streaming session for guild {}", guild_id);
            previous.shutdown().await;
        }

        let handle = self.supervisor.start(connection);
        sessions.insert(guild_id, handle);
    }

    /// Destroys the guild's session. Returns `false` when there was none.
    pub async fn stop(&self, guild_id: u64) -> bool {
        let handle = self.sessions.lock().await.remove(&guild_id);
        match handle {
            Some(handle) => {
                handle.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Current state, or `None` when the guild has no live session.
    pub async fn state(&self, guild_id: u64) -> Option<SessionState> {
        let mut sessions = self.sessions.lock().await;
        Self::prune(&mut sessions);
        sessions.get(&guild_id).map(SessionHandle::state)
    }

    pub async fn restarts(&self, guild_id: u64) -> Option<u64> {
        self.sessions.lock().await.get(&guild_id).map(SessionHandle::restarts)
    }

    pub async fn active_guilds(&self) -> Vec<u64> {
        let mut sessions = self.sessions.lock().await;
        Self::prune(&mut sessions);
        sessions.keys().copied().collect()
    }

    /// Destroys every session and waits for all of them to finish.
    pub async fn shutdown(&self) {
        let drained: Vec<SessionHandle> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().map(|(_, h)| h).collect()
        };
        for handle in drained {
            handle.shutdown().await;
        }
    }

    /// Sessions end on their own when their connection is destroyed.
    fn prune(sessions: &mut HashMap<u64, SessionHandle>) {
        sessions.retain(|_, h| !h.is_finished());
    }
}
