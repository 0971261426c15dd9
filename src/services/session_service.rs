use std::collections::HashMap;
use std::sync::Mutex;

use tracing::info;
use uuid::Uuid;

/// Process-wide map of live connections to sessions.
///
/// Sessions are client-minted opaque ids; the server accepts the one
/// declared at handshake and trusts it for the connection's lifetime. At
/// most one connection speaks for a session at a time: a newer connection
/// supersedes an older one, and the superseded connection's close is then
/// ignored by the disconnect path.
#[derive(Default)]
pub struct SessionService {
    inner: Mutex<Maps>,
}

#[derive(Default)]
struct Maps {
    connection_sessions: HashMap<Uuid, String>,
    session_connections: HashMap<String, Uuid>,
}

impl SessionService {
    pub fn new() -> Self {
        SessionService::default()
    }

    /// Bind a freshly authenticated connection to its session. Returns the
    /// superseded connection id, if the session was already bound.
    pub fn bind(&self, connection_id: Uuid, session_id: &str) -> Option<Uuid> {
        let mut maps = self.inner.lock().unwrap();
        maps.connection_sessions
            .insert(connection_id, session_id.to_string());
        let superseded = maps
            .session_connections
            .insert(session_id.to_string(), connection_id);
        if let Some(old) = superseded {
            info!(session_id, %old, %connection_id, "Session rebound to a newer connection");
        }
        superseded
    }

    /// Drop a closing connection's binding. Returns the session only when
    /// this connection was still the session's active one; a superseded
    /// connection gets `None` and must not trigger disconnect handling.
    pub fn unbind(&self, connection_id: Uuid) -> Option<String> {
        let mut maps = self.inner.lock().unwrap();
        let session_id = maps.connection_sessions.remove(&connection_id)?;
        match maps.session_connections.get(&session_id) {
            Some(active) if *active == connection_id => {
                maps.session_connections.remove(&session_id);
                Some(session_id)
            }
            _ => None,
        }
    }

    pub fn session_of(&self, connection_id: Uuid) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .connection_sessions
            .get(&connection_id)
            .cloned()
    }
}
