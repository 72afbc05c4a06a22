use crate::camera::{default_source, FrameSource};
use crate::config::FocuscamConfig;
use crate::detector::PersonDetector;
use crate::error::{FocuscamError, Result};
use crate::session::MonitorSession;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry of monitoring sessions keyed by session id.
///
/// Registry mutations are serialized by a single lock; each session manages
/// its own internal concurrency. The lock is never held across an await:
/// stopping a session happens after its entry has left the map.
pub struct SessionManager {
    config: FocuscamConfig,
    detector: Arc<dyn PersonDetector>,
    sessions: Mutex<HashMap<String, Arc<MonitorSession>>>,
}

impl SessionManager {
    /// Create a manager that builds sessions from `config` and hands every
    /// one the given detector.
    pub fn new(config: FocuscamConfig, detector: Arc<dyn PersonDetector>) -> Self {
        Self {
            config,
            detector,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new session backed by the platform default frame source.
    ///
    /// `camera_index` overrides the configured device for this session.
    pub fn create_session(
        &self,
        id: &str,
        camera_index: Option<u32>,
    ) -> Result<Arc<MonitorSession>> {
        let mut camera_config = self.config.camera.clone();
        if let Some(index) = camera_index {
            camera_config.index = index;
        }
        let source = default_source(&camera_config);
        self.register(id, source, Arc::clone(&self.detector))
    }

    /// Register a session with an explicit frame source and detector.
    pub fn create_session_with(
        &self,
        id: &str,
        source: Box<dyn FrameSource>,
        detector: Arc<dyn PersonDetector>,
    ) -> Result<Arc<MonitorSession>> {
        self.register(id, source, detector)
    }

    fn register(
        &self,
        id: &str,
        source: Box<dyn FrameSource>,
        detector: Arc<dyn PersonDetector>,
    ) -> Result<Arc<MonitorSession>> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(id) {
            return Err(FocuscamError::SessionExists { id: id.to_string() });
        }

        let session = Arc::new(MonitorSession::new(
            id,
            self.config.processing.clone(),
            source,
            detector,
        ));
        sessions.insert(id.to_string(), Arc::clone(&session));

        info!(session = %id, "session created");
        Ok(session)
    }

    /// Look up a session; absence is not an error.
    pub fn get_session(&self, id: &str) -> Option<Arc<MonitorSession>> {
        self.sessions.lock().get(id).cloned()
    }

    /// Look up a session, surfacing absence as a named error for API
    /// callers that must distinguish "not found" from "not running".
    pub fn require_session(&self, id: &str) -> Result<Arc<MonitorSession>> {
        self.get_session(id)
            .ok_or_else(|| FocuscamError::SessionNotFound { id: id.to_string() })
    }

    /// Stop (if running) and evict a session. Returns whether it existed.
    pub async fn remove_session(&self, id: &str) -> bool {
        let session = self.sessions.lock().remove(id);

        match session {
            Some(session) => {
                if session.is_running() {
                    session.stop().await;
                }
                info!(session = %id, "session removed");
                true
            }
            None => {
                debug!(session = %id, "remove requested for unknown session");
                false
            }
        }
    }

    /// Ids of all registered sessions.
    pub fn list_sessions(&self) -> Vec<String> {
        self.sessions.lock().keys().cloned().collect()
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Stop every running session. Sessions stay registered; used at
    /// process teardown.
    pub async fn shutdown_all(&self) {
        let sessions: Vec<Arc<MonitorSession>> =
            self.sessions.lock().values().cloned().collect();

        info!("shutting down {} session(s)", sessions.len());
        for session in sessions {
            if session.is_running() {
                session.stop().await;
            }
        }
    }
}
