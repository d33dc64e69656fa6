pub mod chain;
mod phase;
mod player;
mod reconnect;
pub mod scheduler;
pub mod session;
pub mod submission;

pub use session::{Effects, PhaseSchedule, SessionEngine};

use crate::broadcast::Envelope;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::types::*;
use chrono::{DateTime, Utc};
use scheduler::{GraceTimers, PhaseTimers};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

const BROADCAST_CAPACITY: usize = 256;

/// Everything one session owns: the engine, its timers and its channel
pub struct SessionRuntime {
    pub engine: SessionEngine,
    pub(crate) timers: PhaseTimers,
    pub(crate) grace: GraceTimers,
    pub(crate) tx: broadcast::Sender<Envelope>,
    /// Open sockets per participant
    pub(crate) sockets: HashMap<ParticipantId, usize>,
}

impl SessionRuntime {
    fn new(id: SessionId, now: DateTime<Utc>) -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            engine: SessionEngine::new(id, now),
            timers: PhaseTimers::default(),
            grace: GraceTimers::default(),
            tx,
            sockets: HashMap::new(),
        }
    }

    fn shutdown(&mut self) {
        self.timers.cancel();
        self.grace.cancel_all();
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Mutex<SessionRuntime>>>>>,
    pub config: EngineConfig,
}

impl AppState {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub async fn create_session(&self) -> SessionId {
        let id = ulid::Ulid::new().to_string();
        let runtime = SessionRuntime::new(id.clone(), Utc::now());
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(runtime)));
        tracing::info!("Created session {}", id);
        id
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub(crate) async fn runtime(&self, session_id: &str) -> EngineResult<Arc<Mutex<SessionRuntime>>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or(EngineError::SessionNotFound)
    }

    /// Run `f` under the session lock, then carry out the effects it reports
    pub(crate) async fn with_runtime<T, F>(&self, session_id: &str, f: F) -> EngineResult<T>
    where
        F: FnOnce(&mut SessionRuntime, DateTime<Utc>) -> EngineResult<(T, Effects)>,
    {
        let runtime = self.runtime(session_id).await?;
        let mut rt = runtime.lock().await;
        let (value, fx) = f(&mut *rt, Utc::now())?;
        self.apply(session_id, &mut rt, fx).await;
        Ok(value)
    }

    pub(crate) async fn with_engine<T, F>(&self, session_id: &str, f: F) -> EngineResult<T>
    where
        F: FnOnce(&mut SessionEngine, DateTime<Utc>) -> EngineResult<(T, Effects)>,
    {
        self.with_runtime(session_id, |rt, now| f(&mut rt.engine, now))
            .await
    }

    /// Deliver messages first, then rearrange timers
    pub(crate) async fn apply(&self, session_id: &str, rt: &mut SessionRuntime, fx: Effects) {
        fx.outbox.deliver(&rt.tx);

        if fx.cancel_timers {
            rt.timers.cancel();
        }

        if let Some(schedule) = fx.schedule {
            let fire_in = (schedule.deadline - Utc::now())
                .to_std()
                .unwrap_or_default()
                + self.config.timeout_grace;
            let deadline = scheduler::spawn_deadline(
                self.clone(),
                session_id.to_string(),
                schedule.phase_seq,
                fire_in,
            );
            let ticker = scheduler::spawn_ticker(
                self.clone(),
                session_id.to_string(),
                schedule.phase_seq,
                self.config.tick_interval,
            );
            rt.timers.arm(schedule.phase_seq, deadline, ticker);
        }

        if fx.finished {
            tracing::info!("Session {} has a result", session_id);
        }

        if fx.abandoned {
            rt.shutdown();
            self.sessions.write().await.remove(session_id);
            tracing::info!("Session {} abandoned", session_id);
        }
    }

    /// Count a socket that now speaks for `participant_id`
    pub async fn attach_socket(&self, session_id: &str, participant_id: &str) -> EngineResult<()> {
        let runtime = self.runtime(session_id).await?;
        let mut rt = runtime.lock().await;
        *rt.sockets.entry(participant_id.to_string()).or_default() += 1;
        Ok(())
    }

    pub async fn subscribe(&self, session_id: &str) -> EngineResult<broadcast::Receiver<Envelope>> {
        let runtime = self.runtime(session_id).await?;
        let rt = runtime.lock().await;
        Ok(rt.tx.subscribe())
    }

    /// Tear a session down with all of its timers
    pub async fn cleanup(&self, session_id: &str) -> bool {
        let Some(runtime) = self.sessions.write().await.remove(session_id) else {
            return false;
        };
        runtime.lock().await.shutdown();
        tracing::info!("Cleaned up session {}", session_id);
        true
    }

    pub async fn snapshot(&self, session_id: &str) -> EngineResult<Session> {
        let runtime = self.runtime(session_id).await?;
        let rt = runtime.lock().await;
        Ok(rt.engine.session.clone())
    }

    pub async fn result(&self, session_id: &str) -> EngineResult<Option<SessionResult>> {
        let runtime = self.runtime(session_id).await?;
        let rt = runtime.lock().await;
        Ok(rt.engine.result())
    }

    /// Whether a phase deadline is currently armed
    pub async fn has_pending_deadline(&self, session_id: &str) -> EngineResult<bool> {
        let runtime = self.runtime(session_id).await?;
        let rt = runtime.lock().await;
        Ok(rt.timers.is_armed())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
