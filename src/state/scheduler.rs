//! Cancellable timers
//!
//! Every timer is a tokio task that sleeps, then re-locks its session and
//! calls an engine entry point guarded by the epoch it was armed with. Closing
//! a phase aborts its tasks; a callback that slips through anyway finds a
//! newer epoch and does nothing.

use super::AppState;
use crate::types::{ParticipantId, SessionId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shortest countdown period; `interval` cannot take zero
const MIN_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Deadline and countdown ticker of the currently open phase
#[derive(Debug, Default)]
pub struct PhaseTimers {
    phase_seq: u64,
    deadline: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
}

impl PhaseTimers {
    pub fn arm(&mut self, phase_seq: u64, deadline: JoinHandle<()>, ticker: JoinHandle<()>) {
        self.cancel();
        self.phase_seq = phase_seq;
        self.deadline = Some(deadline);
        self.ticker = Some(ticker);
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.deadline.take() {
            handle.abort();
        }
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }

    /// Forget the deadline handle without aborting it. Called from the
    /// deadline task itself before it closes the phase.
    pub fn release_deadline(&mut self, phase_seq: u64) {
        if self.phase_seq == phase_seq {
            self.deadline = None;
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn phase_seq(&self) -> u64 {
        self.phase_seq
    }
}

/// Pending removals of disconnected participants
#[derive(Debug, Default)]
pub struct GraceTimers {
    timers: HashMap<ParticipantId, (u64, JoinHandle<()>)>,
}

impl GraceTimers {
    pub fn arm(&mut self, participant_id: &str, seq: u64, handle: JoinHandle<()>) {
        if let Some((_, old)) = self
            .timers
            .insert(participant_id.to_string(), (seq, handle))
        {
            old.abort();
        }
    }

    pub fn cancel(&mut self, participant_id: &str) {
        if let Some((_, handle)) = self.timers.remove(participant_id) {
            handle.abort();
        }
    }

    /// Forget a timer that is firing right now
    pub fn release(&mut self, participant_id: &str, seq: u64) {
        if self.timers.get(participant_id).is_some_and(|(s, _)| *s == seq) {
            self.timers.remove(participant_id);
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.timers.drain() {
            handle.abort();
        }
    }

    #[cfg(test)]
    fn is_pending(&self, participant_id: &str) -> bool {
        self.timers.contains_key(participant_id)
    }
}

/// One-shot phase timeout
pub fn spawn_deadline(
    state: AppState,
    session_id: SessionId,
    phase_seq: u64,
    fire_in: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(fire_in).await;
        tracing::debug!("Deadline fired for {} epoch {}", session_id, phase_seq);
        state.on_deadline(&session_id, phase_seq).await;
    })
}

/// Periodic `time_remaining` broadcast until the phase closes
pub fn spawn_ticker(
    state: AppState,
    session_id: SessionId,
    phase_seq: u64,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(MIN_TICK_INTERVAL));
        // First tick completes immediately; the phase message already carried the time
        interval.tick().await;
        loop {
            interval.tick().await;
            if !state.tick(&session_id, phase_seq).await {
                break;
            }
        }
    })
}

pub fn spawn_grace(
    state: AppState,
    session_id: SessionId,
    participant_id: ParticipantId,
    seq: u64,
    grace: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        state.expire(&session_id, &participant_id, seq).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_tasks() {
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = fired.clone();
        let deadline = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });
        let ticker = tokio::spawn(std::future::pending::<()>());

        let mut timers = PhaseTimers::default();
        timers.arm(1, deadline, ticker);
        assert!(timers.is_armed());
        timers.cancel();
        assert!(!timers.is_armed());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!fired.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_release_only_matching_epoch() {
        let mut timers = PhaseTimers::default();
        timers.arm(
            3,
            tokio::spawn(std::future::pending::<()>()),
            tokio::spawn(std::future::pending::<()>()),
        );
        timers.release_deadline(2);
        assert!(timers.is_armed());
        timers.release_deadline(3);
        assert!(!timers.is_armed());
        assert_eq!(timers.phase_seq(), 3);
        timers.cancel();
    }

    #[tokio::test]
    async fn test_grace_rearm_replaces_old_timer() {
        let mut grace = GraceTimers::default();
        grace.arm("p", 1, tokio::spawn(std::future::pending::<()>()));
        grace.arm("p", 3, tokio::spawn(std::future::pending::<()>()));

        grace.release("p", 1);
        assert!(grace.is_pending("p"));
        grace.release("p", 3);
        assert!(!grace.is_pending("p"));

        grace.arm("q", 1, tokio::spawn(std::future::pending::<()>()));
        grace.cancel_all();
        assert!(!grace.is_pending("q"));
    }
}
