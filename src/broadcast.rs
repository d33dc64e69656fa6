//! Outgoing message fan-out
//!
//! The engine never talks to sockets. It queues envelopes in an [`Outbox`];
//! the session runtime pushes them into the session's broadcast channel and
//! each socket forwards the ones addressed to it. Delivery is fire-and-forget.

use crate::protocol::ServerMessage;
use crate::types::ParticipantId;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub enum Audience {
    All,
    Participant(ParticipantId),
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub to: Audience,
    pub message: ServerMessage,
}

impl Envelope {
    pub fn is_for(&self, participant_id: &str) -> bool {
        match &self.to {
            Audience::All => true,
            Audience::Participant(id) => id == participant_id,
        }
    }
}

#[derive(Debug, Default)]
pub struct Outbox {
    envelopes: Vec<Envelope>,
}

impl Outbox {
    pub fn broadcast(&mut self, message: ServerMessage) {
        self.envelopes.push(Envelope {
            to: Audience::All,
            message,
        });
    }

    pub fn send_to(&mut self, participant_id: &str, message: ServerMessage) {
        self.envelopes.push(Envelope {
            to: Audience::Participant(participant_id.to_string()),
            message,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn envelopes(&self) -> &[Envelope] {
        &self.envelopes
    }

    /// Messages a given participant would receive, in order
    pub fn messages_for(&self, participant_id: &str) -> Vec<&ServerMessage> {
        self.envelopes
            .iter()
            .filter(|e| e.is_for(participant_id))
            .map(|e| &e.message)
            .collect()
    }

    /// Push everything into the session channel
    pub fn deliver(self, tx: &broadcast::Sender<Envelope>) {
        for envelope in self.envelopes {
            // Ignore send errors (no receivers connected is fine)
            let _ = tx.send(envelope);
        }
    }
}
