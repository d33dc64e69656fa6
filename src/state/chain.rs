//! Content chains, one per seat

use crate::error::{EngineError, EngineResult};
use crate::types::*;
use chrono::{DateTime, Utc};

/// Which existing entry an upsert overwrites: same author, same kind, written
/// during the same phase epoch. Anything else appends.
#[derive(Debug, Clone, Copy)]
pub struct EntryKey<'a> {
    pub author: &'a str,
    pub kind: EntryKind,
    pub phase_seq: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ChainStore {
    chains: Vec<Chain>,
}

impl ChainStore {
    /// One empty chain per seat, in seat order
    pub fn for_seats(seats: &[ParticipantId]) -> Self {
        Self {
            chains: seats
                .iter()
                .map(|owner| Chain {
                    owner: owner.clone(),
                    entries: Vec::new(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn all(&self) -> &[Chain] {
        &self.chains
    }

    pub fn get(&self, index: usize) -> EngineResult<&Chain> {
        self.chains
            .get(index)
            .ok_or(EngineError::UnknownChain(index))
    }

    pub fn last_entry(&self, index: usize) -> EngineResult<Option<&Entry>> {
        Ok(self.get(index)?.entries.last())
    }

    /// Entry written under `key`, if any
    pub fn find(&self, index: usize, key: EntryKey<'_>) -> EngineResult<Option<&Entry>> {
        Ok(self
            .get(index)?
            .entries
            .iter()
            .find(|e| matches_key(e, key)))
    }

    /// Overwrite the entry matching `key` or append a new one. Resubmitting an
    /// identical payload leaves the entry untouched, timestamp included.
    pub fn upsert(
        &mut self,
        index: usize,
        key: EntryKey<'_>,
        payload: String,
        strokes: Option<Vec<Stroke>>,
        placeholder: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<&Entry> {
        let chain = self
            .chains
            .get_mut(index)
            .ok_or(EngineError::UnknownChain(index))?;

        if let Some(pos) = chain.entries.iter().position(|e| matches_key(e, key)) {
            let entry = &mut chain.entries[pos];
            if entry.payload != payload || entry.strokes != strokes || entry.placeholder != placeholder
            {
                entry.payload = payload;
                entry.strokes = strokes;
                entry.placeholder = placeholder;
                entry.submitted_at = now;
            }
            return Ok(&chain.entries[pos]);
        }

        let order = chain.entries.last().map(|e| e.order + 1).unwrap_or(0);
        chain.entries.push(Entry {
            order,
            kind: key.kind,
            author: key.author.to_string(),
            payload,
            strokes,
            submitted_at: now,
            placeholder,
            phase_seq: key.phase_seq,
        });
        Ok(&chain.entries[chain.entries.len() - 1])
    }
}

fn matches_key(entry: &Entry, key: EntryKey<'_>) -> bool {
    entry.author == key.author && entry.kind == key.kind && entry.phase_seq == key.phase_seq
}
