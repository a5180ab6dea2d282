//! Identifier sources for agents spawned during a run.

use crate::types::AgentId;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex};

/// Source of fresh agent identifiers.
///
/// Processes that spawn agents (e.g. a new phage) hold an `Arc<dyn IdSource>`
/// in their configuration. This is the only place randomness enters a round,
/// and it never enters the scheduler itself.
///
/// # Implementations
///
/// - **Production**: `RandomIds` - UUID v4 from OS entropy
/// - **Reproducible**: `SeededIds` - UUIDs drawn from a seeded ChaCha8 stream
pub trait IdSource: Send + Sync + std::fmt::Debug {
    /// Returns a new, previously unused identifier.
    fn next_agent_id(&self) -> AgentId;

    /// Returns the source's seed (for logging).
    ///
    /// Unseeded sources return 0.
    fn seed(&self) -> u64;
}

/// Production identifier source backed by UUID v4.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl RandomIds {
    /// Creates an Arc-wrapped source for sharing across processes.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl IdSource for RandomIds {
    fn next_agent_id(&self) -> AgentId {
        AgentId::new()
    }

    fn seed(&self) -> u64 {
        0
    }
}

/// Deterministic identifier source for reproducible runs.
///
/// Two sources built from the same seed hand out the same sequence of ids.
#[derive(Debug)]
pub struct SeededIds {
    seed: u64,
    rng: Mutex<ChaCha8Rng>,
}

impl SeededIds {
    /// Creates a new source with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    /// Creates an Arc-wrapped source for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }
}

impl IdSource for SeededIds {
    fn next_agent_id(&self) -> AgentId {
        let bytes: [u8; 16] = self.rng.lock().unwrap().gen();
        AgentId::from_uuid(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_ids_are_reproducible() {
        let a = SeededIds::new(42);
        let b = SeededIds::new(42);

        let first: Vec<AgentId> = (0..4).map(|_| a.next_agent_id()).collect();
        let second: Vec<AgentId> = (0..4).map(|_| b.next_agent_id()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_seeded_ids_are_unique_within_a_stream() {
        let ids = SeededIds::new(7);
        let x = ids.next_agent_id();
        let y = ids.next_agent_id();
        assert_ne!(x, y);
        assert_eq!(ids.seed(), 7);
    }

    #[test]
    fn test_random_ids_unseeded() {
        let ids = RandomIds;
        assert_eq!(ids.seed(), 0);
        assert_ne!(ids.next_agent_id(), ids.next_agent_id());
    }
}
