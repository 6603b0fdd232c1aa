//! Server-side session table (§4.6), keyed by client short-term public key.
//!
//! Keyed with a per-reactor-instance randomized hasher (see
//! [`curvecp_utils::session_table_hasher`]) so an attacker who can choose
//! their own ephemeral public key cannot force hash-bucket collisions across
//! restarts of the process.

use std::collections::HashMap;

use curvecp_utils::session_table_hasher;
use rand_core::{CryptoRng, RngCore};

use crate::session::{Session, SessionId};

pub struct SessionTable {
    sessions: HashMap<SessionId, Session, ahash::RandomState>,
}

impl SessionTable {
    pub fn new(rng: &mut (impl CryptoRng + RngCore)) -> Self {
        Self {
            sessions: HashMap::with_hasher(session_table_hasher(rng)),
        }
    }

    pub fn insert(&mut self, session: Session) {
        self.sessions.insert(session.id, session);
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub fn remove(&mut self, id: &SessionId) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curvecp_crypto::{BoxKey, PublicKey, StaticSecret};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::net::SocketAddr;

    #[test]
    fn insert_get_remove_round_trip() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut table = SessionTable::new(&mut rng);

        let sk = StaticSecret::random_from_rng(&mut rng);
        let pk = PublicKey::from(&sk);
        let key = BoxKey::precompute(&pk, &sk);
        let id: SessionId = [1u8; 32];
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let session = Session::new(id, pk, addr, [0; 16], [0; 16], key, 0);

        table.insert(session);
        assert!(table.get(&id).is_some());
        assert_eq!(table.len(), 1);
        assert!(table.remove(&id).is_some());
        assert!(table.get(&id).is_none());
    }
}
