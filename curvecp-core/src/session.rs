//! Per-connected-pair state (§3 "Session"), materialized only after a
//! successful Initiate — the server allocates none of this for a Hello
//! alone (invariant I2).

use std::net::SocketAddr;

use curvecp_crypto::{BoxKey, PublicKey};
use curvecp_types::Extension;
use zeroize::Zeroize;

/// A unique 32-byte client short-term public key, used both as the session
/// table key and as the wire field `C'`.
pub type SessionId = [u8; 32];

pub struct Session {
    pub id: SessionId,
    pub peer_long_term_pk: PublicKey,
    pub peer_addr: SocketAddr,
    pub sext: Extension,
    pub cext: Extension,

    /// Precomputed shared key `K = scalarmult(my_eph_sec, peer_eph_pub)`.
    /// Never constructed until both ephemeral public keys are authenticated
    /// (invariant I3): a client builds this only after opening Cookie, a
    /// server only after a Vouch opens successfully.
    shared_key: BoxKey,

    /// Strictly increasing, this side's outbound counter.
    out_counter: u64,
    /// Highest inbound counter accepted so far; anything `<=` this is a replay.
    in_counter_high_water: u64,
}

impl Session {
    pub fn new(
        id: SessionId,
        peer_long_term_pk: PublicKey,
        peer_addr: SocketAddr,
        sext: Extension,
        cext: Extension,
        shared_key: BoxKey,
        initial_out_counter: u64,
    ) -> Self {
        Self {
            id,
            peer_long_term_pk,
            peer_addr,
            sext,
            cext,
            shared_key,
            out_counter: initial_out_counter,
            in_counter_high_water: 0,
        }
    }

    pub fn shared_key(&self) -> &BoxKey {
        &self.shared_key
    }

    /// Allocate and advance the next outbound counter. Per invariant I1,
    /// this value must never be reused for this session's direction.
    pub fn next_out_counter(&mut self) -> u64 {
        let c = self.out_counter;
        self.out_counter += 1;
        c
    }

    /// Accept an inbound counter if and only if it is strictly greater than
    /// every counter accepted so far; otherwise this is a replay or
    /// duplicate and must be silently discarded (invariant P2).
    pub fn accept_in_counter(&mut self, counter: u64) -> bool {
        if counter > self.in_counter_high_water {
            self.in_counter_high_water = counter;
            true
        } else {
            false
        }
    }

    pub fn highest_accepted_in_counter(&self) -> u64 {
        self.in_counter_high_water
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.id.zeroize();
        self.out_counter.zeroize();
        self.in_counter_high_water.zeroize();
        // `shared_key` and `peer_long_term_pk` zeroize themselves on drop.
    }
}
