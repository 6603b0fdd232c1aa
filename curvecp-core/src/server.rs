//! Server-side handshake logic (§4.8, server half).
//!
//! Hello and Cookie are handled with **no session allocation at all**
//! (invariant I2): everything the server needs to answer a Hello is either
//! in the packet itself or derived from the rotating minute key. A `Session`
//! is only ever materialized once an Initiate's Vouch verifies.

use std::net::SocketAddr;

use curvecp_crypto::{
    counter_nonce, tagged_nonce, BoxKey, MinuteKeyManager, PublicKey, StaticSecret,
    COOKIE_PACKET_NONCE_TAG,
};
use curvecp_types::{
    DiscardReason, COOKIE_SEALED_LEN, NONCE_PREFIX_CLIENT_MESSAGE, NONCE_PREFIX_HELLO,
    NONCE_PREFIX_INITIATE, NONCE_PREFIX_SERVER_MESSAGE,
};
use rand_core::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;
use tracing::trace;

use crate::client::verify_vouch;
use crate::session::{Session, SessionId};
use crate::table::SessionTable;
use crate::wire;

pub struct Server {
    server_long_term_sk: StaticSecret,
    server_long_term_pk: PublicKey,
    minute_keys: MinuteKeyManager,
    sessions: SessionTable,
}

pub struct InitiateOutcome {
    pub session_id: SessionId,
    pub payload: Vec<u8>,
    /// `true` if this Initiate was already known (a retransmit): the caller
    /// should still be prepared to answer it, but must not treat `payload`
    /// as a second, distinct message to the application.
    pub was_duplicate: bool,
}

impl Server {
    pub fn new(
        server_long_term_sk: StaticSecret,
        rng: &mut (impl CryptoRng + RngCore),
    ) -> Self {
        let server_long_term_pk = PublicKey::from(&server_long_term_sk);
        Self {
            server_long_term_sk,
            server_long_term_pk,
            minute_keys: MinuteKeyManager::new(rng),
            sessions: SessionTable::new(rng),
        }
    }

    pub fn long_term_public_key(&self) -> PublicKey {
        self.server_long_term_pk
    }

    /// Roll the minute key. Called once every 60s by the reactor's timer —
    /// see the design note on this being structural, not lock-protected.
    pub fn rotate_minute_key(&mut self, rng: &mut (impl CryptoRng + RngCore)) {
        self.minute_keys.rotate(rng);
    }

    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Answer a Hello with a Cookie. Allocates nothing beyond the return
    /// value: every input needed to verify a later Initiate against this
    /// exchange is folded into the minute-key-sealed cookie itself.
    pub fn handle_hello(
        &self,
        bytes: &[u8],
        rng: &mut (impl CryptoRng + RngCore),
    ) -> Result<[u8; curvecp_types::COOKIE_PACKET_LEN], DiscardReason> {
        let hello = wire::parse_hello(bytes)?;
        let client_short_term_pk = PublicKey::from(hello.client_short_term_pk);

        // K_H: the same value the client computed as
        // scalarmult(client_short_term_sk, server_long_term_pk).
        let hello_box = BoxKey::precompute(&client_short_term_pk, &self.server_long_term_sk);
        let counter = u64::from_be_bytes(hello.nonce8);
        let nonce = counter_nonce(&NONCE_PREFIX_HELLO, counter);

        let mut sealed = hello.sealed_zero;
        let tag: curvecp_crypto::Tag16 = sealed[64..].try_into().unwrap();
        hello_box
            .open_detached(&nonce, &mut sealed[..64], &tag)
            .map_err(|_| DiscardReason::BadMac)?;
        if sealed[..64].iter().any(|&b| b != 0) {
            return Err(DiscardReason::BadMac);
        }

        let server_short_term_sk = StaticSecret::random_from_rng(&mut *rng);
        let server_short_term_pk = PublicKey::from(&server_short_term_sk);

        let mut cookie_plaintext = [0u8; 64];
        cookie_plaintext[..32].copy_from_slice(hello.client_short_term_pk.as_slice());
        cookie_plaintext[32..].copy_from_slice(server_short_term_sk.to_bytes().as_slice());
        let (suffix16, cookie_ciphertext, cookie_tag) =
            self.minute_keys.seal_cookie(cookie_plaintext, rng);
        let mut opaque_cookie = [0u8; COOKIE_SEALED_LEN];
        opaque_cookie[..16].copy_from_slice(&suffix16);
        opaque_cookie[16..80].copy_from_slice(&cookie_ciphertext);
        opaque_cookie[80..].copy_from_slice(&cookie_tag);

        let mut outer_plaintext = [0u8; 128];
        outer_plaintext[..32].copy_from_slice(server_short_term_pk.as_bytes());
        outer_plaintext[32..].copy_from_slice(&opaque_cookie);

        let mut outer_nonce16 = [0u8; 16];
        rng.fill_bytes(&mut outer_nonce16);
        let outer_nonce = tagged_nonce(&COOKIE_PACKET_NONCE_TAG, &outer_nonce16);
        let outer_tag = hello_box.seal_detached(&outer_nonce, &mut outer_plaintext);

        let mut sealed_cookie = [0u8; 144];
        sealed_cookie[..128].copy_from_slice(&outer_plaintext);
        sealed_cookie[128..].copy_from_slice(&outer_tag);

        Ok(wire::build_cookie(hello.sext, hello.cext, outer_nonce16, sealed_cookie))
    }

    /// Validate an Initiate end to end and, on success, materialize (or
    /// refresh) the session. A duplicate Initiate for an already-known
    /// session is accepted idempotently rather than treated as a replay —
    /// UDP may simply have delivered the client's retransmit.
    pub fn handle_initiate(
        &mut self,
        bytes: &[u8],
        peer_addr: SocketAddr,
        rng: &mut (impl CryptoRng + RngCore),
    ) -> Result<InitiateOutcome, DiscardReason> {
        let parsed = wire::parse_initiate(bytes)?;
        let header = parsed.header;
        let claimed_client_short_term_pk = PublicKey::from(header.client_short_term_pk);

        let mut opaque_cookie = header.server_cookie;
        let (suffix16, rest) = opaque_cookie.split_at_mut(16);
        let suffix16: [u8; 16] = (&*suffix16).try_into().unwrap();
        let (cookie_ciphertext, cookie_tag) = rest.split_at_mut(64);
        let mut cookie_ciphertext: [u8; 64] = (&*cookie_ciphertext).try_into().unwrap();
        let cookie_tag: curvecp_crypto::Tag16 = (&*cookie_tag).try_into().unwrap();

        self.minute_keys
            .open_cookie(&suffix16, &mut cookie_ciphertext, &cookie_tag)
            .map_err(|_| DiscardReason::BadMac)?;

        let cookie_client_short_term_pk: [u8; 32] = cookie_ciphertext[..32].try_into().unwrap();
        if !bool::from(cookie_client_short_term_pk.ct_eq(&header.client_short_term_pk)) {
            return Err(DiscardReason::BadMac);
        }
        let server_short_term_sk =
            StaticSecret::from(<[u8; 32]>::try_from(&cookie_ciphertext[32..64]).unwrap());

        let session_key = BoxKey::precompute(&claimed_client_short_term_pk, &server_short_term_sk);
        let counter = u64::from_be_bytes(header.nonce8);
        let nonce = counter_nonce(&NONCE_PREFIX_INITIATE, counter);

        let mut body = parsed.sealed_body.to_vec();
        if body.len() < 16 {
            return Err(DiscardReason::WrongLength);
        }
        let split = body.len() - 16;
        let tag: curvecp_crypto::Tag16 = body[split..].try_into().unwrap();
        session_key
            .open_detached(&nonce, &mut body[..split], &tag)
            .map_err(|_| DiscardReason::BadMac)?;
        body.truncate(split);

        let inner = wire::parse_initiate_plaintext(&body)?;
        let client_long_term_pk = PublicKey::from(inner.header.client_long_term_pk);

        verify_vouch(
            &self.server_long_term_sk,
            &client_long_term_pk,
            &inner.header.vouch_nonce,
            &inner.header.sealed_vouch,
            &claimed_client_short_term_pk,
        )?;

        let id: SessionId = header.client_short_term_pk;
        let was_duplicate = self.sessions.get(&id).is_some();
        if !was_duplicate {
            // Per §4.2, this direction's outbound counter also starts at a
            // random 48-bit value rather than zero.
            let initial_out_counter = rng.next_u64() & 0x0000_ffff_ffff_ffff;
            let session = Session::new(
                id,
                client_long_term_pk,
                peer_addr,
                header.sext,
                header.cext,
                BoxKey::precompute(&claimed_client_short_term_pk, &server_short_term_sk),
                initial_out_counter,
            );
            self.sessions.insert(session);
            trace!(session = %hex_prefix(&id), "session established");
        } else {
            trace!(session = %hex_prefix(&id), "duplicate initiate, session already established");
        }

        Ok(InitiateOutcome {
            session_id: id,
            payload: inner.payload.to_vec(),
            was_duplicate,
        })
    }

    /// Decrypt an established session's inbound ClientMessage, returning
    /// which session it belongs to alongside the plaintext.
    pub fn handle_client_message(&mut self, bytes: &[u8]) -> Result<(SessionId, Vec<u8>), DiscardReason> {
        let parsed = wire::parse_client_message(bytes)?;
        let id: SessionId = parsed.header.client_short_term_pk;
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(DiscardReason::UnknownSession)?;

        let counter = u64::from_be_bytes(parsed.header.nonce8);
        let nonce = counter_nonce(&NONCE_PREFIX_CLIENT_MESSAGE, counter);

        let mut body = parsed.sealed_body.to_vec();
        if body.len() < 16 {
            return Err(DiscardReason::WrongLength);
        }
        let split = body.len() - 16;
        let tag: curvecp_crypto::Tag16 = body[split..].try_into().unwrap();

        session
            .shared_key()
            .open_detached(&nonce, &mut body[..split], &tag)
            .map_err(|_| DiscardReason::BadMac)?;

        if !session.accept_in_counter(counter) {
            return Err(DiscardReason::Replayed);
        }
        body.truncate(split);
        Ok((id, body))
    }

    /// Seal an outbound ServerMessage for an established session.
    pub fn build_server_message(
        &mut self,
        id: &SessionId,
        payload: &[u8],
    ) -> Result<Vec<u8>, DiscardReason> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or(DiscardReason::UnknownSession)?;

        let counter = session.next_out_counter();
        let nonce = counter_nonce(&NONCE_PREFIX_SERVER_MESSAGE, counter);

        let mut plaintext = payload.to_vec();
        let tag = session.shared_key().seal_detached(&nonce, &mut plaintext);
        plaintext.extend_from_slice(&tag);

        Ok(wire::build_server_message(
            session.sext,
            session.cext,
            counter.to_be_bytes(),
            &plaintext,
        ))
    }

    pub fn close_session(&mut self, id: &SessionId) {
        self.sessions.remove(id);
    }
}

/// First 8 hex chars of a short-term public key, used only to give a
/// `tracing` span/event something short and stable to key off without
/// logging the whole key.
fn hex_prefix(id: &SessionId) -> String {
    id[..4].iter().map(|b| format!("{b:02x}")).collect()
}
