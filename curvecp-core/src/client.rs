//! Client-side handshake state machine (§4.8, client half): `Idle →
//! HelloSent → CookieReceived → InitiateSent → Established`, with a
//! `Failed`/`Closed` sink. Sans-I/O: every method takes bytes in, returns
//! bytes (or plaintext) out, and the reactor owns the actual socket and
//! timers.

use curvecp_crypto::{
    counter_nonce, open_and_verify_vouch, seal_vouch, tagged_nonce, BoxKey, PublicKey, StaticSecret,
    COOKIE_PACKET_NONCE_TAG,
};
use curvecp_types::{
    DiscardReason, Extension, COOKIE_SEALED_LEN, NONCE_PREFIX_CLIENT_MESSAGE, NONCE_PREFIX_HELLO,
    NONCE_PREFIX_INITIATE, NONCE_PREFIX_SERVER_MESSAGE, SERVER_DOMAIN_LEN,
};
use rand_core::{CryptoRng, RngCore};
use tracing::trace;

use crate::wire;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    HelloSent,
    CookieReceived,
    InitiateSent,
    Established,
    Closed,
}

/// Everything the client learns from a Cookie, kept only long enough to
/// build the Initiate.
struct CookieMaterial {
    server_short_term_pk: PublicKey,
    opaque_cookie: [u8; COOKIE_SEALED_LEN],
}

pub struct ClientHandshake {
    state: ClientState,

    client_long_term_sk: StaticSecret,
    client_short_term_sk: StaticSecret,
    client_short_term_pk: PublicKey,
    server_long_term_pk: PublicKey,
    server_domain: [u8; SERVER_DOMAIN_LEN],
    sext: Extension,
    cext: Extension,

    /// `K_H = scalarmult(client_short_term_sk, server_long_term_pk)`, the box
    /// key shared with the Hello/Cookie exchange before any session key
    /// exists. The same value the server computes as
    /// `scalarmult(server_long_term_sk, client_short_term_pk)`.
    hello_box: BoxKey,

    cookie: Option<CookieMaterial>,
    /// `K = scalarmult(client_short_term_sk, server_short_term_pk)`, the real
    /// per-session key, available only from `CookieReceived` onward.
    session_key: Option<BoxKey>,

    out_counter: u64,
    in_counter_high_water: u64,
}

impl ClientHandshake {
    pub fn dial(
        client_long_term_sk: StaticSecret,
        server_long_term_pk: PublicKey,
        server_domain: [u8; SERVER_DOMAIN_LEN],
        sext: Extension,
        cext: Extension,
        rng: &mut (impl CryptoRng + RngCore),
    ) -> Self {
        let client_short_term_sk = StaticSecret::random_from_rng(&mut *rng);
        let client_short_term_pk = PublicKey::from(&client_short_term_sk);
        let hello_box = BoxKey::precompute(&server_long_term_pk, &client_short_term_sk);

        // Per §4.2, the outbound counter starts at a random 48-bit value so
        // a captured packet's counter doesn't reveal how long the session
        // has been alive.
        let out_counter = rng.next_u64() & 0x0000_ffff_ffff_ffff;

        Self {
            state: ClientState::Idle,
            client_long_term_sk,
            client_short_term_sk,
            client_short_term_pk,
            server_long_term_pk,
            server_domain,
            sext,
            cext,
            hello_box,
            cookie: None,
            session_key: None,
            out_counter,
            in_counter_high_water: 0,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Build (or rebuild, for a retransmit) the Hello packet. Valid from
    /// `Idle` or while still in `HelloSent`.
    pub fn build_hello(&mut self) -> [u8; curvecp_types::HELLO_PACKET_LEN] {
        let counter = self.out_counter;
        // Every call — including a retransmit — burns this counter value and
        // moves to the next, per §4.5 ("resend Hello with a freshly
        // incremented counter; never reuse a nonce").
        self.out_counter += 1;
        let nonce = counter_nonce(&NONCE_PREFIX_HELLO, counter);

        let mut zero = [0u8; 64];
        let tag = self.hello_box.seal_detached(&nonce, &mut zero);
        let mut sealed_zero = [0u8; 80];
        sealed_zero[..64].copy_from_slice(&zero);
        sealed_zero[64..].copy_from_slice(&tag);

        self.state = ClientState::HelloSent;
        wire::build_hello(
            self.sext,
            self.cext,
            *self.client_short_term_pk.as_bytes(),
            counter.to_be_bytes(),
            sealed_zero,
        )
    }

    /// Process a Cookie packet. On success the client is ready to build an
    /// Initiate; a discard here simply means the client keeps retransmitting
    /// Hello (the reactor's retransmit timer drives that, not this method).
    pub fn on_cookie(&mut self, bytes: &[u8]) -> Result<(), DiscardReason> {
        if self.state != ClientState::HelloSent {
            return Err(DiscardReason::UnknownSession);
        }
        let packet = wire::parse_cookie(bytes)?;

        let nonce = tagged_nonce(&COOKIE_PACKET_NONCE_TAG, &packet.nonce16);
        let mut plaintext = packet.sealed_cookie;
        let tag: curvecp_crypto::Tag16 = plaintext[128..].try_into().unwrap();

        self.hello_box
            .open_detached(&nonce, &mut plaintext[..128], &tag)
            .map_err(|_| DiscardReason::BadMac)?;

        let server_short_term_pk = PublicKey::from(<[u8; 32]>::try_from(&plaintext[..32]).unwrap());
        let opaque_cookie: [u8; COOKIE_SEALED_LEN] = plaintext[32..128].try_into().unwrap();

        self.session_key = Some(BoxKey::precompute(&server_short_term_pk, &self.client_short_term_sk));
        self.cookie = Some(CookieMaterial {
            server_short_term_pk,
            opaque_cookie,
        });
        self.state = ClientState::CookieReceived;
        Ok(())
    }

    /// Build the Initiate packet, sealing the first stream payload alongside
    /// the Vouch. Valid from `CookieReceived` or while retransmitting from
    /// `InitiateSent`.
    pub fn build_initiate(
        &mut self,
        payload: &[u8],
        rng: &mut (impl CryptoRng + RngCore),
    ) -> Result<Vec<u8>, DiscardReason> {
        let cookie = self.cookie.as_ref().ok_or(DiscardReason::UnknownSession)?;
        let session_key = self.session_key.as_ref().ok_or(DiscardReason::UnknownSession)?;

        let (vouch_nonce, sealed_vouch) = seal_vouch(
            &self.client_long_term_sk,
            &self.server_long_term_pk,
            &self.client_short_term_pk,
            rng,
        );

        let mut plaintext = wire::build_initiate_plaintext(
            *PublicKey::from(&self.client_long_term_sk).as_bytes(),
            vouch_nonce,
            sealed_vouch,
            self.server_domain,
            payload,
        );

        // Initiate is a single logical message; retransmits resend the exact
        // same ciphertext, so reusing counter 0 under this prefix never
        // reuses a nonce against distinct plaintext.
        let nonce = counter_nonce(&NONCE_PREFIX_INITIATE, 0);
        let tag = session_key.seal_detached(&nonce, &mut plaintext);
        plaintext.extend_from_slice(&tag);

        self.state = ClientState::InitiateSent;
        Ok(wire::build_initiate(
            self.sext,
            self.cext,
            *self.client_short_term_pk.as_bytes(),
            cookie.opaque_cookie,
            0u64.to_be_bytes(),
            &plaintext,
        ))
    }

    /// Process a ServerMessage. The first one to verify moves the session to
    /// `Established`; subsequent ones just deliver plaintext.
    pub fn on_server_message(&mut self, bytes: &[u8]) -> Result<Vec<u8>, DiscardReason> {
        if !matches!(self.state, ClientState::InitiateSent | ClientState::Established) {
            return Err(DiscardReason::UnknownSession);
        }
        let session_key = self.session_key.as_ref().ok_or(DiscardReason::UnknownSession)?;
        let parsed = wire::parse_server_message(bytes)?;

        let counter = u64::from_be_bytes(parsed.header.nonce8);
        if counter <= self.in_counter_high_water && self.state == ClientState::Established {
            return Err(DiscardReason::Replayed);
        }

        let nonce = counter_nonce(&NONCE_PREFIX_SERVER_MESSAGE, counter);
        let mut body = parsed.sealed_body.to_vec();
        if body.len() < 16 {
            return Err(DiscardReason::WrongLength);
        }
        let split = body.len() - 16;
        let tag: curvecp_crypto::Tag16 = body[split..].try_into().unwrap();

        session_key
            .open_detached(&nonce, &mut body[..split], &tag)
            .map_err(|_| DiscardReason::BadMac)?;

        self.in_counter_high_water = self.in_counter_high_water.max(counter);
        if self.state != ClientState::Established {
            trace!("handshake complete, first servermessage accepted");
        }
        self.state = ClientState::Established;
        body.truncate(split);
        Ok(body)
    }

    /// Seal a subsequent outbound ClientMessage. Only valid once `Established`.
    pub fn build_client_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, DiscardReason> {
        if self.state != ClientState::Established {
            return Err(DiscardReason::UnknownSession);
        }
        let session_key = self.session_key.as_ref().unwrap();

        let counter = self.out_counter;
        self.out_counter += 1;
        let nonce = counter_nonce(&NONCE_PREFIX_CLIENT_MESSAGE, counter);

        let mut plaintext = payload.to_vec();
        let tag = session_key.seal_detached(&nonce, &mut plaintext);
        plaintext.extend_from_slice(&tag);

        Ok(wire::build_client_message(
            self.sext,
            self.cext,
            *self.client_short_term_pk.as_bytes(),
            counter.to_be_bytes(),
            &plaintext,
        ))
    }

    pub fn close(&mut self) {
        self.state = ClientState::Closed;
        self.cookie = None;
        self.session_key = None;
    }
}

/// Authenticate a peer's claimed long-term key against its Vouch, used
/// symmetrically by the server's handshake (kept here since it is pure
/// cryptography, not state).
pub fn verify_vouch(
    server_long_term_sk: &StaticSecret,
    client_long_term_pk: &PublicKey,
    vouch_nonce: &[u8; 16],
    sealed_vouch: &[u8; curvecp_types::VOUCH_SEALED_LEN],
    expected_client_short_term_pk: &PublicKey,
) -> Result<(), DiscardReason> {
    open_and_verify_vouch(
        server_long_term_sk,
        client_long_term_pk,
        vouch_nonce,
        sealed_vouch,
        expected_client_short_term_pk,
    )
    .map_err(|_| DiscardReason::BadMac)
}
