//! Crypto primitives adapter (C3), nonce construction (C2), and the
//! server-side minute-key cookie manager (C4).
//!
//! Two NaCl-family primitives are needed and nothing else: `box`/`box_open`
//! (public-key authenticated encryption, here `crypto_box::SalsaBox`) and
//! `secretbox`/`secretbox_open` (symmetric authenticated encryption, here
//! `crypto_secretbox::XSalsa20Poly1305`). Both crates implement the same
//! `aead::AeadInPlace` trait, so a box and a secretbox are sealed/opened the
//! same way once their key is built.

use aead::{generic_array::GenericArray, AeadInPlace};
use crypto_box::SalsaBox;
use crypto_secretbox::XSalsa20Poly1305;
use rand_core::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub use x25519_dalek::{PublicKey, StaticSecret};

use curvecp_types::{
    NONCE_TAG_COOKIE, NONCE_TAG_MINUTE_KEY, NONCE_TAG_VOUCH, VOUCH_PLAINTEXT_LEN, VOUCH_SEALED_LEN,
};

/// Open/seal failures are never surfaced with detail: which exact check
/// failed (bad MAC vs. wrong length vs. stale minute key) must not be
/// observable by a remote peer, so this carries no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoError;

/// A 24-byte XSalsa20-Poly1305 nonce: 8 or 16 bytes of ASCII tag, the rest a
/// counter or random suffix.
pub type Nonce24 = [u8; 24];
/// 16-byte Poly1305 authentication tag.
pub type Tag16 = [u8; 16];

/// Build the nonce for a per-session, per-direction packet: a 16-byte ASCII
/// prefix followed by an 8-byte counter (big-endian, matching wire order).
pub fn counter_nonce(prefix16: &[u8; 16], counter: u64) -> Nonce24 {
    let mut n = [0u8; 24];
    n[..16].copy_from_slice(prefix16);
    n[16..].copy_from_slice(&counter.to_be_bytes());
    n
}

/// Build the nonce for a cross-connection seal (Cookie, Vouch, minute-key):
/// an 8-byte ASCII tag followed by a 16-byte value, typically random since no
/// counter is available across connections.
pub fn tagged_nonce(tag8: &[u8; 8], suffix16: &[u8; 16]) -> Nonce24 {
    let mut n = [0u8; 24];
    n[..8].copy_from_slice(tag8);
    n[8..].copy_from_slice(suffix16);
    n
}

/// A box key, precomputed once per session per spec §4.3 ("Both must
/// precompute the shared key once per session ... and reuse it"). Holding
/// this instead of the raw scalar-mult output means every subsequent
/// seal/open on this pairing costs no further elliptic-curve work.
pub struct BoxKey(SalsaBox);

impl BoxKey {
    /// One Diffie-Hellman scalar multiplication; cache the result.
    pub fn precompute(their_public: &PublicKey, our_secret: &StaticSecret) -> Self {
        let pk = crypto_box::PublicKey::from(*their_public.as_bytes());
        let sk = crypto_box::SecretKey::from(our_secret.to_bytes());
        Self(SalsaBox::new(&pk, &sk))
    }

    /// Seal `plaintext` in place, returning the detached authentication tag.
    pub fn seal_detached(&self, nonce: &Nonce24, plaintext: &mut [u8]) -> Tag16 {
        let tag = self
            .0
            .encrypt_in_place_detached(GenericArray::from_slice(nonce), b"", plaintext)
            .expect("plaintext within NaCl's message-size bound");
        tag.into()
    }

    /// Open `ciphertext` in place against a detached tag. On failure the
    /// buffer's contents must be treated as garbage by the caller — there is
    /// nothing more to learn from a failed open than "discard this packet".
    pub fn open_detached(
        &self,
        nonce: &Nonce24,
        ciphertext: &mut [u8],
        tag: &Tag16,
    ) -> Result<(), CryptoError> {
        self.0
            .decrypt_in_place_detached(GenericArray::from_slice(nonce), b"", ciphertext, GenericArray::from_slice(tag))
            .map_err(|_| CryptoError)
    }
}

/// A symmetric secretbox key (used only server-side, for minute-key cookies).
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretboxKey([u8; 32]);

impl SecretboxKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn random(rng: &mut (impl CryptoRng + RngCore)) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    fn cipher(&self) -> XSalsa20Poly1305 {
        use aead::KeyInit;
        XSalsa20Poly1305::new(GenericArray::from_slice(&self.0))
    }

    pub fn seal_detached(&self, nonce: &Nonce24, plaintext: &mut [u8]) -> Tag16 {
        let tag = self
            .cipher()
            .encrypt_in_place_detached(GenericArray::from_slice(nonce), b"", plaintext)
            .expect("plaintext within NaCl's message-size bound");
        tag.into()
    }

    pub fn open_detached(
        &self,
        nonce: &Nonce24,
        ciphertext: &mut [u8],
        tag: &Tag16,
    ) -> Result<(), CryptoError> {
        self.cipher()
            .decrypt_in_place_detached(GenericArray::from_slice(nonce), b"", ciphertext, GenericArray::from_slice(tag))
            .map_err(|_| CryptoError)
    }
}

/// Server-side rotating secret used to seal stateless cookies (C4).
///
/// Two slots always exist. `current` seals new cookies; both `current` and
/// `prior` are tried when opening one, giving a cookie a ~120s acceptance
/// window without the server ever retaining per-connection state.
pub struct MinuteKeyManager {
    current: SecretboxKey,
    prior: SecretboxKey,
}

impl MinuteKeyManager {
    /// Both slots start randomized, independently, so no cookie is valid
    /// before the second rotation — there is no "first current key" that a
    /// cookie sealed at startup could still be riding on 60s later.
    pub fn new(rng: &mut (impl CryptoRng + RngCore)) -> Self {
        Self {
            current: SecretboxKey::random(rng),
            prior: SecretboxKey::random(rng),
        }
    }

    /// Called once every 60s, from the reactor's own event loop — never
    /// behind a lock, see the design note on owned-per-reactor state.
    pub fn rotate(&mut self, rng: &mut (impl CryptoRng + RngCore)) {
        self.prior = core::mem::replace(&mut self.current, SecretboxKey::random(rng));
    }

    /// Seal a 64-byte cookie payload (`client_short_term_pk ‖
    /// server_ephemeral_secret`) under `current`, with a fresh random nonce
    /// suffix. Returns the 16-byte random suffix and the sealed 80-byte body
    /// (64-byte ciphertext + 16-byte tag); the caller assembles the 96-byte
    /// `servercookie` wire field from these two pieces.
    pub fn seal_cookie(
        &self,
        mut plaintext: [u8; 64],
        rng: &mut (impl CryptoRng + RngCore),
    ) -> ([u8; 16], [u8; 64], Tag16) {
        let mut suffix = [0u8; 16];
        rng.fill_bytes(&mut suffix);
        let nonce = tagged_nonce(&NONCE_TAG_MINUTE_KEY, &suffix);
        let tag = self.current.seal_detached(&nonce, &mut plaintext);
        (suffix, plaintext, tag)
    }

    /// Attempt to open a cookie under `current`, then `prior`. Both failing
    /// means discard — this is the only way a cookie older than ~120s is
    /// rejected, and the only way a forged one is rejected.
    pub fn open_cookie(
        &self,
        suffix16: &[u8; 16],
        ciphertext: &mut [u8; 64],
        tag: &Tag16,
    ) -> Result<(), CryptoError> {
        let nonce = tagged_nonce(&NONCE_TAG_MINUTE_KEY, suffix16);
        let mut scratch = *ciphertext;
        if self.current.open_detached(&nonce, &mut scratch, tag).is_ok() {
            *ciphertext = scratch;
            return Ok(());
        }
        tracing::trace!("cookie rejected under current minute key, trying prior");
        let mut scratch = *ciphertext;
        if self.prior.open_detached(&nonce, &mut scratch, tag).is_ok() {
            *ciphertext = scratch;
            return Ok(());
        }
        Err(CryptoError)
    }
}

/// Build the Vouch sub-box: seal the client's short-term public key under
/// the long-term shared key `scalarmult(client_long_secret, server_long_pub)`.
/// Returns the 16-byte `vouch_nonce` suffix and the 48-byte sealed body.
pub fn seal_vouch(
    client_long_secret: &StaticSecret,
    server_long_pub: &PublicKey,
    client_short_term_pk: &PublicKey,
    rng: &mut (impl CryptoRng + RngCore),
) -> ([u8; 16], [u8; VOUCH_SEALED_LEN]) {
    let key = BoxKey::precompute(server_long_pub, client_long_secret);
    let mut suffix = [0u8; 16];
    rng.fill_bytes(&mut suffix);
    let nonce = tagged_nonce(&NONCE_TAG_VOUCH, &suffix);

    let mut buf = [0u8; VOUCH_SEALED_LEN];
    buf[..VOUCH_PLAINTEXT_LEN].copy_from_slice(client_short_term_pk.as_bytes());
    let tag = key.seal_detached(&nonce, &mut buf[..VOUCH_PLAINTEXT_LEN]);
    buf[VOUCH_PLAINTEXT_LEN..].copy_from_slice(&tag);
    (suffix, buf)
}

/// Open the Vouch sub-box under the long-term shared key
/// `scalarmult(server_long_secret, client_long_pub)` and verify that its
/// plaintext equals `expected_client_short_term_pk` — the anti-confusion
/// check that proves the long-term key holder actually authorized *this*
/// ephemeral session key, not some other one.
pub fn open_and_verify_vouch(
    server_long_secret: &StaticSecret,
    client_long_pub: &PublicKey,
    vouch_nonce: &[u8; 16],
    sealed_vouch: &[u8; VOUCH_SEALED_LEN],
    expected_client_short_term_pk: &PublicKey,
) -> Result<(), CryptoError> {
    let key = BoxKey::precompute(client_long_pub, server_long_secret);
    let nonce = tagged_nonce(&NONCE_TAG_VOUCH, vouch_nonce);

    let mut plaintext = [0u8; VOUCH_PLAINTEXT_LEN];
    plaintext.copy_from_slice(&sealed_vouch[..VOUCH_PLAINTEXT_LEN]);
    let tag: Tag16 = sealed_vouch[VOUCH_PLAINTEXT_LEN..].try_into().unwrap();

    key.open_detached(&nonce, &mut plaintext, &tag)?;

    if plaintext.ct_eq(expected_client_short_term_pk.as_bytes()).into() {
        Ok(())
    } else {
        Err(CryptoError)
    }
}

/// Convenience re-export of the Cookie packet's nonce tag, for callers
/// assembling the outer Cookie-packet box (distinct from the inner
/// minute-key seal).
pub const COOKIE_PACKET_NONCE_TAG: [u8; 8] = NONCE_TAG_COOKIE;
