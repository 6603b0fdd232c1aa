#![no_std]
//! Wire layouts for the five CurveCP packet kinds.
//!
//! Every struct here is a `#[repr(C)]` byte-for-byte reinterpretation of a UDP
//! datagram: parsing a packet is `FromBytes::ref_from`, not a field-by-field
//! deserializer. Field order matches the wire order exactly.

use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// 16-byte opaque routing tag. The core never interprets these; callers use
/// them to demux onto their own routing scheme.
pub type Extension = [u8; 16];

/// Minimum UDP payload the reactor will look at at all.
pub const MIN_UDP_PAYLOAD: usize = 64;
/// Maximum UDP payload; anything larger is discarded unread.
pub const MAX_UDP_PAYLOAD: usize = 1184;

pub const HELLO_PACKET_LEN: usize = 224;
pub const COOKIE_PACKET_LEN: usize = 200;
/// Minimum Initiate length: fixed header (176) + empty-payload sealed body (368).
pub const INITIATE_PACKET_MIN_LEN: usize = 544;
/// Minimum ClientMessage length: fixed header (80) + empty-payload MAC tag (16).
pub const CLIENT_MESSAGE_MIN_LEN: usize = 96;
/// Minimum ServerMessage length: fixed header (48) + empty-payload MAC tag (16).
pub const SERVER_MESSAGE_MIN_LEN: usize = 64;

/// MAC length appended by every box/secretbox seal.
pub const MAC_LEN: usize = 16;
/// Server's domain name field inside Initiate, fixed width as in the
/// reference CurveCP wire format (used for virtual hosting; opaque here).
pub const SERVER_DOMAIN_LEN: usize = 256;

pub const MAGIC_HELLO: [u8; 8] = *b"QvnQ5XlH";
pub const MAGIC_COOKIE: [u8; 8] = *b"RL3aNMXK";
pub const MAGIC_INITIATE: [u8; 8] = *b"QvnQ5XlI";
pub const MAGIC_CLIENT_MESSAGE: [u8; 8] = *b"QvnQ5XlM";
pub const MAGIC_SERVER_MESSAGE: [u8; 8] = *b"RL3aNMXM";

/// Nonce tags, two shapes:
///
/// - Per-session packets (Hello, Initiate, ClientMessage, ServerMessage) use
///   a 16-byte ASCII prefix followed by an 8-byte strictly-increasing
///   per-direction counter.
/// - Cross-connection seals (Cookie, the Vouch sub-box inside Initiate, and
///   the minute-key cookie seal) have no counter to work with, so they use
///   an 8-byte ASCII tag followed by a 16-byte value drawn from a CSPRNG.
pub const NONCE_PREFIX_HELLO: [u8; 16] = *b"CurveCP-client-H";
pub const NONCE_PREFIX_INITIATE: [u8; 16] = *b"CurveCP-client-I";
pub const NONCE_PREFIX_CLIENT_MESSAGE: [u8; 16] = *b"CurveCP-client-M";
pub const NONCE_PREFIX_SERVER_MESSAGE: [u8; 16] = *b"CurveCP-server-M";

pub const NONCE_TAG_COOKIE: [u8; 8] = *b"CurveCPK";
pub const NONCE_TAG_VOUCH: [u8; 8] = *b"CurveCPV";
/// Cross-connection nonce tag used only for sealing/opening the stateless
/// server cookie under a minute key.
pub const NONCE_TAG_MINUTE_KEY: [u8; 8] = *b"minute-k";

/// Closed sum type over the five packet kinds, dispatched once on magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Hello,
    Cookie,
    Initiate,
    ClientMessage,
    ServerMessage,
}

impl PacketKind {
    /// Identify a packet kind from its leading 8-byte magic. Returns `None`
    /// for anything else, which the caller must silently discard.
    pub fn from_magic(magic: &[u8]) -> Option<Self> {
        if magic.len() < 8 {
            return None;
        }
        let magic: [u8; 8] = magic[..8].try_into().ok()?;
        match magic {
            MAGIC_HELLO => Some(PacketKind::Hello),
            MAGIC_COOKIE => Some(PacketKind::Cookie),
            MAGIC_INITIATE => Some(PacketKind::Initiate),
            MAGIC_CLIENT_MESSAGE => Some(PacketKind::ClientMessage),
            MAGIC_SERVER_MESSAGE => Some(PacketKind::ServerMessage),
            _ => None,
        }
    }

    pub const fn magic(self) -> [u8; 8] {
        match self {
            PacketKind::Hello => MAGIC_HELLO,
            PacketKind::Cookie => MAGIC_COOKIE,
            PacketKind::Initiate => MAGIC_INITIATE,
            PacketKind::ClientMessage => MAGIC_CLIENT_MESSAGE,
            PacketKind::ServerMessage => MAGIC_SERVER_MESSAGE,
        }
    }

    /// Exact length for fixed-size packets, minimum length for variable ones.
    pub const fn expected_len(self) -> usize {
        match self {
            PacketKind::Hello => HELLO_PACKET_LEN,
            PacketKind::Cookie => COOKIE_PACKET_LEN,
            PacketKind::Initiate => INITIATE_PACKET_MIN_LEN,
            PacketKind::ClientMessage => CLIENT_MESSAGE_MIN_LEN,
            PacketKind::ServerMessage => SERVER_MESSAGE_MIN_LEN,
        }
    }

    /// Whether `expected_len` is exact (true) or a floor for a
    /// variable-length packet (false).
    pub const fn is_fixed_len(self) -> bool {
        matches!(self, PacketKind::Hello | PacketKind::Cookie)
    }
}

/// Reasons a packet never produces a response. Deliberately has no
/// `Display`/`Error` impl: per invariant I5 these never escape to a caller,
/// only to a `tracing` event, and must never become a side channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    ShortPacket,
    OverlongPacket,
    UnknownMagic,
    WrongLength,
    BadMac,
    Replayed,
    UnknownSession,
    Unaligned,
}

/// `Hello` packet, 224 bytes on the wire (including magic).
///
/// `zero` must decrypt to 64 zero bytes; that is the packet's entire
/// purpose — proof the client holds the secret matching `client_short_term_pk`
/// and is reachable at its claimed address.
#[derive(Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct HelloPacket {
    pub magic: [u8; 8],
    pub sext: Extension,
    pub cext: Extension,
    pub client_short_term_pk: [u8; 32],
    pub zero_padding: [u8; 64],
    pub nonce8: [u8; 8],
    pub sealed_zero: [u8; 80],
}

/// `Cookie` packet, 200 bytes on the wire.
#[derive(Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct CookiePacket {
    pub magic: [u8; 8],
    pub sext: Extension,
    pub cext: Extension,
    pub nonce16: [u8; 16],
    pub sealed_cookie: [u8; 144],
}

/// 96-byte opaque server cookie: `secretbox(client_short_term_pk ‖ server_ephemeral_sk)`
/// under a minute key, including its own 16-byte random nonce and 16-byte tag.
pub const COOKIE_PLAINTEXT_LEN: usize = 64;
pub const COOKIE_SEALED_LEN: usize = 96;

/// Fixed header of an `Initiate` packet; the sealed body (variable length,
/// minimum 368 bytes for an empty payload) follows immediately after.
#[derive(Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct InitiateHeader {
    pub magic: [u8; 8],
    pub sext: Extension,
    pub cext: Extension,
    pub client_short_term_pk: [u8; 32],
    pub server_cookie: [u8; COOKIE_SEALED_LEN],
    pub nonce8: [u8; 8],
}

/// The plaintext structure sealed (under `K`, the session shared key) inside
/// an Initiate packet's variable-length body, before the trailing payload.
/// `vouch_nonce` is the 16-byte random suffix used, together with the
/// 8-byte `CurveCPV` tag, to build the Vouch sub-box's own nonce.
#[derive(Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct InitiatePlaintextHeader {
    pub client_long_term_pk: [u8; 32],
    pub vouch_nonce: [u8; 16],
    pub sealed_vouch: [u8; VOUCH_SEALED_LEN],
    pub server_domain: [u8; SERVER_DOMAIN_LEN],
}

/// Vouch sub-box: a seal, under `scalarmult(client_long_secret,
/// server_long_pub)`, of the client's short-term (ephemeral) public key.
/// Proves that whoever holds `client_long_term_pk`'s secret authorized this
/// particular ephemeral session key.
pub const VOUCH_PLAINTEXT_LEN: usize = 32;
pub const VOUCH_SEALED_LEN: usize = VOUCH_PLAINTEXT_LEN + MAC_LEN;

/// Fixed header of a `ClientMessage` packet; the sealed body follows.
#[derive(Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct ClientMessageHeader {
    pub magic: [u8; 8],
    pub sext: Extension,
    pub cext: Extension,
    pub client_short_term_pk: [u8; 32],
    pub nonce8: [u8; 8],
}

/// Fixed header of a `ServerMessage` packet; the sealed body follows.
#[derive(Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct ServerMessageHeader {
    pub magic: [u8; 8],
    pub sext: Extension,
    pub cext: Extension,
    pub nonce8: [u8; 8],
}
