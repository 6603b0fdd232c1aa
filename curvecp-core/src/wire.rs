//! Packet marshaling (§4.1): typed fields in, wire bytes out, and back.
//!
//! This module does no cryptography. Callers seal or open bodies themselves
//! with `curvecp_crypto`, then hand the resulting ciphertext here to be
//! framed, or hand a received datagram here to be split into header and
//! sealed body before opening it.

use curvecp_types::{
    ClientMessageHeader, CookiePacket, DiscardReason, Extension, HelloPacket, InitiateHeader,
    InitiatePlaintextHeader, PacketKind, ServerMessageHeader, COOKIE_SEALED_LEN, MAGIC_CLIENT_MESSAGE,
    MAGIC_COOKIE, MAGIC_HELLO, MAGIC_INITIATE, MAGIC_SERVER_MESSAGE, MAX_UDP_PAYLOAD, MIN_UDP_PAYLOAD,
    SERVER_DOMAIN_LEN, VOUCH_SEALED_LEN,
};
use zerocopy::{AsBytes, FromBytes};

fn check_len(bytes: &[u8], kind: PacketKind) -> Result<(), DiscardReason> {
    if bytes.len() < MIN_UDP_PAYLOAD {
        return Err(DiscardReason::ShortPacket);
    }
    if bytes.len() > MAX_UDP_PAYLOAD {
        return Err(DiscardReason::OverlongPacket);
    }
    if kind.is_fixed_len() {
        if bytes.len() != kind.expected_len() {
            return Err(DiscardReason::WrongLength);
        }
    } else if bytes.len() < kind.expected_len() {
        return Err(DiscardReason::WrongLength);
    }
    Ok(())
}

/// Identify and length-check a datagram. Callers dispatch on the returned
/// kind to the matching `parse_*` function below.
pub fn identify(bytes: &[u8]) -> Result<PacketKind, DiscardReason> {
    if bytes.len() < MIN_UDP_PAYLOAD {
        return Err(DiscardReason::ShortPacket);
    }
    let kind = PacketKind::from_magic(bytes).ok_or(DiscardReason::UnknownMagic)?;
    check_len(bytes, kind)?;
    Ok(kind)
}

pub fn build_hello(
    sext: Extension,
    cext: Extension,
    client_short_term_pk: [u8; 32],
    nonce8: [u8; 8],
    sealed_zero: [u8; 80],
) -> [u8; curvecp_types::HELLO_PACKET_LEN] {
    let packet = HelloPacket {
        magic: MAGIC_HELLO,
        sext,
        cext,
        client_short_term_pk,
        zero_padding: [0u8; 64],
        nonce8,
        sealed_zero,
    };
    let mut out = [0u8; curvecp_types::HELLO_PACKET_LEN];
    out.copy_from_slice(packet.as_bytes());
    out
}

pub fn parse_hello(bytes: &[u8]) -> Result<HelloPacket, DiscardReason> {
    check_len(bytes, PacketKind::Hello)?;
    HelloPacket::read_from(bytes).ok_or(DiscardReason::WrongLength)
}

pub fn build_cookie(
    sext: Extension,
    cext: Extension,
    nonce16: [u8; 16],
    sealed_cookie: [u8; 144],
) -> [u8; curvecp_types::COOKIE_PACKET_LEN] {
    let packet = CookiePacket {
        magic: MAGIC_COOKIE,
        sext,
        cext,
        nonce16,
        sealed_cookie,
    };
    let mut out = [0u8; curvecp_types::COOKIE_PACKET_LEN];
    out.copy_from_slice(packet.as_bytes());
    out
}

pub fn parse_cookie(bytes: &[u8]) -> Result<CookiePacket, DiscardReason> {
    check_len(bytes, PacketKind::Cookie)?;
    CookiePacket::read_from(bytes).ok_or(DiscardReason::WrongLength)
}

pub struct ParsedInitiate<'a> {
    pub header: InitiateHeader,
    pub sealed_body: &'a [u8],
}

pub fn build_initiate(
    sext: Extension,
    cext: Extension,
    client_short_term_pk: [u8; 32],
    server_cookie: [u8; COOKIE_SEALED_LEN],
    nonce8: [u8; 8],
    sealed_body: &[u8],
) -> Vec<u8> {
    let header = InitiateHeader {
        magic: MAGIC_INITIATE,
        sext,
        cext,
        client_short_term_pk,
        server_cookie,
        nonce8,
    };
    let mut out = Vec::with_capacity(header.as_bytes().len() + sealed_body.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(sealed_body);
    out
}

pub fn parse_initiate(bytes: &[u8]) -> Result<ParsedInitiate<'_>, DiscardReason> {
    check_len(bytes, PacketKind::Initiate)?;
    let header_len = core::mem::size_of::<InitiateHeader>();
    let header = InitiateHeader::read_from(&bytes[..header_len]).ok_or(DiscardReason::WrongLength)?;
    Ok(ParsedInitiate {
        header,
        sealed_body: &bytes[header_len..],
    })
}

/// The structure sealed (under `K`) inside an Initiate's variable-length
/// body, followed immediately by the opaque stream payload.
pub struct ParsedInitiatePlaintext<'a> {
    pub header: InitiatePlaintextHeader,
    pub payload: &'a [u8],
}

pub fn build_initiate_plaintext(
    client_long_term_pk: [u8; 32],
    vouch_nonce: [u8; 16],
    sealed_vouch: [u8; VOUCH_SEALED_LEN],
    server_domain: [u8; SERVER_DOMAIN_LEN],
    payload: &[u8],
) -> Vec<u8> {
    let header = InitiatePlaintextHeader {
        client_long_term_pk,
        vouch_nonce,
        sealed_vouch,
        server_domain,
    };
    let mut out = Vec::with_capacity(header.as_bytes().len() + payload.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn parse_initiate_plaintext(bytes: &[u8]) -> Result<ParsedInitiatePlaintext<'_>, DiscardReason> {
    let header_len = core::mem::size_of::<InitiatePlaintextHeader>();
    if bytes.len() < header_len {
        return Err(DiscardReason::WrongLength);
    }
    let header =
        InitiatePlaintextHeader::read_from(&bytes[..header_len]).ok_or(DiscardReason::WrongLength)?;
    Ok(ParsedInitiatePlaintext {
        header,
        payload: &bytes[header_len..],
    })
}

pub struct ParsedClientMessage<'a> {
    pub header: ClientMessageHeader,
    pub sealed_body: &'a [u8],
}

pub fn build_client_message(
    sext: Extension,
    cext: Extension,
    client_short_term_pk: [u8; 32],
    nonce8: [u8; 8],
    sealed_body: &[u8],
) -> Vec<u8> {
    let header = ClientMessageHeader {
        magic: MAGIC_CLIENT_MESSAGE,
        sext,
        cext,
        client_short_term_pk,
        nonce8,
    };
    let mut out = Vec::with_capacity(header.as_bytes().len() + sealed_body.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(sealed_body);
    out
}

pub fn parse_client_message(bytes: &[u8]) -> Result<ParsedClientMessage<'_>, DiscardReason> {
    check_len(bytes, PacketKind::ClientMessage)?;
    let header_len = core::mem::size_of::<ClientMessageHeader>();
    let header =
        ClientMessageHeader::read_from(&bytes[..header_len]).ok_or(DiscardReason::WrongLength)?;
    Ok(ParsedClientMessage {
        header,
        sealed_body: &bytes[header_len..],
    })
}

pub struct ParsedServerMessage<'a> {
    pub header: ServerMessageHeader,
    pub sealed_body: &'a [u8],
}

pub fn build_server_message(
    sext: Extension,
    cext: Extension,
    nonce8: [u8; 8],
    sealed_body: &[u8],
) -> Vec<u8> {
    let header = ServerMessageHeader {
        magic: MAGIC_SERVER_MESSAGE,
        sext,
        cext,
        nonce8,
    };
    let mut out = Vec::with_capacity(header.as_bytes().len() + sealed_body.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(sealed_body);
    out
}

pub fn parse_server_message(bytes: &[u8]) -> Result<ParsedServerMessage<'_>, DiscardReason> {
    check_len(bytes, PacketKind::ServerMessage)?;
    let header_len = core::mem::size_of::<ServerMessageHeader>();
    let header =
        ServerMessageHeader::read_from(&bytes[..header_len]).ok_or(DiscardReason::WrongLength)?;
    Ok(ParsedServerMessage {
        header,
        sealed_body: &bytes[header_len..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trips() {
        let bytes = build_hello([1; 16], [2; 16], [3; 32], [0; 8], [4; 80]);
        let parsed = parse_hello(&bytes).unwrap();
        assert_eq!(parsed.client_short_term_pk, [3; 32]);
        assert_eq!(parsed.sealed_zero, [4; 80]);
    }

    #[test]
    fn cookie_round_trips() {
        let bytes = build_cookie([1; 16], [2; 16], [5; 16], [6; 144]);
        let parsed = parse_cookie(&bytes).unwrap();
        assert_eq!(parsed.nonce16, [5; 16]);
    }

    #[test]
    fn initiate_round_trips_with_variable_body() {
        let body = vec![9u8; 400];
        let bytes = build_initiate([1; 16], [2; 16], [3; 32], [7; 96], [0; 8], &body);
        let parsed = parse_initiate(&bytes).unwrap();
        assert_eq!(parsed.header.client_short_term_pk, [3; 32]);
        assert_eq!(parsed.sealed_body, &body[..]);
    }

    #[test]
    fn initiate_plaintext_round_trips_with_payload() {
        let payload = b"hello, stream";
        let bytes = build_initiate_plaintext([1; 32], [2; 16], [3; 48], [0u8; SERVER_DOMAIN_LEN], payload);
        let parsed = parse_initiate_plaintext(&bytes).unwrap();
        assert_eq!(parsed.header.client_long_term_pk, [1; 32]);
        assert_eq!(parsed.payload, payload);
    }

    #[test]
    fn client_message_round_trips() {
        let body = vec![1u8; 32];
        let bytes = build_client_message([1; 16], [2; 16], [3; 32], [0; 8], &body);
        let parsed = parse_client_message(&bytes).unwrap();
        assert_eq!(parsed.sealed_body, &body[..]);
    }

    #[test]
    fn server_message_round_trips() {
        let body = vec![1u8; 32];
        let bytes = build_server_message([1; 16], [2; 16], [0; 8], &body);
        let parsed = parse_server_message(&bytes).unwrap();
        assert_eq!(parsed.sealed_body, &body[..]);
    }

    #[test]
    fn short_packet_is_rejected() {
        assert_eq!(identify(&[0u8; 10]), Err(DiscardReason::ShortPacket));
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let mut bytes = vec![0u8; MIN_UDP_PAYLOAD];
        bytes[..8].copy_from_slice(b"xxxxxxxx");
        assert_eq!(identify(&bytes), Err(DiscardReason::UnknownMagic));
    }
}
