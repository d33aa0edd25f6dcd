use crate::error::Ja4PlusError;
use nom::bytes::complete::take;
use nom::number::complete::{be_u24, be_u8};
use nom::{IResult, Parser};
use std::fmt;
use tls_parser::{parse_tls_raw_record, TlsRecordType};
use tracing::debug;

/// Handshake message type of a ServerHello
pub const HANDSHAKE_SERVER_HELLO: u8 = 0x02;
/// Handshake message type of a Certificate message
pub const HANDSHAKE_CERTIFICATE: u8 = 0x0b;
/// Handshake message type closing the server flight of TLS 1.2 and earlier
pub const HANDSHAKE_SERVER_HELLO_DONE: u8 = 0x0e;

/// TLS version as it appears in JA4+ fingerprints.
/// Includes legacy SSL versions so every wire value maps onto one of the fixed codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlsVersion {
    V1_3,
    V1_2,
    V1_1,
    V1_0,
    Ssl3_0,
    Ssl2_0,
    Ssl1_0,
    Unknown(u16),
}

impl From<u16> for TlsVersion {
    fn from(version: u16) -> Self {
        match version {
            0x0304 => TlsVersion::V1_3,
            0x0303 => TlsVersion::V1_2,
            0x0302 => TlsVersion::V1_1,
            0x0301 => TlsVersion::V1_0,
            0x0300 => TlsVersion::Ssl3_0,
            0x0200 => TlsVersion::Ssl2_0,
            0x0100 => TlsVersion::Ssl1_0,
            // TLS 1.3 drafts (0x7fxx) included
            other => TlsVersion::Unknown(other),
        }
    }
}

impl TlsVersion {
    /// Two character version code used in the first JA4S section.
    pub fn code(&self) -> &'static str {
        match self {
            TlsVersion::V1_3 => "13",
            TlsVersion::V1_2 => "12",
            TlsVersion::V1_1 => "11",
            TlsVersion::V1_0 => "10",
            TlsVersion::Ssl3_0 => "s3",
            TlsVersion::Ssl2_0 => "s2",
            TlsVersion::Ssl1_0 => "s1",
            TlsVersion::Unknown(_) => "00",
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Canonical two character code for a raw version number.
pub fn version_code(version: u16) -> &'static str {
    TlsVersion::from(version).code()
}

/// Build the two character ALPN tag from the first and last byte of a protocol name.
///
/// Bytes outside printable ASCII are replaced by `'9'`; an empty name yields `"00"`.
pub fn alpn_tag(protocol: &[u8]) -> [u8; 2] {
    let printable = |b: u8| if b.is_ascii_graphic() { b } else { b'9' };
    match (protocol.first(), protocol.last()) {
        (Some(&first), Some(&last)) => [printable(first), printable(last)],
        _ => [b'0', b'0'],
    }
}

/// One handshake message found inside a TLS record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeMessage<'a> {
    pub msg_type: u8,
    /// Message body, without the type/length header
    pub body: &'a [u8],
}

pub(crate) fn handshake_message(input: &[u8]) -> IResult<&[u8], HandshakeMessage<'_>> {
    let (input, msg_type) = be_u8(input)?;
    let (input, len) = be_u24(input)?;
    let (input, body) = take(len as usize).parse(input)?;
    Ok((input, HandshakeMessage { msg_type, body }))
}

/// Collect the complete handshake messages carried by the TLS records of a payload.
///
/// Parsing stops at the first record that is incomplete or not a handshake record,
/// and at the first handshake message that overruns its record.
pub fn handshake_messages(payload: &[u8]) -> Vec<HandshakeMessage<'_>> {
    let mut messages = Vec::new();
    let mut rest = payload;

    while !rest.is_empty() {
        let (remaining, record) = match parse_tls_raw_record(rest) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Could not parse TLS record (len={}): {:?}", rest.len(), e);
                break;
            }
        };
        rest = remaining;

        if record.hdr.record_type != TlsRecordType::Handshake {
            debug!("Skipping non-handshake TLS record: {:?}", record.hdr.record_type);
            break;
        }

        let mut data = record.data;
        while !data.is_empty() {
            match handshake_message(data) {
                Ok((remaining, message)) => {
                    messages.push(message);
                    data = remaining;
                }
                Err(_) => {
                    debug!("Handshake message overruns its record, {} bytes left", data.len());
                    break;
                }
            }
        }
    }

    messages
}

/// Find the first handshake message of a given type in a TLS payload.
pub fn find_handshake_body(payload: &[u8], msg_type: u8) -> Result<&[u8], Ja4PlusError> {
    handshake_messages(payload)
        .into_iter()
        .find(|m| m.msg_type == msg_type)
        .map(|m| m.body)
        .ok_or_else(|| {
            Ja4PlusError::Parse(format!("No handshake message of type {msg_type:#04x} found"))
        })
}

/// Detect a TLS handshake record based on packet content only
#[inline(always)]
pub fn is_tls_handshake(payload: &[u8]) -> bool {
    if payload.len() < 5 || payload[0] != 0x16 {
        return false;
    }
    let version = u16::from_be_bytes([payload[1], payload[2]]);
    (0x0300..=0x0304).contains(&version)
}

/// Body of the first ServerHello carried by the TLS records of a payload.
pub fn server_hello_body(payload: &[u8]) -> Result<&[u8], Ja4PlusError> {
    find_handshake_body(payload, HANDSHAKE_SERVER_HELLO)
}

/// Body of the first Certificate message carried by the TLS records of a payload.
pub fn certificate_message_body(payload: &[u8]) -> Result<&[u8], Ja4PlusError> {
    find_handshake_body(payload, HANDSHAKE_CERTIFICATE)
}
