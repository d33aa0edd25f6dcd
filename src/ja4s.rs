use crate::error::Ja4PlusError;
use crate::grease::is_grease_value;
use crate::hasher::FingerprintHasher;
use crate::session::Transport;
use crate::tls::{alpn_tag, version_code};
use nom::bytes::complete::take;
use nom::error::Error;
use nom::multi::length_data;
use nom::number::complete::{be_u16, be_u8};
use nom::{IResult, Parser};
use tracing::{debug, trace};

/// Maximum number of extension types recorded for one ServerHello
pub const MAX_EXTENSIONS: usize = 256;

pub const EXT_ALPN: u16 = 0x0010;
pub const EXT_SUPPORTED_VERSIONS: u16 = 0x002b;

const RANDOM_LEN: usize = 32;

/// Fields of a ServerHello that take part in JA4S.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHelloSignature {
    /// Version from the fixed ServerHello header
    pub legacy_version: u16,
    /// Version used for the fingerprint, raised by `supported_versions`
    pub version: u16,
    pub cipher_suite: u16,
    /// Non-GREASE extension types in wire order
    pub extensions: Vec<u16>,
    /// First and last character of the negotiated ALPN protocol
    pub alpn: [u8; 2],
}

/// JA4S fingerprint in its hashed and raw forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ja4sPayload {
    /// JA4S_a: transport + version + extension count + ALPN
    pub ja4s_a: String,
    /// JA4S_b: selected cipher suite as 4 hex digits
    pub ja4s_b: String,
    /// JA4S_c before hashing: comma-joined extension types
    pub ja4s_c: String,
    /// `ja4s_a` + `_` + `ja4s_b` + `_` + hash12(`ja4s_c`), always 25 characters
    pub full: String,
    /// `ja4s_a` + `_` + `ja4s_b` + `_` + `ja4s_c`
    pub raw: String,
}

fn u16_field(input: &[u8]) -> IResult<&[u8], u16> {
    be_u16(input)
}

/// Extract the first protocol name of an ALPN extension body.
fn parse_alpn(body: &[u8]) -> Option<[u8; 2]> {
    let (rest, _list_len) = take::<_, _, Error<&[u8]>>(2usize).parse(body).ok()?;
    let (_, protocol) = length_data(be_u8::<_, Error<&[u8]>>).parse(rest).ok()?;
    if protocol.is_empty() {
        return None;
    }
    Some(alpn_tag(protocol))
}

/// Parse a ServerHello handshake body (after the 4-byte handshake header).
///
/// Any read failure up to and including the cipher suite aborts with an error.
/// After that point anomalies only shorten the extension list.
pub fn parse_server_hello(data: &[u8]) -> Result<ServerHelloSignature, Ja4PlusError> {
    let (rest, legacy_version) =
        u16_field(data).map_err(|_| Ja4PlusError::Truncated("ServerHello version"))?;
    let (mut rest, _random) = take::<_, _, Error<&[u8]>>(RANDOM_LEN)
        .parse(rest)
        .map_err(|_| Ja4PlusError::Truncated("ServerHello random"))?;

    // Session id is only present for SSLv3 through TLS 1.2 framing
    if (0x0300..=0x0303).contains(&legacy_version) {
        let (after, _session_id) = length_data(be_u8::<_, Error<&[u8]>>)
            .parse(rest)
            .map_err(|_| Ja4PlusError::Truncated("ServerHello session id"))?;
        rest = after;
    }

    let (rest, cipher_suite) =
        u16_field(rest).map_err(|_| Ja4PlusError::Truncated("ServerHello cipher suite"))?;

    // No compression method with TLS 1.3 before draft 22
    let rest = if legacy_version < 0x0700 || legacy_version >= 0x7f16 {
        rest.get(1..).unwrap_or_default()
    } else {
        rest
    };

    let mut signature = ServerHelloSignature {
        legacy_version,
        version: legacy_version,
        cipher_suite,
        extensions: Vec::new(),
        alpn: [b'0', b'0'],
    };

    if rest.len() >= 2 {
        let total = usize::from(u16::from_be_bytes([rest[0], rest[1]]));
        let body = &rest[2..];
        parse_extensions(&body[..total.min(body.len())], &mut signature);
    }

    trace!(
        "ServerHello parsed: version={:#06x}, cipher={:#06x}, extensions={}",
        signature.version,
        signature.cipher_suite,
        signature.extensions.len()
    );
    Ok(signature)
}

fn parse_extensions(mut data: &[u8], signature: &mut ServerHelloSignature) {
    while !data.is_empty() {
        let Ok((rest, (ext_type, ext_len))) = (u16_field, u16_field).parse(data) else {
            debug!("Truncated extension header, {} bytes left", data.len());
            break;
        };
        let ext_len = usize::from(ext_len);

        if is_grease_value(u32::from(ext_type)) {
            match rest.get(ext_len..) {
                Some(after) => {
                    data = after;
                    continue;
                }
                None => break,
            }
        }

        if signature.extensions.len() < MAX_EXTENSIONS {
            signature.extensions.push(ext_type);
        }

        if ext_len > rest.len() {
            debug!("Extension {ext_type:#06x} overruns its container ({ext_len} > {})", rest.len());
            break;
        }
        let (body, after) = rest.split_at(ext_len);
        data = after;

        match ext_type {
            EXT_SUPPORTED_VERSIONS if ext_len == 2 => {
                let selected = u16::from_be_bytes([body[0], body[1]]);
                signature.version = signature.legacy_version.max(selected);
            }
            EXT_ALPN => {
                if let Some(alpn) = parse_alpn(body) {
                    signature.alpn = alpn;
                }
            }
            _ => {}
        }
    }
}

impl ServerHelloSignature {
    /// Generate the JA4S fingerprint.
    ///
    /// The extension count saturates at 99 and an empty extension list hashes to
    /// twelve zeros.
    pub fn generate_ja4s(&self, transport: Transport, hasher: &mut FingerprintHasher) -> Ja4sPayload {
        let ja4s_a = format!(
            "{}{}{:02}{}{}",
            transport.ja4_marker(),
            version_code(self.version),
            self.extensions.len().min(99),
            char::from(self.alpn[0]),
            char::from(self.alpn[1]),
        );
        let ja4s_b = format!("{:04x}", self.cipher_suite);
        let ja4s_c = self
            .extensions
            .iter()
            .map(|e| format!("{e:04x}"))
            .collect::<Vec<String>>()
            .join(",");

        let full = format!("{ja4s_a}_{ja4s_b}_{}", hasher.hash12(ja4s_c.as_bytes()));
        let raw = format!("{ja4s_a}_{ja4s_b}_{ja4s_c}");

        Ja4sPayload { ja4s_a, ja4s_b, ja4s_c, full, raw }
    }
}
