#![allow(dead_code)]

use pnet::packet::tcp::TcpFlags;

pub const CLIENT_IP: [u8; 4] = [192, 168, 1, 10];
pub const SERVER_IP: [u8; 4] = [93, 184, 216, 34];
pub const CLIENT_PORT: u16 = 51000;

/// SYN-ACK options from a common Linux stack: MSS 1460, NOP, NOP, SACK permitted,
/// window scale 7, end of options.
pub const LINUX_OPTIONS: [u8; 12] = [
    0x02, 0x04, 0x05, 0xb4, // MSS 1460
    0x01, 0x01, // NOP NOP
    0x04, 0x02, // SACK permitted
    0x03, 0x03, 0x07, // Window scale 7
    0x00, // EOL
];

pub const SYN: u8 = TcpFlags::SYN;
pub const SYN_ACK: u8 = TcpFlags::SYN | TcpFlags::ACK;
pub const ACK: u8 = TcpFlags::ACK;
pub const PSH_ACK: u8 = TcpFlags::PSH | TcpFlags::ACK;
pub const FIN_ACK: u8 = TcpFlags::FIN | TcpFlags::ACK;
pub const RST: u8 = TcpFlags::RST;

/// Parameters of one synthetic TCP segment.
pub struct Segment<'a> {
    pub src: [u8; 4],
    pub dst: [u8; 4],
    pub src_port: u16,
    pub dst_port: u16,
    pub flags: u8,
    pub ttl: u8,
    pub window: u16,
    pub options: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> Segment<'a> {
    pub fn client(server_port: u16, flags: u8) -> Self {
        Self {
            src: CLIENT_IP,
            dst: SERVER_IP,
            src_port: CLIENT_PORT,
            dst_port: server_port,
            flags,
            ttl: 64,
            window: 64240,
            options: &[],
            payload: &[],
        }
    }

    pub fn server(server_port: u16, flags: u8) -> Self {
        Self {
            src: SERVER_IP,
            dst: CLIENT_IP,
            src_port: server_port,
            dst_port: CLIENT_PORT,
            flags,
            ttl: 52,
            window: 65160,
            options: &[],
            payload: &[],
        }
    }

    pub fn options(mut self, options: &'a [u8]) -> Self {
        self.options = options;
        self
    }

    pub fn payload(mut self, payload: &'a [u8]) -> Self {
        self.payload = payload;
        self
    }

    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    /// IPv4 + TCP bytes. Options are padded with EOL to a multiple of 4.
    pub fn ipv4(&self) -> Vec<u8> {
        let mut options = self.options.to_vec();
        while options.len() % 4 != 0 {
            options.push(0);
        }
        let tcp_len = 20 + options.len();
        let total_len = 20 + tcp_len + self.payload.len();

        let mut packet = Vec::with_capacity(total_len);
        packet.extend_from_slice(&[0x45, 0x00]);
        packet.extend_from_slice(&(total_len as u16).to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x01, 0x40, 0x00]);
        packet.extend_from_slice(&[self.ttl, 0x06, 0x00, 0x00]);
        packet.extend_from_slice(&self.src);
        packet.extend_from_slice(&self.dst);

        packet.extend_from_slice(&self.src_port.to_be_bytes());
        packet.extend_from_slice(&self.dst_port.to_be_bytes());
        packet.extend_from_slice(&1u32.to_be_bytes()); // sequence
        packet.extend_from_slice(&1u32.to_be_bytes()); // acknowledgement
        packet.push(((tcp_len / 4) as u8) << 4);
        packet.push(self.flags);
        packet.extend_from_slice(&self.window.to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // checksum, urgent
        packet.extend_from_slice(&options);
        packet.extend_from_slice(self.payload);
        packet
    }

    /// Ethernet framed IPv4 packet.
    pub fn frame(&self) -> Vec<u8> {
        let mut frame = vec![
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, // destination MAC
            0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, // source MAC
            0x08, 0x00, // IPv4
        ];
        frame.extend_from_slice(&self.ipv4());
        frame
    }
}

/// ServerHello body. A 32 byte session id is included for TLS 1.2 framing.
pub fn server_hello(legacy_version: u16, cipher: u16, extensions: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut body = legacy_version.to_be_bytes().to_vec();
    body.extend_from_slice(&[0x42; 32]);
    if (0x0300..=0x0303).contains(&legacy_version) {
        body.push(32);
        body.extend_from_slice(&[0x17; 32]);
    }
    body.extend_from_slice(&cipher.to_be_bytes());
    body.push(0x00); // compression method

    let mut ext_bytes = Vec::new();
    for (ext_type, data) in extensions {
        ext_bytes.extend_from_slice(&ext_type.to_be_bytes());
        ext_bytes.extend_from_slice(&(data.len() as u16).to_be_bytes());
        ext_bytes.extend_from_slice(data);
    }
    body.extend_from_slice(&(ext_bytes.len() as u16).to_be_bytes());
    body.extend_from_slice(&ext_bytes);
    body
}

/// ALPN extension body carrying the given protocol names.
pub fn alpn(protocols: &[&[u8]]) -> Vec<u8> {
    let mut list = Vec::new();
    for protocol in protocols {
        list.push(protocol.len() as u8);
        list.extend_from_slice(protocol);
    }
    let mut body = (list.len() as u16).to_be_bytes().to_vec();
    body.extend_from_slice(&list);
    body
}

/// Handshake message: type, 24-bit length, body.
pub fn handshake(msg_type: u8, body: &[u8]) -> Vec<u8> {
    let len = body.len() as u32;
    let mut message = vec![msg_type];
    message.extend_from_slice(&len.to_be_bytes()[1..]);
    message.extend_from_slice(body);
    message
}

/// TLS record with a TLS 1.2 record version.
pub fn record(content_type: u8, fragment: &[u8]) -> Vec<u8> {
    let mut record = vec![content_type, 0x03, 0x03];
    record.extend_from_slice(&(fragment.len() as u16).to_be_bytes());
    record.extend_from_slice(fragment);
    record
}

/// DER element with a definite length.
pub fn der(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xff {
        out.extend_from_slice(&[0x81, len as u8]);
    } else {
        out.push(0x82);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    }
    out.extend_from_slice(content);
    out
}

pub fn sequence(items: &[Vec<u8>]) -> Vec<u8> {
    der(0x30, &items.concat())
}

pub fn set(items: &[Vec<u8>]) -> Vec<u8> {
    der(0x31, &items.concat())
}

pub const OID_COUNTRY: &[u8] = &[0x55, 0x04, 0x06];
pub const OID_ORGANIZATION: &[u8] = &[0x55, 0x04, 0x0a];
pub const OID_COMMON_NAME: &[u8] = &[0x55, 0x04, 0x03];
pub const OID_KEY_USAGE: &[u8] = &[0x55, 0x1d, 0x0f];
pub const OID_SUBJECT_ALT_NAME: &[u8] = &[0x55, 0x1d, 0x11];
pub const OID_SHA256_RSA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0b];
pub const OID_RSA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];

/// Distinguished name with one `SET { SEQUENCE { oid, PrintableString } }` per attribute.
pub fn name(attributes: &[(&[u8], &str)]) -> Vec<u8> {
    let rdns = attributes
        .iter()
        .map(|(oid, value)| set(&[sequence(&[der(0x06, oid), der(0x13, value.as_bytes())])]))
        .collect::<Vec<_>>();
    sequence(&rdns)
}

/// X.509 v3 certificate with the given issuer, subject and extension OIDs.
pub fn certificate(
    issuer: &[(&[u8], &str)],
    subject: &[(&[u8], &str)],
    extensions: &[&[u8]],
) -> Vec<u8> {
    let algorithm = sequence(&[der(0x06, OID_SHA256_RSA), der(0x05, &[])]);
    let validity = sequence(&[
        der(0x17, b"240101000000Z"),
        der(0x17, b"250101000000Z"),
    ]);
    let spki = sequence(&[
        sequence(&[der(0x06, OID_RSA), der(0x05, &[])]),
        der(0x03, &[0x00, 0x30, 0x03, 0x02, 0x01, 0x01]),
    ]);

    let mut tbs_items = vec![
        der(0xa0, &der(0x02, &[0x02])), // version v3
        der(0x02, &[0x01, 0x23, 0x45]), // serial
        algorithm.clone(),
        name(issuer),
        validity,
        name(subject),
        spki,
    ];
    if !extensions.is_empty() {
        let entries = extensions
            .iter()
            .map(|oid| sequence(&[der(0x06, oid), der(0x04, &der(0x30, &[]))]))
            .collect::<Vec<_>>();
        tbs_items.push(der(0xa3, &sequence(&entries)));
    }

    sequence(&[sequence(&tbs_items), algorithm, der(0x03, &[0x00, 0xde, 0xad])])
}

/// Certificate handshake body: 24-bit list length, then 24-bit length + DER per entry.
pub fn certificate_list(certificates: &[Vec<u8>]) -> Vec<u8> {
    let mut list = Vec::new();
    for cert in certificates {
        list.extend_from_slice(&(cert.len() as u32).to_be_bytes()[1..]);
        list.extend_from_slice(cert);
    }
    let mut body = (list.len() as u32).to_be_bytes()[1..].to_vec();
    body.extend_from_slice(&list);
    body
}

pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
