use crate::error::Ja4PlusError;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::{TcpFlags, TcpPacket};
use pnet::packet::Packet;
use std::fmt;
use std::net::IpAddr;

pub const TCPOPT_EOL: u8 = 0;
pub const TCPOPT_NOP: u8 = 1;
pub const TCPOPT_MSS: u8 = 2;
pub const TCPOPT_WSCALE: u8 = 3;

const MICROS_PER_SECOND: u64 = 1_000_000;

/// Window size and option layout of a SYN or SYN-ACK, the common part of JA4T.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpOptionsSignature {
    pub window: u16,
    /// Option kinds in wire order, including NOP and a terminating EOL
    pub options: Vec<u8>,
    pub mss: Option<u16>,
    pub window_scale: Option<u8>,
}

impl TcpOptionsSignature {
    /// Walk the TCP options area.
    ///
    /// EOL ends the walk, NOP has no length byte, a length below 2 or an option
    /// running past the area stops the walk with what was collected so far.
    pub fn parse(window: u16, mut options: &[u8]) -> Self {
        let mut kinds = Vec::new();
        let mut mss = None;
        let mut window_scale = None;

        while let Some((&kind, rest)) = options.split_first() {
            kinds.push(kind);
            options = rest;

            match kind {
                TCPOPT_EOL => break,
                TCPOPT_NOP => continue,
                _ => {}
            }

            let Some((&size, rest)) = options.split_first() else {
                break;
            };
            if size < 2 {
                break;
            }

            let data_len = usize::from(size - 2);
            let data = &rest[..data_len.min(rest.len())];
            match kind {
                TCPOPT_MSS if data.len() >= 2 => {
                    mss = Some(u16::from_be_bytes([data[0], data[1]]));
                }
                TCPOPT_WSCALE if !data.is_empty() => {
                    window_scale = Some(data[0]);
                }
                _ => {}
            }

            match rest.get(data_len..) {
                Some(after) => options = after,
                None => break,
            }
        }

        Self { window, options: kinds, mss, window_scale }
    }

    /// JA4TS: the common layout followed by the SYN-ACK retransmission gaps.
    ///
    /// With two or more SYN-ACKs, `_` and the `-`-joined whole-second deltas between
    /// consecutive SYN-ACK timestamps (in microseconds) are appended.
    pub fn ja4ts(&self, syn_ack_times: &[u64]) -> String {
        let mut out = self.to_string();
        if syn_ack_times.len() > 1 {
            let deltas = syn_ack_times
                .windows(2)
                .map(|pair| (pair[1].saturating_sub(pair[0]) / MICROS_PER_SECOND).to_string())
                .collect::<Vec<String>>()
                .join("-");
            out.push('_');
            out.push_str(&deltas);
        }
        out
    }

    /// JA4TC: the common layout only.
    pub fn ja4tc(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TcpOptionsSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_", self.window)?;
        if self.options.is_empty() {
            f.write_str("00")?;
        } else {
            let layout = self
                .options
                .iter()
                .map(|o| o.to_string())
                .collect::<Vec<String>>()
                .join("-");
            f.write_str(&layout)?;
        }
        match self.mss {
            Some(mss) => write!(f, "_{mss}")?,
            None => f.write_str("_00")?,
        }
        match self.window_scale {
            Some(ws) => write!(f, "_{ws}"),
            None => f.write_str("_00"),
        }
    }
}

/// The fields of one TCP/IP packet that the JA4T and JA4L logic reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment {
    pub source: IpAddr,
    pub destination: IpAddr,
    pub source_port: u16,
    pub destination_port: u16,
    pub flags: u8,
    /// IPv4 TTL or IPv6 hop limit
    pub ttl: u8,
    pub window: u16,
    pub options: Vec<u8>,
    payload_offset: usize,
    payload_len: usize,
}

impl TcpSegment {
    /// Decode a TCP segment from the bytes of an IPv4 or IPv6 packet.
    pub fn from_ip_packet(ip: &[u8]) -> Result<Self, Ja4PlusError> {
        let version = ip.first().map(|b| b >> 4);
        match version {
            Some(4) => {
                let ipv4 = Ipv4Packet::new(ip)
                    .ok_or_else(|| Ja4PlusError::Parse("IPv4 packet too short".to_string()))?;
                if ipv4.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
                    return Err(Ja4PlusError::UnsupportedProtocol(format!(
                        "IPv4 next protocol {:?}",
                        ipv4.get_next_level_protocol()
                    )));
                }
                let header_len = usize::from(ipv4.get_header_length()) * 4;
                Self::from_tcp(
                    ipv4.payload(),
                    IpAddr::V4(ipv4.get_source()),
                    IpAddr::V4(ipv4.get_destination()),
                    ipv4.get_ttl(),
                    header_len,
                )
            }
            Some(6) => {
                let ipv6 = Ipv6Packet::new(ip)
                    .ok_or_else(|| Ja4PlusError::Parse("IPv6 packet too short".to_string()))?;
                if ipv6.get_next_header() != IpNextHeaderProtocols::Tcp {
                    return Err(Ja4PlusError::UnsupportedProtocol(format!(
                        "IPv6 next header {:?}",
                        ipv6.get_next_header()
                    )));
                }
                Self::from_tcp(
                    ipv6.payload(),
                    IpAddr::V6(ipv6.get_source()),
                    IpAddr::V6(ipv6.get_destination()),
                    ipv6.get_hop_limit(),
                    40,
                )
            }
            _ => Err(Ja4PlusError::UnsupportedProtocol(format!("IP version {version:?}"))),
        }
    }

    fn from_tcp(
        bytes: &[u8],
        source: IpAddr,
        destination: IpAddr,
        ttl: u8,
        ip_header_len: usize,
    ) -> Result<Self, Ja4PlusError> {
        let tcp = TcpPacket::new(bytes)
            .ok_or_else(|| Ja4PlusError::Parse("TCP packet too short".to_string()))?;
        let tcp_header_len = (usize::from(tcp.get_data_offset()) * 4).min(bytes.len());

        Ok(Self {
            source,
            destination,
            source_port: tcp.get_source(),
            destination_port: tcp.get_destination(),
            flags: tcp.get_flags(),
            ttl,
            window: tcp.get_window(),
            options: tcp.get_options_raw().to_vec(),
            payload_offset: ip_header_len + tcp_header_len,
            payload_len: tcp.payload().len(),
        })
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Slice the TCP payload out of the IP packet this segment was decoded from.
    pub fn payload<'a>(&self, ip: &'a [u8]) -> &'a [u8] {
        ip.get(self.payload_offset..)
            .and_then(|rest| rest.get(..self.payload_len))
            .unwrap_or_default()
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn is_syn(&self) -> bool {
        self.has_flag(TcpFlags::SYN)
    }

    pub fn is_ack(&self) -> bool {
        self.has_flag(TcpFlags::ACK)
    }

    pub fn options_signature(&self) -> TcpOptionsSignature {
        TcpOptionsSignature::parse(self.window, &self.options)
    }
}
