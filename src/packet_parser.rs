//! Locating the IP packet inside captured frames.
//!
//! Frames come from live interfaces and PCAP files with different datalink
//! headers; each strategy below is tried in turn:
//! - Ethernet (14 byte header)
//! - Raw IP (no datalink header)
//! - NULL/loopback (4 byte header)
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use tracing::trace;

const ETHERNET_HEADER_LEN: usize = 14;
const NULL_HEADER_LEN: usize = 4;
const IPV4_MIN_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const NULL_FAMILIES: [u32; 4] = [2, 24, 28, 30];

/// IP packet bytes found in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpPacket<'a> {
    Ipv4(&'a [u8]),
    Ipv6(&'a [u8]),
    None,
}

impl<'a> IpPacket<'a> {
    pub fn bytes(&self) -> Option<&'a [u8]> {
        match self {
            IpPacket::Ipv4(bytes) | IpPacket::Ipv6(bytes) => Some(bytes),
            IpPacket::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatalinkFormat {
    Ethernet,
    RawIp,
    /// BSD loopback with a 4 byte family header
    Null,
}

/// Find the IP packet in a frame, trying Ethernet, raw IP and NULL in that order.
pub fn parse_packet(frame: &[u8]) -> IpPacket<'_> {
    try_ethernet(frame)
        .or_else(|| try_raw_ip(frame))
        .or_else(|| try_null(frame))
        .unwrap_or(IpPacket::None)
}

/// Datalink format of a frame, without extracting the IP packet.
pub fn detect_datalink_format(frame: &[u8]) -> Option<DatalinkFormat> {
    if try_ethernet(frame).is_some() {
        Some(DatalinkFormat::Ethernet)
    } else if try_raw_ip(frame).is_some() {
        Some(DatalinkFormat::RawIp)
    } else if try_null(frame).is_some() {
        Some(DatalinkFormat::Null)
    } else {
        None
    }
}

fn ip_by_version(data: &[u8]) -> Option<IpPacket<'_>> {
    match data.first()? >> 4 {
        4 if data.len() >= IPV4_MIN_LEN => {
            let header_len = usize::from(data[0] & 0x0f) * 4;
            (header_len >= IPV4_MIN_LEN && data.len() >= header_len).then_some(IpPacket::Ipv4(data))
        }
        6 if data.len() >= IPV6_HEADER_LEN => Some(IpPacket::Ipv6(data)),
        _ => None,
    }
}

fn try_ethernet(frame: &[u8]) -> Option<IpPacket<'_>> {
    let ethernet = EthernetPacket::new(frame)?;
    let ip = frame.get(ETHERNET_HEADER_LEN..)?;

    let parsed = match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => match ip_by_version(ip)? {
            p @ IpPacket::Ipv4(_) => p,
            _ => return None,
        },
        EtherTypes::Ipv6 => match ip_by_version(ip)? {
            p @ IpPacket::Ipv6(_) => p,
            _ => return None,
        },
        _ => return None,
    };
    trace!("Ethernet frame carrying {} IP bytes", ip.len());
    Some(parsed)
}

fn try_raw_ip(frame: &[u8]) -> Option<IpPacket<'_>> {
    let parsed = ip_by_version(frame)?;
    trace!("Raw IP frame of {} bytes", frame.len());
    Some(parsed)
}

fn try_null(frame: &[u8]) -> Option<IpPacket<'_>> {
    let (header, ip) = frame.split_first_chunk::<NULL_HEADER_LEN>()?;
    // Host byte order; AF_INET is 2, AF_INET6 is 24, 28 or 30 depending on the BSD
    let family = u32::from_le_bytes(*header);
    if !NULL_FAMILIES.contains(&family) && !NULL_FAMILIES.contains(&family.swap_bytes()) {
        return None;
    }
    let parsed = ip_by_version(ip)?;
    trace!("NULL datalink frame of {} bytes", frame.len());
    Some(parsed)
}
