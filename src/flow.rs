//! Flow tracking for the capture driver.
//!
//! Every TCP flow gets a [`Session`] keyed by its endpoints. Packets of the flow
//! are routed to the JA4+ hooks from here.

use crate::error::Ja4PlusError;
use crate::handshake_reader::ServerHandshakeReader;
use crate::ja4x::split_certificate_chain;
use crate::output::{FingerprintOutput, IpPort};
use crate::packet_parser::parse_packet;
use crate::process::{Ja4Plus, ParserInput, TcpPacketEvent};
use crate::session::{Direction, Session, Transport};
use crate::tcp::TcpSegment;
use crate::tls::{is_tls_handshake, HANDSHAKE_CERTIFICATE, HANDSHAKE_SERVER_HELLO};
use pnet::packet::tcp::TcpFlags;
use std::time::Duration;
use tracing::{debug, trace};
use ttl_cache::TtlCache;

pub const SSH_PORT: u16 = 22;
const SSH_BANNER: &[u8] = b"SSH-";

/// Direction independent key of a flow: the two endpoints in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    lower: IpPort,
    upper: IpPort,
}

impl FlowKey {
    pub fn new(a: IpPort, b: IpPort) -> Self {
        if a <= b {
            Self { lower: a, upper: b }
        } else {
            Self { lower: b, upper: a }
        }
    }

    pub fn from_segment(segment: &TcpSegment) -> Self {
        Self::new(
            IpPort::new(segment.source, segment.source_port),
            IpPort::new(segment.destination, segment.destination_port),
        )
    }
}

/// TLS state of the server side of a flow.
#[derive(Debug, Default)]
enum ServerTls {
    /// No server payload seen yet
    #[default]
    Unknown,
    Reading(ServerHandshakeReader),
    /// Not TLS, or the handshake is over
    Done,
}

/// A tracked flow.
#[derive(Debug)]
pub struct FlowEntry {
    pub client: IpPort,
    pub server: IpPort,
    pub session: Session,
    ssh: bool,
    server_tls: ServerTls,
    fin: [bool; 2],
}

impl FlowEntry {
    /// Start a flow from its first observed segment.
    ///
    /// The client is the SYN sender. Without a SYN the side using the higher port
    /// when the other one is privileged is taken as the client, otherwise the sender.
    pub fn new(segment: &TcpSegment, timestamp: Duration) -> Self {
        let source = IpPort::new(segment.source, segment.source_port);
        let destination = IpPort::new(segment.destination, segment.destination_port);

        let from_server = if segment.is_syn() {
            segment.is_ack()
        } else {
            segment.source_port < 1024 && segment.destination_port >= 1024
        };
        let (client, server) = if from_server { (destination, source) } else { (source, destination) };

        Self {
            client,
            server,
            session: Session::new(Transport::Tcp, timestamp),
            ssh: client.port == SSH_PORT || server.port == SSH_PORT,
            server_tls: ServerTls::Unknown,
            fin: [false; 2],
        }
    }

    pub fn direction_of(&self, segment: &TcpSegment) -> Direction {
        if segment.source == self.client.ip && segment.source_port == self.client.port {
            Direction::Client
        } else {
            Direction::Server
        }
    }

    pub fn is_ssh(&self) -> bool {
        self.ssh
    }

    /// Both sides sent FIN.
    pub fn is_closed(&self) -> bool {
        self.fin[0] && self.fin[1]
    }
}

/// Bounded table of live flows; idle flows expire after the configured timeout.
pub struct FlowTable {
    flows: TtlCache<FlowKey, FlowEntry>,
    timeout: Duration,
}

impl FlowTable {
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        Self { flows: TtlCache::new(capacity), timeout }
    }

    /// Take a flow out of the table for processing.
    pub fn take(&mut self, key: &FlowKey) -> Option<FlowEntry> {
        self.flows.remove(key)
    }

    /// Put a flow back, restarting its idle timer.
    pub fn put(&mut self, key: FlowKey, entry: FlowEntry) {
        self.flows.insert(key, entry, self.timeout);
    }

    pub fn contains(&mut self, key: &FlowKey) -> bool {
        self.flows.contains_key(key)
    }

    /// Number of live flows.
    pub fn len(&mut self) -> usize {
        self.flows.iter().count()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Remove every flow, calling `f` on each.
    pub fn drain_with<F: FnMut(&mut FlowEntry)>(&mut self, mut f: F) {
        for (_, entry) in self.flows.iter_mut() {
            f(entry);
        }
        self.flows.clear();
    }
}

/// Runs the JA4+ hooks over the frames of a capture.
///
/// One processor owns one engine and one flow table; every packet of a flow has to
/// reach the same processor.
pub struct FlowProcessor {
    engine: Ja4Plus,
    flows: FlowTable,
}

impl FlowProcessor {
    pub fn new(engine: Ja4Plus) -> Self {
        let config = engine.config();
        let flows = FlowTable::new(config.max_flows, config.flow_timeout);
        Self { engine, flows }
    }

    pub fn engine(&self) -> &Ja4Plus {
        &self.engine
    }

    pub fn active_flows(&mut self) -> usize {
        self.flows.len()
    }

    pub fn is_tracked(&mut self, key: &FlowKey) -> bool {
        self.flows.contains(key)
    }

    /// Process one captured frame and return the fingerprints it produced.
    pub fn process_frame(
        &mut self,
        frame: &[u8],
        timestamp: Duration,
    ) -> Result<Vec<FingerprintOutput>, Ja4PlusError> {
        let Some(ip) = parse_packet(frame).bytes() else {
            trace!("No IP packet in {} byte frame", frame.len());
            return Ok(Vec::new());
        };
        let segment = TcpSegment::from_ip_packet(ip)?;
        Ok(self.process_segment(&segment, segment.payload(ip), timestamp))
    }

    /// Process one decoded segment and its payload.
    pub fn process_segment(
        &mut self,
        segment: &TcpSegment,
        payload: &[u8],
        timestamp: Duration,
    ) -> Vec<FingerprintOutput> {
        let key = FlowKey::from_segment(segment);
        let mut entry = match self.flows.take(&key) {
            Some(entry) => entry,
            // Trailing ACK/FIN/RST of a flow that already ended
            None if !segment.is_syn() && payload.is_empty() => {
                trace!("Control segment of an untracked flow ignored");
                return Vec::new();
            }
            None => {
                let entry = FlowEntry::new(segment, timestamp);
                trace!("New flow {} -> {}", entry.client, entry.server);
                entry
            }
        };
        let direction = entry.direction_of(segment);

        if segment.is_ack()
            && !segment.has_flag(TcpFlags::SYN | TcpFlags::FIN | TcpFlags::RST)
            && payload.is_empty()
        {
            let count = &mut entry.session.ack_flag_counts[direction.index()];
            *count = count.saturating_add(1);
        }

        let event = TcpPacketEvent { segment, direction, timestamp };
        self.engine.dispatch(&mut entry.session, ParserInput::TcpPacket(event));

        if !payload.is_empty() {
            if direction == Direction::Server {
                self.read_server_tls(&mut entry, payload);
            }
            self.count_ssh(&mut entry, direction, payload);
        }

        if segment.has_flag(TcpFlags::FIN) {
            entry.fin[direction.index()] = true;
        }

        let mut outputs = Self::drain_outputs(&mut entry);
        if segment.has_flag(TcpFlags::RST) || entry.is_closed() {
            debug!("Flow {} -> {} ended", entry.client, entry.server);
            self.engine.finalize_session(&mut entry.session, true);
            outputs.extend(Self::drain_outputs(&mut entry));
        } else {
            self.engine.finalize_session(&mut entry.session, false);
            self.flows.put(key, entry);
        }
        outputs
    }

    /// Finalize every remaining flow, e.g. at the end of a PCAP file.
    pub fn finish(&mut self) -> Vec<FingerprintOutput> {
        let mut outputs = Vec::new();
        let engine = &mut self.engine;
        self.flows.drain_with(|entry| {
            engine.finalize_session(&mut entry.session, true);
            outputs.extend(Self::drain_outputs(entry));
        });
        outputs
    }

    fn read_server_tls(&mut self, entry: &mut FlowEntry, payload: &[u8]) {
        if matches!(entry.server_tls, ServerTls::Unknown) {
            entry.server_tls = if is_tls_handshake(payload) {
                ServerTls::Reading(ServerHandshakeReader::new())
            } else {
                ServerTls::Done
            };
        }
        let ServerTls::Reading(reader) = &mut entry.server_tls else {
            return;
        };

        let messages = reader.add_bytes(payload);
        if reader.is_finished() {
            entry.server_tls = ServerTls::Done;
        }

        for message in &messages {
            match message.msg_type {
                HANDSHAKE_SERVER_HELLO => {
                    self.engine.dispatch(&mut entry.session, ParserInput::ServerHello(&message.body));
                }
                HANDSHAKE_CERTIFICATE => {
                    for der in split_certificate_chain(&message.body) {
                        self.engine.dispatch(&mut entry.session, ParserInput::Certificate(der));
                    }
                }
                other => trace!("Ignoring server handshake message {other:#04x}"),
            }
        }
    }

    fn count_ssh(&mut self, entry: &mut FlowEntry, direction: Direction, payload: &[u8]) {
        if !entry.ssh && payload.starts_with(SSH_BANNER) {
            entry.ssh = true;
        }
        if !entry.ssh {
            return;
        }

        let window = self.engine.config().ssh_window;
        if entry.session.ssh.observe(direction, payload.len(), window) {
            self.engine.dispatch(&mut entry.session, ParserInput::SshCounting);
            entry.session.ssh.reset();
        }
    }

    fn drain_outputs(entry: &mut FlowEntry) -> Vec<FingerprintOutput> {
        entry
            .session
            .fields
            .drain()
            .into_iter()
            .map(|(field, value)| FingerprintOutput {
                client: entry.client,
                server: entry.server,
                field,
                value,
            })
            .collect()
    }
}
