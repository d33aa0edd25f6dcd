use crate::latency::TcpFlowState;
use crate::ssh::SshWindow;
use std::fmt;
use std::time::Duration;

/// Transport protocol of a session, as it appears in the first JA4S character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Tcp,
    /// UDP carried TLS, i.e. QUIC
    Udp,
}

impl Transport {
    pub fn ja4_marker(self) -> char {
        match self {
            Transport::Tcp => 't',
            Transport::Udp => 'q',
        }
    }
}

/// Packet direction inside a session. `Client` (0) is the side that opened the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Client,
    Server,
}

impl Direction {
    pub fn index(self) -> usize {
        match self {
            Direction::Client => 0,
            Direction::Server => 1,
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            Direction::Client => Direction::Server,
            Direction::Server => Direction::Client,
        }
    }
}

/// Output fields produced by the JA4+ hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Ja4s,
    Ja4sRaw,
    Ja4x,
    Ja4xRaw,
    Ja4ssh,
    Ja4ts,
    Ja4tc,
    Ja4lc,
    Ja4ls,
}

impl Field {
    pub const ALL: [Field; 9] = [
        Field::Ja4s,
        Field::Ja4sRaw,
        Field::Ja4x,
        Field::Ja4xRaw,
        Field::Ja4ssh,
        Field::Ja4ts,
        Field::Ja4tc,
        Field::Ja4lc,
        Field::Ja4ls,
    ];

    /// Dotted field expression, e.g. `tls.ja4s`
    pub fn expression(self) -> &'static str {
        match self {
            Field::Ja4s => "tls.ja4s",
            Field::Ja4sRaw => "tls.ja4s_r",
            Field::Ja4x => "cert.ja4x",
            Field::Ja4xRaw => "cert.ja4x_r",
            Field::Ja4ssh => "ssh.ja4ssh",
            Field::Ja4ts => "tcp.ja4ts",
            Field::Ja4tc => "tcp.ja4tc",
            Field::Ja4lc => "tcp.ja4lc",
            Field::Ja4ls => "tcp.ja4ls",
        }
    }

    pub fn friendly_name(self) -> &'static str {
        match self {
            Field::Ja4s => "JA4s",
            Field::Ja4sRaw => "JA4s_r",
            Field::Ja4x => "JA4x",
            Field::Ja4xRaw => "JA4x_r",
            Field::Ja4ssh => "JA4ssh",
            Field::Ja4ts => "JA4ts",
            Field::Ja4tc => "JA4tc",
            Field::Ja4lc => "JA4lc",
            Field::Ja4ls => "JA4ls",
        }
    }

    pub fn from_expression(expression: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.expression() == expression)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.expression())
    }
}

/// Destination for fingerprint strings produced for a session.
pub trait FieldSink {
    fn add_string(&mut self, field: Field, value: String);
}

/// In-memory field storage, appending values in the order they were produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldStore {
    entries: Vec<(Field, String)>,
}

impl FieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value written for `field`, if any
    pub fn first(&self, field: Field) -> Option<&str> {
        self.values(field).next()
    }

    pub fn values(&self, field: Field) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every stored value.
    pub fn drain(&mut self) -> Vec<(Field, String)> {
        std::mem::take(&mut self.entries)
    }
}

impl FieldSink for FieldStore {
    fn add_string(&mut self, field: Field, value: String) {
        self.entries.push((field, value));
    }
}

/// Per-session state handed to the JA4+ hooks.
///
/// Owns the TCP timing slot, the SSH observation window, the ACK counters and the
/// output fields. Only the worker processing the session touches it.
#[derive(Debug)]
pub struct Session<S: FieldSink = FieldStore> {
    pub transport: Transport,
    /// Capture timestamp of the first packet, origin of every relative timestamp
    pub first_packet: Duration,
    /// Bare ACK segments seen per direction since the last JA4SSH
    pub ack_flag_counts: [u32; 2],
    pub ssh: SshWindow,
    pub fields: S,
    pub(crate) tcp_state: TcpFlowState,
}

impl Session<FieldStore> {
    pub fn new(transport: Transport, first_packet: Duration) -> Self {
        Self::with_sink(transport, first_packet, FieldStore::new())
    }
}

impl<S: FieldSink> Session<S> {
    pub fn with_sink(transport: Transport, first_packet: Duration, fields: S) -> Self {
        Self {
            transport,
            first_packet,
            ack_flag_counts: [0; 2],
            ssh: SshWindow::default(),
            fields,
            tcp_state: TcpFlowState::default(),
        }
    }

    /// Microseconds elapsed between the first packet and `timestamp`.
    pub fn relative_micros(&self, timestamp: Duration) -> u64 {
        let elapsed = timestamp.saturating_sub(self.first_packet);
        u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
    }

    pub fn tcp_state(&self) -> &TcpFlowState {
        &self.tcp_state
    }

    pub(crate) fn add_field(&mut self, field: Field, value: String) {
        self.fields.add_string(field, value);
    }
}
