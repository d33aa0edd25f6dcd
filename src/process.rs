use crate::config::Ja4PlusConfig;
use crate::error::Ja4PlusError;
use crate::hasher::FingerprintHasher;
use crate::ja4s::{parse_server_hello, Ja4sPayload};
use crate::ja4x::{fingerprint_certificate, Ja4xPayload};
use crate::latency::{TcpFlowState, TcpOutcome};
use crate::session::{Direction, Field, FieldSink, Session};
use crate::tcp::TcpSegment;
use std::time::Duration;
use tracing::{debug, trace};

/// Named parser callbacks through which protocol data reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserHook {
    ServerHello,
    Certificate,
    SshCounting,
    TcpRawPacket,
}

impl ParserHook {
    pub const ALL: [ParserHook; 4] = [
        ParserHook::ServerHello,
        ParserHook::Certificate,
        ParserHook::SshCounting,
        ParserHook::TcpRawPacket,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ParserHook::ServerHello => "tls_process_server_hello",
            ParserHook::Certificate => "tls_process_certificate_wInfo",
            ParserHook::SshCounting => "ssh_counting200",
            ParserHook::TcpRawPacket => "tcp_raw_packet",
        }
    }

    pub fn from_name(name: &str) -> Option<ParserHook> {
        ParserHook::ALL.into_iter().find(|h| h.name() == name)
    }
}

/// A decoded TCP packet together with its position in the session.
#[derive(Debug, Clone, Copy)]
pub struct TcpPacketEvent<'a> {
    pub segment: &'a TcpSegment,
    pub direction: Direction,
    /// Capture timestamp
    pub timestamp: Duration,
}

/// Protocol unit delivered for a session.
#[derive(Debug, Clone, Copy)]
pub enum ParserInput<'a> {
    /// ServerHello handshake body, after the type/length header
    ServerHello(&'a [u8]),
    /// One DER encoded certificate
    Certificate(&'a [u8]),
    /// The session SSH window is complete
    SshCounting,
    TcpPacket(TcpPacketEvent<'a>),
}

impl ParserInput<'_> {
    pub fn hook(&self) -> ParserHook {
        match self {
            ParserInput::ServerHello(_) => ParserHook::ServerHello,
            ParserInput::Certificate(_) => ParserHook::Certificate,
            ParserInput::SshCounting => ParserHook::SshCounting,
            ParserInput::TcpPacket(_) => ParserHook::TcpRawPacket,
        }
    }
}

/// JA4+ engine of one worker.
///
/// Owns the worker's digest, so an instance must stay on the thread that created
/// it; create one engine per worker.
#[derive(Debug)]
pub struct Ja4Plus {
    config: Ja4PlusConfig,
    hasher: FingerprintHasher,
}

impl Ja4Plus {
    pub fn new(config: Ja4PlusConfig) -> Result<Self, Ja4PlusError> {
        config.validate()?;
        Ok(Self { config, hasher: FingerprintHasher::new() })
    }

    pub fn config(&self) -> &Ja4PlusConfig {
        &self.config
    }

    /// Route a protocol unit to its hook. Failures only mean no field is written.
    pub fn dispatch<S: FieldSink>(&mut self, session: &mut Session<S>, input: ParserInput<'_>) {
        trace!("Dispatching {}", input.hook().name());
        match input {
            ParserInput::ServerHello(data) => {
                self.process_server_hello(session, data);
            }
            ParserInput::Certificate(der) => {
                self.process_certificate(session, der);
            }
            ParserInput::SshCounting => {
                self.process_ssh_window(session);
            }
            ParserInput::TcpPacket(event) => {
                self.process_tcp_packet(session, &event);
            }
        }
    }

    /// JA4S (and JA4S_r when raw output is enabled) from a ServerHello body.
    pub fn process_server_hello<S: FieldSink>(
        &mut self,
        session: &mut Session<S>,
        data: &[u8],
    ) -> Option<Ja4sPayload> {
        let signature = match parse_server_hello(data) {
            Ok(signature) => signature,
            Err(e) => {
                debug!("JA4S not produced: {e}");
                return None;
            }
        };

        let ja4s = signature.generate_ja4s(session.transport, &mut self.hasher);
        debug!("JA4S = {} (raw {})", ja4s.full, ja4s.raw);
        session.add_field(Field::Ja4s, ja4s.full.clone());
        if self.config.raw {
            session.add_field(Field::Ja4sRaw, ja4s.raw.clone());
        }
        Some(ja4s)
    }

    /// JA4X (and JA4X_r when raw output is enabled) from one certificate.
    pub fn process_certificate<S: FieldSink>(
        &mut self,
        session: &mut Session<S>,
        der: &[u8],
    ) -> Option<Ja4xPayload> {
        let ja4x = match fingerprint_certificate(der, &mut self.hasher) {
            Ok(ja4x) => ja4x,
            Err(e) => {
                debug!("JA4X not produced for {} byte certificate: {e}", der.len());
                return None;
            }
        };

        debug!("JA4X = {}", ja4x.full);
        session.add_field(Field::Ja4x, ja4x.full.clone());
        if self.config.raw {
            session.add_field(Field::Ja4xRaw, ja4x.raw.clone());
        }
        Some(ja4x)
    }

    /// JA4SSH from the session SSH window; resets the session ACK counters.
    pub fn process_ssh_window<S: FieldSink>(&mut self, session: &mut Session<S>) -> String {
        let ja4ssh = session.ssh.ja4ssh(&mut session.ack_flag_counts);
        debug!("JA4SSH = {ja4ssh}");
        session.add_field(Field::Ja4ssh, ja4ssh.clone());
        ja4ssh
    }

    /// JA4TS, JA4TC and JA4L from the TCP packets of a session.
    ///
    /// Once JA4L-C is closed the timing state is dropped and later packets are ignored.
    pub fn process_tcp_packet<S: FieldSink>(
        &mut self,
        session: &mut Session<S>,
        event: &TcpPacketEvent<'_>,
    ) -> TcpOutcome {
        let timestamp = session.relative_micros(event.timestamp);
        let Some(state) = session.tcp_state.tracking_mut() else {
            trace!("TCP timing already completed for this session");
            return TcpOutcome::Nothing;
        };

        let outcome = state.observe(event.segment, event.direction, timestamp);
        match &outcome {
            TcpOutcome::Nothing => {}
            TcpOutcome::Ja4ts(ja4ts) => session.add_field(Field::Ja4ts, ja4ts.clone()),
            TcpOutcome::Ja4tc(ja4tc) => session.add_field(Field::Ja4tc, ja4tc.clone()),
            TcpOutcome::Ja4ls(ja4ls) => session.add_field(Field::Ja4ls, ja4ls.clone()),
            TcpOutcome::Ja4lc(ja4lc) => {
                if let Some(ja4lc) = ja4lc {
                    session.add_field(Field::Ja4lc, ja4lc.clone());
                }
                session.tcp_state = TcpFlowState::Completed;
            }
        }
        outcome
    }

    /// Session save hook. On the final save a partial SSH window still produces
    /// its JA4SSH, then every per-flow state is released.
    pub fn finalize_session<S: FieldSink>(&mut self, session: &mut Session<S>, is_final: bool) {
        if !is_final {
            return;
        }
        if !session.ssh.is_empty() {
            self.process_ssh_window(session);
        }
        if matches!(session.tcp_state, TcpFlowState::Tracking(_)) {
            trace!("Releasing unfinished TCP timing state");
        }
        session.tcp_state.release();
        session.ssh.reset();
    }
}
