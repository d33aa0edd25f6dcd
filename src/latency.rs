//! Per-flow TCP timing state and the JA4L latency fingerprints.
//!
//! Timestamps are microseconds relative to the first packet of the flow:
//!
//! - A: client SYN
//! - B: last recorded SYN-ACK (up to [`SYN_ACK_COUNT`] are kept)
//! - C: first bare ACK after the handshake
//! - D: first client payload
//! - E: first server payload
//! - F: second client payload, which closes the client measurement

use crate::session::Direction;
use crate::tcp::TcpSegment;
use tracing::{debug, trace};

/// Number of SYN-ACK timestamps kept per flow; later ones are ignored.
pub const SYN_ACK_COUNT: usize = 4;

/// Timing and TTL observations of one TCP flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowTimingState {
    pub timestamp_a: Option<u64>,
    pub timestamp_c: Option<u64>,
    pub timestamp_d: Option<u64>,
    pub timestamp_e: Option<u64>,
    syn_ack_times: [u64; SYN_ACK_COUNT],
    syn_ack_count: usize,
    pub client_ttl: u8,
    pub server_ttl: u8,
}

/// Lifecycle of the timing slot of a flow.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum TcpFlowState {
    /// No TCP packet seen yet
    #[default]
    Uninitialized,
    Tracking(Box<FlowTimingState>),
    /// JA4L-C was produced; further TCP packets are ignored
    Completed,
}

impl TcpFlowState {
    /// Timing state to update, created on first use. `None` once completed.
    pub fn tracking_mut(&mut self) -> Option<&mut FlowTimingState> {
        if matches!(self, TcpFlowState::Uninitialized) {
            *self = TcpFlowState::Tracking(Box::default());
        }
        match self {
            TcpFlowState::Tracking(state) => Some(state),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TcpFlowState::Completed)
    }

    /// Drop any timing state, leaving the slot uninitialized.
    pub fn release(&mut self) {
        *self = TcpFlowState::Uninitialized;
    }
}

/// What a TCP segment produced for its flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpOutcome {
    Nothing,
    /// A SYN-ACK was seen
    Ja4ts(String),
    /// A SYN was seen
    Ja4tc(String),
    /// The server sent its first payload
    Ja4ls(String),
    /// The client measurement is closed; the value is absent without a SYN-ACK
    Ja4lc(Option<String>),
}

impl FlowTimingState {
    /// Record a SYN-ACK timestamp. Returns `false` once [`SYN_ACK_COUNT`] are stored.
    pub fn record_syn_ack(&mut self, timestamp: u64) -> bool {
        if self.syn_ack_count >= SYN_ACK_COUNT {
            return false;
        }
        self.syn_ack_times[self.syn_ack_count] = timestamp;
        self.syn_ack_count += 1;
        true
    }

    pub fn syn_ack_times(&self) -> &[u64] {
        &self.syn_ack_times[..self.syn_ack_count]
    }

    pub fn last_syn_ack(&self) -> Option<u64> {
        self.syn_ack_times().last().copied()
    }

    /// JA4L-S: half the SYN to SYN-ACK gap, the server TTL and half the gap
    /// between the first client and first server payloads.
    pub fn server_latency(&self) -> Option<String> {
        let timestamp_b = self.last_syn_ack()?;
        let timestamp_e = self.timestamp_e?;
        let handshake = timestamp_b.saturating_sub(self.timestamp_a.unwrap_or(0)) / 2;
        let payload = timestamp_e.saturating_sub(self.timestamp_d.unwrap_or(0)) / 2;
        Some(format!("{handshake}_{}_{payload}", self.server_ttl))
    }

    /// JA4L-C: half the SYN-ACK to ACK gap, the client TTL and half the gap
    /// between the first server payload and the second client payload.
    pub fn client_latency(&self, timestamp_f: u64) -> Option<String> {
        let timestamp_b = self.last_syn_ack()?;
        let timestamp_e = self.timestamp_e?;
        let handshake = self.timestamp_c.unwrap_or(0).saturating_sub(timestamp_b) / 2;
        let payload = timestamp_f.saturating_sub(timestamp_e) / 2;
        Some(format!("{handshake}_{}_{payload}", self.client_ttl))
    }

    /// Apply one segment, observed at `timestamp` microseconds into the flow.
    pub fn observe(&mut self, segment: &TcpSegment, direction: Direction, timestamp: u64) -> TcpOutcome {
        if segment.payload_len() == 0 {
            return self.observe_control(segment, timestamp);
        }

        match direction {
            Direction::Client => {
                if self.timestamp_d.is_none() {
                    self.timestamp_d = Some(timestamp);
                    TcpOutcome::Nothing
                } else if self.timestamp_e.is_some() {
                    let ja4lc = self.client_latency(timestamp);
                    if ja4lc.is_none() {
                        debug!("Client latency closed without a recorded SYN-ACK");
                    }
                    TcpOutcome::Ja4lc(ja4lc)
                } else {
                    TcpOutcome::Nothing
                }
            }
            Direction::Server => {
                if self.timestamp_e.is_some() {
                    return TcpOutcome::Nothing;
                }
                self.timestamp_e = Some(timestamp);
                match self.server_latency() {
                    Some(ja4ls) => TcpOutcome::Ja4ls(ja4ls),
                    None => {
                        debug!("Server payload seen without a recorded SYN-ACK");
                        TcpOutcome::Nothing
                    }
                }
            }
        }
    }

    fn observe_control(&mut self, segment: &TcpSegment, timestamp: u64) -> TcpOutcome {
        if segment.is_syn() {
            let signature = segment.options_signature();
            if segment.is_ack() {
                if !self.record_syn_ack(timestamp) {
                    trace!("SYN-ACK beyond {SYN_ACK_COUNT} not recorded");
                }
                self.server_ttl = segment.ttl;
                TcpOutcome::Ja4ts(signature.ja4ts(self.syn_ack_times()))
            } else {
                self.timestamp_a = Some(timestamp);
                self.client_ttl = segment.ttl;
                TcpOutcome::Ja4tc(signature.ja4tc())
            }
        } else {
            if segment.is_ack() && self.timestamp_c.is_none() {
                self.timestamp_c = Some(timestamp);
            }
            TcpOutcome::Nothing
        }
    }
}
