use crate::tls::{handshake_message, HANDSHAKE_SERVER_HELLO_DONE};
use tls_parser::{parse_tls_raw_record, TlsRecordType};
use tracing::debug;

const RECORD_HEADER_LEN: usize = 5;

/// Upper bound on buffered bytes per flow; reassembly is abandoned past it.
pub const MAX_HANDSHAKE_BUFFER: usize = 64 * 1024;

/// A complete handshake message copied out of the reassembly buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedHandshake {
    pub msg_type: u8,
    pub body: Vec<u8>,
}

/// Reassembles the handshake messages of the server side of a TLS stream.
///
/// Records and handshake messages may both span TCP segments, so raw bytes are
/// buffered until a record is complete and record payloads are concatenated until
/// a message is complete. Reading stops at the first non-handshake record (for
/// example ChangeCipherSpec) or after ServerHelloDone.
#[derive(Debug, Default)]
pub struct ServerHandshakeReader {
    records: Vec<u8>,
    handshake: Vec<u8>,
    finished: bool,
}

impl ServerHandshakeReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the reader stopped accepting bytes.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn buffer_len(&self) -> usize {
        self.records.len() + self.handshake.len()
    }

    /// Feed server payload bytes and return the handshake messages they completed.
    pub fn add_bytes(&mut self, data: &[u8]) -> Vec<OwnedHandshake> {
        if self.finished {
            return Vec::new();
        }
        self.records.extend_from_slice(data);
        self.read_records();

        let messages = self.read_messages();
        if !self.finished && self.buffer_len() > MAX_HANDSHAKE_BUFFER {
            debug!("Server handshake exceeds {MAX_HANDSHAKE_BUFFER} bytes, giving up");
            self.finish();
        }
        messages
    }

    fn finish(&mut self) {
        self.finished = true;
        self.records = Vec::new();
        self.handshake = Vec::new();
    }

    fn read_records(&mut self) {
        let mut consumed = 0;
        loop {
            let pending = &self.records[consumed..];
            let Some(header) = pending.get(..RECORD_HEADER_LEN) else {
                break;
            };
            let needed = RECORD_HEADER_LEN + usize::from(u16::from_be_bytes([header[3], header[4]]));
            if pending.len() < needed {
                break;
            }

            match parse_tls_raw_record(&pending[..needed]) {
                Ok((_, record)) if record.hdr.record_type == TlsRecordType::Handshake => {
                    self.handshake.extend_from_slice(record.data);
                    consumed += needed;
                }
                Ok((_, record)) => {
                    debug!("Server handshake ended by {:?} record", record.hdr.record_type);
                    self.finished = true;
                    break;
                }
                Err(e) => {
                    debug!("Unparseable TLS record in server stream: {:?}", e);
                    self.finished = true;
                    break;
                }
            }
        }

        if self.finished {
            self.records = Vec::new();
        } else {
            self.records.drain(..consumed);
        }
    }

    fn read_messages(&mut self) -> Vec<OwnedHandshake> {
        let mut messages = Vec::new();
        let mut consumed = 0;
        let mut done = false;

        while let Ok((rest, message)) = handshake_message(&self.handshake[consumed..]) {
            consumed = self.handshake.len() - rest.len();
            done = message.msg_type == HANDSHAKE_SERVER_HELLO_DONE;
            messages.push(OwnedHandshake { msg_type: message.msg_type, body: message.body.to_vec() });
            if done {
                break;
            }
        }

        self.handshake.drain(..consumed);
        if done {
            self.finish();
        }
        messages
    }
}
