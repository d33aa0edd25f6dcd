#![forbid(unsafe_code)]

pub mod asn1;
pub mod config;
pub mod error;
pub mod flow;
pub mod grease;
pub mod handshake_reader;
pub mod hasher;
pub mod ja4s;
pub mod ja4x;
pub mod latency;
pub mod output;
pub mod packet_parser;
pub mod parallel;
pub mod process;
pub mod session;
pub mod ssh;
pub mod tcp;
pub mod tls;

// Re-exports
pub use config::Ja4PlusConfig;
pub use error::*;
pub use flow::{FlowKey, FlowProcessor};
pub use hasher::FingerprintHasher;
pub use ja4s::{parse_server_hello, Ja4sPayload, ServerHelloSignature};
pub use ja4x::{fingerprint_certificate, split_certificate_chain, Ja4xPayload};
pub use latency::{TcpFlowState, TcpOutcome};
pub use output::{FingerprintOutput, IpPort};
pub use parallel::{DispatchResult, PoolStats, WorkerPool};
pub use process::{Ja4Plus, ParserHook, ParserInput, TcpPacketEvent};
pub use session::{Direction, Field, FieldSink, FieldStore, Session, Transport};
pub use ssh::SshWindow;
pub use tcp::{TcpOptionsSignature, TcpSegment};

use pcap_file::pcap::PcapReader;
use pnet::datalink::{self, Channel, Config};
use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};

/// Worker pool sizing for [`Ja4PlusAnalyzer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub num_workers: usize,
    /// Frames buffered per worker before new ones are dropped
    pub queue_size: usize,
}

/// Passive JA4+ analyzer over live interfaces or PCAP files.
///
/// Frames are processed on the calling thread, or spread over a [`WorkerPool`]
/// when worker settings are given. Every fingerprint is sent on the result channel
/// as soon as it is produced.
pub struct Ja4PlusAnalyzer {
    config: Ja4PlusConfig,
    workers: Option<WorkerSettings>,
}

impl Ja4PlusAnalyzer {
    /// Creates an analyzer processing every frame on the calling thread.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: Ja4PlusConfig) -> Result<Self, Ja4PlusError> {
        config.validate()?;
        Ok(Self { config, workers: None })
    }

    /// Creates an analyzer spreading flows over `num_workers` threads.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or `num_workers` is 0.
    pub fn with_workers(
        config: Ja4PlusConfig,
        num_workers: usize,
        queue_size: usize,
    ) -> Result<Self, Ja4PlusError> {
        if num_workers == 0 {
            return Err(Ja4PlusError::Misconfiguration(
                "Worker count must be greater than 0".to_string(),
            ));
        }
        config.validate()?;
        Ok(Self { config, workers: Some(WorkerSettings { num_workers, queue_size }) })
    }

    pub fn config(&self) -> &Ja4PlusConfig {
        &self.config
    }

    fn process_with<F>(
        &mut self,
        mut frame_fn: F,
        sender: Sender<FingerprintOutput>,
        cancel_signal: Option<Arc<AtomicBool>>,
    ) -> Result<(), Ja4PlusError>
    where
        F: FnMut() -> Option<Result<(Vec<u8>, Duration), Ja4PlusError>>,
    {
        let cancelled = || {
            cancel_signal
                .as_ref()
                .is_some_and(|cancel| cancel.load(Ordering::Relaxed))
        };

        if let Some(settings) = self.workers {
            let pool = WorkerPool::new(
                &self.config,
                settings.num_workers,
                settings.queue_size,
                sender,
            )?;
            while let Some(frame_result) = frame_fn() {
                if cancelled() {
                    debug!("Cancellation signal received, stopping packet processing");
                    break;
                }
                match frame_result {
                    Ok((frame, timestamp)) => {
                        pool.dispatch(frame, timestamp);
                    }
                    Err(e) => error!("Failed to read packet: {}", e),
                }
            }
            info!("{}", pool.stats());
            return pool.finish();
        }

        let mut processor = FlowProcessor::new(Ja4Plus::new(self.config.clone())?);
        while let Some(frame_result) = frame_fn() {
            if cancelled() {
                debug!("Cancellation signal received, stopping packet processing");
                break;
            }

            match frame_result {
                Ok((frame, timestamp)) => match processor.process_frame(&frame, timestamp) {
                    Ok(outputs) => {
                        for output in outputs {
                            if sender.send(output).is_err() {
                                error!("Receiver dropped, stopping packet processing");
                                return Ok(());
                            }
                        }
                    }
                    Err(e) => debug!("Error processing packet: {}", e),
                },
                Err(e) => error!("Failed to read packet: {}", e),
            }
        }

        for output in processor.finish() {
            if sender.send(output).is_err() {
                break;
            }
        }
        Ok(())
    }

    /// Analyzes live traffic from a network interface.
    ///
    /// # Parameters
    /// - `interface_name`: The name of the network interface to capture from.
    /// - `sender`: A channel sender to send fingerprints.
    /// - `cancel_signal`: Optional atomic boolean to signal cancellation.
    pub fn analyze_network(
        &mut self,
        interface_name: &str,
        sender: Sender<FingerprintOutput>,
        cancel_signal: Option<Arc<AtomicBool>>,
    ) -> Result<(), Ja4PlusError> {
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == interface_name)
            .ok_or_else(|| {
                Ja4PlusError::Parse(format!("Could not find network interface: {interface_name}"))
            })?;

        debug!("Using network interface: {}", interface.name);

        let config = Config { promiscuous: true, ..Config::default() };
        let (_tx, mut rx) = match datalink::channel(&interface, config) {
            Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
            Ok(_) => return Err(Ja4PlusError::Parse("Unhandled channel type".to_string())),
            Err(e) => return Err(Ja4PlusError::Parse(format!("Unable to create channel: {e}"))),
        };

        self.process_with(
            move || match rx.next() {
                Ok(frame) => {
                    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
                    Some(Ok((frame.to_vec(), timestamp)))
                }
                Err(e) => Some(Err(Ja4PlusError::Parse(format!("Error receiving packet: {e}")))),
            },
            sender,
            cancel_signal,
        )
    }

    /// Analyzes the frames of a PCAP file, using the capture timestamps.
    ///
    /// Flows still open at the end of the file are finalized before returning.
    pub fn analyze_pcap(
        &mut self,
        pcap_path: &str,
        sender: Sender<FingerprintOutput>,
        cancel_signal: Option<Arc<AtomicBool>>,
    ) -> Result<(), Ja4PlusError> {
        let file = File::open(pcap_path)
            .map_err(|e| Ja4PlusError::Parse(format!("Failed to open PCAP file: {e}")))?;
        let mut pcap_reader = PcapReader::new(file)
            .map_err(|e| Ja4PlusError::Parse(format!("Failed to create PCAP reader: {e}")))?;

        self.process_with(
            move || match pcap_reader.next_packet() {
                Some(Ok(packet)) => Some(Ok((packet.data.to_vec(), packet.timestamp))),
                Some(Err(e)) => {
                    Some(Err(Ja4PlusError::Parse(format!("Error reading PCAP packet: {e}"))))
                }
                None => None,
            },
            sender,
            cancel_signal,
        )
    }
}
