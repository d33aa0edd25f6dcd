use crate::config::Ja4PlusConfig;
use crate::error::Ja4PlusError;
use crate::flow::{FlowKey, FlowProcessor};
use crate::output::FingerprintOutput;
use crate::packet_parser::parse_packet;
use crate::process::Ja4Plus;
use crate::tcp::TcpSegment;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

const IDLE_POLL: Duration = Duration::from_millis(100);

/// Result of dispatching a frame to a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    Queued,
    /// Queue full or worker gone
    Dropped,
    /// Not a TCP/IP frame
    Skipped,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerStats {
    pub id: usize,
    /// Approximate number of queued frames
    pub queue_size: usize,
    pub dropped: u64,
}

impl fmt::Display for WorkerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Worker {}: queue_size={}, dropped={}", self.id, self.queue_size, self.dropped)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub total_dispatched: u64,
    pub total_dropped: u64,
    pub total_skipped: u64,
    pub workers: Vec<WorkerStats>,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "JA4+ Pool Stats - frames dispatched: {}, dropped: {}, skipped: {}",
            self.total_dispatched, self.total_dropped, self.total_skipped
        )?;
        for worker in &self.workers {
            writeln!(f, "  {worker}")?;
        }
        Ok(())
    }
}

/// Worker owning a frame, stable for both directions of a flow.
///
/// Returns `None` for frames without a TCP segment.
pub fn worker_for_frame(frame: &[u8], num_workers: NonZeroUsize) -> Option<usize> {
    let ip = parse_packet(frame).bytes()?;
    let segment = TcpSegment::from_ip_packet(ip).ok()?;
    let mut hasher = DefaultHasher::new();
    FlowKey::from_segment(&segment).hash(&mut hasher);
    let index = hasher.finish() % num_workers.get() as u64;
    usize::try_from(index).ok()
}

type Frame = (Vec<u8>, Duration);

/// Pool of JA4+ workers.
///
/// Each worker owns its engine, digest and flow table; frames are routed by flow so
/// a session is only ever touched by one worker.
pub struct WorkerPool {
    workers: Vec<thread::JoinHandle<()>>,
    frame_senders: Vec<Sender<Frame>>,
    shutdown_flag: Arc<AtomicBool>,
    pub num_workers: NonZeroUsize,
    queued_count: AtomicU64,
    dropped_count: AtomicU64,
    skipped_count: AtomicU64,
    worker_dropped: Vec<AtomicU64>,
}

impl WorkerPool {
    /// Spawn `num_workers` workers with queues of `queue_size` frames each.
    ///
    /// # Errors
    ///
    /// Returns an error if `num_workers` is 0, the configuration is invalid or a
    /// thread cannot be spawned.
    pub fn new(
        config: &Ja4PlusConfig,
        num_workers: usize,
        queue_size: usize,
        result_sender: std::sync::mpsc::Sender<FingerprintOutput>,
    ) -> Result<Self, Ja4PlusError> {
        let num_workers = NonZeroUsize::new(num_workers).ok_or_else(|| {
            Ja4PlusError::Misconfiguration("Worker count must be greater than 0".to_string())
        })?;

        debug!("Creating JA4+ worker pool: {} workers, queue size: {}", num_workers, queue_size);

        let mut workers = Vec::with_capacity(num_workers.get());
        let mut frame_senders = Vec::with_capacity(num_workers.get());
        let mut worker_dropped = Vec::with_capacity(num_workers.get());
        let shutdown_flag = Arc::new(AtomicBool::new(false));

        for worker_id in 0..num_workers.get() {
            let processor = FlowProcessor::new(Ja4Plus::new(config.clone())?);
            let (tx, rx) = bounded::<Frame>(queue_size);
            frame_senders.push(tx);
            worker_dropped.push(AtomicU64::new(0));

            let result_sender = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown_flag);
            let handle = thread::Builder::new()
                .name(format!("ja4plus-worker-{worker_id}"))
                .spawn(move || {
                    Self::worker_loop(worker_id, processor, rx, result_sender, shutdown_flag);
                })
                .map_err(|e| {
                    Ja4PlusError::Misconfiguration(format!("Failed to spawn worker thread: {e}"))
                })?;
            workers.push(handle);
        }

        Ok(Self {
            workers,
            frame_senders,
            shutdown_flag,
            num_workers,
            queued_count: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
            skipped_count: AtomicU64::new(0),
            worker_dropped,
        })
    }

    /// Route a frame to the worker owning its flow. Never blocks.
    pub fn dispatch(&self, frame: Vec<u8>, timestamp: Duration) -> DispatchResult {
        let Some(worker_id) = worker_for_frame(&frame, self.num_workers) else {
            self.skipped_count.fetch_add(1, Ordering::Relaxed);
            return DispatchResult::Skipped;
        };

        match self.frame_senders[worker_id].try_send((frame, timestamp)) {
            Ok(()) => {
                self.queued_count.fetch_add(1, Ordering::Relaxed);
                DispatchResult::Queued
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped_count.fetch_add(1, Ordering::Relaxed);
                self.worker_dropped[worker_id].fetch_add(1, Ordering::Relaxed);
                DispatchResult::Dropped
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let workers = self
            .frame_senders
            .iter()
            .zip(&self.worker_dropped)
            .enumerate()
            .map(|(id, (sender, dropped))| WorkerStats {
                id,
                queue_size: sender.len(),
                dropped: dropped.load(Ordering::Relaxed),
            })
            .collect();

        PoolStats {
            total_dispatched: self.queued_count.load(Ordering::Relaxed),
            total_dropped: self.dropped_count.load(Ordering::Relaxed),
            total_skipped: self.skipped_count.load(Ordering::Relaxed),
            workers,
        }
    }

    /// Stop the workers without draining their queues.
    pub fn shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    /// Close the queues, let every worker process what is left and finalize its
    /// flows, then wait for all of them.
    pub fn finish(mut self) -> Result<(), Ja4PlusError> {
        self.frame_senders.clear();
        for handle in self.workers.drain(..) {
            handle
                .join()
                .map_err(|_| Ja4PlusError::Misconfiguration("Worker thread panicked".to_string()))?;
        }
        Ok(())
    }

    fn worker_loop(
        worker_id: usize,
        mut processor: FlowProcessor,
        rx: Receiver<Frame>,
        result_sender: std::sync::mpsc::Sender<FingerprintOutput>,
        shutdown_flag: Arc<AtomicBool>,
    ) {
        debug!("JA4+ worker {} started", worker_id);

        loop {
            if shutdown_flag.load(Ordering::Relaxed) {
                debug!("JA4+ worker {} received shutdown signal", worker_id);
                return;
            }

            let (frame, timestamp) = match rx.recv_timeout(IDLE_POLL) {
                Ok(received) => received,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            match processor.process_frame(&frame, timestamp) {
                Ok(outputs) => {
                    for output in outputs {
                        if result_sender.send(output).is_err() {
                            debug!("JA4+ worker {} lost its receiver", worker_id);
                            return;
                        }
                    }
                }
                Err(e) => trace!("Worker {} skipped frame: {}", worker_id, e),
            }
        }

        for output in processor.finish() {
            if result_sender.send(output).is_err() {
                break;
            }
        }
        debug!("JA4+ worker {} stopped", worker_id);
    }
}
