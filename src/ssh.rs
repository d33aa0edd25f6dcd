//! JA4SSH: SSH traffic fingerprinting from packet length statistics.

use crate::session::Direction;

/// Packet lengths at or above this value do not take part in the mode.
pub const MAX_SSH_LENGTH: u16 = 2048;

/// Default number of SSH packets per JA4SSH observation window.
pub const DEFAULT_SSH_WINDOW: usize = 200;

/// Statistical mode of packet lengths, ignoring lengths of [`MAX_SSH_LENGTH`] or more.
///
/// The highest count wins. When a value reaches the current highest count and is
/// smaller than the current mode, it becomes the mode.
pub fn ssh_mode(lengths: &[u16]) -> u16 {
    let mut counts = vec![0u32; usize::from(MAX_SSH_LENGTH)];
    let mut mode = 0u16;
    let mut mode_count = 0u32;

    for &len in lengths {
        if len >= MAX_SSH_LENGTH {
            continue;
        }
        let count = &mut counts[usize::from(len)];
        *count += 1;
        if *count == mode_count && len < mode {
            mode = len;
        } else if *count > mode_count {
            mode = len;
            mode_count = *count;
        }
    }

    mode
}

/// Packet lengths and counts of one observation window, per direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshWindow {
    lengths: [Vec<u16>; 2],
    packets: [u32; 2],
}

impl SshWindow {
    /// Record one SSH packet. Returns `true` when the window holds `window_size` packets.
    pub fn observe(&mut self, direction: Direction, payload_len: usize, window_size: usize) -> bool {
        let idx = direction.index();
        let len = u16::try_from(payload_len).unwrap_or(u16::MAX);
        self.lengths[idx].push(len);
        self.packets[idx] = self.packets[idx].saturating_add(1);
        self.total_packets() >= window_size
    }

    pub fn lengths(&self, direction: Direction) -> &[u16] {
        &self.lengths[direction.index()]
    }

    pub fn packets(&self, direction: Direction) -> u32 {
        self.packets[direction.index()]
    }

    pub fn total_packets(&self) -> usize {
        self.packets.iter().map(|&p| p as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_packets() == 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Build `c<mode>s<mode>_c<packets>s<packets>_c<acks>s<acks>` and clear the ACK counters.
    pub fn ja4ssh(&self, ack_flag_counts: &mut [u32; 2]) -> String {
        let ja4ssh = format!(
            "c{}s{}_c{}s{}_c{}s{}",
            ssh_mode(self.lengths(Direction::Client)),
            ssh_mode(self.lengths(Direction::Server)),
            self.packets(Direction::Client),
            self.packets(Direction::Server),
            ack_flag_counts[0],
            ack_flag_counts[1],
        );
        *ack_flag_counts = [0; 2];
        ja4ssh
    }
}
