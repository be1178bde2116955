//! Test utilities for discovery.
//!
//! Deterministic clocks and a message sender that records instead of
//! sending. Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust,ignore
//! use disc_v4::test_utils::FixedTimeSource;
//! use disc_v4::ports::TimeSource;
//!
//! let time_source = FixedTimeSource::new(1000);
//! assert_eq!(time_source.now().as_secs(), 1000);
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::codec::{decode, DecodedPacket};
use crate::domain::Timestamp;
use crate::ports::{MessageSender, NetworkError, TimeSource};

/// How long `RecordingSender::next_packet` waits before giving up.
const RECV_WAIT: Duration = Duration::from_secs(5);

/// A time source that returns a fixed timestamp.
#[derive(Debug, Clone)]
pub struct FixedTimeSource {
    timestamp: u64,
}

impl FixedTimeSource {
    pub fn new(timestamp: u64) -> Self {
        Self { timestamp }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.timestamp)
    }
}

/// A time source moved forward by hand.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    secs: AtomicU64,
}

impl ManualTimeSource {
    pub fn new(secs: u64) -> Self {
        Self {
            secs: AtomicU64::new(secs),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.secs.load(Ordering::SeqCst))
    }
}

/// A `MessageSender` that queues every packet for inspection.
pub struct RecordingSender {
    tx: mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>,
    rx: Mutex<mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>>,
    sent: AtomicUsize,
}

impl Default for RecordingSender {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSender {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            sent: AtomicUsize::new(0),
        }
    }

    /// Total packets sent so far, including those already taken.
    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    /// Next recorded packet, waiting up to five seconds of (possibly paused)
    /// tokio time.
    pub async fn next_packet(&self) -> Option<(Vec<u8>, SocketAddr)> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(RECV_WAIT, rx.recv()).await.ok().flatten()
    }

    /// Next recorded packet, decoded at `now`.
    pub async fn next_decoded(&self, now: Timestamp) -> Option<(DecodedPacket, SocketAddr)> {
        let (bytes, to) = self.next_packet().await?;
        decode(&bytes, now).ok().map(|packet| (packet, to))
    }

    /// A packet already recorded, without waiting.
    pub async fn try_next_packet(&self) -> Option<(Vec<u8>, SocketAddr)> {
        self.rx.lock().await.try_recv().ok()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_packet(&self, bytes: &[u8], to: SocketAddr) -> Result<(), NetworkError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.tx
            .send((bytes.to_vec(), to))
            .map_err(|_| NetworkError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_time_source_returns_configured_value() {
        let source = FixedTimeSource::new(1000);
        assert_eq!(source.now().as_secs(), 1000);
    }

    #[test]
    fn test_manual_time_source_advances() {
        let source = ManualTimeSource::new(100);
        source.advance(5);
        assert_eq!(source.now().as_secs(), 105);
        source.set(7);
        assert_eq!(source.now().as_secs(), 7);
    }

    #[tokio::test]
    async fn test_recording_sender_keeps_order() {
        let sender = RecordingSender::new();
        let to: SocketAddr = "127.0.0.1:1".parse().unwrap();
        sender.send_packet(&[1], to).await.unwrap();
        sender.send_packet(&[2], to).await.unwrap();

        assert_eq!(sender.sent_count(), 2);
        assert_eq!(sender.next_packet().await, Some((vec![1], to)));
        assert_eq!(sender.try_next_packet().await, Some((vec![2], to)));
        assert_eq!(sender.try_next_packet().await, None);
    }
}
