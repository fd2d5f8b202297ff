//! Common test utilities and shared imports

// Shared across test files; not every file uses every item
#![allow(dead_code)]

use daqboard_lib::error::DaqError;
use daqboard_lib::protocol::{Endpoint, Transport};
use daqboard_lib::stream::{END_OF_RUN, MonitoringRecord};
use std::collections::VecDeque;
use std::io;
use tracing_subscriber::EnvFilter;

/// Routes library logs through the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Scripted stand-in for the USB link.
///
/// Every send is recorded; receives are served from per-endpoint queues.
/// An empty queue behaves like a timed-out read.
#[derive(Default)]
pub struct MockTransport {
    pub sent: Vec<(Endpoint, Vec<u8>)>,
    acks: VecDeque<Vec<u8>>,
    adc: VecDeque<Vec<u8>>,
    /// Sends with this index or later fail.
    pub fail_sends_from: Option<usize>,
    /// Sends report one byte fewer than requested.
    pub short_sends: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ack(&mut self, header: u32, data: u32) {
        let mut bytes = header.to_le_bytes().to_vec();
        bytes.extend_from_slice(&data.to_le_bytes());
        self.acks.push_back(bytes);
    }

    pub fn push_raw_ack(&mut self, bytes: &[u8]) {
        self.acks.push_back(bytes.to_vec());
    }

    /// Acknowledge of a write: header 1, data echoing the instruction.
    pub fn push_write_ack(&mut self, instruction: u32) {
        self.push_ack(1, instruction);
    }

    pub fn push_read_ack(&mut self, value: u32) {
        self.push_ack(0, value);
    }

    pub fn push_adc(&mut self, bytes: &[u8]) {
        self.adc.push_back(bytes.to_vec());
    }

    pub fn pending_acks(&self) -> usize {
        self.acks.len()
    }

    /// Every sent chunk decoded as one least-significant-first word.
    pub fn sent_words(&self) -> Vec<u32> {
        self.sent
            .iter()
            .map(|(endpoint, bytes)| {
                assert_eq!(*endpoint, Endpoint::WriteRegister);
                u32::from_le_bytes(bytes.as_slice().try_into().expect("4-byte command word"))
            })
            .collect()
    }
}

fn timed_out(what: &str) -> DaqError {
    DaqError::Usb(io::Error::new(io::ErrorKind::TimedOut, what.to_string()))
}

impl Transport for MockTransport {
    async fn send(&mut self, endpoint: Endpoint, data: &[u8]) -> Result<usize, DaqError> {
        if self.fail_sends_from.is_some_and(|n| self.sent.len() >= n) {
            return Err(DaqError::Usb(io::Error::new(io::ErrorKind::BrokenPipe, "send failed")));
        }
        self.sent.push((endpoint, data.to_vec()));
        if self.short_sends {
            return Ok(data.len() - 1);
        }
        Ok(data.len())
    }

    async fn receive(&mut self, endpoint: Endpoint, max_len: usize) -> Result<Vec<u8>, DaqError> {
        let queue = match endpoint {
            Endpoint::Acknowledge => &mut self.acks,
            Endpoint::Monitoring => &mut self.adc,
            other => return Err(timed_out(&format!("nothing scripted on {other}"))),
        };
        let mut bytes = queue.pop_front().ok_or_else(|| timed_out("read timed out"))?;
        bytes.truncate(max_len);
        Ok(bytes)
    }
}

/// Deterministic record used to build streams.
pub fn record(seed: u32) -> MonitoringRecord {
    MonitoringRecord {
        ldo_on: seed % 3 != 0,
        module_address: (seed % 16) as u8,
        data_type: (seed % 4) as u8,
        timestamp_high: seed >> 4,
        timestamp_low: (seed * 1000) & 0x00FF_FFFF,
        channels: [1358, 200, 300, 1000 + seed as u16, 50, 4095],
    }
}

/// `count` records, optionally terminated by the end-of-run marker.
pub fn stream(count: u32, terminated: bool) -> Vec<u8> {
    let mut bytes: Vec<u8> = (0..count).flat_map(|i| record(i).to_bytes()).collect();
    if terminated {
        bytes.extend_from_slice(&END_OF_RUN.to_le_bytes());
    }
    bytes
}
