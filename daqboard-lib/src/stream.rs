//! # ADC monitoring stream
//!
//! While streaming is enabled the board pushes 24-byte monitoring records on
//! the ADC endpoint. USB reads return whatever is buffered, so a read can end
//! anywhere inside a record (or inside a word). [`AdcStreamDecoder`] carries
//! the unfinished tail over to the next read, which makes the decoded record
//! sequence independent of how the byte stream was chunked.
//!
//! Record layout, six words read least-significant byte first:
//!
//! | word | bits    | content                          |
//! |------|---------|----------------------------------|
//! | 0    | 0–1     | data type                        |
//! | 0    | 2–5     | module address                   |
//! | 0    | 6       | LDO on                           |
//! | 1    | 0–23    | timestamp, low 24 bits           |
//! | 2    | 0–23    | timestamp, high 24 bits          |
//! | 3–5  | 0–11    | channel 0 / 2 / 4                |
//! | 3–5  | 12–23   | channel 1 / 3 / 5                |
//!
//! The final read of a run ends with the [`END_OF_RUN`] marker.

use crate::error::DaqError;
use crate::telemetry::{adc_to_current, adc_to_temperature};
use crate::wire::{WORD_SIZE, decode_lsb_first};
use bytes::{BufMut, BytesMut};
use modular_bitfield::prelude::*;
use std::fmt;

/// Last word of the last read of a run.
pub const END_OF_RUN: u32 = 0xCAFE_FADE;

pub const RECORD_WORDS: usize = 6;
pub const RECORD_SIZE: usize = RECORD_WORDS * WORD_SIZE;
pub const CHANNELS: usize = 6;

const TIMESTAMP_MASK: u32 = 0x00FF_FFFF;
const CHANNEL_MASK: u32 = 0x0FFF;

#[bitfield(bytes = 4)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordStatus {
    pub data_type: B2,
    pub module_address: B4,
    pub ldo_on: bool,
    #[skip]
    unused: B25,
}

/// One decoded monitoring record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitoringRecord {
    pub ldo_on: bool,
    pub module_address: u8,
    pub data_type: u8,
    pub timestamp_high: u32,
    pub timestamp_low: u32,
    /// NTC, MONV, MONI, 1.8 V digital, 1.8 V digital I/O, 1.8 V analog.
    pub channels: [u16; CHANNELS],
}

impl MonitoringRecord {
    pub fn from_words(words: &[u32; RECORD_WORDS]) -> Self {
        let status = RecordStatus::from_bytes(words[0].to_le_bytes());
        let mut channels = [0u16; CHANNELS];
        for (pair, word) in words[3..].iter().enumerate() {
            channels[2 * pair] = (word & CHANNEL_MASK) as u16;
            channels[2 * pair + 1] = ((word >> 12) & CHANNEL_MASK) as u16;
        }
        Self {
            ldo_on: status.ldo_on(),
            module_address: status.module_address(),
            data_type: status.data_type(),
            timestamp_low: words[1] & TIMESTAMP_MASK,
            timestamp_high: words[2] & TIMESTAMP_MASK,
            channels,
        }
    }

    /// Decodes exactly [`RECORD_SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DaqError> {
        if bytes.len() != RECORD_SIZE {
            return Err(DaqError::Format(format!(
                "monitoring record must be {RECORD_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut words = [0u32; RECORD_WORDS];
        for (word, raw) in words.iter_mut().zip(bytes.chunks_exact(WORD_SIZE)) {
            *word = decode_lsb_first(raw);
        }
        Ok(Self::from_words(&words))
    }

    /// Inverse of [`MonitoringRecord::from_words`] for in-range values.
    pub fn to_words(&self) -> [u32; RECORD_WORDS] {
        let status = RecordStatus::new()
            .with_data_type(self.data_type & 0x3)
            .with_module_address(self.module_address & 0xF)
            .with_ldo_on(self.ldo_on);
        let pair = |k: usize| {
            (u32::from(self.channels[2 * k]) & CHANNEL_MASK)
                | ((u32::from(self.channels[2 * k + 1]) & CHANNEL_MASK) << 12)
        };
        [
            u32::from_le_bytes(status.into_bytes()),
            self.timestamp_low & TIMESTAMP_MASK,
            self.timestamp_high & TIMESTAMP_MASK,
            pair(0),
            pair(1),
            pair(2),
        ]
    }

    /// Wire bytes of this record.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(RECORD_SIZE);
        for word in self.to_words() {
            buf.put_u32_le(word);
        }
        buf.to_vec()
    }

    /// 48-bit timestamp.
    pub fn timestamp(&self) -> u64 {
        (u64::from(self.timestamp_high) << 24) | u64::from(self.timestamp_low)
    }

    pub fn temperature_k(&self) -> f64 {
        adc_to_temperature(self.channels[0])
    }

    pub fn digital_current_ma(&self) -> f64 {
        adc_to_current(self.channels[3])
    }

    pub fn output_current_ma(&self) -> f64 {
        adc_to_current(self.channels[4])
    }

    pub fn analog_current_ma(&self) -> f64 {
        adc_to_current(self.channels[5])
    }
}

impl fmt::Display for MonitoringRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ts={:#014x} ldo={} module={} type={} adc=[{:03x} {:03x} {:03x} {:03x} {:03x} {:03x}]",
            self.timestamp(),
            u8::from(self.ldo_on),
            self.module_address,
            self.data_type,
            self.channels[0],
            self.channels[1],
            self.channels[2],
            self.channels[3],
            self.channels[4],
            self.channels[5],
        )
    }
}

/// The last four bytes seen on the stream, for sentinel detection across reads.
#[derive(Debug, Default, Clone)]
struct SentinelWindow {
    bytes: [u8; WORD_SIZE],
    filled: usize,
}

impl SentinelWindow {
    /// Feeds one read; true when the stream now ends with [`END_OF_RUN`].
    fn push(&mut self, chunk: &[u8]) -> bool {
        if chunk.is_empty() {
            return false;
        }
        for &b in chunk.iter().skip(chunk.len().saturating_sub(WORD_SIZE)) {
            self.bytes.rotate_left(1);
            self.bytes[WORD_SIZE - 1] = b;
            self.filled = (self.filled + 1).min(WORD_SIZE);
        }
        self.filled == WORD_SIZE && decode_lsb_first(&self.bytes) == END_OF_RUN
    }
}

/// Result of decoding one read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedChunk {
    pub records: Vec<MonitoringRecord>,
    pub end_of_run: bool,
}

/// Reassembles monitoring records across reads.
#[derive(Debug, Default)]
pub struct AdcStreamDecoder {
    carry: BytesMut,
    sentinel: SentinelWindow,
    records: u64,
}

impl AdcStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode_chunk(&mut self, chunk: &[u8]) -> DecodedChunk {
        let end_of_run = self.sentinel.push(chunk);
        self.carry.extend_from_slice(chunk);

        let complete = self.carry.len() / RECORD_SIZE;
        let mut records = Vec::with_capacity(complete);
        for _ in 0..complete {
            let raw = self.carry.split_to(RECORD_SIZE);
            let mut words = [0u32; RECORD_WORDS];
            for (word, bytes) in words.iter_mut().zip(raw.chunks_exact(WORD_SIZE)) {
                *word = decode_lsb_first(bytes);
            }
            records.push(MonitoringRecord::from_words(&words));
        }
        self.records += complete as u64;

        DecodedChunk { records, end_of_run }
    }

    /// Whole words waiting for the rest of their record (0..=5).
    pub fn leftover_words(&self) -> usize {
        self.carry.len() / WORD_SIZE
    }

    pub fn leftover_bytes(&self) -> usize {
        self.carry.len()
    }

    /// Records decoded since the last reset.
    pub fn records_decoded(&self) -> u64 {
        self.records
    }

    /// Checks that the run ended on a record boundary, optionally followed by
    /// the end-of-run marker, then clears the state.
    pub fn finish(&mut self) -> Result<(), DaqError> {
        let carry = std::mem::take(&mut self.carry);
        self.reset();
        if carry.len() % WORD_SIZE != 0 {
            return Err(DaqError::Format(format!(
                "run ended inside a word ({} trailing bytes)",
                carry.len()
            )));
        }
        match carry.len() / WORD_SIZE {
            0 => Ok(()),
            1 if decode_lsb_first(&carry) == END_OF_RUN => Ok(()),
            n => Err(DaqError::Format(format!(
                "run ended with {n} words of an incomplete record"
            ))),
        }
    }

    /// Drops all carried state; use at the start of a new run.
    pub fn reset(&mut self) {
        self.carry.clear();
        self.sentinel = SentinelWindow::default();
        self.records = 0;
    }
}

/// Bookkeeping of one raw read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawChunk {
    /// Records completed by this read.
    pub records: usize,
    pub end_of_run: bool,
}

/// Alignment and sentinel tracking for bit-exact archival; bytes are not decoded.
#[derive(Debug, Default)]
pub struct RawStreamTracker {
    carry_bytes: usize,
    sentinel: SentinelWindow,
    total_bytes: u64,
    total_records: u64,
}

impl RawStreamTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, chunk: &[u8]) -> RawChunk {
        let end_of_run = self.sentinel.push(chunk);
        let length = self.carry_bytes + chunk.len();
        let records = length / RECORD_SIZE;
        self.carry_bytes = length % RECORD_SIZE;
        self.total_bytes += chunk.len() as u64;
        self.total_records += records as u64;
        RawChunk { records, end_of_run }
    }

    pub fn leftover_words(&self) -> usize {
        self.carry_bytes / WORD_SIZE
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
