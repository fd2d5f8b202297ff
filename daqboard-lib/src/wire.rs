//! # Wire formats of the DAQ board command channel
//!
//! The command channel and the ADC monitoring channel disagree on byte order,
//! and both orders are fixed by the firmware:
//!
//! - **`decode_msb_first`**: byte `i` of an `n`-byte string contributes
//!   `byte[i] << 8 * (n - 1 - i)`. Used on the acknowledge halves after they
//!   have been reversed by [`split_acknowledge`].
//! - **`decode_lsb_first`**: byte `i` contributes `byte[i] << 8 * i`. Used for
//!   every word of the monitoring stream.
//!
//! Outgoing command words are placed on the wire with [`encode_lsb_first`].

use crate::error::DaqError;
use bytes::{BufMut, BytesMut};
use modular_bitfield::prelude::*;
use std::fmt;

/// Size of one protocol word in bytes.
pub const WORD_SIZE: usize = 4;

/// Width of the register offset inside an instruction word.
pub const REGISTER_ADDRESS_BITS: u32 = 8;

/// Width of the module selector inside an instruction word.
pub const MODULE_ADDRESS_BITS: u32 = 4;

/// Position of the read/write indicator (0 = write, 1 = read).
pub const READ_BIT: u32 = REGISTER_ADDRESS_BITS + MODULE_ADDRESS_BITS;

/// Size of the acknowledge transfer (header word + data word).
pub const ACK_SIZE: usize = 2 * WORD_SIZE;

/// Header value the board answers a write with.
pub const ACK_HEADER_WRITE: u32 = 0x1;

/// Header value the board answers a read with.
pub const ACK_HEADER_READ: u32 = 0x0;

/// Most-significant byte first. At most [`WORD_SIZE`] bytes are consumed.
pub fn decode_msb_first(bytes: &[u8]) -> u32 {
    let bytes = &bytes[..bytes.len().min(WORD_SIZE)];
    let n = bytes.len();
    bytes
        .iter()
        .enumerate()
        .fold(0u32, |word, (i, &b)| word | (u32::from(b) << (8 * (n - 1 - i))))
}

/// Least-significant byte first. At most [`WORD_SIZE`] bytes are consumed.
pub fn decode_lsb_first(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(WORD_SIZE)
        .enumerate()
        .fold(0u32, |word, (i, &b)| word | (u32::from(b) << (8 * i)))
}

/// Splits a word into bytes, least significant first.
pub fn encode_lsb_first(word: u32) -> [u8; WORD_SIZE] {
    let mut buf = BytesMut::with_capacity(WORD_SIZE);
    buf.put_u32_le(word);
    let mut out = [0u8; WORD_SIZE];
    out.copy_from_slice(&buf);
    out
}

/// Module/register pair selecting one 32-bit register on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterAddress {
    pub module: u8,
    pub offset: u8,
}

impl RegisterAddress {
    pub const fn new(module: u8, offset: u8) -> Self {
        Self { module, offset }
    }

    /// `(module << 8) | offset`
    pub const fn raw(&self) -> u16 {
        ((self.module as u16) << REGISTER_ADDRESS_BITS) | self.offset as u16
    }

    /// Builds an address from untrusted input, rejecting modules wider than 4 bits.
    pub fn checked(module: u8, offset: u8) -> Result<Self, DaqError> {
        if u32::from(module) >= 1 << MODULE_ADDRESS_BITS {
            return Err(DaqError::Config(format!(
                "module {module:#x} does not fit in {MODULE_ADDRESS_BITS} bits"
            )));
        }
        Ok(Self::new(module, offset))
    }
}

impl fmt::Display for RegisterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}:{:#04x}", self.module, self.offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Write,
    Read,
}

#[bitfield(bytes = 4)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstructionWord {
    pub register: u8,
    pub module: B4,
    pub read: bool,
    #[skip]
    unused: B19,
}

impl InstructionWord {
    pub fn for_access(address: RegisterAddress, access: Access) -> Self {
        InstructionWord::new()
            .with_register(address.offset)
            .with_module(address.module & 0x0F)
            .with_read(access == Access::Read)
    }

    pub fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.into_bytes())
    }

    pub fn from_u32(word: u32) -> Self {
        InstructionWord::from_bytes(word.to_le_bytes())
    }

    pub fn address(&self) -> RegisterAddress {
        RegisterAddress::new(self.module(), self.register())
    }
}

/// Header and data word returned by the board after every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledge {
    pub header: u32,
    pub data: u32,
}

impl Acknowledge {
    /// Parses the 8-byte acknowledge transfer.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, DaqError> {
        let bytes: &[u8; ACK_SIZE] = bytes.try_into().map_err(|_| {
            let (expected, actual) = (ACK_SIZE, bytes.len());
            if actual > expected {
                DaqError::OversizedTransfer { expected, actual }
            } else {
                DaqError::ShortTransfer { expected, actual }
            }
        })?;
        let (header, data) = split_acknowledge(bytes);
        Ok(Self {
            header: decode_msb_first(&header),
            data: decode_msb_first(&data),
        })
    }
}

/// Separates the two acknowledge words, reversing the byte order of each half.
pub fn split_acknowledge(bytes: &[u8; ACK_SIZE]) -> ([u8; WORD_SIZE], [u8; WORD_SIZE]) {
    let mut header = [0u8; WORD_SIZE];
    let mut data = [0u8; WORD_SIZE];
    for k in 0..WORD_SIZE {
        header[k] = bytes[WORD_SIZE - 1 - k];
        data[k] = bytes[ACK_SIZE - 1 - k];
    }
    (header, data)
}
