//! Register catalog of the DAQ board firmware.
//!
//! Declaration order inside each register fixes the bit offsets on the wire:
//! reordering a field list is a breaking change of the register layout.

use crate::error::DaqError;
use crate::field::{Field, Register, RegisterKind};
use crate::wire::RegisterAddress;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::collections::HashMap;
use strum_macros::Display;
use tracing::{debug, warn};

/// Firmware modules addressed by the upper nibble of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Module {
    #[strum(to_string = "FPGA")]
    Fpga = 0x0,
    #[strum(to_string = "ADC")]
    Adc = 0x1,
    #[strum(to_string = "JTAG")]
    Jtag = 0x4,
    #[strum(to_string = "RESET")]
    Reset = 0x5,
    #[strum(to_string = "IDENT")]
    Ident = 0x6,
    #[strum(to_string = "SOFTRESET")]
    SoftReset = 0x7,
}

impl Module {
    pub const fn register(self, offset: u8) -> RegisterAddress {
        RegisterAddress::new(self as u8, offset)
    }
}

// ADC module
pub const ADC_CONFIG0: RegisterAddress = Module::Adc.register(0x0);
pub const ADC_CONFIG1: RegisterAddress = Module::Adc.register(0x1);
pub const ADC_CONFIG2: RegisterAddress = Module::Adc.register(0x2);
pub const ADC_READ0: RegisterAddress = Module::Adc.register(0x3);
pub const ADC_READ1: RegisterAddress = Module::Adc.register(0x4);
pub const ADC_READ2: RegisterAddress = Module::Adc.register(0x5);
pub const ADC_OVERFLOW: RegisterAddress = Module::Adc.register(0x9);

// JTAG module
pub const JTAG_WRITE_INSTR: RegisterAddress = Module::Jtag.register(0x0);
pub const JTAG_WRITE_DATA: RegisterAddress = Module::Jtag.register(0x1);

// RESET module
pub const RESET_DURATION: RegisterAddress = Module::Reset.register(0x0);
pub const RESET_DELAYS: RegisterAddress = Module::Reset.register(0x1);
pub const RESET_POWERON: RegisterAddress = Module::Reset.register(0x6);

// IDENT module
pub const IDENT_ADDRESS: RegisterAddress = Module::Ident.register(0x0);
pub const IDENT_FIRMWARE: RegisterAddress = Module::Ident.register(0x2);

// SOFTRESET module
pub const SOFTRESET_DURATION: RegisterAddress = Module::SoftReset.register(0x0);
pub const SOFTRESET_FPGA_RESET: RegisterAddress = Module::SoftReset.register(0x1);
pub const SOFTRESET_FX3_RESET: RegisterAddress = Module::SoftReset.register(0x2);

/// Symbolic name of a well-known register address.
pub fn describe(address: RegisterAddress) -> Option<&'static str> {
    let name = match address {
        ADC_CONFIG0 => "ADC_CONFIG0",
        ADC_CONFIG1 => "ADC_CONFIG1",
        ADC_CONFIG2 => "ADC_CONFIG2",
        ADC_READ0 => "ADC_READ0",
        ADC_READ1 => "ADC_READ1",
        ADC_READ2 => "ADC_READ2",
        ADC_OVERFLOW => "ADC_OVERFLOW",
        JTAG_WRITE_INSTR => "JTAG_WRITE_INSTR",
        JTAG_WRITE_DATA => "JTAG_WRITE_DATA",
        RESET_DURATION => "RESET_DURATION",
        RESET_DELAYS => "RESET_DELAYS",
        RESET_POWERON => "RESET_POWERON",
        IDENT_ADDRESS => "IDENT_ADDRESS",
        IDENT_FIRMWARE => "IDENT_FIRMWARE",
        SOFTRESET_DURATION => "SOFTRESET_DURATION",
        SOFTRESET_FPGA_RESET => "SOFTRESET_FPGA_RESET",
        SOFTRESET_FX3_RESET => "SOFTRESET_FX3_RESET",
        _ => return None,
    };
    Some(name)
}

/// Registers known to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RegisterId {
    AckHeader,
    AckData,
    AdcConfig0,
    AdcConfig1,
    AdcRead0,
    AdcRead1,
    AdcRead2,
    IdAddress,
    IdFirmware,
}

impl RegisterId {
    pub const ALL: [RegisterId; 9] = [
        RegisterId::AckHeader,
        RegisterId::AckData,
        RegisterId::AdcConfig0,
        RegisterId::AdcConfig1,
        RegisterId::AdcRead0,
        RegisterId::AdcRead1,
        RegisterId::AdcRead2,
        RegisterId::IdAddress,
        RegisterId::IdFirmware,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Field names, as the firmware documentation spells them.
pub mod fields {
    pub const IREF0: &str = "Iref0";
    pub const IREF1: &str = "Iref1";
    pub const IREF2: &str = "Iref2";
    pub const EN_LDO_SELF_SHUTDOWN: &str = "EnLDOSelfShtdn";
    pub const EN_LDO_OFF: &str = "EnLDOff";
    pub const EN_STREAM_ADC_DATA: &str = "EnStreamADCData";
    pub const ADC_SELF_STOP: &str = "ADCSelfStop";
    pub const ADC_DISABLE_RESET_TIMESTAMP: &str = "ADCDisableResetTimeStamp";
    pub const ADC_ENABLE_PACKET_BASED: &str = "ADCEnablePacketBased";
    pub const ADC_NTC: &str = "ADC_NTC";
    pub const ADC_MONV: &str = "ADC_MONV";
    pub const ADC_MONI: &str = "ADC_MONI";
    pub const ADC_V18D: &str = "ADC_V18D";
    pub const ADC_V18O: &str = "ADC_V18O";
    pub const ADC_V18A: &str = "ADC_V18A";
    pub const BOARD_ADDRESS: &str = "BoardAddress";
    pub const DAY: &str = "Day";
    pub const MONTH: &str = "Month";
    pub const YEAR: &str = "Year";
    pub const FIRMWARE_TYPE: &str = "FirmwareType";
}

const ADC_MAX: u32 = 4095;

pub(crate) fn standard_registers() -> Vec<(RegisterId, Register)> {
    use fields::*;
    vec![
        (
            RegisterId::AckHeader,
            Register::new("AckHeader", None, RegisterKind::Fixed).with_field(Field::full("header", 32)),
        ),
        (
            RegisterId::AckData,
            Register::new("AckData", None, RegisterKind::Fixed).with_field(Field::full("Data", 32)),
        ),
        (
            RegisterId::AdcConfig0,
            Register::new("AdcConfig0", Some(ADC_CONFIG0), RegisterKind::Config)
                .with_field(Field::new(IREF0, 12, 0, ADC_MAX, 100))
                .with_field(Field::new(IREF1, 12, 0, ADC_MAX, 500))
                .with_field(Field::new(EN_LDO_SELF_SHUTDOWN, 1, 0, 1, 1))
                .with_field(Field::new(EN_LDO_OFF, 1, 0, 1, 1))
                .with_field(Field::new(EN_STREAM_ADC_DATA, 1, 0, 1, 0))
                .with_field(Field::new(ADC_SELF_STOP, 1, 0, 1, 0))
                .with_field(Field::new(ADC_DISABLE_RESET_TIMESTAMP, 1, 0, 1, 0))
                .with_field(Field::new(ADC_ENABLE_PACKET_BASED, 1, 0, 1, 0)),
        ),
        (
            RegisterId::AdcConfig1,
            Register::new("AdcConfig1", Some(ADC_CONFIG1), RegisterKind::Config)
                .with_field(Field::new(IREF2, 12, 0, ADC_MAX, 100)),
        ),
        (
            RegisterId::AdcRead0,
            Register::new("AdcRead0", Some(ADC_READ0), RegisterKind::Monitor)
                .with_field(Field::new(ADC_NTC, 12, 0, ADC_MAX, 0))
                .with_field(Field::new(ADC_MONV, 12, 0, ADC_MAX, 0)),
        ),
        (
            RegisterId::AdcRead1,
            Register::new("AdcRead1", Some(ADC_READ1), RegisterKind::Monitor)
                .with_field(Field::new(ADC_MONI, 12, 0, ADC_MAX, 0))
                .with_field(Field::new(ADC_V18D, 12, 0, ADC_MAX, 0)),
        ),
        (
            RegisterId::AdcRead2,
            Register::new("AdcRead2", Some(ADC_READ2), RegisterKind::Monitor)
                .with_field(Field::new(ADC_V18O, 12, 0, ADC_MAX, 0))
                .with_field(Field::new(ADC_V18A, 12, 0, ADC_MAX, 0)),
        ),
        (
            RegisterId::IdAddress,
            Register::new("IdAddress", Some(IDENT_ADDRESS), RegisterKind::Fixed)
                .with_field(Field::full(BOARD_ADDRESS, 8)),
        ),
        (
            RegisterId::IdFirmware,
            Register::new("IdFirmware", Some(IDENT_FIRMWARE), RegisterKind::Fixed)
                .with_field(Field::full(DAY, 8))
                .with_field(Field::new(MONTH, 4, 0, 0xC, 0))
                .with_field(Field::full(YEAR, 12))
                .with_field(Field::full(FIRMWARE_TYPE, 8)),
        ),
    ]
}

/// Where a named field lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLocation {
    pub register: RegisterId,
    pub index: usize,
}

/// Name → location table. Every name appears at most once.
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    entries: HashMap<&'static str, FieldLocation>,
}

impl FieldCatalog {
    /// Adds `name`. A name that is already present is the error case and
    /// leaves the existing entry untouched; a vacant name is accepted.
    /// `Ok` therefore means the name was absent, not that it was found.
    pub fn insert(&mut self, name: &'static str, location: FieldLocation) -> Result<(), DaqError> {
        if let Some(existing) = self.entries.get(name) {
            warn!(
                field = name,
                existing = %existing.register,
                rejected = %location.register,
                "Field name already exists"
            );
            return Err(DaqError::DuplicateField {
                name: name.to_string(),
                register: location.register.to_string(),
            });
        }
        self.entries.insert(name, location);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<FieldLocation, DaqError> {
        self.entries.get(name).copied().ok_or_else(|| {
            warn!(field = name, "Field not found");
            DaqError::UnknownField(name.to_string())
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by name.
    pub fn entries(&self) -> Vec<(&'static str, FieldLocation)> {
        let mut out: Vec<_> = self.entries.iter().map(|(k, v)| (*k, *v)).collect();
        out.sort_by_key(|(name, _)| *name);
        out
    }
}

/// All registers of one board plus the field-name table.
#[derive(Debug, Clone)]
pub struct RegisterCatalog {
    registers: Vec<Register>,
    names: FieldCatalog,
}

impl RegisterCatalog {
    /// Builds and validates the board's register set.
    pub fn new() -> Result<Self, DaqError> {
        Self::from_registers(standard_registers())
    }

    /// Validates `registers` (one per [`RegisterId`], in [`RegisterId::ALL`]
    /// order) and indexes every addressable field by name.
    pub fn from_registers(registers: Vec<(RegisterId, Register)>) -> Result<Self, DaqError> {
        if registers.len() != RegisterId::ALL.len()
            || registers.iter().zip(RegisterId::ALL).any(|((id, _), expected)| *id != expected)
        {
            return Err(DaqError::Config(
                "register list must follow RegisterId::ALL order".to_string(),
            ));
        }
        let mut names = FieldCatalog::default();
        let mut out = Vec::with_capacity(registers.len());
        for (id, register) in registers {
            register.validate()?;
            if register.address().is_some() {
                for (index, field) in register.fields().iter().enumerate() {
                    names.insert(field.name, FieldLocation { register: id, index })?;
                }
            }
            debug!(register = %id, width = register.total_width(), "Register declared");
            out.push(register);
        }
        Ok(Self { registers: out, names })
    }

    pub fn get(&self, id: RegisterId) -> &Register {
        &self.registers[id.index()]
    }

    pub fn get_mut(&mut self, id: RegisterId) -> &mut Register {
        &mut self.registers[id.index()]
    }

    /// Swaps in a staged copy of a register after a successful transaction.
    pub(crate) fn commit(&mut self, id: RegisterId, register: Register) {
        self.registers[id.index()] = register;
    }

    pub fn names(&self) -> &FieldCatalog {
        &self.names
    }

    pub fn lookup(&self, name: &str) -> Result<FieldLocation, DaqError> {
        self.names.lookup(name)
    }

    /// Sets a field by name without any I/O.
    pub fn set_field(&mut self, name: &str, value: u32) -> Result<RegisterId, DaqError> {
        let loc = self.lookup(name)?;
        self.get_mut(loc.register).set_field_value(loc.index, value)?;
        Ok(loc.register)
    }

    /// Last decoded value of a field.
    pub fn read_value(&self, name: &str) -> Result<u32, DaqError> {
        let loc = self.lookup(name)?;
        self.get(loc.register).read_value(loc.index)
    }
}
