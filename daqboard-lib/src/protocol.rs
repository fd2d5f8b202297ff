//! Request/acknowledge command engine.
//!
//! Every transaction is an instruction word (plus a data word for writes) on
//! the write endpoint followed by one 8-byte acknowledge on the acknowledge
//! endpoint. Register copies are staged and only committed to the catalog
//! once the acknowledge has arrived, so a failed transfer leaves the board
//! model exactly as it was.

use crate::catalog::{
    ADC_OVERFLOW, RegisterCatalog, RegisterId, SOFTRESET_DURATION, SOFTRESET_FPGA_RESET, SOFTRESET_FX3_RESET, fields,
};
use crate::config::RegisterScript;
use crate::error::DaqError;
use crate::field::{Register, RegisterKind};
use crate::telemetry::{adc_to_current, adc_to_temperature};
use crate::wire::{
    ACK_HEADER_READ, ACK_HEADER_WRITE, ACK_SIZE, Access, Acknowledge, InstructionWord, RegisterAddress, WORD_SIZE,
    encode_lsb_first,
};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use strum_macros::Display;
use tracing::{debug, info, warn};

/// Bulk endpoints of the FX3 bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Endpoint {
    /// Instruction and data words, host to board.
    WriteRegister = 0x01,
    /// Acknowledge pairs.
    Acknowledge = 0x81,
    /// ADC monitoring stream.
    Monitoring = 0x82,
    /// Chip event data.
    EventData = 0x83,
}

/// Byte transport underneath the command engine.
///
/// Implementations report failures as transport errors
/// ([`DaqError::is_transport`]); the engine never retries.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Writes `data` to `endpoint`, returning the number of bytes accepted.
    async fn send(&mut self, endpoint: Endpoint, data: &[u8]) -> Result<usize, DaqError>;

    /// Reads at most `max_len` bytes from `endpoint`.
    async fn receive(&mut self, endpoint: Endpoint, max_len: usize) -> Result<Vec<u8>, DaqError>;
}

/// Value written to a soft-reset trigger register.
pub const SOFTRESET_TRIGGER: u32 = 13;
/// Reset pulse length used when the caller has no preference.
pub const DEFAULT_RESET_DURATION: u32 = 8;

/// Bit of each ADC read register reporting that its LDO is on.
const LDO_ON_BIT: u32 = 1 << 24;

/// Identification word of the FPGA firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub raw: u32,
}

impl FirmwareVersion {
    pub fn day(&self) -> u32 {
        self.raw & 0xFF
    }

    pub fn month(&self) -> u32 {
        (self.raw >> 8) & 0xF
    }

    pub fn year(&self) -> u32 {
        (self.raw >> 12) & 0xFFF
    }

    pub fn firmware_type(&self) -> u32 {
        self.raw >> 24
    }

    /// Low 24 bits: day, month and year.
    pub fn date(&self) -> u32 {
        self.raw & 0x00FF_FFFF
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x} {}/{}/{}", self.raw, self.day(), self.month(), self.year())
    }
}

/// Current-limit flags of the ADC overflow register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Overflow {
    pub digital: bool,
    pub digital_io: bool,
    pub analog: bool,
}

impl Overflow {
    pub fn from_word(word: u32) -> Self {
        Self {
            digital: word & 0x1 != 0,
            digital_io: word & 0x2 != 0,
            analog: word & 0x4 != 0,
        }
    }

    pub fn any(&self) -> bool {
        self.digital || self.digital_io || self.analog
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LdoStatus {
    /// One flag per ADC read register.
    pub ldo_on: [bool; 3],
    pub overflow: Overflow,
    pub overflow_raw: u32,
}

impl LdoStatus {
    pub fn all_on(&self) -> bool {
        self.ldo_on.iter().all(|on| *on)
    }
}

/// Every field of ADC configuration register 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcConfig0Settings {
    pub iref0: u32,
    pub iref1: u32,
    pub ldo_self_shutdown: bool,
    pub ldo_off: bool,
    pub stream_adc: bool,
    pub self_stop: bool,
    pub disable_reset_timestamp: bool,
    pub packet_based: bool,
}

impl Default for AdcConfig0Settings {
    fn default() -> Self {
        Self {
            iref0: 100,
            iref1: 500,
            ldo_self_shutdown: true,
            ldo_off: true,
            stream_adc: false,
            self_stop: false,
            disable_reset_timestamp: false,
            packet_based: false,
        }
    }
}

/// One DAQ board: the register model plus the transport it is driven over.
pub struct DaqBoard<T: Transport> {
    transport: T,
    registers: RegisterCatalog,
    firmware: Option<u32>,
}

impl<T: Transport> DaqBoard<T> {
    /// Wraps `transport` with the board's standard register set.
    pub fn new(transport: T) -> Result<Self, DaqError> {
        Ok(Self::with_catalog(transport, RegisterCatalog::new()?))
    }

    pub fn with_catalog(transport: T, registers: RegisterCatalog) -> Self {
        Self {
            transport,
            registers,
            firmware: None,
        }
    }

    pub fn registers(&self) -> &RegisterCatalog {
        &self.registers
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    // --- transactions -----------------------------------------------------

    async fn send_word(&mut self, word: u32) -> Result<(), DaqError> {
        let bytes = encode_lsb_first(word);
        let sent = self.transport.send(Endpoint::WriteRegister, &bytes).await?;
        if sent != WORD_SIZE {
            return Err(DaqError::ShortTransfer {
                expected: WORD_SIZE,
                actual: sent,
            });
        }
        Ok(())
    }

    async fn receive_ack(&mut self, access: Access) -> Result<Acknowledge, DaqError> {
        let bytes = self.transport.receive(Endpoint::Acknowledge, ACK_SIZE).await?;
        let ack = Acknowledge::from_wire(&bytes)?;
        let expected = match access {
            Access::Write => ACK_HEADER_WRITE,
            Access::Read => ACK_HEADER_READ,
        };
        if ack.header != expected {
            warn!(
                header = ack.header,
                expected,
                data = format_args!("{:#010x}", ack.data),
                "Unexpected acknowledge header"
            );
        }
        self.registers.get_mut(RegisterId::AckHeader).decode_word(ack.header);
        Ok(ack)
    }

    async fn transact_write(&mut self, address: RegisterAddress, value: u32) -> Result<Acknowledge, DaqError> {
        let instruction = InstructionWord::for_access(address, Access::Write).to_u32();
        debug!(address = %address, value = format_args!("{value:#010x}"), "Register write");
        self.send_word(instruction).await?;
        self.send_word(value).await?;
        let ack = self.receive_ack(Access::Write).await?;
        if ack.data != instruction {
            warn!(
                instruction = format_args!("{instruction:#010x}"),
                echoed = format_args!("{:#010x}", ack.data),
                "Write acknowledge does not echo the instruction"
            );
        }
        self.registers.get_mut(RegisterId::AckData).decode_word(ack.data);
        Ok(ack)
    }

    async fn transact_read(&mut self, address: RegisterAddress) -> Result<Acknowledge, DaqError> {
        let instruction = InstructionWord::for_access(address, Access::Read).to_u32();
        self.send_word(instruction).await?;
        let ack = self.receive_ack(Access::Read).await?;
        debug!(address = %address, value = format_args!("{:#010x}", ack.data), "Register read");
        Ok(ack)
    }

    fn address_of(register: &Register) -> Result<RegisterAddress, DaqError> {
        register.address().ok_or_else(|| {
            DaqError::Config(format!("register {} has no bus address", register.name()))
        })
    }

    /// Writes a staged copy and commits it once acknowledged.
    async fn write_staged(&mut self, id: RegisterId, staged: Register) -> Result<Acknowledge, DaqError> {
        let address = Self::address_of(&staged)?;
        let value = staged.pack()?;
        let ack = self.transact_write(address, value).await?;
        self.registers.commit(id, staged);
        Ok(ack)
    }

    /// Writes the current `set_value`s of a register.
    pub async fn write_register(&mut self, id: RegisterId) -> Result<Acknowledge, DaqError> {
        let staged = self.registers.get(id).clone();
        self.write_staged(id, staged).await
    }

    /// Reads a register, updating the `read_value` of each of its fields.
    pub async fn read_register(&mut self, id: RegisterId) -> Result<u32, DaqError> {
        let address = Self::address_of(self.registers.get(id))?;
        let ack = self.transact_read(address).await?;
        let mut staged = self.registers.get(id).clone();
        staged.decode_word(ack.data);
        self.registers.commit(id, staged);
        Ok(ack.data)
    }

    /// Writes a word to an address outside the catalog.
    pub async fn write_raw(&mut self, module: u8, offset: u8, value: u32) -> Result<Acknowledge, DaqError> {
        let address = RegisterAddress::checked(module, offset)?;
        self.transact_write(address, value).await
    }

    pub async fn read_raw(&mut self, module: u8, offset: u8) -> Result<u32, DaqError> {
        let address = RegisterAddress::checked(module, offset)?;
        Ok(self.transact_read(address).await?.data)
    }

    // --- fields -----------------------------------------------------------

    /// Assigns a field in the model only; nothing goes on the wire.
    pub fn set_field(&mut self, name: &str, value: u32) -> Result<RegisterId, DaqError> {
        self.registers.set_field(name, value)
    }

    /// Assigns a field and writes its register. Unknown names and
    /// out-of-range values fail before any I/O.
    pub async fn send_field_value(&mut self, name: &str, value: u32) -> Result<Acknowledge, DaqError> {
        let loc = self.registers.lookup(name)?;
        let mut staged = self.registers.get(loc.register).clone();
        staged.set_field_value(loc.index, value)?;
        self.write_staged(loc.register, staged).await
    }

    // --- identification ---------------------------------------------------

    /// Geographical address from the board's DIP switches (stored inverted).
    pub async fn board_address(&mut self) -> Result<u8, DaqError> {
        let word = self.read_register(RegisterId::IdAddress).await?;
        Ok((!word & 0x0F) as u8)
    }

    pub async fn read_firmware_version(&mut self) -> Result<FirmwareVersion, DaqError> {
        let raw = self.read_register(RegisterId::IdFirmware).await?;
        self.firmware = Some(raw);
        let version = FirmwareVersion { raw };
        info!(firmware = %version, "Firmware identified");
        Ok(version)
    }

    /// Firmware word from the last [`Self::read_firmware_version`].
    pub fn firmware_version(&self) -> Option<u32> {
        self.firmware
    }

    pub fn firmware_date(&self) -> Option<u32> {
        self.firmware.map(|raw| FirmwareVersion { raw }.date())
    }

    // --- ADC configuration ------------------------------------------------

    /// Sets the three reference currents; register 0 is written before 1.
    pub async fn send_iref_values(&mut self, iref0: u32, iref1: u32, iref2: u32) -> Result<(), DaqError> {
        let mut config0 = self.registers.get(RegisterId::AdcConfig0).clone();
        let mut config1 = self.registers.get(RegisterId::AdcConfig1).clone();
        config0.set_field_value(0, iref0)?;
        config0.set_field_value(1, iref1)?;
        config1.set_field_value(0, iref2)?;
        self.write_staged(RegisterId::AdcConfig0, config0).await?;
        self.write_staged(RegisterId::AdcConfig1, config1).await?;
        Ok(())
    }

    pub async fn send_adc_control(&mut self, ldo_self_shutdown: bool, ldo_off: bool) -> Result<Acknowledge, DaqError> {
        let mut config0 = self.registers.get(RegisterId::AdcConfig0).clone();
        config0.set_field_value(2, u32::from(ldo_self_shutdown))?;
        config0.set_field_value(3, u32::from(ldo_off))?;
        self.write_staged(RegisterId::AdcConfig0, config0).await
    }

    pub async fn send_adc_config0(&mut self, settings: &AdcConfig0Settings) -> Result<Acknowledge, DaqError> {
        let values = [
            settings.iref0,
            settings.iref1,
            u32::from(settings.ldo_self_shutdown),
            u32::from(settings.ldo_off),
            u32::from(settings.stream_adc),
            u32::from(settings.self_stop),
            u32::from(settings.disable_reset_timestamp),
            u32::from(settings.packet_based),
        ];
        let mut config0 = self.registers.get(RegisterId::AdcConfig0).clone();
        for (index, value) in values.into_iter().enumerate() {
            config0.set_field_value(index, value)?;
        }
        self.write_staged(RegisterId::AdcConfig0, config0).await
    }

    pub async fn send_adc_config1(&mut self, iref2: u32) -> Result<Acknowledge, DaqError> {
        let mut config1 = self.registers.get(RegisterId::AdcConfig1).clone();
        config1.set_field_value(0, iref2)?;
        self.write_staged(RegisterId::AdcConfig1, config1).await
    }

    pub async fn start_adc_stream(&mut self) -> Result<Acknowledge, DaqError> {
        info!("Starting ADC stream");
        self.send_field_value(fields::EN_STREAM_ADC_DATA, 1).await
    }

    pub async fn stop_adc_stream(&mut self) -> Result<Acknowledge, DaqError> {
        info!("Stopping ADC stream");
        self.send_field_value(fields::EN_STREAM_ADC_DATA, 0).await
    }

    // --- ADC monitoring ---------------------------------------------------

    /// Reads the register holding monitor field `name` and returns its code.
    pub async fn read_adc(&mut self, name: &str) -> Result<u32, DaqError> {
        let loc = self.registers.lookup(name)?;
        if self.registers.get(loc.register).kind() != RegisterKind::Monitor {
            return Err(DaqError::Config(format!("{name} is not an ADC monitor field")));
        }
        self.read_register(loc.register).await?;
        self.registers.get(loc.register).read_value(loc.index)
    }

    /// NTC temperature in Kelvin.
    pub async fn read_temperature(&mut self) -> Result<f64, DaqError> {
        let code = self.read_adc(fields::ADC_NTC).await?;
        Ok(adc_to_temperature(code as u16))
    }

    pub async fn read_digital_current(&mut self) -> Result<f64, DaqError> {
        let code = self.read_adc(fields::ADC_V18D).await?;
        Ok(adc_to_current(code as u16))
    }

    pub async fn read_output_current(&mut self) -> Result<f64, DaqError> {
        let code = self.read_adc(fields::ADC_V18O).await?;
        Ok(adc_to_current(code as u16))
    }

    pub async fn read_analog_current(&mut self) -> Result<f64, DaqError> {
        let code = self.read_adc(fields::ADC_V18A).await?;
        Ok(adc_to_current(code as u16))
    }

    pub async fn ldo_status(&mut self) -> Result<LdoStatus, DaqError> {
        let mut ldo_on = [false; 3];
        let reads = [RegisterId::AdcRead0, RegisterId::AdcRead1, RegisterId::AdcRead2];
        for (on, id) in ldo_on.iter_mut().zip(reads) {
            *on = self.read_register(id).await? & LDO_ON_BIT != 0;
        }
        let overflow_raw = self.transact_read(ADC_OVERFLOW).await?.data;
        let status = LdoStatus {
            ldo_on,
            overflow: Overflow::from_word(overflow_raw),
            overflow_raw,
        };
        if !status.all_on() {
            warn!(ldo = ?status.ldo_on, overflow = ?status.overflow, "LDO off");
        }
        Ok(status)
    }

    /// One read of the monitoring endpoint.
    pub async fn read_adc_chunk(&mut self, max_len: usize) -> Result<Vec<u8>, DaqError> {
        self.transport.receive(Endpoint::Monitoring, max_len).await
    }

    // --- resets and scripts -----------------------------------------------

    async fn soft_reset(&mut self, trigger: RegisterAddress, duration: u32) -> Result<(), DaqError> {
        self.transact_write(SOFTRESET_DURATION, duration).await?;
        self.transact_write(trigger, SOFTRESET_TRIGGER).await?;
        Ok(())
    }

    pub async fn reset_fpga(&mut self, duration: u32) -> Result<(), DaqError> {
        info!(duration, "Resetting FPGA");
        self.soft_reset(SOFTRESET_FPGA_RESET, duration).await
    }

    pub async fn reset_fx3(&mut self, duration: u32) -> Result<(), DaqError> {
        info!(duration, "Resetting FX3");
        self.soft_reset(SOFTRESET_FX3_RESET, duration).await
    }

    /// Applies the active writes of `script` in priority order; returns how
    /// many were written. Stops at the first failure.
    pub async fn apply_script(&mut self, script: &RegisterScript) -> Result<usize, DaqError> {
        let mut applied = 0;
        for write in script.ordered_writes() {
            debug!(
                module = write.module,
                register = write.register,
                value = write.value,
                priority = write.priority,
                "Script write"
            );
            self.write_raw(write.module, write.register, write.value).await?;
            applied += 1;
        }
        info!(applied, "Register script applied");
        Ok(applied)
    }
}
