//! Board connection settings and register scripts.
//!
//! Both are plain TOML:
//!
//! ```toml
//! # board.toml
//! write_timeout_ms = 1000
//! ack_timeout_ms = 1000
//! adc_read_len = 4096
//!
//! # script.toml
//! [[write]]
//! name = "adc_config0"
//! module = 1
//! register = 0
//! value = 0x00c1f464
//! priority = 0
//! ```

use crate::error::DaqError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

fn read_file(path: &Path) -> Result<String, DaqError> {
    std::fs::read_to_string(path).map_err(|source| DaqError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// How to open and drive a board.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Pick the board on this bus/address when several are attached.
    pub bus_number: Option<u8>,
    pub device_address: Option<u8>,
    pub write_timeout_ms: u64,
    pub ack_timeout_ms: u64,
    pub adc_timeout_ms: u64,
    /// Buffer size of one monitoring-endpoint read.
    pub adc_read_len: usize,
    /// Skip the USB port reset on open.
    pub skip_reset: bool,
    /// Drain stale data from the IN endpoints on open.
    pub purge_on_open: bool,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            vendor_id: crate::device::VID,
            product_id: crate::device::PID,
            bus_number: None,
            device_address: None,
            write_timeout_ms: 1000,
            ack_timeout_ms: 1000,
            adc_timeout_ms: 500,
            adc_read_len: 4096,
            skip_reset: false,
            purge_on_open: true,
        }
    }
}

impl BoardConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DaqError> {
        Self::from_toml(&read_file(path.as_ref())?)
    }

    pub fn from_toml(content: &str) -> Result<Self, DaqError> {
        let config: BoardConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DaqError> {
        if self.adc_read_len == 0 {
            return Err(DaqError::Config("adc_read_len must be positive".to_string()));
        }
        if self.write_timeout_ms == 0 || self.ack_timeout_ms == 0 || self.adc_timeout_ms == 0 {
            return Err(DaqError::Config("timeouts must be positive".to_string()));
        }
        Ok(())
    }

    pub fn with_location(mut self, bus_number: u8, device_address: u8) -> Self {
        self.bus_number = Some(bus_number);
        self.device_address = Some(device_address);
        self
    }

    pub fn with_timeouts(mut self, write: Duration, ack: Duration) -> Self {
        self.write_timeout_ms = write.as_millis() as u64;
        self.ack_timeout_ms = ack.as_millis() as u64;
        self
    }

    pub fn with_adc_read(mut self, len: usize, timeout: Duration) -> Self {
        self.adc_read_len = len;
        self.adc_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn skip_reset(mut self, skip: bool) -> Self {
        self.skip_reset = skip;
        self
    }

    pub fn purge_on_open(mut self, purge: bool) -> Self {
        self.purge_on_open = purge;
        self
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn adc_timeout(&self) -> Duration {
        Duration::from_millis(self.adc_timeout_ms)
    }
}

fn default_active() -> bool {
    true
}

/// One raw register write of a script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptWrite {
    #[serde(default)]
    pub name: Option<String>,
    pub module: u8,
    pub register: u8,
    pub value: u32,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Ordered list of raw register writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RegisterScript {
    #[serde(default, rename = "write")]
    pub writes: Vec<ScriptWrite>,
}

impl RegisterScript {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DaqError> {
        Self::from_toml(&read_file(path.as_ref())?)
    }

    pub fn from_toml(content: &str) -> Result<Self, DaqError> {
        let script: RegisterScript = toml::from_str(content)?;
        if let Some(bad) = script.writes.iter().find(|w| w.module > 0xF) {
            return Err(DaqError::Config(format!(
                "script write {} targets module {:#x}, which does not fit in 4 bits",
                bad.name.as_deref().unwrap_or("<unnamed>"),
                bad.module
            )));
        }
        Ok(script)
    }

    /// Active writes, lowest priority first; ties keep file order.
    pub fn ordered_writes(&self) -> Vec<&ScriptWrite> {
        let mut writes: Vec<&ScriptWrite> = self.writes.iter().filter(|w| w.active).collect();
        writes.sort_by_key(|w| w.priority);
        writes
    }
}
