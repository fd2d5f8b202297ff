use crate::config::BoardConfig;
use crate::error::DaqError;
use crate::protocol::{DaqBoard, Endpoint, Transport};
use nusb::{DeviceInfo, Interface, transfer::RequestBuffer};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

// Cypress FX3 as programmed for the TDAQ board
pub const VID: u16 = 0x04B4;
pub const PID: u16 = 0x00F1;

const PURGE_TIMEOUT: Duration = Duration::from_millis(100);
const PURGE_READ_LEN: usize = 40960;

/// A DAQ board seen on the bus but not opened.
#[derive(Debug, Clone)]
pub struct BoardInfo {
    pub bus_number: u8,
    pub device_address: u8,
    pub serial_number: Option<String>,
    pub product: Option<String>,
}

impl From<&DeviceInfo> for BoardInfo {
    fn from(info: &DeviceInfo) -> Self {
        Self {
            bus_number: info.bus_number(),
            device_address: info.device_address(),
            serial_number: info.serial_number().map(str::to_string),
            product: info.product_string().map(str::to_string),
        }
    }
}

fn matching_devices(config: &BoardConfig) -> Result<Vec<DeviceInfo>, DaqError> {
    Ok(nusb::list_devices()?
        .filter(|d| d.vendor_id() == config.vendor_id && d.product_id() == config.product_id)
        .collect())
}

/// Every attached board matching the configured VID/PID.
pub fn list_boards(config: &BoardConfig) -> Result<Vec<BoardInfo>, DaqError> {
    Ok(matching_devices(config)?.iter().map(BoardInfo::from).collect())
}

/// `nusb` bulk transport with per-endpoint timeouts.
pub struct UsbTransport {
    interface: Interface,
    write_timeout: Duration,
    ack_timeout: Duration,
    adc_timeout: Duration,
}

impl UsbTransport {
    /// Finds, resets and claims the board selected by `config`.
    pub async fn open(config: &BoardConfig) -> Result<Self, DaqError> {
        info!("Searching for DAQ board...");
        let device_info = matching_devices(config)?
            .into_iter()
            .find(|d| {
                config.bus_number.is_none_or(|bus| d.bus_number() == bus)
                    && config.device_address.is_none_or(|addr| d.device_address() == addr)
            })
            .ok_or(DaqError::DeviceNotFound)?;

        info!(
            "Found board on bus {} addr {}",
            device_info.bus_number(),
            device_info.device_address()
        );

        let device = device_info.open()?;
        if !config.skip_reset {
            info!("Performing USB device reset...");
            device.reset()?;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let interface = device.detach_and_claim_interface(0)?;
        info!("Interface claimed successfully.");

        let mut transport = Self {
            interface,
            write_timeout: config.write_timeout(),
            ack_timeout: config.ack_timeout(),
            adc_timeout: config.adc_timeout(),
        };
        if config.purge_on_open {
            transport.purge().await;
        }
        Ok(transport)
    }

    fn timeout_for(&self, endpoint: Endpoint) -> Duration {
        match endpoint {
            Endpoint::WriteRegister => self.write_timeout,
            Endpoint::Acknowledge => self.ack_timeout,
            Endpoint::Monitoring | Endpoint::EventData => self.adc_timeout,
        }
    }

    /// Reads every IN endpoint until it times out, discarding leftovers of a
    /// previous session.
    pub async fn purge(&mut self) {
        for endpoint in [Endpoint::EventData, Endpoint::Monitoring, Endpoint::Acknowledge] {
            let mut discarded = 0usize;
            loop {
                let read = self
                    .interface
                    .bulk_in(endpoint.into(), RequestBuffer::new(PURGE_READ_LEN));
                match timeout(PURGE_TIMEOUT, read).await {
                    Ok(completion) => match completion.into_result() {
                        Ok(data) if !data.is_empty() => discarded += data.len(),
                        _ => break,
                    },
                    Err(_) => break,
                }
            }
            if discarded > 0 {
                debug!(%endpoint, discarded, "Purged stale data");
            }
        }
    }
}

impl Transport for UsbTransport {
    async fn send(&mut self, endpoint: Endpoint, data: &[u8]) -> Result<usize, DaqError> {
        debug!(%endpoint, bytes = hex::encode(data), "USB Write");
        let transfer = self.interface.bulk_out(endpoint.into(), data.to_vec());
        let completion = timeout(self.timeout_for(endpoint), transfer).await?;
        let response = completion.into_result()?;
        Ok(response.actual_length())
    }

    async fn receive(&mut self, endpoint: Endpoint, max_len: usize) -> Result<Vec<u8>, DaqError> {
        let transfer = self.interface.bulk_in(endpoint.into(), RequestBuffer::new(max_len));
        let completion = timeout(self.timeout_for(endpoint), transfer).await?;
        let data = completion.into_result()?;
        debug!(%endpoint, bytes = hex::encode(&data), "USB Read");
        Ok(data)
    }
}

/// Opens the board selected by `config` with the standard register set.
pub async fn open_board(config: &BoardConfig) -> Result<DaqBoard<UsbTransport>, DaqError> {
    config.validate()?;
    let transport = UsbTransport::open(config).await?;
    DaqBoard::new(transport)
}
