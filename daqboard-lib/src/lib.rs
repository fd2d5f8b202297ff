pub mod catalog;
pub mod config;
pub mod device;
pub mod error;
pub mod field;
pub mod protocol;
pub mod stream;
pub mod telemetry;
pub mod wire;

pub use catalog::{RegisterCatalog, RegisterId};
pub use config::{BoardConfig, RegisterScript};
pub use device::{UsbTransport, list_boards, open_board};
pub use error::DaqError;
pub use protocol::{DaqBoard, Endpoint, Transport};
pub use stream::{AdcStreamDecoder, MonitoringRecord, RawStreamTracker};
