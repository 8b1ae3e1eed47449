//! Common re-exports for consumers of this crate.

pub use crate::config::{ConfigError, ConfigLoader, ServiceConfig};
pub use crate::error::{fatal, ServiceError};
pub use crate::event::{Event, EventFlags, EventType, MetaDataType, Payload};
pub use crate::hal::{ChannelHandle, HalDriver, HalError, HalMode, MemoryDescriptor, RateLevel, SimulatedHal};
pub use crate::sensor::{ReportingMode, Sensor, SensorFlags, SensorType};
