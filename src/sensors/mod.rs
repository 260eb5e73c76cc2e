pub mod calibration;
pub mod registry;

pub use calibration::Conversion;
pub use registry::{SensorDescriptor, SensorRegistry, SensorType};
