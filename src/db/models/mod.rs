pub mod sensor_reading;

pub use sensor_reading::{NewReading, SensorReading, WindowTable};
