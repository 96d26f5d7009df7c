pub mod controller;
pub mod loop_worker;
pub mod perturbation;
pub mod sensor;

pub use controller::SamplerController;
pub use loop_worker::{sampling_loop, Sampler, SamplingStats};
pub use perturbation::Perturbation;
pub use sensor::{Orientation, RawSample, Sensor, SimulatedSensor};
