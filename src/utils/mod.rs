pub mod backoff;
pub mod logging;

pub use backoff::Backoff;
