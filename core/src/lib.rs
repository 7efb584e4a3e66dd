mod aggregate;
mod calendar;
pub mod error;
mod reading;
mod sensor;

pub use aggregate::*;
pub use calendar::*;
pub use reading::*;
pub use sensor::*;

pub static CORE_VERSION: &str = env!("CARGO_PKG_VERSION");
