//! Common test utilities and fixtures.

pub mod faults;
pub mod uploads;

#[allow(unused_imports)]
pub use faults::*;
#[allow(unused_imports)]
pub use uploads::*;
