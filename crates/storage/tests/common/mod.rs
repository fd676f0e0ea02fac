//! Common test utilities and fixtures.

pub mod fixtures;
pub mod storage;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use storage::*;
