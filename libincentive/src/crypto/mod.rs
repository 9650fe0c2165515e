mod error;
mod objects;
mod traits;

#[cfg(feature = "dummy_services")]
mod dummy_impl;

#[cfg(feature = "dummy_services")]
pub use dummy_impl::{DummyCrypto, DummyKeys};
pub use error::CryptoError;
pub use objects::*;
pub use traits::IncentiveCrypto;
