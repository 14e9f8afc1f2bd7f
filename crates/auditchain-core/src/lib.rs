#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Auditchain core: block data model, constants, canonical serialization,
//! header hashing and Merkle roots.
//!
//! Consensus rules live in `auditchain-consensus`; this crate only defines
//! what the bytes are and how they hash.

pub mod constants;
pub mod merkle;
pub mod serialization;
pub mod types;

pub use constants::*;
pub use merkle::*;
pub use serialization::*;
pub use types::*;
