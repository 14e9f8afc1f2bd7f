#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Auditchain consensus rules for the hybrid proof-of-work, proof-of-stake
//! and proof-of-audit chain.
//!
//! This crate is responsible for:
//! - compact difficulty target encoding/decoding (Bitcoin-style `bits`)
//! - difficulty retargeting for both eras
//! - proof-of-work validation and per-block work
//! - block classification
//! - proof-of-audit chain-of-custody validation
//!
//! Chain state is read through [`ChainView`]; nothing here mutates it or
//! holds global state. It does not include networking, mempool policy,
//! stake kernels or signature checks.

pub mod audit;
pub mod chain;
pub mod classify;
pub mod difficulty;
pub mod error;
pub mod params;
pub mod pow;
pub mod target;
pub mod validate;
pub mod work;

pub use audit::*;
pub use chain::*;
pub use classify::*;
pub use difficulty::*;
pub use error::*;
pub use params::*;
pub use pow::*;
pub use target::*;
pub use validate::*;
pub use work::*;
