//! Network consensus parameters.
//!
//! Every height and spacing the rules depend on is a named field here, so
//! tests and alternative networks can supply their own values. Parameter
//! sets load from JSON through `serde`.

use num_bigint::BigUint;
use num_traits::One;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Network identity, used to gate test-only bypasses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network.
    Main,
    /// Public test network. Audit-block work is not enforced.
    Test,
    /// Staging network.
    Stage,
    /// Local regression-test network.
    Regtest,
}

/// Parameter-set problems detected by [`ConsensusParams::validate`].
#[derive(Debug, Error)]
pub enum ParamsError {
    /// JSON could not be parsed.
    #[error("invalid params json: {0}")]
    Json(#[from] serde_json::Error),

    /// Fields contradict each other.
    #[error("inconsistent params: {0}")]
    Inconsistent(&'static str),
}

/// Consensus parameters consumed by the difficulty, work and audit rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Network identity.
    pub network: Network,
    /// Proof-of-work ceiling is `(2^256 - 1) >> pow_limit_shift`.
    pub pow_limit_shift: u32,
    /// Legacy-era block spacing in seconds.
    pub target_spacing: u32,
    /// Last proof-of-work height; proof-of-stake starts above it.
    pub last_pow_height: u32,
    /// Audit-block scans never look at or below this height.
    pub start_poa_height: u32,
    /// Maximum number of summaries one audit block consumes.
    pub poa_block_period: u32,
    /// Minimum seconds between consecutive audit blocks.
    pub poa_block_time: u32,
    /// Minimum number of summaries in an audit block.
    pub min_num_pos_blocks_audited: u32,
    /// Audit blocks extending a parent below this height skip the spacing rule.
    pub poa_time_bypass_height: u32,
    /// Audit blocks extending a parent below this height skip the work rule.
    pub poa_work_bypass_height: u32,
    /// Skip all proof-of-work checks. Never set on production networks.
    pub skip_pow_check: bool,
}

impl ConsensusParams {
    /// Production network.
    pub fn mainnet() -> Self {
        Self {
            network: Network::Main,
            pow_limit_shift: 20,
            target_spacing: 60,
            last_pow_height: 500,
            start_poa_height: 560,
            poa_block_period: 59,
            poa_block_time: 60 * 60,
            min_num_pos_blocks_audited: 59,
            poa_time_bypass_height: 6_000,
            poa_work_bypass_height: 10_800,
            skip_pow_check: false,
        }
    }

    /// Public test network.
    pub fn testnet() -> Self {
        Self {
            network: Network::Test,
            poa_block_time: 30 * 60,
            min_num_pos_blocks_audited: 1,
            ..Self::mainnet()
        }
    }

    /// Staging network.
    pub fn stage() -> Self {
        Self {
            network: Network::Stage,
            poa_block_time: 30 * 60,
            min_num_pos_blocks_audited: 1,
            poa_time_bypass_height: 0,
            poa_work_bypass_height: 0,
            ..Self::mainnet()
        }
    }

    /// Local regression-test network.
    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            pow_limit_shift: 1,
            last_pow_height: 250,
            start_poa_height: 300,
            poa_block_time: 60,
            min_num_pos_blocks_audited: 1,
            poa_time_bypass_height: 0,
            poa_work_bypass_height: 0,
            skip_pow_check: true,
            ..Self::mainnet()
        }
    }

    /// Preset for a network.
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Main => Self::mainnet(),
            Network::Test => Self::testnet(),
            Network::Stage => Self::stage(),
            Network::Regtest => Self::regtest(),
        }
    }

    /// Parse a parameter set from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, ParamsError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Reject parameter sets the rules cannot run with.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.skip_pow_check && self.network == Network::Main {
            return Err(ParamsError::Inconsistent(
                "skip_pow_check must not be set on mainnet",
            ));
        }
        if self.pow_limit_shift >= 256 {
            return Err(ParamsError::Inconsistent("pow_limit_shift leaves no target"));
        }
        if self.target_spacing == 0 {
            return Err(ParamsError::Inconsistent("target_spacing must be non-zero"));
        }
        if self.start_poa_height < self.last_pow_height {
            return Err(ParamsError::Inconsistent(
                "start_poa_height precedes last_pow_height",
            ));
        }
        if self.poa_block_period == 0 {
            return Err(ParamsError::Inconsistent("poa_block_period must be non-zero"));
        }
        if self.min_num_pos_blocks_audited > self.poa_block_period {
            return Err(ParamsError::Inconsistent(
                "min_num_pos_blocks_audited exceeds poa_block_period",
            ));
        }
        Ok(())
    }

    /// Proof-of-work ceiling (easiest allowed target).
    pub fn pow_limit(&self) -> BigUint {
        let max = (BigUint::one() << 256u32) - BigUint::one();
        max >> self.pow_limit_shift
    }
}
