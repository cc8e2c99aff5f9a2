use dg_miner_core::blockchain::sized_bytes::{Bytes32, Bytes48};
use dg_miner_core::config::MinerConfig;
use dg_miner_core::constants::DIFFICULTY_CONSTANT_FACTOR_BITS;
use dg_miner_keys::farmer_keys_from_seeds;
use std::collections::HashMap;
use std::io::{Error, ErrorKind};
use std::time::Duration;

/// Waits used by the state machine. Tests shorten them.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MinerTimings {
    pub error_backoff: Duration,
    pub not_ready_wait: Duration,
    pub duplicate_wait: Duration,
    pub poll_tick: Duration,
    pub rpc_error_wait: Duration,
    pub vdf_timeout_factor: f64,
}
impl Default for MinerTimings {
    fn default() -> Self {
        MinerTimings {
            error_backoff: Duration::from_secs(3),
            not_ready_wait: Duration::from_secs(3),
            duplicate_wait: Duration::from_secs(1),
            poll_tick: Duration::from_millis(200),
            rpc_error_wait: Duration::from_secs(1),
            vdf_timeout_factor: 1.5,
        }
    }
}

/// Everything the miner needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct MinerContext {
    pub reward_dest: String,
    pub dcf_bits: u8,
    pub farmer_keys: HashMap<Bytes48, Bytes32>,
    pub timings: MinerTimings,
}
impl MinerContext {
    pub fn new(reward_dest: &str, farmer_keys: HashMap<Bytes48, Bytes32>) -> Self {
        MinerContext {
            reward_dest: reward_dest.to_string(),
            dcf_bits: DIFFICULTY_CONSTANT_FACTOR_BITS,
            farmer_keys,
            timings: MinerTimings::default(),
        }
    }

    /// Derives the farmer keys from every configured mnemonic.
    pub fn from_config(config: &MinerConfig) -> Result<Self, Error> {
        config.validate()?;
        let farmer_keys = farmer_keys_from_seeds(&config.seed.to_vec())?;
        if farmer_keys.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "no farmer key could be derived from `seed`",
            ));
        }
        Ok(Self::new(&config.reward, farmer_keys))
    }

    pub fn with_timings(mut self, timings: MinerTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_dcf_bits(mut self, dcf_bits: u8) -> Self {
        self.dcf_bits = dcf_bits;
        self
    }
}
