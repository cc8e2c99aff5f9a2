use num_bigint::BigUint;
use once_cell::sync::Lazy;

pub static TWO_POW_32: Lazy<BigUint> = Lazy::new(|| BigUint::from(1u64 << 32));
pub static TWO_POW_64: Lazy<BigUint> = Lazy::new(|| BigUint::from(u64::MAX) + 1u32);

pub const DIFFICULTY_CONSTANT_FACTOR_BITS: u8 = 35;
pub const DIFFICULTY_CHANGE_MAX_FACTOR: f64 = 3.0;

pub const MAINNET_FILTER_BITS: u8 = 9;
pub const TESTNET_FILTER_BITS: u8 = 3;

pub const MIN_K: u8 = 32;
pub const MIN_K_TEST_NET: u8 = 25;
pub const MAX_K: u8 = 50;

pub const DEFAULT_TIMELORD_PORT: u16 = 19191;
pub const DEFAULT_VDF_SPEED: u64 = 100_000;

/// Resend interval for outstanding timelord compute requests.
pub const CHECKING_VDF_INTERVAL_SECS: u64 = 22;
