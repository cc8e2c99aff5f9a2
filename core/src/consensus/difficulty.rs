use num_bigint::BigUint;
use std::collections::BTreeMap;
use std::io::{Error, ErrorKind};

const UI_ACTUAL_SPACE_CONSTANT_FACTOR: u32 = 762;
const UI_ACTUAL_SPACE_CONSTANT_FACTOR_BASE: u32 = 1000;

/// Difficulty for the next block given how long the previous one took.
///
/// The result moves at most by `max_factor` in either direction and never
/// drops below 1. A zero `curr_duration` is a caller error.
pub fn adjust_difficulty(
    prev_difficulty: u64,
    curr_duration: u64,
    target_duration: u64,
    duration_fix: i64,
    max_factor: f64,
    network_min_difficulty: u64,
    target_mul_factor: f64,
) -> Result<u64, Error> {
    if curr_duration == 0 {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "Block duration must be greater than zero",
        ));
    }
    let n = (prev_difficulty / curr_duration).max(1);
    let scaled_target = (target_duration as f64 * target_mul_factor + duration_fix as f64) as u64;
    let mut new_difficulty = n.saturating_mul(scaled_target).max(network_min_difficulty);
    if new_difficulty > prev_difficulty {
        let max_difficulty = (prev_difficulty as f64 * max_factor) as u64;
        new_difficulty = new_difficulty.min(max_difficulty);
    } else {
        let min_difficulty = (prev_difficulty as f64 / max_factor) as u64;
        new_difficulty = new_difficulty.max(min_difficulty);
    }
    Ok(new_difficulty.max(1))
}

/// Offset recorded at the greatest height strictly below `height`, or 0.
/// Heights of 0 never apply.
pub fn query_duration_fix(height: u32, fixes: &BTreeMap<u32, i64>) -> i64 {
    fixes
        .range(1..height.max(1))
        .next_back()
        .map(|(_, fix)| *fix)
        .unwrap_or_default()
}

/// Rough network space estimate for a block found at `iters` with `difficulty`.
pub fn calculate_network_space(difficulty: u64, iters: u64, dcf_bits: u8) -> BigUint {
    if iters == 0 {
        return BigUint::default();
    }
    (BigUint::from(difficulty) / iters) * (BigUint::from(1u8) << u32::from(dcf_bits))
        * UI_ACTUAL_SPACE_CONSTANT_FACTOR
        / UI_ACTUAL_SPACE_CONSTANT_FACTOR_BASE
}
