use crate::blockchain::proof_of_space::PosCandidate;
use crate::blockchain::sized_bytes::{Bytes32, SizedBytes};
use crate::constants::{TWO_POW_32, TWO_POW_64};
use crate::utils::hash_256;
use log::{debug, info, warn};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use std::io::{Error, ErrorKind};

#[must_use]
pub fn expected_plot_size(k: u8) -> u64 {
    ((2 * u64::from(k)) + 1) * 2u64.pow(u32::from(k).saturating_sub(1))
}

/// Low 32 bits of the mixed quality read as a big-endian 256-bit integer.
#[must_use]
pub fn lower32(mixed_quality_string: &Bytes32) -> u32 {
    let b = mixed_quality_string.bytes;
    u32::from_be_bytes([b[28], b[29], b[30], b[31]])
}

/// Binds a raw quality string to a challenge. An empty quality string yields the zero value.
#[must_use]
pub fn mixed_quality_string(quality_string: &[u8], challenge: &Bytes32) -> Bytes32 {
    if quality_string.is_empty() {
        return Bytes32::default();
    }
    let mut to_hash = Vec::with_capacity(quality_string.len() + 32);
    to_hash.extend_from_slice(quality_string);
    to_hash.extend_from_slice(&challenge.to_word_order());
    Bytes32::from(hash_256(&to_hash))
}

/// Number of VDF iterations a proof with this quality must wait out.
#[must_use]
pub fn iterations_for(
    mixed_quality_string: &Bytes32,
    difficulty: u64,
    filter_bits: u8,
    dcf_bits: u8,
    k: u8,
    base_iters: u64,
) -> u64 {
    let l = BigUint::from(lower32(mixed_quality_string));
    let size = BigUint::from(expected_plot_size(k));
    let top = BigUint::from(difficulty) * (BigUint::from(1u8) << u32::from(dcf_bits)) * l;
    let iters = top / (BigUint::from(1u8) << u32::from(filter_bits)) / (size * &*TWO_POW_32)
        + base_iters;
    if iters >= *TWO_POW_64 {
        return u64::MAX;
    }
    iters.to_u64().unwrap_or(u64::MAX).max(1)
}

/// Fraction of the 32-bit range the quality falls into, for display.
#[must_use]
pub fn quality_in_plot(mixed_quality_string: &Bytes32) -> f64 {
    f64::from(lower32(mixed_quality_string)) / 4_294_967_296f64
}

/// `expected_plot_size(k) * 2^32 / lower32`, `None` when the low bits are zero.
#[must_use]
pub fn quality(mixed_quality_string: &Bytes32, k: u8) -> Option<f64> {
    let l = BigUint::from(lower32(mixed_quality_string));
    if l.is_zero() {
        return None;
    }
    (BigUint::from(expected_plot_size(k)) * &*TWO_POW_32 / l).to_f64()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredCandidate<'a> {
    pub candidate: &'a PosCandidate,
    pub mixed_quality_string: Bytes32,
    pub iters: u64,
}

/// Picks the candidate needing the fewest iterations; the first one wins a tie.
pub fn select_best<'a>(
    candidates: &'a [PosCandidate],
    challenge: &Bytes32,
    difficulty: u64,
    filter_bits: u8,
    dcf_bits: u8,
    base_iters: u64,
) -> Result<ScoredCandidate<'a>, Error> {
    if candidates.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "Cannot select the best proof from an empty candidate set",
        ));
    }
    let mut best: Option<ScoredCandidate<'a>> = None;
    for candidate in candidates {
        if candidate.quality_string.bytes.iter().all(|b| *b == 0) {
            warn!(
                "Skipping empty quality string from plot {}",
                candidate.plot_path.display()
            );
            continue;
        }
        let mixed = mixed_quality_string(&candidate.quality_string.bytes, challenge);
        let iters = iterations_for(
            &mixed,
            difficulty,
            filter_bits,
            dcf_bits,
            candidate.k,
            base_iters,
        );
        debug!(
            "checking pos, quality_in_plot={:.3}, quality={:e}, iters={iters}, k={}",
            quality_in_plot(&mixed),
            quality(&mixed, candidate.k).unwrap_or(f64::INFINITY),
            candidate.k
        );
        if best.as_ref().map(|b| iters < b.iters).unwrap_or(true) {
            best = Some(ScoredCandidate {
                candidate,
                mixed_quality_string: mixed,
                iters,
            });
        }
    }
    let best = best.ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidInput,
            "Every candidate carried an empty quality string",
        )
    })?;
    if best.mixed_quality_string.is_null() {
        warn!("Best proof has a null mixed quality string");
    }
    info!(
        "Best proof is queried, quality_in_plot={:.3}, quality={:e}, iters={}, k={}",
        quality_in_plot(&best.mixed_quality_string),
        quality(&best.mixed_quality_string, best.candidate.k).unwrap_or(f64::INFINITY),
        best.iters,
        best.candidate.k
    );
    Ok(best)
}
