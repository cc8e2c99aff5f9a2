use crate::blockchain::sized_bytes::Bytes32;
use crate::blockchain::vdf_proof::ProofDetail;
use parking_lot::Mutex;
use std::collections::HashMap;

/// VDF results pushed by timelords, keyed by challenge.
///
/// Lookups are first-fit in insertion order: the first proof that covers the
/// requested iterations is handed out, even if a later one is tighter.
#[derive(Debug, Default)]
pub struct ProofCache {
    proofs: Mutex<HashMap<Bytes32, Vec<ProofDetail>>>,
}
impl ProofCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, challenge: Bytes32, detail: ProofDetail) {
        self.proofs.lock().entry(challenge).or_default().push(detail);
    }

    pub fn best_at_least(&self, challenge: &Bytes32, min_iters: u64) -> Option<ProofDetail> {
        self.proofs
            .lock()
            .get(challenge)
            .and_then(|details| details.iter().find(|d| d.iters >= min_iters).cloned())
    }

    /// Drops every challenge except `challenge`.
    pub fn retain_only(&self, challenge: &Bytes32) {
        self.proofs.lock().retain(|k, _| k == challenge);
    }

    pub fn len(&self, challenge: &Bytes32) -> usize {
        self.proofs.lock().get(challenge).map(Vec::len).unwrap_or_default()
    }

    pub fn challenges(&self) -> usize {
        self.proofs.lock().len()
    }
}
