use crate::blockchain::proof_of_space::{passes_plot_filter, PoolKeyOrHash, PosCandidate};
use crate::blockchain::sized_bytes::{Bytes32, Bytes48, SizedBytes, UnsizedBytes};
use crate::utils::hash_256;
use async_trait::async_trait;
use hex::encode;
use log::{debug, error, info};
use parking_lot::RwLock;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const PLOT_EXTENSION: &str = "plot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotMemo {
    pub pool_key_or_hash: PoolKeyOrHash,
    pub farmer_public_key: Bytes48,
    pub local_master_secret_key: Bytes32,
}
impl TryFrom<&[u8]> for PlotMemo {
    type Error = Error;

    fn try_from(v: &[u8]) -> Result<Self, Self::Error> {
        if v.len() == 112 {
            Ok(PlotMemo {
                pool_key_or_hash: PoolKeyOrHash::PuzzleHash(Bytes32::new(&v[0..32])),
                farmer_public_key: Bytes48::new(&v[32..80]),
                local_master_secret_key: Bytes32::new(&v[80..112]),
            })
        } else if v.len() == 128 {
            Ok(PlotMemo {
                pool_key_or_hash: PoolKeyOrHash::PublicKey(Bytes48::new(&v[0..48])),
                farmer_public_key: Bytes48::new(&v[48..96]),
                local_master_secret_key: Bytes32::new(&v[96..128]),
            })
        } else {
            Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "Invalid memo length. Length must be 112 or 128, found {}",
                    v.len()
                ),
            ))
        }
    }
}
impl Display for PlotMemo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ \"pool_key_or_hash\": \"{}\", \"farmer_public_key\": \"{}\" }}",
            self.pool_key_or_hash,
            encode(self.farmer_public_key)
        )
    }
}

/// Read access to a single plot file. The on-disk format lives elsewhere.
#[async_trait]
pub trait PlotProver: Send + Sync {
    fn path(&self) -> &Path;
    fn plot_id(&self) -> Bytes32;
    fn k(&self) -> u8;
    fn memo(&self) -> &PlotMemo;
    async fn qualities_for_challenge(&self, challenge: &Bytes32)
        -> Result<Vec<UnsizedBytes>, Error>;
    async fn full_proof(&self, challenge: &Bytes32, index: usize) -> Result<UnsizedBytes, Error>;
}

/// The set of plots the miner proves with.
#[async_trait]
pub trait PlotStore: Send + Sync {
    async fn candidates_for(
        &self,
        challenge: &Bytes32,
        filter_bits: u8,
    ) -> Result<Vec<PosCandidate>, Error>;
    async fn full_proof(
        &self,
        plot_path: &Path,
        challenge: &Bytes32,
        index: usize,
    ) -> Result<UnsizedBytes, Error>;
    fn revoke_by_farmer_key(&self, farmer_key: &Bytes48) -> usize;
    fn group_hash(&self) -> Bytes32;
    fn total_size(&self) -> u64;
    fn plot_count(&self) -> usize;
}

/// Every `*.plot` file directly inside `dirs`, with its size in bytes.
/// Unreadable directories are logged and skipped.
pub fn find_plot_files(dirs: &[PathBuf]) -> Vec<(PathBuf, u64)> {
    let mut found = vec![];
    for dir in dirs {
        match fs::read_dir(dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().map(|e| e == PLOT_EXTENSION).unwrap_or(false) {
                        match entry.metadata() {
                            Ok(m) if m.is_file() => found.push((path, m.len())),
                            Ok(_) => {}
                            Err(e) => error!("Cannot stat {}: {e}", path.display()),
                        }
                    }
                }
            }
            Err(e) => error!("cannot read dir: {}, reason: {e}", dir.display()),
        }
    }
    found.sort();
    found
}

pub struct PlotCatalog<P: PlotProver> {
    plots: RwLock<Vec<Arc<P>>>,
    group_hash: Bytes32,
    total_size: u64,
}
impl<P: PlotProver> PlotCatalog<P> {
    /// Builds the catalog from opened plots. Plots whose `k` is not in
    /// `allowed_ks` are dropped; an empty list allows everything.
    pub fn new(plots: Vec<(P, u64)>, allowed_ks: &[u8]) -> Self {
        let mut kept = vec![];
        let mut total_size = 0u64;
        let mut ids = vec![];
        for (plot, size) in plots {
            total_size += size;
            if !allowed_ks.is_empty() && !allowed_ks.contains(&plot.k()) {
                debug!(
                    "Skipping plot with k={} not allowed: {}",
                    plot.k(),
                    plot.path().display()
                );
                continue;
            }
            debug!("Add plot, k={}, path={}", plot.k(), plot.path().display());
            ids.extend_from_slice(&plot.plot_id().to_word_order());
            kept.push(Arc::new(plot));
        }
        let group_hash = Bytes32::from(hash_256(&ids));
        info!(
            "found total {} plots, group hash: {group_hash}, total size: {total_size}",
            kept.len()
        );
        PlotCatalog {
            plots: RwLock::new(kept),
            group_hash,
            total_size,
        }
    }

    /// Opens every plot file under `dirs` with `open`; files that fail to open are logged and skipped.
    pub fn load<F>(dirs: &[PathBuf], allowed_ks: &[u8], open: F) -> Self
    where
        F: Fn(&Path) -> Result<P, Error>,
    {
        info!("total {} paths found from config", dirs.len());
        let mut opened = vec![];
        for (path, size) in find_plot_files(dirs) {
            match open(&path) {
                Ok(plot) => opened.push((plot, size)),
                Err(e) => error!("bad plot: {}, {e}", path.display()),
            }
        }
        Self::new(opened, allowed_ks)
    }

    fn find(&self, plot_path: &Path) -> Result<Arc<P>, Error> {
        self.plots
            .read()
            .iter()
            .find(|p| p.path() == plot_path)
            .cloned()
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::NotFound,
                    format!("Plot is not loaded: {}", plot_path.display()),
                )
            })
    }
}

#[async_trait]
impl<P: PlotProver + 'static> PlotStore for PlotCatalog<P> {
    async fn candidates_for(
        &self,
        challenge: &Bytes32,
        filter_bits: u8,
    ) -> Result<Vec<PosCandidate>, Error> {
        let plots: Vec<Arc<P>> = self.plots.read().clone();
        let mut candidates = vec![];
        for plot in plots {
            let plot_id = plot.plot_id();
            if filter_bits > 0 && !passes_plot_filter(filter_bits, &plot_id, challenge) {
                continue;
            }
            debug!("passed for plot-id: {plot_id}, challenge: {challenge}");
            match plot.qualities_for_challenge(challenge).await {
                Ok(qualities) => {
                    for (index, quality_string) in qualities.into_iter().enumerate() {
                        candidates.push(PosCandidate {
                            plot_path: plot.path().to_path_buf(),
                            plot_id,
                            index,
                            k: plot.k(),
                            quality_string,
                            memo: plot.memo().clone(),
                        });
                    }
                }
                Err(e) => error!(
                    "Failed to read qualities from {}: {e}",
                    plot.path().display()
                ),
            }
        }
        info!(
            "total {} answer(s), filter_bits={filter_bits}",
            candidates.len()
        );
        Ok(candidates)
    }

    async fn full_proof(
        &self,
        plot_path: &Path,
        challenge: &Bytes32,
        index: usize,
    ) -> Result<UnsizedBytes, Error> {
        let plot = self.find(plot_path)?;
        plot.full_proof(challenge, index).await
    }

    fn revoke_by_farmer_key(&self, farmer_key: &Bytes48) -> usize {
        let mut plots = self.plots.write();
        let before = plots.len();
        plots.retain(|p| p.memo().farmer_public_key != *farmer_key);
        let removed = before - plots.len();
        if removed > 0 && plots.is_empty() {
            error!("All plots are revoked, no plot remains");
        }
        removed
    }

    fn group_hash(&self) -> Bytes32 {
        self.group_hash
    }

    fn total_size(&self) -> u64 {
        self.total_size
    }

    fn plot_count(&self) -> usize {
        self.plots.read().len()
    }
}
