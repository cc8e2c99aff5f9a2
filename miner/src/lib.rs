pub mod context;
pub mod miner;

use crate::context::MinerContext;
use crate::miner::{Miner, MinerExit};
use dg_miner_clients::rpc::node::NodeClient;
use dg_miner_clients::timelord::fleet::TimelordFleet;
use dg_miner_core::config::MinerConfig;
use dg_miner_core::constants::DEFAULT_TIMELORD_PORT;
use dg_miner_core::plots::PlotStore;
use dg_miner_core::proof_cache::ProofCache;
use dg_miner_core::utils::await_termination;
use dg_miner_keys::BlsKeyEngine;
use log::{error, info};
use std::io::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn _version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
fn _pkg_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

#[must_use]
pub fn version() -> String {
    format!("{}: {}", _pkg_name(), _version())
}

#[test]
fn test_version() {
    println!("{}", version());
}

/// Wires the node client, key engine and timelord fleet around `plots` and
/// mines until a termination signal arrives or a fatal error occurs.
/// Returns the process exit code.
pub async fn start_mining<S: PlotStore + 'static>(
    config: &MinerConfig,
    cookie_path: Option<PathBuf>,
    plots: S,
) -> Result<i32, Error> {
    let context = MinerContext::from_config(config)?;
    let node = NodeClient::new(&config.rpc, config.noproxy, cookie_path)?;
    info!("node rpc: {}", node.url());
    let cache = Arc::new(ProofCache::new());
    let fleet = if config.timelords.is_empty() {
        None
    } else {
        let fleet = TimelordFleet::new(cache.clone());
        info!(
            "start timelord total {} client...",
            fleet.start_all(&config.timelords, DEFAULT_TIMELORD_PORT)
        );
        Some(fleet)
    };
    let run = Arc::new(AtomicBool::new(true));
    let mut miner = Miner::new(
        Arc::new(node),
        Arc::new(plots),
        BlsKeyEngine,
        cache,
        context,
        run.clone(),
    );
    if let Some(fleet) = &fleet {
        miner = miner.with_fleet(fleet.clone());
    }
    let signal_run = run.clone();
    let signals = tokio::spawn(async move {
        if let Err(e) = await_termination().await {
            error!("Failed to listen for termination signals: {e}");
            return;
        }
        info!("Termination signal received, stopping miner");
        signal_run.store(false, Ordering::Relaxed);
    });
    let exit = miner.run().await;
    signals.abort();
    if let Some(fleet) = fleet {
        info!("exiting timelord client...");
        fleet.shutdown();
    }
    if let MinerExit::PlotIdMismatch { plot_path } = &exit {
        error!(
            "Mining stopped, plot {} does not belong to the configured seed",
            plot_path.display()
        );
    }
    Ok(exit.code())
}
