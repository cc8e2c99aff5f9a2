use crate::constants::{MAINNET_FILTER_BITS, MAX_K, MIN_K, MIN_K_TEST_NET, TESTNET_FILTER_BITS};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::env;
use std::fs;
use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};

const fn default_true() -> bool {
    true
}
fn default_rpc_host() -> String {
    "http://127.0.0.1:18732".to_string()
}

/// Mnemonics may be given as one string or as a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seeds {
    Single(String),
    Many(Vec<String>),
}
impl Default for Seeds {
    fn default() -> Self {
        Seeds::Many(vec![])
    }
}
impl Seeds {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Seeds::Single(s) => vec![s.clone()],
            Seeds::Many(v) => v.clone(),
        }
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_host")]
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub wallet: String,
}
impl Default for RpcConfig {
    fn default() -> Self {
        RpcConfig {
            host: default_rpc_host(),
            user: String::new(),
            password: String::new(),
            wallet: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinerConfig {
    #[serde(default)]
    pub reward: String,
    #[serde(default)]
    pub seed: Seeds,
    #[serde(default = "default_true")]
    pub testnet: bool,
    #[serde(default = "default_true")]
    pub noproxy: bool,
    #[serde(default)]
    pub plot_path: Vec<PathBuf>,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub timelords: Vec<String>,
    #[serde(default)]
    pub allowed_plot_k: Vec<u8>,
}
impl Default for MinerConfig {
    fn default() -> Self {
        MinerConfig {
            reward: String::new(),
            seed: Seeds::default(),
            testnet: true,
            noproxy: true,
            plot_path: vec![],
            rpc: RpcConfig::default(),
            timelords: vec![],
            allowed_plot_k: vec![],
        }
    }
}

impl MinerConfig {
    pub fn save_as_json<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        fs::write(
            path.as_ref(),
            serde_json::to_string_pretty(&self)
                .map_err(|e| Error::new(ErrorKind::InvalidData, format!("{e:?}")))?,
        )
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.rpc.host.trim().is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, "field `rpc.host` is empty"));
        }
        if self.reward.trim().is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, "field `reward` is empty"));
        }
        if self.seed.to_vec().is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, "field `seed` is empty"));
        }
        Ok(())
    }

    pub fn filter_bits(&self) -> u8 {
        if self.testnet {
            TESTNET_FILTER_BITS
        } else {
            MAINNET_FILTER_BITS
        }
    }

    /// Plot sizes accepted for mining. An empty `allowedPlotK` means every size
    /// inside the network's range.
    pub fn allowed_ks(&self) -> Vec<u8> {
        let min_k = if self.testnet { MIN_K_TEST_NET } else { MIN_K };
        if self.allowed_plot_k.is_empty() {
            (min_k..=MAX_K).collect()
        } else {
            self.allowed_plot_k
                .iter()
                .copied()
                .filter(|k| (min_k..=MAX_K).contains(k))
                .collect()
        }
    }

    /// The node's cookie file, either the explicit path or `.cookie` under the data dir.
    pub fn cookie_path(&self, datadir: Option<&Path>, cookie: Option<&Path>) -> Option<PathBuf> {
        if let Some(cookie) = cookie {
            return Some(cookie.to_path_buf());
        }
        let datadir = match datadir {
            Some(d) => d.to_path_buf(),
            None => default_data_dir(self.testnet)?,
        };
        Some(datadir.join(".cookie"))
    }
}

impl TryFrom<&Path> for MinerConfig {
    type Error = Error;
    fn try_from(value: &Path) -> Result<Self, Self::Error> {
        let config = serde_json::from_str::<MinerConfig>(&fs::read_to_string(value)?)
            .map_err(|e| Error::new(ErrorKind::InvalidData, format!("{e:?}")))?;
        config.validate()?;
        Ok(config)
    }
}
impl TryFrom<&PathBuf> for MinerConfig {
    type Error = Error;
    fn try_from(value: &PathBuf) -> Result<Self, Self::Error> {
        Self::try_from(value.as_path())
    }
}

pub fn default_data_dir(testnet: bool) -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let path = PathBuf::from(env::var_os("APPDATA")?).join("depinc");
    #[cfg(target_os = "macos")]
    let path = PathBuf::from(env::var_os("HOME")?)
        .join("Library")
        .join("Application Support")
        .join("depinc");
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let path = PathBuf::from(env::var_os("HOME")?).join(".depinc");
    if testnet {
        Some(path.join("testnet3"))
    } else {
        Some(path)
    }
}
