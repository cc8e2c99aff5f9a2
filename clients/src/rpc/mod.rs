pub mod node;

use dg_miner_core::errors::NodeError;
use log::debug;
use reqwest::{Client, ClientBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::io::{Error, ErrorKind};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Reads `user:password` from the first line of a node cookie file.
pub fn read_cookie(path: &Path) -> Result<Credentials, Error> {
    let contents = fs::read_to_string(path).map_err(|e| {
        Error::new(
            e.kind(),
            format!("cannot open to read {}: {e}", path.display()),
        )
    })?;
    let line = contents.lines().next().unwrap_or_default().trim();
    if line.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidData,
            "cannot read auth string from `.cookie`",
        ));
    }
    match line.split_once(':') {
        Some((user, password)) => Ok(Credentials {
            user: user.to_string(),
            password: password.to_string(),
        }),
        None => Err(Error::new(
            ErrorKind::InvalidData,
            format!("cookie {} is not in user:password form", path.display()),
        )),
    }
}

pub fn get_client(no_proxy: bool) -> Result<Client, Error> {
    let builder = ClientBuilder::new().timeout(Duration::from_secs(60));
    let builder = if no_proxy { builder.no_proxy() } else { builder };
    builder
        .build()
        .map_err(|e| Error::new(ErrorKind::Other, format!("{e:?}")))
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

/// Posts a JSON-RPC 2.0 request. The body is read whatever the HTTP status
/// since nodes report RPC errors with non-200 codes.
pub async fn rpc_call<T>(
    client: &Client,
    url: &str,
    credentials: &Credentials,
    method: &str,
    params: Vec<Value>,
) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });
    debug!("sending: `{request}`");
    let resp = client
        .post(url)
        .basic_auth(&credentials.user, Some(&credentials.password))
        .json(&request)
        .send()
        .await
        .map_err(|e| NodeError::Net(format!("RPC command error `{method}`: {e}")))?;
    let body = resp
        .text()
        .await
        .map_err(|e| NodeError::Net(format!("RPC command error `{method}`: {e}")))?;
    if body.trim().is_empty() {
        return Err(NodeError::Net("empty result from RPC server".to_string()).into());
    }
    debug!("received: `{}`", body.trim());
    let parsed: RpcResponse = serde_json::from_str(&body).map_err(|e| {
        NodeError::Net(format!("Failed to Parse Json {body},\r\n {e}"))
    })?;
    if let Some(err) = parsed.error {
        return Err(NodeError::Rpc {
            code: err.code,
            message: err.message,
        }
        .into());
    }
    serde_json::from_value(parsed.result).map_err(|e| {
        Error::new(
            ErrorKind::InvalidData,
            format!("Unexpected result for `{method}`: {e}"),
        )
    })
}
