pub mod fleet;
pub mod link;

use std::fmt;
use std::io::{Error, ErrorKind};

/// A timelord address as written in the config, `host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointDescriptor {
    pub host: String,
    pub port: u16,
}
impl EndpointDescriptor {
    pub fn new(host: &str, port: u16) -> Self {
        EndpointDescriptor {
            host: host.to_string(),
            port,
        }
    }

    pub fn parse(endpoint: &str, default_port: u16) -> Result<Self, Error> {
        let endpoint = endpoint.trim();
        let (host, port) = match endpoint.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|e| {
                    Error::new(
                        ErrorKind::InvalidInput,
                        format!("Invalid port in timelord endpoint {endpoint}: {e}"),
                    )
                })?;
                (host, port)
            }
            None => (endpoint, default_port),
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Empty host in timelord endpoint `{endpoint}`"),
            ));
        }
        Ok(Self::new(host, port))
    }
}
impl fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
