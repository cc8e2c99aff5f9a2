use std::fmt;
use std::io::{Error, ErrorKind};

/// Failures reported by the node RPC layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The node could not be reached or sent nothing back.
    Net(String),
    /// The node answered with a JSON-RPC error object.
    Rpc { code: i64, message: String },
}
impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Net(msg) => write!(f, "NetError: {msg}"),
            NodeError::Rpc { code, message } => write!(f, "RPCError({code}): {message}"),
        }
    }
}
impl std::error::Error for NodeError {}

impl From<NodeError> for Error {
    fn from(value: NodeError) -> Self {
        let kind = match &value {
            NodeError::Net(_) => ErrorKind::NotConnected,
            NodeError::Rpc { .. } => ErrorKind::Other,
        };
        Error::new(kind, value)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    Net,
    Rpc,
    Other,
}

/// Recovers the node error class from an `io::Error` built by the RPC client.
pub fn classify_error(err: &Error) -> ErrorClass {
    match err.get_ref().and_then(|e| e.downcast_ref::<NodeError>()) {
        Some(NodeError::Net(_)) => ErrorClass::Net,
        Some(NodeError::Rpc { .. }) => ErrorClass::Rpc,
        None => ErrorClass::Other,
    }
}

#[test]
fn test_classify_error() {
    let net: Error = NodeError::Net("refused".to_string()).into();
    let rpc: Error = NodeError::Rpc {
        code: -32601,
        message: "Method not found".to_string(),
    }
    .into();
    assert_eq!(classify_error(&net), ErrorClass::Net);
    assert_eq!(classify_error(&rpc), ErrorClass::Rpc);
    assert_eq!(classify_error(&Error::other("boom")), ErrorClass::Other);
}
