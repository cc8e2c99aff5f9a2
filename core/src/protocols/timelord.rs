use crate::blockchain::sized_bytes::{Bytes32, UnsizedBytes};
use crate::blockchain::vdf_proof::ProofDetail;
use crate::protocols::TimelordMessageTypes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{Error, ErrorKind};

/// Every message on the wire is a JSON object followed by this byte.
pub const MESSAGE_DELIMITER: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Netspace {
    pub group_hash: Bytes32,
    pub total_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calc {
    pub challenge: Bytes32,
    pub iters: u64,
    pub netspace: Netspace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofMessage {
    pub challenge: Bytes32,
    pub y: UnsizedBytes,
    pub proof: UnsizedBytes,
    pub witness_type: u8,
    pub iters: u64,
    pub duration: u64,
}
impl ProofMessage {
    pub fn detail(&self) -> ProofDetail {
        ProofDetail {
            y: self.y.clone(),
            proof: self.proof.clone(),
            witness_type: self.witness_type,
            iters: self.iters,
            duration: self.duration,
        }
    }
}

/// Answer to a CALC. Carries the proof when the timelord already has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalcReply {
    pub challenge: Bytes32,
    pub calculating: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<UnsizedBytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<UnsizedBytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness_type: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iters: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}
impl CalcReply {
    pub fn detail(&self) -> Option<ProofDetail> {
        let y = self.y.clone()?;
        Some(ProofDetail {
            y,
            proof: self.proof.clone().unwrap_or_default(),
            witness_type: self.witness_type.unwrap_or_default(),
            iters: self.iters.unwrap_or_default(),
            duration: self.duration.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimelordMessage {
    Pong,
    Proof(ProofMessage),
    Ready(Value),
    Speed(Value),
    CalcReply(CalcReply),
    Ping,
    Calc(Calc),
    QuerySpeed,
    /// A well-formed message whose id this client has no handler for.
    Unknown { id: i64, body: Value },
}
impl TimelordMessage {
    pub fn msg_type(&self) -> Option<TimelordMessageTypes> {
        Some(match self {
            TimelordMessage::Pong => TimelordMessageTypes::Pong,
            TimelordMessage::Proof(_) => TimelordMessageTypes::Proof,
            TimelordMessage::Ready(_) => TimelordMessageTypes::Ready,
            TimelordMessage::Speed(_) => TimelordMessageTypes::Speed,
            TimelordMessage::CalcReply(_) => TimelordMessageTypes::CalcReply,
            TimelordMessage::Ping => TimelordMessageTypes::Ping,
            TimelordMessage::Calc(_) => TimelordMessageTypes::Calc,
            TimelordMessage::QuerySpeed => TimelordMessageTypes::QuerySpeed,
            TimelordMessage::Unknown { .. } => return None,
        })
    }

    pub fn id(&self) -> i64 {
        match self {
            TimelordMessage::Unknown { id, .. } => *id,
            other => other.msg_type().map(|t| t as i64).unwrap_or_default(),
        }
    }

    pub fn to_json(&self) -> Result<Value, Error> {
        let mut body = match self {
            TimelordMessage::Pong | TimelordMessage::Ping | TimelordMessage::QuerySpeed => json!({}),
            TimelordMessage::Proof(m) => to_value(m)?,
            TimelordMessage::Ready(v) | TimelordMessage::Speed(v) => v.clone(),
            TimelordMessage::CalcReply(m) => to_value(m)?,
            TimelordMessage::Calc(m) => to_value(m)?,
            TimelordMessage::Unknown { body, .. } => body.clone(),
        };
        match body.as_object_mut() {
            Some(obj) => {
                obj.insert("id".to_string(), json!(self.id()));
                Ok(body)
            }
            None => Err(Error::new(
                ErrorKind::InvalidData,
                "Timelord message body must be a JSON object",
            )),
        }
    }

    /// Serialized message including the trailing delimiter.
    pub fn to_frame(&self) -> Result<Vec<u8>, Error> {
        let mut frame = serde_json::to_vec(&self.to_json()?)
            .map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))?;
        frame.push(MESSAGE_DELIMITER);
        Ok(frame)
    }

    /// Parses one frame, with or without its trailing delimiter.
    pub fn from_frame(frame: &[u8]) -> Result<Self, Error> {
        let end = frame
            .iter()
            .position(|b| *b == MESSAGE_DELIMITER)
            .unwrap_or(frame.len());
        let value: Value = serde_json::from_slice(&frame[..end]).map_err(|e| {
            Error::new(
                ErrorKind::InvalidData,
                format!("Failed to Parse Json {},\r\n {e}", String::from_utf8_lossy(&frame[..end])),
            )
        })?;
        Self::from_json(value)
    }

    pub fn from_json(value: Value) -> Result<Self, Error> {
        let id = value.get("id").and_then(Value::as_i64).ok_or_else(|| {
            Error::new(ErrorKind::InvalidData, "Timelord message without integer id")
        })?;
        let Ok(msg_type) = TimelordMessageTypes::try_from(id) else {
            return Ok(TimelordMessage::Unknown { id, body: value });
        };
        Ok(match msg_type {
            TimelordMessageTypes::Pong => TimelordMessage::Pong,
            TimelordMessageTypes::Proof => TimelordMessage::Proof(from_value(value)?),
            TimelordMessageTypes::Ready => TimelordMessage::Ready(value),
            TimelordMessageTypes::Speed => TimelordMessage::Speed(value),
            TimelordMessageTypes::CalcReply => TimelordMessage::CalcReply(from_value(value)?),
            TimelordMessageTypes::Ping => TimelordMessage::Ping,
            TimelordMessageTypes::Calc => TimelordMessage::Calc(from_value(value)?),
            TimelordMessageTypes::QuerySpeed => TimelordMessage::QuerySpeed,
        })
    }
}

fn to_value<T: Serialize>(v: &T) -> Result<Value, Error> {
    serde_json::to_value(v).map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))
}

fn from_value<T: serde::de::DeserializeOwned>(v: Value) -> Result<T, Error> {
    serde_json::from_value(v).map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))
}
