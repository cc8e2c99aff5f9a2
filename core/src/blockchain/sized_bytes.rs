use hex::{decode, encode, FromHexError};
use log::warn;
use serde::de::{Error as DeError, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::{Error, ErrorKind};
use std::str::FromStr;

/// Decodes hex as sent by the node, with or without a `0x` prefix.
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, FromHexError> {
    let hex = hex.trim();
    decode(hex.strip_prefix("0x").unwrap_or(hex))
}

pub trait SizedBytes<'a>: Serialize + Deserialize<'a> + fmt::Display {
    fn new(bytes: &[u8]) -> Self;
    fn as_slice(&'a self) -> &'a [u8];
    fn is_null(&self) -> bool;
}

macro_rules! impl_sized_bytes {
    ($($name: ident, $size:expr, $visitor:ident);*) => {
        $(
            #[derive(Copy, Clone, PartialOrd, Ord)]
            pub struct $name {
                pub bytes: [u8; $size]
            }
            impl<'a> SizedBytes<'a> for $name {
                fn new(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; $size];
                    if bytes.len() > $size {
                        warn!("Too Many Bytes Sent to {}, expected {} got {}", stringify!($name), $size, bytes.len());
                        buf.copy_from_slice(&bytes[..$size]);
                    } else {
                        buf[..bytes.len()].copy_from_slice(bytes);
                    }
                    Self { bytes: buf }
                }

                fn as_slice(&'a self) -> &'a [u8] {
                    &self.bytes
                }

                fn is_null(&self) -> bool {
                    self.bytes.iter().all(|v| *v == 0)
                }
            }
            impl $name {
                /// Strict conversion, fails unless exactly the right number of bytes is given.
                pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
                    let bytes: [u8; $size] = bytes.try_into().map_err(|_| {
                        Error::new(
                            ErrorKind::InvalidInput,
                            format!("Invalid length for {}, expected {} got {}", stringify!($name), $size, bytes.len()),
                        )
                    })?;
                    Ok($name { bytes })
                }
            }

            impl std::hash::Hash for $name {
                fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                    self.bytes.hash(state);
                }
            }

            impl PartialEq for $name {
                fn eq(&self, other: &Self) -> bool {
                    self.bytes == other.bytes
                }
            }
            impl Eq for $name {}

            impl AsRef<[u8]> for $name {
                fn as_ref(&self) -> &[u8] {
                    &self.bytes
                }
            }

            impl From<[u8; $size]> for $name {
                fn from(bytes: [u8; $size]) -> Self {
                    $name { bytes }
                }
            }

            impl FromStr for $name {
                type Err = Error;

                fn from_str(hex: &str) -> Result<Self, Self::Err> {
                    let bytes = hex_to_bytes(hex).map_err(|e| {
                        Error::new(ErrorKind::InvalidData, format!("Invalid hex for {}: {e}", stringify!($name)))
                    })?;
                    $name::parse(&bytes)
                }
            }

            impl Serialize for $name {
                fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                where
                    S: Serializer,
                {
                    serializer.serialize_str(self.to_string().as_str())
                }
            }

            struct $visitor;

            impl<'de> Visitor<'de> for $visitor {
                type Value = $name;

                fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                    formatter.write_str(format!("Expecting a hex String of {} bytes", $size).as_str())
                }

                fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
                where
                    E: DeError,
                {
                    $name::from_str(value).map_err(E::custom)
                }
            }

            impl<'a> Deserialize<'a> for $name {
                fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
                where
                    D: Deserializer<'a>,
                {
                    deserializer.deserialize_str($visitor)
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", encode(self.bytes))
                }
            }

            impl fmt::Debug for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", encode(self.bytes))
                }
            }

            impl Default for $name {
                fn default() -> $name {
                    $name::from([0; $size])
                }
            }
        )*
    };
    ()=>{};
}

impl_sized_bytes!(
    Bytes32, 32, Bytes32Visitor;
    Bytes48, 48, Bytes48Visitor
);

impl Bytes32 {
    /// Byte order used when the value takes part in hashing as a 256-bit word,
    /// which is the reverse of the hex display order.
    pub fn to_word_order(&self) -> [u8; 32] {
        let mut buf = self.bytes;
        buf.reverse();
        buf
    }
}

/// Variable length byte string carried as hex in JSON.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct UnsizedBytes {
    pub bytes: Vec<u8>,
}
impl UnsizedBytes {
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}
impl From<Vec<u8>> for UnsizedBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}
impl AsRef<[u8]> for UnsizedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
impl FromStr for UnsizedBytes {
    type Err = Error;

    fn from_str(hex: &str) -> Result<Self, Self::Err> {
        hex_to_bytes(hex)
            .map(UnsizedBytes::from)
            .map_err(|e| Error::new(ErrorKind::InvalidData, format!("Invalid hex: {e}")))
    }
}
impl fmt::Display for UnsizedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", encode(&self.bytes))
    }
}
impl fmt::Debug for UnsizedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", encode(&self.bytes))
    }
}
impl Serialize for UnsizedBytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&encode(&self.bytes))
    }
}
impl<'de> Deserialize<'de> for UnsizedBytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        UnsizedBytes::from_str(&hex).map_err(D::Error::custom)
    }
}
