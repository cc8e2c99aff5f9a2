pub mod timelord;

use std::fmt;

/// Message ids spoken on a timelord connection. 1xxx flow from the timelord,
/// 2xxx from the miner.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TimelordMessageTypes {
    Pong = 1000,
    Proof = 1010,
    Ready = 1020,
    Speed = 1030,
    CalcReply = 1040,
    Ping = 2000,
    Calc = 2010,
    QuerySpeed = 2020,
}
impl TryFrom<i64> for TimelordMessageTypes {
    type Error = i64;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        match id {
            1000 => Ok(TimelordMessageTypes::Pong),
            1010 => Ok(TimelordMessageTypes::Proof),
            1020 => Ok(TimelordMessageTypes::Ready),
            1030 => Ok(TimelordMessageTypes::Speed),
            1040 => Ok(TimelordMessageTypes::CalcReply),
            2000 => Ok(TimelordMessageTypes::Ping),
            2010 => Ok(TimelordMessageTypes::Calc),
            2020 => Ok(TimelordMessageTypes::QuerySpeed),
            other => Err(other),
        }
    }
}
impl fmt::Display for TimelordMessageTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimelordMessageTypes::Pong => "PONG",
            TimelordMessageTypes::Proof => "PROOF",
            TimelordMessageTypes::Ready => "READY",
            TimelordMessageTypes::Speed => "SPEED",
            TimelordMessageTypes::CalcReply => "CALC_REPLY",
            TimelordMessageTypes::Ping => "PING",
            TimelordMessageTypes::Calc => "CALC",
            TimelordMessageTypes::QuerySpeed => "QUERY_SPEED",
        };
        f.write_str(name)
    }
}
