//! Mimetype header framing.
//!
//! Every request frame starts with a single length byte, the mimetype in
//! ASCII, and then the JSON envelope:
//!
//! ```text
//! +--------+------------------------------------+----------------+
//! | len u8 | application/vnd.gremlin-v3.0+json  | {json ...}     |
//! +--------+------------------------------------+----------------+
//! ```
//!
//! Both supported mimetypes are 33 bytes long, so the length byte renders as `!`.

use crate::error::ProtocolError;
use std::fmt;
use std::str::FromStr;

/// GraphSON serializer version negotiated through the mimetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    V2,
    #[default]
    V3,
}

impl ProtocolVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V2 => "2",
            ProtocolVersion::V3 => "3",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "2" => Ok(ProtocolVersion::V2),
            "3" => Ok(ProtocolVersion::V3),
            other => Err(ProtocolError::UnsupportedVersion(other.to_string())),
        }
    }
}

/// Returns the mimetype for a protocol version.
pub fn mimetype(version: ProtocolVersion) -> String {
    format!("application/vnd.gremlin-v{}.0+json", version)
}

/// Prepends the length-prefixed mimetype header to an encoded envelope.
pub fn with_header(version: ProtocolVersion, payload: &[u8]) -> Vec<u8> {
    let mime = mimetype(version);
    let mut out = Vec::with_capacity(1 + mime.len() + payload.len());
    out.push(mime.len() as u8);
    out.extend_from_slice(mime.as_bytes());
    out.extend_from_slice(payload);
    out
}

/// Splits a request frame into its mimetype and payload.
pub fn split_header(frame: &[u8]) -> Result<(&str, &[u8]), ProtocolError> {
    let (&len, rest) = frame
        .split_first()
        .ok_or(ProtocolError::InvalidHeader("empty frame"))?;
    let len = len as usize;
    if rest.len() < len {
        return Err(ProtocolError::InvalidHeader("truncated mimetype"));
    }
    let (mime, payload) = rest.split_at(len);
    let mime = std::str::from_utf8(mime).map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok((mime, payload))
}
