//! Encoder and decoder for Gremlin Server messages.
//!
//! WebSocket already delimits messages, so both sides work on whole frames.

use crate::error::ProtocolError;
use crate::frame::{self, ProtocolVersion};
use crate::message::{Bindings, Request, RequestIdSource, Response};
use serde_json::Value;
use std::collections::HashMap;

/// Builds and encodes request frames.
pub struct Encoder;

impl Encoder {
    /// Builds an eval request under a freshly generated identifier.
    pub fn build_eval_request(
        ids: &dyn RequestIdSource,
        gremlin: &str,
        bindings: Bindings,
        rebindings: HashMap<String, String>,
    ) -> Request {
        Request::eval(ids.next_id(), gremlin, bindings, rebindings)
    }

    /// Encodes a request as mimetype header + JSON envelope.
    pub fn encode_request(
        request: &Request,
        version: ProtocolVersion,
    ) -> Result<Vec<u8>, ProtocolError> {
        let json = serde_json::to_vec(request)?;
        Ok(frame::with_header(version, &json))
    }

    /// Encodes a response as plain JSON (servers send no header).
    pub fn encode_response(response: &Response) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(response)?)
    }
}

/// Decodes inbound frames.
pub struct Decoder;

impl Decoder {
    /// Decodes a response frame.
    ///
    /// Fails if the bytes are not JSON or the `status`/`result` sections are absent.
    pub fn decode_response(bytes: &[u8]) -> Result<Response, ProtocolError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let object = value
            .as_object()
            .ok_or(ProtocolError::MissingField("status"))?;
        if !object.contains_key("status") {
            return Err(ProtocolError::MissingField("status"));
        }
        if !object.contains_key("result") {
            return Err(ProtocolError::MissingField("result"));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Decodes a request frame, returning the negotiated version with it.
    pub fn decode_request(bytes: &[u8]) -> Result<(ProtocolVersion, Request), ProtocolError> {
        let (mime, payload) = frame::split_header(bytes)?;
        let version = match mime {
            "application/vnd.gremlin-v2.0+json" => ProtocolVersion::V2,
            "application/vnd.gremlin-v3.0+json" => ProtocolVersion::V3,
            other => return Err(ProtocolError::UnsupportedVersion(other.to_string())),
        };
        let request: Request = serde_json::from_slice(payload)?;
        Ok((version, request))
    }
}
