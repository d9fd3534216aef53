//! # gremlink-protocol
//!
//! Wire protocol for talking to a TinkerPop Gremlin Server over WebSocket.
//!
//! This crate provides:
//! - Request envelopes for `eval` and `authentication` operations
//! - The mimetype header that prefixes every outbound frame
//! - Response decoding and the status code taxonomy
//! - Protocol error types

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{Decoder, Encoder};
pub use error::{ProtocolError, StatusCode, StatusError};
pub use frame::{mimetype, split_header, ProtocolVersion};
pub use message::{
    Bindings, Op, Outcome, Request, RequestArgs, RequestIdSource, Response, ResponseResult,
    ResponseStatus, UuidV4,
};

/// Script language tag sent with every eval request.
pub const GREMLIN_LANGUAGE: &str = "gremlin-groovy";

/// Default Gremlin Server WebSocket path.
pub const DEFAULT_PATH: &str = "/gremlin";

/// Default Gremlin Server port.
pub const DEFAULT_PORT: u16 = 8182;
