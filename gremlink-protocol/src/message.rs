//! JSON message types for Gremlin Server requests and responses.

use crate::error::{StatusCode, StatusError};
use crate::GREMLIN_LANGUAGE;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Parameter bindings sent alongside a script.
pub type Bindings = HashMap<String, Value>;

/// Generates request identifiers.
pub trait RequestIdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random UUID v4 identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV4;

impl RequestIdSource for UuidV4 {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Request operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Eval,
    Authentication,
}

/// Operation-specific arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestArgs {
    Eval {
        language: String,
        gremlin: String,
        bindings: Bindings,
        rebindings: HashMap<String, String>,
    },
    Sasl {
        sasl: String,
    },
}

/// Request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Unique request ID for correlation.
    #[serde(rename = "requestId")]
    pub request_id: String,

    pub op: Op,

    /// Empty for sessionless eval, `traversal` for authentication.
    pub processor: String,

    pub args: RequestArgs,
}

impl Request {
    /// Builds a script evaluation request.
    pub fn eval(
        request_id: impl Into<String>,
        gremlin: impl Into<String>,
        bindings: Bindings,
        rebindings: HashMap<String, String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            op: Op::Eval,
            processor: String::new(),
            args: RequestArgs::Eval {
                language: GREMLIN_LANGUAGE.to_string(),
                gremlin: gremlin.into(),
                bindings,
                rebindings,
            },
        }
    }

    /// Builds a SASL PLAIN authentication request.
    ///
    /// The identifier must be the one the server challenged with 407.
    pub fn authentication(request_id: impl Into<String>, username: &str, password: &str) -> Self {
        let mut plain = Vec::with_capacity(username.len() + password.len() + 2);
        plain.push(0);
        plain.extend_from_slice(username.as_bytes());
        plain.push(0);
        plain.extend_from_slice(password.as_bytes());

        Self {
            request_id: request_id.into(),
            op: Op::Authentication,
            processor: "traversal".to_string(),
            args: RequestArgs::Sasl {
                sasl: BASE64_STANDARD.encode(plain),
            },
        }
    }

    /// Returns the script text for eval requests.
    pub fn gremlin(&self) -> Option<&str> {
        match &self.args {
            RequestArgs::Eval { gremlin, .. } => Some(gremlin),
            RequestArgs::Sasl { .. } => None,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Status section of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseStatus {
    pub code: StatusCode,

    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,

    #[serde(default)]
    pub attributes: Value,
}

/// Result section of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseResult {
    #[serde(default)]
    pub data: Value,

    #[serde(default)]
    pub meta: Value,
}

/// Response message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this response correlates to. The server omits it for
    /// frames it could not parse.
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,

    pub status: ResponseStatus,

    pub result: ResponseResult,
}

/// What a single response means for its request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 206: data follows in later frames.
    Partial(Value),
    /// 200: last frame, with data.
    Final(Value),
    /// 204: last frame, nothing to return.
    NoContent,
    /// 407: server challenges for credentials.
    AuthRequired,
    Failed(StatusError),
}

impl Outcome {
    /// Returns whether no further frames follow for this request.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Partial(_) | Outcome::AuthRequired)
    }
}

impl Response {
    pub fn new(request_id: impl Into<String>, code: StatusCode, data: Value) -> Self {
        Self {
            request_id: Some(request_id.into()),
            status: ResponseStatus {
                code,
                message: String::new(),
                attributes: Value::Object(Default::default()),
            },
            result: ResponseResult {
                data,
                meta: Value::Object(Default::default()),
            },
        }
    }

    pub fn ok(request_id: impl Into<String>, data: Value) -> Self {
        Self::new(request_id, StatusCode::Success, data)
    }

    pub fn partial(request_id: impl Into<String>, data: Value) -> Self {
        Self::new(request_id, StatusCode::PartialContent, data)
    }

    pub fn error(request_id: impl Into<String>, code: StatusCode, message: impl Into<String>) -> Self {
        let mut response = Self::new(request_id, code, Value::Null);
        response.status.message = message.into();
        response
    }

    pub fn code(&self) -> StatusCode {
        self.status.code
    }

    /// Classifies the response by status code.
    pub fn outcome(self) -> Outcome {
        match self.status.code {
            StatusCode::Success => Outcome::Final(self.result.data),
            StatusCode::PartialContent => Outcome::Partial(self.result.data),
            StatusCode::NoContent => Outcome::NoContent,
            StatusCode::AuthenticationRequired => Outcome::AuthRequired,
            code => Outcome::Failed(StatusError::new(code, self.status.message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_eval_request_shape() {
        let mut bindings = Bindings::new();
        bindings.insert("x".to_string(), json!(1));
        let request = Request::eval("abc", "g.V(x)", bindings, HashMap::new());

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "requestId": "abc",
                "op": "eval",
                "processor": "",
                "args": {
                    "language": "gremlin-groovy",
                    "gremlin": "g.V(x)",
                    "bindings": {"x": 1},
                    "rebindings": {}
                }
            })
        );
        assert_eq!(request.gremlin(), Some("g.V(x)"));
    }

    #[test]
    fn test_authentication_request_shape() {
        let request = Request::authentication("abc", "user", "pass");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["requestId"], "abc");
        assert_eq!(value["op"], "authentication");
        assert_eq!(value["processor"], "traversal");

        let sasl = value["args"]["sasl"].as_str().unwrap();
        let decoded = BASE64_STANDARD.decode(sasl).unwrap();
        assert_eq!(decoded, b"\0user\0pass");
        assert!(request.gremlin().is_none());
    }

    #[test]
    fn test_request_args_untagged_parse() {
        let request: Request = serde_json::from_value(json!({
            "requestId": "r1",
            "op": "authentication",
            "processor": "traversal",
            "args": {"sasl": "AHUAcA=="}
        }))
        .unwrap();
        assert_eq!(request.op, Op::Authentication);
        assert!(matches!(request.args, RequestArgs::Sasl { .. }));
    }

    #[test]
    fn test_uuid_ids_are_distinct() {
        let source = UuidV4;
        let a = source.next_id();
        let b = source.next_id();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_outcome_classification() {
        let data = json!({"@type": "g:List", "@value": [1]});

        assert_eq!(
            Response::ok("r", data.clone()).outcome(),
            Outcome::Final(data.clone())
        );
        assert_eq!(
            Response::partial("r", data.clone()).outcome(),
            Outcome::Partial(data)
        );
        assert_eq!(
            Response::new("r", StatusCode::NoContent, Value::Null).outcome(),
            Outcome::NoContent
        );
        assert_eq!(
            Response::error("r", StatusCode::AuthenticationRequired, "auth").outcome(),
            Outcome::AuthRequired
        );

        match Response::error("r", StatusCode::ServerTimeout, "too slow").outcome() {
            Outcome::Failed(err) => {
                assert_eq!(err.code, StatusCode::ServerTimeout);
                assert_eq!(err.message, "too slow");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_outcome_terminality() {
        assert!(!Outcome::Partial(Value::Null).is_terminal());
        assert!(!Outcome::AuthRequired.is_terminal());
        assert!(Outcome::Final(Value::Null).is_terminal());
        assert!(Outcome::NoContent.is_terminal());
        assert!(Outcome::Failed(StatusError::new(StatusCode::ServerError, "")).is_terminal());
    }

    #[test]
    fn test_response_null_message() {
        let response: Response = serde_json::from_value(json!({
            "requestId": "r1",
            "status": {"code": 200, "message": null, "attributes": {}},
            "result": {"data": [1, 2], "meta": {}}
        }))
        .unwrap();
        assert_eq!(response.status.message, "");
        assert_eq!(response.result.data, json!([1, 2]));
    }
}
