//! Loosely-typed parameter maps.
//!
//! Callers that hold options as JSON-like maps go through here. Fields are
//! matched by name against the typed parameter structs, `null` means "use
//! the default" and unrecognized keys are ignored. Type problems surface as
//! [`SctpError::TypeMismatch`] naming the offending field.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{SctpError, SctpResult};
use crate::io::{SendOptions, SendvOptions, DEFAULT_BUFFER_SIZE};
use crate::socket::SctpSocket;

/// Builds a parameter object from a map of named fields.
pub fn from_params<T: DeserializeOwned>(value: &Value) -> SctpResult<T> {
    let map = match value {
        Value::Object(map) => without_nulls(map),
        Value::Null => Map::new(),
        other => {
            return Err(SctpError::type_mismatch(
                "params",
                format!("an object, got {}", type_name(other)),
            ))
        }
    };
    serde_json::from_value(Value::Object(map.clone())).map_err(|err| {
        let field = offending_field::<T>(&map).unwrap_or_else(|| "params".to_string());
        SctpError::type_mismatch(field, err.to_string())
    })
}

fn without_nulls(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

// Every parameter struct defaults its missing fields, so a map holding only
// the bad key still fails and a map holding only a good key succeeds.
fn offending_field<T: DeserializeOwned>(map: &Map<String, Value>) -> Option<String> {
    map.iter().find_map(|(key, value)| {
        let mut single = Map::new();
        single.insert(key.clone(), value.clone());
        serde_json::from_value::<T>(Value::Object(single))
            .is_err()
            .then(|| key.clone())
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Reads a receive buffer size; `null` is [`DEFAULT_BUFFER_SIZE`].
pub fn buffer_size(value: &Value) -> SctpResult<usize> {
    match value {
        Value::Null => Ok(DEFAULT_BUFFER_SIZE),
        Value::Number(n) => match n.as_i64() {
            Some(size) if size > 0 => usize::try_from(size)
                .map_err(|_| SctpError::invalid_argument("buffer size is too large")),
            Some(_) => Err(SctpError::invalid_argument("buffer size must be positive")),
            None if n.as_u64().is_some() => {
                Err(SctpError::invalid_argument("buffer size is too large"))
            }
            None => Err(SctpError::type_mismatch("buffer_size", "an integer")),
        },
        other => Err(SctpError::type_mismatch(
            "buffer_size",
            format!("an integer, got {}", type_name(other)),
        )),
    }
}

/// Loosely-typed form of [`SctpSocket::send`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SendRequest {
    /// Payload.
    pub message: Option<String>,
    /// Metadata.
    #[serde(flatten)]
    pub options: SendOptions,
}

impl SendRequest {
    /// Parses and validates a request map.
    pub fn parse(value: &Value) -> SctpResult<Self> {
        let request: Self = from_params(value)?;
        if request.message.is_none() {
            return Err(SctpError::invalid_argument("message parameter is required"));
        }
        Ok(request)
    }

    /// Payload bytes; empty if the request was built without one.
    pub fn payload(&self) -> &[u8] {
        self.message.as_deref().map(str::as_bytes).unwrap_or_default()
    }
}

/// Loosely-typed form of [`SctpSocket::send_vectored`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SendvRequest {
    /// Payload fragments, sent as one message.
    pub message: Option<Vec<String>>,
    /// Metadata.
    #[serde(flatten)]
    pub options: SendvOptions,
}

impl SendvRequest {
    /// Parses and validates a request map.
    pub fn parse(value: &Value) -> SctpResult<Self> {
        let request: Self = from_params(value)?;
        match &request.message {
            None => Err(SctpError::invalid_argument("message parameter is required")),
            Some(parts) if parts.is_empty() => {
                Err(SctpError::invalid_argument("Must contain at least one message"))
            }
            Some(_) => Ok(request),
        }
    }

    /// Payload fragments.
    pub fn parts(&self) -> &[String] {
        self.message.as_deref().unwrap_or_default()
    }
}

impl SctpSocket {
    /// [`SctpSocket::send`] driven by a parameter map.
    pub fn send_params(&self, params: &Value) -> SctpResult<usize> {
        let request = SendRequest::parse(params)?;
        self.send(request.payload(), &request.options)
    }

    /// [`SctpSocket::send_vectored`] driven by a parameter map.
    pub fn send_vectored_params(&self, params: &Value) -> SctpResult<usize> {
        let request = SendvRequest::parse(params)?;
        self.send_vectored(request.parts(), &request.options)
    }
}

/// Boolean coercion for option toggles.
pub trait Truthy {
    /// Whether the value counts as "on".
    fn truthy(&self) -> bool;
}

impl Truthy for bool {
    fn truthy(&self) -> bool {
        *self
    }
}

macro_rules! truthy_int {
    ($($t:ty),*) => {
        $(impl Truthy for $t {
            fn truthy(&self) -> bool {
                *self != 0
            }
        })*
    };
}

truthy_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl<T: Truthy> Truthy for Option<T> {
    fn truthy(&self) -> bool {
        self.as_ref().is_some_and(Truthy::truthy)
    }
}

impl<T: Truthy + ?Sized> Truthy for &T {
    fn truthy(&self) -> bool {
        (**self).truthy()
    }
}

impl Truthy for Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::info::{AssociationId, SendFlags};
    use crate::options::{EventSubscriptions, InitMsg};
    use serde_json::json;

    #[test]
    fn test_from_params_known_fields() {
        let init: InitMsg = from_params(&json!({
            "num_ostreams": 10,
            "max_instreams": 5,
        }))
        .unwrap();
        assert_eq!(init.num_ostreams, 10);
        assert_eq!(init.max_instreams, 5);
        assert_eq!(init.max_attempts, 0);
    }

    #[test]
    fn test_from_params_ignores_unknown_and_null() {
        let init: InitMsg = from_params(&json!({
            "num_ostreams": null,
            "max_attempts": 3,
            "shiny_new_field": "whatever",
        }))
        .unwrap();
        assert_eq!(init.num_ostreams, 0);
        assert_eq!(init.max_attempts, 3);
    }

    #[test]
    fn test_from_params_type_mismatch_names_field() {
        let err = from_params::<InitMsg>(&json!({
            "num_ostreams": 1,
            "max_instreams": "five",
        }))
        .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Argument);
        match err {
            SctpError::TypeMismatch { field, .. } => assert_eq!(field, "max_instreams"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_params_out_of_range_is_type_mismatch() {
        let err = from_params::<InitMsg>(&json!({"num_ostreams": 70000})).unwrap_err();
        assert!(matches!(err, SctpError::TypeMismatch { .. }));
    }

    #[test]
    fn test_from_params_rejects_non_object() {
        let err = from_params::<EventSubscriptions>(&json!([1, 2])).unwrap_err();
        match err {
            SctpError::TypeMismatch { field, expected } => {
                assert_eq!(field, "params");
                assert!(expected.contains("array"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_params_null_is_all_defaults() {
        let subs: EventSubscriptions = from_params(&Value::Null).unwrap();
        assert_eq!(subs, EventSubscriptions::default());
    }

    #[test]
    fn test_send_request_requires_message() {
        let err = SendRequest::parse(&json!({"stream": 1})).unwrap_err();
        assert_eq!(err.to_string(), "message parameter is required");
        let err = SendRequest::parse(&json!({"message": null})).unwrap_err();
        assert_eq!(err.to_string(), "message parameter is required");
    }

    #[test]
    fn test_send_request_fields() {
        let request = SendRequest::parse(&json!({
            "message": "hello",
            "stream": 2,
            "ppid": 99,
            "flags": 1,
            "association_id": 7,
            "extra": true,
        }))
        .unwrap();
        assert_eq!(request.payload(), b"hello");
        assert_eq!(request.options.stream, Some(2));
        assert_eq!(request.options.ppid, Some(99));
        assert_eq!(request.options.flags, Some(SendFlags::UNORDERED));
        assert_eq!(request.options.association_id, Some(AssociationId(7)));
    }

    #[test]
    fn test_send_request_bad_stream_type() {
        let err = SendRequest::parse(&json!({"message": "x", "stream": "one"})).unwrap_err();
        assert!(matches!(err, SctpError::TypeMismatch { .. }));
    }

    #[test]
    fn test_sendv_request_validation() {
        let err = SendvRequest::parse(&json!({"message": []})).unwrap_err();
        assert_eq!(err.to_string(), "Must contain at least one message");
        let err = SendvRequest::parse(&json!({})).unwrap_err();
        assert_eq!(err.to_string(), "message parameter is required");

        let request = SendvRequest::parse(&json!({
            "message": ["a", "bc", "def"],
            "auth_key": 1,
        }))
        .unwrap();
        assert_eq!(request.parts().len(), 3);
        assert_eq!(request.options.auth_key, Some(1));
    }

    #[test]
    fn test_buffer_size() {
        assert_eq!(buffer_size(&Value::Null).unwrap(), DEFAULT_BUFFER_SIZE);
        assert_eq!(buffer_size(&json!(4096)).unwrap(), 4096);
        for bad in [json!(0), json!(-1)] {
            let err = buffer_size(&bad).unwrap_err();
            assert_eq!(err.to_string(), "buffer size must be positive");
        }
        assert!(matches!(
            buffer_size(&json!("big")).unwrap_err(),
            SctpError::TypeMismatch { .. }
        ));
        assert!(matches!(
            buffer_size(&json!(1.5)).unwrap_err(),
            SctpError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_truthy() {
        assert!(true.truthy());
        assert!(!false.truthy());
        assert!(1i32.truthy());
        assert!(!0u8.truthy());
        assert!(!None::<bool>.truthy());
        assert!(Some(5u32).truthy());
        assert!(!json!(null).truthy());
        assert!(!json!(0).truthy());
        assert!(!json!(false).truthy());
        assert!(json!("yes").truthy());
        assert!(json!(2).truthy());
        assert!((&true).truthy());
    }
}
