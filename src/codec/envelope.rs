//! Generic server envelope.
//!
//! Every reply from the detection service is a flat JSON object carrying at
//! least an integer `code`; `code == 0` is logical success, anything else is
//! a protocol-level failure regardless of the HTTP outcome. Endpoint-specific
//! fields (`session_key`, ...) ride alongside.

use serde_json::{Map, Value};

use crate::error::{Result, SightlineError};

/// Field carrying the logical result code.
pub const CODE_FIELD: &str = "code";

/// Optional field carrying a human-readable failure reason.
pub const DESCRIPTION_FIELD: &str = "description";

/// Code the service uses for logical success.
pub const SUCCESS_CODE: i64 = 0;

/// A parsed reply body.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    fields: Map<String, Value>,
}

impl Envelope {
    /// Parse a raw reply body into an envelope.
    ///
    /// The body must be a JSON object with a `code` readable as an integer.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw.trim()).map_err(|e| {
            SightlineError::MalformedEnvelope(format!("bad server response format ({e}): {raw}"))
        })?;

        let Value::Object(fields) = value else {
            return Err(SightlineError::MalformedEnvelope(format!(
                "expected a JSON object: {raw}"
            )));
        };

        let envelope = Self { fields };
        if envelope.get_i64(CODE_FIELD).is_none() {
            return Err(SightlineError::MalformedEnvelope(
                "missing 'code'".to_string(),
            ));
        }
        Ok(envelope)
    }

    /// Parse a raw body and apply the generic success rule in one step.
    pub fn parse_success(raw: &str) -> Result<Self> {
        Self::parse(raw)?.into_success()
    }

    /// The logical result code.
    pub fn code(&self) -> i64 {
        // parse() guarantees presence
        self.get_i64(CODE_FIELD).unwrap_or(i64::MIN)
    }

    /// Server-supplied failure description, if any.
    pub fn description(&self) -> Option<String> {
        self.get_str(DESCRIPTION_FIELD)
    }

    /// Whether the envelope reports logical success.
    pub fn is_success(&self) -> bool {
        self.code() == SUCCESS_CODE
    }

    /// Keep the envelope if it reports success, otherwise turn it into a
    /// [`SightlineError::Protocol`].
    pub fn into_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SightlineError::Protocol {
                code: self.code(),
                description: self.description(),
            })
        }
    }

    /// Whether a field is present (any type, including `null`).
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Read a field as text.
    ///
    /// Scalars are coerced: numbers and booleans are rendered with their
    /// JSON spelling. `null`, arrays and objects yield `None`.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Read a field as an integer.
    ///
    /// Accepts JSON integers and strings holding a decimal integer
    /// (`"0"` and `0` are the same code).
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.fields.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Read a required text field, failing with a malformed-envelope error.
    pub fn require_str(&self, key: &str) -> Result<String> {
        self.get_str(key).ok_or_else(|| {
            let reason = if self.contains(key) {
                format!("'{key}' is not a text value")
            } else {
                format!("expecting '{key}'")
            };
            SightlineError::MalformedEnvelope(reason)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success_envelope() {
        let env = Envelope::parse(r#"{"code":0,"session_key":"abc"}"#).unwrap();
        assert!(env.is_success());
        assert_eq!(env.get_str("session_key").as_deref(), Some("abc"));
        assert!(env.description().is_none());
    }

    #[test]
    fn test_code_coerced_from_string() {
        let env = Envelope::parse(r#"{"code":"0"}"#).unwrap();
        assert_eq!(env.code(), 0);

        let env = Envelope::parse(r#"{"code":" 12 "}"#).unwrap();
        assert_eq!(env.code(), 12);
    }

    #[test]
    fn test_missing_code_is_malformed() {
        let err = Envelope::parse(r#"{"session_key":"abc"}"#).unwrap_err();
        assert!(matches!(err, SightlineError::MalformedEnvelope(_)));

        let err = Envelope::parse(r#"{"code":"zero"}"#).unwrap_err();
        assert!(matches!(err, SightlineError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_non_object_is_malformed() {
        for raw in ["", "not json", "[1,2,3]", "0", "\"code\""] {
            let err = Envelope::parse(raw).unwrap_err();
            assert!(
                matches!(err, SightlineError::MalformedEnvelope(_)),
                "{raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_nonzero_code_carries_description() {
        let err = Envelope::parse_success(r#"{"code":7,"description":"stop now"}"#).unwrap_err();
        match err {
            SightlineError::Protocol { code, description } => {
                assert_eq!(code, 7);
                assert_eq!(description.as_deref(), Some("stop now"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_get_str_coercion() {
        let env =
            Envelope::parse(r#"{"code":0,"n":42,"f":1.5,"b":true,"z":null,"o":{}}"#).unwrap();
        assert_eq!(env.get_str("n").as_deref(), Some("42"));
        assert_eq!(env.get_str("f").as_deref(), Some("1.5"));
        assert_eq!(env.get_str("b").as_deref(), Some("true"));
        assert!(env.get_str("z").is_none());
        assert!(env.get_str("o").is_none());
        assert!(env.contains("z"));
    }

    #[test]
    fn test_require_str_reports_missing_and_mistyped() {
        let env = Envelope::parse(r#"{"code":0,"session_key":null}"#).unwrap();
        match env.require_str("session_key") {
            Err(SightlineError::MalformedEnvelope(reason)) => {
                assert!(reason.contains("not a text value"), "{reason}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        match env.require_str("missing") {
            Err(SightlineError::MalformedEnvelope(reason)) => {
                assert_eq!(reason, "expecting 'missing'");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
