//! Turns an actor's raw JSON response into a routing decision.
//!
//! Per `spec.md` §4.2/§4.3, an actor's response is classified purely by its
//! top-level JSON shape: a bare object is a single payload for the next
//! hop (unless it is an error document); an array is a fan-out; `null` or
//! an empty array is an empty (sink) response. The router never inspects
//! response bodies beyond this classification — everything downstream
//! (invariants 1-8, the C1-C6 table) is keyed off the variant returned
//! here.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseClassification {
    /// A single JSON object to forward as the next hop's payload, or (in
    /// envelope mode) to unpack into `{payload, route, headers}`.
    Single(Value),
    /// A JSON array of N >= 1 payloads: fan out into N sibling envelopes.
    FanOut(Vec<Value>),
    /// `null` or `[]`: the actor is a sink, publish to `happy-end` with an
    /// empty payload.
    Empty,
    /// `{"error": code, "message": ...}`, or a response that isn't a valid
    /// JSON object/array/null at all.
    Error { code: Option<String>, message: String },
}

fn error_code_to_string(code: &Value) -> Option<String> {
    match code {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Classifies a raw actor response per `spec.md` §4.2:
///
/// - a JSON object containing `error` -> `Error`
/// - any other JSON object -> `Single` (the object itself is the payload,
///   or an envelope-mode `{payload, route, headers}` wrapper — the router
///   decides which by inspecting it for a `route` key)
/// - a non-empty JSON array -> `FanOut`
/// - `null` or `[]` -> `Empty`
/// - anything else (a bare string, number, bool) -> `Error` (malformed)
pub fn classify_response(raw: &Value) -> ResponseClassification {
    match raw {
        Value::Null => ResponseClassification::Empty,
        Value::Array(items) if items.is_empty() => ResponseClassification::Empty,
        Value::Array(items) => ResponseClassification::FanOut(items.clone()),
        Value::Object(obj) => {
            if let Some(code) = obj.get("error") {
                let message = obj
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("actor reported an error")
                    .to_string();
                ResponseClassification::Error { code: error_code_to_string(code), message }
            } else {
                ResponseClassification::Single(raw.clone())
            }
        }
        other => ResponseClassification::Error {
            code: None,
            message: format!("actor response was not a JSON object, array, or null (got {other})"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_object_is_single() {
        let raw = json!({"n": 2});
        assert_eq!(classify_response(&raw), ResponseClassification::Single(json!({"n": 2})));
    }

    #[test]
    fn envelope_mode_object_is_still_single() {
        let raw = json!({"payload": {"n": 2}, "route": {"actors": ["a", "b"], "current": 0}});
        assert_eq!(classify_response(&raw), ResponseClassification::Single(raw.clone()));
    }

    #[test]
    fn array_is_fan_out() {
        let raw = json!([{"i": 0}, {"i": 1}, {"i": 2}]);
        assert_eq!(
            classify_response(&raw),
            ResponseClassification::FanOut(vec![json!({"i": 0}), json!({"i": 1}), json!({"i": 2})])
        );
    }

    #[test]
    fn null_is_empty() {
        assert_eq!(classify_response(&Value::Null), ResponseClassification::Empty);
    }

    #[test]
    fn empty_array_is_empty() {
        assert_eq!(classify_response(&json!([])), ResponseClassification::Empty);
    }

    #[test]
    fn error_document_is_error() {
        let raw = json!({"error": "bad_input", "message": "missing field x"});
        assert_eq!(
            classify_response(&raw),
            ResponseClassification::Error { code: Some("bad_input".into()), message: "missing field x".into() }
        );
    }

    #[test]
    fn bare_scalar_is_malformed_error() {
        assert!(matches!(classify_response(&json!("oops")), ResponseClassification::Error { .. }));
        assert!(matches!(classify_response(&json!(42)), ResponseClassification::Error { .. }));
    }
}
