//! Composite receipt handles.
//!
//! A router or gateway process talks to many named queues through one
//! `Transport`. Acking a message back requires knowing which queue it came
//! from, so every handle we hand callers is `"{queue}|{inner}"` rather than
//! the provider's bare receipt. SQS receipt handles are themselves allowed
//! to contain `|`, so splitting only ever happens on the *first*
//! occurrence — the inner handle is passed through byte-for-byte.

use crate::error::TransportError;

pub fn join_receipt_handle(queue: &str, inner: &str) -> String {
    format!("{queue}|{inner}")
}

pub fn split_receipt_handle(composite: &str) -> Result<(&str, &str), TransportError> {
    composite
        .split_once('|')
        .ok_or_else(|| TransportError::MalformedHandle(composite.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_then_split_roundtrips() {
        let composite = join_receipt_handle("happy-end", "abc123");
        let (queue, inner) = split_receipt_handle(&composite).unwrap();
        assert_eq!(queue, "happy-end");
        assert_eq!(inner, "abc123");
    }

    #[test]
    fn inner_handle_pipes_are_preserved() {
        let composite = join_receipt_handle("q", "AQEB|fragment|with|pipes==");
        let (queue, inner) = split_receipt_handle(&composite).unwrap();
        assert_eq!(queue, "q");
        assert_eq!(inner, "AQEB|fragment|with|pipes==");
    }

    #[test]
    fn missing_separator_is_rejected() {
        assert!(split_receipt_handle("no-separator-here").is_err());
    }
}
