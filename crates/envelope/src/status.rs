//! Envelope and per-hop progress status enums.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an [`crate::Envelope`].
///
/// `Succeeded` and `Failed` are terminal: once an envelope reaches either,
/// no further transition is accepted (see [`crate::Envelope::is_terminal`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl EnvelopeStatus {
    /// Terminal statuses freeze the envelope: no further updates are accepted.
    pub fn is_terminal(self) -> bool {
        matches!(self, EnvelopeStatus::Succeeded | EnvelopeStatus::Failed)
    }
}

impl std::fmt::Display for EnvelopeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EnvelopeStatus::Pending => "pending",
            EnvelopeStatus::Running => "running",
            EnvelopeStatus::Succeeded => "succeeded",
            EnvelopeStatus::Failed => "failed",
            EnvelopeStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// The three progress checkpoints a sidecar reports per hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeState {
    Received,
    Processing,
    Completed,
}

impl EnvelopeState {
    /// Progress weight used by [`crate::progress::compute_percent`].
    pub fn weight(self) -> f64 {
        match self {
            EnvelopeState::Received => 1.0 / 3.0,
            EnvelopeState::Processing => 2.0 / 3.0,
            EnvelopeState::Completed => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(EnvelopeStatus::Succeeded.is_terminal());
        assert!(EnvelopeStatus::Failed.is_terminal());
        assert!(!EnvelopeStatus::Running.is_terminal());
        assert!(!EnvelopeStatus::Pending.is_terminal());
        assert!(!EnvelopeStatus::Unknown.is_terminal());
    }

    #[test]
    fn status_wire_casing() {
        assert_eq!(serde_json::to_string(&EnvelopeStatus::Succeeded).unwrap(), "\"succeeded\"");
        assert_eq!(serde_json::to_string(&EnvelopeState::Received).unwrap(), "\"received\"");
    }
}
