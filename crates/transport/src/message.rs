//! The opaque message wrapper every transport backend produces.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message read off a queue.
///
/// `receipt_handle` is always the *composite* handle produced by
/// [`crate::receipt::join_receipt_handle`] — callers never see a bare
/// provider receipt and must not try to parse it themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub body: Vec<u8>,
    pub receipt_handle: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub enqueued_at: DateTime<Utc>,
    pub delivery_count: u32,
}

impl Message {
    pub fn body_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }
}
