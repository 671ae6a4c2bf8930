use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::EnvelopeError;
use crate::route::Route;
use crate::status::EnvelopeStatus;

/// The unit of work that flows between sidecars, actors and the gateway.
///
/// An envelope's `id` is stable for its whole lifetime. Fan-out children
/// derive their ids from the parent's (see [`fan_out`]) rather than minting
/// fresh ones, so retried fan-out remains duplicate-safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub status: EnvelopeStatus,
    pub route: Route,
    #[serde(default)]
    pub headers: Map<String, Value>,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress_percent: f64,
    pub current_actor_idx: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_actor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub actors_completed: usize,
    pub total_actors: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Envelope {
    /// Builds a fresh top-level envelope (no parent) addressed to `route`.
    pub fn new(route: Route, payload: Value) -> Self {
        let now = Utc::now();
        let total_actors = route.actors.len();
        let current_actor_name = route.current_actor().map(str::to_string);
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            status: EnvelopeStatus::Pending,
            current_actor_idx: route.current,
            current_actor_name,
            total_actors,
            route,
            headers: Map::new(),
            payload,
            result: None,
            error: None,
            timeout_sec: None,
            deadline: None,
            progress_percent: 0.0,
            message: None,
            actors_completed: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Applies a terminal or in-flight status transition, rejecting any
    /// attempt to move an already-terminal envelope.
    pub fn transition(&mut self, status: EnvelopeStatus) -> Result<(), EnvelopeError> {
        if self.status.is_terminal() {
            return Err(EnvelopeError::AlreadyTerminal {
                id: self.id.clone(),
                status: self.status.to_string(),
            });
        }
        self.status = status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Recomputes `total_actors` and `current_actor_name` from `route`.
    /// Called after any accepted route rewrite so the two never drift
    /// apart (invariant: `total_actors == len(route.actors)`).
    pub fn sync_route_derived_fields(&mut self) {
        self.total_actors = self.route.actors.len();
        self.current_actor_idx = self.route.current;
        self.current_actor_name = self.route.current_actor().map(str::to_string);
    }
}

/// Splits one envelope into `n` sibling envelopes that share a single
/// logical identity.
///
/// The envelope at index 0 keeps the parent's own `id` and carries no
/// `parent_id`; this is what lets a fan-out of one behave exactly like no
/// fan-out at all. Every other child gets `"{parent_id}-{i}"` for `i` in
/// `1..n`, which is what makes retried fan-out idempotent: replaying the
/// same split always produces the same set of child ids.
pub fn fan_out(parent: &Envelope, payloads: Vec<Value>) -> Result<Vec<Envelope>, EnvelopeError> {
    if payloads.is_empty() {
        return Err(EnvelopeError::EmptyFanOut);
    }
    let now = Utc::now();
    let total_actors = parent.route.actors.len();
    let current_actor_name = parent.route.current_actor().map(str::to_string);
    let children = payloads
        .into_iter()
        .enumerate()
        .map(|(i, payload)| {
            let (id, parent_id) = if i == 0 {
                (parent.id.clone(), None)
            } else {
                (format!("{}-{}", parent.id, i), Some(parent.id.clone()))
            };
            Envelope {
                id,
                parent_id,
                status: EnvelopeStatus::Pending,
                route: parent.route.clone(),
                headers: parent.headers.clone(),
                payload,
                result: None,
                error: None,
                timeout_sec: parent.timeout_sec,
                deadline: parent.deadline,
                progress_percent: parent.progress_percent,
                current_actor_idx: parent.route.current,
                current_actor_name: current_actor_name.clone(),
                message: None,
                actors_completed: parent.actors_completed,
                total_actors,
                created_at: now,
                updated_at: now,
            }
        })
        .collect();
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Route;

    fn sample_envelope(id: &str) -> Envelope {
        let mut e = Envelope::new(Route::new(vec!["actor-a".into()]), Value::Null);
        e.id = id.to_string();
        e
    }

    #[test]
    fn fan_out_of_one_keeps_parent_identity() {
        let parent = sample_envelope("parent-1");
        let children = fan_out(&parent, vec![Value::from(1)]).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, "parent-1");
        assert_eq!(children[0].parent_id, None);
    }

    #[test]
    fn fan_out_of_many_derives_suffixed_ids() {
        let parent = sample_envelope("parent-1");
        let children = fan_out(&parent, vec![Value::from(1), Value::from(2), Value::from(3)]).unwrap();
        let ids: Vec<&str> = children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["parent-1", "parent-1-1", "parent-1-2"]);
        assert_eq!(children[0].parent_id, None);
        assert_eq!(children[1].parent_id.as_deref(), Some("parent-1"));
        assert_eq!(children[2].parent_id.as_deref(), Some("parent-1"));
    }

    #[test]
    fn fan_out_is_idempotent_under_replay() {
        let parent = sample_envelope("parent-1");
        let first = fan_out(&parent, vec![Value::from(1), Value::from(2)]).unwrap();
        let replay = fan_out(&parent, vec![Value::from(1), Value::from(2)]).unwrap();
        let first_ids: Vec<&str> = first.iter().map(|c| c.id.as_str()).collect();
        let replay_ids: Vec<&str> = replay.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(first_ids, replay_ids);
    }

    #[test]
    fn fan_out_rejects_empty_payload_list() {
        let parent = sample_envelope("parent-1");
        assert!(fan_out(&parent, vec![]).is_err());
    }

    #[test]
    fn fan_out_children_share_advanced_route() {
        let mut parent = sample_envelope("parent-1");
        parent.route = Route::new(vec!["a".into(), "b".into()]);
        parent.route.current = 1;
        let children = fan_out(&parent, vec![Value::from(1), Value::from(2)]).unwrap();
        assert!(children.iter().all(|c| c.route.current == 1));
    }

    #[test]
    fn terminal_transition_is_rejected() {
        let mut e = sample_envelope("e1");
        e.transition(EnvelopeStatus::Succeeded).unwrap();
        assert!(e.transition(EnvelopeStatus::Running).is_err());
    }

    #[test]
    fn new_envelope_derives_total_actors_and_current_name() {
        let e = sample_envelope("e1");
        assert_eq!(e.total_actors, 1);
        assert_eq!(e.current_actor_name.as_deref(), Some("actor-a"));
        assert_eq!(e.current_actor_idx, 0);
    }

    #[test]
    fn sync_route_derived_fields_picks_up_rewrite() {
        let mut e = sample_envelope("e1");
        e.route = Route::new(vec!["actor-a".into(), "actor-b".into(), "actor-c".into()]);
        e.route.current = 2;
        e.sync_route_derived_fields();
        assert_eq!(e.total_actors, 3);
        assert_eq!(e.current_actor_idx, 2);
        assert_eq!(e.current_actor_name.as_deref(), Some("actor-c"));
    }
}
