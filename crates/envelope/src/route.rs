//! The ordered actor plan an envelope travels through.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EnvelopeError;

/// An ordered list of actor names plus the index of the next hop.
///
/// `current` is the index of the actor that has *not yet* run. A route with
/// `current == actors.len()` has been fully walked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub actors: Vec<String>,
    #[serde(default)]
    pub current: usize,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Route {
    pub fn new(actors: Vec<String>) -> Self {
        Self { actors, current: 0, metadata: HashMap::new() }
    }

    /// The actor this envelope is presently addressed to, if any remain.
    pub fn current_actor(&self) -> Option<&str> {
        self.actors.get(self.current).map(String::as_str)
    }

    /// Whether every actor in the route has already run.
    pub fn is_exhausted(&self) -> bool {
        self.current >= self.actors.len()
    }

    /// Returns a copy of this route advanced to the next hop.
    pub fn advanced(&self) -> Route {
        let mut next = self.clone();
        next.current += 1;
        next
    }
}

/// Validates that an actor's rewritten route still honors the prefix the
/// router has already walked: everything up to and including the current
/// hop must be byte-for-byte identical to the route the actor was handed.
///
/// Actors may only append or replace entries *after* their own position.
/// Violating this invariant downgrades the response to a routing error
/// (classification C5) rather than being applied.
pub fn validate_route_rewrite(original: &Route, proposed: &Route) -> Result<(), EnvelopeError> {
    if proposed.current != original.current {
        return Err(EnvelopeError::RoutePrefixViolation {
            reason: "rewritten route must not move current itself".into(),
        });
    }
    let prefix_len = original.current + 1;
    if proposed.actors.len() < prefix_len || original.actors.len() < prefix_len {
        return Err(EnvelopeError::RoutePrefixViolation {
            reason: "rewritten route is shorter than the walked prefix".into(),
        });
    }
    if proposed.actors[..prefix_len] != original.actors[..prefix_len] {
        return Err(EnvelopeError::RoutePrefixViolation {
            reason: "rewritten route modifies an already-visited hop".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(actors: &[&str], current: usize) -> Route {
        let mut r = Route::new(actors.iter().map(|s| s.to_string()).collect());
        r.current = current;
        r
    }

    #[test]
    fn advancing_moves_current_forward() {
        let r = route(&["a", "b", "c"], 0);
        let next = r.advanced();
        assert_eq!(next.current, 1);
        assert_eq!(next.current_actor(), Some("b"));
    }

    #[test]
    fn exhausted_when_current_past_end() {
        let r = route(&["a"], 1);
        assert!(r.is_exhausted());
        assert_eq!(r.current_actor(), None);
    }

    #[test]
    fn rewrite_appending_new_hops_is_allowed() {
        let original = route(&["a", "b"], 0);
        let proposed = route(&["a", "b", "c"], 0);
        assert!(validate_route_rewrite(&original, &proposed).is_ok());
    }

    #[test]
    fn rewrite_mutating_walked_prefix_is_rejected() {
        let original = route(&["a", "b"], 1);
        let proposed = route(&["x", "b", "c"], 1);
        assert!(validate_route_rewrite(&original, &proposed).is_err());
    }

    #[test]
    fn rewrite_truncating_below_current_is_rejected() {
        let original = route(&["a", "b", "c"], 2);
        let proposed = route(&["a", "b"], 2);
        assert!(validate_route_rewrite(&original, &proposed).is_err());
    }

    #[test]
    fn rewrite_moving_current_is_rejected() {
        let original = route(&["a", "b", "c"], 0);
        let proposed = route(&["a", "b", "c"], 1);
        assert!(validate_route_rewrite(&original, &proposed).is_err());
    }
}
