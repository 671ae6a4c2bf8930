//! Shared progress-percent arithmetic.
//!
//! Both the gateway (authoritative, stored in Postgres) and the router
//! (advisory, used only for logging) compute progress the same way so the
//! two never visibly disagree.

use crate::status::EnvelopeState;

/// Computes the 0..=100 completion percentage for an envelope.
///
/// `total_actors` is the length of the route. `actor_idx` is the zero-based
/// index of the actor currently reporting, and `state` is the checkpoint it
/// is reporting. An actor's own progress span covers `1 / total_actors` of
/// the whole, weighted by how far through its own lifecycle it is.
///
/// Returns `0.0` for a route with no actors.
pub fn compute_percent(total_actors: usize, actor_idx: usize, state: EnvelopeState) -> f64 {
    if total_actors == 0 {
        return 0.0;
    }
    let total_actors = total_actors as f64;
    let actor_idx = actor_idx.min(total_actors as usize - 1) as f64;
    let percent = 100.0 * (actor_idx + state.weight()) / total_actors;
    percent.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_actor_route() {
        assert!((compute_percent(1, 0, EnvelopeState::Received) - 33.333).abs() < 0.01);
        assert!((compute_percent(1, 0, EnvelopeState::Processing) - 66.667).abs() < 0.01);
        assert_eq!(compute_percent(1, 0, EnvelopeState::Completed), 100.0);
    }

    #[test]
    fn middle_actor_of_three() {
        let p = compute_percent(3, 1, EnvelopeState::Completed);
        assert!((p - 66.667).abs() < 0.01);
    }

    #[test]
    fn empty_route_is_zero() {
        assert_eq!(compute_percent(0, 0, EnvelopeState::Completed), 0.0);
    }

    #[test]
    fn out_of_range_idx_is_clamped_to_last_actor() {
        let p = compute_percent(2, 5, EnvelopeState::Completed);
        assert_eq!(p, 100.0);
    }
}
