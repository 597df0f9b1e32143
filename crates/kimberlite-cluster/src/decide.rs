//! The pure decision function: `(currentRole, neighbors, health, readiness) -> nextRole`.
//!
//! Nothing here performs I/O or mutates anything; it is deliberately kept
//! free of `async` so it can be exercised directly in property tests.

use crate::neighbor::NeighborSet;
use crate::ports::{HealthResult, ReadyForPrimary};
use crate::role::Role;

/// Computes the next role from the current role and the latest observation.
///
/// The partition pre-rule takes priority over every per-role rule: a node
/// that cannot see any neighbor, not even an Anchor, always returns to
/// Fault regardless of what it currently believes.
pub fn decide(
    current: Role,
    neighbors: &NeighborSet,
    health: HealthResult,
    readiness: ReadyForPrimary,
) -> Role {
    if neighbors.is_partitioned() {
        return Role::Fault;
    }

    match current {
        Role::Initial => Role::Fault,

        Role::Fault => {
            if neighbors.has_any(Role::Primary) {
                Role::Replica
            } else if neighbors.has_any(Role::Candidate) || neighbors.has_any(Role::Replica) {
                Role::Fault
            } else {
                Role::Candidate
            }
        }

        Role::Candidate => {
            if health == HealthResult::NotOk {
                Role::Fault
            } else if neighbors.has_any(Role::Candidate) || neighbors.has_any(Role::Primary) {
                Role::Fault
            } else if readiness == ReadyForPrimary::Ok {
                Role::Primary
            } else {
                Role::Candidate
            }
        }

        Role::Primary => {
            if health == HealthResult::NotOk {
                Role::Fault
            } else if neighbors.has_any(Role::Primary) {
                Role::Fault
            } else {
                Role::Primary
            }
        }

        Role::Replica => {
            if health == HealthResult::NotOk {
                Role::Fault
            } else if !neighbors.has_any(Role::Primary) && !neighbors.has_any(Role::Candidate) {
                Role::Candidate
            } else {
                Role::Replica
            }
        }

        // This controller never adopts Anchor; if it somehow did, treat it
        // like Fault's logic since Anchor carries no special authority here.
        Role::Anchor => Role::Fault,
    }
}
