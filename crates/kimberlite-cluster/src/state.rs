//! Controller state: the fields the core task owns, plus the slice of it
//! ([`RoleState`]) that is shared with external readers under a lock.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::ControllerConfig;
use crate::neighbor::NeighborSet;
use crate::ports::{HealthResult, ReadyForPrimary};
use crate::role::Role;

/// The only part of [`ControllerState`] visible outside the core task: the
/// committed role and the one it transitioned from. Readers (the HTTP
/// status handler) take the read side of the lock for a single load.
#[derive(Debug, Clone, Copy)]
pub struct RoleState {
    pub current: Role,
    pub previous: Role,
}

impl Default for RoleState {
    fn default() -> Self {
        Self {
            current: Role::Initial,
            previous: Role::Initial,
        }
    }
}

/// A cheaply cloneable shared handle onto the committed role, for the HTTP
/// sidecar tasks.
pub type SharedRoleState = Arc<RwLock<RoleState>>;

/// Everything the core task owns across ticks. Every field except
/// `role` is private to the core; `role` is the only field shared with
/// the HTTP sidecar, via [`SharedRoleState`].
pub struct ControllerState {
    pub role: SharedRoleState,
    pub config: ControllerConfig,

    pub last_neighbors: NeighborSet,
    pub last_health: HealthResult,
    pub last_readiness: ReadyForPrimary,

    pub write_probe_fail_streak: u32,
    pub replication_fail_streak: u32,
}

impl ControllerState {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            role: Arc::new(RwLock::new(RoleState::default())),
            config,
            last_neighbors: NeighborSet::new(),
            last_health: HealthResult::NotOk,
            last_readiness: ReadyForPrimary::NotOk,
            write_probe_fail_streak: 0,
            replication_fail_streak: 0,
        }
    }

    pub fn host_address(&self) -> Ipv4Addr {
        self.config.host_address
    }

    /// Snapshots the currently committed role without touching anything else.
    pub async fn current_role(&self) -> Role {
        self.role.read().await.current
    }

    /// Commits `next` as the new current role, recording the prior role as
    /// `previous`. Returns the `(previous, current)` pair the transition
    /// executor dispatches on.
    pub async fn commit(&self, next: Role) -> (Role, Role) {
        let mut guard = self.role.write().await;
        guard.previous = guard.current;
        guard.current = next;
        (guard.previous, guard.current)
    }
}
