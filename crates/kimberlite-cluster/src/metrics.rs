//! Prometheus metrics exported by the controller.
//!
//! Names and labels match the operator-facing contract exactly:
//! `edb_db_controller_state{state}` and
//! `edb_db_controller_state_transition_count{state}`.

use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::role::Role;

const ROLES: [Role; 6] = [
    Role::Initial,
    Role::Fault,
    Role::Candidate,
    Role::Primary,
    Role::Replica,
    Role::Anchor,
];

/// One controller instance's metric set, registered against its own
/// [`Registry`] so that tests can build independent instances without
/// interfering with each other.
pub struct Metrics {
    registry: Registry,
    state: GaugeVec,
    transitions: IntCounterVec,
}

impl Metrics {
    /// Builds a fresh metric set with every role's gauge pre-seeded to 0
    /// except `Initial`, which starts at 1 (the role the controller is in
    /// before its first tick).
    pub fn new() -> Self {
        let registry = Registry::new();

        let state = GaugeVec::new(
            Opts::new(
                "edb_db_controller_state",
                "1 for the currently held role, 0 for all others",
            ),
            &["state"],
        )
        .expect("static metric definition is well-formed");

        let transitions = IntCounterVec::new(
            Opts::new(
                "edb_db_controller_state_transition_count",
                "number of committed transitions into each role, including unchanged ones",
            ),
            &["state"],
        )
        .expect("static metric definition is well-formed");

        registry
            .register(Box::new(state.clone()))
            .expect("metric registered exactly once");
        registry
            .register(Box::new(transitions.clone()))
            .expect("metric registered exactly once");

        for role in ROLES {
            state.with_label_values(&[role.as_str()]).set(0.0);
            transitions.with_label_values(&[role.as_str()]).reset();
        }
        state.with_label_values(&[Role::Initial.as_str()]).set(1.0);

        Self {
            registry,
            state,
            transitions,
        }
    }

    /// Records a commit: sets the new role's gauge to 1 and every other
    /// role's to 0, and increments the new role's transition counter.
    pub fn record_transition(&self, role: Role) {
        for candidate in ROLES {
            let value = if candidate == role { 1.0 } else { 0.0 };
            self.state.with_label_values(&[candidate.as_str()]).set(value);
        }
        self.transitions.with_label_values(&[role.as_str()]).inc();
    }

    /// Renders the current metric set as Prometheus text exposition.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .expect("text encoding of well-formed metric families cannot fail");
        String::from_utf8(buffer).expect("prometheus text encoder emits valid utf-8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
