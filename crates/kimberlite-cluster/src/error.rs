//! Error types for the role-election controller.

use std::path::PathBuf;
use thiserror::Error;

use crate::role::Role;

/// Controller errors.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The route advertiser failed to list or install routes.
    #[error("route advertiser error: {0}")]
    RouteAdvertiser(String),

    /// The database connector failed.
    #[error("database connector error: {0}")]
    Db(String),

    /// The firewall connector failed.
    #[error("firewall connector error: {0}")]
    Firewall(String),

    /// The service supervisor connector failed.
    #[error("service connector error: {0}")]
    Service(String),

    /// Observation phase failed (route table unreadable).
    #[error("observation failed: {0}")]
    Observation(String),

    /// A non-Fault transition handler failed; the caller must force Fault.
    #[error("transition to {role:?} failed: {source}")]
    Transition { role: Role, source: Box<Error> },

    /// The decision function produced an edge not present in the transition graph.
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition { from: Role, to: Role },

    /// Startup-time configuration validation failed.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// The exclusive process lock could not be acquired.
    #[error("could not acquire exclusive lock at {0}")]
    LockHeld(PathBuf),

    /// An external command exceeded its timeout.
    #[error("external command timed out: {0}")]
    Timeout(String),
}

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, Error>;
