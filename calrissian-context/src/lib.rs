//! Execution context: one namespace and everything a workflow job needs in it
//!
//! `initialise()` provisions the namespace, the two fixed RBAC roles, the
//! shared working-directory claim, optional pull secrets and an optional
//! quota. Every step probes for an existing object first, so calling it
//! again is a no-op. `dispose()` deletes the namespace and lets the cluster
//! garbage-collect the rest.

pub mod context;
pub mod error;
mod provision;
pub mod resources;
pub mod secrets;

pub use context::ExecutionContext;
pub use error::{ContextError, ContextResult};
pub use secrets::{ImagePullSecrets, SecretReference};
