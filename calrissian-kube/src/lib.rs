//! Cluster resource client for Calrissian
//!
//! Thin capability layer over the Kubernetes API. Reads return `None` for
//! absent objects instead of failing, deletes report whether something was
//! removed, and every other failure is classified by [`ClusterError`] so
//! callers can decide what to retry.

pub mod client;
pub mod error;
pub mod exec;
pub mod kind;
pub mod kube_client;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::ClusterClient;
pub use error::{ClusterError, ClusterResult};
pub use exec::{ExecOutput, ExecStream};
pub use kind::ResourceKind;
pub use kube_client::KubeClusterClient;
