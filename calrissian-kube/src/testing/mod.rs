//! Testing utilities for calrissian-kube
//!
//! [`InMemoryCluster`] is a stateful stand-in for an API server. It keeps
//! objects in memory, records every call, lets tests inject failures, script
//! job status progressions and fake the shared volume that helper pods
//! reach through `tar` exec streams.
//!
//! ```toml
//! [dev-dependencies]
//! calrissian-kube = { path = "../calrissian-kube", features = ["testing"] }
//! ```

mod cluster;
mod exec;

pub use cluster::{ClusterCall, InMemoryCluster, Verb};
