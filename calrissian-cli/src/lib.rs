//! `calrissiantool`: run a CWL workflow as a Kubernetes job
//!
//! The binary is a thin shell around [`run::run`], which takes the cluster
//! client as a parameter so a whole run can be driven against a fake cluster.

pub mod cli;
pub mod inputs;
pub mod run;

pub use cli::Cli;
pub use run::{run, RunOutcome};
