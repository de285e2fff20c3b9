//! Job builder for Calrissian
//!
//! Turns a CWL document and its parameters into a Kubernetes Job running the
//! workflow engine. The documents never travel inline: they are staged as
//! config maps in the execution namespace when the job is built, and the
//! engine container mounts them next to the shared working directory.

pub mod error;
pub mod job;
pub mod manifest;
pub mod requirements;
pub mod security;

pub use error::{JobError, JobResult};
pub use job::{CalrissianJob, CalrissianJobBuilder};
pub use manifest::Payload;
pub use requirements::ResourceRequirements;
pub use security::SecurityContext;
