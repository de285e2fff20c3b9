//! Core vocabulary for the Calrissian orchestrator
//!
//! This crate contains the small set of types shared by every other crate:
//! the job status state machine, the container identities used at the
//! cluster boundary, DNS-label name generation and the fixed layout of the
//! shared working-directory volume.

pub mod layout;
pub mod names;
pub mod types;

// Re-export commonly used types at the crate root
pub use layout::WorkingDirLayout;
pub use names::{
    generate_job_name, generate_namespace_name, is_valid_dns_label, sanitize_dns_label,
    shorten_dns_label, MAX_DNS_LABEL_LEN,
};
pub use types::{ContainerName, JobStatus, ParseError};
