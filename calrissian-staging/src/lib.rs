//! Volume staging for Calrissian
//!
//! The orchestrator and the workflow engine share nothing but the
//! ReadWriteMany working-directory volume. Files move across it through a
//! disposable helper pod that mounts the same claim: `tar` runs inside the
//! pod over an exec stream and the archive is packed or unpacked locally.
//! When exec streams are blocked, `kubectl cp` is used instead.

pub mod archive;
pub mod error;
pub mod fallback;
pub mod helper;
pub mod stager;

pub use error::{StagingError, StagingResult};
pub use fallback::KubectlCopy;
pub use helper::HelperPod;
pub use stager::VolumeStager;
