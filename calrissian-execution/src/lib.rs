//! Execution controller for Calrissian
//!
//! Submits a built [`CalrissianJob`](calrissian_job::CalrissianJob), follows
//! it with a polling monitor that can give up on a job, and retrieves what
//! the workflow engine left behind on the working-directory volume.

pub mod error;
pub mod execution;
pub mod status;

pub use error::{ExecutionError, ExecutionResult};
pub use execution::{CalrissianExecution, IMAGE_PULL_BACK_OFF};
pub use status::{classify, completion_time, start_time};
