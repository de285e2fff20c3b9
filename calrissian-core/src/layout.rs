//! Layout of the shared working-directory volume

use serde::{Deserialize, Serialize};

/// Name of the ReadWriteMany claim backing the working directory
pub const WORKING_DIR_CLAIM: &str = "calrissian-wdir";

/// Pod-level volume name used to mount the working-directory claim
pub const WORKING_DIR_VOLUME: &str = "volume-calrissian-wdir";

/// Mount path of the working directory in every pod
pub const WORKING_DIR_MOUNT: &str = "/calrissian";

/// Workflow output object written by the engine
pub const OUTPUT_FILE: &str = "output.json";

/// Usage report written by the engine
pub const USAGE_REPORT_FILE: &str = "report.json";

/// Engine stderr capture
pub const STDERR_FILE: &str = "stderr.log";

/// Paths of the files the workflow engine writes to the shared volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingDirLayout {
    /// Claim name of the shared volume
    pub claim_name: String,
    /// Volume name used in pod specs
    pub volume_name: String,
    /// Mount path inside pods
    pub mount_path: String,
}

impl Default for WorkingDirLayout {
    fn default() -> Self {
        Self {
            claim_name: WORKING_DIR_CLAIM.to_string(),
            volume_name: WORKING_DIR_VOLUME.to_string(),
            mount_path: WORKING_DIR_MOUNT.to_string(),
        }
    }
}

impl WorkingDirLayout {
    /// Layout for a custom claim name with the standard mount path
    pub fn with_claim(claim_name: impl Into<String>) -> Self {
        Self {
            claim_name: claim_name.into(),
            ..Self::default()
        }
    }

    /// Absolute path of a file directly under the mount
    pub fn path_of(&self, file_name: &str) -> String {
        format!("{}/{}", self.mount_path.trim_end_matches('/'), file_name)
    }

    /// Mount path with a trailing slash, as the engine expects for prefixes
    pub fn mount_prefix(&self) -> String {
        format!("{}/", self.mount_path.trim_end_matches('/'))
    }

    pub fn output_path(&self) -> String {
        self.path_of(OUTPUT_FILE)
    }

    pub fn usage_report_path(&self) -> String {
        self.path_of(USAGE_REPORT_FILE)
    }

    pub fn stderr_path(&self) -> String {
        self.path_of(STDERR_FILE)
    }

    /// Path of the log file the engine writes for a child tool
    pub fn tool_log_path(&self, tool_name: &str) -> String {
        self.path_of(&format!("{}.log", tool_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_paths() {
        let layout = WorkingDirLayout::default();
        assert_eq!(layout.output_path(), "/calrissian/output.json");
        assert_eq!(layout.usage_report_path(), "/calrissian/report.json");
        assert_eq!(layout.stderr_path(), "/calrissian/stderr.log");
        assert_eq!(layout.tool_log_path("step-1"), "/calrissian/step-1.log");
        assert_eq!(layout.mount_prefix(), "/calrissian/");
    }
}
