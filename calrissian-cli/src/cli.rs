//! CLI argument parsing definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "calrissiantool",
    author,
    version,
    about = "Execute a Calrissian job from a CWL description"
)]
pub struct Cli {
    /// Maximum amount of RAM to use, e.g 1048576, 512Mi or 2G. Follows k8s
    /// resource conventions
    #[arg(long, value_name = "QUANTITY")]
    pub max_ram: Option<String>,

    /// Maximum number of CPU cores to use
    #[arg(long, value_name = "N")]
    pub max_cores: Option<u32>,

    /// Size of the RWX volume for CWL temporary and output files
    #[arg(long, value_name = "QUANTITY")]
    pub volume_size: Option<String>,

    /// YAML file with pod env vars
    #[arg(long, value_name = "PATH")]
    pub pod_env_vars: Option<PathBuf>,

    /// YAML file of node selectors to select the nodes where the pods will be
    /// scheduled
    #[arg(long = "pod-node-selectors", value_name = "PATH")]
    pub pod_node_selector: Option<PathBuf>,

    /// YAML file with the security context used to run the pods
    #[arg(long, value_name = "PATH")]
    pub security_context: Option<PathBuf>,

    /// Output JSON file name to record resource usage
    #[arg(long, value_name = "PATH")]
    pub usage_report: Option<PathBuf>,

    /// Output file name to tee standard output (CWL output object)
    #[arg(long, value_name = "PATH")]
    pub stdout: Option<PathBuf>,

    /// Output file name to tee standard error to (includes tool logs)
    #[arg(long, value_name = "PATH")]
    pub stderr: Option<PathBuf>,

    /// Retrieve the tool logs into the current directory
    #[arg(long)]
    pub tool_logs: bool,

    /// Keep kubernetes resources
    #[arg(long)]
    pub keep_resources: bool,

    /// Sets the debug mode
    #[arg(long)]
    pub debug: bool,

    /// Do not set root directory in the pod as read-only
    #[arg(long)]
    pub no_read_only: bool,

    /// ReadWriteMany storage class to use for the job
    #[arg(long, value_name = "NAME")]
    pub storage_class: Option<String>,

    /// Image pull secrets file (JSON)
    #[arg(long, value_name = "PATH")]
    pub secret_config: Option<PathBuf>,

    /// Job execution monitoring interval in seconds
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub monitor_interval: Option<u64>,

    /// Kill the job after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub wall_time: Option<u64>,

    /// Seconds a pod may wait on an image pull before the job is killed
    #[arg(long, value_name = "SECONDS")]
    pub grace_period: Option<u64>,

    /// A YAML file with the namespace labels
    #[arg(long, value_name = "PATH")]
    pub namespace_labels: Option<PathBuf>,

    /// A YAML file with the namespace annotations
    #[arg(long, value_name = "PATH")]
    pub namespace_annotations: Option<PathBuf>,

    /// A YAML file with the namespace resource quota
    #[arg(long, value_name = "PATH")]
    pub namespace_quota: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// CWL document, a local path or an http(s) URL, with an optional
    /// `#entrypoint`
    #[arg(value_name = "CWL")]
    pub cwl: String,

    /// A YAML parameters file, or `--name=value` pairs
    #[arg(
        value_name = "PARAMS",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        num_args = 0..
    )]
    pub params: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inline_params() {
        let cli = Cli::try_parse_from([
            "calrissiantool",
            "--max-cores",
            "2",
            "--max-ram",
            "4G",
            "--pod-node-selectors",
            "selector.yml",
            "--tool-logs",
            "app.cwl#main",
            "--message=hello",
            "--message=world",
        ])
        .unwrap();

        assert_eq!(cli.max_cores, Some(2));
        assert_eq!(cli.max_ram.as_deref(), Some("4G"));
        assert_eq!(cli.pod_node_selector, Some(PathBuf::from("selector.yml")));
        assert!(cli.tool_logs);
        assert!(!cli.keep_resources);
        assert_eq!(cli.cwl, "app.cwl#main");
        assert_eq!(cli.params, vec!["--message=hello", "--message=world"]);
    }

    #[test]
    fn test_parse_params_file() {
        let cli = Cli::try_parse_from(["calrissiantool", "--debug", "app.cwl", "params.yml"]).unwrap();
        assert!(cli.debug);
        assert_eq!(cli.params, vec!["params.yml"]);
    }

    #[test]
    fn test_zero_monitor_interval_is_rejected() {
        let result = Cli::try_parse_from([
            "calrissiantool",
            "--monitor-interval",
            "0",
            "app.cwl",
            "params.yml",
        ]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );

        let cli = Cli::try_parse_from([
            "calrissiantool",
            "--monitor-interval",
            "1",
            "app.cwl",
            "params.yml",
        ])
        .unwrap();
        assert_eq!(cli.monitor_interval, Some(1));
    }
}
