use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "pfr",
    version,
    about = "Record async-profiler flight recordings from Kubernetes pods."
)]
pub struct CliArgs {
    /// Runtime config file (YAML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding the profiler archive and the JFR converter
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Directory scanned for kubeconfig files
    #[arg(long)]
    pub kube_dir: Option<PathBuf>,

    /// Directory for remembered selections and session scratch space
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Log file (defaults to pfr.log inside the state directory)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
