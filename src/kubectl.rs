use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command as TokioCommand;
use tracing::debug;

/// One pod addressed through a private kubeconfig copy.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PodTarget {
    pub kubeconfig: PathBuf,
    pub namespace: String,
    pub pod: String,
}

/// File-copy and remote-exec primitives scoped to a single pod.
pub trait PodTransport: Send + Sync {
    /// Runs `script` through `bash -c` inside the pod.
    fn exec(&self, target: &PodTarget, script: &str) -> impl Future<Output = Result<()>> + Send;

    fn copy_to_pod(
        &self,
        target: &PodTarget,
        local: &Path,
        remote: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn copy_from_pod(
        &self,
        target: &PodTarget,
        remote: &str,
        local: &Path,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Turns a recording into another format beside the input file.
pub trait RecordingConverter: Send + Sync {
    fn convert(&self, format_flag: &str, input: &Path)
    -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: String,
}

impl Kubectl {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// The ambient KUBECONFIG is overridden on the child only and never touched in this process.
    fn command(&self, target: &PodTarget, args: Vec<OsString>) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.binary);
        cmd.env("KUBECONFIG", &target.kubeconfig)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Leading arguments shared by every pod call: explicit kubeconfig, then namespace.
fn target_args(target: &PodTarget) -> Vec<OsString> {
    vec![
        "--kubeconfig".into(),
        target.kubeconfig.clone().into_os_string(),
        "-n".into(),
        target.namespace.clone().into(),
    ]
}

fn exec_args(target: &PodTarget, script: &str) -> Vec<OsString> {
    let mut args = target_args(target);
    args.extend(
        ["exec", target.pod.as_str(), "--", "bash", "-c", script]
            .into_iter()
            .map(OsString::from),
    );
    args
}

/// `file_name` is relative to the command's working directory.
fn copy_to_args(target: &PodTarget, file_name: &OsStr, remote: &str) -> Vec<OsString> {
    let mut args = target_args(target);
    args.push("cp".into());
    args.push(file_name.to_os_string());
    args.push(format!("{}:{remote}", target.pod).into());
    args
}

fn copy_from_args(target: &PodTarget, remote: &str, file_name: &OsStr) -> Vec<OsString> {
    let mut args = target_args(target);
    args.push("cp".into());
    args.push(format!("{}/{}:{remote}", target.namespace, target.pod).into());
    args.push(file_name.to_os_string());
    args
}

impl PodTransport for Kubectl {
    async fn exec(&self, target: &PodTarget, script: &str) -> Result<()> {
        let cmd = self.command(target, exec_args(target, script));
        debug!("kubectl exec {}/{}: {script}", target.namespace, target.pod);
        run_checked(cmd, "kubectl exec").await
    }

    async fn copy_to_pod(&self, target: &PodTarget, local: &Path, remote: &str) -> Result<()> {
        let (dir, file_name) = split_local(local)?;
        let mut cmd = self.command(target, copy_to_args(target, file_name, remote));
        cmd.current_dir(dir);
        debug!(
            "kubectl cp {} -> {}/{}:{remote}",
            local.display(),
            target.namespace,
            target.pod
        );
        run_checked(cmd, "kubectl cp").await
    }

    async fn copy_from_pod(&self, target: &PodTarget, remote: &str, local: &Path) -> Result<()> {
        let (dir, file_name) = split_local(local)?;
        let mut cmd = self.command(target, copy_from_args(target, remote, file_name));
        cmd.current_dir(dir);
        debug!(
            "kubectl cp {}/{}:{remote} -> {}",
            target.namespace,
            target.pod,
            local.display()
        );
        run_checked(cmd, "kubectl cp").await
    }
}

/// `java -jar jfr-converter.jar -o <format> <input>`.
#[derive(Debug, Clone)]
pub struct JfrConverter {
    java: String,
    jar: PathBuf,
}

impl JfrConverter {
    pub fn new(java: impl Into<String>, jar: impl Into<PathBuf>) -> Self {
        Self {
            java: java.into(),
            jar: jar.into(),
        }
    }
}

impl RecordingConverter for JfrConverter {
    async fn convert(&self, format_flag: &str, input: &Path) -> Result<()> {
        let jar = std::path::absolute(&self.jar)
            .with_context(|| format!("failed to resolve {}", self.jar.display()))?;
        let mut cmd = TokioCommand::new(&self.java);
        cmd.arg("-jar")
            .arg(jar)
            .arg("-o")
            .arg(format_flag)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = input.parent() {
            cmd.current_dir(dir);
        }
        debug!("converting {} to {format_flag}", input.display());
        run_checked(cmd, "jfr-converter").await
    }
}

fn split_local(local: &Path) -> Result<(&Path, &OsStr)> {
    let file_name = local
        .file_name()
        .with_context(|| format!("{} has no file name", local.display()))?;
    let dir = local
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok((dir, file_name))
}

async fn run_checked(mut cmd: TokioCommand, what: &str) -> Result<()> {
    let output = cmd
        .output()
        .await
        .with_context(|| format!("failed to execute {what}"))?;
    check_output(&output, what)
}

fn check_output(output: &Output, what: &str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        anyhow::bail!("{what} exited with {}", output.status)
    }
    anyhow::bail!("{what} exited with {} | Details: {stderr}", output.status)
}

/// `kubectl version --client=true` succeeds only if the binary is installed and runnable.
pub async fn check_client(binary: &str) -> Result<()> {
    let mut cmd = TokioCommand::new(binary);
    cmd.arg("version")
        .arg("--client=true")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    run_checked(cmd, binary).await
}
