use crate::cli::CliArgs;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PROFILER_VERSION: &str = "4.1";
const DEFAULT_PROFILER_ARCHIVE: &str = "async-profiler-4.1-linux-x64.tar.gz";
const DEFAULT_PROFILER_URL: &str = "https://github.com/async-profiler/async-profiler/releases/download/v4.1/async-profiler-4.1-linux-x64.tar.gz";
const DEFAULT_CONVERTER_JAR: &str = "jfr-converter.jar";
const DEFAULT_CONVERTER_URL: &str =
    "https://github.com/async-profiler/async-profiler/releases/download/v4.1/jfr-converter.jar";
pub const PROFILER_HOMEPAGE: &str = "https://github.com/async-profiler/async-profiler";

/// Fully resolved runtime settings. Built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub source: Option<String>,
    pub kubectl: String,
    pub java: String,
    pub data_dir: PathBuf,
    pub kube_dir: PathBuf,
    pub state_dir: PathBuf,
    pub home_dir: PathBuf,
    pub profiler_url: String,
    pub profiler_archive: String,
    pub converter_url: String,
    pub converter_jar: String,
    pub remote_tmp: String,
    pub list_timeout: Duration,
    pub download_timeout: Duration,
    pub log_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct PfrConfigFile {
    #[serde(default)]
    kubectl: Option<String>,
    #[serde(default)]
    java: Option<String>,
    #[serde(default)]
    data_dir: Option<PathBuf>,
    #[serde(default)]
    kube_dir: Option<PathBuf>,
    #[serde(default)]
    state_dir: Option<PathBuf>,
    #[serde(default, alias = "async_profiler_url")]
    profiler_url: Option<String>,
    #[serde(default)]
    profiler_archive: Option<String>,
    #[serde(default, alias = "jfr_converter_url")]
    converter_url: Option<String>,
    #[serde(default)]
    converter_jar: Option<String>,
    #[serde(default, alias = "remote_dir")]
    remote_tmp: Option<String>,
    #[serde(default, alias = "list_timeout")]
    list_timeout_secs: Option<u64>,
    #[serde(default, alias = "download_timeout")]
    download_timeout_secs: Option<u64>,
}

impl Settings {
    pub fn load(args: &CliArgs) -> Result<Self> {
        let path = args.config.clone().or_else(discover_config_path);
        let (file, source) = match path {
            Some(path) => {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read runtime config {}", path.display()))?;
                let parsed = parse_config(&raw)
                    .with_context(|| format!("failed to parse runtime config {}", path.display()))?;
                (parsed, Some(path.display().to_string()))
            }
            None => (PfrConfigFile::default(), None),
        };

        Ok(Self::resolve(args, file, source, home_dir()))
    }

    fn resolve(
        args: &CliArgs,
        file: PfrConfigFile,
        source: Option<String>,
        home: PathBuf,
    ) -> Self {
        let data_dir = args
            .data_dir
            .clone()
            .or(file.data_dir)
            .unwrap_or_else(|| PathBuf::from("./data"));
        let kube_dir = args
            .kube_dir
            .clone()
            .or(file.kube_dir)
            .map(|path| expand_home(&path, &home))
            .unwrap_or_else(|| home.join(".kube"));
        let state_dir = args
            .state_dir
            .clone()
            .or(file.state_dir)
            .map(|path| expand_home(&path, &home))
            .unwrap_or_else(|| home.join(".k8s-pfr"));
        let log_file = args
            .log_file
            .clone()
            .unwrap_or_else(|| state_dir.join("pfr.log"));

        Self {
            source,
            kubectl: non_empty(file.kubectl).unwrap_or_else(|| "kubectl".to_string()),
            java: non_empty(file.java).unwrap_or_else(|| "java".to_string()),
            data_dir,
            kube_dir,
            state_dir,
            home_dir: home,
            profiler_url: non_empty(file.profiler_url)
                .unwrap_or_else(|| DEFAULT_PROFILER_URL.to_string()),
            profiler_archive: non_empty(file.profiler_archive)
                .unwrap_or_else(|| DEFAULT_PROFILER_ARCHIVE.to_string()),
            converter_url: non_empty(file.converter_url)
                .unwrap_or_else(|| DEFAULT_CONVERTER_URL.to_string()),
            converter_jar: non_empty(file.converter_jar)
                .unwrap_or_else(|| DEFAULT_CONVERTER_JAR.to_string()),
            remote_tmp: non_empty(file.remote_tmp)
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| "/tmp".to_string()),
            list_timeout: Duration::from_secs(file.list_timeout_secs.unwrap_or(10).max(1)),
            download_timeout: Duration::from_secs(
                file.download_timeout_secs.unwrap_or(300).max(1),
            ),
            log_file,
        }
    }

    pub fn converter_path(&self) -> PathBuf {
        self.data_dir.join(&self.converter_jar)
    }

    pub fn default_archive_path(&self) -> PathBuf {
        self.data_dir.join(&self.profiler_archive)
    }

    pub fn session_root(&self) -> PathBuf {
        self.state_dir.join("tmp")
    }

    pub fn default_output_folder(&self) -> PathBuf {
        self.home_dir.join("Desktop")
    }
}

fn parse_config(raw: &str) -> Result<PfrConfigFile> {
    if raw.trim().is_empty() {
        return Ok(PfrConfigFile::default());
    }
    Ok(serde_yaml::from_str(raw)?)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn expand_home(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("PFR_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("pfr.yaml"),
        PathBuf::from("pfr.yml"),
        PathBuf::from(".pfr.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let home = home_dir();
    let user_candidates = [
        home.join(".config/pfr/config.yaml"),
        home.join(".config/pfr/config.yml"),
        home.join(".pfr.yaml"),
    ];
    user_candidates
        .into_iter()
        .find(|candidate| candidate.exists())
}

#[cfg(test)]
mod tests {
    use super::{PfrConfigFile, Settings, parse_config};
    use crate::cli::CliArgs;
    use clap::Parser;
    use std::path::PathBuf;
    use std::time::Duration;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["pfr"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn defaults_resolve_under_home() {
        let settings = Settings::resolve(
            &args(&[]),
            PfrConfigFile::default(),
            None,
            PathBuf::from("/home/dev"),
        );

        assert_eq!(settings.kube_dir, PathBuf::from("/home/dev/.kube"));
        assert_eq!(settings.state_dir, PathBuf::from("/home/dev/.k8s-pfr"));
        assert_eq!(settings.log_file, PathBuf::from("/home/dev/.k8s-pfr/pfr.log"));
        assert_eq!(settings.data_dir, PathBuf::from("./data"));
        assert_eq!(settings.remote_tmp, "/tmp");
        assert_eq!(settings.kubectl, "kubectl");
        assert_eq!(
            settings.default_output_folder(),
            PathBuf::from("/home/dev/Desktop")
        );
        assert_eq!(settings.list_timeout, Duration::from_secs(10));
    }

    #[test]
    fn yaml_values_apply_and_cli_wins() {
        let file = parse_config(
            "kubectl: /opt/bin/kubectl\nkube_dir: ~/clusters\ndata_dir: /srv/pfr\nremote_dir: /var/tmp/\nlist_timeout: 3\n",
        )
        .expect("config parses");
        let settings = Settings::resolve(
            &args(&["--data-dir", "/cli/data"]),
            file,
            Some("pfr.yaml".to_string()),
            PathBuf::from("/home/dev"),
        );

        assert_eq!(settings.kubectl, "/opt/bin/kubectl");
        assert_eq!(settings.kube_dir, PathBuf::from("/home/dev/clusters"));
        assert_eq!(settings.data_dir, PathBuf::from("/cli/data"));
        assert_eq!(settings.remote_tmp, "/var/tmp");
        assert_eq!(settings.list_timeout, Duration::from_secs(3));
        assert_eq!(settings.source.as_deref(), Some("pfr.yaml"));
    }

    #[test]
    fn empty_config_file_is_accepted() {
        assert!(parse_config("  \n").is_ok());
    }
}
