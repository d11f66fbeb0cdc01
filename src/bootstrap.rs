use anyhow::{Context, Result};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::{DEFAULT_PROFILER_VERSION, Settings};
use crate::kubectl;
use crate::store::{CredentialStore, PersistedSelection};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum BootstrapStage {
    Clearing,
    Checking,
    Downloading(String),
}

impl BootstrapStage {
    pub fn message(&self) -> String {
        match self {
            Self::Clearing => "Clearing old data...".to_string(),
            Self::Checking => "Checking kubectl and kubeconfig directory...".to_string(),
            Self::Downloading(what) => format!("Loading {what}..."),
        }
    }
}

/// Setup conditions that leave the application unusable until restart.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FatalSetup {
    ClusterCliMissing(String),
    KubeDirMissing(PathBuf),
}

impl FatalSetup {
    pub fn message(&self) -> String {
        match self {
            Self::ClusterCliMissing(binary) => format!("{binary} not found"),
            Self::KubeDirMissing(dir) => {
                format!("{} directory not found or empty", dir.display())
            }
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BootstrapReport {
    pub profiler_archive: PathBuf,
    pub profiler_version: String,
    pub download_failures: Vec<String>,
    pub selection: PersistedSelection,
}

pub trait ArtifactFetcher: Send + Sync {
    fn fetch(&self, url: &str, destination: &Path) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to request {url}"))?
            .error_for_status()
            .with_context(|| format!("bad status for {url}"))?;

        let partial = partial_path(destination);
        let mut file = tokio::fs::File::create(&partial)
            .await
            .with_context(|| format!("failed to create {}", partial.display()))?;
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("failed reading body of {url}"))?
        {
            file.write_all(&chunk)
                .await
                .with_context(|| format!("failed to write {}", partial.display()))?;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&partial, destination)
            .await
            .with_context(|| format!("failed to finalize {}", destination.display()))?;
        Ok(())
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

pub struct Bootstrapper<F> {
    settings: Settings,
    store: CredentialStore,
    fetcher: F,
}

impl<F: ArtifactFetcher> Bootstrapper<F> {
    pub fn new(settings: Settings, store: CredentialStore, fetcher: F) -> Self {
        Self {
            settings,
            store,
            fetcher,
        }
    }

    pub async fn run(
        &self,
        mut on_stage: impl FnMut(BootstrapStage) + Send,
    ) -> Result<BootstrapReport, FatalSetup> {
        let data_dir = &self.settings.data_dir;
        if !data_dir.is_dir() {
            on_stage(BootstrapStage::Clearing);
            if let Err(error) = self.store.clear_all() {
                warn!("failed to clear saved data: {error:#}");
            }
        }

        on_stage(BootstrapStage::Checking);
        if let Err(error) = kubectl::check_client(&self.settings.kubectl).await {
            warn!("cluster CLI check failed: {error:#}");
            return Err(FatalSetup::ClusterCliMissing(self.settings.kubectl.clone()));
        }
        if !self.settings.kube_dir.is_dir() {
            return Err(FatalSetup::KubeDirMissing(self.settings.kube_dir.clone()));
        }

        let mut download_failures = Vec::new();
        if let Err(error) = fs::create_dir_all(data_dir) {
            warn!("failed to create {}: {error}", data_dir.display());
        }

        let mut profiler_archive = find_profiler_archive(data_dir)
            .unwrap_or_else(|| self.settings.default_archive_path());
        if !profiler_archive.exists() {
            profiler_archive = self.settings.default_archive_path();
            on_stage(BootstrapStage::Downloading(format!(
                "async-profiler '{}'",
                profiler_version(&profiler_archive)
                    .unwrap_or_else(|| DEFAULT_PROFILER_VERSION.to_string())
            )));
            if let Err(error) = self
                .fetcher
                .fetch(&self.settings.profiler_url, &profiler_archive)
                .await
            {
                warn!("failed to download async-profiler: {error:#}");
                download_failures.push(format!("async-profiler: {error:#}"));
            }
        }

        let converter = self.settings.converter_path();
        if !converter.exists() {
            on_stage(BootstrapStage::Downloading(
                self.settings.converter_jar.clone(),
            ));
            if let Err(error) = self
                .fetcher
                .fetch(&self.settings.converter_url, &converter)
                .await
            {
                warn!("failed to download jfr-converter: {error:#}");
                download_failures.push(format!("jfr-converter: {error:#}"));
            }
        }

        let profiler_version = profiler_version(&profiler_archive)
            .unwrap_or_else(|| DEFAULT_PROFILER_VERSION.to_string());
        let selection = self
            .store
            .load_selection(&self.settings.default_output_folder());
        info!(
            "bootstrap finished: profiler {profiler_version}, {} kubeconfig(s)",
            selection.credentials.len()
        );

        Ok(BootstrapReport {
            profiler_archive,
            profiler_version,
            download_failures,
            selection,
        })
    }
}

/// First `async-profiler*.tar.gz` in the data directory.
pub fn find_profiler_archive(data_dir: &Path) -> Option<PathBuf> {
    let mut archives = fs::read_dir(data_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|kind| kind.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("async-profiler") && name.ends_with(".tar.gz"))
        .collect::<Vec<_>>();
    archives.sort();
    archives.first().map(|name| data_dir.join(name))
}

/// `async-profiler-4.1-linux-x64.tar.gz` -> `4.1`.
pub fn profiler_version(archive: &Path) -> Option<String> {
    let name = archive.file_name()?.to_string_lossy().to_string();
    let parts = name.split('-').collect::<Vec<_>>();
    if parts.len() >= 3 && parts[0] == "async" && parts[1] == "profiler" {
        Some(parts[2].to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ArtifactFetcher, BootstrapStage, Bootstrapper, FatalSetup, find_profiler_archive,
        partial_path, profiler_version,
    };
    use crate::cli::CliArgs;
    use crate::config::Settings;
    use crate::store::{CredentialStore, PreferenceKey};
    use anyhow::Result;
    use clap::Parser;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[derive(Clone, Default)]
    struct FakeFetcher {
        fail: bool,
        fetched: Arc<Mutex<Vec<String>>>,
    }

    impl ArtifactFetcher for FakeFetcher {
        async fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
            self.fetched.lock().expect("fetched").push(url.to_string());
            if self.fail {
                anyhow::bail!("bad status: 404 Not Found");
            }
            fs::write(destination, b"artifact")?;
            Ok(())
        }
    }

    fn settings(root: &Path, kubectl: &str) -> Settings {
        let config = root.join("pfr.yaml");
        fs::write(&config, "").expect("config");
        let args = CliArgs::parse_from([
            "pfr",
            "--config",
            config.to_str().expect("utf8"),
            "--data-dir",
            root.join("data").to_str().expect("utf8"),
            "--kube-dir",
            root.join("kube").to_str().expect("utf8"),
            "--state-dir",
            root.join("state").to_str().expect("utf8"),
        ]);
        let mut settings = Settings::load(&args).expect("settings");
        settings.kubectl = kubectl.to_string();
        settings.home_dir = root.to_path_buf();
        settings
    }

    #[tokio::test]
    async fn fresh_install_clears_state_and_downloads_both_artifacts() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("kube")).expect("kube");
        let settings = settings(dir.path(), "true");
        let store = CredentialStore::new(&settings.kube_dir, &settings.state_dir);
        store
            .write(PreferenceKey::Namespace, "stale")
            .expect("write");
        let fetcher = FakeFetcher::default();
        let bootstrapper = Bootstrapper::new(settings.clone(), store.clone(), fetcher.clone());
        let mut stages = Vec::new();

        let report = bootstrapper
            .run(|stage| stages.push(stage))
            .await
            .expect("bootstrap succeeds");

        assert_eq!(stages[0], BootstrapStage::Clearing);
        assert_eq!(stages[1], BootstrapStage::Checking);
        assert_eq!(stages.len(), 4);
        assert_eq!(fetcher.fetched.lock().expect("fetched").len(), 2);
        assert_eq!(store.read(PreferenceKey::Namespace), None);
        assert_eq!(report.profiler_version, "4.1");
        assert!(report.profiler_archive.exists());
        assert!(settings.converter_path().exists());
        assert!(report.download_failures.is_empty());
    }

    #[tokio::test]
    async fn download_failures_are_not_fatal() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("kube")).expect("kube");
        let settings = settings(dir.path(), "true");
        let store = CredentialStore::new(&settings.kube_dir, &settings.state_dir);
        let fetcher = FakeFetcher {
            fail: true,
            ..FakeFetcher::default()
        };
        let bootstrapper = Bootstrapper::new(settings, store, fetcher);

        let report = bootstrapper.run(|_| {}).await.expect("degraded startup");
        assert_eq!(report.download_failures.len(), 2);
    }

    #[tokio::test]
    async fn existing_artifacts_are_not_downloaded_again() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("kube")).expect("kube");
        fs::create_dir_all(dir.path().join("data")).expect("data");
        fs::write(
            dir.path().join("data/async-profiler-3.0-linux-arm64.tar.gz"),
            "",
        )
        .expect("archive");
        fs::write(dir.path().join("data/jfr-converter.jar"), "").expect("jar");
        let settings = settings(dir.path(), "true");
        let store = CredentialStore::new(&settings.kube_dir, &settings.state_dir);
        store
            .write(PreferenceKey::ProfilerArgs, "-e alloc -d 10")
            .expect("write");
        let fetcher = FakeFetcher::default();
        let bootstrapper = Bootstrapper::new(settings, store, fetcher.clone());
        let mut stages = Vec::new();

        let report = bootstrapper
            .run(|stage| stages.push(stage))
            .await
            .expect("bootstrap succeeds");

        assert_eq!(stages, vec![BootstrapStage::Checking]);
        assert!(fetcher.fetched.lock().expect("fetched").is_empty());
        assert_eq!(report.profiler_version, "3.0");
        assert_eq!(report.selection.profiler_args, "-e alloc -d 10");
    }

    #[tokio::test]
    async fn missing_cluster_cli_is_fatal() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("kube")).expect("kube");
        let settings = settings(dir.path(), "pfr-no-such-kubectl");
        let store = CredentialStore::new(&settings.kube_dir, &settings.state_dir);
        let bootstrapper = Bootstrapper::new(settings, store, FakeFetcher::default());

        let error = bootstrapper.run(|_| {}).await.expect_err("must be fatal");
        assert_eq!(
            error,
            FatalSetup::ClusterCliMissing("pfr-no-such-kubectl".to_string())
        );
        assert_eq!(error.message(), "pfr-no-such-kubectl not found");
    }

    #[tokio::test]
    async fn missing_kube_dir_is_fatal() {
        let dir = tempdir().expect("tempdir");
        let settings = settings(dir.path(), "true");
        let store = CredentialStore::new(&settings.kube_dir, &settings.state_dir);
        let bootstrapper = Bootstrapper::new(settings, store, FakeFetcher::default());

        let error = bootstrapper.run(|_| {}).await.expect_err("must be fatal");
        assert!(matches!(error, FatalSetup::KubeDirMissing(_)));
    }

    #[test]
    fn archive_discovery_and_version_parsing() {
        let dir = tempdir().expect("tempdir");
        assert_eq!(find_profiler_archive(dir.path()), None);
        fs::write(dir.path().join("async-profiler-4.1-macos.zip"), "").expect("write");
        fs::write(dir.path().join("async-profiler-4.1-linux-x64.tar.gz"), "").expect("write");

        let found = find_profiler_archive(dir.path()).expect("archive");
        assert_eq!(profiler_version(&found).as_deref(), Some("4.1"));
        assert_eq!(profiler_version(Path::new("profiler.tar.gz")), None);
    }

    #[test]
    fn partial_download_has_part_suffix() {
        assert_eq!(
            partial_path(Path::new("/data/jfr-converter.jar")),
            PathBuf::from("/data/jfr-converter.jar.part")
        );
    }
}
