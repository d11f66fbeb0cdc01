use crate::model::OutputFormat;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_PROFILER_ARGS: &str = "-e cpu -d 30";

/// One plain-text file per remembered value inside the state directory.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum PreferenceKey {
    Credential,
    Namespace,
    Pod,
    ProfilerArgs,
    OutputFolder,
    Format,
}

impl PreferenceKey {
    pub const ALL: [Self; 6] = [
        Self::Credential,
        Self::Namespace,
        Self::Pod,
        Self::ProfilerArgs,
        Self::OutputFolder,
        Self::Format,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Credential => "kubeconfig.mem",
            Self::Namespace => "namespace.mem",
            Self::Pod => "pod.mem",
            Self::ProfilerArgs => "asprof_args.mem",
            Self::OutputFolder => "jfr_folder.mem",
            Self::Format => "convert_format.mem",
        }
    }
}

/// Remembered selections as loaded at startup.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PersistedSelection {
    pub credentials: Vec<String>,
    pub credential: Option<String>,
    pub namespace: Option<String>,
    pub pod: Option<String>,
    pub profiler_args: String,
    pub output_folder: PathBuf,
    pub format: OutputFormat,
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    kube_dir: PathBuf,
    state_dir: PathBuf,
}

impl CredentialStore {
    pub fn new(kube_dir: impl Into<PathBuf>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            kube_dir: kube_dir.into(),
            state_dir: state_dir.into(),
        }
    }

    #[cfg(test)]
    fn kube_dir(&self) -> &Path {
        &self.kube_dir
    }

    #[cfg(test)]
    fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn credential_path(&self, name: &str) -> PathBuf {
        self.kube_dir.join(name)
    }

    /// Names of all non-directory entries in the kube directory, in directory order.
    pub fn list(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.kube_dir) else {
            return Vec::new();
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_type()
                    .map(|file_type| !file_type.is_dir())
                    .unwrap_or(false)
            })
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect()
    }

    /// The remembered credential, only if it still exists on disk.
    pub fn load_persisted(&self) -> Option<String> {
        let saved = self.read(PreferenceKey::Credential)?;
        self.list().into_iter().find(|name| *name == saved)
    }

    pub fn save(&self, name: &str) -> Result<()> {
        self.write(PreferenceKey::Credential, name)
    }

    pub fn read(&self, key: PreferenceKey) -> Option<String> {
        let raw = fs::read_to_string(self.state_dir.join(key.file_name())).ok()?;
        let value = raw.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    pub fn write(&self, key: PreferenceKey, value: &str) -> Result<()> {
        fs::create_dir_all(&self.state_dir).with_context(|| {
            format!("failed to create state directory {}", self.state_dir.display())
        })?;
        let path = self.state_dir.join(key.file_name());
        fs::write(&path, value)
            .with_context(|| format!("failed to write preference {}", path.display()))?;
        debug!("saved {} = {value}", key.file_name());
        Ok(())
    }

    pub fn forget(&self, key: PreferenceKey) -> Result<()> {
        let path = self.state_dir.join(key.file_name());
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => {
                Err(error).with_context(|| format!("failed to remove {}", path.display()))
            }
        }
    }

    /// Applies one change: `Some` writes the value, `None` forgets it.
    pub fn persist(&self, key: PreferenceKey, value: Option<&str>) -> Result<()> {
        match (key, value) {
            (PreferenceKey::Credential, Some(name)) => self.save(name),
            (key, Some(value)) => self.write(key, value),
            (key, None) => self.forget(key),
        }
    }

    /// Forgets every remembered value. Logs and session scratch in the state directory stay.
    pub fn clear_all(&self) -> Result<()> {
        for key in PreferenceKey::ALL {
            self.forget(key)?;
        }
        fs::create_dir_all(&self.state_dir).with_context(|| {
            format!("failed to create state directory {}", self.state_dir.display())
        })
    }

    /// Reads every remembered value, filling in and writing back defaults.
    pub fn load_selection(&self, default_output_folder: &Path) -> PersistedSelection {
        let credentials = self.list();
        let credential = self.load_persisted();

        let profiler_args = match self.read(PreferenceKey::ProfilerArgs) {
            Some(args) => args,
            None => {
                self.write_default(PreferenceKey::ProfilerArgs, DEFAULT_PROFILER_ARGS);
                DEFAULT_PROFILER_ARGS.to_string()
            }
        };

        let format = match self
            .read(PreferenceKey::Format)
            .and_then(|raw| OutputFormat::from_label(&raw))
        {
            Some(format) => format,
            None => {
                let format = OutputFormat::default();
                self.write_default(PreferenceKey::Format, format.label());
                format
            }
        };

        let output_folder = self
            .read(PreferenceKey::OutputFolder)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_output_folder.to_path_buf());

        PersistedSelection {
            credentials,
            namespace: credential
                .as_ref()
                .and_then(|_| self.read(PreferenceKey::Namespace)),
            pod: credential
                .as_ref()
                .and_then(|_| self.read(PreferenceKey::Pod)),
            credential,
            profiler_args,
            output_folder,
            format,
        }
    }

    fn write_default(&self, key: PreferenceKey, value: &str) {
        if let Err(error) = self.write(key, value) {
            warn!("failed to store default {}: {error:#}", key.file_name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CredentialStore, DEFAULT_PROFILER_ARGS, PreferenceKey};
    use crate::model::OutputFormat;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn store(root: &Path) -> CredentialStore {
        let kube = root.join("kube");
        fs::create_dir_all(&kube).expect("kube dir");
        CredentialStore::new(kube, root.join("state"))
    }

    #[test]
    fn list_skips_directories_and_tolerates_missing_dir() {
        let dir = tempdir().expect("tempdir");
        let store = store(dir.path());
        fs::write(store.kube_dir().join("prod"), "apiVersion: v1").expect("write");
        fs::write(store.kube_dir().join("staging"), "apiVersion: v1").expect("write");
        fs::create_dir_all(store.kube_dir().join("cache")).expect("mkdir");

        let mut names = store.list();
        names.sort();
        assert_eq!(names, vec!["prod".to_string(), "staging".to_string()]);

        let missing = CredentialStore::new(dir.path().join("nope"), dir.path().join("state"));
        assert!(missing.list().is_empty());
    }

    #[test]
    fn save_creates_state_dir_and_load_round_trips() {
        let dir = tempdir().expect("tempdir");
        let store = store(dir.path());
        fs::write(store.kube_dir().join("prod"), "").expect("write");

        store.save("prod").expect("save");
        assert!(store.state_dir().join("kubeconfig.mem").exists());
        assert_eq!(store.load_persisted(), Some("prod".to_string()));
    }

    #[test]
    fn stale_credential_is_not_loaded() {
        let dir = tempdir().expect("tempdir");
        let store = store(dir.path());
        fs::write(store.kube_dir().join("prod"), "").expect("write");
        store.save("prod").expect("save");
        fs::remove_file(store.kube_dir().join("prod")).expect("remove");

        assert_eq!(store.load_persisted(), None);
        let selection = store.load_selection(Path::new("/desk"));
        assert_eq!(selection.credential, None);
        assert_eq!(selection.namespace, None);
    }

    #[test]
    fn load_selection_writes_back_defaults() {
        let dir = tempdir().expect("tempdir");
        let store = store(dir.path());

        let selection = store.load_selection(Path::new("/desk"));
        assert_eq!(selection.profiler_args, DEFAULT_PROFILER_ARGS);
        assert_eq!(selection.format, OutputFormat::Heatmap);
        assert_eq!(selection.output_folder, Path::new("/desk"));
        assert_eq!(
            store.read(PreferenceKey::Format).as_deref(),
            Some("heatmap")
        );
        assert_eq!(
            store.read(PreferenceKey::ProfilerArgs).as_deref(),
            Some(DEFAULT_PROFILER_ARGS)
        );
    }

    #[test]
    fn none_format_persists_as_parenthesized_label() {
        let dir = tempdir().expect("tempdir");
        let store = store(dir.path());
        store
            .persist(PreferenceKey::Format, Some(OutputFormat::None.label()))
            .expect("persist");

        let selection = store.load_selection(Path::new("/desk"));
        assert_eq!(selection.format, OutputFormat::None);
    }

    #[test]
    fn clear_all_wipes_values_but_keeps_directory() {
        let dir = tempdir().expect("tempdir");
        let store = store(dir.path());
        store
            .write(PreferenceKey::Namespace, "staging")
            .expect("write");

        store.clear_all().expect("clear");
        assert!(store.state_dir().is_dir());
        assert_eq!(store.read(PreferenceKey::Namespace), None);
    }

    #[test]
    fn clear_all_leaves_log_and_session_scratch() {
        let dir = tempdir().expect("tempdir");
        let store = store(dir.path());
        for key in PreferenceKey::ALL {
            store.write(key, "value").expect("write");
        }
        let log = store.state_dir().join("pfr.log");
        fs::write(&log, "started\n").expect("log");
        let session = store.state_dir().join("tmp").join("session-abc");
        fs::create_dir_all(&session).expect("session dir");
        fs::write(session.join("kubeconfig.yaml"), "apiVersion: v1").expect("session copy");

        store.clear_all().expect("clear");

        for key in PreferenceKey::ALL {
            assert_eq!(store.read(key), None, "{} survived", key.file_name());
        }
        assert_eq!(fs::read_to_string(&log).expect("log"), "started\n");
        assert!(session.join("kubeconfig.yaml").is_file());
    }

    #[test]
    fn clear_all_creates_missing_state_dir() {
        let dir = tempdir().expect("tempdir");
        let store = store(dir.path());
        assert!(!store.state_dir().exists());

        store.clear_all().expect("clear");
        assert!(store.state_dir().is_dir());
    }
}
