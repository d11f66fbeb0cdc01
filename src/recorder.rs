//! Remote recording workflow.
//!
//! One call to [`Recorder::record`] is one session: private kubeconfig copy, presence
//! check, optional profiler upload, profiler run, retrieval, optional conversion and
//! remote cleanup. Steps run strictly one after another and the first hard failure
//! ends the session.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::kubectl::{PodTarget, PodTransport, RecordingConverter};
use crate::model::{
    RAW_EXTENSION, RecordingFailure, RecordingReport, RecordingRequest, RecordingStage,
    artifact_base_name,
};

/// Where the profiler lives inside the pod. Derived from the archive name.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RemoteLayout {
    pub archive: String,
    pub extracted_dir: String,
    pub recording: String,
    pub tmp: String,
}

impl RemoteLayout {
    pub fn for_archive(archive_file_name: &str, remote_tmp: &str) -> Self {
        let tmp = remote_tmp.trim_end_matches('/').to_string();
        let stem = archive_file_name
            .strip_suffix(".tar.gz")
            .or_else(|| archive_file_name.strip_suffix(".tgz"))
            .unwrap_or(archive_file_name);
        Self {
            archive: format!("{tmp}/{archive_file_name}"),
            extracted_dir: format!("{tmp}/{stem}"),
            recording: format!("{tmp}/recording.{RAW_EXTENSION}"),
            tmp,
        }
    }

    pub fn presence_check(&self) -> String {
        format!("[ -d {} ]", self.extracted_dir)
    }

    pub fn extract(&self) -> String {
        format!("tar xzf {} -C {}", self.archive, self.tmp)
    }

    pub fn run_profiler(&self, profiler_args: &str) -> String {
        let args = profiler_args.trim();
        if args.is_empty() {
            format!("{}/bin/asprof -f {} 1", self.extracted_dir, self.recording)
        } else {
            format!(
                "{}/bin/asprof -f {} {args} 1",
                self.extracted_dir, self.recording
            )
        }
    }

    pub fn cleanup(&self) -> String {
        format!(
            "rm -rf {} {} {}",
            self.recording, self.archive, self.extracted_dir
        )
    }
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub kube_dir: PathBuf,
    pub session_root: PathBuf,
    pub profiler_archive: PathBuf,
    pub layout: RemoteLayout,
}

pub struct Recorder<T, C> {
    transport: T,
    converter: C,
    config: RecorderConfig,
}

/// Temporary state owned by one session. Dropping it removes the scratch directory.
struct Session {
    dir: TempDir,
    target: PodTarget,
}

impl<T: PodTransport, C: RecordingConverter> Recorder<T, C> {
    pub fn new(transport: T, converter: C, config: RecorderConfig) -> Self {
        Self {
            transport,
            converter,
            config,
        }
    }

    /// Runs the whole workflow, reporting each stage to `on_stage` before it starts.
    pub async fn record(
        &self,
        request: &RecordingRequest,
        mut on_stage: impl FnMut(RecordingStage) + Send,
    ) -> Result<RecordingReport, RecordingFailure> {
        info!(
            "recording {} with args '{}'",
            request.target_label(),
            request.profiler_args
        );

        on_stage(RecordingStage::Preparing);
        let session = self.open_session(request).map_err(|error| {
            RecordingFailure::new(
                RecordingStage::Preparing,
                format!("Error preparing kubeconfig: {error:#}"),
            )
        })?;
        let layout = &self.config.layout;

        on_stage(RecordingStage::CheckingProfiler);
        let present = match self
            .transport
            .exec(&session.target, &layout.presence_check())
            .await
        {
            Ok(()) => true,
            Err(error) => {
                debug!("profiler not present in pod: {error:#}");
                false
            }
        };

        if !present {
            on_stage(RecordingStage::CopyingProfiler);
            let archive = std::path::absolute(&self.config.profiler_archive)
                .unwrap_or_else(|_| self.config.profiler_archive.clone());
            self.transport
                .copy_to_pod(&session.target, &archive, &layout.archive)
                .await
                .map_err(|error| {
                    fail(RecordingStage::CopyingProfiler, "Error copying profiler", &error)
                })?;

            on_stage(RecordingStage::ExtractingProfiler);
            self.transport
                .exec(&session.target, &layout.extract())
                .await
                .map_err(|error| {
                    fail(
                        RecordingStage::ExtractingProfiler,
                        "Error extracting profiler",
                        &error,
                    )
                })?;
        }

        on_stage(RecordingStage::RunningProfiler);
        self.transport
            .exec(
                &session.target,
                &layout.run_profiler(&request.profiler_args),
            )
            .await
            .map_err(|error| {
                fail(RecordingStage::RunningProfiler, "Error running profiler", &error)
            })?;

        on_stage(RecordingStage::CopyingResult);
        let base_name = artifact_base_name(&request.namespace, &request.pod, Local::now());
        let raw = self.retrieve(&session, request, &base_name).await?;

        let mut converted = None;
        if let Some(format_flag) = request.format.converter_flag() {
            on_stage(RecordingStage::Converting);
            converted = Some(
                self.convert(&session, request, format_flag, &raw, &base_name)
                    .await?,
            );
        }

        on_stage(RecordingStage::CleaningUp);
        if let Err(error) = self
            .transport
            .exec(&session.target, &layout.cleanup())
            .await
        {
            warn!(
                "remote cleanup failed for {}: {error:#}",
                request.target_label()
            );
        }

        let browser_path = converted
            .clone()
            .filter(|_| request.format.browser_openable());
        let report = RecordingReport {
            raw,
            converted,
            format: request.format,
            output_folder: request.output_folder.clone(),
            browser_path,
        };
        info!("{}", report.status_line());
        Ok(report)
    }

    fn open_session(&self, request: &RecordingRequest) -> Result<Session> {
        let source = self.config.kube_dir.join(&request.credential);
        let content = fs::read(&source)
            .with_context(|| format!("failed to read kubeconfig {}", source.display()))?;

        fs::create_dir_all(&self.config.session_root).with_context(|| {
            format!(
                "failed to create session root {}",
                self.config.session_root.display()
            )
        })?;
        let session_root = std::path::absolute(&self.config.session_root)
            .context("failed to resolve session root")?;
        let dir = tempfile::Builder::new()
            .prefix("session-")
            .tempdir_in(&session_root)
            .context("failed to create session directory")?;

        let kubeconfig = dir.path().join("kubeconfig.yaml");
        fs::write(&kubeconfig, content)
            .with_context(|| format!("failed to write {}", kubeconfig.display()))?;

        Ok(Session {
            target: PodTarget {
                kubeconfig,
                namespace: request.namespace.clone(),
                pod: request.pod.clone(),
            },
            dir,
        })
    }

    async fn retrieve(
        &self,
        session: &Session,
        request: &RecordingRequest,
        base_name: &str,
    ) -> Result<PathBuf, RecordingFailure> {
        let file_name = format!("{base_name}.{RAW_EXTENSION}");
        let staged = session.dir.path().join(&file_name);
        self.transport
            .copy_from_pod(&session.target, &self.config.layout.recording, &staged)
            .await
            .map_err(|error| fail(RecordingStage::CopyingResult, "Error copying result", &error))?;

        fs::create_dir_all(&request.output_folder).map_err(|error| {
            RecordingFailure::new(
                RecordingStage::CopyingResult,
                format!(
                    "Error creating output folder {}: {error}",
                    request.output_folder.display()
                ),
            )
        })?;

        let raw = request.output_folder.join(&file_name);
        move_file(&staged, &raw)
            .map_err(|error| fail(RecordingStage::CopyingResult, "Error moving file", &error))?;
        debug!("raw recording saved to {}", raw.display());
        Ok(raw)
    }

    async fn convert(
        &self,
        session: &Session,
        request: &RecordingRequest,
        format_flag: &str,
        raw: &Path,
        base_name: &str,
    ) -> Result<PathBuf, RecordingFailure> {
        let work_dir = session.dir.path().join("convert");
        let working_copy = work_dir.join(format!("{base_name}.{RAW_EXTENSION}"));
        let kept = format!("raw recording kept at {}", raw.display());

        let prepared = fs::create_dir_all(&work_dir)
            .and_then(|()| fs::copy(raw, &working_copy).map(|_| ()));
        if let Err(error) = prepared {
            discard(&working_copy);
            return Err(RecordingFailure::new(
                RecordingStage::Converting,
                format!("Error preparing for conversion: {error} ({kept})"),
            ));
        }

        if let Err(error) = self.converter.convert(format_flag, &working_copy).await {
            discard(&working_copy);
            return Err(RecordingFailure::new(
                RecordingStage::Converting,
                format!("Error converting JFR: {error:#} ({kept})"),
            ));
        }

        let Some((produced, extension)) = find_converted(&work_dir, base_name) else {
            discard(&working_copy);
            return Err(RecordingFailure::new(
                RecordingStage::Converting,
                format!("Error: no converted file found (only JFR) ({kept})"),
            ));
        };

        let target = request.output_folder.join(format!("{base_name}{extension}"));
        if let Err(error) = move_file(&produced, &target) {
            discard(&working_copy);
            return Err(RecordingFailure::new(
                RecordingStage::Converting,
                format!("Error moving converted file: {error:#} ({kept})"),
            ));
        }

        discard(&working_copy);
        debug!("converted recording saved to {}", target.display());
        Ok(target)
    }
}

fn fail(stage: RecordingStage, prefix: &str, error: &anyhow::Error) -> RecordingFailure {
    RecordingFailure::new(stage, format!("{prefix}: {error:#}"))
}

/// First file in `dir` named `<base_name>.<ext>` whose extension is not the raw one.
/// Returns the path and the full suffix including the leading dot (e.g. `.pb.gz`).
fn find_converted(dir: &Path, base_name: &str) -> Option<(PathBuf, String)> {
    let raw_name = format!("{base_name}.{RAW_EXTENSION}");
    let prefix = format!("{base_name}.");
    let mut candidates = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|kind| kind.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == raw_name || !name.starts_with(&prefix) {
                return None;
            }
            let suffix = name[base_name.len()..].to_string();
            Some((entry.path(), suffix))
        })
        .collect::<Vec<_>>();
    candidates.sort();
    candidates.into_iter().next()
}

/// Rename, falling back to copy + remove across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)
        .with_context(|| format!("failed to copy {} to {}", from.display(), to.display()))?;
    fs::remove_file(from).with_context(|| format!("failed to remove {}", from.display()))?;
    Ok(())
}

fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => warn!("failed to remove {}: {error}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::{Recorder, RecorderConfig, RemoteLayout, find_converted};
    use crate::kubectl::{PodTarget, PodTransport, RecordingConverter};
    use crate::model::{OutputFormat, RecordingRequest, RecordingStage};
    use anyhow::Result;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use tempfile::{TempDir, tempdir};

    #[derive(Clone, Default)]
    struct FakeTransport {
        log: Arc<Mutex<Vec<String>>>,
        profiler_present: bool,
        fail_on: Option<&'static str>,
        kubeconfigs: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl FakeTransport {
        fn record(&self, target: &PodTarget, step: &str) -> Result<()> {
            self.log.lock().expect("log").push(step.to_string());
            self.kubeconfigs
                .lock()
                .expect("kubeconfigs")
                .push(target.kubeconfig.clone());
            if self.fail_on == Some(step) {
                anyhow::bail!("{step} blew up");
            }
            Ok(())
        }

        fn steps(&self) -> Vec<String> {
            self.log.lock().expect("log").clone()
        }
    }

    fn step_for_script(script: &str) -> &'static str {
        if script.starts_with("[ -d") {
            "check"
        } else if script.starts_with("tar ") {
            "extract"
        } else if script.starts_with("rm -rf") {
            "cleanup"
        } else {
            "run"
        }
    }

    impl PodTransport for FakeTransport {
        async fn exec(&self, target: &PodTarget, script: &str) -> Result<()> {
            let step = step_for_script(script);
            if step == "check" {
                self.record(target, step)?;
                if self.profiler_present {
                    return Ok(());
                }
                anyhow::bail!("command terminated with exit code 1");
            }
            self.record(target, step)
        }

        async fn copy_to_pod(&self, target: &PodTarget, _local: &Path, _remote: &str) -> Result<()> {
            self.record(target, "copy")
        }

        async fn copy_from_pod(
            &self,
            target: &PodTarget,
            _remote: &str,
            local: &Path,
        ) -> Result<()> {
            self.record(target, "retrieve")?;
            fs::write(local, b"JFR-bytes")?;
            Ok(())
        }
    }

    #[derive(Clone)]
    struct FakeConverter {
        produce: Option<&'static str>,
        fail: bool,
    }

    impl RecordingConverter for FakeConverter {
        async fn convert(&self, _format_flag: &str, input: &Path) -> Result<()> {
            if self.fail {
                anyhow::bail!("java: Unsupported class file major version");
            }
            if let Some(extension) = self.produce {
                fs::write(input.with_extension(extension), b"converted")?;
            }
            Ok(())
        }
    }

    struct Fixture {
        root: TempDir,
        config: RecorderConfig,
    }

    fn fixture() -> Fixture {
        let root = tempdir().expect("tempdir");
        let kube_dir = root.path().join("kube");
        fs::create_dir_all(&kube_dir).expect("kube dir");
        fs::write(kube_dir.join("prod"), "apiVersion: v1\nkind: Config\n").expect("kubeconfig");
        let archive = root.path().join("async-profiler-4.1-linux-x64.tar.gz");
        fs::write(&archive, b"tarball").expect("archive");
        let config = RecorderConfig {
            kube_dir,
            session_root: root.path().join("state/tmp"),
            profiler_archive: archive,
            layout: RemoteLayout::for_archive("async-profiler-4.1-linux-x64.tar.gz", "/tmp"),
        };
        Fixture { root, config }
    }

    fn request(root: &Path, format: OutputFormat) -> RecordingRequest {
        RecordingRequest {
            credential: "prod".to_string(),
            namespace: "default".to_string(),
            pod: "api-7f".to_string(),
            profiler_args: "-e cpu -d 30".to_string(),
            output_folder: root.join("out"),
            format,
        }
    }

    fn output_files(folder: &Path) -> Vec<String> {
        let mut names = fs::read_dir(folder)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.file_name().to_string_lossy().to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    fn session_dirs(root: &Path) -> usize {
        fs::read_dir(root.join("state/tmp"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[test]
    fn layout_is_derived_from_archive_name() {
        let layout = RemoteLayout::for_archive("async-profiler-4.1-linux-x64.tar.gz", "/tmp/");
        assert_eq!(layout.archive, "/tmp/async-profiler-4.1-linux-x64.tar.gz");
        assert_eq!(layout.extracted_dir, "/tmp/async-profiler-4.1-linux-x64");
        assert_eq!(layout.recording, "/tmp/recording.jfr");
        assert_eq!(
            layout.run_profiler("-e cpu -d 30"),
            "/tmp/async-profiler-4.1-linux-x64/bin/asprof -f /tmp/recording.jfr -e cpu -d 30 1"
        );
        assert_eq!(
            layout.cleanup(),
            "rm -rf /tmp/recording.jfr /tmp/async-profiler-4.1-linux-x64.tar.gz /tmp/async-profiler-4.1-linux-x64"
        );
    }

    #[tokio::test]
    async fn missing_profiler_is_uploaded_and_raw_recording_saved() {
        let fx = fixture();
        let transport = FakeTransport::default();
        let converter = FakeConverter {
            produce: None,
            fail: false,
        };
        let recorder = Recorder::new(transport.clone(), converter, fx.config.clone());
        let req = request(fx.root.path(), OutputFormat::None);
        let mut stages = Vec::new();

        let report = recorder
            .record(&req, |stage| stages.push(stage))
            .await
            .expect("recording succeeds");

        assert_eq!(
            transport.steps(),
            vec!["check", "copy", "extract", "run", "retrieve", "cleanup"]
        );
        assert_eq!(
            stages,
            vec![
                RecordingStage::Preparing,
                RecordingStage::CheckingProfiler,
                RecordingStage::CopyingProfiler,
                RecordingStage::ExtractingProfiler,
                RecordingStage::RunningProfiler,
                RecordingStage::CopyingResult,
                RecordingStage::CleaningUp,
            ]
        );
        let files = output_files(&req.output_folder);
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("default__api-7f__"));
        assert!(files[0].ends_with(".jfr"));
        assert_eq!(report.converted, None);
        assert_eq!(report.browser_path, None);
        assert_eq!(
            report.status_line(),
            format!("Saved JFR to {}", req.output_folder.display())
        );
        assert_eq!(session_dirs(fx.root.path()), 0);
    }

    #[tokio::test]
    async fn present_profiler_skips_upload() {
        let fx = fixture();
        let transport = FakeTransport {
            profiler_present: true,
            ..FakeTransport::default()
        };
        let converter = FakeConverter {
            produce: None,
            fail: false,
        };
        let recorder = Recorder::new(transport.clone(), converter, fx.config.clone());

        recorder
            .record(&request(fx.root.path(), OutputFormat::None), |_| {})
            .await
            .expect("recording succeeds");

        assert_eq!(transport.steps(), vec!["check", "run", "retrieve", "cleanup"]);
    }

    #[tokio::test]
    async fn every_remote_call_uses_the_private_kubeconfig_copy() {
        let fx = fixture();
        let transport = FakeTransport::default();
        let converter = FakeConverter {
            produce: None,
            fail: false,
        };
        let recorder = Recorder::new(transport.clone(), converter, fx.config.clone());

        recorder
            .record(&request(fx.root.path(), OutputFormat::None), |_| {})
            .await
            .expect("recording succeeds");

        let used = transport.kubeconfigs.lock().expect("kubeconfigs").clone();
        assert!(!used.is_empty());
        let first = used[0].clone();
        assert!(used.iter().all(|path| *path == first));
        assert_ne!(first, fx.config.kube_dir.join("prod"));
        assert!(first.starts_with(fx.root.path().join("state/tmp")));
        assert!(!first.exists());
    }

    #[tokio::test]
    async fn html_conversion_produces_two_artifacts_and_enables_browser() {
        let fx = fixture();
        let transport = FakeTransport::default();
        let converter = FakeConverter {
            produce: Some("html"),
            fail: false,
        };
        let recorder = Recorder::new(transport.clone(), converter, fx.config.clone());
        let req = request(fx.root.path(), OutputFormat::Html);

        let report = recorder.record(&req, |_| {}).await.expect("recording succeeds");

        let files = output_files(&req.output_folder);
        assert_eq!(files.len(), 2);
        let stem = |name: &str| name.split('.').next().unwrap_or_default().to_string();
        assert_eq!(stem(&files[0]), stem(&files[1]));
        assert!(files.iter().any(|name| name.ends_with(".html")));
        assert!(files.iter().any(|name| name.ends_with(".jfr")));
        assert_eq!(report.browser_path, report.converted);
        assert!(report.browser_path.is_some());
        assert_eq!(
            report.status_line(),
            format!("Saved JFR and html files to {}", req.output_folder.display())
        );
        assert_eq!(transport.steps().last().map(String::as_str), Some("cleanup"));
    }

    #[tokio::test]
    async fn pprof_conversion_is_not_browser_openable() {
        let fx = fixture();
        let converter = FakeConverter {
            produce: Some("pb.gz"),
            fail: false,
        };
        let recorder = Recorder::new(FakeTransport::default(), converter, fx.config.clone());
        let req = request(fx.root.path(), OutputFormat::PbGz);

        let report = recorder.record(&req, |_| {}).await.expect("recording succeeds");

        let converted = report.converted.expect("converted artifact");
        assert!(converted.to_string_lossy().ends_with(".pb.gz"));
        assert_eq!(report.browser_path, None);
    }

    #[tokio::test]
    async fn converter_without_output_fails_and_keeps_raw() {
        let fx = fixture();
        let transport = FakeTransport::default();
        let converter = FakeConverter {
            produce: None,
            fail: false,
        };
        let recorder = Recorder::new(transport.clone(), converter, fx.config.clone());
        let req = request(fx.root.path(), OutputFormat::Html);

        let failure = recorder
            .record(&req, |_| {})
            .await
            .expect_err("conversion must fail");

        assert_eq!(failure.stage, RecordingStage::Converting);
        assert!(failure.message.contains("no converted file found"));
        let files = output_files(&req.output_folder);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with(".jfr"));
        assert!(!transport.steps().contains(&"cleanup".to_string()));
        assert_eq!(session_dirs(fx.root.path()), 0);
    }

    #[tokio::test]
    async fn converter_error_carries_diagnostics() {
        let fx = fixture();
        let converter = FakeConverter {
            produce: None,
            fail: true,
        };
        let recorder = Recorder::new(FakeTransport::default(), converter, fx.config.clone());

        let failure = recorder
            .record(&request(fx.root.path(), OutputFormat::Heatmap), |_| {})
            .await
            .expect_err("conversion must fail");

        assert!(failure.message.starts_with("Error converting JFR"));
        assert!(failure.message.contains("Unsupported class file"));
    }

    #[tokio::test]
    async fn failed_upload_aborts_remaining_steps() {
        let fx = fixture();
        let transport = FakeTransport {
            fail_on: Some("copy"),
            ..FakeTransport::default()
        };
        let converter = FakeConverter {
            produce: Some("html"),
            fail: false,
        };
        let recorder = Recorder::new(transport.clone(), converter, fx.config.clone());
        let req = request(fx.root.path(), OutputFormat::Html);

        let failure = recorder
            .record(&req, |_| {})
            .await
            .expect_err("upload must fail");

        assert_eq!(failure.stage, RecordingStage::CopyingProfiler);
        assert!(failure.message.starts_with("Error copying profiler"));
        assert_eq!(transport.steps(), vec!["check", "copy"]);
        assert!(output_files(&req.output_folder).is_empty());
        assert_eq!(session_dirs(fx.root.path()), 0);
    }

    #[tokio::test]
    async fn failed_run_stops_before_retrieval() {
        let fx = fixture();
        let transport = FakeTransport {
            profiler_present: true,
            fail_on: Some("run"),
            ..FakeTransport::default()
        };
        let converter = FakeConverter {
            produce: None,
            fail: false,
        };
        let recorder = Recorder::new(transport.clone(), converter, fx.config.clone());

        let failure = recorder
            .record(&request(fx.root.path(), OutputFormat::None), |_| {})
            .await
            .expect_err("run must fail");

        assert_eq!(failure.stage, RecordingStage::RunningProfiler);
        assert_eq!(transport.steps(), vec!["check", "run"]);
    }

    #[tokio::test]
    async fn cleanup_failure_does_not_override_success() {
        let fx = fixture();
        let transport = FakeTransport {
            profiler_present: true,
            fail_on: Some("cleanup"),
            ..FakeTransport::default()
        };
        let converter = FakeConverter {
            produce: None,
            fail: false,
        };
        let recorder = Recorder::new(transport.clone(), converter, fx.config.clone());

        let result = recorder
            .record(&request(fx.root.path(), OutputFormat::None), |_| {})
            .await;

        assert!(result.is_ok());
        assert_eq!(transport.steps().last().map(String::as_str), Some("cleanup"));
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_remote_call() {
        let fx = fixture();
        let transport = FakeTransport::default();
        let converter = FakeConverter {
            produce: None,
            fail: false,
        };
        let recorder = Recorder::new(transport.clone(), converter, fx.config.clone());
        let mut req = request(fx.root.path(), OutputFormat::None);
        req.credential = "gone".to_string();

        let failure = recorder
            .record(&req, |_| {})
            .await
            .expect_err("credential must be missing");

        assert_eq!(failure.stage, RecordingStage::Preparing);
        assert!(transport.steps().is_empty());
    }

    #[test]
    fn find_converted_ignores_raw_and_unrelated_files() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("ns__pod__1.jfr"), "").expect("write");
        fs::write(dir.path().join("other.html"), "").expect("write");
        assert_eq!(find_converted(dir.path(), "ns__pod__1"), None);

        fs::write(dir.path().join("ns__pod__1.collapsed"), "").expect("write");
        let (path, suffix) = find_converted(dir.path(), "ns__pod__1").expect("found");
        assert_eq!(suffix, ".collapsed");
        assert_eq!(path, dir.path().join("ns__pod__1.collapsed"));
    }
}
