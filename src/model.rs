use chrono::{DateTime, Local};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const RAW_EXTENSION: &str = "jfr";
pub const NO_MATCHES_LABEL: &str = "(no matches)";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum OutputFormat {
    None,
    Html,
    Collapsed,
    Pprof,
    PbGz,
    #[default]
    Heatmap,
    Otlp,
}

impl OutputFormat {
    pub const ALL: [Self; 7] = [
        Self::None,
        Self::Html,
        Self::Collapsed,
        Self::Pprof,
        Self::PbGz,
        Self::Heatmap,
        Self::Otlp,
    ];

    /// Label shown in the picker and written to the preference file.
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "(none)",
            Self::Html => "html",
            Self::Collapsed => "collapsed",
            Self::Pprof => "pprof",
            Self::PbGz => "pb.gz",
            Self::Heatmap => "heatmap",
            Self::Otlp => "otlp",
        }
    }

    /// Value passed to the converter's `-o` flag.
    pub fn converter_flag(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            other => Some(other.label()),
        }
    }

    pub fn from_label(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "(none)" | "none" => Some(Self::None),
            "html" => Some(Self::Html),
            "collapsed" => Some(Self::Collapsed),
            "pprof" => Some(Self::Pprof),
            "pb.gz" | "pbgz" => Some(Self::PbGz),
            "heatmap" => Some(Self::Heatmap),
            "otlp" => Some(Self::Otlp),
            _ => None,
        }
    }

    /// Whether the converted artifact can be opened in a web browser.
    pub fn browser_openable(self) -> bool {
        matches!(self, Self::Html | Self::Heatmap)
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum PickerKind {
    Credential,
    Namespace,
    Pod,
    Format,
}

impl PickerKind {
    pub fn title(self) -> &'static str {
        match self {
            Self::Credential => "Kubeconfig",
            Self::Namespace => "Namespace",
            Self::Pod => "Pod",
            Self::Format => "Format",
        }
    }
}

/// Immutable snapshot of everything a recording needs.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RecordingRequest {
    pub credential: String,
    pub namespace: String,
    pub pod: String,
    pub profiler_args: String,
    pub output_folder: PathBuf,
    pub format: OutputFormat,
}

impl RecordingRequest {
    pub fn target_label(&self) -> String {
        format!("{}/{}", self.namespace, self.pod)
    }
}

/// `{namespace}__{pod}__{yyyyMMdd_HHmmss}`, shared by every artifact of one recording.
pub fn artifact_base_name(namespace: &str, pod: &str, at: DateTime<Local>) -> String {
    format!("{namespace}__{pod}__{}", at.format("%Y%m%d_%H%M%S"))
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RecordingStage {
    Preparing,
    CheckingProfiler,
    CopyingProfiler,
    ExtractingProfiler,
    RunningProfiler,
    CopyingResult,
    Converting,
    CleaningUp,
}

impl RecordingStage {
    pub fn label(self) -> &'static str {
        match self {
            Self::Preparing => "Preparing session...",
            Self::CheckingProfiler => "Checking profiler in pod...",
            Self::CopyingProfiler => "Copying profiler...",
            Self::ExtractingProfiler => "Extracting profiler...",
            Self::RunningProfiler => "Starting profiler...",
            Self::CopyingResult => "Copying result...",
            Self::Converting => "Converting JFR...",
            Self::CleaningUp => "Cleaning up...",
        }
    }
}

impl Display for RecordingStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RecordingReport {
    pub raw: PathBuf,
    pub converted: Option<PathBuf>,
    pub format: OutputFormat,
    pub output_folder: PathBuf,
    pub browser_path: Option<PathBuf>,
}

impl RecordingReport {
    pub fn status_line(&self) -> String {
        match self.converted {
            Some(_) => format!(
                "Saved JFR and {} files to {}",
                self.format,
                self.output_folder.display()
            ),
            None => format!("Saved JFR to {}", self.output_folder.display()),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RecordingFailure {
    pub stage: RecordingStage,
    pub message: String,
}

impl RecordingFailure {
    pub fn new(stage: RecordingStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl Display for RecordingFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RecordingFailure {}

/// Result of listing namespaces or pods.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ListOutcome {
    Listed(Vec<String>),
    EmptyButReachable,
    Unreachable(String),
}

impl ListOutcome {
    pub fn names(&self) -> &[String] {
        match self {
            Self::Listed(names) => names,
            Self::EmptyButReachable | Self::Unreachable(_) => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FailedAction {
    LoadNamespaces,
    LoadPods,
}

impl FailedAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadNamespaces => "loadNamespaces",
            Self::LoadPods => "loadPods",
        }
    }
}

/// Shortens long file names to `first5***last5.ext` for narrow labels.
pub fn shorten_file_name(path: &str) -> String {
    let file_name = Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    if file_name.chars().count() <= 13 {
        return file_name;
    }

    let (stem, ext) = match file_name.rfind('.') {
        Some(index) if index > 0 => (&file_name[..index], &file_name[index..]),
        _ => (file_name.as_str(), ""),
    };
    let chars = stem.chars().collect::<Vec<_>>();
    if chars.len() <= 10 {
        return file_name;
    }

    let head = chars[..5].iter().collect::<String>();
    let tail = chars[chars.len() - 5..].iter().collect::<String>();
    format!("{head}***{tail}{ext}")
}
