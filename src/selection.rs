use std::path::{Path, PathBuf};

use crate::model::{
    NO_MATCHES_LABEL, OutputFormat, PickerKind, RecordingFailure, RecordingReport,
    RecordingRequest, RecordingStage,
};
use crate::store::{DEFAULT_PROFILER_ARGS, PersistedSelection, PreferenceKey};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PickerEntry {
    Value(String),
    /// Shown alone when the filter matches nothing. Choosing it clears the selection.
    NoMatches,
}

impl PickerEntry {
    pub fn label(&self) -> &str {
        match self {
            Self::Value(value) => value,
            Self::NoMatches => NO_MATCHES_LABEL,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Picker {
    candidates: Vec<String>,
    filter: String,
    cursor: usize,
}

impl Picker {
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_candidates(&mut self, candidates: Vec<String>) {
        self.candidates = candidates;
        self.clamp_cursor();
    }

    pub fn visible(&self) -> Vec<PickerEntry> {
        let query = self.filter.trim().to_lowercase();
        if query.is_empty() {
            return self
                .candidates
                .iter()
                .cloned()
                .map(PickerEntry::Value)
                .collect();
        }

        let matches = self
            .candidates
            .iter()
            .filter(|candidate| candidate.to_lowercase().contains(&query))
            .cloned()
            .map(PickerEntry::Value)
            .collect::<Vec<_>>();
        if matches.is_empty() {
            vec![PickerEntry::NoMatches]
        } else {
            matches
        }
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
        self.cursor = 0;
    }

    pub fn push_filter(&mut self, c: char) {
        self.filter.push(c);
        self.cursor = 0;
    }

    pub fn pop_filter(&mut self) {
        self.filter.pop();
        self.cursor = 0;
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let len = self.visible().len();
        if len == 0 {
            self.cursor = 0;
            return;
        }
        let max = len.saturating_sub(1) as isize;
        self.cursor = (self.cursor as isize + delta).clamp(0, max) as usize;
    }

    pub fn highlighted(&self) -> Option<PickerEntry> {
        self.visible().into_iter().nth(self.cursor)
    }

    fn reset(&mut self) {
        self.candidates.clear();
        self.filter.clear();
        self.cursor = 0;
    }

    fn clamp_cursor(&mut self) {
        self.cursor = self.cursor.min(self.visible().len().saturating_sub(1));
    }
}

/// Outcome of the most recent recording for the current pod.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub enum RecordingStatus {
    #[default]
    Idle,
    Running(RecordingStage),
    Succeeded(RecordingReport),
    Failed(RecordingFailure),
}

impl RecordingStatus {
    pub fn line(&self) -> Option<String> {
        match self {
            Self::Idle => None,
            Self::Running(stage) => Some(stage.label().to_string()),
            Self::Succeeded(report) => Some(report.status_line()),
            Self::Failed(failure) => Some(failure.message.clone()),
        }
    }
}

/// The user's current choices. Changing a higher-level field clears everything below it.
#[derive(Debug, Clone)]
pub struct Selection {
    credential: Option<String>,
    namespace: Option<String>,
    pod: Option<String>,
    profiler_args: String,
    output_folder: PathBuf,
    format: OutputFormat,
    recording: RecordingStatus,
    open: Option<PickerKind>,
    credentials: Picker,
    namespaces: Picker,
    pods: Picker,
    formats: Picker,
}

impl Selection {
    pub fn new(default_output_folder: impl Into<PathBuf>) -> Self {
        let mut formats = Picker::default();
        formats.set_candidates(
            OutputFormat::ALL
                .iter()
                .map(|format| format.label().to_string())
                .collect(),
        );
        Self {
            credential: None,
            namespace: None,
            pod: None,
            profiler_args: DEFAULT_PROFILER_ARGS.to_string(),
            output_folder: default_output_folder.into(),
            format: OutputFormat::default(),
            recording: RecordingStatus::Idle,
            open: None,
            credentials: Picker::default(),
            namespaces: Picker::default(),
            pods: Picker::default(),
            formats,
        }
    }

    pub fn from_persisted(persisted: PersistedSelection) -> Self {
        let mut selection = Self::new(persisted.output_folder);
        selection.credentials.set_candidates(persisted.credentials);
        selection.credential = persisted.credential;
        selection.namespace = persisted.namespace;
        selection.pod = persisted.pod;
        selection.profiler_args = persisted.profiler_args;
        selection.format = persisted.format;
        selection
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn pod(&self) -> Option<&str> {
        self.pod.as_deref()
    }

    pub fn profiler_args(&self) -> &str {
        &self.profiler_args
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn recording(&self) -> &RecordingStatus {
        &self.recording
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.recording, RecordingStatus::Running(_))
    }

    pub fn selected(&self, kind: PickerKind) -> Option<String> {
        match kind {
            PickerKind::Credential => self.credential.clone(),
            PickerKind::Namespace => self.namespace.clone(),
            PickerKind::Pod => self.pod.clone(),
            PickerKind::Format => Some(self.format.label().to_string()),
        }
    }

    pub fn set_credential(&mut self, credential: Option<String>) -> bool {
        if self.credential == credential {
            return false;
        }
        self.credential = credential;
        self.namespace = None;
        self.pod = None;
        self.namespaces.reset();
        self.pods.reset();
        self.clear_result();
        true
    }

    pub fn set_namespace(&mut self, namespace: Option<String>) -> bool {
        if self.namespace == namespace {
            return false;
        }
        self.namespace = namespace;
        self.pod = None;
        self.pods.reset();
        self.clear_result();
        true
    }

    pub fn set_pod(&mut self, pod: Option<String>) -> bool {
        if self.pod == pod {
            return false;
        }
        self.pod = pod;
        self.clear_result();
        true
    }

    /// Drops the previous outcome. A session still in flight keeps its status.
    fn clear_result(&mut self) {
        if !self.is_recording() {
            self.recording = RecordingStatus::Idle;
        }
    }

    pub fn set_format(&mut self, format: OutputFormat) -> bool {
        if self.format == format {
            return false;
        }
        self.format = format;
        true
    }

    pub fn set_profiler_args(&mut self, args: impl Into<String>) -> bool {
        let args = args.into().trim().to_string();
        if self.profiler_args == args {
            return false;
        }
        self.profiler_args = args;
        true
    }

    pub fn set_output_folder(&mut self, folder: impl Into<PathBuf>) -> bool {
        let folder = folder.into();
        if self.output_folder == folder {
            return false;
        }
        self.output_folder = folder;
        true
    }

    /// Installs a fresh candidate list and drops the current value if it vanished.
    pub fn apply_candidates(&mut self, kind: PickerKind, names: Vec<String>) {
        let retained = self
            .selected(kind)
            .filter(|current| names.contains(current));
        self.picker_mut(kind).set_candidates(names);
        match kind {
            PickerKind::Credential => {
                self.set_credential(retained);
            }
            PickerKind::Namespace => {
                self.set_namespace(retained);
            }
            PickerKind::Pod => {
                self.set_pod(retained);
            }
            PickerKind::Format => {}
        }
    }

    pub fn picker(&self, kind: PickerKind) -> &Picker {
        match kind {
            PickerKind::Credential => &self.credentials,
            PickerKind::Namespace => &self.namespaces,
            PickerKind::Pod => &self.pods,
            PickerKind::Format => &self.formats,
        }
    }

    pub fn picker_mut(&mut self, kind: PickerKind) -> &mut Picker {
        match kind {
            PickerKind::Credential => &mut self.credentials,
            PickerKind::Namespace => &mut self.namespaces,
            PickerKind::Pod => &mut self.pods,
            PickerKind::Format => &mut self.formats,
        }
    }

    pub fn open_picker(&self) -> Option<PickerKind> {
        self.open
    }

    /// Opening one picker implicitly closes whichever was open before.
    pub fn open(&mut self, kind: PickerKind) {
        self.open = Some(kind);
        let current = self.selected(kind);
        let picker = self.picker_mut(kind);
        picker.set_filter("");
        if let Some(current) = current
            && let Some(index) = picker
                .visible()
                .iter()
                .position(|entry| entry.label() == current)
        {
            picker.cursor = index;
        }
    }

    pub fn close(&mut self) {
        self.open = None;
    }

    pub fn toggle(&mut self, kind: PickerKind) {
        if self.open == Some(kind) {
            self.close();
        } else {
            self.open(kind);
        }
    }

    /// Applies a picker entry and closes the picker. Returns whether the value changed.
    pub fn choose(&mut self, kind: PickerKind, entry: PickerEntry) -> bool {
        self.close();
        let value = match entry {
            PickerEntry::Value(value) => Some(value),
            PickerEntry::NoMatches => None,
        };
        match kind {
            PickerKind::Credential => self.set_credential(value),
            PickerKind::Namespace => self.set_namespace(value),
            PickerKind::Pod => self.set_pod(value),
            PickerKind::Format => self.set_format(
                value
                    .as_deref()
                    .and_then(OutputFormat::from_label)
                    .unwrap_or(OutputFormat::None),
            ),
        }
    }

    /// Frozen copy of the current choices, if everything a recording needs is set.
    pub fn request(&self) -> Option<RecordingRequest> {
        let credential = self.credential.clone().filter(|value| !value.is_empty())?;
        let namespace = self.namespace.clone().filter(|value| !value.is_empty())?;
        let pod = self.pod.clone().filter(|value| !value.is_empty())?;
        if self.output_folder.as_os_str().is_empty() {
            return None;
        }
        Some(RecordingRequest {
            credential,
            namespace,
            pod,
            profiler_args: self.profiler_args.clone(),
            output_folder: self.output_folder.clone(),
            format: self.format,
        })
    }

    pub fn begin_recording(&mut self) {
        self.close();
        self.recording = RecordingStatus::Running(RecordingStage::Preparing);
    }

    pub fn set_recording_stage(&mut self, stage: RecordingStage) {
        if self.is_recording() {
            self.recording = RecordingStatus::Running(stage);
        }
    }

    pub fn finish_recording(&mut self, outcome: Result<RecordingReport, RecordingFailure>) {
        self.recording = match outcome {
            Ok(report) => RecordingStatus::Succeeded(report),
            Err(failure) => RecordingStatus::Failed(failure),
        };
    }

    /// The browser-openable artifact of the last successful recording.
    pub fn browser_target(&self) -> Option<&Path> {
        match &self.recording {
            RecordingStatus::Succeeded(report) => report.browser_path.as_deref(),
            _ => None,
        }
    }

    /// Folder holding the last successful recording.
    pub fn completed_folder(&self) -> Option<&Path> {
        match &self.recording {
            RecordingStatus::Succeeded(report) => Some(report.output_folder.as_path()),
            _ => None,
        }
    }

    /// Values as written to the preference files.
    pub fn persisted_values(&self) -> Vec<(PreferenceKey, Option<String>)> {
        vec![
            (PreferenceKey::Credential, self.credential.clone()),
            (PreferenceKey::Namespace, self.namespace.clone()),
            (PreferenceKey::Pod, self.pod.clone()),
            (
                PreferenceKey::ProfilerArgs,
                Some(self.profiler_args.clone()).filter(|args| !args.is_empty()),
            ),
            (
                PreferenceKey::OutputFolder,
                Some(self.output_folder.display().to_string()),
            ),
            (PreferenceKey::Format, Some(self.format.label().to_string())),
        ]
    }
}
