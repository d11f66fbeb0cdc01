use crate::bootstrap::{BootstrapReport, BootstrapStage, FatalSetup};
use crate::input::Action;
use crate::model::{
    FailedAction, ListOutcome, PickerKind, RecordingFailure, RecordingReport, RecordingRequest,
    RecordingStage,
};
use crate::selection::{RecordingStatus, Selection};
use crate::store::{PersistedSelection, PreferenceKey};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Picker,
    EditArgs,
    EditFolder,
    /// Any non-ready mode; only quit, retry and reset are meaningful.
    Blocked,
}

/// Exactly one top-level mode is active at a time.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum AppMode {
    Initializing { message: String },
    Clearing,
    Error { message: String },
    NetworkError { failed: FailedAction, detail: String },
    Ready,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FormField {
    Credential,
    Namespace,
    Pod,
    ProfilerArgs,
    OutputFolder,
    Format,
    Record,
}

impl FormField {
    pub const ALL: [Self; 7] = [
        Self::Credential,
        Self::Namespace,
        Self::Pod,
        Self::ProfilerArgs,
        Self::OutputFolder,
        Self::Format,
        Self::Record,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Credential => "Kubeconfig",
            Self::Namespace => "Namespace",
            Self::Pod => "Pod",
            Self::ProfilerArgs => "asprof args",
            Self::OutputFolder => "JFR folder",
            Self::Format => "Convert to",
            Self::Record => "Record",
        }
    }

    fn picker(self) -> Option<PickerKind> {
        match self {
            Self::Credential => Some(PickerKind::Credential),
            Self::Namespace => Some(PickerKind::Namespace),
            Self::Pod => Some(PickerKind::Pod),
            Self::Format => Some(PickerKind::Format),
            Self::ProfilerArgs | Self::OutputFolder | Self::Record => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    None,
    LoadNamespaces {
        credential: String,
    },
    LoadPods {
        credential: String,
        namespace: String,
    },
    StartRecording(RecordingRequest),
    PickFolder,
    OpenFolder(PathBuf),
    OpenInBrowser(PathBuf),
    OpenHomepage,
    Reset,
}

/// Completion messages from background tasks; each one doubles as the redraw signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundEvent {
    Bootstrap(BootstrapStage),
    BootstrapFinished(Result<BootstrapReport, FatalSetup>),
    NamespacesLoaded {
        credential: String,
        outcome: ListOutcome,
    },
    PodsLoaded {
        credential: String,
        namespace: String,
        outcome: ListOutcome,
    },
    RecordingStage(RecordingStage),
    RecordingFinished(Result<RecordingReport, RecordingFailure>),
    FolderPicked(Option<PathBuf>),
    ResetFinished(PersistedSelection),
}

pub struct App {
    running: bool,
    mode: AppMode,
    input_mode: InputMode,
    focus: FormField,
    selection: Selection,
    input: String,
    status: String,
    loading_namespaces: bool,
    loading_pods: bool,
    choosing_folder: bool,
    profiler_archive: Option<PathBuf>,
    profiler_version: Option<String>,
    pending_writes: Vec<(PreferenceKey, Option<String>)>,
}

impl App {
    pub fn new(default_output_folder: impl Into<PathBuf>) -> Self {
        Self {
            running: true,
            mode: AppMode::Initializing {
                message: "Starting...".to_string(),
            },
            input_mode: InputMode::Blocked,
            focus: FormField::Credential,
            selection: Selection::new(default_output_folder),
            input: String::new(),
            status: String::new(),
            loading_namespaces: false,
            loading_pods: false,
            choosing_folder: false,
            profiler_archive: None,
            profiler_version: None,
            pending_writes: Vec::new(),
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> &AppMode {
        &self.mode
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn focus(&self) -> FormField {
        self.focus
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn loading(&self, kind: PickerKind) -> bool {
        match kind {
            PickerKind::Namespace => self.loading_namespaces,
            PickerKind::Pod => self.loading_pods,
            PickerKind::Credential | PickerKind::Format => false,
        }
    }

    pub fn choosing_folder(&self) -> bool {
        self.choosing_folder
    }

    pub fn profiler_archive(&self) -> Option<&Path> {
        self.profiler_archive.as_deref()
    }

    pub fn profiler_version(&self) -> Option<&str> {
        self.profiler_version.as_deref()
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Preference changes accumulated since the last call, oldest first.
    pub fn take_pending_writes(&mut self) -> Vec<(PreferenceKey, Option<String>)> {
        std::mem::take(&mut self.pending_writes)
    }

    /// Whether new work may be started from the form.
    fn interaction_blocked(&self) -> bool {
        self.selection.is_recording() || self.choosing_folder
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        if matches!(action, Action::Quit) {
            self.running = false;
            self.status = "Exit requested".to_string();
            return AppCommand::None;
        }

        match self.mode.clone() {
            AppMode::Initializing { .. } | AppMode::Clearing | AppMode::Error { .. } => {
                AppCommand::None
            }
            AppMode::NetworkError { failed, .. } => self.apply_network_error_action(failed, action),
            AppMode::Ready => {
                if self.interaction_blocked() {
                    return AppCommand::None;
                }
                match self.input_mode {
                    InputMode::Picker => self.apply_picker_action(action),
                    InputMode::EditArgs | InputMode::EditFolder => self.apply_edit_action(action),
                    InputMode::Normal | InputMode::Blocked => self.apply_form_action(action),
                }
            }
        }
    }

    fn apply_network_error_action(&mut self, failed: FailedAction, action: Action) -> AppCommand {
        match action {
            Action::Retry => {
                self.enter_ready();
                info!("retrying {}", failed.as_str());
                match failed {
                    FailedAction::LoadNamespaces => self.load_namespaces_command(),
                    FailedAction::LoadPods => self.load_pods_command(),
                }
            }
            Action::Reset => {
                self.mode = AppMode::Clearing;
                self.input_mode = InputMode::Blocked;
                self.pending_writes.clear();
                AppCommand::Reset
            }
            _ => AppCommand::None,
        }
    }

    fn apply_form_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::Down => {
                self.move_focus(1);
                AppCommand::None
            }
            Action::Up => {
                self.move_focus(-1);
                AppCommand::None
            }
            Action::Activate => self.activate_focused(),
            Action::Record => self.start_recording(),
            Action::PickFolder => {
                self.choosing_folder = true;
                self.status = "Choosing folder...".to_string();
                AppCommand::PickFolder
            }
            Action::EditFolder => {
                self.focus = FormField::OutputFolder;
                self.begin_edit(InputMode::EditFolder);
                AppCommand::None
            }
            Action::OpenFolder => match self.selection.completed_folder() {
                Some(folder) => AppCommand::OpenFolder(folder.to_path_buf()),
                None => {
                    self.status = "Nothing recorded yet".to_string();
                    AppCommand::None
                }
            },
            Action::OpenInBrowser => match self.selection.browser_target() {
                Some(path) => AppCommand::OpenInBrowser(path.to_path_buf()),
                None => {
                    self.status = "No browser-viewable result".to_string();
                    AppCommand::None
                }
            },
            Action::OpenHomepage => AppCommand::OpenHomepage,
            _ => AppCommand::None,
        }
    }

    fn apply_picker_action(&mut self, action: Action) -> AppCommand {
        let Some(kind) = self.selection.open_picker() else {
            self.input_mode = InputMode::Normal;
            return AppCommand::None;
        };

        match action {
            Action::Down => self.selection.picker_mut(kind).move_cursor(1),
            Action::Up => self.selection.picker_mut(kind).move_cursor(-1),
            Action::InputChar(c) => self.selection.picker_mut(kind).push_filter(c),
            Action::Backspace => self.selection.picker_mut(kind).pop_filter(),
            Action::Cancel => {
                self.selection.close();
                self.input_mode = InputMode::Normal;
            }
            Action::Activate => {
                self.input_mode = InputMode::Normal;
                let Some(entry) = self.selection.picker(kind).highlighted() else {
                    self.selection.close();
                    return AppCommand::None;
                };
                let changed = self.tracked(|selection| selection.choose(kind, entry));
                if changed {
                    return self.after_choice(kind);
                }
            }
            _ => {}
        }
        AppCommand::None
    }

    fn apply_edit_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::InputChar(c) => self.input.push(c),
            Action::Backspace => {
                self.input.pop();
            }
            Action::Cancel => {
                self.input.clear();
                self.input_mode = InputMode::Normal;
            }
            Action::Activate => {
                let value = std::mem::take(&mut self.input);
                let mode = self.input_mode;
                self.input_mode = InputMode::Normal;
                match mode {
                    InputMode::EditArgs => {
                        self.tracked(|selection| selection.set_profiler_args(value));
                    }
                    InputMode::EditFolder => {
                        let folder = value.trim();
                        if folder.is_empty() {
                            self.status = "Folder cannot be empty".to_string();
                        } else {
                            let folder = PathBuf::from(folder);
                            self.tracked(|selection| selection.set_output_folder(folder));
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        AppCommand::None
    }

    fn activate_focused(&mut self) -> AppCommand {
        if let Some(kind) = self.focus.picker() {
            self.open_picker(kind);
            return AppCommand::None;
        }
        match self.focus {
            FormField::ProfilerArgs => self.begin_edit(InputMode::EditArgs),
            FormField::OutputFolder => self.begin_edit(InputMode::EditFolder),
            FormField::Record => return self.start_recording(),
            _ => {}
        }
        AppCommand::None
    }

    fn open_picker(&mut self, kind: PickerKind) {
        let unavailable = match kind {
            PickerKind::Namespace if self.selection.credential().is_none() => {
                Some("Select a kubeconfig first")
            }
            PickerKind::Pod if self.selection.namespace().is_none() => {
                Some("Select a namespace first")
            }
            PickerKind::Namespace if self.loading_namespaces => Some("Loading namespaces..."),
            PickerKind::Pod if self.loading_pods => Some("Loading pods..."),
            _ => None,
        };
        if let Some(message) = unavailable {
            self.status = message.to_string();
            return;
        }

        self.selection.toggle(kind);
        self.input_mode = if self.selection.open_picker().is_some() {
            InputMode::Picker
        } else {
            InputMode::Normal
        };
    }

    fn begin_edit(&mut self, mode: InputMode) {
        self.selection.close();
        self.input = match mode {
            InputMode::EditArgs => self.selection.profiler_args().to_string(),
            InputMode::EditFolder => self.selection.output_folder().display().to_string(),
            _ => String::new(),
        };
        self.input_mode = mode;
    }

    fn move_focus(&mut self, delta: isize) {
        let len = FormField::ALL.len() as isize;
        let current = FormField::ALL
            .iter()
            .position(|field| *field == self.focus)
            .unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        self.focus = FormField::ALL[next];
    }

    fn after_choice(&mut self, kind: PickerKind) -> AppCommand {
        match kind {
            PickerKind::Credential => {
                self.loading_pods = false;
                self.load_namespaces_command()
            }
            PickerKind::Namespace => self.load_pods_command(),
            PickerKind::Pod | PickerKind::Format => AppCommand::None,
        }
    }

    fn load_namespaces_command(&mut self) -> AppCommand {
        match self.selection.credential() {
            Some(credential) => {
                let credential = credential.to_string();
                self.loading_namespaces = true;
                AppCommand::LoadNamespaces { credential }
            }
            None => {
                self.loading_namespaces = false;
                AppCommand::None
            }
        }
    }

    fn load_pods_command(&mut self) -> AppCommand {
        match (self.selection.credential(), self.selection.namespace()) {
            (Some(credential), Some(namespace)) => {
                let command = AppCommand::LoadPods {
                    credential: credential.to_string(),
                    namespace: namespace.to_string(),
                };
                self.loading_pods = true;
                command
            }
            _ => {
                self.loading_pods = false;
                AppCommand::None
            }
        }
    }

    fn start_recording(&mut self) -> AppCommand {
        if self.selection.is_recording() {
            return AppCommand::None;
        }
        let Some(request) = self.selection.request() else {
            self.status = "Select kubeconfig, namespace and pod first".to_string();
            return AppCommand::None;
        };
        self.input_mode = InputMode::Normal;
        self.selection.begin_recording();
        self.status = format!("Recording {}", request.target_label());
        AppCommand::StartRecording(request)
    }

    /// Runs a selection mutation and queues a write for every remembered value it changed.
    fn tracked<R>(&mut self, mutate: impl FnOnce(&mut Selection) -> R) -> R {
        let before = self.selection.persisted_values();
        let result = mutate(&mut self.selection);
        let after = self.selection.persisted_values();
        for (previous, current) in before.into_iter().zip(after) {
            if previous != current {
                self.pending_writes.push(current);
            }
        }
        result
    }

    fn enter_ready(&mut self) {
        self.mode = AppMode::Ready;
        self.input_mode = InputMode::Normal;
    }

    fn install_selection(&mut self, persisted: PersistedSelection) {
        self.selection = Selection::from_persisted(persisted);
        self.loading_namespaces = false;
        self.loading_pods = false;
        self.focus = FormField::Credential;
        self.enter_ready();
    }

    pub fn apply_background(&mut self, event: BackgroundEvent) -> AppCommand {
        match event {
            BackgroundEvent::Bootstrap(stage) => {
                self.mode = match stage {
                    BootstrapStage::Clearing => AppMode::Clearing,
                    other => AppMode::Initializing {
                        message: other.message(),
                    },
                };
                AppCommand::None
            }
            BackgroundEvent::BootstrapFinished(Ok(report)) => {
                self.profiler_archive = Some(report.profiler_archive);
                self.profiler_version = Some(report.profiler_version);
                self.status = if report.download_failures.is_empty() {
                    "Ready".to_string()
                } else {
                    format!("Download failed: {}", report.download_failures.join("; "))
                };
                self.install_selection(report.selection);
                self.load_namespaces_command()
            }
            BackgroundEvent::BootstrapFinished(Err(fatal)) => {
                warn!("setup failed: {}", fatal.message());
                self.mode = AppMode::Error {
                    message: fatal.message(),
                };
                self.input_mode = InputMode::Blocked;
                AppCommand::None
            }
            BackgroundEvent::NamespacesLoaded {
                credential,
                outcome,
            } => self.apply_namespaces(credential, outcome),
            BackgroundEvent::PodsLoaded {
                credential,
                namespace,
                outcome,
            } => self.apply_pods(credential, namespace, outcome),
            BackgroundEvent::RecordingStage(stage) => {
                self.selection.set_recording_stage(stage);
                AppCommand::None
            }
            BackgroundEvent::RecordingFinished(outcome) => {
                match &outcome {
                    Ok(report) => info!("{}", report.status_line()),
                    Err(failure) => warn!("recording failed at {:?}: {}", failure.stage, failure),
                }
                self.selection.finish_recording(outcome);
                if let Some(line) = self.selection.recording().line() {
                    self.status = line;
                }
                AppCommand::None
            }
            BackgroundEvent::FolderPicked(folder) => {
                self.choosing_folder = false;
                match folder {
                    Some(folder) => {
                        self.status = format!("Output folder: {}", folder.display());
                        self.tracked(|selection| selection.set_output_folder(folder));
                    }
                    None => self.status = "Folder selection cancelled".to_string(),
                }
                AppCommand::None
            }
            BackgroundEvent::ResetFinished(persisted) => {
                self.pending_writes.clear();
                self.install_selection(persisted);
                self.status = "Saved selections cleared".to_string();
                AppCommand::None
            }
        }
    }

    fn apply_namespaces(&mut self, credential: String, outcome: ListOutcome) -> AppCommand {
        if self.selection.credential() != Some(credential.as_str()) {
            info!("dropping stale namespace list for {credential}");
            return AppCommand::None;
        }
        self.loading_namespaces = false;

        match outcome {
            ListOutcome::Unreachable(detail) => {
                self.enter_network_error(FailedAction::LoadNamespaces, detail);
                AppCommand::None
            }
            outcome => {
                if outcome == ListOutcome::EmptyButReachable {
                    self.status = format!("No namespaces visible with {credential}");
                }
                let names = outcome.names().to_vec();
                self.tracked(|selection| selection.apply_candidates(PickerKind::Namespace, names));
                self.load_pods_command()
            }
        }
    }

    fn apply_pods(
        &mut self,
        credential: String,
        namespace: String,
        outcome: ListOutcome,
    ) -> AppCommand {
        if self.selection.credential() != Some(credential.as_str())
            || self.selection.namespace() != Some(namespace.as_str())
        {
            info!("dropping stale pod list for {credential} {namespace}");
            return AppCommand::None;
        }
        self.loading_pods = false;

        match outcome {
            ListOutcome::Unreachable(detail) => {
                self.enter_network_error(FailedAction::LoadPods, detail);
            }
            outcome => {
                if outcome == ListOutcome::EmptyButReachable {
                    self.status = format!("No pods in {namespace}");
                }
                let names = outcome.names().to_vec();
                self.tracked(|selection| selection.apply_candidates(PickerKind::Pod, names));
            }
        }
        AppCommand::None
    }

    fn enter_network_error(&mut self, failed: FailedAction, detail: String) {
        warn!("{} failed: {detail}", failed.as_str());
        self.selection.close();
        self.input.clear();
        self.mode = AppMode::NetworkError { failed, detail };
        self.input_mode = InputMode::Blocked;
    }

    pub fn recording_status(&self) -> &RecordingStatus {
        self.selection.recording()
    }
}
