mod app;
mod bootstrap;
mod cli;
mod config;
mod input;
mod k8s;
mod kubectl;
mod model;
mod platform;
mod recorder;
mod selection;
mod store;
mod ui;

use anyhow::{Context, Result};
use app::{App, AppCommand, BackgroundEvent};
use bootstrap::{Bootstrapper, HttpFetcher};
use clap::Parser;
use cli::CliArgs;
use config::{PROFILER_HOMEPAGE, Settings};
use crossterm::event::{
    Event, EventStream, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use futures::StreamExt;
use k8s::KubeLister;
use kubectl::{JfrConverter, Kubectl};
use model::RecordingRequest;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use recorder::{Recorder, RecorderConfig, RemoteLayout};
use std::fs::{self, OpenOptions};
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::Mutex;
use store::{CredentialStore, PreferenceKey};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;
type PreferenceBatch = Vec<(PreferenceKey, Option<String>)>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let settings = Settings::load(&args)?;
    init_tracing(&args.log_filter, &settings.log_file)?;
    info!(
        "starting pfr (config: {})",
        settings.source.as_deref().unwrap_or("built-in defaults")
    );

    let fetcher = HttpFetcher::new(settings.download_timeout)?;
    let mut app = App::new(settings.default_output_folder());
    run(&mut app, settings, fetcher).await
}

fn init_tracing(level_filter: &str, log_file: &Path) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .compact();
    match open_log_file(log_file) {
        Ok(file) => {
            let _ = builder.with_writer(Mutex::new(file)).try_init();
        }
        Err(_) => {
            let _ = builder.with_writer(std::io::sink).try_init();
        }
    }

    Ok(())
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

async fn run(app: &mut App, settings: Settings, fetcher: HttpFetcher) -> Result<()> {
    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, settings, fetcher).await;
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(
    terminal: &mut TuiTerminal,
    app: &mut App,
    settings: Settings,
    fetcher: HttpFetcher,
) -> Result<()> {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<BackgroundEvent>();
    let mut workers = Workers::new(settings, events_tx);
    workers.spawn_bootstrap(fetcher);

    let mut reader = EventStream::new();
    let result = loop {
        if let Err(error) = terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")
        {
            break Err(error);
        }

        if !app.running() {
            break Ok(());
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(action) = input::map_key(app.input_mode(), key) {
                            debug!("action={action:?}");
                            let command = app.apply_action(action);
                            workers.execute(app, command);
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        app.set_status(format!("terminal event error: {error}"));
                    }
                    None => {
                        app.set_status("terminal event stream closed");
                        break Ok(());
                    }
                }
            }
            maybe_event = events_rx.recv() => {
                if let Some(event) = maybe_event {
                    let command = app.apply_background(event);
                    workers.execute(app, command);
                }
            }
        }

        workers.persist(app.take_pending_writes());
    };

    workers.shutdown();
    result
}

/// Spawns background work for commands and owns the handles that must die with the UI.
struct Workers {
    settings: Settings,
    store: CredentialStore,
    events: UnboundedSender<BackgroundEvent>,
    preferences: UnboundedSender<PreferenceBatch>,
    folder_picker: Option<JoinHandle<()>>,
}

impl Workers {
    fn new(settings: Settings, events: UnboundedSender<BackgroundEvent>) -> Self {
        let store = CredentialStore::new(&settings.kube_dir, &settings.state_dir);
        let (preferences, preference_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_preferences(store.clone(), preference_rx));
        Self {
            settings,
            store,
            events,
            preferences,
            folder_picker: None,
        }
    }

    fn spawn_bootstrap(&self, fetcher: HttpFetcher) {
        let bootstrapper = Bootstrapper::new(self.settings.clone(), self.store.clone(), fetcher);
        let events = self.events.clone();
        tokio::spawn(async move {
            let stage_events = events.clone();
            let outcome = bootstrapper
                .run(move |stage| {
                    let _ = stage_events.send(BackgroundEvent::Bootstrap(stage));
                })
                .await;
            let _ = events.send(BackgroundEvent::BootstrapFinished(outcome));
        });
    }

    fn execute(&mut self, app: &mut App, command: AppCommand) {
        match command {
            AppCommand::None => {}
            AppCommand::LoadNamespaces { credential } => self.spawn_namespace_listing(credential),
            AppCommand::LoadPods {
                credential,
                namespace,
            } => self.spawn_pod_listing(credential, namespace),
            AppCommand::StartRecording(request) => {
                let archive = app
                    .profiler_archive()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.settings.default_archive_path());
                self.spawn_recording(request, &archive);
            }
            AppCommand::PickFolder => self.spawn_folder_picker(),
            AppCommand::OpenFolder(folder) => {
                if let Err(error) = platform::open_folder(&folder) {
                    app.set_status(compact_error(&error));
                }
            }
            AppCommand::OpenInBrowser(file) => {
                if let Err(error) = platform::open_file_in_browser(&file) {
                    app.set_status(compact_error(&error));
                }
            }
            AppCommand::OpenHomepage => {
                if let Err(error) = platform::open_url(PROFILER_HOMEPAGE) {
                    app.set_status(compact_error(&error));
                }
            }
            AppCommand::Reset => self.spawn_reset(),
        }
    }

    fn spawn_namespace_listing(&self, credential: String) {
        let lister = KubeLister::new(self.settings.list_timeout);
        let kubeconfig = self.store.credential_path(&credential);
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = k8s::load_namespaces(&lister, &kubeconfig).await;
            let _ = events.send(BackgroundEvent::NamespacesLoaded {
                credential,
                outcome,
            });
        });
    }

    fn spawn_pod_listing(&self, credential: String, namespace: String) {
        let lister = KubeLister::new(self.settings.list_timeout);
        let kubeconfig = self.store.credential_path(&credential);
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = k8s::load_pods(&lister, &kubeconfig, &namespace).await;
            let _ = events.send(BackgroundEvent::PodsLoaded {
                credential,
                namespace,
                outcome,
            });
        });
    }

    fn spawn_recording(&self, request: RecordingRequest, archive: &Path) {
        let archive_name = archive
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.settings.profiler_archive.clone());
        let recorder = Recorder::new(
            Kubectl::new(&self.settings.kubectl),
            JfrConverter::new(&self.settings.java, self.settings.converter_path()),
            RecorderConfig {
                kube_dir: self.settings.kube_dir.clone(),
                session_root: self.settings.session_root(),
                profiler_archive: archive.to_path_buf(),
                layout: RemoteLayout::for_archive(&archive_name, &self.settings.remote_tmp),
            },
        );
        let events = self.events.clone();
        tokio::spawn(async move {
            let stage_events = events.clone();
            let outcome = recorder
                .record(&request, move |stage| {
                    let _ = stage_events.send(BackgroundEvent::RecordingStage(stage));
                })
                .await;
            let _ = events.send(BackgroundEvent::RecordingFinished(outcome));
        });
    }

    fn spawn_folder_picker(&mut self) {
        if let Some(previous) = self.folder_picker.take() {
            previous.abort();
        }
        let events = self.events.clone();
        self.folder_picker = Some(tokio::spawn(async move {
            let folder = match platform::choose_folder().await {
                Ok(folder) => folder,
                Err(error) => {
                    warn!("folder picker failed: {error:#}");
                    None
                }
            };
            let _ = events.send(BackgroundEvent::FolderPicked(folder));
        }));
    }

    fn spawn_reset(&self) {
        let store = self.store.clone();
        let default_folder = self.settings.default_output_folder();
        let events = self.events.clone();
        tokio::spawn(async move {
            let selection = tokio::task::spawn_blocking(move || {
                if let Err(error) = store.clear_all() {
                    warn!("failed to clear saved selections: {error:#}");
                }
                store.load_selection(&default_folder)
            })
            .await;
            match selection {
                Ok(selection) => {
                    let _ = events.send(BackgroundEvent::ResetFinished(selection));
                }
                Err(error) => warn!("reset task failed: {error}"),
            }
        });
    }

    fn persist(&self, batch: PreferenceBatch) {
        if batch.is_empty() {
            return;
        }
        if self.preferences.send(batch).is_err() {
            warn!("preference writer stopped; selection not saved");
        }
    }

    fn shutdown(&mut self) {
        if let Some(picker) = self.folder_picker.take() {
            picker.abort();
        }
    }
}

/// Applies preference batches one at a time so later writes always win.
async fn write_preferences(store: CredentialStore, mut batches: UnboundedReceiver<PreferenceBatch>) {
    while let Some(batch) = batches.recv().await {
        let store = store.clone();
        let written = tokio::task::spawn_blocking(move || {
            for (key, value) in batch {
                if let Err(error) = store.persist(key, value.as_deref()) {
                    warn!("failed to save {}: {error:#}", key.file_name());
                }
            }
        })
        .await;
        if let Err(error) = written {
            warn!("preference write task failed: {error}");
        }
    }
}

fn compact_error(error: &anyhow::Error) -> String {
    let mut out = Vec::new();
    for (index, cause) in error.chain().enumerate() {
        if index == 0 {
            out.push(cause.to_string());
        } else if index <= 2 {
            out.push(format!("caused by: {cause}"));
        } else {
            break;
        }
    }

    out.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::compact_error;
    use anyhow::Context;

    #[test]
    fn compact_error_keeps_first_three_causes() {
        let error = Err::<(), _>(anyhow::anyhow!("root"))
            .context("middle")
            .context("upper")
            .context("top")
            .expect_err("error");
        assert_eq!(
            compact_error(&error),
            "top | caused by: upper | caused by: middle"
        );
    }
}
