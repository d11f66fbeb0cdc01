use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap};

use crate::app::{App, AppMode, FormField, InputMode};
use crate::model::{PickerKind, shorten_file_name};
use crate::selection::{PickerEntry, RecordingStatus};

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    render_body(frame, root[1], app);
    render_footer(frame, root[2], app);

    match app.mode() {
        AppMode::Ready => {
            if let Some(kind) = app.selection().open_picker() {
                render_picker(frame, root[1], app, kind);
            }
        }
        AppMode::Initializing { message } => render_notice(frame, "Starting", message, ACCENT),
        AppMode::Clearing => render_notice(frame, "Starting", "Clearing old data...", WARN),
        AppMode::Error { message } => render_notice(
            frame,
            "Error",
            &format!("{message}\n\nRestart the application after fixing it.  q quit"),
            ERROR,
        ),
        AppMode::NetworkError { failed, detail } => render_notice(
            frame,
            "Network error",
            &format!(
                "Cluster unreachable while running {}.\n\n{detail}\n\nr retry  x reset saved data  q quit",
                failed.as_str()
            ),
            WARN,
        ),
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " 󰈸 pfr ", Color::White, PL_A, PL_B);
    let version = app
        .profiler_version()
        .map(|version| format!(" async-profiler {version} "))
        .unwrap_or_else(|| " async-profiler ? ".to_string());
    push_powerline_segment(&mut spans, version, Color::White, PL_B, PL_C);
    let target = match (app.selection().credential(), app.selection().namespace()) {
        (Some(credential), Some(namespace)) => {
            format!(" {} / {namespace} ", shorten_file_name(credential))
        }
        (Some(credential), None) => format!(" {} ", shorten_file_name(credential)),
        _ => " no kubeconfig ".to_string(),
    };
    push_powerline_segment(&mut spans, target, Color::White, PL_C, BG);

    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn render_body(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(FormField::ALL.len() as u16 + 2),
            Constraint::Min(3),
        ])
        .split(area);

    render_form(frame, chunks[0], app);
    render_recording(frame, chunks[1], app);
}

fn render_form(frame: &mut Frame, area: Rect, app: &App) {
    let ready = matches!(app.mode(), AppMode::Ready);
    let rows = FormField::ALL
        .iter()
        .map(|field| {
            let focused = ready && app.focus() == *field;
            let marker = if focused { "▶" } else { " " };
            let (value, color) = field_value(app, *field);
            let style = if focused {
                Style::default()
                    .fg(Color::Black)
                    .bg(ACCENT)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            Row::new(vec![
                Cell::from(format!("{marker} {}", field.label())),
                Cell::from(Span::styled(value, Style::default().fg(color))),
            ])
            .style(style)
        })
        .collect::<Vec<_>>();

    let table = Table::new(rows, [Constraint::Length(16), Constraint::Min(10)]).block(
        Block::default()
            .title(" Recording target ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(ACCENT))
            .style(Style::default().bg(PANEL)),
    );
    frame.render_widget(table, area);
}

fn field_value(app: &App, field: FormField) -> (String, Color) {
    let selection = app.selection();
    if matches!(
        (field, app.input_mode()),
        (FormField::ProfilerArgs, InputMode::EditArgs)
            | (FormField::OutputFolder, InputMode::EditFolder)
    ) {
        return (format!("{}▏", app.input()), WARN);
    }

    let picked = |value: Option<&str>, kind: PickerKind| match value {
        Some(value) => (value.to_string(), Color::White),
        None if app.loading(kind) => ("loading...".to_string(), MUTED),
        None => ("(select)".to_string(), MUTED),
    };

    match field {
        FormField::Credential => picked(
            selection.credential().map(shorten_file_name).as_deref(),
            PickerKind::Credential,
        ),
        FormField::Namespace => picked(selection.namespace(), PickerKind::Namespace),
        FormField::Pod => picked(selection.pod(), PickerKind::Pod),
        FormField::ProfilerArgs => (selection.profiler_args().to_string(), Color::White),
        FormField::OutputFolder => {
            let mut value = selection.output_folder().display().to_string();
            if app.choosing_folder() {
                value.push_str("  (choosing...)");
            }
            (value, Color::White)
        }
        FormField::Format => (selection.format().label().to_string(), Color::White),
        FormField::Record => {
            if selection.is_recording() {
                ("recording...".to_string(), WARN)
            } else if selection.request().is_some() {
                ("press Enter or r".to_string(), ACCENT)
            } else {
                ("select kubeconfig, namespace and pod".to_string(), MUTED)
            }
        }
    }
}

fn render_recording(frame: &mut Frame, area: Rect, app: &App) {
    let (line, color) = match app.recording_status() {
        RecordingStatus::Idle => ("No recording yet".to_string(), MUTED),
        RecordingStatus::Running(stage) => (stage.label().to_string(), WARN),
        RecordingStatus::Succeeded(report) => (report.status_line(), ACCENT),
        RecordingStatus::Failed(failure) => (failure.message.clone(), ERROR),
    };

    let mut lines = vec![Line::from(Span::styled(
        line,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))];
    if let RecordingStatus::Succeeded(report) = app.recording_status() {
        lines.push(Line::from(""));
        lines.push(Line::from(format!("raw        {}", report.raw.display())));
        if let Some(converted) = &report.converted {
            lines.push(Line::from(format!("converted  {}", converted.display())));
        }
        let mut hints = "o open folder".to_string();
        if report.browser_path.is_some() {
            hints.push_str("  b open in browser");
        }
        lines.push(Line::from(Span::styled(hints, Style::default().fg(MUTED))));
    }

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
        Block::default()
            .title(" Status ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(MUTED))
            .style(Style::default().bg(PANEL)),
    );
    frame.render_widget(paragraph, area);
}

fn render_picker(frame: &mut Frame, area: Rect, app: &App, kind: PickerKind) {
    let popup = centered_rect(60, 80, area);
    frame.render_widget(Clear, popup);

    let picker = app.selection().picker(kind);
    let entries = picker.visible();
    let current = app.selection().selected(kind);
    let visible_rows = popup.height.saturating_sub(4) as usize;
    let offset = picker.cursor().saturating_sub(visible_rows.saturating_sub(1));

    let mut lines = vec![Line::from(vec![
        Span::styled("filter: ", Style::default().fg(MUTED)),
        Span::styled(
            format!("{}▏", picker.filter()),
            Style::default().fg(Color::White),
        ),
    ])];
    if entries.is_empty() {
        lines.push(Line::from(Span::styled(
            "nothing to choose",
            Style::default().fg(MUTED),
        )));
    }
    for (index, entry) in entries.iter().enumerate().skip(offset).take(visible_rows) {
        let highlighted = index == picker.cursor();
        let chosen = matches!(entry, PickerEntry::Value(value) if Some(value) == current.as_ref());
        let style = match (highlighted, entry) {
            (true, _) => Style::default()
                .fg(Color::Black)
                .bg(ACCENT)
                .add_modifier(Modifier::BOLD),
            (false, PickerEntry::NoMatches) => Style::default().fg(MUTED),
            (false, PickerEntry::Value(_)) => Style::default().fg(Color::White),
        };
        let marker = if chosen { "● " } else { "  " };
        lines.push(Line::from(Span::styled(
            format!("{marker}{}", entry.label()),
            style,
        )));
    }

    let modal = Paragraph::new(lines).block(
        Block::default()
            .title(format!(" {} ({}) ", kind.title(), picker.candidates().len()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(ACCENT))
            .style(Style::default().bg(PANEL)),
    );
    frame.render_widget(modal, popup);
}

fn render_notice(frame: &mut Frame, title: &str, message: &str, color: Color) {
    let area = centered_rect(70, 40, frame.area());
    frame.render_widget(Clear, area);
    let modal = Paragraph::new(message.to_string())
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title(format!(" {title} "))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let (mode_label, mode_bg) = match app.input_mode() {
        InputMode::Normal => (" 󰘳 nrm ", PL_A),
        InputMode::Picker => (" 󰈲 pick ", PL_C),
        InputMode::EditArgs | InputMode::EditFolder => (" 󰏫 edit ", WARN),
        InputMode::Blocked => (" 󰌾 wait ", MUTED),
    };
    let status_text = if app.status().is_empty() {
        "Ready".to_string()
    } else {
        app.status().to_string()
    };
    let status_bg = if status_text.starts_with("Error") || status_text.starts_with("Download") {
        ERROR
    } else {
        PL_B
    };

    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, mode_label, Color::White, mode_bg, status_bg);
    let hints = footer_hints(app.input_mode());
    let status_width = area
        .width
        .saturating_sub(hints.chars().count() as u16 + 14)
        .max(16) as usize;
    push_powerline_segment(
        &mut spans,
        format!(" {} ", compact_text(&status_text, status_width)),
        Color::White,
        status_bg,
        BG,
    );
    spans.push(Span::styled(format!(" {hints}"), Style::default().fg(MUTED)));

    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn footer_hints(mode: InputMode) -> &'static str {
    match mode {
        InputMode::Normal => "↑↓ move  ⏎ choose  r record  f folder  F edit folder  ? homepage  q quit",
        InputMode::Picker => "type to filter  ↑↓ move  ⏎ select  esc close",
        InputMode::EditArgs | InputMode::EditFolder => "⏎ save  esc cancel",
        InputMode::Blocked => "q quit",
    }
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
