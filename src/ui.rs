use crate::app::{App, FormField, RunState, StatusTone};
use crate::config::{APP_NAME, APP_VERSION};
use crate::panel::Action;
use crate::runner::RunPhase;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

pub fn render(f: &mut Frame, app: &App) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_header(f, app, layout[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(layout[1]);

    render_form(f, app, body[0]);
    render_log(f, app, body[1]);
    render_footer(f, app, layout[2]);

    if app.notice.is_some() {
        render_notice(f, app, f.area());
    }
}

fn phase_label(state: &RunState) -> &'static str {
    match state {
        RunState::Idle => "Idle",
        RunState::Active(RunPhase::Validating) => "Validating",
        RunState::Active(RunPhase::Building) => "Building",
        RunState::Active(RunPhase::Launching) => "Launching",
        RunState::Active(RunPhase::Streaming) => "Streaming",
        RunState::Completed(_) => "Completed",
        RunState::Failed => "Error",
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let status_color = match app.status_tone {
        StatusTone::Ok => Color::Green,
        StatusTone::Busy => Color::Cyan,
        StatusTone::Error => Color::Red,
    };

    let spans = vec![
        Span::styled(
            format!(" {} v{} ", APP_NAME, APP_VERSION),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::styled(phase_label(&app.run_state), Style::default().fg(Color::Yellow)),
        Span::raw(" | Status: "),
        Span::styled(app.status.as_str(), Style::default().fg(status_color).add_modifier(Modifier::BOLD)),
    ];

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn checkbox(on: bool) -> &'static str {
    if on { "[x]" } else { "[ ]" }
}

fn field_value(app: &App, field: FormField) -> String {
    let c = &app.config;
    let date = |s: &str| if s.is_empty() { "(no limit)".to_string() } else { s.to_string() };
    match field {
        FormField::PythonExe => c.python_executable.clone(),
        FormField::ScriptPath => c.script_path.clone(),
        FormField::Mt5Path => c.mt5_files_path.clone(),
        FormField::Symbol => c.symbol.clone(),
        FormField::Action => format!("< {} >", c.action.label()),
        FormField::ForceRetrain => checkbox(c.force_retrain).to_string(),
        FormField::Model(m) => checkbox(c.has_model(m)).to_string(),
        FormField::UseKalman => checkbox(c.use_kalman).to_string(),
        FormField::Interval => format!("{}", c.continuous_interval_minutes),
        FormField::TrainStart => date(&c.train_start),
        FormField::TrainEnd => date(&c.train_end),
        FormField::PredictStart => date(&c.predict_start),
        FormField::PredictEnd => date(&c.predict_end),
    }
}

/// Greys out rows the selected action ignores.
fn field_applies(action: Action, field: FormField) -> bool {
    match field {
        FormField::ForceRetrain | FormField::TrainStart | FormField::TrainEnd => action.is_training(),
        FormField::Model(_) => action.is_training() || action.is_prediction(),
        FormField::UseKalman => action.is_prediction(),
        FormField::Interval => action == Action::PredictContinuous,
        FormField::PredictStart | FormField::PredictEnd => action.is_backtest(),
        _ => true,
    }
}

fn render_form(f: &mut Frame, app: &App, area: Rect) {
    let focused = app.focused_field();
    let lines: Vec<Line> = FormField::all()
        .into_iter()
        .map(|field| {
            let is_focused = field == focused;
            let applies = field_applies(app.config.action, field);
            let label_style = if is_focused {
                Style::default().fg(Color::Black).bg(Color::Cyan)
            } else {
                Style::default().fg(Color::Gray)
            };
            let value_style = match (is_focused, applies) {
                (true, _) => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                (false, true) => Style::default().fg(Color::White),
                (false, false) => Style::default().fg(Color::DarkGray),
            };
            Line::from(vec![
                Span::styled(format!("{:>16} ", field.label()), label_style),
                Span::styled(field_value(app, field), value_style),
            ])
        })
        .collect();

    let form = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Configuration "))
        .wrap(Wrap { trim: false });
    f.render_widget(form, area);
}

fn render_log(f: &mut Frame, app: &App, area: Rect) {
    let visible = area.height.saturating_sub(2) as usize;
    let skip = app.log.len().saturating_sub(visible);
    let lines: Vec<Line> = app
        .log
        .iter()
        .skip(skip)
        .map(|l| {
            let style = if l.starts_with("[ERR]") {
                Style::default().fg(Color::Red)
            } else if l.starts_with("[OK]") {
                Style::default().fg(Color::Green)
            } else if l.starts_with("[WARN]") {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::White)
            };
            Line::from(Span::styled(l.as_str(), style))
        })
        .collect();

    let log = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Console Output ({} lines) ", app.log.len())),
    );
    f.render_widget(log, area);
}

fn render_footer(f: &mut Frame, app: &App, area: Rect) {
    let hint = if app.is_running() {
        "Ctrl-K: cancel run | Ctrl-L: clear log | Esc: quit"
    } else {
        "Tab/↑↓: move | Space/←→: change | Ctrl-U: clear field | F5/Ctrl-R: run | Ctrl-S: save MT5 path | Ctrl-L: clear log | Esc: quit"
    };

    let footer = Paragraph::new(Line::from(vec![
        Span::styled(" Controls: ", Style::default().fg(Color::Gray)),
        Span::styled(hint, Style::default().fg(Color::White)),
    ]))
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(footer, area);
}

fn centered(area: Rect, percent_x: u16, height: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn render_notice(f: &mut Frame, app: &App, area: Rect) {
    let Some(notice) = &app.notice else {
        return;
    };
    let color = if notice.is_error { Color::Red } else { Color::Yellow };
    let popup = centered(area, 60, 9);

    let body = Paragraph::new(vec![
        Line::from(notice.message.as_str()),
        Line::from(""),
        Line::from(Span::styled("Enter/Esc: dismiss", Style::default().fg(Color::Gray))),
    ])
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true })
    .style(Style::default().fg(color))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", notice.title)),
    );

    f.render_widget(Clear, popup);
    f.render_widget(body, popup);
}
