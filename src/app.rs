use crate::config::{APP_NAME, APP_VERSION};
use crate::error::PanelError;
use crate::panel::{Action, ModelKind, PanelConfig};
use crate::runner::{start_run, RunHandle, RunMessage, RunOutcome, RunPhase, RunSlot};
use crate::settings::SettingsStore;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::collections::VecDeque;
use std::io;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{info, warn};

/// Oldest transcript lines are dropped past this, so continuous mode can run for days.
pub const LOG_CAPACITY: usize = 20_000;
const RULE_WIDTH: usize = 60;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Active(RunPhase),
    Completed(RunOutcome),
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusTone {
    Ok,
    Busy,
    Error,
}

/// A message the front end should show prominently until dismissed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
    pub is_error: bool,
}

/// Focusable rows of the terminal form, top to bottom.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormField {
    PythonExe,
    ScriptPath,
    Mt5Path,
    Symbol,
    Action,
    ForceRetrain,
    Model(ModelKind),
    UseKalman,
    Interval,
    TrainStart,
    TrainEnd,
    PredictStart,
    PredictEnd,
}

impl FormField {
    pub fn all() -> Vec<FormField> {
        let mut fields = vec![
            FormField::PythonExe,
            FormField::ScriptPath,
            FormField::Mt5Path,
            FormField::Symbol,
            FormField::Action,
            FormField::ForceRetrain,
        ];
        fields.extend(ModelKind::ALL.into_iter().map(FormField::Model));
        fields.extend([
            FormField::UseKalman,
            FormField::Interval,
            FormField::TrainStart,
            FormField::TrainEnd,
            FormField::PredictStart,
            FormField::PredictEnd,
        ]);
        fields
    }

    pub fn label(self) -> &'static str {
        match self {
            FormField::PythonExe => "Python exe",
            FormField::ScriptPath => "Predictor",
            FormField::Mt5Path => "MT5 Files",
            FormField::Symbol => "Symbol",
            FormField::Action => "Action",
            FormField::ForceRetrain => "Force retrain",
            FormField::Model(m) => m.label(),
            FormField::UseKalman => "Kalman smoothing",
            FormField::Interval => "Interval (mins)",
            FormField::TrainStart => "Train start",
            FormField::TrainEnd => "Train end",
            FormField::PredictStart => "Predict start",
            FormField::PredictEnd => "Predict end",
        }
    }
}

pub fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Lines written to the transcript before the child's own output.
pub fn banner_lines(command_line: &str) -> Vec<String> {
    vec![
        rule(),
        format!("{} v{}", APP_NAME, APP_VERSION),
        rule(),
        String::new(),
        "Executing:".to_string(),
        format!("  {}", command_line),
        String::new(),
    ]
}

pub fn footer_lines(outcome: &RunOutcome) -> Vec<String> {
    vec![String::new(), rule(), outcome.summary_line()]
}

pub struct App {
    pub should_quit: bool,
    pub config: PanelConfig,
    pub log: VecDeque<String>,
    pub status: String,
    pub status_tone: StatusTone,
    pub run_state: RunState,
    pub notice: Option<Notice>,
    pub focus: usize,
    settings: SettingsStore,
    slot: RunSlot,
    run: Option<RunHandle>,
}

impl App {
    pub fn new(config: PanelConfig, settings: SettingsStore) -> Self {
        let mut config = config;
        if config.mt5_files_path.trim().is_empty() {
            match settings.load() {
                Ok(saved) if !saved.mt5_files_path.is_empty() => {
                    config.mt5_files_path = saved.mt5_files_path;
                }
                Ok(_) => {}
                Err(e) => warn!("Could not load MT5 path from settings: {:#}", e),
            }
        }

        Self {
            should_quit: false,
            config,
            log: VecDeque::new(),
            status: "Ready.".to_string(),
            status_tone: StatusTone::Ok,
            run_state: RunState::Idle,
            notice: None,
            focus: 0,
            settings,
            slot: RunSlot::default(),
            run: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_busy() || matches!(self.run_state, RunState::Active(_))
    }

    fn set_status(&mut self, msg: impl Into<String>, tone: StatusTone) {
        self.status = msg.into();
        self.status_tone = tone;
    }

    pub fn append_log(&mut self, line: impl Into<String>) {
        if self.log.len() >= LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(line.into());
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Snapshots the configuration and hands it to a background worker.
    pub fn trigger_run(&mut self) {
        match start_run(self.config.clone(), &self.slot) {
            Ok(handle) => {
                info!("Run requested: action={} symbol={}", self.config.action, self.config.symbol.trim());
                self.notice = None;
                self.run = Some(handle);
                self.run_state = RunState::Active(RunPhase::Validating);
                self.set_status("Running...", StatusTone::Busy);
            }
            Err(PanelError::AlreadyRunning) => {
                self.notice = Some(Notice {
                    title: "Busy".to_string(),
                    message: "A run is already in progress.".to_string(),
                    is_error: false,
                });
            }
            Err(e) => self.report_error(e.title(), e.to_string()),
        }
    }

    pub fn cancel_run(&mut self) {
        if let Some(handle) = &self.run {
            handle.cancel.cancel();
            self.set_status("Cancelling...", StatusTone::Busy);
        }
    }

    pub fn save_mt5_path(&mut self) {
        match self.settings.save_mt5_path(&self.config.mt5_files_path) {
            Ok(path) => {
                self.notice = Some(Notice {
                    title: "Success".to_string(),
                    message: format!("MT5 path saved successfully: {}", path.display()),
                    is_error: false,
                });
                self.set_status("MT5 path saved", StatusTone::Ok);
            }
            Err(e) => self.report_error("Save failed", format!("{:#}", e)),
        }
    }

    fn report_error(&mut self, title: &str, message: String) {
        self.notice = Some(Notice {
            title: title.to_string(),
            message,
            is_error: true,
        });
        self.set_status("Failed.", StatusTone::Error);
    }

    /// Drains everything the worker has sent so far.
    pub fn tick(&mut self) {
        let mut pending = Vec::new();
        let mut disconnected = false;
        if let Some(handle) = &mut self.run {
            loop {
                match handle.rx.try_recv() {
                    Ok(msg) => pending.push(msg),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }
        if disconnected {
            self.run = None;
        }
        for msg in pending {
            self.apply(msg);
        }
    }

    fn apply(&mut self, msg: RunMessage) {
        match msg {
            RunMessage::Phase(phase) => self.run_state = RunState::Active(phase),
            RunMessage::Warning(w) => {
                self.append_log(format!("[WARN] {}", w));
                self.notice = Some(Notice {
                    title: "Look-Ahead Bias Warning".to_string(),
                    message: w.to_string(),
                    is_error: false,
                });
            }
            RunMessage::Started { command_line } => {
                // Cleared only once a command has launched.
                self.clear_log();
                for line in banner_lines(&command_line) {
                    self.append_log(line);
                }
            }
            RunMessage::Line(line) => self.append_log(line),
            RunMessage::Finished(outcome) => {
                for line in footer_lines(&outcome) {
                    self.append_log(line);
                }
                let tone = if outcome.is_success() { StatusTone::Ok } else { StatusTone::Error };
                self.set_status(outcome.status_text(), tone);
                self.run_state = RunState::Completed(outcome);
                self.run = None;
            }
            RunMessage::Error { title, message } => {
                if title == "Launch error" {
                    self.append_log(message.clone());
                }
                self.report_error(title, message);
                self.run_state = RunState::Failed;
                self.run = None;
            }
        }
    }

    // ── Terminal form ──

    pub fn focused_field(&self) -> FormField {
        let fields = FormField::all();
        fields[self.focus.min(fields.len() - 1)]
    }

    fn text_field_mut(&mut self, field: FormField) -> Option<&mut String> {
        let c = &mut self.config;
        match field {
            FormField::PythonExe => Some(&mut c.python_executable),
            FormField::ScriptPath => Some(&mut c.script_path),
            FormField::Mt5Path => Some(&mut c.mt5_files_path),
            FormField::Symbol => Some(&mut c.symbol),
            FormField::TrainStart => Some(&mut c.train_start),
            FormField::TrainEnd => Some(&mut c.train_end),
            FormField::PredictStart => Some(&mut c.predict_start),
            FormField::PredictEnd => Some(&mut c.predict_end),
            _ => None,
        }
    }

    fn cycle_action(&mut self, forward: bool) {
        let all = Action::ALL;
        let idx = all.iter().position(|a| *a == self.config.action).unwrap_or(0);
        let next = if forward { (idx + 1) % all.len() } else { (idx + all.len() - 1) % all.len() };
        self.config.action = all[next];
    }

    fn adjust_interval(&mut self, delta: i64) {
        let current = i64::from(self.config.continuous_interval_minutes);
        self.config.continuous_interval_minutes = (current + delta).clamp(1, i64::from(u32::MAX)) as u32;
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.notice.is_some() && matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
            self.notice = None;
            return;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => {
                self.cancel_run();
                self.should_quit = true;
            }
            KeyCode::Char('r') if ctrl => self.trigger_run(),
            KeyCode::F(5) => self.trigger_run(),
            KeyCode::Char('k') if ctrl => self.cancel_run(),
            KeyCode::Char('s') if ctrl => self.save_mt5_path(),
            KeyCode::Char('l') if ctrl => self.clear_log(),
            KeyCode::Char('u') if ctrl => {
                let field = self.focused_field();
                if let Some(text) = self.text_field_mut(field) {
                    text.clear();
                }
            }
            KeyCode::Esc => {
                self.cancel_run();
                self.should_quit = true;
            }
            KeyCode::Tab | KeyCode::Down => {
                self.focus = (self.focus + 1) % FormField::all().len();
            }
            KeyCode::BackTab | KeyCode::Up => {
                let n = FormField::all().len();
                self.focus = (self.focus + n - 1) % n;
            }
            code => self.edit_focused(code),
        }
    }

    fn edit_focused(&mut self, code: KeyCode) {
        let field = self.focused_field();
        match field {
            FormField::Action => match code {
                KeyCode::Right | KeyCode::Char(' ') | KeyCode::Enter => self.cycle_action(true),
                KeyCode::Left => self.cycle_action(false),
                _ => {}
            },
            FormField::ForceRetrain | FormField::UseKalman | FormField::Model(_) => {
                if matches!(code, KeyCode::Char(' ') | KeyCode::Enter) {
                    match field {
                        FormField::ForceRetrain => self.config.force_retrain = !self.config.force_retrain,
                        FormField::UseKalman => self.config.use_kalman = !self.config.use_kalman,
                        FormField::Model(m) => self.config.toggle_model(m),
                        _ => {}
                    }
                }
            }
            FormField::Interval => match code {
                KeyCode::Right | KeyCode::Char('+') => self.adjust_interval(1),
                KeyCode::Left | KeyCode::Char('-') => self.adjust_interval(-1),
                KeyCode::PageUp => self.adjust_interval(10),
                KeyCode::PageDown => self.adjust_interval(-10),
                _ => {}
            },
            _ => {
                if let Some(text) = self.text_field_mut(field) {
                    match code {
                        KeyCode::Char(c) => text.push(c),
                        KeyCode::Backspace => {
                            text.pop();
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    pub async fn run(&mut self, terminal: &mut crate::tui::Tui) -> io::Result<()> {
        while !self.should_quit {
            self.tick();
            terminal.draw(|f| crate::ui::render(f, self))?;

            if event::poll(std::time::Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::tests::scratch_dir;

    fn test_app(tag: &str) -> App {
        let dir = scratch_dir(tag);
        App::new(PanelConfig::default(), SettingsStore::new(dir.join("config.json")))
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[test]
    fn test_loads_saved_mt5_path() {
        let dir = scratch_dir("app_load");
        let file = dir.join("config.json");
        std::fs::write(&file, format!(r#"{{"mt5_files_path": "{}"}}"#, dir.display())).unwrap();
        let app = App::new(PanelConfig::default(), SettingsStore::new(&file));
        assert_eq!(app.config.mt5_files_path, dir.display().to_string());
    }

    #[test]
    fn test_messages_build_transcript() {
        let mut app = test_app("app_transcript");
        app.apply(RunMessage::Phase(RunPhase::Streaming));
        assert!(matches!(app.run_state, RunState::Active(RunPhase::Streaming)));

        app.apply(RunMessage::Started { command_line: "python -u s.py tune".into() });
        app.apply(RunMessage::Line("epoch 1".into()));
        app.apply(RunMessage::Line("epoch 2".into()));
        app.apply(RunMessage::Finished(RunOutcome::Failed { code: Some(2) }));

        let log: Vec<&String> = app.log.iter().collect();
        assert!(log.iter().any(|l| l.contains("python -u s.py tune")));
        let pos1 = log.iter().position(|l| *l == "epoch 1").unwrap();
        let pos2 = log.iter().position(|l| *l == "epoch 2").unwrap();
        assert!(pos1 < pos2);
        assert_eq!(log.last().unwrap().as_str(), "[ERR] Process exited with code 2");
        assert_eq!(app.status, "Finished with errors (code 2).");
        assert_eq!(app.status_tone, StatusTone::Error);
    }

    #[test]
    fn test_error_message_sets_notice_and_keeps_config() {
        let mut app = test_app("app_error");
        app.config.symbol = "usdjpy".into();
        app.apply(RunMessage::Error {
            title: "Validation error",
            message: "Symbol cannot be empty.".into(),
        });
        assert_eq!(app.run_state, RunState::Failed);
        assert!(app.notice.as_ref().unwrap().is_error);
        assert_eq!(app.config.symbol, "usdjpy");
        assert_eq!(app.status, "Failed.");
    }

    #[test]
    fn test_previous_transcript_survives_failed_validation() {
        let mut app = test_app("app_keep_log");
        app.append_log("old output");
        app.apply(RunMessage::Error {
            title: "Validation error",
            message: "Symbol cannot be empty.".into(),
        });
        assert_eq!(app.log.front().map(String::as_str), Some("old output"));

        app.apply(RunMessage::Started { command_line: "python -u s.py tune".into() });
        assert!(!app.log.iter().any(|l| l == "old output"));
        assert_eq!(app.log.front().cloned(), Some(rule()));
    }

    #[test]
    fn test_log_is_bounded() {
        let mut app = test_app("app_bounded");
        for i in 0..(LOG_CAPACITY + 5) {
            app.append_log(format!("line {i}"));
        }
        assert_eq!(app.log.len(), LOG_CAPACITY);
        assert_eq!(app.log.front().unwrap(), "line 5");
    }

    #[test]
    fn test_form_navigation_and_editing() {
        let mut app = test_app("app_form");
        assert_eq!(app.focused_field(), FormField::PythonExe);
        press(&mut app, KeyCode::BackTab);
        assert_eq!(app.focused_field(), FormField::PredictEnd);
        for c in "2024-01-01".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        assert_eq!(app.config.predict_end, "2024-01-01");
        app.handle_key(KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL));
        assert!(app.config.predict_end.is_empty());

        app.focus = FormField::all().iter().position(|f| *f == FormField::Action).unwrap();
        press(&mut app, KeyCode::Right);
        assert_eq!(app.config.action, Action::Train);
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Left);
        assert_eq!(app.config.action, Action::SafeBacktest);

        app.focus = FormField::all()
            .iter()
            .position(|f| *f == FormField::Model(ModelKind::Gru))
            .unwrap();
        press(&mut app, KeyCode::Char(' '));
        assert!(!app.config.has_model(ModelKind::Gru));

        app.focus = FormField::all().iter().position(|f| *f == FormField::Interval).unwrap();
        app.config.continuous_interval_minutes = 1;
        press(&mut app, KeyCode::Char('-'));
        assert_eq!(app.config.continuous_interval_minutes, 1);
        press(&mut app, KeyCode::PageUp);
        assert_eq!(app.config.continuous_interval_minutes, 11);
    }

    #[test]
    fn test_save_mt5_path_reports_status() {
        let mut app = test_app("app_save");
        app.config.mt5_files_path = String::new();
        app.save_mt5_path();
        assert!(app.notice.as_ref().unwrap().is_error);

        let dir = scratch_dir("app_save_target");
        app.config.mt5_files_path = dir.display().to_string();
        app.save_mt5_path();
        assert_eq!(app.status, "MT5 path saved");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_trigger_run_streams_into_log() {
        use crate::validation::tests::valid_config;

        let (mut cfg, dir) = valid_config("app_run");
        let script = dir.join("fake.sh");
        std::fs::write(&script, "echo hello\nexit 0\n").unwrap();
        cfg.python_executable = "/bin/sh".into();
        cfg.script_path = script.display().to_string();
        cfg.action = Action::Tune;

        let mut app = App::new(cfg, SettingsStore::new(dir.join("config.json")));
        app.trigger_run();
        assert!(app.is_running());
        for _ in 0..400 {
            app.tick();
            if matches!(app.run_state, RunState::Completed(_)) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(app.run_state, RunState::Completed(RunOutcome::Succeeded));
        assert!(app.log.iter().any(|l| l == "hello"));
        assert_eq!(app.status, "Done.");
    }
}
